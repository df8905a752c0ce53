/// Marks a chat line as a command, as in `!sub`
const COMMAND_MARKER: char = '!';

/// Marks a mention, as in `@alice`
const MENTION_MARKER: char = '@';

/// A chat line split into a command keyword and its positional arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub keyword: String,
    pub arguments: Vec<String>,
}

impl ParsedCommand {
    pub fn parse(text: &str) -> Self {
        Self {
            keyword: command(text),
            arguments: (0..).map_while(|n| argument(n, text)).collect(),
        }
    }

    pub fn argument(&self, n: usize) -> Option<&str> {
        self.arguments.get(n).map(String::as_str)
    }
}

fn normalize_keyword(token: &str) -> String {
    let lower = token.to_lowercase();
    lower
        .strip_prefix(COMMAND_MARKER)
        .map(str::to_string)
        .unwrap_or(lower)
}

fn normalize_argument(token: &str) -> String {
    let lower = token.to_lowercase();
    lower
        .strip_prefix(MENTION_MARKER)
        .map(str::to_string)
        .unwrap_or(lower)
}

/// The command keyword of `text`: first space-separated token, lowercased,
/// without its leading `!`.
pub fn command(text: &str) -> String {
    normalize_keyword(text.split(' ').next().unwrap_or_default())
}

/// The `n`th argument after the keyword, lowercased and without a leading `@`.
pub fn argument(n: usize, text: &str) -> Option<String> {
    text.split(' ').nth(n + 1).map(normalize_argument)
}
