use tracing::debug;

/// Cheermote names. A token made of one of these followed by digits is a cheer.
pub const CHEER_PREFIXES: &[&str] = &[
    "BleedPurple",
    "Cheer",
    "PogChamp",
    "ShowLove",
    "Pride",
    "HeyGuys",
    "FrankerZ",
    "SeemsGood",
    "Party",
    "Kappa",
    "DansGame",
    "EleGiggle",
    "TriHard",
    "Kreygasm",
    "4Head",
    "SwiftRage",
    "NotLikeThis",
    "FailFish",
    "VoHiYo",
    "PJSalt",
    "MrDestructoid",
    "bday",
    "RIPCheer",
    "Shamrock",
];

/// Bits carried by a single token, if it is a well-formed cheer.
fn token_amount(token: &str) -> Option<i64> {
    CHEER_PREFIXES.iter().find_map(|prefix| {
        let digits = token.strip_prefix(prefix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            debug!("Ignoring malformed cheer token: {}", token);
            return None;
        }
        digits.parse().ok().or_else(|| {
            debug!("Ignoring out of range cheer token: {}", token);
            None
        })
    })
}

/// Total bits cheered inline in `text`, zero if there are no cheer tokens.
pub fn scan(text: &str) -> i64 {
    text.split(' ')
        .filter_map(token_amount)
        .fold(0i64, |total, amount| total.saturating_add(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_cheer() {
        assert_eq!(scan("Kappa100"), 100);
        assert!(scan("great stream Kappa100 everyone") >= 100);
    }

    #[test]
    fn test_cheers_are_summed() {
        assert_eq!(scan("Kappa100 PogChamp50"), 150);
        assert_eq!(scan("Cheer1 Cheer1 RIPCheer3 bday10"), 15);
    }

    #[test]
    fn test_no_cheer_tokens() {
        assert_eq!(scan("hello chat"), 0);
        assert_eq!(scan("!cheer 100"), 0);
        assert_eq!(scan(""), 0);
    }

    #[test]
    fn test_prefixes_are_case_sensitive() {
        assert_eq!(scan("kappa100 CHEER50"), 0);
    }

    #[test]
    fn test_malformed_suffixes_are_ignored() {
        assert_eq!(scan("Kappa Cheer-5 Cheer10x Cheer+3"), 0);
        assert_eq!(scan("Cheer Kappa20"), 20);
    }

    #[test]
    fn test_large_cheers_are_counted() {
        assert_eq!(scan("Cheer99999999999"), 99_999_999_999);
        assert_eq!(scan("Cheer9223372036854775807 Kappa1"), i64::MAX);
        // beyond i64
        assert_eq!(scan("Cheer99999999999999999999 Kappa5"), 5);
    }

    #[test]
    fn test_cheer_must_start_the_token() {
        assert_eq!(scan("xCheer100"), 0);
    }
}
