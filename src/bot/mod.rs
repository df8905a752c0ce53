pub mod cheer;
pub mod command;
pub mod dispatcher;
pub mod outgoing;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::config::Config;
use crate::ledger::LoyaltyLedger;
use crate::platform::twitch;

use self::dispatcher::Dispatcher;
use self::outgoing::PACING_INTERVAL;

/// Connect to the channel and answer chat until the stream ends or Ctrl-C.
pub async fn run(config: Config, ledger: Arc<dyn LoyaltyLedger>) -> Result<()> {
    let (chat, incoming) = twitch::connect(&config.twitch)
        .await
        .context("Failed to connect to Twitch")?;

    let (queue, delivery) =
        outgoing::channel(Arc::new(chat), config.outgoing.capacity, PACING_INTERVAL);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let delivery_task = tokio::spawn(delivery.run(async move {
        let _ = stop_rx.await;
    }));

    let dispatcher = Arc::new(Dispatcher::new(ledger, queue));

    info!("Bot is listening in #{}", config.twitch.channel);
    let receive = twitch::run(incoming, &config.twitch.channel, |message| {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher.on_message(&message).await;
        });
    });

    let result = tokio::select! {
        result = receive => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    };

    // Queued replies are abandoned; nothing is said after this point
    let _ = stop_tx.send(());
    if let Err(e) = delivery_task.await {
        error!("Delivery task ended abnormally: {}", e);
    }

    result
}
