// ABOUTME: Sendspin player binary
// ABOUTME: Standalone player application for synchronized audio playback

use clap::Parser;
use sendspin_player::player::{PlayerArgs, SendspinPlayer};

#[derive(Parser, Debug)]
#[command(name = "sendspin-player")]
#[command(author, version, about = "Sendspin synchronized audio player", long_about = None)]
struct Args {
    #[command(flatten)]
    player: PlayerArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize tracing
    args.player.init_tracing();
    args.player.log_startup_info();

    // Create and run the player
    let config = args.player.build_config();
    let player = SendspinPlayer::with_config(config)?;
    tracing::info!("Client identity: {}", player.client_id());

    // Report connection state changes while the player runs
    let mut status_rx = player.subscribe_status();
    let report_task = tokio::spawn(async move {
        let mut last_connection = status_rx.borrow().connection;
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow().clone();
            if status.connection != last_connection {
                last_connection = status.connection;
                tracing::info!(
                    "Connection: {} (volume={}%, muted={}, buffer={:.0}%)",
                    status.connection,
                    status.volume,
                    status.muted,
                    status.buffer_usage
                );
                if let Some(error) = status.error {
                    tracing::warn!("Last error: {}", error);
                }
            }
        }
    });

    tracing::info!("Press Ctrl+C to stop");

    let result = player.run().await;
    report_task.abort();
    result?;
    Ok(())
}
