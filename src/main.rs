mod clock;
mod compose;
mod config;
mod conversation;
mod entity;
mod error;
mod formatter;
mod message;
mod render;
mod screen;
mod storage;
mod utils;

use anyhow::{Context, Result};
use compose::TicketScript;
use conversation::ConversationStore;
use formatter::Formatter;
use message::Message;
use screen::{LineOutcome, QUIT_COMMAND, TICKET_COMMAND};
use std::io::ErrorKind;
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SCREEN_WIDTH: usize = 60;

fn draw(messages: &[Message], formatter: &Formatter) {
    println!();
    for line in render::render(messages, formatter, SCREEN_WIDTH) {
        println!("{}", line);
    }
    println!("{}", "─".repeat(SCREEN_WIDTH));
    println!(
        "Type a message and press Enter · {} buys a ticket · {} exits",
        TICKET_COMMAND, QUIT_COMMAND
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::Config::load()?;

    let backend = storage::open(&config)
        .await
        .context("Failed to open conversation storage")?;
    let store = ConversationStore::new(config.storage_key.clone(), backend, config.write_policy())?;
    store.activate().await;
    info!(
        "Conversation '{}' ready with {} messages",
        store.key(),
        store.len().await
    );

    let tz = clock::system_timezone();
    let formatter = Formatter::new(config.display_timezone);
    let script = TicketScript::new(config.ticket_template.clone());
    let mut notices = store.subscribe();
    let mut input = BufReader::new(tokio::io::stdin());
    let mut line_buf = Vec::new();
    let mut unsaved = false;

    draw(&store.messages().await, &formatter);

    loop {
        tokio::select! {
            line = screen::read_line(&mut input, &mut line_buf) => match line {
                Ok(Some(line)) => {
                    match screen::handle_line(&store, &script, clock::now_in(tz), &line).await {
                        LineOutcome::Redraw => draw(&store.messages().await, &formatter),
                        LineOutcome::Ignored => {}
                        LineOutcome::Quit => break,
                    }
                }
                Ok(None) => break,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    line_buf.clear();
                    warn!("Skipping unreadable input line: {}", e);
                }
                Err(e) => {
                    error!("Failed to read input, shutting down: {}", e);
                    break;
                }
            },
            notice = notices.recv() => match notice {
                Ok(failure) => {
                    unsaved = true;
                    println!(
                        "! Messages in '{}' could not be saved after {} attempts: {}",
                        failure.key, failure.attempts, failure.error
                    );
                }
                Err(RecvError::Lagged(missed)) => {
                    unsaved = true;
                    warn!("Missed {} write failure notices", missed);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Saving conversation...");
    store.flush().await;
    unsaved |= notices.try_recv().is_ok();

    if unsaved {
        let messages = store.messages().await;
        if let Err(e) = store.save(&messages).await {
            error!("Final save failed, recent messages will be lost: {}", e);
        }
    }

    store.close().await;
    info!("Shutdown complete");
    Ok(())
}
