mod bot;
mod config;
mod telegram_log;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::info;
use tracing_subscriber::prelude::*;

use bot::handlers::{handle_callback, handle_message};
use bot::{BotState, Database, ReminderScheduler, ReportTicker, TelegramClient};
use config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "uchitel.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("uchitel.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let relay = telegram_log::LogRelayLayer::new(bot.clone(), ChatId(log_chat_id));
        registry.with(relay).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting uchitel-bot...");
    info!("Loaded config from {config_path}");

    let db = match Database::open(&config.database_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("Failed to open database {}: {e}", config.database_path.display());
            std::process::exit(1);
        }
    };
    let tg = Arc::new(TelegramClient::new(bot.clone()));

    ReminderScheduler::new(db.clone(), tg.clone()).spawn();
    ReportTicker::new(db.clone(), tg.clone()).spawn();

    let state = Arc::new(BotState::new(config, db, tg));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
