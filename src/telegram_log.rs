//! Relay of log and audit events to the service chat.
//!
//! The relay chat doubles as the school's audit feed. Events tagged with an
//! `audit` field (logins, schedule views, zone changes) carry HTML markup
//! and are forwarded as soon as they arrive, as are WARN and ERROR lines.
//! Plain INFO lines are collected into a periodic digest so scheduler
//! chatter does not flood the chat.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

const DIGEST_SECS: u64 = 5;
const DIGEST_LIMIT: usize = 50;
/// Telegram caps messages at 4096 characters; clip with room to spare.
const MESSAGE_CHAR_LIMIT: usize = 4000;

enum Relayed {
    /// Audit events, WARN and ERROR: sent as soon as they arrive.
    Immediate(String),
    /// Routine INFO: collected into the next digest.
    Digest(String),
}

fn compose(level: Level, audit: bool, line: &str) -> Relayed {
    match level {
        Level::ERROR => Relayed::Immediate(format!("❌ <b>Ошибка</b>: {line}")),
        Level::WARN => Relayed::Immediate(format!("⚠️ {line}")),
        _ if audit => Relayed::Immediate(line.to_string()),
        _ => Relayed::Digest(line.to_string()),
    }
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MESSAGE_CHAR_LIMIT {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MESSAGE_CHAR_LIMIT).collect();
    clipped.push('…');
    clipped
}

pub struct LogRelayLayer {
    tx: mpsc::UnboundedSender<Relayed>,
}

impl LogRelayLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Relayed>();

        tokio::spawn(async move {
            let mut digest: Vec<String> = Vec::new();
            let mut ticker = tokio::time::interval(Duration::from_secs(DIGEST_SECS));

            loop {
                tokio::select! {
                    item = rx.recv() => match item {
                        Some(Relayed::Immediate(text)) => {
                            deliver(&bot, chat_id, &text).await;
                        }
                        Some(Relayed::Digest(text)) => {
                            digest.push(text);
                            if digest.len() >= DIGEST_LIMIT {
                                deliver(&bot, chat_id, &digest.join("\n")).await;
                                digest.clear();
                            }
                        }
                        None => {
                            if !digest.is_empty() {
                                deliver(&bot, chat_id, &digest.join("\n")).await;
                            }
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if !digest.is_empty() {
                            deliver(&bot, chat_id, &digest.join("\n")).await;
                            digest.clear();
                        }
                    }
                }
            }
        });

        Self { tx }
    }
}

/// The relay chat renders HTML so audit events keep their bold markers.
async fn deliver(bot: &Bot, chat_id: ChatId, text: &str) {
    let request = bot.send_message(chat_id, clip(text)).parse_mode(ParseMode::Html);
    if let Err(e) = request.await {
        eprintln!("Failed to relay log line to Telegram: {e}");
    }
}

#[derive(Default)]
struct EventFields {
    message: String,
    audit: bool,
    extras: Vec<String>,
}

impl EventFields {
    fn into_line(self) -> String {
        if self.extras.is_empty() {
            self.message
        } else {
            format!("{} ({})", self.message, self.extras.join(", "))
        }
    }
}

impl Visit for EventFields {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "audit" {
            self.audit = value;
        } else {
            self.extras.push(format!("{} = {}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.extras.push(format!("{} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for LogRelayLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::INFO {
            return;
        }

        let mut fields = EventFields::default();
        event.record(&mut fields);
        let audit = fields.audit;

        if self.tx.send(compose(level, audit, &fields.into_line())).is_err() {
            eprintln!("Log relay channel closed, line dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_routing() {
        assert!(matches!(
            compose(Level::ERROR, false, "db down"),
            Relayed::Immediate(t) if t.contains("<b>Ошибка</b>") && t.contains("db down")
        ));
        assert!(matches!(
            compose(Level::WARN, false, "slow tick"),
            Relayed::Immediate(t) if t.starts_with("⚠️")
        ));
        // Audit events pass through untouched, markup included.
        assert!(matches!(
            compose(Level::INFO, true, "👤 <b>Вход</b>: @anna_tutor"),
            Relayed::Immediate(t) if t == "👤 <b>Вход</b>: @anna_tutor"
        ));
        assert!(matches!(
            compose(Level::INFO, false, "Sent Day reminder"),
            Relayed::Digest(t) if t == "Sent Day reminder"
        ));
    }

    #[test]
    fn test_clip_short_line_untouched() {
        assert_eq!(clip("короткая строка"), "короткая строка");
    }

    #[test]
    fn test_clip_truncates_on_char_boundary() {
        let long = "ж".repeat(MESSAGE_CHAR_LIMIT + 10);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), MESSAGE_CHAR_LIMIT + 1);
        assert!(clipped.ends_with('…'));
    }

    #[test]
    fn test_event_fields_line_with_extras() {
        let fields = EventFields {
            message: "tick failed".to_string(),
            audit: false,
            extras: vec!["lesson = 7".to_string()],
        };
        assert_eq!(fields.into_line(), "tick failed (lesson = 7)");
    }
}
