//! Tutoring bot: lesson reminders, post-lesson reports and participant
//! onboarding over Telegram.
//!
//! The admin panel edits the schedule; the bot reads it and does three
//! things: reminds everyone before a lesson ([`reminders`]), collects and
//! routes reports after it ([`reports`]) and lets participants pick a time
//! zone and open their schedule ([`handlers`]).

pub mod db;
pub mod handlers;
pub mod lesson_time;
pub mod reminders;
pub mod reports;
pub mod telegram;
pub mod timezone;

pub use db::Database;
pub use handlers::BotState;
pub use reminders::ReminderScheduler;
pub use reports::ReportTicker;
pub use telegram::TelegramClient;
