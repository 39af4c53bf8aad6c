//! Telegram client using teloxide.
//!
//! Thin dispatch boundary: every method logs failures and reports them as a
//! `Result`, nothing here panics past this point.

use teloxide::payloads::SendPhoto;
use teloxide::prelude::*;
use teloxide::requests::MultipartRequest;
use teloxide::types::{
    FileId, InlineKeyboardMarkup, InputFile, KeyboardButton, KeyboardMarkup, MenuButton,
    MessageId, ParseMode, WebAppInfo,
};
use url::Url;
use tracing::warn;

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send to chat {chat_id}: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Send text with an inline keyboard.
    pub async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<i64, String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send to chat {chat_id}: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Send text with the persistent bottom keyboard.
    pub async fn send_with_bottom_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: KeyboardMarkup,
    ) -> Result<i64, String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send to chat {chat_id}: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Send a photo the bot has already seen, by its Telegram file id.
    /// Captions carry the same HTML formatting as plain text sends.
    pub async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<i64, String> {
        self.photo_request(chat_id, file_id, caption)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send photo to chat {chat_id}: {e}");
                warn!("{}", msg);
                msg
            })
    }

    fn photo_request(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: Option<&str>,
    ) -> MultipartRequest<SendPhoto> {
        let input = InputFile::file_id(FileId(file_id.to_string()));
        let mut request = self.bot.send_photo(ChatId(chat_id), input);
        if let Some(cap) = caption {
            request = request.caption(cap).parse_mode(ParseMode::Html);
        }
        request
    }

    /// Edit a previously sent message, optionally replacing its keyboard.
    pub async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), String> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text)
            .parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard {
            request = request.reply_markup(kb);
        }
        request.await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to edit message {message_id} in chat {chat_id}: {e}");
            warn!("{}", msg);
            msg
        })
    }

    /// Point the chat's menu button at the schedule web app. Best effort.
    pub async fn set_schedule_menu_button(&self, chat_id: i64, url: Url) {
        let result = self
            .bot
            .set_chat_menu_button()
            .chat_id(ChatId(chat_id))
            .menu_button(MenuButton::WebApp {
                text: "📅 Расписание".to_string(),
                web_app: WebAppInfo { url },
            })
            .await;
        if let Err(e) = result {
            warn!("Failed to set menu button for chat {chat_id}: {e}");
        }
    }
}

/// The persistent bottom keyboard shown to every known participant.
pub fn main_keyboard(show_reports: bool) -> KeyboardMarkup {
    let mut first_row = vec![
        KeyboardButton::new("📅 Расписание"),
        KeyboardButton::new("⚙️ Настройки"),
    ];
    if show_reports {
        first_row.push(KeyboardButton::new("📝 Отчёты"));
    }
    KeyboardMarkup::new(vec![first_row]).resize_keyboard()
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::requests::HasPayload;

    fn client() -> TelegramClient {
        TelegramClient::new(Bot::new("123456:TEST"))
    }

    #[test]
    fn test_photo_caption_sent_as_html() {
        let request = client().photo_request(1, "file-1", Some("<b>Отчёт</b>"));
        let payload = request.payload_ref();
        assert_eq!(payload.caption.as_deref(), Some("<b>Отчёт</b>"));
        assert_eq!(payload.parse_mode, Some(ParseMode::Html));
    }

    #[test]
    fn test_photo_without_caption() {
        let request = client().photo_request(1, "file-1", None);
        let payload = request.payload_ref();
        assert!(payload.caption.is_none());
        assert!(payload.parse_mode.is_none());
    }

    #[test]
    fn test_main_keyboard_reports_button_tutors_only() {
        let texts = |kb: KeyboardMarkup| {
            kb.keyboard
                .into_iter()
                .flatten()
                .map(|b| b.text)
                .collect::<Vec<_>>()
        };
        assert!(texts(main_keyboard(true)).contains(&"📝 Отчёты".to_string()));
        assert!(!texts(main_keyboard(false)).contains(&"📝 Отчёты".to_string()));
    }
}
