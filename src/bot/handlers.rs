//! Update handlers: /start onboarding, the bottom-keyboard actions and the
//! callback buttons for time zones and reports.

use crate::bot::db::{Database, Role};
use crate::bot::reports::{self, Conversations, ReportState, photo_or_send_keyboard};
use crate::bot::telegram::{TelegramClient, main_keyboard};
use crate::bot::timezone::{TIMEZONES, zone_label};
use crate::config::Config;
use std::collections::HashSet;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatKind, InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Shared state handed to every handler.
pub struct BotState {
    pub config: Config,
    pub db: Arc<Database>,
    pub tg: Arc<TelegramClient>,
    pub conversations: Conversations,
    /// Chats already told they are not registered, to avoid repeating the
    /// invitation on every message.
    pub denied: Mutex<HashSet<i64>>,
}

impl BotState {
    pub fn new(config: Config, db: Arc<Database>, tg: Arc<TelegramClient>) -> Self {
        Self {
            config,
            db,
            tg,
            conversations: Mutex::new(std::collections::HashMap::new()),
            denied: Mutex::new(HashSet::new()),
        }
    }

    /// Marks a chat as having received the not-registered invitation.
    /// True only the first time for a given chat.
    async fn mark_denied(&self, chat_id: i64) -> bool {
        self.denied.lock().await.insert(chat_id)
    }

    /// Personal schedule URL for the web viewer.
    fn schedule_url(&self, username: &str) -> Option<Url> {
        let raw = format!("{}?user={}", self.config.webapp_url, urlencoding::encode(username));
        match Url::parse(&raw) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Bad webapp URL '{raw}': {e}");
                None
            }
        }
    }
}

pub async fn handle_message(_bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if !matches!(msg.chat.kind, ChatKind::Private(_)) {
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let chat_id = msg.chat.id.0;

    // A photo only means something while a report waits for one.
    if let Some(sizes) = msg.photo() {
        let pending = { state.conversations.lock().await.get(&chat_id).copied() };
        if let Some(ReportState::AwaitingPhotoOrSend { report_id }) = pending {
            if let Some(size) = sizes.last() {
                let photo_id = size.file.id.0.clone();
                finish_report(&state, chat_id, report_id, Some(&photo_id)).await;
            }
        }
        return Ok(());
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    match text {
        "/start" => {
            let name = user.first_name.clone();
            handle_start(&state, chat_id, user.username.as_deref(), &name).await;
        }
        "📅 Расписание" => {
            let Some(username) = user.username.as_deref() else {
                return Ok(());
            };
            send_schedule_link(&state, chat_id, username).await;
        }
        "⚙️ Настройки" => {
            let Some(username) = user.username.as_deref() else {
                return Ok(());
            };
            send_settings(&state, chat_id, username).await;
        }
        "📝 Отчёты" => {
            let Some(username) = user.username.as_deref() else {
                return Ok(());
            };
            send_report_list(&state, chat_id, username).await;
        }
        other => {
            let pending = { state.conversations.lock().await.get(&chat_id).copied() };
            if let Some(ReportState::AwaitingText { report_id }) = pending {
                accept_report_text(&state, chat_id, report_id, other).await;
            } else if let Some(username) = user.username.as_deref() {
                send_fallback_hint(&state, chat_id, username).await;
            }
        }
    }

    Ok(())
}

async fn handle_start(
    state: &BotState,
    chat_id: i64,
    username: Option<&str>,
    first_name: &str,
) {
    let Some(username) = username else {
        state
            .tg
            .send_message(
                chat_id,
                "У вас не установлен username в Telegram. Добавьте его в настройках \
                 Telegram и отправьте /start ещё раз.",
            )
            .await
            .ok();
        return;
    };

    let participant = match state.db.participant_by_handle(username) {
        Ok(p) => p,
        Err(e) => {
            warn!("Participant lookup '{username}' failed: {e}");
            return;
        }
    };

    let participant = match participant {
        Some(p) => p,
        None => {
            // Parents are provisioned lazily: a student row naming this
            // handle as its parent is the registration.
            match state.db.is_linked_parent(username) {
                Ok(true) => {
                    if let Err(e) =
                        state.db.add_participant(username, first_name, Role::Parent, None)
                    {
                        warn!("Failed to provision parent '{username}': {e}");
                        return;
                    }
                    match state.db.participant_by_handle(username) {
                        Ok(Some(p)) => p,
                        _ => return,
                    }
                }
                Ok(false) => {
                    send_invitation(state, chat_id, username).await;
                    return;
                }
                Err(e) => {
                    warn!("Parent-link check for '{username}' failed: {e}");
                    return;
                }
            }
        }
    };

    if let Err(e) = state.db.set_chat_id(username, chat_id) {
        warn!("Failed to record chat id for @{username}: {e}");
    }
    info!(audit = true, "👤 <b>Вход</b>: @{username} ({:?}), chat {chat_id}", participant.role);

    if let Some(url) = state.schedule_url(username) {
        state.tg.set_schedule_menu_button(chat_id, url).await;
    }

    let greeting = match participant.role {
        Role::Tutor => format!(
            "Здравствуйте, {first_name}! 👩‍🏫\n\nЯ буду напоминать о занятиях и \
             собирать отчёты после них."
        ),
        Role::Student => format!(
            "Привет, {first_name}! 🎓\n\nЯ буду напоминать тебе о занятиях: за день, \
             за час и за 10 минут."
        ),
        Role::Parent => format!(
            "Здравствуйте, {first_name}! 👪\n\nЯ буду присылать напоминания о занятиях \
             вашего ребёнка и отчёты после них."
        ),
    };
    state
        .tg
        .send_with_bottom_keyboard(chat_id, &greeting, main_keyboard(participant.role == Role::Tutor))
        .await
        .ok();
}

/// Invitation for unregistered chats, sent at most once per chat no matter
/// which message triggered it.
async fn send_invitation(state: &BotState, chat_id: i64, username: &str) {
    if !state.mark_denied(chat_id).await {
        return;
    }
    info!("Unregistered message from @{username} (chat {chat_id})");
    state
        .tg
        .send_message(
            chat_id,
            "Вы пока не зарегистрированы. Обратитесь к репетитору, \
             чтобы вас добавили в расписание.",
        )
        .await
        .ok();
}

async fn send_schedule_link(state: &BotState, chat_id: i64, username: &str) {
    match state.db.participant_by_handle(username) {
        Ok(Some(_)) => {}
        Ok(None) => {
            send_invitation(state, chat_id, username).await;
            return;
        }
        Err(e) => {
            warn!("Participant lookup '{username}' failed: {e}");
            return;
        }
    }
    let Some(url) = state.schedule_url(username) else {
        state.tg.send_message(chat_id, "Расписание временно недоступно.").await.ok();
        return;
    };
    info!(audit = true, "📅 <b>Просмотр расписания</b>: @{username}");
    let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
        "📅 Открыть расписание",
        url,
    )]]);
    state
        .tg
        .send_with_keyboard(chat_id, "Ваше расписание:", keyboard)
        .await
        .ok();
}

fn timezone_keyboard(current: &str) -> InlineKeyboardMarkup {
    let rows = TIMEZONES
        .iter()
        .map(|(zone, label)| {
            let text = if *zone == current {
                format!("✅ {label}")
            } else {
                (*label).to_string()
            };
            vec![InlineKeyboardButton::callback(text, format!("tz:{zone}"))]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

fn settings_card(zone: &str) -> String {
    format!(
        "⚙️ <b>Настройки</b>\n\nЧасовой пояс: {}\n\nВремя занятий в напоминаниях \
         показывается в выбранном поясе.",
        zone_label(zone),
    )
}

async fn send_settings(state: &BotState, chat_id: i64, username: &str) {
    let participant = match state.db.participant_by_handle(username) {
        Ok(Some(p)) => p,
        Ok(None) => {
            send_invitation(state, chat_id, username).await;
            return;
        }
        Err(e) => {
            warn!("Participant lookup '{username}' failed: {e}");
            return;
        }
    };
    state
        .tg
        .send_with_keyboard(
            chat_id,
            &settings_card(&participant.timezone),
            timezone_keyboard(&participant.timezone),
        )
        .await
        .ok();
}

async fn send_report_list(state: &BotState, chat_id: i64, username: &str) {
    let tutor = match state.db.participant_by_handle(username) {
        Ok(Some(p)) if p.role == Role::Tutor => p,
        Ok(Some(_)) => return,
        Ok(None) => {
            send_invitation(state, chat_id, username).await;
            return;
        }
        Err(e) => {
            warn!("Participant lookup '{username}' failed: {e}");
            return;
        }
    };
    let open = match state.db.unsent_reports_for_tutor(tutor.id) {
        Ok(list) => list,
        Err(e) => {
            warn!("Report list for @{username} failed: {e}");
            return;
        }
    };
    if open.is_empty() {
        state.tg.send_message(chat_id, "Все отчёты заполнены ✅").await.ok();
        return;
    }

    let rows = open
        .iter()
        .map(|r| {
            let label = format!(
                "{} — {} ({})",
                r.subject,
                r.student_name,
                r.date.format("%d.%m"),
            );
            vec![InlineKeyboardButton::callback(label, format!("report:{}", r.report_id))]
        })
        .collect::<Vec<_>>();
    state
        .tg
        .send_with_keyboard(
            chat_id,
            "📝 Незаполненные отчёты, выберите занятие:",
            InlineKeyboardMarkup::new(rows),
        )
        .await
        .ok();
}

async fn send_fallback_hint(state: &BotState, chat_id: i64, username: &str) {
    let participant = match state.db.participant_by_handle(username) {
        Ok(Some(p)) => p,
        Ok(None) => {
            send_invitation(state, chat_id, username).await;
            return;
        }
        Err(e) => {
            warn!("Participant lookup '{username}' failed: {e}");
            return;
        }
    };
    state
        .tg
        .send_with_bottom_keyboard(
            chat_id,
            "Воспользуйтесь кнопками ниже 👇",
            main_keyboard(participant.role == Role::Tutor),
        )
        .await
        .ok();
}

async fn accept_report_text(state: &BotState, chat_id: i64, report_id: i64, text: &str) {
    match state.db.set_report_text(report_id, text) {
        Ok(true) => {}
        Ok(false) => {
            // Row deleted under the conversation (lesson removed in admin).
            state.conversations.lock().await.remove(&chat_id);
            state.tg.send_message(chat_id, "Этот отчёт больше не существует.").await.ok();
            return;
        }
        Err(e) => {
            warn!("Failed to store report {report_id} text: {e}");
            return;
        }
    }
    state
        .conversations
        .lock()
        .await
        .insert(chat_id, ReportState::AwaitingPhotoOrSend { report_id });
    state
        .tg
        .send_with_keyboard(
            chat_id,
            "Текст сохранён. Добавить фото или отправить как есть?",
            photo_or_send_keyboard(report_id),
        )
        .await
        .ok();
}

async fn finish_report(state: &BotState, chat_id: i64, report_id: i64, photo_id: Option<&str>) {
    state.conversations.lock().await.remove(&chat_id);
    match reports::finalize_report(
        &state.db,
        &state.tg,
        state.config.review_chat_id,
        report_id,
        photo_id,
    )
    .await
    {
        Ok(()) => {
            state
                .tg
                .send_message(chat_id, "Отчёт отправлен на проверку ✅")
                .await
                .ok();
        }
        Err(e) => {
            warn!("Failed to finalize report {report_id}: {e}");
            state
                .tg
                .send_message(chat_id, "Не удалось отправить отчёт, попробуйте позже.")
                .await
                .ok();
        }
    }
}

pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let message = q.message.as_ref().and_then(|m| m.regular_message());
    let Some(message) = message else {
        return Ok(());
    };
    let chat_id = message.chat.id.0;
    let message_id = message.id.0 as i64;

    if let Some(zone) = data.strip_prefix("tz:") {
        let Some(username) = q.from.username.as_deref() else {
            return Ok(());
        };
        match state.db.set_timezone(username, zone) {
            Ok(true) => {
                info!(audit = true, "🌍 <b>Смена часового пояса</b>: @{username} → {zone}");
                // Re-render the settings card in place with the new check mark.
                let card = format!("{}\n\n✅ Часовой пояс обновлён!", settings_card(zone));
                state
                    .tg
                    .edit_message(chat_id, message_id, &card, Some(timezone_keyboard(zone)))
                    .await
                    .ok();
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to set zone for @{username}: {e}"),
        }
    } else if let Some(id) = parse_id(data, "report:") {
        state
            .conversations
            .lock()
            .await
            .insert(chat_id, ReportState::AwaitingText { report_id: id });
        state
            .tg
            .edit_message(chat_id, message_id, "✍️ Напишите текст отчёта одним сообщением.", None)
            .await
            .ok();
    } else if let Some(id) = parse_id(data, "rphoto:") {
        // Keep waiting in the same state; the next photo completes it.
        state
            .conversations
            .lock()
            .await
            .insert(chat_id, ReportState::AwaitingPhotoOrSend { report_id: id });
        state
            .tg
            .edit_message(chat_id, message_id, "📷 Пришлите фото для отчёта.", None)
            .await
            .ok();
    } else if let Some(id) = parse_id(data, "rsend:") {
        state
            .tg
            .edit_message(chat_id, message_id, "Отправляю отчёт…", None)
            .await
            .ok();
        finish_report(&state, chat_id, id, None).await;
    } else if let Some(id) = parse_id(data, "approve:") {
        match reports::approve_report(&state.db, &state.tg, id).await {
            Ok(reports::ApproveOutcome::ForwardedToParent) => {
                state
                    .tg
                    .edit_message(chat_id, message_id, "✅ Одобрено, отчёт отправлен родителю.", None)
                    .await
                    .ok();
            }
            Ok(reports::ApproveOutcome::NoParent) => {
                state
                    .tg
                    .edit_message(
                        chat_id,
                        message_id,
                        "✅ Одобрено. Родитель ещё не подключил бота, отчёт останется здесь.",
                        None,
                    )
                    .await
                    .ok();
            }
            Err(e) => warn!("Failed to approve report {id}: {e}"),
        }
    }

    Ok(())
}

fn parse_id(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_state() -> BotState {
        let config = Config {
            telegram_bot_token: "123456:TEST".to_string(),
            webapp_url: "http://localhost:5000/schedule".to_string(),
            log_chat_id: None,
            review_chat_id: None,
            database_path: PathBuf::from(":memory:"),
            data_dir: PathBuf::from("."),
        };
        BotState::new(
            config,
            Arc::new(Database::new()),
            Arc::new(TelegramClient::new(Bot::new("123456:TEST"))),
        )
    }

    #[tokio::test]
    async fn test_denial_marked_once_per_chat() {
        let state = test_state();
        assert!(state.mark_denied(42).await);
        assert!(!state.mark_denied(42).await);
        assert!(state.mark_denied(43).await);
    }

    #[tokio::test]
    async fn test_invitation_not_repeated() {
        let state = test_state();
        state.denied.lock().await.insert(42);
        // Already denied: returns before attempting any send.
        send_invitation(&state, 42, "ghost").await;
        assert_eq!(state.denied.lock().await.len(), 1);
    }

    #[test]
    fn test_settings_card_shows_zone_label() {
        let card = settings_card("Europe/Moscow");
        assert!(card.contains("<b>Настройки</b>"));
        assert!(card.contains("🇷🇺 Москва (UTC+3)"));
        let fallback = settings_card("Europe/Berlin");
        assert!(fallback.contains("Europe/Berlin"));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("report:42", "report:"), Some(42));
        assert_eq!(parse_id("approve:7", "approve:"), Some(7));
        assert_eq!(parse_id("report:abc", "report:"), None);
        assert_eq!(parse_id("tz:Europe/Moscow", "report:"), None);
    }

    #[test]
    fn test_timezone_keyboard_marks_current() {
        let kb = timezone_keyboard("Europe/Moscow");
        let marked: Vec<&str> = kb
            .inline_keyboard
            .iter()
            .flatten()
            .filter(|b| b.text.starts_with("✅"))
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(marked, vec!["✅ 🇷🇺 Москва (UTC+3)"]);
    }
}
