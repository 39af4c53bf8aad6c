//! Post-lesson report workflow.
//!
//! A background ticker creates an empty report row once a lesson's end time
//! plus a short delay has passed and reminds the tutor. The tutor then walks
//! a small per-chat conversation: pick a report, send text, attach a photo
//! or send without one. A finished report goes to the review chat and only a
//! human approval there flips its `sent` flag and forwards it to the
//! student's linked parent.

use crate::bot::db::{Database, ReportCandidate, ReportDetails};
use crate::bot::lesson_time;
use crate::bot::reminders::now_system;
use crate::bot::telegram::TelegramClient;
use crate::bot::timezone::convert_to_zone;
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Minutes after a lesson's end before the report reminder fires.
pub const REPORT_DELAY_MINUTES: i64 = 5;
/// Shortened delay for ad-hoc test lessons (duration ≤ 2 minutes).
pub const TEST_REPORT_DELAY_MINUTES: i64 = 1;
/// How far past the trigger a tick still counts the reminder as due. A tick
/// drifting wider than this window would miss the lesson; the row existence
/// check keeps that from double-firing, not a dedup set.
pub const ACCEPT_WINDOW_MINUTES: i64 = 2;

/// Where a chat's report conversation stands. Absence from the map is the
/// idle state; "submitted" and "approved" live in the report row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportState {
    /// The tutor picked a report and owes us its text.
    AwaitingText { report_id: i64 },
    /// Text stored; waiting for a photo or "send without photo".
    AwaitingPhotoOrSend { report_id: i64 },
}

/// Per-chat conversation state. Safe without finer locking because the bot
/// runtime is single-threaded per update.
pub type Conversations = Mutex<HashMap<i64, ReportState>>;

pub fn report_delay_minutes(duration_minutes: i64) -> i64 {
    if duration_minutes <= 2 {
        TEST_REPORT_DELAY_MINUTES
    } else {
        REPORT_DELAY_MINUTES
    }
}

/// Whether the report reminder for a lesson is due right now.
pub fn report_due(start: NaiveDateTime, duration_minutes: i64, now: NaiveDateTime) -> bool {
    let trigger =
        start + Duration::minutes(duration_minutes + report_delay_minutes(duration_minutes));
    now >= trigger && now - trigger <= Duration::minutes(ACCEPT_WINDOW_MINUTES)
}

/// Inline button opening the fill-in flow for one report.
pub fn fill_report_keyboard(report_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✍️ Заполнить отчёт",
        format!("report:{report_id}"),
    )]])
}

/// Keyboard offered after the report text is stored.
pub fn photo_or_send_keyboard(report_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("📷 Добавить фото", format!("rphoto:{report_id}"))],
        vec![InlineKeyboardButton::callback("📤 Отправить без фото", format!("rsend:{report_id}"))],
    ])
}

/// The formatted report card shown in the review chat and to parents.
pub fn format_report_card(details: &ReportDetails, heading: &str) -> String {
    let when = match lesson_time::lesson_datetime(details.date, &details.time) {
        Some(dt) => dt.format("%d.%m.%Y %H:%M").to_string(),
        None => details.date.format("%d.%m.%Y").to_string(),
    };
    format!(
        "📋 <b>{}</b>\n\n📚 Предмет: {}\n👨‍🏫 Репетитор: {}\n🎓 Ученик: {}\n📅 Занятие: {}\n\n{}",
        heading, details.subject, details.tutor_name, details.student_name, when, details.text,
    )
}

/// Background loop creating report rows and reminding tutors.
pub struct ReportTicker {
    db: Arc<Database>,
    tg: Arc<TelegramClient>,
}

impl ReportTicker {
    pub fn new(db: Arc<Database>, tg: Arc<TelegramClient>) -> Self {
        Self { db, tg }
    }

    /// Spawn the loop; same cadence and failure policy as the reminder
    /// scheduler, but fully independent of it.
    pub fn spawn(self) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(
                crate::bot::reminders::TICK_SECS,
            ));
            loop {
                interval.tick().await;
                if let Err(e) = self.tick().await {
                    warn!("Report tick failed: {e}");
                }
            }
        });
    }

    async fn tick(&self) -> Result<(), String> {
        let now = now_system();
        let today = now.date();
        let yesterday = today - Duration::days(1);

        let candidates = self
            .db
            .lessons_without_report(yesterday, today)
            .map_err(|e| format!("report candidate query failed: {e}"))?;

        for candidate in candidates {
            let Some(start) = lesson_time::lesson_datetime(candidate.date, &candidate.time) else {
                warn!("Lesson {}: unreadable time value, skipping report check", candidate.lesson_id);
                continue;
            };
            if !report_due(start, candidate.duration_minutes, now) {
                continue;
            }

            match self.db.create_report(candidate.lesson_id) {
                Ok(Some(report_id)) => {
                    info!("Created report {} for lesson {}", report_id, candidate.lesson_id);
                    self.remind_tutor(&candidate, report_id).await;
                }
                // Row appeared since the query; someone else's guard held.
                Ok(None) => {}
                Err(e) => warn!("Failed to create report for lesson {}: {e}", candidate.lesson_id),
            }
        }
        Ok(())
    }

    async fn remind_tutor(&self, candidate: &ReportCandidate, report_id: i64) {
        let Some(chat_id) = candidate.tutor_chat_id else {
            return;
        };
        let when = lesson_time::lesson_datetime(candidate.date, &candidate.time)
            .map(|dt| convert_to_zone(dt, &candidate.tutor_timezone).format("%H:%M").to_string())
            .unwrap_or_default();

        let text = format!(
            "📝 Занятие завершено!\n\n📚 Предмет: {}\n👤 Ученик: {}\n🕐 Время: {}\n\nПожалуйста, заполните отчёт о занятии.",
            candidate.subject, candidate.student_name, when,
        );
        self.tg
            .send_with_keyboard(chat_id, &text, fill_report_keyboard(report_id))
            .await
            .ok();
    }
}

/// Finish a report: store the optional photo, forward the card to the
/// review chat with an approve button and leave `sent` untouched.
pub async fn finalize_report(
    db: &Database,
    tg: &TelegramClient,
    review_chat_id: Option<i64>,
    report_id: i64,
    photo_id: Option<&str>,
) -> Result<(), String> {
    if let Some(photo) = photo_id {
        db.set_report_photo(report_id, photo)
            .map_err(|e| format!("failed to store photo: {e}"))?;
    }

    let details = db
        .report_details(report_id)
        .map_err(|e| format!("failed to load report {report_id}: {e}"))?
        .ok_or_else(|| format!("report {report_id} disappeared"))?;

    let Some(review_chat) = review_chat_id else {
        warn!("No review chat configured, report {report_id} awaits approval in the database only");
        return Ok(());
    };

    let card = format_report_card(&details, "Отчёт о занятии");
    let approve = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ Одобрить",
        format!("approve:{report_id}"),
    )]]);

    if let Some(photo) = &details.photo_id {
        tg.send_photo(review_chat, photo, Some(&card)).await?;
        tg.send_with_keyboard(review_chat, "Отчёт выше ожидает одобрения.", approve).await?;
    } else {
        tg.send_with_keyboard(review_chat, &card, approve).await?;
    }
    info!("Report {report_id} forwarded for review");
    Ok(())
}

/// What happened to the parent copy on approval.
#[derive(Debug, PartialEq, Eq)]
pub enum ApproveOutcome {
    ForwardedToParent,
    NoParent,
}

/// Approve a report: flip `sent`, then forward to the student's linked
/// parent if one resolves to a chat. Approval succeeds either way.
pub async fn approve_report(
    db: &Database,
    tg: &TelegramClient,
    report_id: i64,
) -> Result<ApproveOutcome, String> {
    let details = db
        .report_details(report_id)
        .map_err(|e| format!("failed to load report {report_id}: {e}"))?
        .ok_or_else(|| format!("report {report_id} not found"))?;

    db.mark_report_sent(report_id)
        .map_err(|e| format!("failed to mark report {report_id} sent: {e}"))?;

    let Some(link) = &details.parent_link else {
        return Ok(ApproveOutcome::NoParent);
    };
    let parent = match db.participant_by_link(link) {
        Ok(Some(p)) => p,
        Ok(None) => return Ok(ApproveOutcome::NoParent),
        Err(e) => {
            warn!("Parent lookup '{link}' failed during approval: {e}");
            return Ok(ApproveOutcome::NoParent);
        }
    };
    let Some(parent_chat) = parent.chat_id else {
        return Ok(ApproveOutcome::NoParent);
    };

    let card = format_report_card(&details, "Отчёт о занятии вашего ребёнка");
    let delivered = if let Some(photo) = &details.photo_id {
        tg.send_photo(parent_chat, photo, Some(&card)).await.is_ok()
    } else {
        tg.send_message(parent_chat, &card).await.is_ok()
    };

    if delivered {
        info!("Report {report_id} forwarded to parent chat {parent_chat}");
        Ok(ApproveOutcome::ForwardedToParent)
    } else {
        Ok(ApproveOutcome::NoParent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::db::{LessonType, NewLesson, Role};
    use crate::bot::lesson_time::TimeValue;
    use chrono::{NaiveDate, NaiveTime};
    use teloxide::Bot;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 10).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn offline_client() -> TelegramClient {
        TelegramClient::new(Bot::new("123456:TEST"))
    }

    /// One lesson on 2026-05-10 with an empty report row; `parent_link` is
    /// the student's parent reference, if any.
    fn seed_report(db: &Database, parent_link: Option<&str>) -> i64 {
        let tutor = db.add_participant("anna_tutor", "Анна", Role::Tutor, None).unwrap();
        let student = db.add_participant("petya", "Петя", Role::Student, parent_link).unwrap();
        let subject = db.add_subject("Алгебра").unwrap();
        let lesson = NewLesson {
            tutor_id: tutor,
            student_id: student,
            subject_id: subject,
            date: NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
            time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            lesson_type: LessonType::Regular,
            duration_minutes: None,
        };
        db.add_lesson_series(&lesson, 1).unwrap();
        let candidates = db
            .lessons_without_report(
                NaiveDate::from_ymd_opt(2026, 5, 9).unwrap(),
                NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
            )
            .unwrap();
        db.create_report(candidates[0].lesson_id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_approve_without_parent_marks_sent() {
        let db = Database::new();
        let report_id = seed_report(&db, None);
        db.set_report_text(report_id, "Прошли дроби").unwrap();

        let outcome = approve_report(&db, &offline_client(), report_id).await.unwrap();
        assert_eq!(outcome, ApproveOutcome::NoParent);
        assert!(db.report_details(report_id).unwrap().unwrap().sent);
    }

    #[tokio::test]
    async fn test_approve_with_unresolvable_parent_link() {
        // The link names a parent who never registered: approval still
        // flips `sent`, no forward happens.
        let db = Database::new();
        let report_id = seed_report(&db, Some("petya_mom"));
        db.set_report_text(report_id, "Прошли дроби").unwrap();

        let outcome = approve_report(&db, &offline_client(), report_id).await.unwrap();
        assert_eq!(outcome, ApproveOutcome::NoParent);
        assert!(db.report_details(report_id).unwrap().unwrap().sent);
    }

    #[tokio::test]
    async fn test_finalize_without_review_chat_keeps_unsent() {
        let db = Database::new();
        let report_id = seed_report(&db, None);
        db.set_report_text(report_id, "Прошли дроби").unwrap();

        finalize_report(&db, &offline_client(), None, report_id, Some("file-abc"))
            .await
            .unwrap();

        let details = db.report_details(report_id).unwrap().unwrap();
        assert_eq!(details.photo_id.as_deref(), Some("file-abc"));
        assert!(!details.sent);
    }

    #[test]
    fn test_delay_depends_on_duration() {
        assert_eq!(report_delay_minutes(60), REPORT_DELAY_MINUTES);
        assert_eq!(report_delay_minutes(30), REPORT_DELAY_MINUTES);
        assert_eq!(report_delay_minutes(2), TEST_REPORT_DELAY_MINUTES);
        assert_eq!(report_delay_minutes(1), TEST_REPORT_DELAY_MINUTES);
    }

    #[test]
    fn test_report_due_window() {
        // 14:00 + 60 min lesson + 5 min delay = trigger at 15:05.
        let start = dt(14, 0);
        assert!(!report_due(start, 60, dt(15, 4)));
        assert!(report_due(start, 60, dt(15, 5)));
        assert!(report_due(start, 60, dt(15, 7)));
        assert!(!report_due(start, 60, dt(15, 8)));
    }

    #[test]
    fn test_report_due_test_lesson() {
        // 2-minute lesson: trigger at start + 3 minutes.
        let start = dt(12, 0);
        assert!(report_due(start, 2, dt(12, 3)));
        assert!(report_due(start, 2, dt(12, 5)));
        assert!(!report_due(start, 2, dt(12, 6)));
        assert!(!report_due(start, 2, dt(12, 2)));
    }

    #[test]
    fn test_format_report_card() {
        let details = ReportDetails {
            id: 7,
            lesson_id: 3,
            text: "Разобрали квадратные уравнения".to_string(),
            photo_id: None,
            sent: false,
            subject: "Алгебра".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
            time: TimeValue::Text("16:00".to_string()),
            tutor_handle: "anna_tutor".to_string(),
            tutor_name: "Анна".to_string(),
            student_name: "Петя".to_string(),
            parent_link: None,
        };
        let card = format_report_card(&details, "Отчёт о занятии");
        assert!(card.contains("<b>Отчёт о занятии</b>"));
        assert!(card.contains("Алгебра"));
        assert!(card.contains("10.05.2026 16:00"));
        assert!(card.contains("квадратные уравнения"));
    }
}
