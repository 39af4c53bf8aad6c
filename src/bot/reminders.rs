//! Reminder scheduler: scans upcoming lessons every minute and notifies
//! tutor, student and linked parent at three lead times.
//!
//! Deduplication is an in-memory set of (lesson, date, time, bucket) keys,
//! cleared wholesale past a size threshold. It is intentionally non-durable:
//! a restart forgets what was sent, and a long-lived process eventually
//! forgets old keys.

use crate::bot::db::{Database, LessonRow, LessonType};
use crate::bot::lesson_time;
use crate::bot::telegram::TelegramClient;
use crate::bot::timezone::{SYSTEM_TZ, convert_to_zone};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Seconds between scheduler ticks.
pub const TICK_SECS: u64 = 60;

/// Dedup entries are dropped wholesale past this size. Accepts the risk of
/// re-sending near the clear boundary.
pub const DEDUP_LIMIT: usize = 1000;

/// Lead-time window before a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Day,
    Hour,
    TenMin,
}

impl Bucket {
    /// Phrase used in the reminder text.
    pub fn phrase(self) -> &'static str {
        match self {
            Bucket::Day => "завтра",
            Bucket::Hour => "через час",
            Bucket::TenMin => "через 10 минут",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Bucket::Day => "📅",
            Bucket::Hour => "⏰",
            Bucket::TenMin => "🔔",
        }
    }
}

/// Classify the time left before a lesson into a bucket.
///
/// The ranges overlap at their boundaries (e.g. a delta of exactly 20h is
/// inside "day" and nothing else, but 65m vs 60m windows touch); exclusivity
/// comes from this ordered match, not from the ranges themselves. Known edge
/// case, kept as-is.
pub fn classify(delta: Duration) -> Option<Bucket> {
    if delta >= Duration::hours(20) && delta <= Duration::hours(28) {
        Some(Bucket::Day)
    } else if delta >= Duration::minutes(55) && delta <= Duration::minutes(65) {
        Some(Bucket::Hour)
    } else if delta >= Duration::minutes(8) && delta <= Duration::minutes(12) {
        Some(Bucket::TenMin)
    } else {
        None
    }
}

/// Key marking one bucket of one lesson occurrence as already notified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub lesson_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub bucket: Bucket,
}

/// Who a planned reminder goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Tutor,
    Student,
    /// Resolved to a chat id at dispatch time via the student's parent link.
    Parent { link: String },
}

/// One reminder to send, referencing the lesson by index into the scanned
/// batch.
#[derive(Debug, Clone)]
pub struct PlannedReminder {
    pub lesson_index: usize,
    pub bucket: Bucket,
    pub recipient: Recipient,
}

/// Decide which reminders this tick should send and mark them as sent.
///
/// Lessons with an unreadable time value are skipped. A matched bucket is
/// marked in the dedup set even if no recipient ends up eligible, so the
/// decision is made exactly once per (lesson, bucket).
pub fn plan_tick(
    lessons: &[LessonRow],
    now: NaiveDateTime,
    sent: &mut HashSet<DedupKey>,
) -> Vec<PlannedReminder> {
    let mut planned = Vec::new();

    for (index, lesson) in lessons.iter().enumerate() {
        let Some(time) = lesson_time::normalize(&lesson.time) else {
            warn!(
                "Lesson {}: unreadable time value {:?}, skipping",
                lesson.id, lesson.time
            );
            continue;
        };
        let delta = lesson.date.and_time(time) - now;

        let Some(bucket) = classify(delta) else {
            continue;
        };

        let key = DedupKey { lesson_id: lesson.id, date: lesson.date, time, bucket };
        if sent.contains(&key) {
            continue;
        }

        // Tutors get the day-before and last-call reminders only.
        if bucket != Bucket::Hour && lesson.tutor_chat_id.is_some() {
            planned.push(PlannedReminder { lesson_index: index, bucket, recipient: Recipient::Tutor });
        }

        let student_wants = match bucket {
            Bucket::Day => lesson.notify.student_day,
            Bucket::Hour => lesson.notify.student_hour,
            Bucket::TenMin => lesson.notify.student_10min,
        };
        if student_wants && lesson.student_chat_id.is_some() {
            planned.push(PlannedReminder { lesson_index: index, bucket, recipient: Recipient::Student });
        }

        let parent_wants = match bucket {
            Bucket::Day => lesson.notify.parent_day,
            Bucket::Hour => lesson.notify.parent_hour,
            Bucket::TenMin => lesson.notify.parent_10min,
        };
        if parent_wants && let Some(link) = &lesson.parent_link {
            planned.push(PlannedReminder {
                lesson_index: index,
                bucket,
                recipient: Recipient::Parent { link: link.clone() },
            });
        }

        sent.insert(key);
    }

    if sent.len() > DEDUP_LIMIT {
        info!("Dedup set exceeded {DEDUP_LIMIT} entries, clearing");
        sent.clear();
    }

    planned
}

/// Reminder text for one recipient, with the lesson time shown in their
/// zone. Tutors see the student's name, everyone else sees the tutor's.
pub fn format_reminder(lesson: &LessonRow, bucket: Bucket, for_tutor: bool, zone: &str) -> Option<String> {
    let start = lesson_time::lesson_datetime(lesson.date, &lesson.time)?;
    let local = convert_to_zone(start, zone);

    let trial = if lesson.lesson_type == LessonType::Trial { "🎯 ПРОБНОЕ " } else { "" };

    let counterpart = if for_tutor {
        format!("👤 Ученик: {}", lesson.student_name)
    } else {
        format!("👨‍🏫 Репетитор: {}", lesson.tutor_name)
    };

    Some(format!(
        "{} Напоминание: {}занятие {}!\n\n📚 Предмет: {}\n🕐 Время: {} ({} мин.)\n{}",
        bucket.emoji(),
        trial,
        bucket.phrase(),
        lesson.subject,
        local.format("%H:%M"),
        lesson.duration_minutes,
        counterpart,
    ))
}

/// Current wall-clock time in the system zone.
pub fn now_system() -> NaiveDateTime {
    Utc::now().with_timezone(&SYSTEM_TZ).naive_local()
}

/// The long-lived scheduler loop.
pub struct ReminderScheduler {
    db: Arc<Database>,
    tg: Arc<TelegramClient>,
    sent: HashSet<DedupKey>,
}

impl ReminderScheduler {
    pub fn new(db: Arc<Database>, tg: Arc<TelegramClient>) -> Self {
        Self { db, tg, sent: HashSet::new() }
    }

    /// Spawn the loop. Runs until process exit; a failed tick is logged and
    /// the next one starts after the usual interval.
    pub fn spawn(mut self) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(TICK_SECS));
            loop {
                interval.tick().await;
                if let Err(e) = self.tick().await {
                    warn!("Reminder tick failed: {e}");
                }
            }
        });
    }

    async fn tick(&mut self) -> Result<(), String> {
        let now = now_system();
        let today = now.date();
        let tomorrow = today + Duration::days(1);

        let lessons = self
            .db
            .lessons_in_window(today, tomorrow)
            .map_err(|e| format!("window query failed: {e}"))?;

        let planned = plan_tick(&lessons, now, &mut self.sent);
        for reminder in planned {
            let lesson = &lessons[reminder.lesson_index];
            self.dispatch(lesson, reminder.bucket, &reminder.recipient).await;
        }
        Ok(())
    }

    /// Resolve the recipient's chat and zone, then send. Failures are
    /// logged and do not interrupt the rest of the batch.
    async fn dispatch(&self, lesson: &LessonRow, bucket: Bucket, recipient: &Recipient) {
        let (chat_id, zone, for_tutor) = match recipient {
            Recipient::Tutor => match lesson.tutor_chat_id {
                Some(chat) => (chat, lesson.tutor_timezone.clone(), true),
                None => return,
            },
            Recipient::Student => match lesson.student_chat_id {
                Some(chat) => (chat, lesson.student_timezone.clone(), false),
                None => return,
            },
            Recipient::Parent { link } => {
                let parent = match self.db.participant_by_link(link) {
                    Ok(Some(p)) => p,
                    Ok(None) => return,
                    Err(e) => {
                        warn!("Parent lookup '{link}' failed: {e}");
                        return;
                    }
                };
                match parent.chat_id {
                    Some(chat) => (chat, parent.timezone, false),
                    None => return,
                }
            }
        };

        let Some(text) = format_reminder(lesson, bucket, for_tutor, &zone) else {
            return;
        };

        if self.tg.send_message(chat_id, &text).await.is_ok() {
            info!("Sent {:?} reminder for lesson {} to chat {}", bucket, lesson.id, chat_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::db::{LessonType, NotifyFlags};
    use crate::bot::lesson_time::TimeValue;

    fn lesson_row(id: i64, date: NaiveDate, time: &str) -> LessonRow {
        LessonRow {
            id,
            date,
            time: TimeValue::Text(time.to_string()),
            lesson_type: LessonType::Regular,
            duration_minutes: 60,
            subject: "Физика".to_string(),
            tutor_name: "Анна".to_string(),
            tutor_chat_id: Some(10),
            tutor_timezone: "Europe/Saratov".to_string(),
            student_name: "Петя".to_string(),
            student_chat_id: Some(20),
            student_timezone: "Europe/Saratov".to_string(),
            parent_link: None,
            notify: NotifyFlags::default(),
        }
    }

    fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        date.and_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, day).unwrap()
    }

    #[test]
    fn test_classify_windows() {
        assert_eq!(classify(Duration::hours(24)), Some(Bucket::Day));
        assert_eq!(classify(Duration::hours(20)), Some(Bucket::Day));
        assert_eq!(classify(Duration::hours(28)), Some(Bucket::Day));
        assert_eq!(classify(Duration::minutes(60)), Some(Bucket::Hour));
        assert_eq!(classify(Duration::minutes(55)), Some(Bucket::Hour));
        assert_eq!(classify(Duration::minutes(65)), Some(Bucket::Hour));
        assert_eq!(classify(Duration::minutes(10)), Some(Bucket::TenMin));
        assert_eq!(classify(Duration::minutes(8)), Some(Bucket::TenMin));
        assert_eq!(classify(Duration::minutes(12)), Some(Bucket::TenMin));
    }

    #[test]
    fn test_classify_outside_windows() {
        assert_eq!(classify(Duration::hours(30)), None);
        assert_eq!(classify(Duration::minutes(70)), None);
        assert_eq!(classify(Duration::minutes(30)), None);
        assert_eq!(classify(Duration::minutes(5)), None);
        assert_eq!(classify(Duration::minutes(-10)), None);
    }

    #[test]
    fn test_plan_sends_at_most_once_per_key() {
        let lessons = vec![lesson_row(1, d(2), "15:00")];
        let now = at(d(2), 14, 0); // exactly one hour before
        let mut sent = HashSet::new();

        let first = plan_tick(&lessons, now, &mut sent);
        // Hour bucket: student only, tutor excluded.
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].recipient, Recipient::Student);
        assert_eq!(first[0].bucket, Bucket::Hour);

        // Next tick, still inside the window: nothing new.
        let second = plan_tick(&lessons, at(d(2), 14, 1), &mut sent);
        assert!(second.is_empty());
    }

    #[test]
    fn test_plan_day_bucket_recipients() {
        let mut lesson = lesson_row(1, d(3), "15:00");
        lesson.parent_link = Some("mom".to_string());
        let lessons = vec![lesson];
        let mut sent = HashSet::new();

        let planned = plan_tick(&lessons, at(d(2), 15, 0), &mut sent);
        let recipients: Vec<_> = planned.iter().map(|p| p.recipient.clone()).collect();
        assert_eq!(
            recipients,
            vec![
                Recipient::Tutor,
                Recipient::Student,
                Recipient::Parent { link: "mom".to_string() }
            ]
        );
        assert!(planned.iter().all(|p| p.bucket == Bucket::Day));
    }

    #[test]
    fn test_plan_respects_notify_flags() {
        let mut lesson = lesson_row(1, d(2), "15:00");
        lesson.notify.student_10min = false;
        lesson.parent_link = Some("mom".to_string());
        lesson.notify.parent_10min = false;
        let lessons = vec![lesson];
        let mut sent = HashSet::new();

        let planned = plan_tick(&lessons, at(d(2), 14, 50), &mut sent);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].recipient, Recipient::Tutor);
    }

    #[test]
    fn test_plan_outside_all_windows() {
        let lessons = vec![lesson_row(1, d(2), "15:00")];
        let mut sent = HashSet::new();
        assert!(plan_tick(&lessons, at(d(2), 13, 0), &mut sent).is_empty());
        assert!(sent.is_empty());
    }

    #[test]
    fn test_plan_marks_key_even_with_no_recipients() {
        // Hour bucket, student opted out, tutor never gets "hour": zero
        // recipients, but the key must still be recorded.
        let mut lesson = lesson_row(1, d(2), "15:00");
        lesson.notify.student_hour = false;
        let lessons = vec![lesson];
        let mut sent = HashSet::new();

        assert!(plan_tick(&lessons, at(d(2), 14, 0), &mut sent).is_empty());
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn test_plan_skips_unreadable_time() {
        let mut lesson = lesson_row(1, d(2), "15:00");
        lesson.time = TimeValue::Text("corrupt".to_string());
        let good = lesson_row(2, d(2), "15:00");
        let lessons = vec![lesson, good];
        let mut sent = HashSet::new();

        let planned = plan_tick(&lessons, at(d(2), 14, 0), &mut sent);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].lesson_index, 1);
    }

    #[test]
    fn test_dedup_set_cleared_past_limit() {
        let mut sent: HashSet<DedupKey> = (0..=DEDUP_LIMIT as i64)
            .map(|i| DedupKey {
                lesson_id: i,
                date: d(1),
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                bucket: Bucket::Day,
            })
            .collect();
        assert!(sent.len() > DEDUP_LIMIT);

        plan_tick(&[], at(d(1), 9, 0), &mut sent);
        assert!(sent.is_empty());
    }

    #[test]
    fn test_format_reminder_converts_zone() {
        let lesson = lesson_row(1, d(2), "14:30");
        let text = format_reminder(&lesson, Bucket::Hour, false, "Europe/Moscow").unwrap();
        assert!(text.contains("через час"));
        assert!(text.contains("13:30"));
        assert!(text.contains("Репетитор: Анна"));
        assert!(!text.contains("ПРОБНОЕ"));
    }

    #[test]
    fn test_format_reminder_trial_for_tutor() {
        let mut lesson = lesson_row(1, d(2), "14:30");
        lesson.lesson_type = LessonType::Trial;
        lesson.duration_minutes = 30;
        let text = format_reminder(&lesson, Bucket::TenMin, true, "Europe/Saratov").unwrap();
        assert!(text.contains("ПРОБНОЕ"));
        assert!(text.contains("14:30"));
        assert!(text.contains("(30 мин.)"));
        assert!(text.contains("Ученик: Петя"));
    }
}
