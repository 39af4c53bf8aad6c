//! SQLite store for participants, subjects, pairs, lessons and reports.
//!
//! The admin panel owns the richer editing surface; the bot consumes these
//! operations directly. Cascades are enforced with foreign keys: deleting a
//! participant removes their lessons and pairs, deleting a subject removes
//! its lessons, deleting a lesson removes its report.

use crate::bot::lesson_time::TimeValue;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";

/// Participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Tutor,
    Student,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Tutor => "tutor",
            Role::Student => "student",
            Role::Parent => "parent",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "tutor" => Role::Tutor,
            "parent" => Role::Parent,
            _ => Role::Student,
        }
    }
}

/// Lesson type; duration is derived from it unless overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonType {
    Regular,
    Trial,
}

impl LessonType {
    pub fn as_str(self) -> &'static str {
        match self {
            LessonType::Regular => "regular",
            LessonType::Trial => "trial",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "trial" => LessonType::Trial,
            _ => LessonType::Regular,
        }
    }

    pub fn default_duration(self) -> i64 {
        match self {
            LessonType::Regular => 60,
            LessonType::Trial => 30,
        }
    }
}

/// Per-bucket notification preferences stored on the student row.
///
/// The `student_*` flags gate the student's own reminders; the `parent_*`
/// flags gate reminders for the linked parent.
#[derive(Debug, Clone, Copy)]
pub struct NotifyFlags {
    pub student_day: bool,
    pub student_hour: bool,
    pub student_10min: bool,
    pub parent_day: bool,
    pub parent_hour: bool,
    pub parent_10min: bool,
}

impl Default for NotifyFlags {
    fn default() -> Self {
        Self {
            student_day: true,
            student_hour: true,
            student_10min: true,
            parent_day: true,
            parent_hour: true,
            parent_10min: true,
        }
    }
}

/// A tutor, student or parent record.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: i64,
    pub handle: String,
    pub name: String,
    pub role: Role,
    pub chat_id: Option<i64>,
    pub parent_link: Option<String>,
    pub timezone: String,
    pub notify: NotifyFlags,
}

/// One row of the reminder window query: a lesson joined with its subject
/// and both participants.
#[derive(Debug, Clone)]
pub struct LessonRow {
    pub id: i64,
    pub date: NaiveDate,
    pub time: TimeValue,
    pub lesson_type: LessonType,
    pub duration_minutes: i64,
    pub subject: String,
    pub tutor_name: String,
    pub tutor_chat_id: Option<i64>,
    pub tutor_timezone: String,
    pub student_name: String,
    pub student_chat_id: Option<i64>,
    pub student_timezone: String,
    pub parent_link: Option<String>,
    pub notify: NotifyFlags,
}

/// A lesson to create, possibly repeated weekly.
pub struct NewLesson {
    pub tutor_id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub lesson_type: LessonType,
    /// Override for ad-hoc test lessons (e.g. 2 minutes); normally derived
    /// from the lesson type.
    pub duration_minutes: Option<i64>,
}

/// Outcome of creating a weekly lesson series.
#[derive(Debug, PartialEq, Eq)]
pub struct SeriesOutcome {
    pub created: usize,
    pub skipped: usize,
}

/// A finished lesson that has no report row yet.
#[derive(Debug, Clone)]
pub struct ReportCandidate {
    pub lesson_id: i64,
    pub date: NaiveDate,
    pub time: TimeValue,
    pub duration_minutes: i64,
    pub subject: String,
    pub student_name: String,
    pub tutor_chat_id: Option<i64>,
    pub tutor_timezone: String,
}

/// An unsent report listed for a tutor.
#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub report_id: i64,
    pub subject: String,
    pub student_name: String,
    pub date: NaiveDate,
    pub time: TimeValue,
}

/// A report joined with its lesson, for finalization and approval.
#[derive(Debug, Clone)]
pub struct ReportDetails {
    pub id: i64,
    pub lesson_id: i64,
    pub text: String,
    pub photo_id: Option<String>,
    pub sent: bool,
    pub subject: String,
    pub date: NaiveDate,
    pub time: TimeValue,
    pub tutor_handle: String,
    pub tutor_name: String,
    pub student_name: String,
    pub parent_link: Option<String>,
}

/// SQLite store behind a single connection.
pub struct Database {
    conn: Mutex<Connection>,
}

const PARTICIPANT_COLS: &str = "id, handle, name, role, chat_id, parent_link, timezone, \
     student_notify_day, student_notify_hour, student_notify_10min, \
     parent_notify_day, parent_notify_hour, parent_notify_10min";

impl Database {
    /// Create a new in-memory database (tests).
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema().expect("Failed to initialize schema");
        db
    }

    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        info!("Opened database at {:?}", path);
        Ok(db)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS participants (
                id INTEGER PRIMARY KEY,
                handle TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL,
                chat_id INTEGER,
                parent_link TEXT,
                timezone TEXT NOT NULL DEFAULT '+04:00',
                student_notify_day INTEGER NOT NULL DEFAULT 1,
                student_notify_hour INTEGER NOT NULL DEFAULT 1,
                student_notify_10min INTEGER NOT NULL DEFAULT 1,
                parent_notify_day INTEGER NOT NULL DEFAULT 1,
                parent_notify_hour INTEGER NOT NULL DEFAULT 1,
                parent_notify_10min INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS pairs (
                id INTEGER PRIMARY KEY,
                tutor_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
                student_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS lessons (
                id INTEGER PRIMARY KEY,
                tutor_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
                student_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
                subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                lesson_type TEXT NOT NULL DEFAULT 'regular',
                duration_minutes INTEGER NOT NULL DEFAULT 60
            );

            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY,
                lesson_id INTEGER NOT NULL UNIQUE REFERENCES lessons(id) ON DELETE CASCADE,
                text TEXT NOT NULL DEFAULT '',
                photo_id TEXT,
                sent INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_lessons_date ON lessons(date);
            CREATE INDEX IF NOT EXISTS idx_lessons_pair ON lessons(tutor_id, student_id);
            CREATE INDEX IF NOT EXISTS idx_reports_sent ON reports(sent);
            "#,
        )
    }

    // ==================== PARTICIPANTS ====================

    pub fn add_participant(
        &self,
        handle: &str,
        name: &str,
        role: Role,
        parent_link: Option<&str>,
    ) -> rusqlite::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO participants (handle, name, role, parent_link) VALUES (?1, ?2, ?3, ?4)",
            params![strip_handle(handle), name, role.as_str(), parent_link.map(strip_handle)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn participant_by_handle(&self, handle: &str) -> rusqlite::Result<Option<Participant>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {PARTICIPANT_COLS} FROM participants WHERE handle = ?1"),
            params![strip_handle(handle)],
            row_to_participant,
        )
        .optional()
    }

    /// Resolve a parent link that may hold either a numeric participant id
    /// or a handle. Dual lookup kept as a compatibility shim for old rows.
    pub fn participant_by_link(&self, link: &str) -> rusqlite::Result<Option<Participant>> {
        let numeric_id: i64 = link.trim().parse().unwrap_or(-1);
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {PARTICIPANT_COLS} FROM participants WHERE handle = ?1 OR id = ?2"),
            params![strip_handle(link), numeric_id],
            row_to_participant,
        )
        .optional()
    }

    /// Whether any student lists this handle as their parent.
    pub fn is_linked_parent(&self, handle: &str) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM participants WHERE parent_link = ?1 LIMIT 1",
                params![strip_handle(handle)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Record the chat id learned on first bot contact.
    pub fn set_chat_id(&self, handle: &str, chat_id: i64) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE participants SET chat_id = ?1 WHERE handle = ?2",
            params![chat_id, strip_handle(handle)],
        )?;
        Ok(changed > 0)
    }

    pub fn set_timezone(&self, handle: &str, zone: &str) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE participants SET timezone = ?1 WHERE handle = ?2",
            params![zone, strip_handle(handle)],
        )?;
        Ok(changed > 0)
    }

    /// Delete a participant; their lessons and pairs cascade.
    pub fn delete_participant(&self, id: i64) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM participants WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ==================== SUBJECTS ====================

    pub fn add_subject(&self, name: &str) -> rusqlite::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute("INSERT INTO subjects (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn rename_subject(&self, id: i64, name: &str) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed =
            conn.execute("UPDATE subjects SET name = ?1 WHERE id = ?2", params![name, id])?;
        Ok(changed > 0)
    }

    /// Delete a subject; its lessons cascade.
    pub fn delete_subject(&self, id: i64) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM subjects WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ==================== PAIRS ====================

    pub fn add_pair(&self, tutor_id: i64, student_id: i64) -> rusqlite::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pairs (tutor_id, student_id) VALUES (?1, ?2)",
            params![tutor_id, student_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Delete a pair together with every lesson of that exact
    /// (tutor, student) combination. Returns the removed lesson count.
    pub fn delete_pair(&self, id: i64) -> rusqlite::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let (tutor_id, student_id): (i64, i64) = conn.query_row(
            "SELECT tutor_id, student_id FROM pairs WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let removed = conn.execute(
            "DELETE FROM lessons WHERE tutor_id = ?1 AND student_id = ?2",
            params![tutor_id, student_id],
        )?;
        conn.execute("DELETE FROM pairs WHERE id = ?1", params![id])?;
        Ok(removed)
    }

    // ==================== LESSONS ====================

    /// Create a weekly series of lessons, skipping slots where the same
    /// (tutor, student, date, time) lesson already exists.
    ///
    /// The duplicate check runs only here, on the creation path; edits do
    /// not re-check. `weeks` is clamped to 1..=52.
    pub fn add_lesson_series(&self, lesson: &NewLesson, weeks: u32) -> rusqlite::Result<SeriesOutcome> {
        let weeks = weeks.clamp(1, 52);
        let duration = lesson
            .duration_minutes
            .unwrap_or_else(|| lesson.lesson_type.default_duration());
        let time_str = lesson.time.format(TIME_FMT).to_string();

        let conn = self.conn.lock().unwrap();
        let mut created = 0;
        let mut skipped = 0;

        for week in 0..weeks {
            let date = lesson.date + Duration::weeks(week as i64);
            let date_str = date.format(DATE_FMT).to_string();

            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM lessons
                     WHERE tutor_id = ?1 AND student_id = ?2 AND date = ?3 AND time = ?4",
                    params![lesson.tutor_id, lesson.student_id, date_str, time_str],
                    |row| row.get(0),
                )
                .optional()?;

            if exists.is_some() {
                skipped += 1;
                continue;
            }

            conn.execute(
                "INSERT INTO lessons (tutor_id, student_id, subject_id, date, time, lesson_type, duration_minutes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    lesson.tutor_id,
                    lesson.student_id,
                    lesson.subject_id,
                    date_str,
                    time_str,
                    lesson.lesson_type.as_str(),
                    duration
                ],
            )?;
            created += 1;
        }

        Ok(SeriesOutcome { created, skipped })
    }

    /// Edit a lesson in place. No duplicate check on this path.
    pub fn update_lesson(
        &self,
        id: i64,
        date: NaiveDate,
        time: NaiveTime,
        subject_id: i64,
        lesson_type: LessonType,
        duration_minutes: i64,
    ) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE lessons SET date = ?1, time = ?2, subject_id = ?3, lesson_type = ?4, duration_minutes = ?5
             WHERE id = ?6",
            params![
                date.format(DATE_FMT).to_string(),
                time.format(TIME_FMT).to_string(),
                subject_id,
                lesson_type.as_str(),
                duration_minutes,
                id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete a lesson; its report cascades.
    pub fn delete_lesson(&self, id: i64) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM lessons WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// All lessons dated today or tomorrow where at least one side has a
    /// known chat id, joined with subject and both participants.
    pub fn lessons_in_window(
        &self,
        today: NaiveDate,
        tomorrow: NaiveDate,
    ) -> rusqlite::Result<Vec<LessonRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT l.id, l.date, l.time, l.lesson_type, l.duration_minutes,
                    sub.name,
                    t.name, t.chat_id, t.timezone,
                    s.name, s.chat_id, s.timezone, s.parent_link,
                    s.student_notify_day, s.student_notify_hour, s.student_notify_10min,
                    s.parent_notify_day, s.parent_notify_hour, s.parent_notify_10min
             FROM lessons l
             JOIN subjects sub ON l.subject_id = sub.id
             JOIN participants t ON l.tutor_id = t.id
             JOIN participants s ON l.student_id = s.id
             WHERE l.date IN (?1, ?2)
               AND (t.chat_id IS NOT NULL OR s.chat_id IS NOT NULL)",
        )?;

        let rows = stmt.query_map(
            params![
                today.format(DATE_FMT).to_string(),
                tomorrow.format(DATE_FMT).to_string()
            ],
            |row| {
                Ok(LessonRow {
                    id: row.get(0)?,
                    date: get_date(row, 1)?,
                    time: to_time_value(row.get::<_, Value>(2)?),
                    lesson_type: LessonType::from_str(&row.get::<_, String>(3)?),
                    duration_minutes: row.get(4)?,
                    subject: row.get(5)?,
                    tutor_name: row.get(6)?,
                    tutor_chat_id: row.get(7)?,
                    tutor_timezone: row.get(8)?,
                    student_name: row.get(9)?,
                    student_chat_id: row.get(10)?,
                    student_timezone: row.get(11)?,
                    parent_link: row.get(12)?,
                    notify: NotifyFlags {
                        student_day: row.get(13)?,
                        student_hour: row.get(14)?,
                        student_10min: row.get(15)?,
                        parent_day: row.get(16)?,
                        parent_hour: row.get(17)?,
                        parent_10min: row.get(18)?,
                    },
                })
            },
        )?;

        rows.collect()
    }

    // ==================== REPORTS ====================

    /// Recent lessons with no report row yet. The caller decides which of
    /// them are actually due (end time + delay inside the acceptance
    /// window).
    pub fn lessons_without_report(
        &self,
        yesterday: NaiveDate,
        today: NaiveDate,
    ) -> rusqlite::Result<Vec<ReportCandidate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT l.id, l.date, l.time, l.duration_minutes, sub.name, s.name, t.chat_id, t.timezone
             FROM lessons l
             JOIN subjects sub ON l.subject_id = sub.id
             JOIN participants t ON l.tutor_id = t.id
             JOIN participants s ON l.student_id = s.id
             LEFT JOIN reports r ON r.lesson_id = l.id
             WHERE r.id IS NULL AND l.date IN (?1, ?2)",
        )?;

        let rows = stmt.query_map(
            params![
                yesterday.format(DATE_FMT).to_string(),
                today.format(DATE_FMT).to_string()
            ],
            |row| {
                Ok(ReportCandidate {
                    lesson_id: row.get(0)?,
                    date: get_date(row, 1)?,
                    time: to_time_value(row.get::<_, Value>(2)?),
                    duration_minutes: row.get(3)?,
                    subject: row.get(4)?,
                    student_name: row.get(5)?,
                    tutor_chat_id: row.get(6)?,
                    tutor_timezone: row.get(7)?,
                })
            },
        )?;

        rows.collect()
    }

    /// Create an empty report row for a lesson. Returns `None` if one
    /// already exists (the existence check is the idempotency guard).
    pub fn create_report(&self, lesson_id: i64) -> rusqlite::Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let created_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO reports (lesson_id, created_at) VALUES (?1, ?2)",
            params![lesson_id, created_at],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn set_report_text(&self, id: i64, text: &str) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed =
            conn.execute("UPDATE reports SET text = ?1 WHERE id = ?2", params![text, id])?;
        Ok(changed > 0)
    }

    pub fn set_report_photo(&self, id: i64, photo_id: &str) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE reports SET photo_id = ?1 WHERE id = ?2",
            params![photo_id, id],
        )?;
        Ok(changed > 0)
    }

    /// Flip the sent flag. Only the approval action calls this.
    pub fn mark_report_sent(&self, id: i64) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("UPDATE reports SET sent = 1 WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Unsent reports for a tutor's own lessons, oldest first.
    pub fn unsent_reports_for_tutor(&self, tutor_id: i64) -> rusqlite::Result<Vec<ReportSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.id, sub.name, s.name, l.date, l.time
             FROM reports r
             JOIN lessons l ON r.lesson_id = l.id
             JOIN subjects sub ON l.subject_id = sub.id
             JOIN participants s ON l.student_id = s.id
             WHERE r.sent = 0 AND l.tutor_id = ?1
             ORDER BY l.date, l.time",
        )?;

        let rows = stmt.query_map(params![tutor_id], |row| {
            Ok(ReportSummary {
                report_id: row.get(0)?,
                subject: row.get(1)?,
                student_name: row.get(2)?,
                date: get_date(row, 3)?,
                time: to_time_value(row.get::<_, Value>(4)?),
            })
        })?;

        rows.collect()
    }

    pub fn report_details(&self, id: i64) -> rusqlite::Result<Option<ReportDetails>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT r.id, r.lesson_id, r.text, r.photo_id, r.sent,
                    sub.name, l.date, l.time,
                    t.handle, t.name, s.name, s.parent_link
             FROM reports r
             JOIN lessons l ON r.lesson_id = l.id
             JOIN subjects sub ON l.subject_id = sub.id
             JOIN participants t ON l.tutor_id = t.id
             JOIN participants s ON l.student_id = s.id
             WHERE r.id = ?1",
            params![id],
            |row| {
                Ok(ReportDetails {
                    id: row.get(0)?,
                    lesson_id: row.get(1)?,
                    text: row.get(2)?,
                    photo_id: row.get(3)?,
                    sent: row.get(4)?,
                    subject: row.get(5)?,
                    date: get_date(row, 6)?,
                    time: to_time_value(row.get::<_, Value>(7)?),
                    tutor_handle: row.get(8)?,
                    tutor_name: row.get(9)?,
                    student_name: row.get(10)?,
                    parent_link: row.get(11)?,
                })
            },
        )
        .optional()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_handle(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}

fn to_time_value(value: Value) -> TimeValue {
    match value {
        Value::Integer(n) => TimeValue::SecondsSinceMidnight(n),
        Value::Text(s) => TimeValue::Text(s),
        _ => TimeValue::Text(String::new()),
    }
}

fn get_date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        handle: row.get(1)?,
        name: row.get(2)?,
        role: Role::from_str(&row.get::<_, String>(3)?),
        chat_id: row.get(4)?,
        parent_link: row.get(5)?,
        timezone: row.get(6)?,
        notify: NotifyFlags {
            student_day: row.get(7)?,
            student_hour: row.get(8)?,
            student_10min: row.get(9)?,
            parent_day: row.get(10)?,
            parent_hour: row.get(11)?,
            parent_10min: row.get(12)?,
        },
    })
}
