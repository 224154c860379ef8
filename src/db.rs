use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::calc::{Student, StudentMarksRecord};
use crate::config::{GradingPolicy, POLICY_SETTINGS_KEY};
use crate::grading::{GradeBand, GradeBandTable};
use crate::subjects::SubjectMark;

pub const DB_FILE_NAME: &str = "resultd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            roll_no TEXT NOT NULL DEFAULT '',
            student_class TEXT NOT NULL,
            section TEXT,
            main_subject_count INTEGER NOT NULL DEFAULT 6,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(student_class)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_bands(
            letter TEXT PRIMARY KEY,
            point_floor REAL NOT NULL,
            range_min REAL NOT NULL,
            range_max REAL NOT NULL,
            remarks TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_marks(
            id TEXT NOT NULL UNIQUE,
            student_id TEXT NOT NULL,
            exam_name TEXT NOT NULL,
            student_name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            class_roll INTEGER,
            exam_date TEXT,
            main_subject_obtained REAL NOT NULL,
            main_subject_total REAL NOT NULL,
            optional_subject_obtained REAL NOT NULL,
            optional_subject_total REAL NOT NULL,
            grand_total_obtained REAL NOT NULL,
            grand_total_full REAL NOT NULL,
            percentage REAL NOT NULL,
            average_marks REAL NOT NULL,
            grade_point REAL NOT NULL,
            grade_letter TEXT NOT NULL,
            remarks TEXT NOT NULL DEFAULT '',
            education_year TEXT,
            created_at TEXT,
            updated_at TEXT,
            PRIMARY KEY(student_id, exam_name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_marks_class_exam ON student_marks(class_name, exam_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_marks(
            student_id TEXT NOT NULL,
            exam_name TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            continuous_marks REAL NOT NULL,
            aggregate_marks REAL NOT NULL,
            total REAL NOT NULL,
            PRIMARY KEY(student_id, exam_name, subject_code),
            FOREIGN KEY(student_id, exam_name) REFERENCES student_marks(student_id, exam_name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    seed_grade_bands(&conn)?;

    Ok(conn)
}

fn seed_grade_bands(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM grade_bands", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    write_grade_bands(conn, GradeBandTable::default().bands())?;
    info!("seeded default grade bands");
    Ok(())
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// settings

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Stored policy, or the default when none was saved. Fields missing from the
/// stored document take their defaults.
pub fn load_policy(conn: &Connection) -> anyhow::Result<GradingPolicy> {
    match settings_get_json(conn, POLICY_SETTINGS_KEY)? {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(GradingPolicy::default()),
    }
}

pub fn save_policy(conn: &Connection, policy: &GradingPolicy) -> anyhow::Result<()> {
    settings_set_json(conn, POLICY_SETTINGS_KEY, &serde_json::to_value(policy)?)
}

// ---------------------------------------------------------------------------
// grade bands

pub fn load_grade_bands(conn: &Connection) -> anyhow::Result<GradeBandTable> {
    let mut stmt = conn.prepare(
        "SELECT letter, point_floor, range_min, range_max, remarks
         FROM grade_bands
         ORDER BY range_min",
    )?;
    let bands = stmt
        .query_map([], |row| {
            Ok(GradeBand {
                letter: row.get(0)?,
                point_floor: row.get(1)?,
                range_min: row.get(2)?,
                range_max: row.get(3)?,
                remarks: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if bands.is_empty() {
        warn!("grade_bands table is empty; using default bands");
        return Ok(GradeBandTable::default());
    }
    Ok(GradeBandTable::new(bands)?)
}

fn write_grade_bands(conn: &Connection, bands: &[GradeBand]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM grade_bands", [])?;
    for b in bands {
        tx.execute(
            "INSERT INTO grade_bands(letter, point_floor, range_min, range_max, remarks)
             VALUES(?, ?, ?, ?, ?)",
            params![b.letter, b.point_floor, b.range_min, b.range_max, b.remarks],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Replace the whole band table. Callers validate through `GradeBandTable::new`.
pub fn replace_grade_bands(conn: &Connection, table: &GradeBandTable) -> anyhow::Result<()> {
    write_grade_bands(conn, table.bands())
}

// ---------------------------------------------------------------------------
// students

const STUDENT_COLUMNS: &str =
    "id, student_id, name, roll_no, student_class, section, main_subject_count, active";

fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    let main_subject_count: i64 = row.get(6)?;
    let active: i64 = row.get(7)?;
    Ok(Student {
        id: row.get(0)?,
        student_id: row.get(1)?,
        name: row.get(2)?,
        roll_no: row.get(3)?,
        student_class: row.get(4)?,
        section: row.get(5)?,
        main_subject_count: main_subject_count.max(0) as usize,
        active: active != 0,
    })
}

pub fn list_students(conn: &Connection, class_name: Option<&str>) -> anyhow::Result<Vec<Student>> {
    let mut sql = format!("SELECT {STUDENT_COLUMNS} FROM students");
    let mut args: Vec<String> = Vec::new();
    if let Some(c) = class_name {
        sql.push_str(" WHERE student_class = ?");
        args.push(c.to_string());
    }
    // Numeric rolls sort numerically; anything else falls back to text order.
    sql.push_str(" ORDER BY student_class, CAST(roll_no AS INTEGER), roll_no, name");
    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(params_from_iter(args.iter()), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

pub fn get_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE student_id = ?");
    Ok(conn.query_row(&sql, [student_id], student_from_row).optional()?)
}

/// Every student keyed by school-issued `student_id`.
pub fn students_by_id(conn: &Connection) -> anyhow::Result<HashMap<String, Student>> {
    Ok(list_students(conn, None)?
        .into_iter()
        .map(|s| (s.student_id.clone(), s))
        .collect())
}

pub fn insert_student(conn: &Connection, student: &Student) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO students(id, student_id, name, roll_no, student_class, section, main_subject_count, active, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            student.id,
            student.student_id,
            student.name,
            student.roll_no,
            student.student_class,
            student.section,
            student.main_subject_count as i64,
            student.active as i64,
            now_ts(),
        ],
    )?;
    Ok(())
}

pub fn update_student(conn: &Connection, student: &Student) -> anyhow::Result<usize> {
    let n = conn.execute(
        "UPDATE students
         SET name = ?, roll_no = ?, student_class = ?, section = ?, main_subject_count = ?, active = ?, updated_at = ?
         WHERE student_id = ?",
        params![
            student.name,
            student.roll_no,
            student.student_class,
            student.section,
            student.main_subject_count as i64,
            student.active as i64,
            now_ts(),
            student.student_id,
        ],
    )?;
    Ok(n)
}

/// Delete a student and every marks record they own. Returns false when the
/// student did not exist.
pub fn delete_student(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    // Children first; no ON DELETE CASCADE.
    tx.execute("DELETE FROM subject_marks WHERE student_id = ?", [student_id])?;
    tx.execute("DELETE FROM student_marks WHERE student_id = ?", [student_id])?;
    let n = tx.execute("DELETE FROM students WHERE student_id = ?", [student_id])?;
    tx.commit()?;
    Ok(n > 0)
}

// ---------------------------------------------------------------------------
// marks records

const RECORD_COLUMNS: &str = "id, student_id, student_name, class_name, class_roll, exam_name, exam_date, education_year,
    main_subject_obtained, main_subject_total, optional_subject_obtained, optional_subject_total,
    grand_total_obtained, grand_total_full, percentage, average_marks, grade_point, grade_letter, remarks,
    created_at, updated_at";

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentMarksRecord> {
    Ok(StudentMarksRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        student_name: row.get(2)?,
        class_name: row.get(3)?,
        class_roll: row.get(4)?,
        exam_name: row.get(5)?,
        exam_date: row.get(6)?,
        education_year: row.get(7)?,
        subjects: BTreeMap::new(),
        main_subject_obtained: row.get(8)?,
        main_subject_total: row.get(9)?,
        optional_subject_obtained: row.get(10)?,
        optional_subject_total: row.get(11)?,
        grand_total_obtained: row.get(12)?,
        grand_total_full: row.get(13)?,
        percentage: row.get(14)?,
        average_marks: row.get(15)?,
        grade_point: row.get(16)?,
        grade_letter: row.get(17)?,
        remarks: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

fn load_subjects(
    conn: &Connection,
    student_id: &str,
    exam_name: &str,
) -> anyhow::Result<BTreeMap<String, SubjectMark>> {
    let mut stmt = conn.prepare(
        "SELECT subject_code, continuous_marks, aggregate_marks, total
         FROM subject_marks
         WHERE student_id = ? AND exam_name = ?",
    )?;
    let rows = stmt
        .query_map([student_id, exam_name], |row| {
            Ok(SubjectMark {
                subject_code: row.get(0)?,
                continuous_marks: row.get(1)?,
                aggregate_marks: row.get(2)?,
                total: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|m| (m.subject_code.clone(), m))
        .collect())
}

fn query_records(
    conn: &Connection,
    where_sql: &str,
    args: &[String],
) -> anyhow::Result<Vec<StudentMarksRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM student_marks{} ORDER BY exam_date, class_name, student_id, exam_name",
        if where_sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {where_sql}")
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut records = stmt
        .query_map(params_from_iter(args.iter()), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for rec in records.iter_mut() {
        rec.subjects = load_subjects(conn, &rec.student_id, &rec.exam_name)?;
    }
    Ok(records)
}

pub fn get_record(
    conn: &Connection,
    student_id: &str,
    exam_name: &str,
) -> anyhow::Result<Option<StudentMarksRecord>> {
    let mut found = query_records(
        conn,
        "student_id = ? AND exam_name = ?",
        &[student_id.to_string(), exam_name.to_string()],
    )?;
    Ok(found.pop())
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub student_id: Option<String>,
    pub class_name: Option<String>,
    pub exam_name: Option<String>,
}

pub fn list_records(conn: &Connection, filter: &RecordFilter) -> anyhow::Result<Vec<StudentMarksRecord>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<String> = Vec::new();
    if let Some(v) = &filter.student_id {
        clauses.push("student_id = ?");
        args.push(v.clone());
    }
    if let Some(v) = &filter.class_name {
        clauses.push("class_name = ?");
        args.push(v.clone());
    }
    if let Some(v) = &filter.exam_name {
        clauses.push("exam_name = ?");
        args.push(v.clone());
    }
    query_records(conn, &clauses.join(" AND "), &args)
}

/// Insert or replace the record for `(student_id, exam_name)` together with
/// its subject rows. The storage id and `created_at` of an existing record
/// are kept; `updated_at` is always refreshed. Returns the record as stored.
pub fn upsert_record(
    conn: &Connection,
    record: &StudentMarksRecord,
) -> anyhow::Result<StudentMarksRecord> {
    let tx = conn.unchecked_transaction()?;
    let existing: Option<(String, Option<String>)> = tx
        .query_row(
            "SELECT id, created_at FROM student_marks WHERE student_id = ? AND exam_name = ?",
            [&record.student_id, &record.exam_name],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let now = now_ts();
    let mut saved = record.clone();
    match existing {
        Some((id, created_at)) => {
            saved.id = Some(id);
            saved.created_at = created_at.or_else(|| Some(now.clone()));
        }
        None => {
            saved.id = Some(
                record
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            );
            saved.created_at = Some(now.clone());
        }
    }
    saved.updated_at = Some(now);

    tx.execute(
        "DELETE FROM subject_marks WHERE student_id = ? AND exam_name = ?",
        [&saved.student_id, &saved.exam_name],
    )?;
    tx.execute(
        "INSERT OR REPLACE INTO student_marks(
            id, student_id, student_name, class_name, class_roll, exam_name, exam_date, education_year,
            main_subject_obtained, main_subject_total, optional_subject_obtained, optional_subject_total,
            grand_total_obtained, grand_total_full, percentage, average_marks, grade_point, grade_letter, remarks,
            created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        params![
            saved.id,
            saved.student_id,
            saved.student_name,
            saved.class_name,
            saved.class_roll,
            saved.exam_name,
            saved.exam_date,
            saved.education_year,
            saved.main_subject_obtained,
            saved.main_subject_total,
            saved.optional_subject_obtained,
            saved.optional_subject_total,
            saved.grand_total_obtained,
            saved.grand_total_full,
            saved.percentage,
            saved.average_marks,
            saved.grade_point,
            saved.grade_letter,
            saved.remarks,
            saved.created_at,
            saved.updated_at,
        ],
    )?;
    for mark in saved.subjects.values() {
        tx.execute(
            "INSERT INTO subject_marks(student_id, exam_name, subject_code, continuous_marks, aggregate_marks, total)
             VALUES(?, ?, ?, ?, ?, ?)",
            params![
                saved.student_id,
                saved.exam_name,
                mark.subject_code,
                mark.continuous_marks,
                mark.aggregate_marks,
                mark.total,
            ],
        )?;
    }
    tx.commit()?;
    debug!(student_id = %saved.student_id, exam = %saved.exam_name, "stored marks record");
    Ok(saved)
}

pub fn delete_record(conn: &Connection, student_id: &str, exam_name: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM subject_marks WHERE student_id = ? AND exam_name = ?",
        [student_id, exam_name],
    )?;
    let n = tx.execute(
        "DELETE FROM student_marks WHERE student_id = ? AND exam_name = ?",
        [student_id, exam_name],
    )?;
    tx.commit()?;
    Ok(n > 0)
}

/// Distinct class names holding records for an exam.
pub fn list_exam_classes(
    conn: &Connection,
    exam_name: &str,
    education_year: Option<&str>,
) -> anyhow::Result<Vec<String>> {
    let mut sql = "SELECT DISTINCT class_name FROM student_marks WHERE exam_name = ?".to_string();
    let mut args = vec![exam_name.to_string()];
    if let Some(y) = education_year {
        sql.push_str(" AND education_year = ?");
        args.push(y.to_string());
    }
    sql.push_str(" ORDER BY class_name");
    let mut stmt = conn.prepare(&sql)?;
    let classes = stmt
        .query_map(params_from_iter(args.iter()), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(classes)
}

fn first_word(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or("")
}

/// Records of one class for one exam, relaxing the match step by step until
/// something is found: exact class and exam (with the education year, then
/// without), then the class name's first word, then the first words of both
/// class and exam names. The first-word stages apply only to class names with
/// a space in them.
pub fn find_class_exam_marks(
    conn: &Connection,
    class_name: &str,
    exam_name: &str,
    education_year: Option<&str>,
) -> anyhow::Result<Vec<StudentMarksRecord>> {
    let class_name = class_name.trim();
    let exam_name = exam_name.trim();
    let class_like = format!("{}%", first_word(class_name));
    let exam_like = format!("{}%", first_word(exam_name));

    let mut stages: Vec<(&str, bool, String, Vec<String>)> = Vec::new();
    let mut push_stage = |label: &'static str, where_sql: &str, args: Vec<String>| {
        if let Some(y) = education_year {
            let mut with_year = args.clone();
            with_year.push(y.to_string());
            stages.push((
                label,
                true,
                format!("{where_sql} AND education_year = ?"),
                with_year,
            ));
        }
        stages.push((label, false, where_sql.to_string(), args));
    };
    push_stage(
        "class+exam",
        "class_name = ? AND exam_name = ?",
        vec![class_name.to_string(), exam_name.to_string()],
    );
    // Only multi-word class names ("Fifth A") relax to their first word; a
    // single word has no broader class to fall back to.
    if class_name.contains(' ') {
        push_stage(
            "class prefix+exam",
            "class_name LIKE ? AND exam_name = ?",
            vec![class_like.clone(), exam_name.to_string()],
        );
        if !first_word(exam_name).is_empty() {
            push_stage(
                "class prefix+exam prefix",
                "class_name LIKE ? AND exam_name LIKE ?",
                vec![class_like, exam_like],
            );
        }
    }

    for (label, with_year, where_sql, args) in &stages {
        let records = query_records(conn, where_sql, args)?;
        if !records.is_empty() {
            info!(
                stage = *label,
                with_year = *with_year,
                class = class_name,
                exam = exam_name,
                rows = records.len(),
                "tabulation record search matched"
            );
            return Ok(records);
        }
    }
    warn!(class = class_name, exam = exam_name, "no marks records found for class and exam");
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{compute_student_record, ExamSubmission};
    use crate::subjects::RawSubjectMark;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let p = std::env::temp_dir().join(format!("{prefix}-{nanos}"));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn student(student_id: &str, class: &str) -> Student {
        Student {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            name: format!("Student {student_id}"),
            roll_no: "1".to_string(),
            student_class: class.to_string(),
            section: None,
            main_subject_count: 3,
            active: true,
        }
    }

    fn save(conn: &Connection, s: &Student, exam: &str, date: &str, bn: f64) -> StudentMarksRecord {
        let rec = compute_student_record(
            s,
            &ExamSubmission {
                exam_name: exam.to_string(),
                exam_date: Some(date.to_string()),
                subjects: vec![RawSubjectMark {
                    subject_code: Some("bn".to_string()),
                    subject_name: None,
                    continuous_marks: Some(0.0),
                    aggregate_marks: Some(bn),
                }],
                ..Default::default()
            },
            &GradingPolicy::default(),
            &GradeBandTable::default(),
        );
        upsert_record(conn, &rec).expect("upsert")
    }

    #[test]
    fn open_db_seeds_default_bands_once() {
        let ws = temp_dir("resultd-db-seed");
        let conn = open_db(&ws).expect("open");
        assert_eq!(load_grade_bands(&conn).expect("bands"), GradeBandTable::default());
        drop(conn);
        let conn = open_db(&ws).expect("reopen");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM grade_bands", [], |r| r.get(0))
            .expect("count");
        assert_eq!(count, 7);
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn upsert_keeps_id_and_created_at() {
        let ws = temp_dir("resultd-db-upsert");
        let conn = open_db(&ws).expect("open");
        let s = student("100", "Fifth");
        insert_student(&conn, &s).expect("insert student");

        let first = save(&conn, &s, "Annual", "2025-11-20", 50.0);
        let second = save(&conn, &s, "Annual", "2025-11-20", 70.0);
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);

        let stored = get_record(&conn, "100", "Annual")
            .expect("get")
            .expect("present");
        assert_eq!(stored.subjects["bn"].total, 70.0);
        assert_eq!(stored.education_year.as_deref(), Some("2025"));
        assert_eq!(list_records(&conn, &RecordFilter::default()).expect("list").len(), 1);

        assert!(delete_record(&conn, "100", "Annual").expect("delete"));
        assert!(get_record(&conn, "100", "Annual").expect("get").is_none());
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn class_search_falls_back_to_first_word() {
        let ws = temp_dir("resultd-db-search");
        let conn = open_db(&ws).expect("open");
        let s = student("200", "Class Five");
        insert_student(&conn, &s).expect("insert student");
        save(&conn, &s, "Annual Exam 2025", "2025-11-20", 60.0);

        let exact = find_class_exam_marks(&conn, "Class Five", "Annual Exam 2025", Some("2025"))
            .expect("search");
        assert_eq!(exact.len(), 1);
        let other_year =
            find_class_exam_marks(&conn, "Class Five", "Annual Exam 2025", Some("2019"))
                .expect("search");
        assert_eq!(other_year.len(), 1);
        let loose = find_class_exam_marks(&conn, "Class 5", "Annual", None).expect("search");
        assert_eq!(loose.len(), 1);
        let none = find_class_exam_marks(&conn, "Eighth", "Annual", None).expect("search");
        assert!(none.is_empty());
        // A single-word class never widens to a prefix match.
        let single = find_class_exam_marks(&conn, "Class", "Annual Exam 2025", None).expect("search");
        assert!(single.is_empty());
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn policy_round_trips_through_settings() {
        let ws = temp_dir("resultd-db-policy");
        let conn = open_db(&ws).expect("open");
        assert_eq!(load_policy(&conn).expect("load"), GradingPolicy::default());
        let mut policy = GradingPolicy::default();
        policy.optional_slots = 2;
        save_policy(&conn, &policy).expect("save");
        assert_eq!(load_policy(&conn).expect("load").optional_slots, 2);
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn deleting_a_student_removes_their_records() {
        let ws = temp_dir("resultd-db-delete");
        let conn = open_db(&ws).expect("open");
        let s = student("300", "Fifth");
        insert_student(&conn, &s).expect("insert student");
        save(&conn, &s, "Annual", "2025-11-20", 60.0);
        assert!(delete_student(&conn, "300").expect("delete"));
        assert!(list_records(&conn, &RecordFilter::default()).expect("list").is_empty());
        assert!(!delete_student(&conn, "300").expect("delete again"));
        let _ = std::fs::remove_dir_all(ws);
    }
}
