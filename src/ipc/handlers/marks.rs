use crate::calc::{compute_student_record, recompute_record, ExamSubmission};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::{info, warn};

const MARK_FIELDS: [&str; 2] = ["continuousMarks", "aggregateMarks"];

/// The engine clamps negatives; the boundary rejects them outright.
fn validate_subject_entries(req: &Request) -> Result<(), Value> {
    let Some(list) = req.params.get("subjects").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "subjects must be an array", None));
    };
    for (i, entry) in list.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("subjects[{i}] must be an object"),
                Some(json!({ "index": i })),
            ));
        };
        for key in MARK_FIELDS {
            match obj.get(key) {
                None | Some(Value::Null) => {}
                Some(v) => match v.as_f64() {
                    Some(n) if n.is_finite() && n >= 0.0 => {}
                    _ => {
                        return Err(err(
                            &req.id,
                            "bad_params",
                            format!("subjects[{i}].{key} must be a non-negative number"),
                            Some(json!({ "index": i, "field": key })),
                        ))
                    }
                },
            }
        }
    }
    Ok(())
}

fn handle_marks_save(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = required_str(req, "examName") {
        return e;
    }
    if let Err(e) = validate_subject_entries(req) {
        return e;
    }
    let submission: ExamSubmission = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid submission: {e}"), None),
    };

    let student = match db::get_student(conn, &student_id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "student not found",
                Some(json!({ "studentId": student_id })),
            )
        }
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    let policy = match db::load_policy(conn) {
        Ok(p) => p,
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    let bands = match db::load_grade_bands(conn) {
        Ok(b) => b,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let record = compute_student_record(&student, &submission, &policy, &bands);
    match db::upsert_record(conn, &record) {
        Ok(saved) => ok(&req.id, json!({ "record": saved })),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "student_marks" })),
        ),
    }
}

fn handle_marks_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_name = match required_str(req, "examName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::get_record(conn, &student_id, &exam_name) {
        Ok(Some(record)) => ok(&req.id, json!({ "record": record })),
        Ok(None) => err(&req.id, "not_found", "marks record not found", None),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut filter = db::RecordFilter::default();
    for (key, slot) in [
        ("studentId", &mut filter.student_id),
        ("className", &mut filter.class_name),
        ("examName", &mut filter.exam_name),
    ] {
        match optional_str(req, key) {
            Ok(v) => *slot = v,
            Err(e) => return e,
        }
    }
    match db::list_records(conn, &filter) {
        Ok(records) => ok(&req.id, json!({ "records": records })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_marks_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_name = match required_str(req, "examName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::delete_record(conn, &student_id, &exam_name) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "marks record not found", None),
        Err(e) => db_err(req, "db_delete_failed", e),
    }
}

/// Re-run aggregation and grading over stored subject marks, e.g. after the
/// band table or policy changed.
fn handle_marks_recompute(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let exam_name = match optional_str(req, "examName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter = db::RecordFilter {
        exam_name,
        ..Default::default()
    };
    let records = match db::list_records(conn, &filter) {
        Ok(r) => r,
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    let students = match db::students_by_id(conn) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    let policy = match db::load_policy(conn) {
        Ok(p) => p,
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    let bands = match db::load_grade_bands(conn) {
        Ok(b) => b,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let mut recomputed = 0usize;
    let mut skipped: Vec<Value> = Vec::new();
    for rec in &records {
        let Some(student) = students.get(&rec.student_id) else {
            warn!(student_id = %rec.student_id, exam = %rec.exam_name, "recompute: student not found; record left as is");
            skipped.push(json!({ "studentId": rec.student_id, "examName": rec.exam_name }));
            continue;
        };
        let fresh = recompute_record(rec, student.main_subject_count, &policy, &bands);
        if let Err(e) = db::upsert_record(conn, &fresh) {
            return err(
                &req.id,
                "db_update_failed",
                format!("{e:#}"),
                Some(json!({ "studentId": rec.student_id, "examName": rec.exam_name, "recomputed": recomputed })),
            );
        }
        recomputed += 1;
    }
    info!(recomputed, skipped = skipped.len(), "marks recomputed");
    ok(
        &req.id,
        json!({ "recomputed": recomputed, "skipped": skipped }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "marks.save" => Some(handle_marks_save(state, req)),
        "marks.get" => Some(handle_marks_get(state, req)),
        "marks.list" => Some(handle_marks_list(state, req)),
        "marks.delete" => Some(handle_marks_delete(state, req)),
        "marks.recompute" => Some(handle_marks_recompute(state, req)),
        _ => None,
    }
}
