use crate::calc::StudentMarksRecord;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, optional_bool, optional_str, optional_usize, rank_by, required_str};
use crate::ipc::types::{AppState, Request};
use crate::ranking::RankingKey;
use crate::reports::{build_class_tabulation, build_merit_list, build_result_card, combine_tabulations};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::info;

const DEFAULT_MERIT_LIST_SIZE: usize = 10;

fn handle_merit_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_name = match required_str(req, "className") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_name = match required_str(req, "examName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let top_n = match optional_usize(req, "topN") {
        Ok(v) => v.unwrap_or(DEFAULT_MERIT_LIST_SIZE),
        Err(e) => return e,
    };
    let key = match rank_by(req, RankingKey::Percentage) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let require_match = match optional_bool(req, "requireMatch", false) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let filter = db::RecordFilter {
        class_name: Some(class_name.clone()),
        exam_name: Some(exam_name.clone()),
        ..Default::default()
    };
    let records = match db::list_records(conn, &filter) {
        Ok(r) => r,
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    if records.is_empty() && require_match {
        return err(
            &req.id,
            "not_found",
            "no marks records for class and exam",
            Some(json!({ "className": class_name, "examName": exam_name })),
        );
    }
    let students = match db::students_by_id(conn) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let entries = build_merit_list(&records, &students, key, top_n);
    info!(class = %class_name, exam = %exam_name, entries = entries.len(), "merit list built");
    ok(
        &req.id,
        json!({
            "className": class_name,
            "examName": exam_name,
            "rankBy": key.as_str(),
            "entries": entries,
        }),
    )
}

/// Explicit `classNames`, else the single `className`, else every class with
/// records for the exam.
fn tabulation_classes(
    req: &Request,
    conn: &rusqlite::Connection,
    exam_name: &str,
    education_year: Option<&str>,
) -> Result<Vec<String>, Value> {
    if let Some(raw) = req.params.get("classNames").filter(|v| !v.is_null()) {
        let Some(list) = raw.as_array() else {
            return Err(err(&req.id, "bad_params", "classNames must be an array", None));
        };
        let mut names = Vec::with_capacity(list.len());
        for v in list {
            match v.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => names.push(s.to_string()),
                None => {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        "classNames entries must be non-empty strings",
                        None,
                    ))
                }
            }
        }
        return Ok(names);
    }
    if let Some(name) = optional_str(req, "className")? {
        return Ok(vec![name]);
    }
    db::list_exam_classes(conn, exam_name, education_year)
        .map_err(|e| db_err(req, "db_query_failed", e))
}

/// Keeps a fallback match from pulling in rows that belong to another class
/// of the same sheet. Records of another requested class are dropped, and a
/// student already placed in an earlier class is not placed again.
fn claim_records(
    found: Vec<StudentMarksRecord>,
    class_name: &str,
    class_names: &[String],
    claimed: &mut HashSet<String>,
) -> Vec<StudentMarksRecord> {
    let records: Vec<StudentMarksRecord> = found
        .into_iter()
        .filter(|r| {
            r.class_name == class_name
                || !class_names.iter().any(|c| c == &r.class_name)
        })
        .filter(|r| !claimed.contains(&r.student_id))
        .collect();
    claimed.extend(records.iter().map(|r| r.student_id.clone()));
    records
}

fn handle_tabulation(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let exam_name = match required_str(req, "examName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let education_year = match optional_str(req, "educationYear") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let key = match rank_by(req, RankingKey::TotalObtained) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let class_names = match tabulation_classes(req, conn, &exam_name, education_year.as_deref()) {
        Ok(v) => v,
        Err(e) => return e,
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

    let mut classes = Vec::with_capacity(class_names.len());
    let mut claimed: HashSet<String> = HashSet::new();
    for class_name in &class_names {
        let found = match db::find_class_exam_marks(
            conn,
            class_name,
            &exam_name,
            education_year.as_deref(),
        ) {
            Ok(r) => r,
            Err(e) => return db_err(req, "db_query_failed", e),
        };
        let records = claim_records(found, class_name, &class_names, &mut claimed);
        classes.push(build_class_tabulation(
            class_name, &exam_name, &records, &students, &bands, &policy, key,
        ));
    }
    let combined = combine_tabulations(classes, key);
    info!(
        exam = %exam_name,
        classes = combined.classes.len(),
        students = combined.grand_total.student_count,
        "tabulation sheet built"
    );

    ok(
        &req.id,
        json!({
            "examName": exam_name,
            "educationYear": education_year,
            "tabulation": combined,
        }),
    )
}

fn handle_result_card(state: &mut AppState, req: &Request) -> Value {
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

    let current = match db::get_record(conn, &student_id, &exam_name) {
        Ok(Some(r)) => r,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "marks record not found",
                Some(json!({ "studentId": student_id, "examName": exam_name })),
            )
        }
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    let filter = db::RecordFilter {
        student_id: Some(student_id),
        ..Default::default()
    };
    let history = match db::list_records(conn, &filter) {
        Ok(r) => r,
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

    let card = build_result_card(&current, &history, &bands, &policy);
    ok(&req.id, json!({ "card": card }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "results.meritList" => Some(handle_merit_list(state, req)),
        "results.tabulation" => Some(handle_tabulation(state, req)),
        "results.resultCard" => Some(handle_result_card(state, req)),
        _ => None,
    }
}
