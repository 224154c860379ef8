use crate::calc::Student;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, optional_bool, optional_str, optional_usize, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

const MAIN_SUBJECT_COUNTS: [usize; 2] = [3, 6];

/// Roll numbers arrive as strings or bare integers.
fn roll_no_param(req: &Request) -> Result<Option<String>, Value> {
    match req.params.get("rollNo") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            "rollNo must be a string or number",
            None,
        )),
    }
}

fn main_subject_count_param(req: &Request) -> Result<Option<usize>, Value> {
    let n = optional_usize(req, "mainSubjectCount")?;
    match n {
        Some(n) if !MAIN_SUBJECT_COUNTS.contains(&n) => Err(err(
            &req.id,
            "bad_params",
            "mainSubjectCount must be 3 or 6",
            Some(json!({ "mainSubjectCount": n })),
        )),
        _ => Ok(n),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_name = match optional_str(req, "className") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::list_students(conn, class_name.as_deref()) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::get_student(conn, &student_id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_class = match required_str(req, "studentClass") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let roll_no = match roll_no_param(req) {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e,
    };
    let section = match optional_str(req, "section") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let main_subject_count = match main_subject_count_param(req) {
        Ok(v) => v.unwrap_or(6),
        Err(e) => return e,
    };
    let active = match optional_bool(req, "active", true) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match db::get_student(conn, &student_id) {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "bad_params",
                "studentId already exists",
                Some(json!({ "studentId": student_id })),
            )
        }
        Ok(None) => {}
        Err(e) => return db_err(req, "db_query_failed", e),
    }

    let student = Student {
        id: Uuid::new_v4().to_string(),
        student_id,
        name,
        roll_no,
        student_class,
        section,
        main_subject_count,
        active,
    };
    if let Err(e) = db::insert_student(conn, &student) {
        return err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "students" })),
        );
    }
    info!(student_id = %student.student_id, class = %student.student_class, "student created");
    ok(&req.id, json!({ "student": student }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut student = match db::get_student(conn, &student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    // Only fields present in params change.
    match optional_str(req, "name") {
        Ok(Some(v)) => student.name = v,
        Ok(None) => {}
        Err(e) => return e,
    }
    match optional_str(req, "studentClass") {
        Ok(Some(v)) => student.student_class = v,
        Ok(None) => {}
        Err(e) => return e,
    }
    match roll_no_param(req) {
        Ok(Some(v)) => student.roll_no = v,
        Ok(None) => {}
        Err(e) => return e,
    }
    if req.params.get("section").is_some() {
        match optional_str(req, "section") {
            Ok(v) => student.section = v,
            Err(e) => return e,
        }
    }
    match main_subject_count_param(req) {
        Ok(Some(v)) => student.main_subject_count = v,
        Ok(None) => {}
        Err(e) => return e,
    }
    match optional_bool(req, "active", student.active) {
        Ok(v) => student.active = v,
        Err(e) => return e,
    }

    match db::update_student(conn, &student) {
        Ok(_) => ok(&req.id, json!({ "student": student })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            format!("{e:#}"),
            Some(json!({ "table": "students" })),
        ),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::delete_student(conn, &student_id) {
        Ok(true) => {
            info!(student_id = %student_id, "student deleted with their marks records");
            ok(&req.id, json!({ "ok": true }))
        }
        Ok(false) => err(&req.id, "not_found", "student not found", None),
        Err(e) => db_err(req, "db_delete_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
