use crate::config::GradingPolicy;
use crate::db;
use crate::grading::{GradeBand, GradeBandTable};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{db_conn, db_err};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::info;

fn handle_bands_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::load_grade_bands(conn) {
        Ok(table) => ok(&req.id, json!({ "bands": table.bands() })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_bands_set(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("bands") else {
        return err(&req.id, "bad_params", "missing bands", None);
    };
    let bands: Vec<GradeBand> = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid bands: {e}"), None),
    };
    let table = match GradeBandTable::new(bands) {
        Ok(t) => t,
        Err(e) => return calc_err(&req.id, e),
    };
    if let Err(e) = db::replace_grade_bands(conn, &table) {
        return db_err(req, "db_update_failed", e);
    }
    info!(bands = table.bands().len(), "grade band table replaced");
    // Stored records keep their old grades until marks.recompute runs.
    ok(&req.id, json!({ "bands": table.bands() }))
}

fn handle_policy_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::load_policy(conn) {
        Ok(policy) => ok(&req.id, json!({ "policy": policy })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_policy_set(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("policy").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "missing policy object", None);
    };
    let policy: GradingPolicy = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid policy: {e}"), None),
    };
    if let Err(e) = policy.validate() {
        return calc_err(&req.id, e);
    }
    if let Err(e) = db::save_policy(conn, &policy) {
        return db_err(req, "db_update_failed", e);
    }
    info!(
        main_codes = ?policy.main_codes,
        optional_slots = policy.optional_slots,
        "grading policy updated"
    );
    ok(&req.id, json!({ "policy": policy }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grading.bands.list" => Some(handle_bands_list(state, req)),
        "grading.bands.set" => Some(handle_bands_set(state, req)),
        "grading.policy.get" => Some(handle_policy_get(state, req)),
        "grading.policy.set" => Some(handle_policy_set(state, req)),
        _ => None,
    }
}
