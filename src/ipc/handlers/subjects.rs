use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::subjects::{resolve_subject_code, subject_display_name};
use serde_json::json;

fn handle_subjects_resolve(req: &Request) -> serde_json::Value {
    // Blank input is valid here: it resolves to nothing.
    let Some(raw) = req.params.get("raw").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing raw", None);
    };
    let code = resolve_subject_code(raw);
    ok(
        &req.id,
        json!({
            "raw": raw,
            "code": code,
            "name": code.map(subject_display_name),
        }),
    )
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.resolve" => Some(handle_subjects_resolve(req)),
        _ => None,
    }
}
