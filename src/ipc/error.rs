use serde_json::json;

use crate::tracker::StartRejection;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// A start request that was understood but refused. Nothing changed.
pub fn rejected(id: &str, rejection: &StartRejection) -> serde_json::Value {
    err(
        id,
        "rejected",
        rejection.to_string(),
        Some(json!({ "reason": rejection.reason() })),
    )
}
