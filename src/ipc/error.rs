use serde_json::json;

use crate::engine::EngineError;

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

/// Handler-internal failure carrying its wire code, so fallible steps can
/// use `?`-style early returns before the response is built.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        HandlerErr {
            code: engine_error_code(&e),
            message: e.to_string(),
            details: None,
        }
    }
}

pub fn engine_error_code(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) => "bad_params",
        EngineError::Eligibility(_) => "not_eligible",
        EngineError::Conflict(_) => "conflict",
        EngineError::NotFound(_) => "not_found",
        EngineError::Dependency(_) => "db_query_failed",
    }
}
