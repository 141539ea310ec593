use serde::Serialize;
use serde_json::{json, Value};

use crate::error::SwitcherError;

/// Outcome of a job run: an HTTP-style status and a JSON body carrying at
/// least `message`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status_code: u16,
    pub body: Value,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            body: json!({ "message": message.into() }),
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            status_code: 200,
            body: json!({ "message": message.into(), "data": data }),
        }
    }

    /// The single place errors are reported.
    pub fn from_error(err: &SwitcherError) -> Self {
        let status_code = err.status_code();
        tracing::error!(error = %err, status_code, "job failed");
        metrics::counter!("job_failures_total").increment(1);

        Self {
            status_code,
            body: json!({ "message": err.to_string() }),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

pub fn respond(result: Result<Response, SwitcherError>) -> Response {
    result.unwrap_or_else(|e| Response::from_error(&e))
}
