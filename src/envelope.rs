//! The uniform JSON body every endpoint answers with.
//!
//! ```json
//! {"output": {"id": "…", "name": "…", "email": "…"}, "errorMessages": {}}
//! {"output": null, "errorMessages": {"message": "User not found"}}
//! ```

use std::collections::BTreeMap;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::response::Response;

/// Served when the envelope itself cannot be serialised.
const FALLBACK: &[u8] = br#"{"output":null,"errorMessages":{"message":"Internal Server Error"}}"#;

#[derive(Debug, Deserialize, Serialize)]
pub struct Envelope<T> {
    pub output: Option<T>,
    #[serde(rename = "errorMessages")]
    pub error_messages: BTreeMap<String, String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(output: T) -> Self {
        Self { output: Some(output), error_messages: BTreeMap::new() }
    }
}

impl Envelope<()> {
    pub fn error(message: impl Into<String>) -> Self {
        let mut error_messages = BTreeMap::new();
        error_messages.insert("message".to_owned(), message.into());
        Self { output: None, error_messages }
    }
}

/// `status` with `payload` wrapped as the envelope's `output`.
pub fn respond_json<T: Serialize>(status: StatusCode, payload: T) -> Response {
    encode(status, &Envelope::ok(payload))
}

/// `status` with `{"message": message}` in `errorMessages`.
pub fn respond_error(status: StatusCode, message: &str) -> Response {
    encode(status, &Envelope::error(message))
}

fn encode<T: Serialize>(status: StatusCode, envelope: &Envelope<T>) -> Response {
    match serde_json::to_vec(envelope) {
        Ok(body) => Response::json(status, body),
        Err(e) => {
            error!("failed to serialise response envelope: {e}");
            Response::json(StatusCode::INTERNAL_SERVER_ERROR, FALLBACK)
        }
    }
}
