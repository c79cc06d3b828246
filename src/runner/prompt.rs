use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bail_runner;
use crate::error::RunnerResult;

#[derive(Deserialize, Debug, PartialEq)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct RunResponse {
    pub response: String,
}

pub(crate) const SCRIPT_FAILED: &str = "OpenManus script failed with error:";

impl PromptRequest {
    /// Only a body that is not JSON at all is "Invalid JSON". Any other shape without a usable
    /// prompt, including arrays, `null` and non-string prompts, is treated as a missing prompt.
    pub(crate) fn from_bytes(body: &[u8]) -> RunnerResult<Self> {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(_) => bail_runner!(StatusCode::BAD_REQUEST, "Invalid JSON"),
        };

        match value.get("prompt").and_then(Value::as_str) {
            Some(prompt) if !prompt.is_empty() => Ok(PromptRequest {
                prompt: prompt.to_string(),
            }),
            _ => bail_runner!(StatusCode::BAD_REQUEST, "Prompt is required"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpErrorResponse;

    fn rejection(body: &str) -> (StatusCode, HttpErrorResponse) {
        let err = PromptRequest::from_bytes(body.as_bytes()).unwrap_err();
        (err.status, err.message)
    }

    #[test]
    fn accepts_non_empty_prompt() {
        let request = PromptRequest::from_bytes(br#"{"prompt": "plan a trip", "extra": 1}"#).unwrap();
        assert_eq!(request.prompt, "plan a trip");
    }

    #[test]
    fn whitespace_prompt_is_not_empty() {
        assert_eq!(PromptRequest::from_bytes(br#"{"prompt": " "}"#).unwrap().prompt, " ");
    }

    #[test]
    fn malformed_json_is_rejected() {
        for body in ["", "{", "prompt=hi", "{\"prompt\": }"] {
            assert_eq!(
                rejection(body),
                (StatusCode::BAD_REQUEST, HttpErrorResponse::from("Invalid JSON"))
            );
        }
    }

    #[test]
    fn unusable_prompt_is_required() {
        for body in [
            "{}",
            r#"{"prompt": ""}"#,
            r#"{"prompt": null}"#,
            r#"{"prompt": 42}"#,
            r#"["prompt"]"#,
            "null",
        ] {
            assert_eq!(
                rejection(body),
                (StatusCode::BAD_REQUEST, HttpErrorResponse::from("Prompt is required"))
            );
        }
    }
}
