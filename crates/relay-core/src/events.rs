//! Typed job-progress events.
//!
//! A job runner emits a stream of [`JobEvent`]s terminating in exactly one
//! `complete` or `error`. The wire form is an internally-tagged JSON object
//! (`"type": "content"` etc.) with camelCase payload fields, matching what
//! clients consume.

use serde::{Deserialize, Serialize};

/// One event in a job's progress stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Incremental assistant text.
    #[serde(rename_all = "camelCase")]
    Content {
        /// Text delta.
        text: String,
    },

    /// The external tool started a tool invocation.
    #[serde(rename_all = "camelCase")]
    ToolUse {
        /// Tool name.
        tool_name: String,
        /// Correlation ID for the matching `tool_result`.
        tool_call_id: String,
        /// Tool arguments, when the provider surfaces them.
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<serde_json::Value>,
    },

    /// Result of a tool invocation.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Correlation ID back to the `tool_use` event.
        tool_call_id: String,
        /// Tool output (error text when `is_error`).
        output: String,
        /// Whether the tool failed.
        is_error: bool,
    },

    /// Terminal: the job finished successfully.
    Complete(Completion),

    /// Terminal: the job failed.
    Error(JobFailure),
}

/// Payload of a terminal `complete` event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Wall-clock duration of the job in milliseconds.
    pub duration_ms: u64,
    /// Tokens consumed, when the provider reports them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    /// Number of tool calls executed.
    pub tool_call_count: u32,
    /// Provider stop reason, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// The provider's own session/thread ID, for resuming provider-side
    /// context on a later prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_session_id: Option<String>,
    /// Final assistant summary text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Payload of a terminal `error` event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    /// Human-readable error description.
    pub error: String,
    /// Machine-readable code, when one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl JobEvent {
    /// Stable event-type string (the wire tag).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }

    /// Whether this event ends the job's stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }

    /// Build a `content` event.
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Build an `error` event with just a message.
    #[must_use]
    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::Error(JobFailure {
            error: message.into(),
            error_code: code.map(str::to_owned),
        })
    }
}

impl JobFailure {
    /// Build a failure payload.
    #[must_use]
    pub fn new(error: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            error: error.into(),
            error_code: code.map(str::to_owned),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_wire_form() {
        let event = JobEvent::content("hello");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["text"], "hello");
    }

    #[test]
    fn tool_use_wire_form() {
        let event = JobEvent::ToolUse {
            tool_name: "bash".into(),
            tool_call_id: "call_1".into(),
            arguments: Some(serde_json::json!({"command": "ls"})),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["toolName"], "bash");
        assert_eq!(json["toolCallId"], "call_1");
        assert_eq!(json["arguments"]["command"], "ls");
    }

    #[test]
    fn tool_use_omits_absent_arguments() {
        let event = JobEvent::ToolUse {
            tool_name: "read".into(),
            tool_call_id: "call_2".into(),
            arguments: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("arguments").is_none());
    }

    #[test]
    fn tool_result_wire_form() {
        let event = JobEvent::ToolResult {
            tool_call_id: "call_1".into(),
            output: "ok".into(),
            is_error: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["toolCallId"], "call_1");
        assert_eq!(json["isError"], false);
    }

    #[test]
    fn complete_wire_form() {
        let event = JobEvent::Complete(Completion {
            duration_ms: 1200,
            token_count: Some(42),
            tool_call_count: 3,
            stop_reason: Some("end_turn".into()),
            provider_session_id: Some("thread_9".into()),
            summary: Some("done".into()),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["durationMs"], 1200);
        assert_eq!(json["tokenCount"], 42);
        assert_eq!(json["toolCallCount"], 3);
        assert_eq!(json["stopReason"], "end_turn");
        assert_eq!(json["providerSessionId"], "thread_9");
    }

    #[test]
    fn error_wire_form() {
        let event = JobEvent::error("boom", Some("RUNNER_PROTOCOL"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "boom");
        assert_eq!(json["errorCode"], "RUNNER_PROTOCOL");
    }

    #[test]
    fn error_without_code_omits_field() {
        let event = JobEvent::error("boom", None);
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("errorCode").is_none());
    }

    #[test]
    fn terminal_classification() {
        assert!(!JobEvent::content("x").is_terminal());
        assert!(JobEvent::Complete(Completion::default()).is_terminal());
        assert!(JobEvent::error("x", None).is_terminal());
    }

    #[test]
    fn event_type_strings() {
        assert_eq!(JobEvent::content("x").event_type(), "content");
        assert_eq!(
            JobEvent::Complete(Completion::default()).event_type(),
            "complete"
        );
        assert_eq!(JobEvent::error("x", None).event_type(), "error");
    }

    #[test]
    fn deserialize_roundtrip() {
        let events = vec![
            JobEvent::content("a"),
            JobEvent::ToolUse {
                tool_name: "write".into(),
                tool_call_id: "c1".into(),
                arguments: None,
            },
            JobEvent::ToolResult {
                tool_call_id: "c1".into(),
                output: "wrote".into(),
                is_error: false,
            },
            JobEvent::Complete(Completion {
                duration_ms: 10,
                ..Completion::default()
            }),
            JobEvent::error("bad", Some("E1")),
        ];
        for event in &events {
            let json = serde_json::to_string(event).unwrap();
            let back: JobEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, event);
        }
    }
}
