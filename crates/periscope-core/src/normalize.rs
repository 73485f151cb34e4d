//! # Event Normalizer
//!
//! The observed server sends records in two shapes. Some are flat
//! (`properties: { id, title, ... }`). Others nest the record one level down
//! (`properties: { info: { id, title, ... } }`). Message history entries use
//! the nested form (`{ info, parts }`).
//!
//! [`normalize_event`] resolves the shape once and produces a
//! [`NormalizedEvent`] with required fields already checked. It is a pure
//! function with no state.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{MessageInfo, Session, TokenUsage, ToolPart, UpstreamError, UNKNOWN_ERROR_TYPE};

/// A stream record after shape resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// `session.created`
    SessionCreated(Session),
    /// `session.updated`. Empty fields mean "not provided".
    SessionUpdated(Session),
    /// `session.deleted`
    SessionDeleted {
        /// Id of the removed session.
        id: String,
    },
    /// `message.created` / `message.updated`
    MessageUpdated(MessageInfo),
    /// `message.part.created` / `message.part.updated` for a tool part.
    ToolPartUpdated(ToolPart),
    /// `session.error` / `error`
    Error(UpstreamError),
}

impl NormalizedEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionCreated(_) => "session.created",
            Self::SessionUpdated(_) => "session.updated",
            Self::SessionDeleted { .. } => "session.deleted",
            Self::MessageUpdated(_) => "message.updated",
            Self::ToolPartUpdated(_) => "message.part.updated",
            Self::Error(_) => "error",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSession {
    id: Option<String>,
    slug: Option<String>,
    title: Option<String>,
    directory: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMessage {
    id: Option<String>,
    #[serde(rename = "sessionID")]
    session_id: Option<String>,
    role: Option<String>,
    #[serde(rename = "modelID")]
    model_id: Option<String>,
    #[serde(rename = "providerID")]
    provider_id: Option<String>,
    tokens: Option<RawTokens>,
    finish: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTokens {
    input: Option<u64>,
    output: Option<u64>,
    reasoning: Option<u64>,
    cache: Option<RawCache>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCache {
    read: Option<u64>,
    write: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPart {
    id: Option<String>,
    #[serde(rename = "messageID")]
    message_id: Option<String>,
    #[serde(rename = "sessionID")]
    session_id: Option<String>,
    #[serde(rename = "type")]
    part_type: Option<String>,
    tool: Option<String>,
    state: Option<RawPartState>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPartState {
    status: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry points
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize a `{ type, properties }` stream frame.
///
/// Returns `None` for unknown types and for payloads missing required fields.
pub fn normalize_event(frame: &Value) -> Option<NormalizedEvent> {
    let kind = frame.get("type")?.as_str()?;
    let props = frame.get("properties").unwrap_or(&Value::Null);

    match kind {
        "session.created" => session_from(nested_or_flat(props, "info")).map(NormalizedEvent::SessionCreated),
        "session.updated" => session_from(nested_or_flat(props, "info")).map(NormalizedEvent::SessionUpdated),
        "session.deleted" => {
            let id = session_from(nested_or_flat(props, "info"))
                .map(|s| s.id)
                .or_else(|| non_empty_str(props.get("sessionID")))?;
            Some(NormalizedEvent::SessionDeleted { id })
        }
        "message.created" | "message.updated" => {
            message_from(nested_or_flat(props, "info")).map(NormalizedEvent::MessageUpdated)
        }
        "message.part.created" | "message.part.updated" => {
            tool_part_from(nested_or_flat(props, "part")).map(NormalizedEvent::ToolPartUpdated)
        }
        "session.error" | "error" => Some(NormalizedEvent::Error(upstream_error_from(props))),
        _ => None,
    }
}

/// Normalize one element of a `GET /session` response.
pub fn session_from(value: &Value) -> Option<Session> {
    let raw = RawSession::deserialize(value).ok()?;
    let id = raw.id.filter(|id| !id.is_empty())?;
    Some(Session {
        id,
        slug: raw.slug.unwrap_or_default(),
        title: raw.title.unwrap_or_default(),
        directory: raw.directory.unwrap_or_default(),
    })
}

/// Normalize one element of a `GET /session/{id}/message` response.
///
/// Accepts both `{ info: {...}, parts: [...] }` and a bare message object.
pub fn message_entry_from(value: &Value) -> Option<MessageInfo> {
    message_from(nested_or_flat(value, "info"))
}

/// Prefer `value[key]` when it is an object, otherwise `value` itself.
pub fn nested_or_flat<'a>(value: &'a Value, key: &str) -> &'a Value {
    match value.get(key) {
        Some(nested) if nested.is_object() => nested,
        _ => value,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn message_from(value: &Value) -> Option<MessageInfo> {
    let raw = RawMessage::deserialize(value).ok()?;
    let id = raw.id.filter(|id| !id.is_empty())?;
    let role = raw.role.filter(|r| !r.is_empty())?;

    let tokens = raw.tokens.map(|t| {
        let cache = t.cache.unwrap_or_default();
        TokenUsage {
            input: t.input.unwrap_or(0),
            output: t.output.unwrap_or(0),
            reasoning: t.reasoning.unwrap_or(0),
            cache_read: cache.read.unwrap_or(0),
            cache_write: cache.write.unwrap_or(0),
        }
    });

    Some(MessageInfo {
        id,
        session_id: raw.session_id.unwrap_or_default(),
        role,
        model_id: raw.model_id.unwrap_or_default(),
        provider_id: raw.provider_id.unwrap_or_default(),
        tokens,
        finish: raw.finish.and_then(finish_marker),
    })
}

/// A completion marker is any non-null, non-false, non-empty value.
fn finish_marker(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn tool_part_from(value: &Value) -> Option<ToolPart> {
    let raw = RawPart::deserialize(value).ok()?;
    if raw.part_type.as_deref() != Some("tool") {
        return None;
    }
    Some(ToolPart {
        id: raw.id.filter(|id| !id.is_empty())?,
        message_id: raw.message_id.unwrap_or_default(),
        session_id: raw.session_id.unwrap_or_default(),
        tool: raw.tool.unwrap_or_default(),
        status: raw.state.and_then(|s| s.status).unwrap_or_default(),
    })
}

fn upstream_error_from(props: &Value) -> UpstreamError {
    let err = nested_or_flat(props, "error");
    let kind = non_empty_str(err.get("name"))
        .or_else(|| non_empty_str(err.get("type")))
        .unwrap_or_else(|| UNKNOWN_ERROR_TYPE.to_string());
    let message = err
        .get("data")
        .and_then(|d| non_empty_str(d.get("message")))
        .or_else(|| non_empty_str(err.get("message")))
        .unwrap_or_default();
    UpstreamError { kind, message }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
