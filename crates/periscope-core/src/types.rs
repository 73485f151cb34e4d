//! Canonical record shapes shared by the engine and its containers.
//!
//! Raw payloads from the observed server are parsed into these types by
//! [`crate::normalize`]. Nothing downstream of normalization ever looks at
//! raw JSON again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role that makes a message eligible for token accounting.
pub const ASSISTANT_ROLE: &str = "assistant";

/// Fallback error category when the upstream does not provide one.
pub const UNKNOWN_ERROR_TYPE: &str = "unknown";

/// Error category recorded for transport failures.
pub const CONNECTION_ERROR_TYPE: &str = "connection";

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A top-level tracked unit of work.
///
/// Display fields default to the empty string. An empty field means
/// "unknown", never "cleared".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable external identifier.
    pub id: String,
    /// Short human-readable slug.
    pub slug: String,
    /// Session title.
    pub title: String,
    /// Working directory the session runs in.
    pub directory: String,
}

impl Session {
    /// Create a session with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Overwrite display fields with the non-empty fields of `incoming`.
    ///
    /// Returns `true` if any field changed.
    pub fn merge_from(&mut self, incoming: &Session) -> bool {
        let mut changed = false;
        for (dst, src) in [
            (&mut self.slug, &incoming.slug),
            (&mut self.title, &incoming.title),
            (&mut self.directory, &incoming.directory),
        ] {
            if !src.is_empty() && *dst != *src {
                dst.clone_from(src);
                changed = true;
            }
        }
        changed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Token counts reported for a single message. Absent counts are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input: u64,
    /// Completion tokens.
    pub output: u64,
    /// Reasoning tokens.
    pub reasoning: u64,
    /// Tokens served from the provider's prompt cache.
    pub cache_read: u64,
    /// Tokens written into the provider's prompt cache.
    pub cache_write: u64,
}

impl TokenUsage {
    /// `(label, count)` pairs in emission order.
    pub fn by_kind(&self) -> [(&'static str, u64); 5] {
        [
            ("input", self.input),
            ("output", self.output),
            ("reasoning", self.reasoning),
            ("cache_read", self.cache_read),
            ("cache_write", self.cache_write),
        ]
    }

    /// Sum of every kind.
    pub fn total(&self) -> u64 {
        self.by_kind().iter().map(|(_, n)| n).sum()
    }
}

/// Canonical message record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    /// Message id.
    pub id: String,
    /// Owning session id (may be empty when the payload omits it).
    pub session_id: String,
    /// `user`, `assistant`, ...
    pub role: String,
    /// Model identifier.
    pub model_id: String,
    /// Provider identifier.
    pub provider_id: String,
    /// Token usage, when reported.
    pub tokens: Option<TokenUsage>,
    /// Completion marker. Present only once the message is finished.
    pub finish: Option<String>,
}

impl MessageInfo {
    /// Whether this message contributes to message and token counters.
    ///
    /// Requires an assistant role, a completion marker, and token data.
    pub fn is_countable(&self) -> bool {
        self.role == ASSISTANT_ROLE && self.finish.is_some() && self.tokens.is_some()
    }

    /// Ledger key for at-most-once accounting.
    pub fn dedup_key(&self) -> String {
        format!("{}-{}", self.id, self.role)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool parts
// ─────────────────────────────────────────────────────────────────────────────

/// A tool invocation part attached to a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPart {
    /// Part id.
    pub id: String,
    /// Owning message id.
    pub message_id: String,
    /// Owning session id.
    pub session_id: String,
    /// Tool name.
    pub tool: String,
    /// `pending`, `running`, `completed`, or `error`.
    pub status: String,
}

impl ToolPart {
    /// Terminal statuses are the only ones counted.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "error")
    }

    /// Tool ledger key: one count per part and terminal status.
    pub fn dedup_key(&self) -> String {
        format!("{}-{}", self.id, self.status)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// An error reported by the observed server itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamError {
    /// Category code.
    pub kind: String,
    /// Free-text description.
    pub message: String,
}

/// One retained error, stamped at capture time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObservation {
    /// When the sidecar captured the error.
    pub timestamp: DateTime<Utc>,
    /// Category code (`connection`, upstream name, or `unknown`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Full message text. Truncated only at emission time.
    pub message: String,
    /// Instance identifier of the observer.
    pub source: String,
}

impl ErrorObservation {
    /// Create an observation stamped with the current time.
    pub fn now(kind: impl Into<String>, message: impl Into<String>, source: impl Into<String>) -> Self {
        Self::at(Utc::now(), kind, message, source)
    }

    /// Create an observation with an explicit capture time.
    pub fn at(
        timestamp: DateTime<Utc>,
        kind: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let kind = kind.into();
        Self {
            timestamp,
            kind: if kind.is_empty() {
                UNKNOWN_ERROR_TYPE.to_string()
            } else {
                kind
            },
            message: message.into(),
            source: source.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
