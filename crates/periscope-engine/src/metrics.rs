//! Metric name constants.
//!
//! Every series the engine emits is named here so the engine, the sinks, and
//! tests agree on spelling.

/// Sessions observed for the first time (counter, no labels).
pub const SESSIONS_CREATED_TOTAL: &str = "opencode_sessions_created_total";
/// Completed assistant messages (counter, labels: role, model, provider, source).
pub const MESSAGES_TOTAL: &str = "opencode_messages_total";
/// Tokens consumed (counter, labels: type, model, provider, source).
pub const TOKENS_TOTAL: &str = "opencode_tokens_total";
/// Tool invocations reaching a terminal status (counter, labels: tool, status).
pub const TOOL_CALLS_TOTAL: &str = "opencode_tool_calls_total";
/// Errors observed (counter, labels: type).
pub const ERRORS_TOTAL: &str = "opencode_errors_total";
/// Currently known sessions (up/down counter, no labels).
pub const SESSIONS_ACTIVE: &str = "opencode_sessions_active";
/// Observed server reachability (gauge, labels: instance). 1 = reachable.
pub const UP: &str = "opencode_up";
/// One row per known session (info gauge, labels: `session_id`, slug, title, directory, instance).
pub const SESSION_INFO: &str = "opencode_session_info";
/// One row per retained error (info gauge, labels: type, message, source, timestamp).
pub const ERROR_INFO: &str = "opencode_error_info";
