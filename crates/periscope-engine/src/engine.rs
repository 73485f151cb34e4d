//! # Reconciliation engine
//!
//! Owns the entity registry, dedup ledger, and error buffer, and turns
//! snapshots and stream events into metric updates.
//!
//! One connection cycle runs:
//!
//! ```text
//! health check → reset membership → backfill (historical)
//!     → spawn re-poll task (live) → consume /event (live) → StreamEnded
//! ```
//!
//! All state lives behind a single mutex. Each mutation and the metric
//! updates it implies happen under one lock acquisition, and the lock is
//! never held across an `.await`, so the stream consumer and the poll task
//! can never both account for the same dedup key.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use periscope_client::{ClientError, OpencodeClient};
use periscope_core::normalize::{message_entry_from, normalize_event, session_from};
use periscope_core::registry::Upsert;
use periscope_core::text::{MAX_ERROR_MESSAGE_CHARS, truncate_chars};
use periscope_core::{
    BackoffConfig, CONNECTION_ERROR_TYPE, DedupLedger, EntityRegistry, ErrorBuffer, ErrorObservation, MessageInfo,
    NormalizedEvent, Session, ToolPart,
};
use periscope_settings::PeriscopeSettings;
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::CycleError;
use crate::metrics::{
    ERROR_INFO, ERRORS_TOTAL, MESSAGES_TOTAL, SESSION_INFO, SESSIONS_ACTIVE, SESSIONS_CREATED_TOTAL, TOKENS_TOTAL,
    TOOL_CALLS_TOTAL, UP,
};
use crate::poll::spawn_poll_task;
use crate::sink::{Label, MetricsSink};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Provenance label attached to message and token counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// Counted during backfill at connection start.
    Historical,
    /// Counted from the event stream or the periodic re-poll.
    Live,
}

impl Source {
    /// Label value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::Live => "live",
        }
    }
}

/// Engine parameters, resolved from settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Instance identifier for liveness, session-info, and error rows.
    pub instance: String,
    /// Surface swallowed poll failures at `warn` instead of `debug`.
    pub verbose: bool,
    /// Re-poll period.
    pub poll_interval: Duration,
    /// Reconnect backoff.
    pub reconnect: BackoffConfig,
    /// Dedup ledger capacity.
    pub ledger_capacity: usize,
    /// Error buffer count cap.
    pub error_capacity: usize,
    /// Error buffer retention window in seconds.
    pub error_retention_secs: i64,
}

impl EngineConfig {
    /// Derive engine parameters from loaded settings.
    pub fn from_settings(settings: &PeriscopeSettings) -> Self {
        Self {
            instance: settings.instance.clone(),
            verbose: settings.verbose,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            reconnect: settings.reconnect,
            ledger_capacity: settings.limits.ledger_capacity,
            error_capacity: settings.limits.error_capacity,
            error_retention_secs: settings.limits.error_retention_secs,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&PeriscopeSettings::default())
    }
}

/// Outcome of one snapshot pass (backfill or re-poll).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Sessions listed by the server.
    pub sessions: usize,
    /// Sessions that were not yet registered.
    pub new_sessions: usize,
    /// Messages newly accounted for.
    pub messages_counted: usize,
    /// Sessions whose message history could not be fetched.
    pub skipped_sessions: usize,
}

/// Point-in-time view of engine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineStats {
    /// Registered sessions.
    pub sessions: usize,
    /// Message keys held by the dedup ledger.
    pub ledger_keys: usize,
    /// Tool-part keys, tracked apart so tool traffic never evicts messages.
    pub tool_keys: usize,
    /// Retained error observations (before pruning).
    pub errors: usize,
    /// Consecutive failed connection attempts.
    pub attempt: u32,
    /// Whether the last health check succeeded.
    pub up: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

struct State {
    registry: EntityRegistry,
    ledger: DedupLedger,
    tool_ledger: DedupLedger,
    errors: ErrorBuffer,
}

/// The reconciliation engine.
pub struct Engine {
    client: OpencodeClient,
    sink: Arc<dyn MetricsSink>,
    config: EngineConfig,
    state: Mutex<State>,
    attempt: AtomicU32,
    up: AtomicBool,
}

impl Engine {
    /// Create an engine with empty state.
    pub fn new(client: OpencodeClient, sink: Arc<dyn MetricsSink>, config: EngineConfig) -> Self {
        let state = State {
            registry: EntityRegistry::new(),
            ledger: DedupLedger::with_capacity(config.ledger_capacity),
            tool_ledger: DedupLedger::with_capacity(config.ledger_capacity),
            errors: ErrorBuffer::with_limits(config.error_capacity, config.error_retention_secs),
        };
        Self {
            client,
            sink,
            config,
            state: Mutex::new(state),
            attempt: AtomicU32::new(0),
            up: AtomicBool::new(false),
        }
    }

    /// Engine parameters.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one full connection cycle.
    ///
    /// Returns `Ok(())` only when `cancel` fires. Otherwise the cycle ends
    /// with an error, including [`CycleError::StreamEnded`] when the server
    /// closes the stream.
    pub async fn connect_and_listen(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), CycleError> {
        self.check_health().await?;

        let cleared = self.reset_membership();
        let report = self.backfill().await?;
        info!(
            sessions = report.sessions,
            cleared,
            messages = report.messages_counted,
            skipped = report.skipped_sessions,
            "backfill complete"
        );

        let poll_token = cancel.child_token();
        let poll = spawn_poll_task(Arc::clone(self), self.config.poll_interval, poll_token.clone());
        let result = {
            let _stop_poll = poll_token.drop_guard();
            self.consume_stream(cancel).await
        };
        if let Err(e) = poll.await {
            warn!(error = %e, "poll task did not exit cleanly");
        }
        result
    }

    /// Probe `GET /global/health`.
    ///
    /// On success the attempt counter resets and liveness goes to 1.
    pub async fn check_health(&self) -> Result<(), CycleError> {
        let health = self.client.health().await?;
        if !health.healthy {
            return Err(CycleError::Unhealthy {
                version: health.version,
            });
        }
        self.attempt.store(0, Ordering::SeqCst);
        self.set_up(true);
        info!(version = %health.version, "observed server healthy");
        Ok(())
    }

    /// Forget every registered session and take them off the active gauge.
    ///
    /// The ledger and error buffer survive so replayed data is not
    /// re-counted. Returns how many sessions were cleared.
    pub fn reset_membership(&self) -> usize {
        let mut state = self.state.lock();
        let cleared = state.registry.clear();
        if cleared > 0 {
            self.sink.add_updown(SESSIONS_ACTIVE, &[], -as_delta(cleared));
        }
        cleared
    }

    /// Register every listed session and account its message history with
    /// `source="historical"`.
    ///
    /// Every listed session counts as a creation, including ones that
    /// survived a reconnect.
    pub async fn backfill(&self) -> Result<SyncReport, CycleError> {
        Ok(self.sync_snapshot(Source::Historical).await?)
    }

    /// One re-poll pass: register unknown sessions, refresh metadata, and
    /// account newly completed messages with `source="live"`.
    pub async fn poll_once(&self) -> Result<SyncReport, ClientError> {
        self.sync_snapshot(Source::Live).await
    }

    /// Parse one `data:` payload and dispatch it. Malformed payloads are
    /// skipped.
    pub fn handle_frame(&self, payload: &str) {
        match serde_json::from_str::<Value>(payload) {
            Ok(frame) => self.handle_event(&frame, Source::Live),
            Err(e) => debug!(error = %e, "skipping malformed event frame"),
        }
    }

    /// Normalize a `{ type, properties }` record and apply it.
    pub fn handle_event(&self, raw: &Value, source: Source) {
        let Some(event) = normalize_event(raw) else {
            let event_type = raw.get("type").and_then(Value::as_str).unwrap_or_default();
            trace!(event_type, "ignoring event");
            return;
        };
        trace!(kind = event.kind(), "applying event");

        let mut state = self.state.lock();
        match event {
            NormalizedEvent::SessionCreated(session) | NormalizedEvent::SessionUpdated(session) => {
                if self.register(&mut state, session).is_new() {
                    self.sink.add_counter(SESSIONS_CREATED_TOTAL, &[], 1);
                }
            }
            NormalizedEvent::SessionDeleted { id } => {
                if state.registry.remove(&id).is_some() {
                    self.sink.add_updown(SESSIONS_ACTIVE, &[], -1);
                }
            }
            NormalizedEvent::MessageUpdated(message) => {
                let _ = self.count_message(&mut state, &message, source);
            }
            NormalizedEvent::ToolPartUpdated(part) => self.count_tool_part(&mut state, &part),
            NormalizedEvent::Error(err) => self.record_error(&mut state, &err.kind, err.message),
        }
    }

    /// Account a failed cycle and return how long to wait before retrying.
    ///
    /// Marks the server unreachable, records a `connection` error, and bumps
    /// the attempt counter. The delay grows from the attempt count before
    /// the bump, so the first retry waits the base delay.
    pub fn record_failure(&self, err: &CycleError) -> Duration {
        self.set_up(false);
        {
            let mut state = self.state.lock();
            self.record_error(&mut state, CONNECTION_ERROR_TYPE, err.to_string());
        }
        let attempt = self
            .attempt
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |a| Some(a.saturating_add(1)))
            .unwrap_or_else(|a| a);
        self.config.reconnect.delay_for(attempt)
    }

    /// Publish the session-info and error-info rows.
    ///
    /// Expired errors are pruned first. Error messages are truncated here,
    /// not when they are recorded.
    pub fn emit_snapshots(&self) {
        self.emit_snapshots_at(Utc::now());
    }

    /// [`Engine::emit_snapshots`] with an explicit clock for the retention window.
    pub fn emit_snapshots_at(&self, now: DateTime<Utc>) {
        let (sessions, errors) = {
            let mut state = self.state.lock();
            let sessions: Vec<Vec<Label>> = state
                .registry
                .iter()
                .map(|s| {
                    vec![
                        ("session_id", s.id.clone()),
                        ("slug", s.slug.clone()),
                        ("title", s.title.clone()),
                        ("directory", s.directory.clone()),
                        ("instance", self.config.instance.clone()),
                    ]
                })
                .collect();
            let errors: Vec<Vec<Label>> = state
                .errors
                .snapshot(now)
                .into_iter()
                .map(|e| {
                    vec![
                        ("type", e.kind),
                        ("message", truncate_chars(&e.message, MAX_ERROR_MESSAGE_CHARS).to_string()),
                        ("source", e.source),
                        ("timestamp", e.timestamp.to_rfc3339()),
                    ]
                })
                .collect();
            (sessions, errors)
        };
        self.sink.publish_info(SESSION_INFO, sessions);
        self.sink.publish_info(ERROR_INFO, errors);
    }

    /// Current state sizes and connection status.
    pub fn stats(&self) -> EngineStats {
        let state = self.state.lock();
        EngineStats {
            sessions: state.registry.len(),
            ledger_keys: state.ledger.len(),
            tool_keys: state.tool_ledger.len(),
            errors: state.errors.len(),
            attempt: self.attempt.load(Ordering::SeqCst),
            up: self.up.load(Ordering::SeqCst),
        }
    }

    /// Look up a registered session.
    pub fn session(&self, id: &str) -> Option<Session> {
        self.state.lock().registry.get(id).cloned()
    }

    // ── internals ────────────────────────────────────────────────────────

    async fn consume_stream(&self, cancel: &CancellationToken) -> Result<(), CycleError> {
        let mut frames = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            opened = self.client.event_stream() => opened?,
        };
        info!("event stream connected");
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                next = frames.next() => match next {
                    Some(Ok(payload)) => self.handle_frame(&payload),
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(CycleError::StreamEnded),
                },
            }
        }
    }

    async fn sync_snapshot(&self, source: Source) -> Result<SyncReport, ClientError> {
        let listed = self.client.list_sessions().await?;
        let sessions: Vec<Session> = listed.iter().filter_map(session_from).collect();
        let mut report = SyncReport {
            sessions: sessions.len(),
            ..SyncReport::default()
        };

        {
            let mut state = self.state.lock();
            for session in &sessions {
                let outcome = self.register(&mut state, session.clone());
                if outcome.is_new() {
                    report.new_sessions += 1;
                }
                if outcome.is_new() || source == Source::Historical {
                    self.sink.add_counter(SESSIONS_CREATED_TOTAL, &[], 1);
                }
            }
        }

        for session in &sessions {
            let entries = match self.client.session_messages(&session.id).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(session_id = %session.id, error = %e, "skipping session history");
                    report.skipped_sessions += 1;
                    continue;
                }
            };
            let mut state = self.state.lock();
            for message in entries.iter().filter_map(message_entry_from) {
                if self.count_message(&mut state, &message, source) {
                    report.messages_counted += 1;
                }
            }
        }

        Ok(report)
    }

    fn register(&self, state: &mut State, session: Session) -> Upsert {
        let outcome = state.registry.upsert(session);
        if outcome.is_new() {
            self.sink.add_updown(SESSIONS_ACTIVE, &[], 1);
        }
        outcome
    }

    fn count_message(&self, state: &mut State, message: &MessageInfo, source: Source) -> bool {
        if !message.is_countable() || !state.ledger.check_and_insert(&message.dedup_key()) {
            return false;
        }

        self.sink.add_counter(
            MESSAGES_TOTAL,
            &[
                ("role", message.role.clone()),
                ("model", message.model_id.clone()),
                ("provider", message.provider_id.clone()),
                ("source", source.as_str().to_string()),
            ],
            1,
        );
        if let Some(tokens) = message.tokens {
            for (kind, count) in tokens.by_kind() {
                if count == 0 {
                    continue;
                }
                self.sink.add_counter(
                    TOKENS_TOTAL,
                    &[
                        ("type", kind.to_string()),
                        ("model", message.model_id.clone()),
                        ("provider", message.provider_id.clone()),
                        ("source", source.as_str().to_string()),
                    ],
                    count,
                );
            }
        }
        true
    }

    fn count_tool_part(&self, state: &mut State, part: &ToolPart) {
        if !part.is_terminal() || !state.tool_ledger.check_and_insert(&part.dedup_key()) {
            return;
        }
        self.sink.add_counter(
            TOOL_CALLS_TOTAL,
            &[("tool", part.tool.clone()), ("status", part.status.clone())],
            1,
        );
    }

    fn record_error(&self, state: &mut State, kind: &str, message: String) {
        let observation = ErrorObservation::now(kind, message, self.config.instance.clone());
        self.sink.add_counter(ERRORS_TOTAL, &[("type", observation.kind.clone())], 1);
        state.errors.push(observation);
    }

    fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
        self.sink.set_gauge(
            UP,
            &[("instance", self.config.instance.clone())],
            if up { 1.0 } else { 0.0 },
        );
    }
}

fn as_delta(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde_json::json;

    fn engine() -> (Engine, Arc<MemorySink>) {
        engine_with(EngineConfig::default())
    }

    fn engine_with(config: EngineConfig) -> (Engine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        // Never contacted by these tests.
        let client = OpencodeClient::new("http://127.0.0.1:9").unwrap();
        (Engine::new(client, sink.clone(), config), sink)
    }

    fn session_event(kind: &str, props: Value) -> Value {
        json!({"type": kind, "properties": props})
    }

    fn assistant_message(id: &str, input: u64, output: u64) -> Value {
        json!({
            "type": "message.updated",
            "properties": {"info": {
                "id": id, "sessionID": "ses_1", "role": "assistant",
                "modelID": "claude-x", "providerID": "anthropic",
                "tokens": {"input": input, "output": output, "reasoning": 0, "cache": {"read": 0, "write": 0}},
                "finish": "stop"
            }}
        })
    }

    // ── sessions ─────────────────────────────────────────────────────────

    #[test]
    fn session_lifecycle_tracks_gauge() {
        let (engine, sink) = engine();
        engine.handle_event(&session_event("session.created", json!({"info": {"id": "ses_1"}})), Source::Live);
        engine.handle_event(&session_event("session.created", json!({"info": {"id": "ses_1"}})), Source::Live);
        engine.handle_event(&session_event("session.created", json!({"id": "ses_2"})), Source::Live);
        assert_eq!(sink.updown(SESSIONS_ACTIVE, &[]), 2);
        assert_eq!(sink.counter(SESSIONS_CREATED_TOTAL, &[]), 2);

        engine.handle_event(&session_event("session.deleted", json!({"info": {"id": "ses_1"}})), Source::Live);
        engine.handle_event(&session_event("session.deleted", json!({"info": {"id": "ses_1"}})), Source::Live);
        engine.handle_event(&session_event("session.deleted", json!({"sessionID": "ses_unknown"})), Source::Live);
        assert_eq!(sink.updown(SESSIONS_ACTIVE, &[]), 1);
        assert_eq!(engine.stats().sessions, 1);
    }

    #[test]
    fn update_for_unknown_session_registers_it() {
        let (engine, sink) = engine();
        engine.handle_event(
            &session_event("session.updated", json!({"info": {"id": "ses_9", "title": "late"}})),
            Source::Live,
        );
        assert_eq!(sink.updown(SESSIONS_ACTIVE, &[]), 1);
        assert_eq!(sink.counter(SESSIONS_CREATED_TOTAL, &[]), 1);
        assert_eq!(engine.session("ses_9").unwrap().title, "late");
    }

    #[test]
    fn partial_update_never_blanks_fields() {
        let (engine, _sink) = engine();
        engine.handle_event(
            &session_event("session.created", json!({"info": {"id": "ses_1", "title": "A", "slug": "a"}})),
            Source::Live,
        );
        engine.handle_event(
            &session_event("session.updated", json!({"info": {"id": "ses_1", "directory": "/w"}})),
            Source::Live,
        );
        let session = engine.session("ses_1").unwrap();
        assert_eq!(session.title, "A");
        assert_eq!(session.slug, "a");
        assert_eq!(session.directory, "/w");

        engine.handle_event(
            &session_event("session.updated", json!({"info": {"id": "ses_1", "title": "B"}})),
            Source::Live,
        );
        assert_eq!(engine.session("ses_1").unwrap().title, "B");
    }

    #[test]
    fn reset_membership_returns_gauge_to_zero() {
        let (engine, sink) = engine();
        for id in ["a", "b", "c"] {
            engine.handle_event(&session_event("session.created", json!({"id": id})), Source::Live);
        }
        engine.handle_event(&assistant_message("msg_1", 1, 1), Source::Live);
        assert_eq!(engine.reset_membership(), 3);
        assert_eq!(sink.updown(SESSIONS_ACTIVE, &[]), 0);
        assert_eq!(engine.reset_membership(), 0);
        assert_eq!(sink.updown(SESSIONS_ACTIVE, &[]), 0);
        // Ledger survives.
        assert_eq!(engine.stats().ledger_keys, 1);
    }

    // ── messages ─────────────────────────────────────────────────────────

    #[test]
    fn completed_assistant_message_counted_once() {
        let (engine, sink) = engine();
        let frame = assistant_message("msg_1", 10, 5);
        engine.handle_event(&frame, Source::Live);
        engine.handle_event(&frame, Source::Live);

        assert_eq!(sink.counter(MESSAGES_TOTAL, &[("source", "live"), ("model", "claude-x")]), 1);
        assert_eq!(sink.counter(TOKENS_TOTAL, &[("type", "input")]), 10);
        assert_eq!(sink.counter(TOKENS_TOTAL, &[("type", "output")]), 5);
        // Zero-valued kinds are not emitted.
        assert_eq!(sink.counter(TOKENS_TOTAL, &[("type", "reasoning")]), 0);
    }

    #[test]
    fn eligibility_gate_rejects_incomplete_messages() {
        let (engine, sink) = engine();
        let frames = [
            json!({"type": "message.updated", "properties": {"info": {
                "id": "u1", "role": "user", "tokens": {"input": 3}, "finish": "stop"}}}),
            json!({"type": "message.updated", "properties": {"info": {
                "id": "a1", "role": "assistant", "tokens": {"input": 3}}}}),
            json!({"type": "message.updated", "properties": {"info": {
                "id": "a2", "role": "assistant", "finish": "stop"}}}),
        ];
        for frame in &frames {
            engine.handle_event(frame, Source::Live);
        }
        assert_eq!(sink.counter(MESSAGES_TOTAL, &[]), 0);
        assert_eq!(sink.counter(TOKENS_TOTAL, &[]), 0);
        assert_eq!(engine.stats().ledger_keys, 0);
    }

    #[test]
    fn in_progress_update_does_not_consume_dedup_key() {
        let (engine, sink) = engine();
        engine.handle_event(
            &json!({"type": "message.updated", "properties": {"info": {
                "id": "msg_1", "role": "assistant", "tokens": {"input": 1}}}}),
            Source::Live,
        );
        engine.handle_event(&assistant_message("msg_1", 10, 5), Source::Live);
        assert_eq!(sink.counter(TOKENS_TOTAL, &[("type", "input")]), 10);
    }

    #[test]
    fn flat_message_shape_is_accepted() {
        let (engine, sink) = engine();
        engine.handle_event(
            &json!({"type": "message.updated", "properties": {
                "id": "msg_flat", "role": "assistant", "tokens": {"output": 4}, "finish": "stop"}}),
            Source::Live,
        );
        assert_eq!(sink.counter(TOKENS_TOTAL, &[("type", "output")]), 4);
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let (engine, sink) = engine();
        engine.handle_frame("{not json");
        engine.handle_frame(r#"{"type":"server.heartbeat","properties":{}}"#);
        engine.handle_frame(r#"{"type":"message.updated","properties":{"info":{"role":"assistant"}}}"#);
        assert_eq!(sink.counter(MESSAGES_TOTAL, &[]), 0);
        assert_eq!(engine.stats().sessions, 0);
    }

    // ── tool parts ───────────────────────────────────────────────────────

    #[test]
    fn tool_parts_count_terminal_status_once() {
        let (engine, sink) = engine();
        let part = |status: &str| {
            json!({"type": "message.part.updated", "properties": {"part": {
                "id": "prt_1", "messageID": "msg_1", "sessionID": "ses_1",
                "type": "tool", "tool": "bash", "state": {"status": status}}}})
        };
        for status in ["pending", "running", "completed", "completed"] {
            engine.handle_event(&part(status), Source::Live);
        }
        engine.handle_event(
            &json!({"type": "message.part.updated", "properties": {"part": {"id": "prt_2", "type": "text"}}}),
            Source::Live,
        );
        assert_eq!(sink.counter(TOOL_CALLS_TOTAL, &[("tool", "bash"), ("status", "completed")]), 1);
        assert_eq!(sink.counter(TOOL_CALLS_TOTAL, &[]), 1);
    }

    #[test]
    fn tool_parts_use_their_own_ledger() {
        let (engine, _sink) = engine();
        engine.handle_event(&assistant_message("msg_1", 1, 1), Source::Live);
        for i in 0..3 {
            engine.handle_event(
                &json!({"type": "message.part.updated", "properties": {"part": {
                    "id": format!("prt_{i}"), "type": "tool", "tool": "read",
                    "state": {"status": "completed"}}}}),
                Source::Live,
            );
        }
        let stats = engine.stats();
        assert_eq!(stats.ledger_keys, 1);
        assert_eq!(stats.tool_keys, 3);
    }

    // ── errors ───────────────────────────────────────────────────────────

    #[test]
    fn upstream_error_is_recorded() {
        let (engine, sink) = engine();
        engine.handle_event(
            &json!({"type": "session.error", "properties": {"error": {
                "name": "ProviderAuthError", "data": {"message": "bad key"}}}}),
            Source::Live,
        );
        engine.handle_event(&json!({"type": "error", "properties": {}}), Source::Live);

        assert_eq!(sink.counter(ERRORS_TOTAL, &[("type", "ProviderAuthError")]), 1);
        assert_eq!(sink.counter(ERRORS_TOTAL, &[("type", "unknown")]), 1);
        assert_eq!(engine.stats().errors, 2);
    }

    #[test]
    fn record_failure_marks_down_and_backs_off() {
        let config = EngineConfig {
            reconnect: BackoffConfig {
                base_delay_ms: 100,
                max_delay_ms: 350,
            },
            ..EngineConfig::default()
        };
        let (engine, sink) = engine_with(config);

        let delays: Vec<u128> = (0..4)
            .map(|_| engine.record_failure(&CycleError::StreamEnded).as_millis())
            .collect();
        assert_eq!(delays, [100, 200, 350, 350]);

        let stats = engine.stats();
        assert_eq!(stats.attempt, 4);
        assert!(!stats.up);
        assert_eq!(stats.errors, 4);
        assert_eq!(sink.gauge(UP, &[("instance", "opencode")]), Some(0.0));
        assert_eq!(sink.counter(ERRORS_TOTAL, &[("type", "connection")]), 4);
    }

    // ── snapshots ────────────────────────────────────────────────────────

    #[test]
    fn emit_snapshots_publishes_rows() {
        let (engine, sink) = engine();
        engine.handle_event(
            &session_event("session.created", json!({"info": {"id": "ses_1", "title": "T", "directory": "/d"}})),
            Source::Live,
        );
        let long = "x".repeat(500);
        engine.handle_event(
            &json!({"type": "session.error", "properties": {"error": {"name": "Boom", "message": long}}}),
            Source::Live,
        );
        engine.emit_snapshots();

        let sessions = sink.info_rows(SESSION_INFO);
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].contains(&("session_id", "ses_1".to_string())));
        assert!(sessions[0].contains(&("instance", "opencode".to_string())));

        let errors = sink.info_rows(ERROR_INFO);
        assert_eq!(errors.len(), 1);
        let message = &errors[0].iter().find(|(k, _)| *k == "message").unwrap().1;
        assert_eq!(message.chars().count(), MAX_ERROR_MESSAGE_CHARS);

        engine.handle_event(&session_event("session.deleted", json!({"info": {"id": "ses_1"}})), Source::Live);
        engine.emit_snapshots();
        assert!(sink.info_rows(SESSION_INFO).is_empty());
    }

    #[test]
    fn source_labels() {
        assert_eq!(Source::Historical.as_str(), "historical");
        assert_eq!(Source::Live.as_str(), "live");
    }
}
