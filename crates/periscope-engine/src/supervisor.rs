//! Reconnect supervisor.
//!
//! Drives [`Engine::connect_and_listen`] forever. Every failed cycle is
//! recorded on the engine and followed by an exponential backoff sleep. There
//! is no attempt limit; only cancellation stops the loop.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Engine;

/// Run connection cycles until `cancel` fires.
pub async fn run_supervisor(engine: Arc<Engine>, cancel: CancellationToken) {
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = engine.connect_and_listen(&cancel) => result,
        };

        let Err(err) = result else {
            // Only a cancelled cycle returns Ok.
            break;
        };

        let delay = engine.record_failure(&err);
        warn!(
            error = %err,
            attempt = engine.stats().attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "connection cycle failed, reconnecting"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    info!("supervisor stopped");
}

/// Spawn [`run_supervisor`] on the runtime.
pub fn spawn_supervisor(engine: Arc<Engine>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run_supervisor(engine, cancel))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::EngineConfig;
    use crate::metrics::{ERRORS_TOTAL, UP};
    use crate::sink::MemorySink;
    use periscope_client::OpencodeClient;
    use periscope_core::BackoffConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> EngineConfig {
        EngineConfig {
            reconnect: BackoffConfig {
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn retries_until_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/global/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::new());
        let client = OpencodeClient::new(&server.uri()).unwrap();
        let engine = Arc::new(Engine::new(client, sink.clone(), fast_config()));

        let cancel = CancellationToken::new();
        let handle = spawn_supervisor(Arc::clone(&engine), cancel.clone());
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("supervisor should stop on cancel")
            .unwrap();

        let stats = engine.stats();
        assert!(stats.attempt >= 2, "expected repeated attempts, got {}", stats.attempt);
        assert!(!stats.up);
        assert_eq!(sink.gauge(UP, &[("instance", "opencode")]), Some(0.0));
        assert_eq!(
            sink.counter(ERRORS_TOTAL, &[("type", "connection")]),
            u64::from(stats.attempt)
        );
    }

    #[tokio::test]
    async fn unhealthy_response_counts_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/global/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"healthy": false, "version": "1.0"})),
            )
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::new());
        let client = OpencodeClient::new(&server.uri()).unwrap();
        let engine = Arc::new(Engine::new(client, sink.clone(), fast_config()));

        let cancel = CancellationToken::new();
        let handle = spawn_supervisor(Arc::clone(&engine), cancel.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(engine.stats().attempt >= 1);
        assert!(sink.counter(ERRORS_TOTAL, &[("type", "connection")]) >= 1);
    }

    #[tokio::test]
    async fn already_cancelled_returns_immediately() {
        let sink = Arc::new(MemorySink::new());
        let client = OpencodeClient::new("http://127.0.0.1:9").unwrap();
        let engine = Arc::new(Engine::new(client, sink, fast_config()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), run_supervisor(engine, cancel))
            .await
            .expect("supervisor should not start a cycle once cancelled");
    }
}
