use std::{future::Future, sync::Arc, time::Duration};

use markbridge_api_types::HeartbeatMessage;
use metrics::counter;
use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tracing::warn;
use uuid::Uuid;

use crate::application::error::ConversionError;

use super::{METRIC_SOFT_TIMEOUTS, heartbeat::HeartbeatSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub soft: Duration,
    pub hard: Duration,
}

/// Deadline state for one request.
///
/// The soft deadline is absolute: it is fixed when the token is issued, so
/// every operation wrapped with the same token shares one wall-clock budget.
#[derive(Debug, Clone)]
pub struct TimeoutToken {
    id: Uuid,
    soft: Duration,
    hard: Duration,
    location: String,
    deadline: Instant,
}

impl TimeoutToken {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn soft(&self) -> Duration {
        self.soft
    }

    pub fn hard(&self) -> Duration {
        self.hard
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SupervisedError<E> {
    #[error("request timed out")]
    TimedOut,
    #[error(transparent)]
    Failed(E),
}

impl From<SupervisedError<ConversionError>> for ConversionError {
    fn from(error: SupervisedError<ConversionError>) -> Self {
        match error {
            SupervisedError::TimedOut => ConversionError::Timeout,
            SupervisedError::Failed(inner) => inner,
        }
    }
}

#[derive(Clone)]
pub struct TimeoutSupervisor {
    policy: TimeoutPolicy,
    heartbeat: Option<Arc<dyn HeartbeatSink>>,
}

impl TimeoutSupervisor {
    /// Without a heartbeat sink only soft deadlines apply.
    pub fn new(policy: TimeoutPolicy, heartbeat: Option<Arc<dyn HeartbeatSink>>) -> Self {
        Self { policy, heartbeat }
    }

    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    pub fn token(&self, location: impl Into<String>) -> TimeoutToken {
        TimeoutToken {
            id: Uuid::new_v4(),
            soft: self.policy.soft,
            hard: self.policy.hard,
            location: location.into(),
            deadline: Instant::now() + self.policy.soft,
        }
    }

    /// Run a whole pipeline under both deadlines.
    ///
    /// A `start` heartbeat is emitted before `op` is first polled and exactly
    /// one `done` after it settles, times out, or is dropped unfinished. The
    /// operation itself is dropped before `done` goes out.
    pub async fn with_timeouts<T, E, F>(
        &self,
        token: &TimeoutToken,
        op: F,
    ) -> Result<T, SupervisedError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let guard = self
            .heartbeat
            .as_ref()
            .map(|sink| HeartbeatGuard::start(Arc::clone(sink), token));
        let outcome = self.bounded(token, op).await;
        drop(guard);
        outcome
    }

    /// Run one suspension point under the token's soft deadline only.
    pub async fn bounded<T, E, F>(&self, token: &TimeoutToken, op: F) -> Result<T, SupervisedError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        match timeout_at(token.deadline, op).await {
            Ok(result) => result.map_err(SupervisedError::Failed),
            Err(_) => {
                counter!(METRIC_SOFT_TIMEOUTS).increment(1);
                warn!(
                    target = "markbridge::timeout",
                    timeout_id = %token.id,
                    location = %token.location,
                    soft_ms = token.soft.as_millis() as u64,
                    "soft deadline exceeded"
                );
                Err(SupervisedError::TimedOut)
            }
        }
    }
}

/// Emits `done` exactly once, on drop.
struct HeartbeatGuard {
    sink: Arc<dyn HeartbeatSink>,
    timeout_id: Option<String>,
}

impl HeartbeatGuard {
    fn start(sink: Arc<dyn HeartbeatSink>, token: &TimeoutToken) -> Self {
        let timeout_id = token.id.to_string();
        sink.emit(HeartbeatMessage::Start {
            timeout_id: timeout_id.clone(),
            hard_deadline_ms: token.hard.as_millis() as u64,
            location: token.location.clone(),
        });
        Self {
            sink,
            timeout_id: Some(timeout_id),
        }
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        if let Some(timeout_id) = self.timeout_id.take() {
            self.sink.emit(HeartbeatMessage::Done { timeout_id });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use super::*;
    use crate::application::timeout::RecordingHeartbeat;

    fn supervisor(soft_ms: u64, sink: Option<Arc<RecordingHeartbeat>>) -> TimeoutSupervisor {
        TimeoutSupervisor::new(
            TimeoutPolicy {
                soft: Duration::from_millis(soft_ms),
                hard: Duration::from_millis(soft_ms * 10),
            },
            sink.map(|sink| sink as Arc<dyn HeartbeatSink>),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operation_yields_timeout_within_the_soft_deadline() {
        let supervisor = supervisor(100, None);
        let token = supervisor.token("en.example.org/Slow/1");
        let started = Instant::now();

        let result: Result<&str, SupervisedError<()>> = supervisor
            .with_timeouts(&token, async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("late")
            })
            .await;

        assert_eq!(result, Err(SupervisedError::TimedOut));
        assert!(started.elapsed() <= Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_done_bracket_a_successful_operation() {
        let sink = Arc::new(RecordingHeartbeat::new());
        let supervisor = supervisor(1_000, Some(Arc::clone(&sink)));
        let token = supervisor.token("en.example.org/Fast/2");

        let result: Result<u8, SupervisedError<()>> =
            supervisor.with_timeouts(&token, async { Ok(7) }).await;

        assert_eq!(result, Ok(7));
        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            HeartbeatMessage::Start {
                timeout_id: token.id().to_string(),
                hard_deadline_ms: 10_000,
                location: "en.example.org/Fast/2".to_string(),
            }
        );
        assert_eq!(
            messages[1],
            HeartbeatMessage::Done {
                timeout_id: token.id().to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn done_is_emitted_once_on_failure_and_on_timeout() {
        let sink = Arc::new(RecordingHeartbeat::new());
        let supervisor = supervisor(50, Some(Arc::clone(&sink)));

        let failing = supervisor.token("a");
        let result: Result<(), SupervisedError<&str>> = supervisor
            .with_timeouts(&failing, async { Err("boom") })
            .await;
        assert_eq!(result, Err(SupervisedError::Failed("boom")));

        let slow = supervisor.token("b");
        let result: Result<(), SupervisedError<&str>> = supervisor
            .with_timeouts(&slow, pending::<Result<(), &str>>())
            .await;
        assert_eq!(result, Err(SupervisedError::TimedOut));

        let done: Vec<_> = sink
            .messages()
            .into_iter()
            .filter(|message| matches!(message, HeartbeatMessage::Done { .. }))
            .map(|message| message.timeout_id().to_string())
            .collect();
        assert_eq!(done, vec![failing.id().to_string(), slow.id().to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_supervised_future_still_emits_done() {
        let sink = Arc::new(RecordingHeartbeat::new());
        let supervisor = supervisor(60_000, Some(Arc::clone(&sink)));
        let token = supervisor.token("c");

        tokio::select! {
            _ = supervisor.with_timeouts(&token, pending::<Result<(), ()>>()) => {
                panic!("pending operation cannot finish");
            }
            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
        }

        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[1], HeartbeatMessage::Done { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn without_a_sink_no_heartbeat_is_needed() {
        let supervisor = supervisor(100, None);
        let token = supervisor.token("d");
        let result: Result<u8, SupervisedError<()>> =
            supervisor.with_timeouts(&token, async { Ok(1) }).await;
        assert_eq!(result, Ok(1));
    }

    #[test]
    fn timed_out_maps_to_conversion_timeout() {
        let error: ConversionError = SupervisedError::<ConversionError>::TimedOut.into();
        assert_eq!(error.to_string(), "request timed out");
    }
}
