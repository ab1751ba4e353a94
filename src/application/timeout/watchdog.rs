use std::{
    collections::HashMap,
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use markbridge_api_types::HeartbeatMessage;
use metrics::counter;
use tracing::{debug, error};

use super::{METRIC_HARD_TIMEOUTS, heartbeat::WatchdogHeartbeat};

const IDLE_WAIT: Duration = Duration::from_secs(1);

/// A heartbeat together with the moment the watchdog received it.
#[derive(Debug, Clone)]
pub struct WatchdogEvent {
    pub message: HeartbeatMessage,
    pub received_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredToken {
    pub timeout_id: String,
    pub location: String,
    pub hard_deadline: Duration,
}

/// What the watchdog does once a hard deadline passes.
pub trait Terminator: Send + Sync + 'static {
    fn terminate(&self, expired: &ExpiredToken);
}

/// Logs the stuck location and aborts the process.
#[derive(Debug, Default)]
pub struct AbortProcess;

impl Terminator for AbortProcess {
    fn terminate(&self, expired: &ExpiredToken) {
        error!(
            target = "markbridge::timeout::watchdog",
            timeout_id = %expired.timeout_id,
            location = %expired.location,
            hard_ms = expired.hard_deadline.as_millis() as u64,
            "hard deadline exceeded, terminating worker"
        );
        std::process::abort();
    }
}

#[derive(Debug, Clone)]
struct Pending {
    deadline: Instant,
    location: String,
    hard: Duration,
}

/// Pending start signals keyed by token id. Pure bookkeeping, no clock.
#[derive(Debug, Default)]
pub struct WatchdogState {
    pending: HashMap<String, Pending>,
}

impl WatchdogState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, message: HeartbeatMessage, received_at: Instant) {
        match message {
            HeartbeatMessage::Start {
                timeout_id,
                hard_deadline_ms,
                location,
            } => {
                let hard = Duration::from_millis(hard_deadline_ms);
                // A deadline beyond the clock's range can never fire.
                let Some(deadline) = received_at.checked_add(hard) else {
                    debug!(
                        target = "markbridge::timeout::watchdog",
                        timeout_id = %timeout_id,
                        hard_ms = hard_deadline_ms,
                        "hard deadline out of range, not tracked"
                    );
                    return;
                };
                self.pending.insert(
                    timeout_id,
                    Pending {
                        deadline,
                        location,
                        hard,
                    },
                );
            }
            // Unknown or already retired ids are ignored.
            HeartbeatMessage::Done { timeout_id } => {
                self.pending.remove(&timeout_id);
            }
        }
    }

    /// Remove and return every token whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<ExpiredToken> {
        let expired_ids: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        expired_ids
            .into_iter()
            .filter_map(|id| {
                self.pending.remove(&id).map(|pending| ExpiredToken {
                    timeout_id: id,
                    location: pending.location,
                    hard_deadline: pending.hard,
                })
            })
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Join handle for the watchdog thread. The thread exits once every
/// [`WatchdogHeartbeat`] sender is dropped.
#[derive(Debug)]
pub struct WatchdogHandle {
    thread: JoinHandle<()>,
}

impl WatchdogHandle {
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

/// Start the watchdog on a dedicated OS thread so that it keeps running even
/// when every async worker is stuck.
pub fn spawn_watchdog(
    terminator: Arc<dyn Terminator>,
) -> std::io::Result<(WatchdogHeartbeat, WatchdogHandle)> {
    let (sender, receiver) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("markbridge-watchdog".to_string())
        .spawn(move || run(receiver, terminator.as_ref()))?;
    Ok((WatchdogHeartbeat::new(sender), WatchdogHandle { thread }))
}

fn run(receiver: Receiver<WatchdogEvent>, terminator: &dyn Terminator) {
    let mut state = WatchdogState::new();
    loop {
        let wait = state
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_WAIT);

        match receiver.recv_timeout(wait) {
            Ok(event) => state.record(event.message, event.received_at),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!(
                    target = "markbridge::timeout::watchdog",
                    pending = state.len(),
                    "heartbeat channel closed, watchdog exiting"
                );
                return;
            }
        }

        for expired in state.expire(Instant::now()) {
            counter!(METRIC_HARD_TIMEOUTS).increment(1);
            terminator.terminate(&expired);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::application::timeout::HeartbeatSink;

    fn start(id: &str, hard_ms: u64) -> HeartbeatMessage {
        HeartbeatMessage::Start {
            timeout_id: id.to_string(),
            hard_deadline_ms: hard_ms,
            location: format!("en.example.org/{id}"),
        }
    }

    fn done(id: &str) -> HeartbeatMessage {
        HeartbeatMessage::Done {
            timeout_id: id.to_string(),
        }
    }

    #[test]
    fn expires_only_tokens_without_done() {
        let t0 = Instant::now();
        let mut state = WatchdogState::new();
        state.record(start("a", 100), t0);
        state.record(start("b", 100), t0);
        state.record(done("a"), t0 + Duration::from_millis(50));

        assert!(state.expire(t0 + Duration::from_millis(99)).is_empty());
        let expired = state.expire(t0 + Duration::from_millis(100));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].timeout_id, "b");
        assert_eq!(expired[0].location, "en.example.org/b");
        assert!(state.is_empty());
    }

    #[test]
    fn done_for_unknown_or_retired_token_is_a_no_op() {
        let t0 = Instant::now();
        let mut state = WatchdogState::new();
        state.record(done("ghost"), t0);
        state.record(start("a", 10), t0);
        state.record(done("a"), t0);
        state.record(done("a"), t0);
        assert!(state.is_empty());
        assert_eq!(state.next_deadline(), None);
    }

    #[test]
    fn huge_hard_deadline_never_fires() {
        let t0 = Instant::now();
        let mut state = WatchdogState::new();
        state.record(start("forever", u64::MAX), t0);
        assert!(state.expire(t0 + Duration::from_secs(86_400)).is_empty());
        state.record(done("forever"), t0);
        assert!(state.is_empty());
    }

    #[derive(Default)]
    struct Recording {
        expired: Mutex<Vec<ExpiredToken>>,
    }

    impl Terminator for Recording {
        fn terminate(&self, expired: &ExpiredToken) {
            if let Ok(mut list) = self.expired.lock() {
                list.push(expired.clone());
            }
        }
    }

    #[test]
    fn watchdog_thread_terminates_on_silence() {
        let terminator = Arc::new(Recording::default());
        let (heartbeat, handle) =
            spawn_watchdog(Arc::clone(&terminator) as Arc<dyn Terminator>).expect("spawn");

        heartbeat.emit(start("quiet", 20));
        heartbeat.emit(start("chatty", 20));
        heartbeat.emit(done("chatty"));

        let waited_until = Instant::now() + Duration::from_secs(5);
        while terminator.expired.lock().expect("lock").is_empty() && Instant::now() < waited_until
        {
            thread::sleep(Duration::from_millis(5));
        }

        drop(heartbeat);
        handle.join().expect("watchdog thread");

        let expired = terminator.expired.lock().expect("lock").clone();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].timeout_id, "quiet");
    }
}
