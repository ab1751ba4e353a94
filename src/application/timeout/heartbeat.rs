use std::{
    io::Write,
    sync::{Mutex, mpsc::Sender},
    time::Instant,
};

use markbridge_api_types::HeartbeatMessage;
use tracing::warn;

use super::watchdog::WatchdogEvent;

/// Destination for heartbeat messages.
///
/// `emit` is synchronous so that the `done` signal can be sent from a drop
/// guard. Implementations must not block for long.
pub trait HeartbeatSink: Send + Sync {
    fn emit(&self, message: HeartbeatMessage);
}

/// JSON lines on stdout, read by an external worker-pool supervisor.
#[derive(Debug, Default)]
pub struct StdoutHeartbeat;

impl HeartbeatSink for StdoutHeartbeat {
    fn emit(&self, message: HeartbeatMessage) {
        let line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(err) => {
                warn!(
                    target = "markbridge::timeout::heartbeat",
                    error = %err,
                    "failed to encode heartbeat"
                );
                return;
            }
        };
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
            warn!(
                target = "markbridge::timeout::heartbeat",
                timeout_id = message.timeout_id(),
                error = %err,
                "failed to write heartbeat"
            );
        }
    }
}

/// Channel into the in-process watchdog thread.
#[derive(Debug, Clone)]
pub struct WatchdogHeartbeat {
    sender: Sender<WatchdogEvent>,
}

impl WatchdogHeartbeat {
    pub(super) fn new(sender: Sender<WatchdogEvent>) -> Self {
        Self { sender }
    }
}

impl HeartbeatSink for WatchdogHeartbeat {
    fn emit(&self, message: HeartbeatMessage) {
        let event = WatchdogEvent {
            message,
            received_at: Instant::now(),
        };
        if let Err(err) = self.sender.send(event) {
            warn!(
                target = "markbridge::timeout::heartbeat",
                timeout_id = err.0.message.timeout_id(),
                "watchdog is gone, heartbeat dropped"
            );
        }
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingHeartbeat {
    messages: Mutex<Vec<HeartbeatMessage>>,
}

impl RecordingHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<HeartbeatMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl HeartbeatSink for RecordingHeartbeat {
    fn emit(&self, message: HeartbeatMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}
