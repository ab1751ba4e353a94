//! Two-tier deadline supervision for pipeline operations.
//!
//! Every suspension point runs under a soft wall-clock deadline. When a
//! heartbeat sink is configured, the whole pipeline is additionally announced
//! to a watchdog (in-process or an external pool supervisor) that terminates
//! the process if the matching `done` signal does not arrive within the hard
//! deadline.

mod heartbeat;
mod supervisor;
mod watchdog;

pub use heartbeat::{HeartbeatSink, RecordingHeartbeat, StdoutHeartbeat, WatchdogHeartbeat};
pub use supervisor::{SupervisedError, TimeoutPolicy, TimeoutSupervisor, TimeoutToken};
pub use watchdog::{
    AbortProcess, ExpiredToken, Terminator, WatchdogEvent, WatchdogHandle, WatchdogState,
    spawn_watchdog,
};

pub const METRIC_SOFT_TIMEOUTS: &str = "markbridge_soft_timeouts_total";
pub const METRIC_HARD_TIMEOUTS: &str = "markbridge_hard_timeouts_total";
