use std::fmt;
use std::path::PathBuf;

/// Lifecycle of one pipeline instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Uninitialized,
    /// Rules loaded, timers running
    Running,
    /// `close` in progress; traffic is still accepted until the final flush
    Draining,
    /// Final flush in progress; traffic is refused
    Stopping,
    Stopped,
}

impl PipelineState {
    /// Whether observed traffic may enter the cache
    pub fn accepts_traffic(self) -> bool {
        matches!(self, PipelineState::Running | PipelineState::Draining)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What a flush did with the drained events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to send; no network call was made
    Empty,
    Delivered(usize),
    /// Local-only credentials: events went to the log instead
    LoggedLocally(usize),
    /// Delivery failed and the batch was written to disk
    BackedUp { count: usize, path: PathBuf },
    /// Delivery and the disk fallback both failed
    Dropped(usize),
    /// The collector rejected the credentials; the pipeline is stopped
    Unauthorized,
}

impl FlushOutcome {
    /// Number of events the flush handled, whatever their fate
    pub fn count(&self) -> usize {
        match self {
            FlushOutcome::Empty | FlushOutcome::Unauthorized => 0,
            FlushOutcome::Delivered(n)
            | FlushOutcome::LoggedLocally(n)
            | FlushOutcome::Dropped(n) => *n,
            FlushOutcome::BackedUp { count, .. } => *count,
        }
    }
}
