use super::types::SimTime;
use thiserror::Error;

/// State of a logical process captured when a run aborts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpSnapshot {
    pub lvt: SimTime,
    pub in_flight: usize,
    /// Timestamps still waiting in the queue, earliest first
    pub pending: Vec<SimTime>,
    /// Events produced during the last tick and not yet merged into the queue
    pub buffered: usize,
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("causality violation: event at {event_time} scheduled while LVT is {lvt}")]
    CausalityViolation { event_time: SimTime, lvt: SimTime },

    #[error("allocation invariant violated: {0}")]
    AllocationInvariant(String),

    #[error("event execution panicked at {time}: {message}")]
    WorkerPanic { time: SimTime, message: String },

    #[error("event queue exhausted at LVT {lvt} before reaching the end time")]
    QueueExhausted { lvt: SimTime },

    #[error("invalid topology: {0}")]
    Topology(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("simulation aborted at LVT {}: {source}", .snapshot.lvt)]
    Aborted {
        source: Box<KernelError>,
        snapshot: LpSnapshot,
    },
}

impl KernelError {
    /// Whether this error terminates a running simulation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KernelError::CausalityViolation { .. }
                | KernelError::AllocationInvariant(_)
                | KernelError::WorkerPanic { .. }
                | KernelError::QueueExhausted { .. }
                | KernelError::Aborted { .. }
        )
    }

    /// The underlying cause, looking through an abort wrapper
    pub fn root_cause(&self) -> &KernelError {
        match self {
            KernelError::Aborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
