//! Lifecycle states of a fetch task.

/// Where a fetch task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Constructed, not started.
    #[default]
    Created,
    /// Looking for the content file on disk.
    CheckingDisk,
    /// A decode unit is scheduled or running.
    Decoding,
    /// A network request is in flight. `attempt` starts at 1.
    Downloading {
        /// Attempt number for this request.
        attempt: u32,
    },
    /// A transient failure occurred and the request is being re-issued.
    Retrying,
    /// A result was handed to the completion.
    Delivered,
    /// Cancelled; no result will be delivered.
    Cancelled,
}

impl TaskState {
    /// Returns true once the task can make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::CheckingDisk => write!(f, "checking disk"),
            Self::Decoding => write!(f, "decoding"),
            Self::Downloading { attempt } => write!(f, "downloading (attempt {attempt})"),
            Self::Retrying => write!(f, "retrying"),
            Self::Delivered => write!(f, "delivered"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
