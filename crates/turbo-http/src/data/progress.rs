use std::fmt;
use std::sync::Arc;

/// Byte counters reported while a download is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Bytes written by the chunk that triggered this report.
    pub bytes_written: u64,

    /// Bytes on disk so far, including any prefix carried over by a resume.
    pub total_bytes_written: u64,

    /// Full size of the resource, if the server announced it.
    pub total_bytes_expected: Option<u64>,
}

impl Progress {
    /// Percentage of completion; `None` if the total is unknown.
    #[must_use]
    pub fn percentage(&self) -> Option<f64> {
        self.total_bytes_expected.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.total_bytes_written as f64 / total as f64) * 100.0
            }
        })
    }
}

/// Callback invoked for each chunk written during a download.
///
/// The callback receives a reference to avoid cloning on every invocation.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Lifecycle of a transfer operation.
///
/// `Idle → InFlight → {Completed, Failed, Cancelled}`. Progress is only ever
/// reported while `InFlight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    InFlight,
    Completed,
    Failed,
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed | TransferState::Cancelled)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Idle => write!(f, "Idle"),
            TransferState::InFlight => write!(f, "InFlight"),
            TransferState::Completed => write!(f, "Completed"),
            TransferState::Failed => write!(f, "Failed"),
            TransferState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let progress = Progress {
            bytes_written: 10,
            total_bytes_written: 50,
            total_bytes_expected: Some(200),
        };
        assert_eq!(progress.percentage(), Some(25.0));

        let unknown = Progress { total_bytes_expected: None, ..progress };
        assert_eq!(unknown.percentage(), None);

        let empty = Progress { total_bytes_expected: Some(0), ..progress };
        assert_eq!(empty.percentage(), Some(100.0));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransferState::Idle.is_terminal());
        assert!(!TransferState::InFlight.is_terminal());
        assert!(TransferState::Completed.is_terminal());
        assert!(TransferState::Failed.is_terminal());
        assert!(TransferState::Cancelled.is_terminal());
    }
}
