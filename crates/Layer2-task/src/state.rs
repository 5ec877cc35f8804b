//! Task state machine

use serde::{Deserialize, Serialize};

/// Possible states of a task
///
/// `Running` is the only initial state; the other three are terminal and
/// never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Command is executing (or waiting for its channel to become ready)
    Running,

    /// Output stream was exhausted without a fault
    Completed,

    /// Setup fault, readiness timeout, or output-read fault
    Failed,

    /// Explicit cancel request while running
    Cancelled,
}

impl TaskStatus {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    /// Check if task is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Get a symbol for the state (for terminal output)
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Running => "⟳",
            TaskStatus::Completed => "✓",
            TaskStatus::Failed => "✗",
            TaskStatus::Cancelled => "⊘",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filter used by task listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFilter {
    #[default]
    All,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskFilter {
    /// Parse a filter token; `canceled` is accepted as an alias
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Some(Self::All),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn matches(&self, status: TaskStatus) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Running => status == TaskStatus::Running,
            TaskFilter::Completed => status == TaskStatus::Completed,
            TaskFilter::Failed => status == TaskStatus::Failed,
            TaskFilter::Cancelled => status == TaskStatus::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_filter_parse_and_match() {
        assert_eq!(TaskFilter::parse("Running"), Some(TaskFilter::Running));
        assert_eq!(TaskFilter::parse("canceled"), Some(TaskFilter::Cancelled));
        assert_eq!(TaskFilter::parse(""), Some(TaskFilter::All));
        assert_eq!(TaskFilter::parse("queued"), None);

        assert!(TaskFilter::All.matches(TaskStatus::Failed));
        assert!(TaskFilter::Running.matches(TaskStatus::Running));
        assert!(!TaskFilter::Running.matches(TaskStatus::Completed));
    }
}
