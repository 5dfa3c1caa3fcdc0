use thiserror::Error;

/// Terminal failures of a remote analysis workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The job could not be created.
    #[error("{0}")]
    Submission(String),

    /// A call did not reach the service or got an unusable reply.
    #[error("{0}")]
    Transport(String),

    /// The job finished but left no consumable synthesis artifact.
    #[error("{0}")]
    ResultUnavailable(String),
}

impl WorkflowError {
    pub fn message(&self) -> &str {
        match self {
            WorkflowError::Submission(msg)
            | WorkflowError::Transport(msg)
            | WorkflowError::ResultUnavailable(msg) => msg,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, WorkflowError::Transport(_))
    }
}
