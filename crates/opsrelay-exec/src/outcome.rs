use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Failed,
    TimedOut,
    Rejected,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Rejected => "rejected",
        }
    }
}

/// Classified result of one operation attempt. Produced per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    pub text: String,
    /// File produced by the operation (backup archive), handed to delivery.
    pub artifact: Option<PathBuf>,
}

impl ExecutionOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Success, text)
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Failed, text)
    }

    pub fn timed_out(text: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::TimedOut, text)
    }

    pub fn rejected(text: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Rejected, text)
    }

    pub fn with_artifact(mut self, artifact: PathBuf) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    fn new(status: OutcomeStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
            artifact: None,
        }
    }
}
