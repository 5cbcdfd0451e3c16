use crate::model::DeliveryOutcome;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

/// Pipeline stage names used in retryable-failure messages. Every
/// user-visible failure identifies the stage that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Persistence,
    Enhancement,
    ChartCapture,
    Render,
    Upload,
    Dispatch,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Persistence => "draft persistence",
            Stage::Enhancement => "ai enhancement",
            Stage::ChartCapture => "chart capture",
            Stage::Render => "document render",
            Stage::Upload => "document upload",
            Stage::Dispatch => "message dispatch",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    // Usage errors: caller mistakes, fatal, never retried.
    #[error("unknown weekday name: {0}")]
    UnknownWeekday(String),
    #[error("no client selected for this report session")]
    MissingClient,
    #[error("client is already selected and is immutable for the session")]
    ClientAlreadySelected,
    #[error("no recipients configured for delivery")]
    NoRecipients,
    #[error("{stage} already has an operation in flight for this draft")]
    StageBusy { stage: Stage },
    #[error("report is {actual:?}; this action requires {required:?}")]
    WrongStatus {
        required: crate::model::ReportStatus,
        actual: crate::model::ReportStatus,
    },

    // Renderer configuration / layout errors.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("no page template available")]
    MissingPageTemplate,
    #[error("content cannot fit on any page: {0}")]
    UnplaceableContent(String),
    #[error("image resource {0} could not be resolved")]
    MissingImage(String),

    // Transient collaborator failures: draft state unchanged, retry allowed.
    #[error("{stage} failed, retry is possible: {message}")]
    Transient { stage: Stage, message: String },

    // A subset of recipients failed; the outcome list has the details.
    #[error("delivery partially failed: {failed} of {total} recipients")]
    PartialDelivery {
        outcomes: Vec<DeliveryOutcome>,
        failed: usize,
        total: usize,
    },

    #[error("draft storage error: {0}")]
    Storage(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    pub fn transient(stage: Stage, message: impl Into<String>) -> Self {
        ReportError::Transient {
            stage,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ReportError::Storage(message.into())
    }

    /// Whether the failure is safe to surface as "try again". Usage and
    /// configuration errors are not; they signal a caller bug.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReportError::Transient { .. }
                | ReportError::PartialDelivery { .. }
                | ReportError::Storage(_)
                | ReportError::Io(_)
        )
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(value: serde_json::Error) -> Self {
        ReportError::Storage(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ReportError::transient(Stage::Upload, "timeout").is_retryable());
        assert!(ReportError::storage("locked").is_retryable());
        assert!(!ReportError::UnknownWeekday("Funday".into()).is_retryable());
        assert!(!ReportError::MissingClient.is_retryable());
    }

    #[test]
    fn messages_identify_the_stage() {
        let err = ReportError::transient(Stage::Enhancement, "connection reset");
        let text = err.to_string();
        assert!(text.contains("ai enhancement"));
        assert!(text.contains("retry is possible"));
    }
}
