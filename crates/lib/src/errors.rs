use thiserror::Error;

/// Custom error types for the evaluation panel.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Failed to load evaluation data: {0}")]
    SheetLoad(String),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Invalid JSON template: {message}. Content attempted: {attempted}")]
    TemplateParse { message: String, attempted: String },
    #[error("{0}")]
    Submission(String),
    #[error("This conversation is still open. You can only evaluate closed conversations.")]
    ConversationStillOpen,
    #[error("The evaluation panel is not open")]
    NotOpen,
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
}

impl EvalError {
    /// Returns `true` when the failure should be shown next to the offending control
    /// rather than aborting the session.
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            EvalError::Validation(_) | EvalError::TemplateParse { .. } | EvalError::Submission(_)
        )
    }
}

/// User-correctable problems with entered form data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please add at least one metric name")]
    MissingMetricName,
    #[error("Please paste a JSON template")]
    MissingTemplate,
    #[error("Please select at least one skill")]
    MissingSkills,
    #[error("Metric \"{0}\" already exists")]
    DuplicateMetric(String),
    #[error("Count values cannot be negative (field \"{0}\")")]
    NegativeCount(String),
    #[error("Please complete all sub-metrics for: {}", .0.join(", "))]
    IncompleteMetrics(Vec<String>),
    #[error("Please rate at least one metric before submitting")]
    NoRatings,
    #[error("Metric {0} must have at least one parameter")]
    EmptyParameters(String),
    #[error("List options required for \"{0}\"")]
    MissingListOptions(String),
    #[error("At least one metric is required")]
    LastMetricRow,
    #[error("You do not have permission to add or edit metrics")]
    PermissionDenied,
    #[error("The JSON template must be an object")]
    NotAnObject,
}
