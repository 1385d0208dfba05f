use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Stale element handle: {0}")]
    StaleElement(String),

    #[error("Element is obscured by another element: {0}")]
    ElementObscured(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Driver error: {0}")]
    DriverError(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Planner error: {0}")]
    PlannerError(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Remote mirror error: {0}")]
    MirrorError(String),

    #[error("Capture sink error: {0}")]
    CaptureSinkError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this failure is a definite negative rather than a slow or
    /// flaky read. A timeout says nothing about the page; everything else
    /// means the driver conclusively could not perform the operation.
    pub fn is_definite_failure(&self) -> bool {
        !matches!(self, EngineError::Timeout(_))
    }
}
