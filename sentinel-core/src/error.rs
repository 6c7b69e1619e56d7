use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning service timed out after {0}s")]
    Timeout(u64),
    #[error("reasoning service unreachable: {0}")]
    Transport(String),
    #[error("reasoning service quota exceeded: {0}")]
    Quota(String),
    #[error("media type '{0}' is not supported by this reasoning backend")]
    UnsupportedMedia(String),
    #[error("invalid media payload: {0}")]
    InvalidMedia(String),
    #[error("invalid reasoning response: {0}")]
    InvalidResponse(String),
    #[error("reasoning service misconfigured: {0}")]
    Config(String),
}

impl ReasoningError {
    /// Transient failures get one more attempt; everything else surfaces immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReasoningError::Timeout(_) | ReasoningError::Transport(_))
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown responder '{0}'")]
    UnknownResponder(String),
    #[error("unknown location '{0}'")]
    UnknownLocation(String),
    #[error("cannot determine responder class for incident type '{0}'")]
    UnclassifiedIncident(String),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("tool call rejected: {0}")]
    Tool(String),
    #[error("dispatch did not conclude within {0} turns")]
    TurnLimit(usize),
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
}

impl DispatchError {
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownResponder(_) | DispatchError::UnknownLocation(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("alert '{0}' not found")]
    AlertNotFound(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
