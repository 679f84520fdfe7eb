use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Duplicate node id: {0}")]
    DuplicateId(String),

    #[error("Node handle is stale or belongs to another arena: {0}")]
    InvalidHandle(String),

    #[error("Attaching {child} under {parent} would create a cycle")]
    CycleDetected {
        parent: String,
        child: String,
    },

    #[error("Invalid tree input at {path}: {reason}")]
    InvalidInput {
        path: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type TreeResult<T> = Result<T, TreeError>;
