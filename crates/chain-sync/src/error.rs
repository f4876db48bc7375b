#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("watermark cas conflict: expected version {expected}, found {found}")]
    CasConflict { expected: u64, found: u64 },
    #[error("watermark regression: current {current}, proposed {proposed}")]
    WatermarkRegression { current: u64, proposed: u64 },
    #[error("watermark {proposed} is ahead of latest block {latest}")]
    WatermarkAhead { proposed: u64, latest: u64 },
    #[error("invalid withdrawal transition for intent {id}: {from} -> {to}")]
    InvalidTransition {
        id: u64,
        from: &'static str,
        to: &'static str,
    },
    #[error("unknown withdrawal intent {0}")]
    UnknownIntent(u64),
    #[error("config invalid: {0}")]
    ConfigInvalid(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Failures the next scheduled run may succeed on without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::BlockNotFound(_) | Error::CasConflict { .. } | Error::Backend(_)
        )
    }
}

pub type Result<T> = core::result::Result<T, Error>;
