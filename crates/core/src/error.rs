/// Errors from parsing user-facing values into domain types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown analysis field: {0}")]
    UnknownField(String),

    #[error("Unknown generation mode: {0}")]
    UnknownMode(String),

    #[error("Unknown preset kind: {0}")]
    UnknownPreset(String),
}
