use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown state id: {0}")]
    UnknownState(i64),
}
