use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogWatchError {
    #[error("Invalid trigger pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, LogWatchError>;
