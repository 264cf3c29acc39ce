use thiserror::Error;

#[derive(Error, Debug)]
pub enum BroadcasterError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Broadcaster was killed and cannot be restarted")]
    Terminated,
}

pub type Result<T> = std::result::Result<T, BroadcasterError>;
