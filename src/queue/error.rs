use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue full ({capacity} entries)")]
    Full { capacity: usize },

    #[error("Entry rejected: {0}")]
    InvalidEntry(String),

    #[error("Queue store is corrupt: {0}")]
    CorruptStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;
