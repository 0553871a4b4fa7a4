use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FragmentError {
    #[error("Malformed fragment: {0}")]
    MalformedFragment(String),

    #[error("Fragment index {index} outside 1..={total}")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("Invalid fragment size: {0}")]
    InvalidFragmentSize(usize),

    #[error("Incomplete fragment set: have {available} of {needed}")]
    Incomplete { needed: u32, available: u32 },
}

pub type FragmentResult<T> = Result<T, FragmentError>;
