use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("No such object: {0}")]
    NotFound(String),

    #[error("Tag extraction failed: {0}")]
    Tag(String),

    #[error("Listing serialization failed: {0}")]
    Didl(#[from] rezodidl::DidlError),
}
