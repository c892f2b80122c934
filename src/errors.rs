use thiserror::Error;

pub type Result<T> = std::result::Result<T, TagError>;

#[derive(Error, Debug)]
pub enum TagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed or unparsable user profile. Fatal, aborts the render.
    #[error("malformed user profile: {0}")]
    Profile(String),
    /// Malformed overlay template or a required field is missing.
    /// Fatal, aborts the render.
    #[error("overlay template error: {0}")]
    Template(String),
    #[error("asset fetch failed: {0}")]
    Fetch(String),
    #[error("asset fetch timed out: {0}")]
    Timeout(String),
    #[error("no title mapping for {0}")]
    TitleMapping(String),
    #[error("font registration failed: {0}")]
    FontLoad(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for TagError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Fetch(e.to_string())
        }
    }
}

impl From<image::ImageError> for TagError {
    fn from(e: image::ImageError) -> Self {
        Self::Fetch(e.to_string())
    }
}
