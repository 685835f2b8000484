use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("not found")]
    NotFound,

    #[error("wrong token")]
    WrongToken,

    #[error("page size limit exceeded")]
    SizeLimit(usize),

    #[error("mime type not allowed: {0}")]
    MimeNotAllowed(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// The two-digit Gemini status this error surfaces as.
    #[must_use]
    pub fn gemini_status(&self) -> u8 {
        match self {
            Self::BadRequest(_)
            | Self::WrongToken
            | Self::SizeLimit(_)
            | Self::MimeNotAllowed(_)
            | Self::InvalidName(_) => 59,
            Self::UnknownHost(_) => 53,
            Self::NotFound => 51,
            Self::Io(_) | Self::Config(_) => 40,
        }
    }

    /// The meta line accompanying the status.
    #[must_use]
    pub fn gemini_meta(&self) -> String {
        match self {
            Self::BadRequest(msg) => msg.clone(),
            Self::UnknownHost(host) => format!("Unknown host: {host}"),
            Self::NotFound => "Not found".to_string(),
            Self::WrongToken => "Your token is the wrong token".to_string(),
            Self::SizeLimit(limit) => {
                format!("This wiki does not allow more than {limit} bytes per page")
            }
            Self::MimeNotAllowed(mime) => format!("This wiki does not allow {mime}"),
            Self::InvalidName(name) => format!("Invalid name: {name}"),
            Self::Io(_) | Self::Config(_) => "Temporary failure".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
