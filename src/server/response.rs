use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Error;

pub const GEMTEXT_MIME: &str = "text/gemini; charset=UTF-8";
pub const PLAIN_MIME: &str = "text/plain; charset=UTF-8";
pub const HTML_MIME: &str = "text/html; charset=UTF-8";

/// A Gemini response: one status line, then a body for 2x statuses.
/// Titan responses use the same shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u8,
    pub meta: String,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn success(mime: &str, body: Vec<u8>) -> Self {
        Self {
            status: 20,
            meta: mime.to_string(),
            body,
        }
    }

    #[must_use]
    pub fn gemtext(body: String) -> Self {
        Self::success(GEMTEXT_MIME, body.into_bytes())
    }

    #[must_use]
    pub fn plain(body: String) -> Self {
        Self::success(PLAIN_MIME, body.into_bytes())
    }

    #[must_use]
    pub fn html(body: String) -> Self {
        Self::success(HTML_MIME, body.into_bytes())
    }

    #[must_use]
    pub fn input(prompt: &str) -> Self {
        Self {
            status: 10,
            meta: prompt.to_string(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn redirect(url: &str) -> Self {
        Self {
            status: 30,
            meta: url.to_string(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 59,
            meta: message.into(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self {
            status: 51,
            meta: "Not found".to_string(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        Self {
            status: error.gemini_status(),
            meta: error.gemini_meta(),
            body: Vec::new(),
        }
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> std::io::Result<()> {
        writer
            .write_all(format!("{} {}\r\n", self.status, self.meta).as_bytes())
            .await?;
        if self.status / 10 == 2 {
            writer.write_all(&self.body).await?;
        }
        writer.flush().await
    }
}

impl From<Error> for Response {
    fn from(error: Error) -> Self {
        Self::from_error(&error)
    }
}
