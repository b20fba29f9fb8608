//! Blocking HTTP client for the smart-HTTP fallback.
//!
//! The client follows redirects itself (at most [`MAX_REDIRECTS`] hops),
//! buffers request bodies so they go out with a known `Content-Length`, and
//! drains responses in [`CHUNK_SIZE`] chunks.
//!
//! Certificate validation is disabled on this client only. The client is
//! owned by the fallback transport and never shared with other HTTP traffic.

use std::io::{self, Read, Write};
use std::time::Duration;

use confmirror_core::MirrorError;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::SmartAction;
use crate::credentials::Credentials;

/// Maximum number of redirects followed for one request.
pub const MAX_REDIRECTS: usize = 5;

/// Size of the chunks response bodies are copied in.
pub const CHUNK_SIZE: usize = 4 * 1024;

const USER_AGENT: &str = concat!("git/2.0 (confmirror/", env!("CARGO_PKG_VERSION"), ")");

/// Failures of the fallback transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// HTTP 401.
    #[error("401 unauthorized: {url}")]
    Unauthorized { url: String },

    /// HTTP 403.
    #[error("403 forbidden: {url}")]
    Forbidden { url: String },

    /// HTTP 404.
    #[error("404 not found: {url}")]
    NotFound { url: String },

    /// Any other non-success status.
    #[error("unexpected http status {status} from {url}")]
    Status { status: u16, url: String },

    /// The redirect budget was exhausted.
    #[error("too many redirects (limit {limit}) while requesting {url}")]
    TooManyRedirects { limit: usize, url: String },

    /// A redirect without a usable `Location` header.
    #[error("redirect from {url} has no usable Location header")]
    BadRedirect { url: String },

    /// Connection, TLS handshake or timeout failure.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// Reading or buffering the response failed.
    #[error("i/o error during transfer: {0}")]
    Io(String),

    /// The caller cancelled the transfer.
    #[error("transfer cancelled")]
    Cancelled,
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<TransportError> for MirrorError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized { url } => MirrorError::Unauthorized(url),
            TransportError::Forbidden { url } => MirrorError::Forbidden(url),
            TransportError::NotFound { url } => MirrorError::RepositoryNotFound(url),
            TransportError::TooManyRedirects { limit, url } => {
                MirrorError::TooManyRedirects { limit, url }
            },
            TransportError::Cancelled => MirrorError::Cancelled,
            other => MirrorError::network(other.to_string()),
        }
    }
}

/// A fully received response.
#[derive(Debug, Clone)]
pub struct SmartHttpResponse {
    /// The URL that finally answered, after redirects.
    pub final_url: String,
    /// Number of redirects followed.
    pub redirects: usize,
    /// The response body.
    pub body: Vec<u8>,
    /// Number of body bytes copied.
    pub bytes: u64,
}

/// HTTP client used by the fallback transport.
#[derive(Clone)]
pub struct SmartHttpClient {
    http: Client,
    credentials: Credentials,
    cancel: CancellationToken,
}

impl SmartHttpClient {
    /// Creates a client with the given per-request timeout.
    pub fn new(
        timeout: Duration,
        credentials: Credentials,
        cancel: CancellationToken,
    ) -> Result<Self, TransportError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(Policy::none())
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                reason: format!("cannot build http client: {}", e),
            })?;

        Ok(Self {
            http,
            credentials,
            cancel,
        })
    }

    /// Performs one smart-HTTP action against a repository base URL.
    ///
    /// `body` is ignored for the list actions.
    pub fn execute(
        &self,
        action: SmartAction,
        base_url: &str,
        body: &[u8],
    ) -> Result<SmartHttpResponse, TransportError> {
        let mut url = action.endpoint(base_url);
        let mut redirects = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            debug!("Fallback transport: {} {} ({})", action.method(), url, action);
            let mut response = self.send(action, &url, body)?;
            let status = response.status();

            if is_redirect(status) {
                if redirects == MAX_REDIRECTS {
                    return Err(TransportError::TooManyRedirects {
                        limit: MAX_REDIRECTS,
                        url,
                    });
                }
                let next = redirect_target(&url, &response)?;
                debug!("Following {} redirect {} -> {}", status.as_u16(), url, next);
                url = next;
                redirects += 1;
                continue;
            }

            match status {
                StatusCode::UNAUTHORIZED => return Err(TransportError::Unauthorized { url }),
                StatusCode::FORBIDDEN => return Err(TransportError::Forbidden { url }),
                StatusCode::NOT_FOUND => return Err(TransportError::NotFound { url }),
                s if !s.is_success() => {
                    return Err(TransportError::Status {
                        status: s.as_u16(),
                        url,
                    });
                },
                _ => {},
            }

            let mut buffer = Vec::new();
            let bytes = copy_in_chunks(&mut response, &mut buffer, &self.cancel)?;
            debug!("Fallback transport received {} bytes from {}", bytes, url);

            return Ok(SmartHttpResponse {
                final_url: url,
                redirects,
                body: buffer,
                bytes,
            });
        }
    }

    fn send(&self, action: SmartAction, url: &str, body: &[u8]) -> Result<Response, TransportError> {
        let mut request = self
            .http
            .request(action.method(), url)
            .header(ACCEPT, action.accept());

        if let Some(content_type) = action.content_type() {
            request = request.header(CONTENT_TYPE, content_type).body(body.to_vec());
        }

        if let Credentials::Basic { username, secret } = &self.credentials {
            request = request.basic_auth(username, Some(secret));
        }

        request.send().map_err(|e| TransportError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for SmartHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartHttpClient")
            .field("credentials", &self.credentials)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn redirect_target(current: &str, response: &Response) -> Result<String, TransportError> {
    let bad = || TransportError::BadRedirect {
        url: current.to_string(),
    };

    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(bad)?;

    let base = reqwest::Url::parse(current).map_err(|_| bad())?;
    let target = base.join(location).map_err(|_| bad())?;

    Ok(target.to_string())
}

/// Copies `reader` into `writer` in [`CHUNK_SIZE`] chunks until exhausted.
///
/// Returns the number of bytes copied.
pub fn copy_in_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, TransportError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        writer.write_all(&chunk[..read])?;
        total += read as u64;
    }

    writer.flush()?;
    Ok(total)
}
