//! Blocking HTTP origin client: HEAD for size/etag/last-modified, ranged GET
//! for byte windows. Redirects are followed manually (bounded hop count) so
//! a redirect loop is detected rather than silently retried forever.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{self, HeaderValue};
use reqwest::StatusCode;

const USER_AGENT: &str = "bookreader/0.1 (+https://github.com/AlrikOlson/bookreader-core)";
const DEFAULT_MAX_REDIRECTS: u32 = 5;
const DEFAULT_HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("origin unavailable for {url}: {source}")]
    Unavailable { url: String, #[source] source: reqwest::Error },
    #[error("redirect loop fetching {url} after {hops} hops")]
    RedirectLoop { url: String, hops: u32 },
    #[error("origin returned status {status} for {url}")]
    InvalidStatus { url: String, status: u16 },
    #[error("timed out during {phase} for {url}")]
    Timeout { url: String, phase: &'static str },
    #[error("origin does not support byte-range requests for {url}")]
    RangeUnsupported { url: String },
}

/// Result of a HEAD request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadInfo {
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// A plain HTTP client speaking to a single origin. See [`crate::mirror`]
/// for failover across several equivalent origins.
pub struct OriginClient {
    http: Client,
    max_redirects: u32,
}

impl Default for OriginClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginClient {
    pub fn new() -> Self {
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client builder should not fail with static config");
        Self { http, max_redirects: DEFAULT_MAX_REDIRECTS }
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// HEAD `url`, following redirects, returning size/etag/last-modified.
    pub fn head(&self, url: &str) -> Result<HeadInfo, OriginError> {
        tracing::debug!(url, "origin HEAD");
        let resp = self.follow_redirects(url, |u| {
            self.http.head(u).timeout(DEFAULT_HEAD_TIMEOUT).send()
        })?;

        if !resp.status().is_success() {
            return Err(OriginError::InvalidStatus { url: url.to_string(), status: resp.status().as_u16() });
        }

        let size = content_length(&resp).ok_or_else(|| OriginError::InvalidStatus {
            url: url.to_string(),
            status: resp.status().as_u16(),
        })?;
        let etag = header_str(&resp, header::ETAG);
        let last_modified = header_str(&resp, header::LAST_MODIFIED);
        tracing::debug!(url, size, etag = etag.as_deref(), "origin HEAD ok");
        Ok(HeadInfo { size, etag, last_modified })
    }

    /// Ranged GET `[start, end]` (inclusive), following redirects.
    pub fn get_range(&self, url: &str, start: u64, end: u64) -> Result<Vec<u8>, OriginError> {
        tracing::debug!(url, start, end, "origin GET range");
        let range_value = format!("bytes={start}-{end}");
        let resp = self.follow_redirects(url, |u| {
            self.http
                .get(u)
                .timeout(DEFAULT_GET_TIMEOUT)
                .header(header::RANGE, HeaderValue::from_str(&range_value).unwrap())
                .send()
        })?;

        let status = resp.status();
        let requested_len = end - start + 1;

        if status == StatusCode::PARTIAL_CONTENT {
            let bytes = resp.bytes().map_err(|source| OriginError::Unavailable { url: url.to_string(), source })?;
            return Ok(bytes.to_vec());
        }

        if status == StatusCode::OK {
            // Origin ignored the Range header and sent the whole body. If
            // that body is bigger than what we asked for, the origin does
            // not actually support ranges — surface it distinctly so the
            // cache can degrade to direct mode for this book.
            let full_len = content_length(&resp);
            let bytes = resp.bytes().map_err(|source| OriginError::Unavailable { url: url.to_string(), source })?;
            if full_len.map(|l| l > requested_len).unwrap_or(bytes.len() as u64 > requested_len) {
                return Err(OriginError::RangeUnsupported { url: url.to_string() });
            }
            return Ok(bytes.to_vec());
        }

        Err(OriginError::InvalidStatus { url: url.to_string(), status: status.as_u16() })
    }

    fn follow_redirects(
        &self,
        url: &str,
        send: impl Fn(&str) -> Result<Response, reqwest::Error>,
    ) -> Result<Response, OriginError> {
        let mut current = url.to_string();
        for hop in 0..=self.max_redirects {
            let resp = send(&current).map_err(|source| {
                if source.is_timeout() {
                    OriginError::Timeout { url: current.clone(), phase: "request" }
                } else {
                    OriginError::Unavailable { url: current.clone(), source }
                }
            })?;
            if resp.status().is_redirection() {
                if hop == self.max_redirects {
                    return Err(OriginError::RedirectLoop { url: url.to_string(), hops: hop + 1 });
                }
                let location = resp
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());
                match location {
                    Some(next) => {
                        current = next;
                        continue;
                    }
                    None => {
                        return Err(OriginError::InvalidStatus {
                            url: current,
                            status: resp.status().as_u16(),
                        })
                    }
                }
            }
            return Ok(resp);
        }
        unreachable!("loop always returns within max_redirects + 1 iterations")
    }
}

fn content_length(resp: &Response) -> Option<u64> {
    resp.headers().get(header::CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

fn header_str(resp: &Response, name: header::HeaderName) -> Option<String> {
    resp.headers().get(name)?.to_str().ok().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Minimal single-shot HTTP/1.1 server for exercising the client without
    /// a live network. Returns the bound address.
    fn spawn_server(responder: impl Fn(&str) -> String + Send + 'static) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let first_line = request.lines().next().unwrap_or("");
                let response = responder(first_line);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn head_parses_size_and_etag() {
        let base = spawn_server(|_| {
            "HTTP/1.1 200 OK\r\nContent-Length: 1234\r\nETag: \"abc\"\r\n\r\n".to_string()
        });
        let client = OriginClient::new();
        let info = client.head(&base).unwrap();
        assert_eq!(info.size, 1234);
        assert_eq!(info.etag.as_deref(), Some("\"abc\""));
    }

    #[test]
    fn get_range_partial_content() {
        let base = spawn_server(|_| {
            "HTTP/1.1 206 Partial Content\r\nContent-Length: 5\r\n\r\nhello".to_string()
        });
        let client = OriginClient::new();
        let bytes = client.get_range(&base, 0, 4).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn get_range_full_body_larger_than_requested_is_unsupported() {
        let base = spawn_server(|_| {
            "HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhello world".to_string()
        });
        let client = OriginClient::new();
        let err = client.get_range(&base, 0, 4).unwrap_err();
        assert!(matches!(err, OriginError::RangeUnsupported { .. }));
    }

    #[test]
    fn invalid_status_surfaces() {
        let base = spawn_server(|_| "HTTP/1.1 500 Internal Server Error\r\n\r\n".to_string());
        let client = OriginClient::new();
        let err = client.head(&base).unwrap_err();
        assert!(matches!(err, OriginError::InvalidStatus { status: 500, .. }));
    }
}
