//! reqwest client configured from `JobOptions`, plus the response body pump
//! shared by chunk, single-stream and HLS segment transfers.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, IF_RANGE};
use reqwest::{Method, RequestBuilder, Response};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::parse;
use crate::error::TransferError;
use crate::job::{Credentials, JobOptions, Progress};

const DEFAULT_USER_AGENT: &str = concat!("dlx/", env!("CARGO_PKG_VERSION"));

/// Connection state owned by one HTTP or HLS handler.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    auth: Option<Credentials>,
    read_timeout: Duration,
    method: Method,
    body: Option<bytes::Bytes>,
    query: Vec<(String, String)>,
}

/// `name=value; name=value` for the `Cookie` header.
fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{}={}", k.trim(), v.trim()))
        .collect::<Vec<_>>()
        .join("; ")
}

impl HttpClient {
    /// `uri` supplies credentials from its userinfo when the options carry none.
    pub fn new(opts: &JobOptions, uri: &str) -> Result<Self, TransferError> {
        let mut headers = HeaderMap::new();
        for (k, v) in &opts.headers {
            let name = HeaderName::from_bytes(k.trim().as_bytes())
                .map_err(|e| TransferError::Config(format!("header name {:?}: {}", k, e)))?;
            let value = HeaderValue::from_str(v.trim())
                .map_err(|e| TransferError::Config(format!("header value for {}: {}", k, e)))?;
            headers.append(name, value);
        }
        if !opts.cookies.is_empty() {
            let value = HeaderValue::from_str(&cookie_header(&opts.cookies))
                .map_err(|e| TransferError::Config(format!("cookies: {}", e)))?;
            headers.append(COOKIE, value);
        }
        let method = Method::from_bytes(opts.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|e| TransferError::Config(format!("method {:?}: {}", opts.method, e)))?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(opts.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(!opts.verify_tls)
            .user_agent(
                opts.user_agent
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            )
            .default_headers(headers);
        if let Some(proxy) = &opts.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| TransferError::Config(format!("proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let inner = builder
            .build()
            .map_err(|e| TransferError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            inner,
            auth: opts.auth.clone().or_else(|| credentials_from_uri(uri)),
            read_timeout: opts.read_timeout,
            method,
            body: opts.body.clone().map(bytes::Bytes::from),
            query: opts.query.clone(),
        })
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(c) => req.basic_auth(&c.username, c.password.as_deref()),
            None => req,
        }
    }

    /// Plain GET, for playlists, keys and segments.
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.authorize(self.inner.get(url))
    }

    pub fn head(&self, url: &str) -> RequestBuilder {
        let req = self.inner.head(url);
        let req = if self.query.is_empty() { req } else { req.query(&self.query) };
        self.authorize(req)
    }

    /// Request for the job's resource: configured method, query and body.
    pub fn request(&self, url: &str) -> RequestBuilder {
        let mut req = self.inner.request(self.method.clone(), url);
        if !self.query.is_empty() {
            req = req.query(&self.query);
        }
        if let Some(body) = &self.body {
            req = req.body(body.clone());
        }
        self.authorize(req)
    }

    /// Sends `req`; non-2xx statuses become `HttpStatus`.
    pub async fn send(&self, req: RequestBuilder, url: &str) -> Result<Response, TransferError> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                retry_after: parse::retry_after(response.headers()),
            });
        }
        Ok(response)
    }

    /// Fetches a small body (playlist, key) into memory.
    pub async fn fetch_bytes(&self, url: &str) -> Result<bytes::Bytes, TransferError> {
        let response = self.send(self.get(url), url).await?;
        Ok(response.bytes().await?)
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

/// Adds `If-Range` when resuming, so a changed remote answers 200 instead of 206.
pub fn if_range(req: RequestBuilder, validator: Option<&str>) -> RequestBuilder {
    match validator {
        Some(v) => req.header(IF_RANGE, v),
        None => req,
    }
}

fn credentials_from_uri(uri: &str) -> Option<Credentials> {
    let url = url::Url::parse(uri).ok()?;
    if url.username().is_empty() {
        return None;
    }
    Some(Credentials::new(
        url.username(),
        url.password().map(str::to_string),
    ))
}

/// Streams `response` into `file`, counting bytes into `progress`.
/// With `limit`, more bytes than `limit` is an integrity error.
/// A zero `read_timeout` waits forever between reads.
pub async fn write_body(
    response: Response,
    file: &mut File,
    path: &Path,
    limit: Option<u64>,
    read_timeout: Duration,
    progress: &Progress,
) -> Result<u64, TransferError> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    loop {
        let next = if read_timeout.is_zero() {
            stream.next().await
        } else {
            tokio::time::timeout(read_timeout, stream.next())
                .await
                .map_err(|_| {
                    TransferError::Timeout(format!(
                        "no data for {}s while writing {}",
                        read_timeout.as_secs(),
                        path.display()
                    ))
                })?
        };
        let Some(chunk) = next else { break };
        let chunk = chunk?;
        let len = chunk.len() as u64;
        if let Some(limit) = limit {
            if written + len > limit {
                return Err(TransferError::Integrity {
                    path: path.to_path_buf(),
                    expected: format!("{} bytes", limit),
                    actual: format!("at least {} bytes", written + len),
                });
            }
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        written += len;
        progress.add_bytes(len);
    }
    file.flush().await.map_err(|e| TransferError::io(path, e))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_userinfo_becomes_credentials() {
        let c = credentials_from_uri("https://bob:pw@example.com/a").unwrap();
        assert_eq!(c.username, "bob");
        assert_eq!(c.password.as_deref(), Some("pw"));
        assert!(credentials_from_uri("https://example.com/a").is_none());
    }

    #[test]
    fn bad_header_is_config_error() {
        let opts = JobOptions {
            headers: vec![("bad header".to_string(), "x".to_string())],
            ..JobOptions::default()
        };
        assert!(matches!(
            HttpClient::new(&opts, "http://example.com/"),
            Err(TransferError::Config(_))
        ));
    }

    #[test]
    fn bad_method_is_config_error() {
        let opts = JobOptions {
            method: "GE T".to_string(),
            ..JobOptions::default()
        };
        assert!(matches!(
            HttpClient::new(&opts, "http://example.com/"),
            Err(TransferError::Config(_))
        ));
    }

    #[test]
    fn request_carries_method_query_and_body() {
        let opts = JobOptions {
            method: "post".to_string(),
            body: Some(b"id=7".to_vec()),
            query: vec![("token".to_string(), "abc".to_string())],
            ..JobOptions::default()
        };
        let client = HttpClient::new(&opts, "http://example.com/file").unwrap();
        let req = client.request("http://example.com/file").build().unwrap();
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.url().query(), Some("token=abc"));
        assert_eq!(req.body().and_then(|b| b.as_bytes()), Some(&b"id=7"[..]));

        let plain = client.get("http://example.com/key").build().unwrap();
        assert_eq!(plain.method(), Method::GET);
        assert!(plain.body().is_none());
    }

    #[test]
    fn cookies_join_into_one_header() {
        let cookies = vec![
            ("session".to_string(), "s1".to_string()),
            ("lang".to_string(), " en ".to_string()),
        ];
        assert_eq!(cookie_header(&cookies), "session=s1; lang=en");
    }
}
