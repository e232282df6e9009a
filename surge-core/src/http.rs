use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::{Duration, Instant};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// URLs are supported for now: {0}")]
    OnlyHttpSupported(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Time from sending the request to the last body byte.
    pub elapsed: Duration,
    /// Estimated bytes received on the wire (HTTP/1.1 status line + headers + body).
    pub bytes_received: u64,
    /// Estimated bytes sent on the wire (HTTP/1.1 request line + headers + body).
    pub bytes_sent: u64,
}

impl HttpResponse {
    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: http::Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Plain HTTP/1.1 client used by iteration functions. The engine itself
/// never issues requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpConnector, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);

        let inner = Client::builder(TokioExecutor::new()).build(connector);

        Self { inner }
    }
}

impl HttpClient {
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout;
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" {
            return Err(Error::OnlyHttpSupported(req.url));
        }

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut bytes_sent = request_line_bytes(&req.method, &uri).saturating_add(2);
        let mut builder = Request::builder().method(req.method).uri(uri);

        // Make implicit headers explicit so the byte accounting is deterministic.
        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            bytes_sent = bytes_sent.saturating_add(header_bytes("host", &host));
            builder = builder.header(http::header::HOST, host);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            let len = req.body.len().to_string();
            bytes_sent = bytes_sent.saturating_add(header_bytes("content-length", &len));
            builder = builder.header(http::header::CONTENT_LENGTH, len);
        }

        for (k, v) in &req.headers {
            bytes_sent = bytes_sent.saturating_add(header_bytes(k, v));
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }
        bytes_sent = bytes_sent.saturating_add(req.body.len() as u64);

        let request: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        let started = Instant::now();
        let res: hyper::Response<Incoming> = if let Some(timeout) = timeout {
            match tokio::time::timeout(timeout, self.inner.request(request)).await {
                Ok(res) => res?,
                Err(_) => return Err(Error::Timeout(timeout)),
            }
        } else {
            self.inner.request(request).await?
        };

        let (parts, body) = res.into_parts();
        let status = parts.status.as_u16();

        // "HTTP/1.1 SP 200 CRLF" (the reason-phrase is intentionally ignored),
        // then one "name: value CRLF" per header, then the header-ending CRLF.
        let mut head_bytes = ("HTTP/1.1 ".len() as u64)
            .saturating_add(parts.status.as_str().len() as u64)
            .saturating_add(2);
        for (name, value) in parts.headers.iter() {
            head_bytes = head_bytes
                .saturating_add(name.as_str().len() as u64)
                .saturating_add(2)
                .saturating_add(value.len() as u64)
                .saturating_add(2);
        }
        head_bytes = head_bytes.saturating_add(2);

        let body = body.collect().await?.to_bytes();
        let elapsed = started.elapsed();
        let bytes_received = head_bytes.saturating_add(body.len() as u64);

        Ok(HttpResponse {
            status,
            body,
            elapsed,
            bytes_received,
            bytes_sent,
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }

    pub async fn post(&self, url: &str, body: Bytes) -> Result<HttpResponse> {
        self.request(HttpRequest::post(url, body)).await
    }
}

fn request_line_bytes(method: &http::Method, uri: &hyper::Uri) -> u64 {
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    // "METHOD SP path SP HTTP/1.1 CRLF"
    (method.as_str().len() as u64)
        .saturating_add(1)
        .saturating_add(path.len() as u64)
        .saturating_add(1)
        .saturating_add("HTTP/1.1".len() as u64)
        .saturating_add(2)
}

fn header_bytes(name: &str, value: &str) -> u64 {
    // "name: value\r\n"
    (name.len() as u64)
        .saturating_add(2)
        .saturating_add(value.len() as u64)
        .saturating_add(2)
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) if port != 80 => Some(format!("{host}:{port}")),
        _ => Some(host.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_http_schemes_are_rejected() {
        let client = HttpClient::default();
        let res = client.get("https://example.com/").await;
        assert!(matches!(res, Err(Error::OnlyHttpSupported(_))));
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected() {
        let client = HttpClient::default();
        let res = client.get("not a url").await;
        assert!(matches!(res, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn request_builders_attach_headers_and_timeouts() {
        let req = HttpRequest::post("http://localhost:3000/json", Bytes::from_static(b"{}"))
            .with_header("Content-Type", "application/json")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(req.method, http::Method::POST);
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
    }
}
