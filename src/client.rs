use crate::error::{ControllerError, Result};
use crate::session::Session;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const AUTH_HEADER: &str = "X-Auth-Token";

static USER_AGENT: &str = concat!("apicctl/", env!("CARGO_PKG_VERSION"));

/// Outcome of a lookup where a 404 or an empty body means "no match".
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(Value),
    NotFound,
}

/// A response that reached the controller, whatever its status.
#[derive(Debug)]
pub struct RawReply {
    url: Url,
    status: StatusCode,
    text: String,
}

impl RawReply {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The body as JSON, if it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.text).ok()
    }

    /// Requires a 2xx status and a non-empty JSON body.
    pub fn into_json(self) -> Result<Value> {
        if !self.status.is_success() {
            return Err(self.into_error());
        }
        if self.text.trim().is_empty() {
            return Err(ControllerError::transport(
                self.url.as_str(),
                Some(self.status.as_u16()),
                "empty response",
            ));
        }
        serde_json::from_str(&self.text).map_err(|_| {
            ControllerError::transport(
                self.url.as_str(),
                Some(self.status.as_u16()),
                format!("response is not JSON: {}", summarize_body(&self.text)),
            )
        })
    }

    pub fn into_error(self) -> ControllerError {
        ControllerError::transport(
            self.url.as_str(),
            Some(self.status.as_u16()),
            summarize_body(&self.text),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ControllerClient {
    base_url: Url,
    http: Client,
}

impl ControllerClient {
    pub fn new(base_url: &str, verify_tls: bool, timeout: Duration) -> Result<Self> {
        let mut parsed = Url::parse(base_url).map_err(|e| {
            ControllerError::transport(base_url, None, format!("invalid controller url: {e}"))
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ControllerError::transport(
                base_url,
                None,
                "controller url cannot carry a path",
            ));
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }

        let http = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .user_agent(HeaderValue::from_static(USER_AGENT))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                ControllerError::transport(base_url, None, format!("building HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: parsed,
            http,
        })
    }

    /// Builds `<base>/<seg>/<seg>...`, escaping each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET returning the JSON body. Any non-2xx status, 404 included, and an
    /// empty body are transport failures.
    pub fn get(
        &self,
        session: &Session,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Value> {
        self.get_raw(session, segments, query)?.into_json()
    }

    /// GET for lookups the controller answers with 404 or an empty body when
    /// nothing matches.
    pub fn get_optional(
        &self,
        session: &Session,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Reply> {
        let raw = self.get_raw(session, segments, query)?;
        let empty = raw.status.is_success() && raw.text.trim().is_empty();
        if raw.status == StatusCode::NOT_FOUND || empty {
            return Ok(Reply::NotFound);
        }
        raw.into_json().map(Reply::Success)
    }

    /// GET that hands back any response the controller produced. Only
    /// connection-level failures are errors.
    pub fn get_raw(
        &self,
        session: &Session,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<RawReply> {
        let url = self.endpoint(segments);
        let mut request = self
            .http
            .get(url.clone())
            .header(AUTH_HEADER, session.ticket());
        if !query.is_empty() {
            request = request.query(query);
        }
        self.send(request, url)
    }

    pub fn post_json<T: Serialize + ?Sized>(&self, segments: &[&str], body: &T) -> Result<Value> {
        let url = self.endpoint(segments);
        let request = self.http.post(url.clone()).json(body);
        self.send(request, url)?.into_json()
    }

    fn send(&self, request: RequestBuilder, url: Url) -> Result<RawReply> {
        let response = request
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .map_err(|e| ControllerError::transport(url.as_str(), None, e.to_string()))?;

        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "controller responded");

        let text = response.text().map_err(|e| {
            ControllerError::transport(url.as_str(), Some(status.as_u16()), e.to_string())
        })?;
        Ok(RawReply { url, status, text })
    }
}

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response".into();
    }
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
