//! HTTP transport for identity API sessions.
//!
//! [`Transport`] is the seam between session logic and the wire. The
//! production implementation, [`UreqTransport`], is a blocking `ureq` agent
//! bound to one `protocol://host:port` endpoint.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::settings::schema::Protocol;
use crate::{Error, Result};

/// HTTP verbs used against the identity API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Reason phrase, e.g. "Unauthorized"
    pub message: String,
    /// Header names are stored lowercased
    headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    fn from_ureq(response: ureq::Response) -> Self {
        let mut headers = BTreeMap::new();
        for name in response.headers_names() {
            if let Some(value) = response.header(&name) {
                headers.insert(name.to_ascii_lowercase(), value.to_string());
            }
        }
        let status = response.status();
        let message = response.status_text().to_string();
        let body = read_body(response.into_reader());
        Self {
            status,
            message,
            headers,
            body,
        }
    }
}

/// Read a response body as text. Invalid UTF-8 is replaced and a failed read
/// keeps whatever arrived, so the status still reaches the retry logic.
fn read_body(mut reader: impl Read) -> String {
    let mut bytes = Vec::new();
    if let Err(e) = reader.read_to_end(&mut bytes) {
        debug!("Failed to read response body: {}", e);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Sends one HTTP request and returns the response, whatever its status.
///
/// Implementations return `Err` only when no response was received at all.
pub trait Transport {
    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&str>,
        headers: &[(String, String)],
    ) -> Result<HttpResponse>;
}

/// Where the identity API lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Skip certificate verification (only meaningful for https)
    pub insecure: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
            insecure: false,
        }
    }

    /// Disable certificate verification.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Blocking `ureq` transport bound to one endpoint.
pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: String,
}

impl UreqTransport {
    /// Build an agent for `endpoint`.
    ///
    /// `timeout` bounds connecting and each read; `None` waits forever.
    pub fn new(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout_connect(timeout).timeout_read(timeout);
        }
        if endpoint.protocol.is_secure() && endpoint.insecure {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| Error::Transport(format!("TLS setup failed: {}", e)))?;
            builder = builder.tls_connector(Arc::new(connector));
        }

        Ok(Self {
            agent: builder.build(),
            base_url: endpoint.base_url(),
        })
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Transport for UreqTransport {
    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&str>,
        headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.agent.request(method.as_str(), &url);
        for (name, value) in headers {
            request = request.set(name, value);
        }

        let result = match body {
            Some(body) => request.send_string(body),
            None => request.call(),
        };

        match result {
            Ok(response) => Ok(HttpResponse::from_ureq(response)),
            // ureq reports 4xx/5xx as errors; for us they are ordinary responses.
            Err(ureq::Error::Status(_, response)) => Ok(HttpResponse::from_ureq(response)),
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }
}
