//! Token-authenticated sessions against the Keystone v3 API.
//!
//! An [`AuthSession`] asks for a token with a password grant as soon as it is
//! created and attaches it to every later request as `X-Auth-Token`. Failing
//! to obtain a token is not an error: it is logged and the session stays
//! [`SessionState::Unauthenticated`], which callers check through
//! [`AuthSession::is_authenticated`].
//!
//! All verbs go through one retrying primitive. Only server-class (5xx)
//! responses are retried; anything else, including 4xx, comes straight back
//! as an [`HttpResponse`]. When the attempts run out the last response is
//! returned as-is.

pub mod retry;
pub mod transport;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::{Error, Result};

pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use transport::{Endpoint, HttpResponse, Method, Transport, UreqTransport};

/// Token issuance and revocation path.
pub const TOKENS_PATH: &str = "/v3/auth/tokens";

/// Header carrying a token on requests.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Header carrying the token subject of issuance/revocation.
pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Domain used when a credential names none.
pub const DEFAULT_DOMAIN: &str = "Default";

/// Password credentials, optionally project-scoped.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub project: Option<String>,
    pub user_domain: Option<String>,
    pub project_domain: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .field("project", &self.project)
            .field("user_domain", &self.user_domain)
            .field("project_domain", &self.project_domain)
            .finish()
    }
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Scope the token to a project.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_user_domain(mut self, domain: impl Into<String>) -> Self {
        self.user_domain = Some(domain.into());
        self
    }

    pub fn with_project_domain(mut self, domain: impl Into<String>) -> Self {
        self.project_domain = Some(domain.into());
        self
    }

    /// Password-grant request body.
    pub fn auth_request(&self) -> AuthRequest<'_> {
        AuthRequest {
            auth: AuthBlock {
                identity: Identity {
                    methods: ["password"],
                    password: PasswordMethod {
                        user: UserRef {
                            name: &self.user,
                            password: &self.password,
                            domain: DomainRef {
                                name: self.user_domain.as_deref().unwrap_or(DEFAULT_DOMAIN),
                            },
                        },
                    },
                },
                scope: self.project.as_deref().map(|project| Scope {
                    project: ProjectRef {
                        name: project,
                        domain: DomainRef {
                            name: self.project_domain.as_deref().unwrap_or(DEFAULT_DOMAIN),
                        },
                    },
                }),
            },
        }
    }
}

/// `{"auth": {"identity": ..., "scope": ...}}`
#[derive(Debug, Serialize)]
pub struct AuthRequest<'a> {
    auth: AuthBlock<'a>,
}

#[derive(Debug, Serialize)]
struct AuthBlock<'a> {
    identity: Identity<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<Scope<'a>>,
}

#[derive(Debug, Serialize)]
struct Identity<'a> {
    methods: [&'static str; 1],
    password: PasswordMethod<'a>,
}

#[derive(Debug, Serialize)]
struct PasswordMethod<'a> {
    user: UserRef<'a>,
}

#[derive(Debug, Serialize)]
struct UserRef<'a> {
    name: &'a str,
    password: &'a str,
    domain: DomainRef<'a>,
}

#[derive(Debug, Serialize)]
struct Scope<'a> {
    project: ProjectRef<'a>,
}

#[derive(Debug, Serialize)]
struct ProjectRef<'a> {
    name: &'a str,
    domain: DomainRef<'a>,
}

#[derive(Debug, Serialize)]
struct DomainRef<'a> {
    name: &'a str,
}

/// Lifecycle of a session's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Token acquisition failed
    Unauthenticated,
    /// Holding a live token
    Authenticated,
    /// Token revoked; terminal
    Revoked,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticated => "authenticated",
            SessionState::Revoked => "revoked",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token-carrying client for the identity API.
pub struct AuthSession {
    transport: Box<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    retry: RetryPolicy,
    token: Option<String>,
    state: SessionState,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("state", &self.state)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Connect to `endpoint` over HTTP(S) and authenticate.
    ///
    /// Errors only when the HTTP agent cannot be built; authentication
    /// failures leave the session unauthenticated.
    pub fn connect(
        credentials: &Credentials,
        endpoint: &Endpoint,
        retry: RetryPolicy,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let transport = UreqTransport::new(endpoint, timeout)?;
        Ok(Self::authenticate(
            credentials,
            Box::new(transport),
            retry,
            Box::new(ThreadSleeper),
        ))
    }

    /// Authenticate over an existing transport.
    pub fn authenticate(
        credentials: &Credentials,
        transport: Box<dyn Transport>,
        retry: RetryPolicy,
        sleeper: Box<dyn Sleeper>,
    ) -> Self {
        let mut session = Self {
            transport,
            sleeper,
            retry,
            token: None,
            state: SessionState::Unauthenticated,
        };
        if let Some(token) = session.request_token(credentials) {
            session.token = Some(token);
            session.state = SessionState::Authenticated;
        }
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// The current token, while authenticated.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn get(&self, path: &str) -> Result<HttpResponse> {
        self.request(Method::Get, path, None, &[])
    }

    pub fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<HttpResponse> {
        let body = serde_json::to_string(body)?;
        self.request(Method::Post, path, Some(body), &[])
    }

    pub fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<HttpResponse> {
        let body = serde_json::to_string(body)?;
        self.request(Method::Put, path, Some(body), &[])
    }

    pub fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<HttpResponse> {
        let body = serde_json::to_string(body)?;
        self.request(Method::Patch, path, Some(body), &[])
    }

    /// DELETE with optional extra headers.
    pub fn delete(&self, path: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        self.request(Method::Delete, path, None, headers)
    }

    /// Revoke the token and move to [`SessionState::Revoked`].
    ///
    /// Returns the revocation response, or `None` when there was no token to
    /// revoke. On a transport error the session keeps its token.
    pub fn revoke(&mut self) -> Result<Option<HttpResponse>> {
        let Some(token) = self.token.clone() else {
            self.state = SessionState::Revoked;
            return Ok(None);
        };

        let response = self.send_with_retry(
            Method::Delete,
            TOKENS_PATH,
            None,
            &[(SUBJECT_TOKEN_HEADER, token.as_str())],
        )?;
        self.token = None;
        self.state = SessionState::Revoked;
        Ok(Some(response))
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        extra_headers: &[(&str, &str)],
    ) -> Result<HttpResponse> {
        match self.state {
            SessionState::Authenticated => {}
            SessionState::Unauthenticated => return Err(Error::Unauthenticated),
            SessionState::Revoked => return Err(Error::SessionRevoked),
        }
        self.send_with_retry(method, path, body.as_deref(), extra_headers)
    }

    fn request_token(&self, credentials: &Credentials) -> Option<String> {
        let body = match serde_json::to_string(&credentials.auth_request()) {
            Ok(body) => body,
            Err(e) => {
                info!("Failed to encode token request: {}", e);
                return None;
            }
        };

        let response = match self.send_with_retry(Method::Post, TOKENS_PATH, Some(&body), &[]) {
            Ok(response) => response,
            Err(e) => {
                info!("{}", token_failure_message(credentials));
                info!("Transport error: {}", e);
                return None;
            }
        };

        if response.is_success() {
            if let Some(token) = response.header(SUBJECT_TOKEN_HEADER) {
                return Some(token.to_string());
            }
        }

        info!("{}", token_failure_message(credentials));
        info!("Response Code: {}", response.status);
        info!("Response Message: {}", response.message);
        None
    }

    fn headers(&self, extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(ref token) = self.token {
            headers.push((AUTH_TOKEN_HEADER.to_string(), token.clone()));
        }
        for (name, value) in extra {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.to_string(), value.to_string()));
        }
        headers
    }

    /// Send, retrying server errors per the policy.
    fn send_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<&str>,
        extra_headers: &[(&str, &str)],
    ) -> Result<HttpResponse> {
        let headers = self.headers(extra_headers);
        let attempts = self.retry.max_attempts();
        let mut attempt = 1;
        loop {
            let response = self.transport.send(method, path, body, &headers)?;
            if attempt >= attempts || !self.retry.should_retry(response.status) {
                return Ok(response);
            }
            debug!("Retrying request {} {} : {}", method, path, attempt);
            self.sleeper.sleep(self.retry.delay);
            attempt += 1;
        }
    }
}

fn token_failure_message(credentials: &Credentials) -> String {
    let mut message = format!("Failed to get token for User '{}'", credentials.user);
    if let Some(ref project) = credentials.project {
        message.push_str(&format!(" Project '{}'", project));
    }
    message
}

/// Holds at most one session for reuse across calls.
#[derive(Debug, Default)]
pub struct SessionSlot {
    session: Option<AuthSession>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The held session, creating it with `connect` on first use.
    pub fn get_or_connect<F>(&mut self, connect: F) -> Result<&mut AuthSession>
    where
        F: FnOnce() -> Result<AuthSession>,
    {
        let session = match self.session.take() {
            Some(session) => session,
            None => connect()?,
        };
        Ok(self.session.insert(session))
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Revoke the held session's token and drop the session.
    ///
    /// If revocation fails the session stays in the slot, token intact, so a
    /// later `reset` can try again.
    pub fn reset(&mut self) -> Result<Option<HttpResponse>> {
        let response = match self.session.as_mut() {
            Some(session) => session.revoke()?,
            None => return Ok(None),
        };
        self.session = None;
        Ok(response)
    }
}
