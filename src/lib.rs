//! keystone-resolver - service discovery and session handling for Keystone deployments.
//!
//! This library provides the core functionality for the `ksr` CLI tool:
//! locating the node that hosts a Keystone instance, deriving the cached
//! settings bundle consumers need (auth URLs, credentials, flags), and
//! talking to the identity API through a token-authenticated session.

pub mod cli;
pub mod commands;
pub mod config;
pub mod fleet;
pub mod logging;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod tree;


/// Library-level error type for keystone-resolver operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing attribute on node {node}: {path}")]
    MissingAttribute { node: String, path: String },

    #[error("Invalid attribute on node {node}: {message}")]
    InvalidAttribute { node: String, message: String },

    #[error("Node not found in fleet: {0}")]
    NodeNotFound(String),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Session is not authenticated")]
    Unauthenticated,

    #[error("Session token has been revoked")]
    SessionRevoked,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for keystone-resolver operations.
pub type Result<T> = std::result::Result<T, Error>;
