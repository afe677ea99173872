//! Service URL construction.

use super::schema::Protocol;

/// `protocol://host:port`
pub fn service_url(protocol: Protocol, host: &str, port: u16) -> String {
    format!("{}://{}:{}", protocol, host, port)
}

/// `protocol://host:port/v<version>/`, adding the `v` only when missing.
pub fn versioned_service_url(protocol: Protocol, host: &str, port: u16, version: &str) -> String {
    let segment = if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{}", version)
    };
    format!("{}/{}/", service_url(protocol, host, port), segment)
}

/// Version string expected by the auth middleware: always one decimal, `v3.0`.
pub fn middleware_version(version: f64) -> String {
    format!("v{:.1}", version)
}

/// Join a path onto a base URL with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
