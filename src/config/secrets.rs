//! Secret handling utilities.
//!
//! Re-exports secrecy types and reads secret-bearing environment
//! variables without ever holding them in a plain `String` field.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Read an environment variable as a secret. Unset or empty is `None`.
pub fn secret_from_env(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

/// Host part of a connection URL, for logging without credentials.
pub fn redacted_host(url: &SecretString) -> String {
    let raw = url.expose_secret();
    let after_scheme = raw.split_once("://").map(|(_, rest)| rest).unwrap_or(raw);
    let host = after_scheme
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(after_scheme);
    host.split('/').next().unwrap_or(host).to_string()
}
