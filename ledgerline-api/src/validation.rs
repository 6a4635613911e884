//! Credential Shape Validation
//!
//! Syntax checks on a credential form before anything is encrypted, stored
//! or dialed. Independent of the cache and of the network.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Dotted-quad candidate. Octet range is checked by `Ipv4Addr` parsing.
static IPV4_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$"));

/// RFC 1123 host name: dot-separated labels of letters, digits and inner hyphens.
static DOMAIN_PATTERN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
});

const MAX_HOST_LEN: usize = 253;

/// Raw credential form as submitted by an administrator.
#[derive(Clone, Default, Deserialize)]
pub struct CredentialForm {
    #[serde(default)]
    pub host: String,
    /// Accepts both `"5432"` and `5432`.
    #[serde(default, deserialize_with = "port_as_string")]
    pub port: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for CredentialForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialForm")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn port_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Text(String),
        Number(i64),
    }

    Ok(match PortValue::deserialize(deserializer)? {
        PortValue::Text(s) => s,
        PortValue::Number(n) => n.to_string(),
    })
}

/// Result of [`validate_shape`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ShapeReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Whether `host` is an IPv4 address or a domain name.
pub fn is_valid_host(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOST_LEN {
        return false;
    }
    if matches!(&*IPV4_PATTERN, Ok(re) if re.is_match(host)) {
        return host.parse::<Ipv4Addr>().is_ok();
    }
    matches!(&*DOMAIN_PATTERN, Ok(re) if re.is_match(host))
}

/// Parse a port in `1..=65535`.
pub fn parse_port(port: &str) -> Option<u16> {
    let port = port.trim();
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    port.parse::<u16>().ok().filter(|p| *p != 0)
}

/// Check every field and collect one message per problem.
pub fn validate_shape(host: &str, port: &str, username: &str, password: &str) -> ShapeReport {
    let mut errors = Vec::new();

    let host = host.trim();
    if host.is_empty() {
        errors.push("Host is required".to_string());
    } else if !is_valid_host(host) {
        errors.push("Host must be a valid IPv4 address or domain name".to_string());
    }

    if port.trim().is_empty() {
        errors.push("Port is required".to_string());
    } else if parse_port(port).is_none() {
        errors.push("Port must be a number between 1 and 65535".to_string());
    }

    if username.trim().is_empty() {
        errors.push("Username is required".to_string());
    }

    if password.is_empty() {
        errors.push("Password is required".to_string());
    }

    ShapeReport::from_errors(errors)
}

impl CredentialForm {
    pub fn validate(&self) -> ShapeReport {
        validate_shape(&self.host, &self.port, &self.username, &self.password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_form() {
        let report = validate_shape("192.168.1.10", "5432", "reader", "secret");
        assert!(report.valid);
        assert!(report.errors.is_empty());

        assert!(validate_shape("erp.example.com", "1", "u", "p").valid);
        assert!(validate_shape("localhost", "65535", "u", "p").valid);
    }

    #[test]
    fn test_hosts() {
        assert!(is_valid_host("10.0.0.1"));
        assert!(is_valid_host("db-01.internal.example"));
        assert!(!is_valid_host("256.1.1.1"));
        assert!(!is_valid_host("-bad.example.com"));
        assert!(!is_valid_host("bad_host.example.com"));
        assert!(!is_valid_host("has space.com"));
        assert!(!is_valid_host(&"a".repeat(254)));
    }

    #[test]
    fn test_ports() {
        assert_eq!(parse_port("5432"), Some(5432));
        assert_eq!(parse_port(" 1 "), Some(1));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("65536"), None);
        assert_eq!(parse_port("-1"), None);
        assert_eq!(parse_port("54a"), None);
        assert_eq!(parse_port("+80"), None);
    }

    #[test]
    fn test_collects_every_error() {
        let report = validate_shape("", "99999", " ", "");
        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec![
                "Host is required".to_string(),
                "Port must be a number between 1 and 65535".to_string(),
                "Username is required".to_string(),
                "Password is required".to_string(),
            ]
        );
    }

    #[test]
    fn test_form_accepts_numeric_port() -> Result<(), serde_json::Error> {
        let form: CredentialForm = serde_json::from_str(
            r#"{"host":"10.0.0.1","port":5432,"username":"u","password":"p"}"#,
        )?;
        assert_eq!(form.port, "5432");
        assert!(form.validate().valid);

        let form: CredentialForm = serde_json::from_str(r#"{"host":"10.0.0.1"}"#)?;
        assert_eq!(form.validate().errors.len(), 3);
        Ok(())
    }

    #[test]
    fn test_form_debug_redacts_password() {
        let form = CredentialForm {
            password: "hunter2".to_string(),
            ..CredentialForm::default()
        };
        assert!(!format!("{form:?}").contains("hunter2"));
    }
}
