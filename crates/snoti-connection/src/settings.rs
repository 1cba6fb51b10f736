//! Broker connection settings.

use crate::{ConnectionError, ConnectionResult};
use snoti_protocol::{LoginCredentials, LoginRequest};
use std::fmt;

/// How the broker's TLS certificate is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertificateVerification {
    /// Verify against the bundled web PKI roots.
    #[default]
    Enabled,
    /// Accept any certificate. Only for brokers with self-signed certificates.
    InsecureSkipVerify,
}

/// Immutable settings for one broker connection.
///
/// Built through [`Settings::builder`]; every credential is required.
#[derive(Clone)]
pub struct Settings {
    broker_url: String,
    server_name: String,
    auth_id: String,
    auth_secret: String,
    product_key: String,
    sub_key: String,
    verification: CertificateVerification,
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Broker address as `host:port`.
    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    /// Host part of the broker address, used for TLS SNI and verification.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn auth_id(&self) -> &str {
        &self.auth_id
    }

    pub fn product_key(&self) -> &str {
        &self.product_key
    }

    pub fn sub_key(&self) -> &str {
        &self.sub_key
    }

    pub fn certificate_verification(&self) -> CertificateVerification {
        self.verification
    }

    /// Login frame for these credentials.
    pub fn login_request(&self) -> LoginRequest {
        LoginRequest::new(LoginCredentials::new(
            &self.product_key,
            &self.auth_id,
            &self.auth_secret,
            &self.sub_key,
        ))
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("broker_url", &self.broker_url)
            .field("auth_id", &self.auth_id)
            .field("auth_secret", &"<redacted>")
            .field("product_key", &self.product_key)
            .field("sub_key", &self.sub_key)
            .field("verification", &self.verification)
            .finish()
    }
}

/// Builder for [`Settings`].
#[derive(Default)]
pub struct SettingsBuilder {
    broker_url: Option<String>,
    auth_id: Option<String>,
    auth_secret: Option<String>,
    product_key: Option<String>,
    sub_key: Option<String>,
    verification: CertificateVerification,
}

impl SettingsBuilder {
    pub fn broker_url(mut self, value: impl Into<String>) -> Self {
        self.broker_url = Some(value.into());
        self
    }

    pub fn auth_id(mut self, value: impl Into<String>) -> Self {
        self.auth_id = Some(value.into());
        self
    }

    pub fn auth_secret(mut self, value: impl Into<String>) -> Self {
        self.auth_secret = Some(value.into());
        self
    }

    pub fn product_key(mut self, value: impl Into<String>) -> Self {
        self.product_key = Some(value.into());
        self
    }

    pub fn sub_key(mut self, value: impl Into<String>) -> Self {
        self.sub_key = Some(value.into());
        self
    }

    pub fn certificate_verification(mut self, verification: CertificateVerification) -> Self {
        self.verification = verification;
        self
    }

    /// Validate and build the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidSettings`] naming the first missing
    /// field, or when the broker address is not `host:port`.
    pub fn build(self) -> ConnectionResult<Settings> {
        let broker_url = required("brokerUrl", self.broker_url)?;
        let server_name = split_host(&broker_url)
            .ok_or_else(|| {
                ConnectionError::InvalidSettings(format!(
                    "brokerUrl must be host:port, got {broker_url:?}"
                ))
            })?
            .to_string();

        Ok(Settings {
            server_name,
            broker_url,
            auth_id: required("authID", self.auth_id)?,
            auth_secret: required("authSecret", self.auth_secret)?,
            product_key: required("productKey", self.product_key)?,
            sub_key: required("subKey", self.sub_key)?,
            verification: self.verification,
        })
    }
}

/// `value` exactly as given, or an error when it is missing or blank.
fn required(field: &str, value: Option<String>) -> ConnectionResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConnectionError::InvalidSettings(format!("{field} is required"))),
    }
}

/// Host of a `host:port` or `[v6]:port` address.
fn split_host(addr: &str) -> Option<&str> {
    let (host, port) = match addr.strip_prefix('[') {
        Some(rest) => {
            let (host, tail) = rest.split_once(']')?;
            (host, tail.strip_prefix(':')?)
        }
        None => {
            let (host, port) = addr.rsplit_once(':')?;
            if host.contains(':') {
                return None;
            }
            (host, port)
        }
    };
    port.parse::<u16>().ok()?;
    (!host.is_empty()).then_some(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> SettingsBuilder {
        Settings::builder()
            .broker_url("snoti.example.com:2017")
            .auth_id("auth-id")
            .auth_secret("auth-secret")
            .product_key("product")
            .sub_key("sub")
    }

    #[test]
    fn test_build_complete_settings() {
        let settings = complete().build().unwrap();
        assert_eq!(settings.broker_url(), "snoti.example.com:2017");
        assert_eq!(settings.server_name(), "snoti.example.com");
        assert_eq!(settings.auth_id(), "auth-id");
        assert_eq!(settings.product_key(), "product");
        assert_eq!(settings.sub_key(), "sub");
        assert_eq!(
            settings.certificate_verification(),
            CertificateVerification::Enabled
        );
    }

    #[test]
    fn test_missing_field_is_named() {
        let err = Settings::builder()
            .broker_url("snoti.example.com:2017")
            .auth_id("auth-id")
            .product_key("product")
            .sub_key("sub")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("authSecret is required"), "{err}");

        let err = complete().sub_key("   ").build().unwrap_err();
        assert!(err.to_string().contains("subKey is required"), "{err}");
    }

    #[test]
    fn test_broker_url_needs_port() {
        for bad in ["snoti.example.com", ":2017", "host:notaport", "a:b:1"] {
            let err = complete().broker_url(bad).build().unwrap_err();
            assert!(matches!(err, ConnectionError::InvalidSettings(_)), "{bad}");
        }
    }

    #[test]
    fn test_ipv6_broker_url() {
        let settings = complete().broker_url("[::1]:2017").build().unwrap();
        assert_eq!(settings.server_name(), "::1");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let settings = complete().build().unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("auth-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_login_request_uses_credentials() {
        let settings = complete().build().unwrap();
        let request = settings.login_request();
        assert_eq!(request.cmd, "login_req");
        assert_eq!(request.data.len(), 1);
        assert_eq!(request.data[0].auth_secret, "auth-secret");
        assert_eq!(request.data[0].events.len(), 5);
    }

    #[test]
    fn test_credentials_are_kept_verbatim() {
        let settings = complete()
            .auth_id(" auth-id")
            .auth_secret("  secret with spaces  ")
            .build()
            .unwrap();
        assert_eq!(settings.auth_id(), " auth-id");
        let login = settings.login_request();
        assert_eq!(login.data[0].auth_id, " auth-id");
        assert_eq!(login.data[0].auth_secret, "  secret with spaces  ");
    }
}
