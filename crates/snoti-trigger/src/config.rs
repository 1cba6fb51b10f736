//! Trigger configuration.
//!
//! Values come from an optional JSON file, then environment variables and
//! command-line flags (parsed by the binary). Later sources win.

use crate::{TriggerError, TriggerResult};
use serde::Deserialize;
use snoti_connection::{CertificateVerification, ConnectionError, Settings};
use std::fmt;
use std::path::{Path, PathBuf};

/// Trigger configuration. Keys use the camelCase names of the trigger
/// metadata (`brokerUrl`, `authID`, ...).
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerConfig {
    pub broker_url: Option<String>,
    #[serde(rename = "authID")]
    pub auth_id: Option<String>,
    pub auth_secret: Option<String>,
    pub product_key: Option<String>,
    pub sub_key: Option<String>,
    pub insecure_skip_verify: Option<bool>,
    pub log_level: Option<String>,
    pub log_path: Option<PathBuf>,
}

impl TriggerConfig {
    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> TriggerResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TriggerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Overlay `other` on `self`: every value set in `other` wins.
    pub fn merge(self, other: TriggerConfig) -> Self {
        Self {
            broker_url: other.broker_url.or(self.broker_url),
            auth_id: other.auth_id.or(self.auth_id),
            auth_secret: other.auth_secret.or(self.auth_secret),
            product_key: other.product_key.or(self.product_key),
            sub_key: other.sub_key.or(self.sub_key),
            insecure_skip_verify: other.insecure_skip_verify.or(self.insecure_skip_verify),
            log_level: other.log_level.or(self.log_level),
            log_path: other.log_path.or(self.log_path),
        }
    }

    pub fn certificate_verification(&self) -> CertificateVerification {
        if self.insecure_skip_verify.unwrap_or(false) {
            CertificateVerification::InsecureSkipVerify
        } else {
            CertificateVerification::Enabled
        }
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Validate into connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Config`] naming the first missing field.
    pub fn settings(&self) -> TriggerResult<Settings> {
        let mut builder =
            Settings::builder().certificate_verification(self.certificate_verification());
        if let Some(v) = &self.broker_url {
            builder = builder.broker_url(v);
        }
        if let Some(v) = &self.auth_id {
            builder = builder.auth_id(v);
        }
        if let Some(v) = &self.auth_secret {
            builder = builder.auth_secret(v);
        }
        if let Some(v) = &self.product_key {
            builder = builder.product_key(v);
        }
        if let Some(v) = &self.sub_key {
            builder = builder.sub_key(v);
        }
        builder.build().map_err(|e| match e {
            ConnectionError::InvalidSettings(reason) => TriggerError::Config(reason),
            other => TriggerError::Connection(other),
        })
    }
}

impl fmt::Debug for TriggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerConfig")
            .field("broker_url", &self.broker_url)
            .field("auth_id", &self.auth_id)
            .field("auth_secret", &self.auth_secret.as_ref().map(|_| "<redacted>"))
            .field("product_key", &self.product_key)
            .field("sub_key", &self.sub_key)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("log_level", &self.log_level)
            .field("log_path", &self.log_path)
            .finish()
    }
}
