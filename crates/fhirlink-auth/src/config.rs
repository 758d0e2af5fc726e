//! Caller-facing flow configuration.
//!
//! The options struct is closed: every recognized parameter is an explicit
//! field, and anything else must go through `extras`, which is validated
//! against the parameters the flow constructs itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::redirect::{RESERVED_PARAMS, ResponseMode};

/// Errors raised by boundary validation of caller configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A required field is empty or absent.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// An extra parameter shadows one the flow constructs itself.
    #[error("Reserved parameter in extras: {key}")]
    ReservedParameter {
        /// The offending key.
        key: String,
    },

    /// Neither an issuer nor direct endpoints were supplied.
    #[error("issuer or (authorization, token & revocation endpoints) must be provided")]
    MissingIssuer,
}

impl ConfigError {
    /// Creates a new `MissingField` error.
    #[must_use]
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Creates a new `ReservedParameter` error.
    #[must_use]
    pub fn reserved_parameter(key: impl Into<String>) -> Self {
        Self::ReservedParameter { key: key.into() }
    }
}

/// Options for one SMART authorization flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartAuthOptions {
    /// OAuth client identifier.
    pub client_id: String,

    /// Issuer base URL. May be omitted on the return leg of the redirect;
    /// the orchestrator then falls back to the issuer persisted from the
    /// most recent invocation that supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// SMART launch parameter for EHR-initiated launches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<String>,

    /// Redirect URI registered for the client.
    pub redirect_uri: String,

    /// Space-separated scope string.
    pub scope: String,

    /// Response delivery mode for the authorization return.
    #[serde(default)]
    pub response_mode: ResponseMode,

    /// Free-form extension parameters for the authorization URL.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, String>,
}

impl SmartAuthOptions {
    /// Creates options with the required parameters.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            iss: None,
            launch: None,
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            response_mode: ResponseMode::default(),
            extras: BTreeMap::new(),
        }
    }

    /// Sets the issuer base URL.
    #[must_use]
    pub fn with_issuer(mut self, iss: impl Into<String>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the SMART launch parameter.
    #[must_use]
    pub fn with_launch(mut self, launch: impl Into<String>) -> Self {
        self.launch = Some(launch.into());
        self
    }

    /// Sets the response delivery mode.
    #[must_use]
    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }

    /// Adds a free-form extension parameter.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Validates the options at the boundary.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required field is empty or an extra
    /// parameter shadows a reserved one. Absence of `iss` is not an error
    /// here; whether it can be recovered from storage is decided later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::missing_field("client_id"));
        }
        if self.redirect_uri.is_empty() {
            return Err(ConfigError::missing_field("redirect_uri"));
        }
        if self.scope.is_empty() {
            return Err(ConfigError::missing_field("scope"));
        }
        if let Some(key) = self
            .extras
            .keys()
            .find(|k| RESERVED_PARAMS.contains(&k.as_str()))
        {
            return Err(ConfigError::reserved_parameter(key.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_options() {
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid")
            .with_issuer("https://ehr.example/fhir")
            .with_launch("launch-1")
            .with_extra("aud", "https://ehr.example/fhir");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let options = SmartAuthOptions::new("", "https://app.example/cb", "openid");
        assert!(matches!(
            options.validate(),
            Err(ConfigError::MissingField { field: "client_id" })
        ));

        let options = SmartAuthOptions::new("app1", "", "openid");
        assert!(matches!(
            options.validate(),
            Err(ConfigError::MissingField {
                field: "redirect_uri"
            })
        ));

        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "");
        assert!(matches!(
            options.validate(),
            Err(ConfigError::MissingField { field: "scope" })
        ));
    }

    #[test]
    fn test_reserved_extras_rejected() {
        for key in ["state", "code_challenge", "client_id", "response_mode"] {
            let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid")
                .with_extra(key, "x");
            assert!(
                matches!(options.validate(), Err(ConfigError::ReservedParameter { .. })),
                "extras key {key} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_issuer_is_not_a_validation_error() {
        // The issuer can be recovered from storage on the return leg, so
        // validate() does not require it.
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid");
        assert!(options.iss.is_none());
        assert!(options.validate().is_ok());
    }
}
