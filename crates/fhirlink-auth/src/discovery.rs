//! Issuer endpoint discovery.
//!
//! Turns an issuer base URL into the endpoint set the flow needs, either by
//! fetching the SMART well-known document (`.well-known/smart-configuration`)
//! or the plain OIDC one (`.well-known/openid-configuration`), or by direct
//! construction from already-known endpoints.
//!
//! The SMART document additionally carries `capabilities` and a `services`
//! map (capability key to base URL) that the session orchestrator hands back
//! to the application for service discovery.
//!
//! # References
//!
//! - [SMART Configuration](https://build.fhir.org/ig/HL7/smart-app-launch/conformance.html)
//! - [OpenID Connect Discovery 1.0](https://openid.net/specs/openid-connect-discovery-1_0.html)

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::requestor::HttpRequestor;

/// Well-known path segment shared by both discovery variants.
const WELL_KNOWN_PATH: &str = ".well-known";
/// SMART discovery document name.
const SMART_CONFIGURATION: &str = "smart-configuration";
/// Plain OIDC discovery document name.
const OPENID_CONFIGURATION: &str = "openid-configuration";

/// Service key for the FHIR REST endpoint in the `services` map.
pub const SERVICE_FHIR_REST: &str = "org.fhir.rest";
/// Service key for the openEHR REST endpoint in the `services` map.
pub const SERVICE_OPENEHR_REST: &str = "org.openehr.rest";
/// Service key for the openEHR EhrScape endpoint in the `services` map.
pub const SERVICE_OPENEHR_EHRSCAPE: &str = "org.openehr.ehrscape";
/// Service key for the presigned-upload endpoint in the `services` map.
pub const SERVICE_S3_PRESIGNED_URL: &str = "org.medblocks.s3presignedurl";
/// Service key for the DICOMweb endpoint in the `services` map.
pub const SERVICE_DICOMWEB_REST: &str = "org.dicomstandard.dicomweb.rest";

/// Errors that can occur during endpoint discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A network error occurred while fetching the discovery document.
    #[error("Network error: {0}")]
    Network(String),

    /// The discovery endpoint returned a non-success status code.
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// The discovery document could not be parsed.
    #[error("Failed to parse discovery document: {0}")]
    Parse(String),
}

/// Resolved OAuth endpoint set for one issuer.
///
/// Immutable once constructed; the flow never mutates it and never persists
/// it across reloads (it is re-fetched or re-supplied on each page load).
/// Endpoint URLs are carried as strings without validation; a malformed URL
/// surfaces later as a network failure, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfiguration {
    /// OAuth 2.0 authorization endpoint.
    pub authorization_endpoint: String,

    /// OAuth 2.0 token endpoint.
    pub token_endpoint: String,

    /// OAuth 2.0 token revocation endpoint (RFC 7009).
    pub revocation_endpoint: String,

    /// OIDC UserInfo endpoint, when the issuer advertises one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// OIDC end-session endpoint, when the issuer advertises one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
}

impl ServiceConfiguration {
    /// Constructs a configuration from known endpoints.
    #[must_use]
    pub fn from_endpoints(
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        revocation_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            revocation_endpoint: revocation_endpoint.into(),
            userinfo_endpoint: None,
            end_session_endpoint: None,
        }
    }

    /// Sets the UserInfo endpoint.
    #[must_use]
    pub fn with_userinfo_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.userinfo_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the end-session endpoint.
    #[must_use]
    pub fn with_end_session_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.end_session_endpoint = Some(endpoint.into());
        self
    }
}

/// One entry in the SMART `services` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Base URL of the service.
    #[serde(rename = "baseUrl")]
    pub base_url: String,
}

/// SMART well-known configuration document.
///
/// Parsed from `{issuer}/.well-known/smart-configuration`. The same struct
/// parses the plain OIDC document, whose `capabilities` and `services` are
/// simply absent. Unknown fields are tolerated and dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartConfigurationDocument {
    /// OAuth 2.0 authorization endpoint.
    pub authorization_endpoint: String,

    /// OAuth 2.0 token endpoint.
    pub token_endpoint: String,

    /// OAuth 2.0 token revocation endpoint.
    pub revocation_endpoint: String,

    /// Issuer identifier, when advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// OIDC UserInfo endpoint, when advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// OIDC end-session endpoint, when advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// SMART capabilities advertised by the issuer.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Service discovery map: capability key to service entry.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceEntry>,
}

impl SmartConfigurationDocument {
    /// Derives the endpoint configuration the flow needs.
    #[must_use]
    pub fn service_configuration(&self) -> ServiceConfiguration {
        ServiceConfiguration {
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            revocation_endpoint: self.revocation_endpoint.clone(),
            userinfo_endpoint: self.userinfo_endpoint.clone(),
            end_session_endpoint: self.end_session_endpoint.clone(),
        }
    }

    /// Flattens the `services` map to capability key / base URL pairs.
    #[must_use]
    pub fn service_map(&self) -> BTreeMap<String, String> {
        self.services
            .iter()
            .map(|(key, entry)| (key.clone(), entry.base_url.clone()))
            .collect()
    }

    /// Base URL of the FHIR REST service, when advertised.
    #[must_use]
    pub fn fhir_base_url(&self) -> Option<&str> {
        self.service_base_url(SERVICE_FHIR_REST)
    }

    /// Base URL of the openEHR REST service, when advertised.
    #[must_use]
    pub fn openehr_base_url(&self) -> Option<&str> {
        self.service_base_url(SERVICE_OPENEHR_REST)
    }

    /// Base URL of the EhrScape service, when advertised.
    #[must_use]
    pub fn ehrscape_base_url(&self) -> Option<&str> {
        self.service_base_url(SERVICE_OPENEHR_EHRSCAPE)
    }

    /// Base URL of an arbitrary service key, when advertised.
    #[must_use]
    pub fn service_base_url(&self, key: &str) -> Option<&str> {
        self.services.get(key).map(|entry| entry.base_url.as_str())
    }
}

/// Client for fetching discovery documents from an issuer.
pub struct DiscoveryClient {
    requestor: Arc<dyn HttpRequestor>,
}

impl DiscoveryClient {
    /// Creates a discovery client on top of the given transport.
    #[must_use]
    pub fn new(requestor: Arc<dyn HttpRequestor>) -> Self {
        Self { requestor }
    }

    /// Fetches and parses `{issuer}/.well-known/smart-configuration`.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscoveryError`] if the fetch fails, the endpoint answers
    /// with a non-success status, or the body is not a JSON document with
    /// the required endpoint fields.
    pub async fn fetch_from_issuer(
        &self,
        issuer: &str,
    ) -> Result<SmartConfigurationDocument, DiscoveryError> {
        self.fetch_document(issuer, SMART_CONFIGURATION).await
    }

    /// Fetches `{issuer}/.well-known/openid-configuration` and derives the
    /// endpoint configuration from it.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`fetch_from_issuer`](Self::fetch_from_issuer).
    pub async fn fetch_openid_configuration(
        &self,
        issuer: &str,
    ) -> Result<ServiceConfiguration, DiscoveryError> {
        let document = self.fetch_document(issuer, OPENID_CONFIGURATION).await?;
        Ok(document.service_configuration())
    }

    async fn fetch_document(
        &self,
        issuer: &str,
        document_name: &str,
    ) -> Result<SmartConfigurationDocument, DiscoveryError> {
        let url = well_known_url(issuer, document_name);
        tracing::debug!(url = %url, "fetching discovery document");

        let response = self.requestor.get_json(&url).await.map_err(|e| {
            tracing::warn!(issuer = %issuer, error = %e, "discovery fetch failed");
            DiscoveryError::Network(e.to_string())
        })?;

        if !response.is_success() {
            return Err(DiscoveryError::Http(response.status));
        }

        serde_json::from_str(&response.body).map_err(|e| {
            tracing::warn!(issuer = %issuer, error = %e, "discovery document parse failed");
            DiscoveryError::Parse(e.to_string())
        })
    }
}

/// Builds `{issuer}/.well-known/{document}` with trailing-slash
/// normalization on the issuer.
fn well_known_url(issuer: &str, document_name: &str) -> String {
    format!(
        "{}/{WELL_KNOWN_PATH}/{document_name}",
        issuer.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_url() {
        assert_eq!(
            well_known_url("https://ehr.example/fhir", SMART_CONFIGURATION),
            "https://ehr.example/fhir/.well-known/smart-configuration"
        );
        assert_eq!(
            well_known_url("https://ehr.example/fhir/", OPENID_CONFIGURATION),
            "https://ehr.example/fhir/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_from_endpoints() {
        let config = ServiceConfiguration::from_endpoints(
            "https://ehr.example/authorize",
            "https://ehr.example/token",
            "https://ehr.example/revoke",
        )
        .with_userinfo_endpoint("https://ehr.example/userinfo");

        assert_eq!(config.authorization_endpoint, "https://ehr.example/authorize");
        assert_eq!(config.token_endpoint, "https://ehr.example/token");
        assert_eq!(config.revocation_endpoint, "https://ehr.example/revoke");
        assert_eq!(
            config.userinfo_endpoint.as_deref(),
            Some("https://ehr.example/userinfo")
        );
        assert!(config.end_session_endpoint.is_none());
    }

    #[test]
    fn test_parse_smart_document() {
        let json = r#"{
            "issuer": "https://ehr.example/fhir",
            "authorization_endpoint": "https://ehr.example/fhir/authorize",
            "token_endpoint": "https://ehr.example/fhir/token",
            "revocation_endpoint": "https://ehr.example/fhir/revoke",
            "capabilities": ["launch-ehr", "context-ehr-patient"],
            "services": {
                "org.fhir.rest": { "baseUrl": "https://ehr.example/fhir/r4" },
                "org.openehr.rest": { "baseUrl": "https://ehr.example/openehr" }
            },
            "code_challenge_methods_supported": ["S256"]
        }"#;

        let doc: SmartConfigurationDocument = serde_json::from_str(json).unwrap();

        assert_eq!(doc.issuer.as_deref(), Some("https://ehr.example/fhir"));
        assert_eq!(doc.capabilities, vec!["launch-ehr", "context-ehr-patient"]);
        assert_eq!(doc.fhir_base_url(), Some("https://ehr.example/fhir/r4"));
        assert_eq!(doc.openehr_base_url(), Some("https://ehr.example/openehr"));
        assert_eq!(doc.ehrscape_base_url(), None);

        // Document fields carry over exactly into the configuration.
        let config = doc.service_configuration();
        assert_eq!(
            config.authorization_endpoint,
            "https://ehr.example/fhir/authorize"
        );
        assert_eq!(config.token_endpoint, "https://ehr.example/fhir/token");
        assert_eq!(config.revocation_endpoint, "https://ehr.example/fhir/revoke");
    }

    #[test]
    fn test_parse_document_without_smart_extensions() {
        // The plain OIDC document has no capabilities/services.
        let json = r#"{
            "authorization_endpoint": "https://auth.example/authorize",
            "token_endpoint": "https://auth.example/token",
            "revocation_endpoint": "https://auth.example/revoke"
        }"#;

        let doc: SmartConfigurationDocument = serde_json::from_str(json).unwrap();
        assert!(doc.capabilities.is_empty());
        assert!(doc.services.is_empty());
        assert!(doc.service_map().is_empty());
    }

    #[test]
    fn test_parse_document_missing_required_field() {
        let json = r#"{
            "authorization_endpoint": "https://auth.example/authorize",
            "token_endpoint": "https://auth.example/token"
        }"#;

        let result = serde_json::from_str::<SmartConfigurationDocument>(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_service_map_flattening() {
        let json = r#"{
            "authorization_endpoint": "https://a",
            "token_endpoint": "https://t",
            "revocation_endpoint": "https://r",
            "services": {
                "org.fhir.rest": { "baseUrl": "https://fhir" },
                "org.dicomstandard.dicomweb.rest": { "baseUrl": "https://dicom" }
            }
        }"#;

        let doc: SmartConfigurationDocument = serde_json::from_str(json).unwrap();
        let map = doc.service_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(SERVICE_FHIR_REST).map(String::as_str), Some("https://fhir"));
        assert_eq!(
            map.get(SERVICE_DICOMWEB_REST).map(String::as_str),
            Some("https://dicom")
        );
    }
}
