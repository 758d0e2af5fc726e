//! Identity-token payload decoding.
//!
//! Decodes the claims out of a compact JWT without verifying its signature.
//! This client receives the identity token over TLS directly from the token
//! endpoint it just authenticated against, and treats signature validation
//! as the resource server's concern; nothing here must be used to make
//! trust decisions about tokens obtained elsewhere.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors that can occur while decoding an identity token.
#[derive(Debug, thiserror::Error)]
pub enum IdTokenError {
    /// The token is not a three-segment compact JWT.
    #[error("Malformed identity token: expected three dot-separated segments")]
    Malformed,

    /// The payload segment is not valid base64url.
    #[error("Failed to decode identity token payload: {0}")]
    Decode(String),

    /// The payload is not a JSON claims object.
    #[error("Failed to parse identity token claims: {0}")]
    Parse(String),
}

/// Decoded identity-token claims.
///
/// `fhirUser` is the SMART claim naming the FHIR resource that represents
/// the authenticated user (`Practitioner/123`, `Patient/456`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer of the token.
    pub iss: String,

    /// Issued-at time, seconds since the epoch.
    pub iat: i64,

    /// Expiry time, seconds since the epoch.
    pub exp: i64,

    /// Subject identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// FHIR resource reference for the authenticated user.
    #[serde(
        rename = "fhirUser",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fhir_user: Option<String>,

    /// Every other claim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Decodes the claims from a compact JWT, without signature verification.
///
/// # Errors
///
/// Returns an [`IdTokenError`] if the token does not have exactly three
/// segments, the payload segment is not base64url, or the payload is not a
/// JSON object with the required claims.
pub fn decode_id_token(token: &str) -> Result<IdTokenClaims, IdTokenError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature)) =
        (segments.next(), segments.next(), segments.next())
    else {
        return Err(IdTokenError::Malformed);
    };
    if segments.next().is_some() {
        return Err(IdTokenError::Malformed);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| IdTokenError::Decode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| IdTokenError::Parse(e.to_string()))
}
