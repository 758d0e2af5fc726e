//! # fhirlink-auth
//!
//! SMART on FHIR OAuth 2.0 client for redirect-based hosts.
//!
//! This crate drives the authorization-code-with-PKCE flow for applications
//! that authenticate against a SMART-enabled issuer: it discovers the
//! issuer's endpoints from its well-known configuration, persists the
//! in-flight authorization across the redirect navigation, validates the
//! return, exchanges the code for tokens, decodes the identity token, and
//! hands the application its access token together with the SMART launch
//! context and service map.
//!
//! ## Overview
//!
//! The flow has no in-memory continuity across the redirect. Everything the
//! return leg needs is persisted through a pluggable [`StorageBackend`]
//! before navigation, and the next page load reconstructs the flow from
//! that record. Navigation itself goes through the pluggable [`Navigator`]
//! capability and HTTP through [`HttpRequestor`], so the whole state
//! machine runs headlessly in tests.
//!
//! ```ignore
//! use std::sync::Arc;
//! use fhirlink_auth::{SmartAuthOptions, SmartSession, SessionOutcome};
//!
//! let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid launch/patient")
//!     .with_issuer("https://ehr.example/fhir");
//! let session = SmartSession::builder(options)
//!     .storage(storage)
//!     .navigator(navigator)
//!     .build()?;
//!
//! match session.authorize(&current_url).await? {
//!     SessionOutcome::Redirected => { /* page is navigating away */ }
//!     SessionOutcome::Completed(response) => {
//!         println!("patient in context: {:?}", response.context.patient);
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Caller-facing flow options and boundary validation
//! - [`discovery`] - Issuer endpoint discovery (SMART and plain OIDC)
//! - [`storage`] - Durable key-value contract for cross-redirect state
//! - [`redirect`] - The redirect authorization state machine
//! - [`pkce`] - PKCE verifier/challenge pair (RFC 7636, S256 only)
//! - [`token`] - Code-for-token exchange and best-effort revocation
//! - [`id_token`] - Signature-agnostic identity-token payload decoding
//! - [`session`] - Session orchestration and the public entry points
//! - [`requestor`] - Pluggable HTTP transport
//! - [`error`] - Top-level error type

pub mod config;
pub mod discovery;
pub mod error;
pub mod id_token;
pub mod pkce;
pub mod redirect;
pub mod requestor;
pub mod session;
pub mod storage;
pub mod token;

pub use config::{ConfigError, SmartAuthOptions};
pub use discovery::{
    DiscoveryClient, DiscoveryError, ServiceConfiguration, ServiceEntry,
    SmartConfigurationDocument,
};
pub use error::{AuthError, ErrorCategory};
pub use id_token::{IdTokenClaims, IdTokenError, decode_id_token};
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use redirect::{
    AuthorizationError, AuthorizationRequest, AuthorizationResponse, CompletionOutcome,
    Navigator, PendingAuthorization, RedirectFlowDriver, ResponseMode, StateMismatchError,
    ValidatedAuthorization,
};
pub use requestor::{HttpRequestor, HttpResponse, RequestorError, ReqwestRequestor};
pub use session::{
    NoTokenError, SessionOutcome, SmartAuthResponse, SmartContext, SmartSession,
    SmartSessionBuilder, smart_auth,
};
pub use storage::{MemoryStorage, StorageBackend, StorageError, StorageKeys};
pub use token::{
    GrantType, RevokeTokenRequest, TokenClient, TokenExchangeError, TokenRequest, TokenResponse,
};

/// Type alias for authorization-flow results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use fhirlink_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{ConfigError, SmartAuthOptions};
    pub use crate::discovery::{DiscoveryClient, ServiceConfiguration, SmartConfigurationDocument};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::redirect::{AuthorizationRequest, Navigator, RedirectFlowDriver, ResponseMode};
    pub use crate::requestor::{HttpRequestor, ReqwestRequestor};
    pub use crate::session::{
        SessionOutcome, SmartAuthResponse, SmartContext, SmartSession, smart_auth,
    };
    pub use crate::storage::{MemoryStorage, StorageBackend, StorageError, StorageKeys};
    pub use crate::token::{TokenClient, TokenRequest, TokenResponse};
}
