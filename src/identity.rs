//! Bearer token verification against an external identity service.
//!
//! The service is opaque to the rest of the crate: a token goes in and a
//! verified subject (or a reason for rejection) comes out. The production
//! implementation calls the Identity Toolkit `accounts:lookup` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

// ---

/// Default `accounts:lookup` endpoint.
pub const DEFAULT_LOOKUP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:lookup";

/// Identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSubject {
    pub uid: String,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("JSON parse failed: {0}")]
    Decode(String),

    #[error("Identity provider error: {0}")]
    Rejected(String),

    #[error("No users in response")]
    NoUsers,

    #[error("No UID found")]
    NoUid,
}

/// Turns a bearer token into a verified subject.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedSubject, VerifyError>;
}

/// Verifier backed by the Identity Toolkit REST API.
pub struct IdentityToolkitVerifier {
    client: Client,
    lookup_url: String,
    api_key: String,
}

impl IdentityToolkitVerifier {
    // ---
    pub fn new(client: Client, lookup_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            lookup_url: lookup_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TokenVerifier for IdentityToolkitVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedSubject, VerifyError> {
        // ---
        tracing::debug!("Looking up id token at {}", self.lookup_url);

        let response = self
            .client
            .post(&self.lookup_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "idToken": token }))
            .send()
            .await
            .map_err(|e| VerifyError::Request(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| VerifyError::Decode(e.to_string()))?;

        subject_from_lookup(&body)
    }
}

/// Interpret an `accounts:lookup` response body.
///
/// Providers report rejection in an `error` object rather than through the
/// HTTP status alone, so the body is authoritative.
pub fn subject_from_lookup(body: &Value) -> Result<VerifiedSubject, VerifyError> {
    // ---
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(VerifyError::Rejected(message.to_string()));
    }

    let first = body
        .get("users")
        .and_then(Value::as_array)
        .and_then(|users| users.first())
        .ok_or(VerifyError::NoUsers)?;

    let uid = first
        .get("localId")
        .and_then(Value::as_str)
        .ok_or(VerifyError::NoUid)?;

    Ok(VerifiedSubject {
        uid: uid.to_string(),
    })
}
