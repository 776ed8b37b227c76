//! Parental-consent verification
//!
//! Outbound check against the consent attestation service. The call gates an
//! irreversible unban decision, so it is fail-closed: missing configuration,
//! transport errors, timeouts and malformed responses all read as "no
//! consent" and nothing escapes to the caller.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::Duration;
use tracing::{info, warn};

type HmacSha1 = Hmac<Sha1>;

/// Total deadline for the consent-check call
const CONSENT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the consent attestation service
#[derive(Clone)]
pub struct ConsentVerifier {
    url: Option<String>,
    secret: Option<String>,
    client: reqwest::Client,
}

impl ConsentVerifier {
    /// Build a verifier from optional configuration. Absent URL or secret
    /// means every check reports "no consent".
    #[must_use]
    pub fn new(url: Option<String>, secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CONSENT_CHECK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            url: url.filter(|u| !u.is_empty()),
            secret: secret.filter(|s| !s.is_empty()),
            client,
        }
    }

    /// Whether a parental-consent form is on file for the account.
    ///
    /// Never errors; any failure mode yields `false`.
    pub async fn check_parental_consent(&self, account_identifier: &str) -> bool {
        if account_identifier.is_empty() {
            return false;
        }
        let Some(url) = self.url.as_deref() else {
            warn!("consent check URL not configured; consent check skipped");
            return false;
        };
        let Some(secret) = self.secret.as_deref() else {
            warn!("consent check secret not configured; consent check skipped");
            return false;
        };

        let body = consent_request_body(account_identifier);
        let Some(signature) = sign_body(secret, &body) else {
            warn!("failed to sign consent check request");
            return false;
        };

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Signature", signature)
            .body(body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(account = %account_identifier, error = %e, "consent check request failed");
                return false;
            }
        };

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        info!(
            account = %account_identifier,
            status = status,
            body = %text,
            "consent check response"
        );

        consent_from_response(status, &text)
    }
}

/// Exact request body bytes; the signature is computed over these.
fn consent_request_body(account_identifier: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "file_name": account_identifier }))
        .unwrap_or_default()
}

/// Hex HMAC-SHA1 digest of the body under the shared secret
fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Interpret a consent-service response. `true` only for HTTP 200 with a
/// JSON body whose `exist` field is `true`.
fn consent_from_response(status: u16, body: &str) -> bool {
    if status != 200 {
        return false;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("exist")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        Err(_) => {
            warn!("consent check returned non-JSON body");
            false
        }
    }
}
