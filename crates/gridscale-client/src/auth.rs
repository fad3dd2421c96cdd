//! Credential management for the control plane.
//!
//! Three authentication schemes, selected by which inputs are configured:
//! identity + password, identity + service-account secret (an RS256-signed
//! assertion), or no authentication at all. The obtained bearer token is
//! opaque; no expiry is tracked client-side — the request layer renews it
//! whenever the control plane answers 401.

use std::path::PathBuf;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::HttpClient;
use crate::error::{ClientError, ClientResult};

/// Login endpoint on the control plane.
const LOGIN_PATH: &str = "/auth/v1/login";
/// CA bundle endpoint on the control plane.
const CA_PATH: &str = "/ca/cluster-ca.crt";

/// An opaque bearer credential for control-plane calls.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    token: Option<String>,
}

impl Credential {
    /// Value for the `Authorization` header, if any credential is held.
    pub fn header_value(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("token={t}"))
    }
}

/// Inputs selecting the authentication scheme.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Identity (uid) to authenticate as.
    pub uid: Option<String>,
    /// Password for the uid.
    pub password: Option<String>,
    /// Service-account secret: a JSON blob carrying a `private_key` PEM.
    pub secret: Option<String>,
    /// Where the fetched CA bundle is cached.
    pub ca_bundle: PathBuf,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    uid: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct ServiceAccountSecret {
    private_key: String,
}

/// Owns the current [`Credential`] and knows how to obtain or renew it
/// against the control plane's identity endpoint.
pub struct CredentialManager {
    master: String,
    config: AuthConfig,
    credential: Credential,
}

impl CredentialManager {
    pub fn new(master: String, config: AuthConfig) -> Self {
        Self {
            master,
            config,
            credential: Credential::default(),
        }
    }

    /// The credential presented on outgoing calls. Read-only to callers;
    /// only `authenticate` replaces it.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Obtain or renew the bearer credential.
    ///
    /// With no auth inputs configured this leaves an empty credential and
    /// calls go out unauthenticated. A login response without a token field
    /// is fatal: a bad credential configuration cannot self-heal.
    pub async fn authenticate(&mut self, http: &HttpClient) -> ClientResult<()> {
        self.ensure_ca_bundle(http).await?;

        let body = match self.login_body()? {
            Some(b) => b,
            None => {
                debug!("no authentication configured, calls go out unauthenticated");
                self.credential = Credential::default();
                return Ok(());
            }
        };

        let uri = format!("{}{}", self.master, LOGIN_PATH);
        let req = http::Request::builder()
            .method(http::Method::POST)
            .uri(&uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        let resp = http
            .request(req)
            .await
            .map_err(|e| ClientError::Auth(format!("login request failed: {e}")))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::Auth(format!("reading login response failed: {e}")))?
            .to_bytes();

        let parsed: LoginResponse = serde_json::from_slice(&bytes).map_err(|e| {
            ClientError::Auth(format!("login response not valid JSON (status {status}): {e}"))
        })?;

        match parsed.token {
            Some(token) => {
                info!("obtained control-plane credential");
                self.credential = Credential { token: Some(token) };
                Ok(())
            }
            None => Err(ClientError::Auth(format!(
                "login response carried no token (status {status})"
            ))),
        }
    }

    /// Login body for the configured scheme, or `None` when unauthenticated.
    fn login_body(&self) -> ClientResult<Option<String>> {
        let uid = match &self.config.uid {
            Some(u) => u,
            None => return Ok(None),
        };

        if let Some(password) = &self.config.password {
            let body = serde_json::json!({ "uid": uid, "password": password });
            return Ok(Some(body.to_string()));
        }

        if let Some(secret) = &self.config.secret {
            let account: ServiceAccountSecret = serde_json::from_str(secret).map_err(|e| {
                ClientError::Auth(format!("service-account secret is not valid JSON: {e}"))
            })?;
            let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
                .map_err(|e| ClientError::Auth(format!("service-account key rejected: {e}")))?;
            let assertion =
                jsonwebtoken::encode(&Header::new(Algorithm::RS256), &AssertionClaims { uid }, &key)
                    .map_err(|e| ClientError::Auth(format!("signing login assertion failed: {e}")))?;
            let body = serde_json::json!({ "uid": uid, "token": assertion });
            return Ok(Some(body.to_string()));
        }

        Ok(None)
    }

    /// Fetch and cache the cluster CA bundle when it is not already present
    /// locally. Trust-on-first-use: the retrieved bytes are written as-is and
    /// never re-verified on later runs.
    async fn ensure_ca_bundle(&self, http: &HttpClient) -> ClientResult<()> {
        let path = &self.config.ca_bundle;
        if path.as_os_str().is_empty() || path.exists() {
            return Ok(());
        }

        let uri = format!("{}{}", self.master, CA_PATH);
        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(&uri)
            .body(Full::new(Bytes::new()))
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        let resp = http
            .request(req)
            .await
            .map_err(|e| ClientError::Auth(format!("CA bundle fetch failed: {e}")))?;
        check_bundle_response(resp.status())?;
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::Auth(format!("reading CA bundle failed: {e}")))?
            .to_bytes();

        std::fs::write(path, &bytes)
            .map_err(|e| ClientError::Auth(format!("writing CA bundle to {path:?} failed: {e}")))?;
        info!(path = ?path, "cached cluster CA bundle");
        Ok(())
    }
}

/// Refuse to cache an error page as the CA bundle. The path stays absent on
/// failure, so the fetch is retried on the next authenticate.
fn check_bundle_response(status: http::StatusCode) -> ClientResult<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(ClientError::Auth(format!(
        "CA bundle fetch returned status {status}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(config: AuthConfig) -> CredentialManager {
        CredentialManager::new("http://master.test:8080".to_string(), config)
    }

    #[test]
    fn empty_credential_has_no_header() {
        assert_eq!(Credential::default().header_value(), None);
    }

    #[test]
    fn credential_header_uses_token_scheme() {
        let cred = Credential {
            token: Some("abc123".to_string()),
        };
        assert_eq!(cred.header_value().as_deref(), Some("token=abc123"));
    }

    #[test]
    fn no_uid_means_unauthenticated() {
        let mgr = manager(AuthConfig::default());
        assert!(mgr.login_body().unwrap().is_none());
    }

    #[test]
    fn uid_without_password_or_secret_means_unauthenticated() {
        let mgr = manager(AuthConfig {
            uid: Some("scaler".to_string()),
            ..Default::default()
        });
        assert!(mgr.login_body().unwrap().is_none());
    }

    #[test]
    fn password_login_body_shape() {
        let mgr = manager(AuthConfig {
            uid: Some("scaler".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        });
        let body: serde_json::Value =
            serde_json::from_str(&mgr.login_body().unwrap().unwrap()).unwrap();
        assert_eq!(body["uid"], "scaler");
        assert_eq!(body["password"], "hunter2");
    }

    #[test]
    fn password_wins_over_secret_when_both_are_set() {
        let mgr = manager(AuthConfig {
            uid: Some("scaler".to_string()),
            password: Some("hunter2".to_string()),
            secret: Some("{}".to_string()),
            ..Default::default()
        });
        let body: serde_json::Value =
            serde_json::from_str(&mgr.login_body().unwrap().unwrap()).unwrap();
        assert_eq!(body["password"], "hunter2");
        assert!(body.get("token").is_none());
    }

    #[test]
    fn malformed_secret_is_an_auth_error() {
        let mgr = manager(AuthConfig {
            uid: Some("scaler".to_string()),
            secret: Some("not json".to_string()),
            ..Default::default()
        });
        assert!(matches!(mgr.login_body(), Err(ClientError::Auth(_))));
    }

    #[test]
    fn ca_bundle_is_only_cached_from_a_success_response() {
        assert!(check_bundle_response(http::StatusCode::OK).is_ok());

        for status in [
            http::StatusCode::NOT_FOUND,
            http::StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(matches!(
                check_bundle_response(status),
                Err(ClientError::Auth(_))
            ));
        }
    }

    #[test]
    fn secret_without_private_key_is_an_auth_error() {
        let mgr = manager(AuthConfig {
            uid: Some("scaler".to_string()),
            secret: Some(r#"{"scheme": "RS256"}"#.to_string()),
            ..Default::default()
        });
        assert!(matches!(mgr.login_body(), Err(ClientError::Auth(_))));
    }
}
