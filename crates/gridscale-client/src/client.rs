//! Retry-resilient request layer for the control plane.
//!
//! Retry policy, per logical call:
//! - transport errors and non-2xx statuses (other than 401) back off for one
//!   poll interval and retry forever — the loop above must survive
//!   orchestrator downtime;
//! - 401 renews the credential and retries immediately, with no sleep and no
//!   effect on the decode counter;
//! - a 2xx body that fails to decode retries with backoff, but only
//!   [`ERR_THRESHOLD`] times — a persistently malformed upstream is fatal;
//! - an empty 2xx body decodes as `{}`.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::auth::{AuthConfig, CredentialManager};
use crate::error::{ClientError, ClientResult};
use crate::types::{self, AppSnapshot};

/// Maximum number of decode attempts for one logical call.
pub const ERR_THRESHOLD: u32 = 10;

/// Apps collection on the control plane.
pub const APPS_PATH: &str = "/v2/apps";

pub type HttpClient = hyper_util::client::legacy::Client<HttpConnector, Full<Bytes>>;

/// Client for the orchestrator control plane.
///
/// Owns the HTTP connection pool and the credential manager; attaches the
/// current credential to every call and applies the module's retry policy.
pub struct RemoteClient {
    http: HttpClient,
    master: String,
    interval: Duration,
    creds: CredentialManager,
}

impl RemoteClient {
    pub fn new(master: impl Into<String>, interval: Duration, auth: AuthConfig) -> Self {
        let master = master.into().trim_end_matches('/').to_string();
        Self {
            http: hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build_http(),
            creds: CredentialManager::new(master.clone(), auth),
            master,
            interval,
        }
    }

    /// Obtain the initial credential. Called once at startup; afterwards the
    /// request loop renews it on demand.
    pub async fn authenticate(&mut self) -> ClientResult<()> {
        self.creds.authenticate(&self.http).await
    }

    /// Issue one logical call against the control plane, retrying per the
    /// module policy until it yields a decoded body or a fatal error.
    pub async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ClientResult<Value> {
        let uri = format!("{}{}", self.master, path);
        let payload = body.map(|b| b.to_string());
        let mut guard = DecodeGuard::new(ERR_THRESHOLD);

        loop {
            let req = self.build_request(&method, &uri, payload.as_deref())?;

            let resp = match self.http.request(req).await {
                Ok(r) => r,
                Err(e) => {
                    error!(%method, path, error = %e, "transport error, retrying after interval");
                    sleep(self.interval).await;
                    continue;
                }
            };

            let status = resp.status();
            debug!(%method, path, %status, "control plane responded");

            let bytes = match resp.into_body().collect().await {
                Ok(b) => b.to_bytes(),
                Err(e) => {
                    error!(%method, path, error = %e, "reading response body failed, retrying after interval");
                    sleep(self.interval).await;
                    continue;
                }
            };

            match interpret_response(status, &bytes) {
                ResponseOutcome::Ok(value) => return Ok(value),
                ResponseOutcome::Unauthorized => {
                    info!("credential rejected, renewing and retrying");
                    self.creds.authenticate(&self.http).await?;
                }
                ResponseOutcome::HttpError => {
                    error!(%method, path, %status, "HTTP error, retrying after interval");
                    sleep(self.interval).await;
                }
                ResponseOutcome::DecodeError(reason) => {
                    error!(%method, path, %reason, "response body is not valid JSON");
                    guard.record(reason)?;
                    sleep(self.interval).await;
                }
            }
        }
    }

    /// App ids currently known to the control plane.
    pub async fn list_apps(&mut self) -> ClientResult<Vec<String>> {
        let value = self.request(Method::GET, APPS_PATH, None).await?;
        Ok(types::app_ids(&value))
    }

    /// Fresh snapshot of one app, or `None` when the descriptor carries no
    /// task data yet.
    pub async fn app_snapshot(&mut self, app_id: &str) -> ClientResult<Option<AppSnapshot>> {
        let path = format!("{APPS_PATH}/{}", app_id.trim_start_matches('/'));
        let value = self.request(Method::GET, &path, None).await?;
        Ok(types::snapshot(app_id, &value))
    }

    /// Ask the orchestrator to scale the app to `instances`.
    pub async fn scale_app(&mut self, app_id: &str, instances: u32) -> ClientResult<()> {
        let path = format!("{APPS_PATH}/{}", app_id.trim_start_matches('/'));
        let body = serde_json::json!({ "instances": instances });
        self.request(Method::PUT, &path, Some(&body)).await?;
        Ok(())
    }

    /// The poll interval, also used as the retry backoff.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn build_request(
        &self,
        method: &Method,
        uri: &str,
        body: Option<&str>,
    ) -> ClientResult<http::Request<Full<Bytes>>> {
        let mut builder = http::Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json");
        if let Some(auth) = self.creds.credential().header_value() {
            builder = builder.header(http::header::AUTHORIZATION, auth);
        }
        let bytes = body
            .map(|b| Bytes::from(b.to_owned()))
            .unwrap_or_default();
        builder
            .body(Full::new(bytes))
            .map_err(|e| ClientError::Request {
                path: uri.to_string(),
                reason: e.to_string(),
            })
    }
}

/// How one response should be handled.
#[derive(Debug, PartialEq)]
enum ResponseOutcome {
    /// Decoded 2xx body.
    Ok(Value),
    /// 401: renew the credential and retry immediately.
    Unauthorized,
    /// Non-2xx: back off and retry.
    HttpError,
    /// 2xx with an unparseable body: counts toward the decode threshold.
    DecodeError(String),
}

fn interpret_response(status: StatusCode, body: &[u8]) -> ResponseOutcome {
    if status == StatusCode::UNAUTHORIZED {
        return ResponseOutcome::Unauthorized;
    }
    if !status.is_success() {
        return ResponseOutcome::HttpError;
    }
    let text = match std::str::from_utf8(body) {
        Ok(t) => t.trim(),
        Err(e) => return ResponseOutcome::DecodeError(e.to_string()),
    };
    // An empty 2xx body is a valid empty object, not a decode failure.
    if text.is_empty() {
        return ResponseOutcome::Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str(text) {
        Ok(value) => ResponseOutcome::Ok(value),
        Err(e) => ResponseOutcome::DecodeError(e.to_string()),
    }
}

/// Bounds how often one logical call may fail to decode before giving up.
#[derive(Debug)]
struct DecodeGuard {
    errors: u32,
    threshold: u32,
}

impl DecodeGuard {
    fn new(threshold: u32) -> Self {
        Self {
            errors: 0,
            threshold,
        }
    }

    /// Record one decode failure; exceeding the threshold is fatal.
    fn record(&mut self, last: String) -> ClientResult<()> {
        self.errors += 1;
        if self.errors > self.threshold {
            error!(attempts = self.errors, "decode error threshold exceeded, giving up");
            return Err(ClientError::DecodeThreshold {
                attempts: self.errors,
                last,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unauthorized_is_reported_before_anything_else() {
        assert_eq!(
            interpret_response(StatusCode::UNAUTHORIZED, b"not json at all"),
            ResponseOutcome::Unauthorized
        );
    }

    #[test]
    fn non_success_statuses_retry_as_http_errors() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::NOT_FOUND,
        ] {
            assert_eq!(interpret_response(status, b"{}"), ResponseOutcome::HttpError);
        }
    }

    #[test]
    fn valid_body_decodes() {
        let outcome = interpret_response(StatusCode::OK, br#"{"apps": []}"#);
        assert_eq!(outcome, ResponseOutcome::Ok(json!({"apps": []})));
    }

    #[test]
    fn empty_body_normalizes_to_empty_object() {
        assert_eq!(
            interpret_response(StatusCode::OK, b"   \n"),
            ResponseOutcome::Ok(json!({}))
        );
        assert_eq!(
            interpret_response(StatusCode::OK, b""),
            ResponseOutcome::Ok(json!({}))
        );
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        assert!(matches!(
            interpret_response(StatusCode::OK, b"<html>maintenance</html>"),
            ResponseOutcome::DecodeError(_)
        ));
    }

    #[test]
    fn non_utf8_body_is_a_decode_error() {
        assert!(matches!(
            interpret_response(StatusCode::OK, &[0xff, 0xfe, 0x00]),
            ResponseOutcome::DecodeError(_)
        ));
    }

    #[test]
    fn decode_guard_allows_threshold_failures() {
        let mut guard = DecodeGuard::new(ERR_THRESHOLD);
        for _ in 0..ERR_THRESHOLD {
            guard.record("bad body".to_string()).unwrap();
        }
    }

    #[test]
    fn decode_guard_is_fatal_past_the_threshold() {
        let mut guard = DecodeGuard::new(ERR_THRESHOLD);
        for _ in 0..ERR_THRESHOLD {
            guard.record("bad body".to_string()).unwrap();
        }
        // Attempt eleven terminates the call.
        let err = guard.record("bad body".to_string()).unwrap_err();
        assert!(matches!(
            err,
            ClientError::DecodeThreshold { attempts: 11, .. }
        ));
    }

    #[test]
    fn unauthorized_does_not_touch_the_decode_guard() {
        // The loop only records DecodeError outcomes; a 401 maps to
        // Unauthorized and therefore never reaches the guard.
        let mut guard = DecodeGuard::new(2);
        assert_eq!(
            interpret_response(StatusCode::UNAUTHORIZED, b"garbage"),
            ResponseOutcome::Unauthorized
        );
        guard.record("x".to_string()).unwrap();
        guard.record("x".to_string()).unwrap();
        assert!(guard.record("x".to_string()).is_err());
    }
}
