use std::time::Duration;

use {
    thiserror::Error,
    tokio::sync::RwLock,
    tracing::{debug, warn},
};

use haggler_common::{AccountId, time::now_ms};

use crate::{
    credential::{AccountCredential, CredentialError, TOKEN_FIELD},
    sign::sign,
};

/// API name of the token side-channel call.
const TOKEN_API: &str = "mtop.taobao.idlemessage.pc.login.token";
const JS_VERSION: &str = "2.7.2";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint rejected the call: {0}")]
    Rejected(String),
    #[error("token response missing field `{0}`")]
    Malformed(&'static str),
}

/// Settings for the token side-channel.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    /// Base URL of the side-channel token call.
    pub url: String,
    /// App key mixed into the request signature.
    pub app_key: String,
    /// App key carried inside the form payload (the messaging app identity).
    pub im_app_key: String,
    /// `accountSite` query parameter.
    pub account_site: String,
    pub timeout: Duration,
}

/// Holds the evolving credential for one account, signs side-channel
/// requests, and refreshes the short-lived anti-replay token.
///
/// Refresh failures are non-fatal: the previous credential is kept and the
/// connector retries on its next failure cycle.
pub struct TokenManager {
    http: reqwest::Client,
    endpoint: TokenEndpoint,
    account_id: AccountId,
    device_id: String,
    credential: RwLock<AccountCredential>,
    access_token: RwLock<Option<String>>,
}

impl TokenManager {
    /// Fails fast if the credential has no numeric identity field.
    pub fn new(
        http: reqwest::Client,
        endpoint: TokenEndpoint,
        credential: AccountCredential,
    ) -> Result<Self, CredentialError> {
        let account_id = credential.account_id()?;
        Ok(Self {
            http,
            endpoint,
            account_id,
            device_id: format!("haggler-{account_id}"),
            credential: RwLock::new(credential),
            access_token: RwLock::new(None),
        })
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Access token from the most recent successful refresh, consumed by the
    /// registration handshake.
    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    /// Seed the access token directly, bypassing the side-channel. Used when
    /// a token was provisioned out of band.
    pub async fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().await = Some(token.into());
    }

    /// Snapshot of the working credential.
    pub async fn credential(&self) -> AccountCredential {
        self.credential.read().await.clone()
    }

    /// Current `Cookie` header value.
    pub async fn cookie_header(&self) -> String {
        self.credential.read().await.to_cookie_header()
    }

    /// Refresh the anti-replay token over the side-channel call and merge
    /// any credential updates from response metadata back into the working
    /// copy.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let (token, cookie) = {
            let cred = self.credential.read().await;
            (cred.sign_token()?.to_string(), cred.to_cookie_header())
        };

        let t = now_ms();
        let payload = format!(
            r#"{{"appKey":"{}","deviceId":"{}"}}"#,
            self.endpoint.im_app_key, self.device_id
        );
        let signature = sign(&token, t, &self.endpoint.app_key, &payload);

        let response = self
            .http
            .post(&self.endpoint.url)
            .timeout(self.endpoint.timeout)
            .query(&[
                ("jsv", JS_VERSION),
                ("appKey", self.endpoint.app_key.as_str()),
                ("t", &t.to_string()),
                ("sign", &signature),
                ("v", "1.0"),
                ("type", "originaljson"),
                ("accountSite", self.endpoint.account_site.as_str()),
                ("dataType", "json"),
                ("api", TOKEN_API),
                ("sessionOption", "AutoLoginOnly"),
            ])
            .header(reqwest::header::COOKIE, cookie)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(format!("data={}", urlencoding::encode(&payload)))
            .send()
            .await?;

        // Refreshed anti-replay fields arrive as Set-Cookie metadata.
        let updates: Vec<(String, String)> = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();

        let body: serde_json::Value = response.json().await?;
        let ret = body
            .get("ret")
            .and_then(|r| r.get(0))
            .and_then(|r| r.as_str())
            .unwrap_or("");
        if !ret.starts_with("SUCCESS") {
            // Merge cookies even on rejection: the endpoint rotates the
            // anti-replay field on signature mismatch, and the rotated value
            // is what the retry has to sign with.
            self.merge_updates(updates).await;
            return Err(AuthError::Rejected(ret.to_string()));
        }

        let access_token = body
            .get("data")
            .and_then(|d| d.get("accessToken"))
            .and_then(|v| v.as_str())
            .ok_or(AuthError::Malformed("data.accessToken"))?
            .to_string();

        self.merge_updates(updates).await;
        *self.access_token.write().await = Some(access_token);
        debug!(account_id = self.account_id, "refreshed gateway access token");
        Ok(())
    }

    async fn merge_updates(&self, updates: Vec<(String, String)>) {
        if updates.is_empty() {
            return;
        }
        let mut cred = self.credential.write().await;
        let had_token = updates.iter().any(|(k, _)| k == TOKEN_FIELD);
        cred.merge(updates);
        if had_token {
            debug!(account_id = self.account_id, "anti-replay token rotated");
        } else {
            warn!(
                account_id = self.account_id,
                "credential updated without token rotation"
            );
        }
    }
}

/// First `name=value` pair of a `Set-Cookie` header, attributes dropped.
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
