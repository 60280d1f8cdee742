use std::collections::BTreeMap;

use {async_trait::async_trait, thiserror::Error};

use haggler_common::AccountId;

/// Cookie field holding the numeric account identity.
pub const IDENTITY_FIELD: &str = "unb";
/// Cookie field holding the short-lived anti-replay token
/// (format `<token>_<millis>`).
pub const TOKEN_FIELD: &str = "_m_h5_tk";

#[derive(Debug, Error)]
pub enum CredentialError {
    /// Fatal at start: a connector never starts without a numeric identity.
    #[error("credential has no numeric `{IDENTITY_FIELD}` identity field")]
    MissingIdentity,
    #[error("credential has no `{TOKEN_FIELD}` anti-replay field")]
    MissingToken,
    #[error("no credential stored for account {0}")]
    NotFound(AccountId),
}

/// Opaque key-value bag parsed from a semicolon-delimited cookie string.
///
/// The connector holds a working copy and updates it in place after a
/// successful token refresh; the authoritative copy belongs to the external
/// [`CredentialStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountCredential {
    fields: BTreeMap<String, String>,
}

impl AccountCredential {
    /// Parse `"k1=v1; k2=v2"`. Entries without `=` are skipped; values may
    /// themselves contain `=` (only the first one splits).
    pub fn parse(raw: &str) -> Self {
        let mut fields = BTreeMap::new();
        for part in raw.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if !key.is_empty() {
                    fields.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Merge updated fields (e.g. from `Set-Cookie` response metadata).
    pub fn merge(&mut self, updates: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in updates {
            self.fields.insert(key, value);
        }
    }

    /// Numeric account identity. Absence is fatal at connector start.
    pub fn account_id(&self) -> Result<AccountId, CredentialError> {
        self.get(IDENTITY_FIELD)
            .and_then(|v| v.parse().ok())
            .ok_or(CredentialError::MissingIdentity)
    }

    /// Signing token: the prefix of the anti-replay field before the first
    /// underscore.
    pub fn sign_token(&self) -> Result<&str, CredentialError> {
        let raw = self.get(TOKEN_FIELD).ok_or(CredentialError::MissingToken)?;
        Ok(raw.split('_').next().unwrap_or(raw))
    }

    /// Re-serialize for a `Cookie` request header.
    pub fn to_cookie_header(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// External credential storage, keyed by account id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, account_id: AccountId) -> Result<AccountCredential, CredentialError>;
    async fn put(&self, account_id: AccountId, credential: AccountCredential);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identity_and_sign_token() {
        let cred = AccountCredential::parse("unb=900001; _m_h5_tk=abc123_1700000000000");
        assert_eq!(cred.account_id().unwrap(), 900001);
        assert_eq!(cred.sign_token().unwrap(), "abc123");
    }

    #[test]
    fn missing_identity_is_an_error() {
        let cred = AccountCredential::parse("_m_h5_tk=abc123_1700000000000");
        assert!(matches!(
            cred.account_id(),
            Err(CredentialError::MissingIdentity)
        ));
    }

    #[test]
    fn non_numeric_identity_is_an_error() {
        let cred = AccountCredential::parse("unb=not-a-number");
        assert!(matches!(
            cred.account_id(),
            Err(CredentialError::MissingIdentity)
        ));
    }

    #[test]
    fn values_may_contain_equals() {
        let cred = AccountCredential::parse("a=b=c; unb=1");
        assert_eq!(cred.get("a"), Some("b=c"));
    }

    #[test]
    fn cookie_header_round_trips() {
        let cred = AccountCredential::parse("unb=1; x=y");
        let again = AccountCredential::parse(&cred.to_cookie_header());
        assert_eq!(cred, again);
    }

    #[test]
    fn merge_overwrites_in_place() {
        let mut cred = AccountCredential::parse("unb=1; _m_h5_tk=old_0");
        cred.merge(vec![("_m_h5_tk".to_string(), "new_9".to_string())]);
        assert_eq!(cred.sign_token().unwrap(), "new");
        assert_eq!(cred.account_id().unwrap(), 1);
    }
}
