//! Credentials and request signing for the gateway's side-channel API.
//!
//! The gateway authenticates two ways: outgoing HTTP calls carry an MD5
//! signature derived from the short-lived anti-replay token, and the
//! WebSocket registration handshake carries an access token obtained from
//! the token side-channel. Both live here.

pub mod credential;
pub mod sign;
pub mod token;

pub use {
    credential::{AccountCredential, CredentialError, CredentialStore},
    sign::sign,
    token::{AuthError, TokenEndpoint, TokenManager},
};
