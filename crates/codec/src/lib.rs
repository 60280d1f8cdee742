//! Wire codec for the gateway's framed protocol.
//!
//! Two layers: [`envelope`] models the outer tagged frame (logical endpoint
//! name plus header map) and builds the control frames the connector sends;
//! [`decode`]/[`encode`] convert between the opaque push-item blobs and
//! domain messages. No codec path panics on malformed input — everything
//! surfaces as a typed [`CodecError`].

pub mod decode;
pub mod encode;
pub mod envelope;
mod error;

pub use {
    decode::{decode_push_item, extract_message},
    encode::encode_reply,
    envelope::GatewayFrame,
    error::CodecError,
};
