//! Shared domain types and collaborator traits.
//!
//! Everything the connector core hands to (or receives from) the rest of the
//! system crosses one of the seams defined here: reply resolution and
//! order-status persistence. (Credential storage lives next to the
//! credential type in `haggler-auth`.)

pub mod time;
pub mod traits;
pub mod types;

pub use {
    traits::{OrderStatusSink, ReplyResolver},
    types::{AccountId, DecodedMessage, OrderStatus, OutboundReply},
};
