//! The account connector: one live gateway session per seller account.
//!
//! A [`Connector`] owns a transport session and drives it through a
//! lifecycle state machine — registration handshake, keep-alive heartbeats,
//! inbound push decode/dispatch, and fixed-delay reconnection. The
//! [`ConnectorRegistry`] is the process-wide table of connectors, keyed by
//! account id, consumed by the administrative façade.

pub mod connector;
mod heartbeat;
pub mod orders;
pub mod pause;
pub mod registry;
pub mod state;
pub mod transport;

pub use {
    connector::{Connector, ConnectorSettings, SendError},
    orders::{OrderStatusExtractor, OrderUpdate},
    pause::PauseGate,
    registry::{ConnectorRegistry, StartError},
    state::ConnectorState,
    transport::{ConnectContext, GatewayTransport, TransportError, TransportPair, WsTransport},
};
