//! Per-account session lifecycle: handshake, dispatch, reconnect.

use std::{sync::Arc, time::Duration};

use {
    serde_json::Value,
    thiserror::Error,
    tokio::{
        sync::{Mutex, RwLock},
        task::JoinHandle,
        time::sleep,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, trace, warn},
};

use {
    haggler_auth::{AuthError, TokenManager},
    haggler_codec::{CodecError, GatewayFrame, decode_push_item, encode_reply, extract_message},
    haggler_common::{AccountId, DecodedMessage, OrderStatusSink, OutboundReply, ReplyResolver},
};

use crate::{
    heartbeat::{SharedSink, spawn_heartbeat},
    orders::OrderStatusExtractor,
    pause::PauseGate,
    state::ConnectorState,
    transport::{ConnectContext, FrameStream, GatewayTransport, TransportError},
};

/// Protocol timing and handshake identity for one connector.
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    /// App key identifying the messaging app in the `/reg` handshake.
    pub app_key: String,
    /// User agent sent in the `/reg` handshake and transport upgrade.
    pub user_agent: String,
    /// Keep-alive interval while connected.
    pub heartbeat: Duration,
    /// Fixed delay before every reconnect attempt. No backoff.
    pub reconnect: Duration,
    /// Settle delay between the `/reg` and acknowledgement-sync frames.
    pub settle: Duration,
    /// Cool-down applied to a conversation after a manual reply.
    pub pause_window: Duration,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            app_key: "444e9908a51d1cb236a27862abc769c9".into(),
            user_agent: "haggler/0.3".into(),
            heartbeat: Duration::from_secs(10),
            reconnect: Duration::from_secs(5),
            settle: Duration::from_secs(1),
            pause_window: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connector is {0}, not accepting sends")]
    NotConnected(ConnectorState),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// How a session ended, when it ended without an error.
enum SessionEnd {
    RemoteClose,
    Cancelled,
}

/// One live gateway session for one seller account.
///
/// The run loop owns the session: it refreshes the token when needed, opens
/// the transport, performs the registration handshake, pumps inbound frames,
/// and on any failure or remote close waits a fixed delay and starts over.
/// `stop()` is terminal; a reconnect that fires afterwards observes the
/// cancelled token and never reopens a transport.
pub struct Connector {
    token: TokenManager,
    transport: Arc<dyn GatewayTransport>,
    resolver: Arc<dyn ReplyResolver>,
    orders_sink: Arc<dyn OrderStatusSink>,
    extractor: OrderStatusExtractor,
    pause: PauseGate,
    settings: ConnectorSettings,
    state: RwLock<ConnectorState>,
    sink: Mutex<Option<SharedSink>>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Connector {
    pub fn new(
        token: TokenManager,
        transport: Arc<dyn GatewayTransport>,
        resolver: Arc<dyn ReplyResolver>,
        orders_sink: Arc<dyn OrderStatusSink>,
        settings: ConnectorSettings,
    ) -> Self {
        Self {
            token,
            transport,
            resolver,
            orders_sink,
            extractor: OrderStatusExtractor::new(),
            pause: PauseGate::new(settings.pause_window),
            settings,
            state: RwLock::new(ConnectorState::Disconnected),
            sink: Mutex::new(None),
            task: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.token.account_id()
    }

    pub async fn state(&self) -> ConnectorState {
        *self.state.read().await
    }

    pub fn pause_gate(&self) -> &PauseGate {
        &self.pause
    }

    /// Spawn the run loop. Idempotent: a second call while the loop is alive
    /// (or after `stop()`) does nothing.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move { this.run_loop().await }));
    }

    /// Tear down the connector: cancel every scheduled callback, close the
    /// transport if one is open, and wait for the run loop to exit. Safe to
    /// call concurrently with an in-flight reconnect.
    pub async fn stop(&self) {
        self.cancel.cancel();
        *self.state.write().await = ConnectorState::Closed;
        if let Some(sink) = self.sink.lock().await.take() {
            sink.lock().await.close().await;
        }
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
        info!(account_id = self.account_id(), "connector stopped");
    }

    /// Send a manually-written reply on behalf of the operator. Pauses the
    /// conversation's automated replies for the cool-down window.
    pub async fn send_reply(&self, reply: &OutboundReply) -> Result<(), SendError> {
        let state = self.state().await;
        if !state.may_send() {
            return Err(SendError::NotConnected(state));
        }
        let frame = encode_reply(reply, &self.account_id().to_string())?;
        self.send_frame(&frame).await?;
        self.pause.pause(&reply.conversation_id);
        Ok(())
    }

    async fn send_frame(&self, frame: &GatewayFrame) -> Result<(), TransportError> {
        let sink = self.sink.lock().await.clone();
        match sink {
            Some(sink) => sink.lock().await.send(frame).await,
            None => Err(TransportError::Send("no open session".into())),
        }
    }

    /// `Closed` is terminal: once `stop()` set it, no scheduled callback may
    /// move the connector anywhere else.
    async fn set_state(&self, next: ConnectorState) {
        let mut state = self.state.write().await;
        if state.is_closed() {
            return;
        }
        if *state != next {
            debug!(account_id = self.account_id(), from = %state, to = %next, "state change");
            *state = next;
        }
    }

    async fn run_loop(&self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(ConnectorState::Connecting).await;
            match self.run_session().await {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::RemoteClose) => {
                    info!(account_id = self.account_id(), "gateway closed the session");
                    self.set_state(ConnectorState::Disconnected).await;
                },
                Err(e) => {
                    warn!(account_id = self.account_id(), error = %e, "session failed");
                    self.set_state(ConnectorState::Failed).await;
                },
            }
            if self.cancel.is_cancelled() {
                break;
            }
            // One refresh attempt per cycle: the gateway invalidates the
            // access token on abnormal closes. Raced against cancellation so
            // a stop never waits out the side-channel timeout.
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.token.refresh() => {
                    if let Err(e) = result {
                        warn!(account_id = self.account_id(), error = %e, "token refresh failed");
                    }
                },
            }
            self.set_state(ConnectorState::Reconnecting).await;
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.settings.reconnect) => {},
            }
        }
    }

    async fn run_session(&self) -> Result<SessionEnd, SessionError> {
        if self.token.access_token().await.is_none() {
            self.token.refresh().await?;
        }
        let access_token = match self.token.access_token().await {
            Some(token) => token,
            None => return Err(AuthError::Malformed("data.accessToken").into()),
        };

        let ctx = ConnectContext {
            cookie: self.token.cookie_header().await,
            user_agent: self.settings.user_agent.clone(),
        };
        let pair = self.transport.connect(&ctx).await?;
        let sink: SharedSink = Arc::new(Mutex::new(pair.sink));
        let mut stream = pair.stream;
        *self.sink.lock().await = Some(Arc::clone(&sink));

        // Registration handshake: `/reg`, a settle delay, then ack-sync.
        let reg = GatewayFrame::register(
            &self.settings.app_key,
            &access_token,
            self.token.device_id(),
            &self.settings.user_agent,
        );
        sink.lock().await.send(&reg).await?;
        tokio::select! {
            _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            _ = sleep(self.settings.settle) => {},
        }
        sink.lock().await.send(&GatewayFrame::ack_sync()).await?;
        self.set_state(ConnectorState::Connected).await;
        info!(account_id = self.account_id(), "session registered");

        let hb_cancel = self.cancel.child_token();
        let heartbeat = spawn_heartbeat(
            Arc::clone(&sink),
            self.settings.heartbeat,
            hb_cancel.clone(),
            self.account_id(),
        );

        let end = self.read_loop(stream.as_mut()).await;

        hb_cancel.cancel();
        let _ = heartbeat.await;
        if let Some(sink) = self.sink.lock().await.take() {
            sink.lock().await.close().await;
        }
        end
    }

    async fn read_loop(&self, stream: &mut dyn FrameStream) -> Result<SessionEnd, SessionError> {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                frame = stream.next() => frame,
            };
            match frame {
                None => return Ok(SessionEnd::RemoteClose),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(frame)) => self.handle_frame(frame).await,
            }
        }
    }

    async fn handle_frame(&self, frame: GatewayFrame) {
        // Responses to our own control frames carry a code and no endpoint.
        if frame.code.is_some() {
            trace!(account_id = self.account_id(), code = frame.code, "control response");
            return;
        }
        // The gateway redelivers unacked frames; ack first, then dispatch.
        if let Some(ack) = GatewayFrame::ack_of(&frame) {
            if let Err(e) = self.send_frame(&ack).await {
                warn!(account_id = self.account_id(), error = %e, "inbound ack failed");
            }
        }
        if !frame.is_sync_push() {
            return;
        }
        for blob in frame.push_items() {
            let tree = match decode_push_item(blob) {
                Ok(tree) => tree,
                Err(e) => {
                    warn!(account_id = self.account_id(), error = %e, "push item decode failed");
                    continue;
                },
            };
            let message = match extract_message(&tree) {
                Ok(message) => message,
                Err(e) => {
                    debug!(account_id = self.account_id(), error = %e, "push item is not a chat message");
                    continue;
                },
            };
            self.dispatch(&tree, message).await;
        }
    }

    async fn dispatch(&self, tree: &Value, message: DecodedMessage) {
        let account_id = self.account_id();

        // Our own outbound messages echo back through the push stream. A
        // message the seller typed by hand pauses automation for that
        // conversation.
        if message.sender_id == account_id.to_string() {
            debug!(
                account_id,
                conversation = %message.conversation_id,
                "own message observed, pausing conversation"
            );
            self.pause.pause(&message.conversation_id);
            return;
        }

        if let Some(update) = self.extractor.extract(&message.text, tree) {
            info!(
                account_id,
                order_id = %update.order_id,
                status = %update.status,
                "order status update"
            );
            self.orders_sink
                .update(&update.order_id, update.status, account_id)
                .await;
            return;
        }

        if self.pause.is_paused(&message.conversation_id) {
            debug!(
                account_id,
                conversation = %message.conversation_id,
                "conversation paused, skipping automated reply"
            );
            return;
        }

        let reply_text = self
            .resolver
            .resolve(
                account_id,
                &message.conversation_id,
                &message.sender_id,
                message.item_id.as_deref(),
                &message.text,
            )
            .await;
        let Some(text) = reply_text else {
            trace!(account_id, conversation = %message.conversation_id, "no automated reply");
            return;
        };

        let reply = OutboundReply {
            conversation_id: message.conversation_id.clone(),
            recipient_id: message.sender_id.clone(),
            text,
        };
        match encode_reply(&reply, &account_id.to_string()) {
            Ok(frame) => {
                if let Err(e) = self.send_frame(&frame).await {
                    warn!(account_id, error = %e, "automated reply send failed");
                }
            },
            Err(e) => warn!(account_id, error = %e, "automated reply encode failed"),
        }
    }
}
