use std::{sync::Arc, time::Duration};

use {
    tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{trace, warn},
};

use haggler_codec::GatewayFrame;

use crate::transport::FrameSink;

pub(crate) type SharedSink = Arc<Mutex<Box<dyn FrameSink>>>;

/// Emit keep-alive frames at a fixed interval on a dedicated task,
/// independent of inbound traffic.
///
/// The token is cancelled the moment the connector leaves `Connected`; the
/// loop re-checks it after every tick so a cancellation racing the timer
/// never produces a send on a dead session.
pub(crate) fn spawn_heartbeat(
    sink: SharedSink,
    interval: Duration,
    cancel: CancellationToken,
    account_id: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the handshake already proved
        // the session live, so skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }
            if cancel.is_cancelled() {
                break;
            }
            let frame = GatewayFrame::heartbeat();
            if let Err(e) = sink.lock().await.send(&frame).await {
                warn!(account_id, error = %e, "heartbeat send failed");
                break;
            }
            trace!(account_id, "heartbeat");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectContext, GatewayTransport, mem::MemGateway};

    async fn open_sink(gateway: &MemGateway) -> SharedSink {
        let ctx = ConnectContext {
            cookie: String::new(),
            user_agent: String::new(),
        };
        let pair = gateway.connect(&ctx).await.unwrap();
        Arc::new(Mutex::new(pair.sink))
    }

    #[tokio::test(start_paused = true)]
    async fn emits_at_fixed_interval_until_cancelled() {
        let gateway = MemGateway::new();
        let sink = open_sink(&gateway).await;
        let cancel = CancellationToken::new();
        let handle = spawn_heartbeat(sink, Duration::from_secs(10), cancel.clone(), 1);

        tokio::time::sleep(Duration::from_secs(35)).await;
        let beats = gateway.sent_endpoints().await.len();
        assert_eq!(beats, 3, "one beat per elapsed interval");

        cancel.cancel();
        let _ = handle.await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            gateway.sent_endpoints().await.len(),
            beats,
            "no beats after cancellation"
        );
    }
}
