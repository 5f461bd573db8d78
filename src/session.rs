//! Session runner - connects the two WebSocket legs to the proxy state machine

use std::future::Future;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::events::{Frame, FrameSink, Leg, Outbound};
use crate::proxy::{Actions, Event, ProxyState, SessionProxy};

/// Opens the upstream leg of a session.
pub trait UpstreamConnector: Send + Sync {
    fn connect(&self, credential: &str) -> impl Future<Output = Result<Leg>> + Send;
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Upstream,
    Downstream,
}

/// Run one client session to completion and return the final proxy state.
///
/// Frames from each leg are handled strictly in arrival order, and every
/// action an event produces is dispatched before the next frame is read.
pub async fn run_session<C: UpstreamConnector>(
    mut proxy: SessionProxy,
    downstream: Leg,
    connector: &C,
) -> ProxyState {
    let Leg {
        sink: mut down_tx,
        stream: mut down_rx,
    } = downstream;

    proxy.on_event(Event::ClientConnected);

    let mut upstream = None;
    if proxy.state() == ProxyState::AwaitingUpstreamOpen {
        let credential = proxy.credential().unwrap_or_default().to_string();
        match connector.connect(&credential).await {
            Ok(leg) => {
                upstream = Some(leg);
                proxy.on_event(Event::UpstreamOpened { now: Utc::now() });
            }
            Err(e) => proxy.on_event(Event::UpstreamConnectFailed(e)),
        }
    }

    let Some(Leg {
        sink: mut up_tx,
        stream: mut up_rx,
    }) = upstream
    else {
        dispatch(proxy.drain_outbound(), &mut down_tx, None).await;
        proxy.finish();
        let _ = down_tx.close().await;
        return proxy.state();
    };

    info!(task = %proxy.task(), "Session runner started");

    loop {
        if let Some((side, err)) = dispatch(proxy.drain_outbound(), &mut down_tx, Some(&mut up_tx)).await {
            warn!("Failed to send to {:?}: {}", side, err);
            proxy.on_event(match side {
                Side::Upstream => Event::UpstreamClosed(None),
                Side::Downstream => Event::DownstreamClosed,
            });
            continue;
        }

        if proxy.state() == ProxyState::Closing {
            proxy.finish();
        }
        if proxy.state() == ProxyState::Closed {
            break;
        }

        tokio::select! {
            msg = down_rx.next() => match msg {
                Some(Ok(Frame::Text(text))) => proxy.on_event(Event::DownstreamMessage(text)),
                Some(Ok(Frame::Close(_))) | None => proxy.on_event(Event::DownstreamClosed),
                Some(Err(e)) => {
                    warn!("Client connection error: {}", e);
                    proxy.on_event(Event::DownstreamClosed);
                }
            },
            msg = up_rx.next() => match msg {
                Some(Ok(Frame::Text(text))) => proxy.on_event(Event::UpstreamMessage(text)),
                Some(Ok(Frame::Close(reason))) => proxy.on_event(Event::UpstreamClosed(reason)),
                None => proxy.on_event(Event::UpstreamClosed(None)),
                Some(Err(e)) => proxy.on_event(Event::UpstreamError(e)),
            },
        }
    }

    let _ = up_tx.close().await;
    let _ = down_tx.close().await;
    info!(task = %proxy.task(), "Session runner finished");
    proxy.state()
}

/// Perform actions in order. Stops at the first failed text send and reports
/// which leg failed; failures while closing are ignored.
async fn dispatch(
    actions: Actions,
    down: &mut FrameSink,
    mut up: Option<&mut FrameSink>,
) -> Option<(Side, RelayError)> {
    for action in actions {
        match action {
            Outbound::Upstream(text) => {
                let Some(up) = up.as_deref_mut() else {
                    debug!("No upstream connection, dropping frame");
                    continue;
                };
                if let Err(e) = up.send(Frame::Text(text)).await {
                    return Some((Side::Upstream, e));
                }
            }
            Outbound::Downstream(text) => {
                if let Err(e) = down.send(Frame::Text(text)).await {
                    return Some((Side::Downstream, e));
                }
            }
            Outbound::CloseUpstream(reason) => {
                if let Some(up) = up.as_deref_mut() {
                    if let Err(e) = up.send(Frame::Close(reason)).await {
                        debug!("Upstream close failed: {}", e);
                    }
                }
            }
            Outbound::CloseDownstream(reason) => {
                if let Err(e) = down.send(Frame::Close(reason)).await {
                    debug!("Client close failed: {}", e);
                }
            }
        }
    }
    None
}
