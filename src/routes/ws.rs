use crate::Core;
use crate::audit::AccessEvent;
use crate::dispatcher;
use rocket::{State, get};
use rocket_ws as ws;
use std::sync::Arc;

use super::ClientIp;

/// The bidirectional JSON channel. One read loop and one outbound forwarder
/// per connection; all server-originated traffic flows through the hub's
/// per-session queue so a stalled peer never blocks dispatch.
#[get("/chat/ws")]
pub fn chat_ws(websocket: ws::WebSocket, core: &State<Arc<Core>>, ip: ClientIp) -> ws::Channel<'static> {
    let core = core.inner().clone();
    let client_ip = ip.0;

    websocket.channel(move |stream| {
        Box::pin(async move {
            use rocket::futures::{SinkExt, StreamExt};

            core.audit.access(AccessEvent::WsConnect {
                path: "/chat/ws".to_string(),
                ip: Some(client_ip.clone()),
            });

            let (session, mut outbound_rx) = core.hub.register();
            let (mut sink, mut source) = stream.split();

            // Forwarder: hub queue -> socket. Ends when the hub drops the
            // session (sender closed) or the peer goes away.
            let writer = tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    if sink.send(ws::Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                let _ = sink.close().await;
            });

            let mut close_code: Option<u16> = None;
            let mut close_reason: Option<String> = None;
            loop {
                tokio::select! {
                    message = source.next() => {
                        match message {
                            Some(Ok(ws::Message::Text(text))) => {
                                match serde_json::from_str::<serde_json::Value>(&text) {
                                    Ok(frame) => {
                                        dispatcher::dispatch(&core, &session, frame, Some(&client_ip));
                                    }
                                    Err(_) => {
                                        core.hub.direct_send(
                                            &session,
                                            &serde_json::json!({
                                                "type": "error",
                                                "error": {"code": 400, "detail": "Invalid JSON"}
                                            }),
                                        );
                                    }
                                }
                            }
                            Some(Ok(ws::Message::Close(frame))) => {
                                if let Some(frame) = frame {
                                    close_code = Some(u16::from(frame.code));
                                    close_reason = Some(frame.reason.to_string());
                                }
                                break;
                            }
                            Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                            Some(Err(_)) | None => break,
                        }
                    }
                    _ = session.shutdown.notified() => break,
                }
            }

            if let Some(user_id) = core.hub.disconnect(&session) {
                let last_seen = chrono::Utc::now().to_rfc3339();
                core.hub.notify_status(user_id, false, Some(last_seen));
            }
            core.audit.access(AccessEvent::WsDisconnect {
                path: "/chat/ws".to_string(),
                code: close_code,
                reason: close_reason,
                ip: Some(client_ip),
            });
            writer.abort();
            Ok(())
        })
    })
}
