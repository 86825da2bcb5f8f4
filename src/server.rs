//! WebSocket transport: one session per connection, one integer per frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{future, Stream, StreamExt};
use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::session::{IngestSession, SessionContext};
use crate::shutdown::ShutdownSignal;

/// Pause after a failed accept (e.g. descriptor exhaustion) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Text payloads of a WebSocket until close or transport error.
/// Binary frames count when they are valid UTF-8; control frames are skipped.
pub fn text_messages<S, E>(frames: S) -> impl Stream<Item = String>
where
    S: Stream<Item = Result<Message, E>>,
    E: std::fmt::Display,
{
    frames
        .take_while(|frame| {
            future::ready(match frame {
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    warn!("WebSocket error, ending stream: {}", e);
                    false
                }
            })
        })
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(text),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(text),
                    Err(_) => {
                        warn!("Invalid data received: non-UTF-8 binary frame");
                        None
                    }
                },
                _ => None,
            })
        })
}

/// Accept connections until shutdown, then wait for every session to finalize.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<SessionContext>,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    info!("WebSocket server started on {}", listener.local_addr()?);
    let mut sessions = JoinSet::new();
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    error!("session task failed: {}", e);
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    next_id += 1;
                    sessions.spawn(handle_connection(
                        next_id,
                        stream,
                        peer,
                        Arc::clone(&ctx),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    drop(listener);
    info!("Stopping the server, draining {} session(s)", sessions.len());
    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            error!("session task failed: {}", e);
        }
    }
    info!("Server stopped");
    Ok(())
}

async fn handle_connection(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
    mut shutdown: ShutdownSignal,
) {
    let handshake = tokio::select! {
        biased;
        _ = shutdown.recv() => {
            info!("[session {}] shutdown before handshake with {} completed", id, peer);
            return;
        }
        handshake = tokio_tungstenite::accept_async(stream) => handshake,
    };
    let ws = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            warn!("[session {}] handshake with {} failed: {}", id, peer, e);
            return;
        }
    };
    info!("[session {}] WebSocket connected: {}", id, peer);
    let mut session = IngestSession::new(id, ctx);
    // failures are logged by the session itself
    let _ = session.run(text_messages(ws), shutdown).await;
    info!(
        "[session {}] WebSocket disconnected ({:?}, {} samples)",
        id,
        session.state(),
        session.stats().accepted
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{stream, SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::protocol::Message;

    use super::{serve, text_messages};
    use crate::config::Config;
    use crate::session::SessionContext;
    use crate::shutdown::Shutdown;

    #[tokio::test]
    async fn text_messages_stop_at_close() {
        let frames = stream::iter(vec![
            Ok::<_, String>(Message::Text("1".into())),
            Ok(Message::Ping(vec![1])),
            Ok(Message::Binary(b"2".to_vec())),
            Ok(Message::Binary(vec![0xff, 0xfe])),
            Ok(Message::Close(None)),
            Ok(Message::Text("3".into())),
        ]);
        let got: Vec<String> = text_messages(frames).collect().await;
        assert_eq!(got, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn text_messages_stop_at_error() {
        let frames = stream::iter(vec![
            Ok(Message::Text("1".into())),
            Err("reset"),
            Ok(Message::Text("2".into())),
        ]);
        let got: Vec<String> = text_messages(frames).collect().await;
        assert_eq!(got, vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn serves_websocket_clients_and_drains_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("sound_data.wav");
        let ctx = Arc::new(SessionContext::new(Config {
            buffer_capacity: 4,
            record: Some(record.clone()),
            ..Config::default()
        }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = Shutdown::new();
        let server = tokio::spawn(serve(listener, Arc::clone(&ctx), signal));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();
        for token in ["10", "abc", "20", "30"] {
            ws.send(Message::Text(token.into())).await.unwrap();
        }

        for _ in 0..400 {
            if ctx.buffer.latest() == 30 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ctx.buffer.snapshot(), vec![0, 10, 20, 30]);

        // connection still open: shutdown must drain the session and finalize the file
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let samples: Vec<i16> = hound::WavReader::open(&record)
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(samples, vec![10, 20, 30]);
        drop(ws);
    }

    #[tokio::test]
    async fn stalled_handshake_does_not_block_shutdown() {
        let ctx = Arc::new(SessionContext::new(Config::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = Shutdown::new();
        let server = tokio::spawn(serve(listener, ctx, signal));

        // plain TCP, never sends the upgrade request
        let idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(3), server)
            .await
            .expect("serve returned after shutdown")
            .unwrap()
            .unwrap();
        drop(idle);
    }
}
