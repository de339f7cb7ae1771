//! Per-connection tasks.
//!
//! Every accepted socket gets a reader task (with its own framer) that
//! emits `Data` events, and a writer task fed by a channel that writes
//! NUL-terminated command lines and reports `Completed` for each.
//! Closing a session aborts both tasks, so a stalled engine cannot keep
//! the socket open.

use std::net::SocketAddr;

use dbgp_proto::{encode_command, PacketFramer, SessionId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::{BridgeEvent, RequestId};
use crate::error::TransportError;

const READ_BUF_SIZE: usize = 8 * 1024;
const WRITER_QUEUE: usize = 64;

/// One queued command line.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub request: RequestId,
    pub text: String,
}

/// Reader-side notifications for the transport actor.
#[derive(Debug)]
pub(crate) enum SessionSignal {
    /// The peer closed the socket or reading failed.
    Eof(SessionId),
}

/// Transport-side handle of one session.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    pub id: SessionId,
    pub peer: SocketAddr,
    queue: Option<mpsc::Sender<Outbound>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionHandle {
    /// Split `stream` and start the reader and writer tasks.
    pub fn spawn(
        id: SessionId,
        stream: TcpStream,
        peer: SocketAddr,
        max_packet_len: usize,
        events: mpsc::Sender<BridgeEvent>,
        signals: mpsc::Sender<SessionSignal>,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::channel(WRITER_QUEUE);

        let writer = tokio::spawn(write_loop(id, write_half, writer_rx, events.clone()));
        let reader = tokio::spawn(read_loop(
            id,
            read_half,
            PacketFramer::with_max_packet_len(max_packet_len),
            events,
            signals,
        ));

        Self {
            id,
            peer,
            queue: Some(writer_tx),
            tasks: vec![reader, writer],
        }
    }

    /// Queue a command line. Fails when the session is closed.
    pub async fn send(&self, outbound: Outbound) -> Result<(), TransportError> {
        let closed = TransportError::SocketClosed { session: self.id };
        match &self.queue {
            Some(writer) => writer.send(outbound).await.map_err(|_| closed),
            None => Err(closed),
        }
    }

    /// Abort both tasks, dropping the socket and any queued writes.
    ///
    /// Returns false if the session was already closed.
    pub fn close(&mut self) -> bool {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.queue.take().is_some()
    }
}

async fn read_loop(
    id: SessionId,
    mut socket: OwnedReadHalf,
    mut framer: PacketFramer,
    events: mpsc::Sender<BridgeEvent>,
    signals: mpsc::Sender<SessionSignal>,
) {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(session = %id, "read failed: {}", e);
                break;
            }
        };

        for record in framer.feed(&buf[..n]) {
            match record {
                Ok(text) => {
                    let event = BridgeEvent::Data { session: id, text };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %id, "dropping malformed data: {}", e);
                }
            }
        }
    }
    let _ = signals.send(SessionSignal::Eof(id)).await;
}

async fn write_loop(
    id: SessionId,
    mut socket: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<BridgeEvent>,
) {
    let mut failed = false;
    while let Some(Outbound { request, text }) = queue.recv().await {
        let result = if failed {
            Err(TransportError::SocketClosed { session: id })
        } else {
            write_command(&mut socket, &text).await
        };
        if let Err(e) = &result {
            tracing::warn!(session = %id, request = %request, "send failed: {}", e);
            failed = true;
        }
        if events
            .send(BridgeEvent::Completed { request, result })
            .await
            .is_err()
        {
            break;
        }
    }
    let _ = socket.shutdown().await;
    tracing::debug!(session = %id, "writer finished");
}

async fn write_command(socket: &mut OwnedWriteHalf, text: &str) -> Result<(), TransportError> {
    let io = |e: std::io::Error| TransportError::Io {
        message: e.to_string(),
    };
    socket.write_all(&encode_command(text)).await.map_err(io)?;
    socket.flush().await.map_err(io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbgp_proto::frame_packet;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, server, peer)
    }

    #[tokio::test]
    async fn session_reader_emits_data_then_eof() {
        let (mut engine, server, peer) = connected_pair().await;
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (signals_tx, mut signals_rx) = mpsc::channel(8);
        let id = SessionId::new(5);
        let _handle = SessionHandle::spawn(id, server, peer, 1024, events_tx, signals_tx);

        let xml = "<?xml version=\"1.0\"?><init language=\"PHP\"/>";
        engine.write_all(&frame_packet(xml)).await.unwrap();
        match events_rx.recv().await.unwrap() {
            BridgeEvent::Data { session, text } => {
                assert_eq!(session, id);
                assert_eq!(text, xml);
            }
            other => panic!("unexpected event {other:?}"),
        }

        drop(engine);
        assert!(matches!(signals_rx.recv().await, Some(SessionSignal::Eof(s)) if s == id));
    }

    #[tokio::test]
    async fn session_writer_appends_nul_and_completes() {
        let (mut engine, server, peer) = connected_pair().await;
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (signals_tx, _signals_rx) = mpsc::channel(8);
        let handle = SessionHandle::spawn(SessionId::new(1), server, peer, 1024, events_tx, signals_tx);

        handle
            .send(Outbound {
                request: RequestId::new(7),
                text: "run -i t-0".into(),
            })
            .await
            .unwrap();

        let mut buf = [0u8; 11];
        engine.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"run -i t-0\0");

        assert_eq!(
            events_rx.recv().await.unwrap(),
            BridgeEvent::Completed {
                request: RequestId::new(7),
                result: Ok(())
            }
        );
    }

    #[tokio::test]
    async fn session_close_drops_a_stalled_write() {
        let (mut engine, server, peer) = connected_pair().await;
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (signals_tx, _signals_rx) = mpsc::channel(8);
        let mut handle =
            SessionHandle::spawn(SessionId::new(3), server, peer, 1024, events_tx, signals_tx);

        // Far more than the socket buffers hold while the engine is not reading.
        let text = "x".repeat(32 * 1024 * 1024);
        let total = text.len() + 1;
        handle
            .send(Outbound {
                request: RequestId::new(1),
                text,
            })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(handle.close());

        let mut received = Vec::new();
        let read = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            engine.read_to_end(&mut received),
        )
        .await
        .expect("socket stayed open after close");
        assert!(!matches!(read, Ok(n) if n == total));
    }

    #[tokio::test]
    async fn session_close_rejects_further_sends() {
        let (_engine, server, peer) = connected_pair().await;
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (signals_tx, _signals_rx) = mpsc::channel(8);
        let mut handle =
            SessionHandle::spawn(SessionId::new(2), server, peer, 1024, events_tx, signals_tx);

        assert!(handle.close());
        assert!(!handle.close());

        let err = handle
            .send(Outbound {
                request: RequestId::new(1),
                text: "run -i t-0".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::SocketClosed {
                session: SessionId::new(2)
            }
        );
    }
}
