//! RPC server: accept loop, per-connection frame handling and notification push.
//!
//! This module is responsible for:
//!
//! 1. Accepting TCP connections from configuration tools.
//! 2. Reassembling request frames from the byte stream.
//! 3. Running each request through the shared [`KeymapRpcService`], one at a
//!    time across all connections.
//! 4. Pushing every notification the service raises to every connected
//!    client.
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Error responses
//!
//! A complete frame whose operation is unknown is answered with a meta
//! `RPC_NOT_FOUND` error carrying the request's id.  Any other undecodable
//! frame gets a meta `GENERIC` error.  A header that cannot be parsed at all
//! (bad version, bad kind, oversized payload) closes the connection, since
//! the stream can no longer be resynchronised.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use keymap_core::protocol::{
    decode_header, decode_request, encode_notification, encode_response, FrameHeader, MetaError,
    Notification, RpcResponse, HEADER_SIZE,
};
use keymap_core::ProtocolError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::keymap_rpc::{
    KeymapRpcService, KeymapStore, NotificationSink, PhysicalLayoutStore,
};

/// The service shared by every connection.
pub type SharedService<K, L> = Arc<Mutex<KeymapRpcService<K, L>>>;

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

// ── Notification fan-out ──────────────────────────────────────────────────────

/// [`NotificationSink`] that broadcasts to every subscribed connection.
#[derive(Debug)]
pub struct BroadcastNotifications {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifications {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifications {
    fn default() -> Self {
        Self::new(32)
    }
}

impl NotificationSink for BroadcastNotifications {
    fn raise(&self, notification: Notification) {
        match self.tx.send(notification) {
            Ok(receivers) => debug!(?notification, receivers, "notification raised"),
            Err(_) => debug!(?notification, "notification raised with no clients connected"),
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the accept loop on `listener` until `running` is set to `false`.
///
/// Each accepted connection is served by its own Tokio task.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run_server<K, L>(
    listener: TcpListener,
    service: SharedService<K, L>,
    notifications: Arc<BroadcastNotifications>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()>
where
    K: KeymapStore + Send + 'static,
    L: PhysicalLayoutStore + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "keymap RPC server listening");

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the running flag is polled even when idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!(%peer_addr, "client connected");
                let service = Arc::clone(&service);
                let updates = notifications.subscribe();
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, service, updates).await;
                });
            }
            Ok(Err(e)) => error!(error = %e, "accept error"),
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection<K, L>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    service: SharedService<K, L>,
    updates: broadcast::Receiver<Notification>,
) where
    K: KeymapStore + Send + 'static,
    L: PhysicalLayoutStore + Send + 'static,
{
    let (read_half, write_half) = stream.into_split();
    let writer: SharedWriter = Arc::new(Mutex::new(write_half));

    let push_task = tokio::spawn(push_notifications(updates, Arc::clone(&writer), peer_addr));

    match serve_requests(read_half, &writer, &service).await {
        Ok(()) => info!(%peer_addr, "client disconnected"),
        Err(e) => warn!(%peer_addr, "connection closed with error: {e:#}"),
    }
    push_task.abort();
}

/// Forwards broadcast notifications to one client until it goes away.
async fn push_notifications(
    mut updates: broadcast::Receiver<Notification>,
    writer: SharedWriter,
    peer_addr: SocketAddr,
) {
    loop {
        let notification = match updates.recv().await {
            Ok(notification) => notification,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(%peer_addr, missed, "client fell behind on notifications");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let bytes = match encode_notification(&notification) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "failed to encode notification");
                continue;
            }
        };
        if writer.lock().await.write_all(&bytes).await.is_err() {
            debug!(%peer_addr, "notification write failed; client gone");
            break;
        }
    }
}

/// Reads request frames until EOF, answering each one in order.
async fn serve_requests<K, L>(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    writer: &SharedWriter,
    service: &SharedService<K, L>,
) -> anyhow::Result<()>
where
    K: KeymapStore,
    L: PhysicalLayoutStore,
{
    let mut recv_buf: Vec<u8> = Vec::with_capacity(4096);
    let mut read_tmp = vec![0u8; 4096];

    loop {
        let n = read_half.read(&mut read_tmp).await?;
        if n == 0 {
            return Ok(());
        }
        recv_buf.extend_from_slice(&read_tmp[..n]);

        // A single read may hold several frames, or only part of one.
        loop {
            let header = match decode_header(&recv_buf) {
                Ok(header) => header,
                Err(ProtocolError::InsufficientData { .. }) => break,
                Err(e) => anyhow::bail!("unrecoverable frame header: {e}"),
            };
            let frame_len = HEADER_SIZE + header.payload_len;
            if recv_buf.len() < frame_len {
                break;
            }

            let bytes = {
                let mut service = service.lock().await;
                answer_frame(&mut service, &header, &recv_buf[HEADER_SIZE..frame_len])
            };
            recv_buf.drain(..frame_len);

            writer.lock().await.write_all(&bytes).await?;
        }
    }
}

/// Decodes one request frame, runs it and encodes the reply.
fn answer_frame<K, L>(
    service: &mut KeymapRpcService<K, L>,
    header: &FrameHeader,
    payload: &[u8],
) -> Vec<u8>
where
    K: KeymapStore,
    L: PhysicalLayoutStore,
{
    let request_id = header.request_id;
    let encoded = match decode_request(header, payload) {
        Ok(request) => encode_response(&service.handle(request)),
        Err(ProtocolError::UnknownOperation(op)) => {
            warn!(request_id, op, "unknown keymap operation");
            encode_response(&RpcResponse::meta(request_id, MetaError::RpcNotFound))
        }
        Err(e) => {
            warn!(request_id, error = %e, "malformed request");
            encode_response(&RpcResponse::meta(request_id, MetaError::Generic))
        }
    };

    encoded.unwrap_or_else(|e| {
        error!(request_id, error = %e, "failed to encode response");
        generic_error_frame(request_id)
    })
}

fn generic_error_frame(request_id: u32) -> Vec<u8> {
    encode_response(&RpcResponse::meta(request_id, MetaError::Generic)).unwrap_or_default()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::startup::LocalIdBoot;
    use crate::infrastructure::device::assemble_service;
    use crate::infrastructure::storage::config::parse_config;
    use keymap_core::protocol::{
        decode_frame, encode_request, BindingMessage, DecodedFrame, DecodedKeymapResponse,
        DecodedResponseBody, KeymapRequest, RpcRequest, SetLayerBindingRequest,
        SetLayerBindingResponse, PROTOCOL_VERSION,
    };
    use keymap_core::{MemorySettings, SettingsStore};

    const CONFIG: &str = r#"
[[behaviors]]
name = "key_press"
[[behaviors.metadata]]
param1 = [{ type = "hid_usage" }]

[[physical_layouts]]
id = "two"
keys = [{ x = 0 }, { x = 100 }]

[[keymap.layers]]
name = "Base"
bindings = [{ behavior = "key_press", param1 = 0x70004 }]
"#;

    async fn start_server() -> SocketAddr {
        let config = parse_config(CONFIG).unwrap();
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());
        let notifications = Arc::new(BroadcastNotifications::default());
        let service = assemble_service(
            &config,
            settings,
            &LocalIdBoot::new(),
            notifications.clone(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_server(
            listener,
            Arc::new(Mutex::new(service)),
            notifications,
            Arc::new(AtomicBool::new(true)),
        ));
        addr
    }

    async fn read_frame(stream: &mut TcpStream) -> DecodedFrame {
        let mut header = [0u8; HEADER_SIZE];
        timeout(Duration::from_secs(5), stream.read_exact(&mut header))
            .await
            .unwrap()
            .unwrap();
        let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let mut frame = header.to_vec();
        frame.resize(HEADER_SIZE + len, 0);
        stream.read_exact(&mut frame[HEADER_SIZE..]).await.unwrap();
        decode_frame(&frame).unwrap().0
    }

    async fn send(stream: &mut TcpStream, request_id: u32, request: KeymapRequest) {
        let bytes = encode_request(&RpcRequest {
            request_id,
            request,
        })
        .unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_keymap_over_tcp() {
        // Arrange
        let addr = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        // Act
        send(&mut client, 5, KeymapRequest::GetKeymap).await;
        let frame = read_frame(&mut client).await;

        // Assert
        let DecodedFrame::Response {
            request_id,
            body: DecodedResponseBody::Keymap(DecodedKeymapResponse::GetKeymap(keymap)),
        } = frame
        else {
            panic!("unexpected frame: {frame:?}");
        };
        assert_eq!(request_id, 5);
        assert_eq!(keymap.layers.len(), 1);
        assert_eq!(keymap.layers[0].name.as_deref(), Some("Base"));
        assert_eq!(keymap.layers[0].bindings.len(), 2);
        assert_eq!(keymap.layers[0].bindings[0].param1, 0x70004);
    }

    #[tokio::test]
    async fn test_unknown_operation_returns_rpc_not_found() {
        let addr = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut raw = vec![PROTOCOL_VERSION, 1, 0x7F, 0];
        raw.extend_from_slice(&42u32.to_be_bytes());
        raw.extend_from_slice(&0u32.to_be_bytes());
        client.write_all(&raw).await.unwrap();
        let frame = read_frame(&mut client).await;

        assert_eq!(
            frame,
            DecodedFrame::Response {
                request_id: 42,
                body: DecodedResponseBody::Meta(MetaError::RpcNotFound),
            }
        );
    }

    #[tokio::test]
    async fn test_truncated_payload_returns_generic_error() {
        let addr = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        // SetLayerBinding with a 2-byte payload
        let mut raw = vec![PROTOCOL_VERSION, 1, 0x02, 0];
        raw.extend_from_slice(&9u32.to_be_bytes());
        raw.extend_from_slice(&2u32.to_be_bytes());
        raw.extend_from_slice(&[0, 0]);
        client.write_all(&raw).await.unwrap();

        assert_eq!(
            read_frame(&mut client).await,
            DecodedFrame::Response {
                request_id: 9,
                body: DecodedResponseBody::Meta(MetaError::Generic),
            }
        );
    }

    #[tokio::test]
    async fn test_mutation_notifies_every_client() {
        // Arrange: both sessions complete a round trip so they are live
        let addr = start_server().await;
        let mut editor = TcpStream::connect(addr).await.unwrap();
        let mut observer = TcpStream::connect(addr).await.unwrap();
        send(&mut observer, 1, KeymapRequest::CheckUnsavedChanges).await;
        read_frame(&mut observer).await;
        send(&mut editor, 1, KeymapRequest::GetKeymap).await;
        let DecodedFrame::Response {
            body: DecodedResponseBody::Keymap(DecodedKeymapResponse::GetKeymap(keymap)),
            ..
        } = read_frame(&mut editor).await
        else {
            panic!("expected a keymap");
        };
        let key_press_id = keymap.layers[0].bindings[0].behavior_id;

        // Act
        send(
            &mut editor,
            2,
            KeymapRequest::SetLayerBinding(SetLayerBindingRequest {
                layer: 0,
                key_position: 1,
                binding: BindingMessage {
                    behavior_id: key_press_id,
                    param1: 0x70005,
                    param2: 0,
                },
            }),
        )
        .await;
        let editor_frames = [read_frame(&mut editor).await, read_frame(&mut editor).await];

        // Assert: response and notification may arrive in either order
        let notification =
            DecodedFrame::Notification(Notification::UnsavedChangesStatusChanged(true));
        assert!(editor_frames.contains(&notification));
        assert!(editor_frames.contains(&DecodedFrame::Response {
            request_id: 2,
            body: DecodedResponseBody::Keymap(DecodedKeymapResponse::SetLayerBinding(
                SetLayerBindingResponse::Success
            )),
        }));
        assert_eq!(read_frame(&mut observer).await, notification);
    }
}
