//! Unix socket server exposing the method-call surface
//!
//! Each client connection carries framed postcard messages. Calls are
//! forwarded to the accessory worker through a [`BridgeHandle`]; replies go
//! back tagged with the request ID of the call they answer. A deferred
//! permission reply is awaited on its own task so it never holds up the
//! dispatch of later calls on the same connection.

use anyhow::{Context, Result};
use common::BridgeHandle;
use protocol::{
    BridgeFault, CallResult, Message, MessagePayload, ProtocolError, decode_framed, encode_framed,
    read_framed_async, validate_version, write_framed_async,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub struct HostServer {
    listener: UnixListener,
    socket_path: PathBuf,
    bridge: BridgeHandle,
}

impl HostServer {
    /// Bind the listening socket, replacing any stale socket file
    pub fn bind(socket_path: &Path, bridge: BridgeHandle) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path).with_context(|| {
                format!("Failed to remove stale socket: {}", socket_path.display())
            })?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create socket directory: {}", parent.display())
            })?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind socket: {}", socket_path.display()))?;

        info!("Listening on {}", socket_path.display());
        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            bridge,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept clients until the listener fails
    pub async fn run(&self) -> Result<()> {
        loop {
            let (stream, _addr) = self
                .listener
                .accept()
                .await
                .context("Failed to accept client connection")?;
            info!("Client connected");

            let bridge = self.bridge.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_client(stream, bridge).await {
                    error!("Client connection error: {:#}", e);
                }
            });
        }
    }
}

async fn handle_client(stream: UnixStream, bridge: BridgeHandle) -> Result<()> {
    let (mut reader, writer) = stream.into_split();
    // Replies from concurrently awaited calls interleave on one stream
    let writer = Arc::new(Mutex::new(writer));

    loop {
        let frame = match read_framed_async(&mut reader).await {
            Ok(frame) => frame,
            Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                info!("Client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e).context("Failed to read frame"),
        };

        let message = decode_framed(&frame).context("Failed to decode frame")?;
        validate_version(&message.version).context("Incompatible client version")?;

        match message.payload {
            MessagePayload::Call { id, call } => {
                debug!("inside {}", call.name());

                let reply = match bridge.begin(call).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        // Worker gone; report the fault and keep the
                        // connection alive
                        let fault =
                            BridgeFault::illegal_state(format!("bridge worker unavailable: {e}"));
                        send_reply(&writer, id, Err(fault)).await?;
                        continue;
                    }
                };

                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    let result = match reply.await {
                        Ok(result) => result,
                        Err(e) => Err(BridgeFault::illegal_state(format!(
                            "bridge worker unavailable: {e}"
                        ))),
                    };
                    if let Err(e) = send_reply(&writer, id, result).await {
                        warn!("Failed to send reply for {:?}: {:#}", id, e);
                    }
                });
            }
            MessagePayload::Reply { id, .. } => {
                warn!("Ignoring unexpected reply payload {:?} from client", id);
            }
        }
    }
}

async fn send_reply(
    writer: &Mutex<OwnedWriteHalf>,
    id: protocol::RequestId,
    result: CallResult,
) -> Result<()> {
    let message = Message::reply(id, result);
    let bytes = encode_framed(&message).context("Failed to encode reply")?;

    let mut writer = writer.lock().await;
    write_framed_async(&mut *writer, &bytes)
        .await
        .context("Failed to write reply")?;
    Ok(())
}
