//! Unix-socket connector for the local presence-display peer.
//!
//! Display peers listen on numbered sockets in the runtime directory
//! (`presence-display-0` … `presence-display-9`), the same probe-by-number
//! scheme local IPC display clients use. The protocol is newline-delimited
//! JSON: we send a hello naming the application identity we want to display
//! for, the peer answers with the identity it actually serves, and from then
//! on every line is an activity update.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{watch, Mutex};

use vigil_services::{Activity, LinkError, PeerConnector, PeerFilter, PeerInfo, PeerLink};

const SOCKET_PREFIX: &str = "presence-display-";
const SOCKET_PROBES: u32 = 10;

#[derive(Deserialize)]
struct ReadyMessage {
    op: String,
    identity: String,
    name: Option<String>,
}

pub struct SocketPeerConnector {
    socket_dir: PathBuf,
}

impl SocketPeerConnector {
    pub fn new(socket_dir: Option<PathBuf>) -> Self {
        let socket_dir = socket_dir.unwrap_or_else(|| {
            std::env::var("XDG_RUNTIME_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir())
        });
        Self { socket_dir }
    }

    async fn attach(&self, path: &PathBuf, target: &str) -> Result<(PeerInfo, UnixStream), LinkError> {
        let mut stream = UnixStream::connect(path)
            .await
            .map_err(|e| LinkError::Unavailable(e.to_string()))?;

        let hello = json!({ "op": "hello", "client": target });
        let mut line = serde_json::to_string(&hello)
            .map_err(|e| LinkError::Transport(e.to_string()))?;
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;

        let mut reader = BufReader::new(&mut stream);
        let mut response = String::new();
        reader
            .read_line(&mut response)
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;
        let ready: ReadyMessage = serde_json::from_str(response.trim())
            .map_err(|e| LinkError::Transport(format!("bad ready message: {e}")))?;
        if ready.op != "ready" {
            return Err(LinkError::Transport(format!(
                "unexpected op in handshake: {}",
                ready.op
            )));
        }

        Ok((
            PeerInfo {
                identity: ready.identity,
                name: ready.name,
            },
            stream,
        ))
    }
}

#[async_trait]
impl PeerConnector for SocketPeerConnector {
    async fn connect(
        &self,
        target: &str,
        filter: Option<&PeerFilter>,
    ) -> Result<Arc<dyn PeerLink>, LinkError> {
        for probe in 0..SOCKET_PROBES {
            let path = self.socket_dir.join(format!("{SOCKET_PREFIX}{probe}"));
            let (info, stream) = match self.attach(&path, target).await {
                Ok(attached) => attached,
                Err(_) => continue,
            };

            if let Some(filter) = filter {
                if !filter(&info) {
                    tracing::debug!(peer = %info.identity, "candidate peer rejected by filter");
                    continue;
                }
            }

            tracing::debug!(path = %path.display(), peer = %info.identity, "display peer attached");
            return Ok(Arc::new(SocketPeerLink::new(info, stream)));
        }
        Err(LinkError::Unavailable(format!(
            "no display peer socket under {}",
            self.socket_dir.display()
        )))
    }
}

/// Activity update written to the peer. `activity: null` clears the display.
#[derive(Serialize)]
struct ActivityMessage<'a> {
    op: &'static str,
    activity: Option<&'a Activity>,
}

pub struct SocketPeerLink {
    info: PeerInfo,
    writer: Mutex<OwnedWriteHalf>,
    closed_rx: watch::Receiver<bool>,
}

impl SocketPeerLink {
    fn new(info: PeerInfo, stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (closed_tx, closed_rx) = watch::channel(false);
        tokio::spawn(read_until_close(read_half, closed_tx));
        Self {
            info,
            writer: Mutex::new(write_half),
            closed_rx,
        }
    }
}

/// Drain the peer's side of the stream; EOF or a read error means the
/// transport dropped.
async fn read_until_close(read_half: OwnedReadHalf, closed_tx: watch::Sender<bool>) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {} // peers may ping; nothing to do
        }
    }
    let _ = closed_tx.send(true);
}

#[async_trait]
impl PeerLink for SocketPeerLink {
    fn peer(&self) -> &PeerInfo {
        &self.info
    }

    async fn send(&self, activity: Option<&Activity>) -> Result<(), LinkError> {
        let message = ActivityMessage {
            op: "activity",
            activity,
        };
        let mut line =
            serde_json::to_string(&message).map_err(|e| LinkError::Transport(e.to_string()))?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))
    }

    async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
