//! In-process peers for unit tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use crate::network::{Connector, Endpoint};
use crate::wire::IpcRequest;

/// How the fake peer answers each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PeerMode {
    Echo,
    Reject,
    /// Accepts but leaves out `replyHex`.
    NoHex,
    /// Answers one byte short.
    Truncate,
    /// Answers with `cbData` copies of one byte.
    Fill(u8),
}

/// Connector that hands out in-memory streams served by a fake peer.
#[derive(Clone)]
pub(crate) struct MockConnector {
    pub attempts: Arc<AtomicUsize>,
    pub refuse: Arc<AtomicBool>,
    pub mode: Arc<Mutex<PeerMode>>,
    pub endpoints: Arc<Mutex<Vec<Endpoint>>>,
    /// `cbData` of every request the peer received.
    pub sent: Arc<Mutex<Vec<u32>>>,
}

impl MockConnector {
    pub fn new(mode: PeerMode) -> Self {
        Self {
            attempts: Arc::default(),
            refuse: Arc::default(),
            mode: Arc::new(Mutex::new(mode)),
            endpoints: Arc::default(),
            sent: Arc::default(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn set_mode(&self, mode: PeerMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn sent(&self) -> Vec<u32> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Stream = DuplexStream;

    async fn connect(&mut self, endpoint: &Endpoint) -> io::Result<DuplexStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint.clone());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        let (client, peer) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(peer, Arc::clone(&self.mode), Arc::clone(&self.sent)));
        Ok(client)
    }
}

async fn serve(stream: DuplexStream, mode: Arc<Mutex<PeerMode>>, sent: Arc<Mutex<Vec<u32>>>) {
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(req) = serde_json::from_str::<IpcRequest>(&line) else {
            break;
        };
        sent.lock().unwrap().push(req.cb_data);
        let current = *mode.lock().unwrap();
        let reply = match current {
            PeerMode::Echo => json!({"ok": true, "replyHex": req.hex, "replyDwData": req.dw_data}),
            PeerMode::Reject => json!({"ok": false, "error": "rejected by test peer"}),
            PeerMode::NoHex => json!({"ok": true}),
            PeerMode::Truncate => {
                let cut = req.hex.len().saturating_sub(2);
                json!({"ok": true, "replyHex": &req.hex[..cut]})
            }
            PeerMode::Fill(byte) => {
                let fill = crate::hex::encode(&vec![byte; req.cb_data as usize]);
                json!({"ok": true, "replyHex": fill})
            }
        };
        if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
            break;
        }
    }
}
