//! Synchronous facade over the bridge for a message-loop thread.
//!
//! The window procedure calls into [`BridgeHost`] and gets a plain
//! handled / not-handled answer back. Each call runs the async core to
//! completion on a current-thread runtime owned by the host, so the loop
//! is blocked for exactly one request at a time.

use std::io;

use tokio::runtime::{Builder, Runtime};
use tracing::{info, warn};
use uipc_core::{
    BridgeContext, BridgeStatus, ConnectionPhase, Disposition, Endpoint, PeerHealth, Reconnector,
    RegionCache, RegionHandle, RegionSource, Request, RetryTimer, TcpConnector,
};

use crate::config::{BridgeConfig, ConfigError};

pub struct BridgeHost<T: RetryTimer, S: RegionSource> {
    runtime: Runtime,
    bridge: BridgeContext<TcpConnector, T, S>,
}

impl<T: RetryTimer, S: RegionSource> BridgeHost<T, S> {
    pub fn new(config: &BridgeConfig, timer: T, source: S) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let options = config.client_options();
        let link = Reconnector::new(
            TcpConnector::new(options.connect_timeout),
            timer,
            config.endpoint(),
            options,
        );
        Ok(Self {
            runtime,
            bridge: BridgeContext::new(link, RegionCache::new(source)),
        })
    }

    /// First connection attempt. A failure arms the retry timer.
    pub fn start(&mut self) {
        info!(endpoint = %self.bridge.link().endpoint(), "bridge starting");
        if let Err(e) = self.runtime.block_on(self.bridge.ensure_connected()) {
            warn!("initial connect failed: {e}");
        }
    }

    /// A block passed inside the message. `None` stands for a missing or
    /// empty payload, which is acknowledged without forwarding.
    pub fn handle_copy_data(&mut self, tag: u32, block: Option<&mut [u8]>) -> bool {
        let Some(block) = block else {
            return true;
        };
        let disposition = self
            .runtime
            .block_on(self.bridge.dispatch(Request::Direct { tag, block }));
        disposition.is_handled()
    }

    /// A block living in the shared region named by `handle`.
    pub fn handle_region_request(&mut self, handle: u32, offset: isize) -> bool {
        let request = Request::Region {
            handle: RegionHandle::new(handle),
            offset,
        };
        let disposition = self.runtime.block_on(self.bridge.dispatch(request));
        if let Disposition::Rejected(reason) = &disposition {
            warn!(handle, offset, "region request not handled: {reason}");
        }
        disposition.is_handled()
    }

    /// Retry timer expiry.
    pub fn on_tick(&mut self) {
        self.runtime.block_on(self.bridge.on_tick());
    }

    /// Reconnect to the endpoint in `config`.
    pub fn restart(&mut self, config: &BridgeConfig) {
        let endpoint = config.endpoint();
        if let Err(e) = self.runtime.block_on(self.bridge.restart(endpoint)) {
            warn!("restart: {e}");
        }
    }

    /// Re-read the configuration and restart against it.
    pub fn reload(
        &mut self,
        resolve: impl FnOnce() -> Result<BridgeConfig, ConfigError>,
    ) -> Result<(), ConfigError> {
        let config = resolve()?;
        info!(endpoint = %config.endpoint(), "configuration reloaded");
        self.restart(&config);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.bridge.shutdown();
        info!(
            forwarded = self.bridge.health().forwarded,
            failed = self.bridge.health().failed,
            "bridge stopped"
        );
    }

    pub fn status(&self) -> &BridgeStatus {
        self.bridge.status()
    }

    /// One-line status for display.
    pub fn status_line(&self) -> String {
        self.bridge.status().to_string()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.bridge.link().endpoint()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.bridge.phase()
    }

    pub fn health(&self) -> &PeerHealth {
        self.bridge.health()
    }

    pub fn is_retrying(&self) -> bool {
        self.bridge.link().is_timer_armed()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    use uipc_core::{DirRegionSource, ManualTimer, REGION_LEN};

    use super::*;

    /// Echo peer on a background thread; answers every line it gets.
    fn echo_peer() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                thread::spawn(move || {
                    let mut writer = stream.try_clone().unwrap();
                    for line in BufReader::new(stream).lines() {
                        let Ok(line) = line else { break };
                        let req: serde_json::Value = serde_json::from_str(&line).unwrap();
                        let reply = serde_json::json!({"ok": true, "replyHex": req["hex"]});
                        if writeln!(writer, "{reply}").is_err() {
                            break;
                        }
                    }
                });
            }
        });
        port
    }

    fn config(port: u16) -> BridgeConfig {
        BridgeConfig {
            port,
            io_timeout_ms: 2000,
            ..BridgeConfig::default()
        }
    }

    fn host(port: u16, dir: &std::path::Path) -> BridgeHost<ManualTimer, DirRegionSource> {
        BridgeHost::new(&config(port), ManualTimer::default(), DirRegionSource::new(dir)).unwrap()
    }

    #[test]
    fn copy_data_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(echo_peer(), dir.path());
        host.start();
        assert!(host.phase().is_connected());

        let mut block = [1u8, 2, 3];
        assert!(host.handle_copy_data(9, Some(&mut block[..])));
        assert_eq!(block, [1, 2, 3]);
        assert_eq!(host.health().forwarded, 1);
    }

    #[test]
    fn null_copy_data_is_handled() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(echo_peer(), dir.path());
        assert!(host.handle_copy_data(0, None));
        assert_eq!(*host.status(), BridgeStatus::Idle);
    }

    #[test]
    fn region_request_through_mapped_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirRegionSource::new(dir.path());
        std::fs::write(source.path_for(RegionHandle::new(0x21)), vec![0u8; REGION_LEN]).unwrap();

        let mut host = host(echo_peer(), dir.path());
        assert!(host.handle_region_request(0x21, 0));
        assert!(!host.handle_region_request(0x21, -1));
        assert!(!host.handle_region_request(0x21, REGION_LEN as isize));
        assert!(host.handle_region_request(0, 0));
    }

    #[test]
    fn start_against_dead_port_retries() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(port, dir.path());
        host.start();

        assert!(host.phase().is_disconnected());
        assert!(host.is_retrying());
        assert!(host.status_line().starts_with(&format!("Connect to 127.0.0.1:{port} failed")));

        // The failed forward is still acknowledged.
        let mut block = [0u8; 2];
        assert!(host.handle_copy_data(1, Some(&mut block[..])));
    }

    #[test]
    fn reload_switches_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(echo_peer(), dir.path());
        host.start();

        let other = echo_peer();
        host.reload(|| Ok(config(other))).unwrap();
        assert_eq!(host.endpoint().port(), other);
        assert!(host.phase().is_connected());

        assert!(host.reload(|| Err(ConfigError::InvalidPort)).is_err());
        assert_eq!(host.endpoint().port(), other);
    }

    #[test]
    fn shutdown_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(echo_peer(), dir.path());
        host.start();
        host.shutdown();
        assert!(host.phase().is_disconnected());
        assert!(!host.is_retrying());
    }
}
