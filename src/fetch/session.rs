// ── Session factory – one authenticated connection per operation ─────────────

use crate::fetch::config::FetchConfig;
use crate::fetch::types::FetchError;
use log::info;
use ssh2::Session;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Opens one authenticated SSH session per operation. Sessions are never
/// shared or pooled; the operation that requested one owns it and closes it.
pub struct SessionFactory {
    config: FetchConfig,
}

impl SessionFactory {
    pub fn new(config: FetchConfig) -> Self {
        SessionFactory { config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Connect, handshake and authenticate with the configured private key.
    /// No retry: a single failed attempt surfaces to the caller.
    pub fn open(&self) -> Result<RemoteSession, FetchError> {
        let addr = self.config.addr();
        info!(
            "connecting to {}@{} using key {}",
            self.config.username,
            addr,
            self.config.private_key_path.display()
        );

        let sock_addr = addr
            .to_socket_addrs()
            .map_err(|e| FetchError::Connection(format!("cannot resolve '{}': {}", addr, e)))?
            .next()
            .ok_or_else(|| {
                FetchError::Connection(format!("'{}' resolved to no addresses", addr))
            })?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let tcp = TcpStream::connect_timeout(&sock_addr, timeout)
            .map_err(|e| FetchError::Connection(format!("TCP connection to {} failed: {}", addr, e)))?;
        tcp.set_nonblocking(false)
            .map_err(|e| FetchError::Connection(format!("failed to set blocking mode: {}", e)))?;

        let mut session = Session::new()
            .map_err(|e| FetchError::Connection(format!("failed to create SSH session: {}", e)))?;

        // Bounds the handshake and authentication. Cleared again below: once
        // the session is established, operations block to completion, and a
        // long-running remote command must not trip the connect timeout.
        session.set_timeout(timeout.as_millis() as u32);

        session.set_tcp_stream(
            tcp.try_clone()
                .map_err(|e| FetchError::Connection(e.to_string()))?,
        );

        // Host identity is NOT verified: any host key is accepted. Known risk
        // carried over from the source behaviour.
        session
            .handshake()
            .map_err(|e| FetchError::Connection(format!("SSH handshake with {} failed: {}", addr, e)))?;

        // Key-only authentication: no agent, no default ~/.ssh probing, no
        // password or keyboard-interactive fallback.
        session
            .userauth_pubkey_file(
                &self.config.username,
                None,
                &self.config.private_key_path,
                None,
            )
            .map_err(|e| {
                FetchError::Connection(format!(
                    "public-key authentication for {}@{} failed: {}",
                    self.config.username, addr, e
                ))
            })?;

        if !session.authenticated() {
            return Err(FetchError::Connection(
                "not authenticated after public-key attempt".into(),
            ));
        }

        // 0 = block without limit on every later call.
        session.set_timeout(0);

        info!("authenticated to {}@{}", self.config.username, addr);
        Ok(RemoteSession { session, tcp })
    }
}

/// An authenticated connection, exclusively owned by one operation.
pub struct RemoteSession {
    session: Session,
    #[allow(dead_code)] // held to keep the TCP connection alive
    tcp: TcpStream,
}

impl RemoteSession {
    /// Exec channel for one remote command.
    pub fn channel_session(&self) -> Result<ssh2::Channel, ssh2::Error> {
        self.session.channel_session()
    }

    /// File-transfer sub-channel. The returned handle keeps the underlying
    /// session alive independently of this struct's borrow.
    pub fn sftp(&self) -> Result<ssh2::Sftp, FetchError> {
        self.session
            .sftp()
            .map_err(|e| FetchError::Connection(format!("failed to open SFTP sub-channel: {}", e)))
    }

    /// Graceful disconnect. Consumes the session; dropping without calling
    /// this still tears the connection down.
    pub fn close(self) {
        let _ = self.session.disconnect(None, "client disconnecting", None);
    }
}
