//! Query listeners and per-connection dispatch
//!
//! The daemon answers throttling queries on two transports with one
//! protocol: ASCII tags separated by `\n` in, exactly three bytes (`OK\n` or
//! `NO\n`) out per tag, replies in query order.
//!
//! - **TCP** on a configured port, for callers elsewhere on the network
//! - **Unix-domain stream** at a configured path, chmod 0777 - the service's
//!   contract is that any local user may query
//!
//! Each accepted stream gets its own task owning the socket and a
//! [`LineFramer`]; connection teardown is just the task returning, which
//! releases everything the connection held.

use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::BytesMut;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;

use crate::actor::ThrottleHandle;
use crate::error::{Result, ServerError};
use crate::framing::{LineFramer, READ_CHUNK};
use crate::switches::Switches;

/// Listen backlog for both listeners.
const DEFAULT_BACKLOG: i32 = 32;

/// Per-connection receive buffer (SO_RCVBUF), best effort.
const DEFAULT_RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Query server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the TCP listener (e.g. "0.0.0.0")
    pub bind: String,

    /// TCP listen port; 0 lets the OS pick (used by tests)
    pub port: u16,

    /// Unix-domain socket path
    pub socket_path: PathBuf,

    /// Listen backlog
    pub backlog: i32,

    /// SO_RCVBUF for accepted sockets
    pub recv_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 6969,
            socket_path: PathBuf::from("/tmp/dthrottle.sock"),
            backlog: DEFAULT_BACKLOG,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Get the TCP socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// The query server: two listeners, one dispatch path.
pub struct QueryServer {
    tcp: TcpListener,
    unix: UnixListener,
    engine: ThrottleHandle,
    switches: Arc<Switches>,
    recv_buffer_size: usize,
}

impl QueryServer {
    /// Bind both listeners.
    ///
    /// Binding is fatal on failure (the process should exit non-zero); the
    /// Unix socket path is unlinked first so restarts are idempotent, and
    /// chmod failure after bind is logged but not fatal.
    pub fn bind(
        config: &ServerConfig,
        engine: ThrottleHandle,
        switches: Arc<Switches>,
    ) -> Result<Self> {
        let tcp = bind_tcp(config)?;
        let unix = bind_unix(&config.socket_path, config.backlog)?;

        tracing::info!(
            address = %config.bind_address(),
            socket_path = %config.socket_path.display(),
            "query server listening"
        );

        Ok(Self {
            tcp,
            unix,
            engine,
            switches,
            recv_buffer_size: config.recv_buffer_size,
        })
    }

    /// The TCP address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.tcp.local_addr()?)
    }

    /// Accept and dispatch until cancelled.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                result = self.tcp.accept() => match result {
                    Ok((stream, peer)) => {
                        set_recv_buffer(stream.as_raw_fd(), self.recv_buffer_size);
                        self.spawn_connection(stream, peer.to_string());
                    }
                    Err(e) => tracing::warn!(error = %e, "TCP accept error"),
                },

                result = self.unix.accept() => match result {
                    Ok((stream, _addr)) => {
                        set_recv_buffer(stream.as_raw_fd(), self.recv_buffer_size);
                        self.spawn_connection(stream, "unix".to_owned());
                    }
                    Err(e) => tracing::warn!(error = %e, "unix accept error"),
                },
            }
        }

        tracing::info!("query server stopped");
        Ok(())
    }

    fn spawn_connection<S>(&self, stream: S, peer: String)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let engine = self.engine.clone();
        let switches = Arc::clone(&self.switches);

        tokio::spawn(async move {
            tracing::debug!(peer = %peer, "client connected");
            serve_connection(stream, &peer, engine, switches).await;
            tracing::debug!(peer = %peer, "client disconnected");
        });
    }
}

/// Serve one connection until EOF or read error.
///
/// Lines are consumed in order and each reply is written before the next
/// line is taken, so replies appear in query order even when queries are
/// pipelined. Write failures are swallowed: the client has almost certainly
/// hung up, and we'll see the EOF on the next read.
async fn serve_connection<S>(
    mut stream: S,
    peer: &str,
    engine: ThrottleHandle,
    switches: Arc<Switches>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framer = LineFramer::new();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        buf.clear();
        match stream.read_buf(&mut buf).await {
            // EOF; whatever sits unterminated in the framer is dropped
            Ok(0) => break,
            Ok(n) => {
                framer.feed(&buf[..n]);

                while let Some(tag) = framer.next_line() {
                    let permitted = if switches.never_throttle() {
                        true
                    } else {
                        match engine.check(tag.clone()).await {
                            Ok(permitted) => permitted,
                            Err(_) => {
                                tracing::error!(peer = %peer, "engine gone, closing connection");
                                return;
                            }
                        }
                    };

                    let reply: &[u8] = if permitted {
                        b"OK\n"
                    } else {
                        tracing::info!(tag = %tag, "NO");
                        b"NO\n"
                    };

                    if let Err(e) = stream.write_all(reply).await {
                        tracing::debug!(peer = %peer, error = %e, "reply write failed");
                    }
                }
            }
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "read error");
                break;
            }
        }
    }
}

fn bind_tcp(config: &ServerConfig) -> Result<TcpListener> {
    let address = config.bind_address();
    let bind = |address: &str| -> std::io::Result<TcpListener> {
        let addr: std::net::SocketAddr = address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(config.backlog)?;

        // convert to tokio
        let std_listener: std::net::TcpListener = socket.into();
        TcpListener::from_std(std_listener)
    };

    bind(&address).map_err(|e| ServerError::Bind {
        address,
        source: e,
    })
}

fn bind_unix(path: &Path, backlog: i32) -> Result<UnixListener> {
    // unlink any prior socket file so restarts are idempotent
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }

    let bind = || -> std::io::Result<UnixListener> {
        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SockAddr::unix(path)?)?;
        socket.listen(backlog)?;

        // convert to tokio
        let std_listener: std::os::unix::net::UnixListener = socket.into();
        UnixListener::from_std(std_listener)
    };

    let listener = bind().map_err(|e| ServerError::Bind {
        address: path.display().to_string(),
        source: e,
    })?;

    // any local user may query
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777)) {
        tracing::warn!(path = %path.display(), error = %e, "chmod failed");
    }

    Ok(listener)
}

/// Best-effort SO_RCVBUF on an accepted socket.
fn set_recv_buffer(fd: RawFd, bytes: usize) {
    // SAFETY: we borrow the fd temporarily; forget() keeps socket2 from
    // closing it on drop - tokio still owns it.
    let socket = unsafe { Socket::from_raw_fd(fd) };
    if let Err(e) = socket.set_recv_buffer_size(bytes) {
        tracing::warn!(error = %e, "failed to set SO_RCVBUF");
    }
    std::mem::forget(socket);
}

#[cfg(test)]
#[path = "listener_test.rs"]
mod tests;
