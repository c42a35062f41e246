//! Unix domain socket runtime for storesync channels.
//!
//! [`UnixConnector`] is a client-side [`ChannelFactory`]; every `open` makes
//! one connection carrying one channel. [`UnixChannelListener`] is the
//! matching host-side [`ChannelAcceptor`].

use std::fmt;
use std::future::Future;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use storesync_channel::{Channel, ChannelAcceptor, ChannelError, ChannelFactory};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{kind_name, Frame, FrameCodec, FrameConfig, MESSAGE};
use crate::error::{FrameError, Result};
use crate::handshake::{handshake_client, handshake_server, HandshakeConfig};

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Carry `name` over an established, handshaken connection.
///
/// Returns the local end of the channel. A background task moves messages
/// between it and the connection; when either side goes away the other
/// observes a disconnect.
pub fn bridge<T>(framed: Framed<T, FrameCodec>, name: &str) -> Channel
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (local, remote) = Channel::pair(name);
    tokio::spawn(pump(framed, remote));
    local
}

async fn pump<T>(framed: Framed<T, FrameCodec>, channel: Channel)
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let name = channel.name().to_string();
    let (to_local, mut from_local) = channel.split();
    let (mut sink, mut stream) = framed.split();

    // The directions never wait on each other: a write stalled on a full
    // socket buffer must not stop the reader from draining the peer.
    let outbound = async {
        while let Some(message) = from_local.recv().await {
            sink.send(Frame::json(MESSAGE, &message)?).await?;
        }
        sink.close().await?;
        Ok::<_, FrameError>(())
    };

    let inbound = async {
        loop {
            match stream.next().await {
                Some(Ok(frame)) if frame.kind == MESSAGE => {
                    match serde_json::from_slice::<Value>(&frame.payload) {
                        Ok(message) => {
                            if to_local.send(message).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!(channel = %name, error = %err, "closing connection after undecodable message");
                            return;
                        }
                    }
                }
                Some(Ok(frame)) => {
                    warn!(channel = %name, kind = kind_name(frame.kind), "closing connection after unexpected frame");
                    return;
                }
                Some(Err(err)) => {
                    debug!(channel = %name, error = %err, "connection read failed");
                    return;
                }
                None => {
                    debug!(channel = %name, "connection closed by peer");
                    return;
                }
            }
        }
    };

    tokio::select! {
        written = outbound => {
            if let Err(err) = written {
                warn!(channel = %name, error = %err, "closing connection after failed write");
            }
        }
        () = inbound => {}
    }
}

/// Opens channels by connecting to a [`UnixChannelListener`].
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
    handshake: HandshakeConfig,
    frame: FrameConfig,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handshake: HandshakeConfig::default(),
            frame: FrameConfig::default(),
        }
    }

    /// Override handshake config.
    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake = config;
        self
    }

    /// Override frame config used after the handshake.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame = config;
        self
    }

    /// Socket path this connector dials.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connect, open `name` and bridge it to a local channel.
    pub async fn connect(&self, name: &str) -> Result<Channel> {
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|source| FrameError::Connect {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = ?self.path, channel = name, "connected to unix domain socket");

        let mut framed = Framed::new(stream, FrameCodec::with_config(self.frame.clone()));
        handshake_client(&mut framed, name, &self.handshake).await?;
        Ok(bridge(framed, name))
    }
}

impl ChannelFactory for UnixConnector {
    fn open(&self, name: &str) -> impl Future<Output = storesync_channel::Result<Channel>> + Send {
        async move {
            self.connect(name)
                .await
                .map_err(|err| ChannelError::open(name, err))
        }
    }
}

/// Listens on a Unix domain socket and yields one channel per connection.
///
/// Connections are accepted and handshaken on a background task, so
/// [`UnixChannelListener::accept_channel`] is cancel-safe. The socket file is
/// removed on drop unless something else replaced it.
pub struct UnixChannelListener {
    path: PathBuf,
    created_inode: (u64, u64),
    accepted: mpsc::UnboundedReceiver<Channel>,
    accept_loop: JoinHandle<()>,
}

impl UnixChannelListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind with default handshake and frame configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_config(path, HandshakeConfig::default(), FrameConfig::default())
    }

    /// Bind with explicit configuration.
    ///
    /// If `path` already exists and is a socket, it is removed first (stale
    /// socket cleanup). Any other existing file is left alone and binding
    /// fails.
    pub fn bind_with_config(
        path: impl AsRef<Path>,
        handshake: HandshakeConfig,
        frame: FrameConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= MAX_PATH_LEN {
            return Err(FrameError::PathTooLong {
                path,
                len: path_bytes,
                max: MAX_PATH_LEN,
            });
        }

        let bind_error = |source: std::io::Error| FrameError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_error(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_error)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_error)?;
        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(bind_error)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_error)?;

        let (queue, accepted) = mpsc::unbounded_channel();
        let accept_loop = tokio::spawn(accept_loop(listener, handshake, frame, queue));

        info!(?path, "listening on unix domain socket");
        Ok(Self {
            created_inode: (created.dev(), created.ino()),
            path,
            accepted,
            accept_loop,
        })
    }

    /// Wait for the next client channel.
    pub async fn accept_channel(&mut self) -> Option<Channel> {
        self.accepted.recv().await
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChannelAcceptor for UnixChannelListener {
    fn accept(&mut self) -> impl Future<Output = Option<Channel>> + Send {
        self.accepted.recv()
    }
}

impl fmt::Debug for UnixChannelListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnixChannelListener")
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for UnixChannelListener {
    fn drop(&mut self) {
        self.accept_loop.abort();

        let (expected_dev, expected_ino) = self.created_inode;
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    handshake: HandshakeConfig,
    frame: FrameConfig,
    queue: mpsc::UnboundedSender<Channel>,
) {
    while !queue.is_closed() {
        let stream = match listener.accept().await {
            Ok((stream, _addr)) => stream,
            Err(err) => {
                warn!(error = %err, "accept failed");
                // Descriptor exhaustion persists until something closes.
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };
        debug!("accepted connection");

        let handshake = handshake.clone();
        let frame = frame.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut framed = Framed::new(stream, FrameCodec::with_config(frame));
            match handshake_server(&mut framed, &handshake).await {
                Ok(opened) => {
                    info!(channel = %opened.channel, "channel opened");
                    let _ = queue.send(bridge(framed, &opened.channel));
                }
                Err(err) => warn!(error = %err, "dropping connection after failed handshake"),
            }
        });
    }
}
