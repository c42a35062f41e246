use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec::{kind_name, Frame, FrameCodec, CONTROL};
use crate::error::{FrameError, Result};

const MAX_PROTOCOL_LEN: usize = 32;
const MAX_VERSION_LEN: usize = 16;
const MAX_CHANNEL_NAME_LEN: usize = 256;

/// Client opening message, sent on `CONTROL`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hello {
    /// Protocol name. Must be `storesync` by default.
    pub protocol: String,
    /// Protocol version string.
    pub version: String,
    /// Channel the client wants to open.
    pub channel: String,
}

/// Server answer to [`Hello`], sent on `CONTROL`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Welcome {
    /// Protocol name. Must match the request protocol.
    pub protocol: String,
    /// Server protocol version.
    pub version: String,
    /// Channel accepted, echoed from the request.
    pub channel: String,
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResult {
    /// Channel carried by the connection.
    pub channel: String,
    /// Version announced by the other side.
    pub peer_version: String,
}

/// Configuration for the opening handshake.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Deadline for the whole exchange.
    pub timeout: Duration,
    /// Expected protocol name.
    pub protocol_name: String,
    /// Local protocol version.
    pub protocol_version: String,
    /// Maximum handshake frame payload size in bytes.
    pub max_handshake_payload: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            protocol_name: "storesync".to_string(),
            protocol_version: "1.0".to_string(),
            max_handshake_payload: 16 * 1024,
        }
    }
}

/// Open `channel` over a fresh connection.
///
/// The codec's payload limit is lowered to `max_handshake_payload` for the
/// exchange and restored afterwards.
pub async fn handshake_client<T>(
    framed: &mut Framed<T, FrameCodec>,
    channel: &str,
    config: &HandshakeConfig,
) -> Result<HandshakeResult>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    validate_protocol_name(&config.protocol_name)?;
    validate_version(&config.protocol_version)?;
    validate_channel_name(channel)?;

    let hello = Hello {
        protocol: config.protocol_name.clone(),
        version: config.protocol_version.clone(),
        channel: channel.to_string(),
    };

    let runtime_limit = replace_payload_limit(framed, config.max_handshake_payload);
    let exchange = async {
        framed.send(Frame::json(CONTROL, &hello)?).await?;
        recv_control::<_, Welcome>(framed).await
    };
    let welcome = within(config.timeout, exchange).await;
    replace_payload_limit(framed, runtime_limit);
    let welcome = welcome?;

    validate_protocol_name(&welcome.protocol)?;
    validate_version(&welcome.version)?;

    if welcome.protocol != config.protocol_name {
        return Err(FrameError::HandshakeFailed(format!(
            "unknown protocol '{}' (expected '{}')",
            welcome.protocol, config.protocol_name
        )));
    }

    if !is_version_compatible(&config.protocol_version, &welcome.version)? {
        return Err(FrameError::HandshakeFailed(format!(
            "incompatible version '{}' (local '{}')",
            welcome.version, config.protocol_version
        )));
    }

    if welcome.channel != channel {
        return Err(FrameError::HandshakeFailed(format!(
            "server accepted channel '{}' (requested '{}')",
            welcome.channel, channel
        )));
    }

    debug!(channel, version = %welcome.version, "client handshake complete");
    Ok(HandshakeResult {
        channel: welcome.channel,
        peer_version: welcome.version,
    })
}

/// Accept the channel a client opens on a fresh connection.
///
/// Any validation failure is returned without answering; the caller closes
/// the connection.
pub async fn handshake_server<T>(
    framed: &mut Framed<T, FrameCodec>,
    config: &HandshakeConfig,
) -> Result<HandshakeResult>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    validate_protocol_name(&config.protocol_name)?;
    validate_version(&config.protocol_version)?;

    let runtime_limit = replace_payload_limit(framed, config.max_handshake_payload);
    let exchange = async {
        let hello: Hello = recv_control(framed).await?;

        validate_protocol_name(&hello.protocol)?;
        validate_version(&hello.version)?;
        validate_channel_name(&hello.channel)?;

        if hello.protocol != config.protocol_name {
            return Err(FrameError::HandshakeFailed(format!(
                "unknown protocol '{}' (expected '{}')",
                hello.protocol, config.protocol_name
            )));
        }

        if !is_version_compatible(&hello.version, &config.protocol_version)? {
            return Err(FrameError::HandshakeFailed(format!(
                "incompatible version '{}' (server '{}')",
                hello.version, config.protocol_version
            )));
        }

        let welcome = Welcome {
            protocol: config.protocol_name.clone(),
            version: config.protocol_version.clone(),
            channel: hello.channel.clone(),
        };
        framed.send(Frame::json(CONTROL, &welcome)?).await?;
        Ok(hello)
    };
    let hello = within(config.timeout, exchange).await;
    replace_payload_limit(framed, runtime_limit);
    let hello = hello?;

    debug!(channel = %hello.channel, version = %hello.version, "server handshake complete");
    Ok(HandshakeResult {
        channel: hello.channel,
        peer_version: hello.version,
    })
}

/// Set the codec's payload limit, returning the previous one.
fn replace_payload_limit<T>(framed: &mut Framed<T, FrameCodec>, limit: usize) -> usize {
    let previous = framed.codec().config().max_payload_size;
    framed.codec_mut().set_max_payload_size(limit);
    previous
}

async fn within<R>(timeout: Duration, exchange: impl Future<Output = Result<R>>) -> Result<R> {
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| FrameError::Timeout(timeout))?
}

async fn recv_control<T, M>(framed: &mut Framed<T, FrameCodec>) -> Result<M>
where
    T: AsyncRead + AsyncWrite + Unpin,
    M: DeserializeOwned,
{
    let frame = match framed.next().await {
        Some(frame) => frame?,
        None => return Err(FrameError::ConnectionClosed),
    };

    if frame.kind != CONTROL {
        return Err(FrameError::HandshakeFailed(format!(
            "expected {} frame, got {}",
            kind_name(CONTROL),
            kind_name(frame.kind)
        )));
    }

    Ok(serde_json::from_slice(&frame.payload)?)
}

fn validate_protocol_name(protocol: &str) -> Result<()> {
    if protocol.is_empty() || protocol.len() > MAX_PROTOCOL_LEN {
        return Err(FrameError::HandshakeFailed(format!(
            "invalid protocol name length: {}",
            protocol.len()
        )));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(FrameError::HandshakeFailed(format!(
            "invalid protocol version length: {}",
            version.len()
        )));
    }
    parse_version(version).map(|_| ())
}

fn validate_channel_name(channel: &str) -> Result<()> {
    if channel.is_empty() || channel.len() > MAX_CHANNEL_NAME_LEN {
        return Err(FrameError::HandshakeFailed(format!(
            "invalid channel name length: {}",
            channel.len()
        )));
    }
    Ok(())
}

fn is_version_compatible(client_version: &str, server_version: &str) -> Result<bool> {
    let (client_major, client_minor) = parse_version(client_version)?;
    let (server_major, server_minor) = parse_version(server_version)?;

    Ok(client_major == server_major && client_minor >= server_minor)
}

fn parse_version(version: &str) -> Result<(u16, u16)> {
    let invalid = |reason: &str| {
        FrameError::HandshakeFailed(format!("invalid version '{version}': {reason}"))
    };

    let mut parts = version.split('.');
    let major = parts.next().ok_or_else(|| invalid("missing major"))?;
    let minor = parts.next().ok_or_else(|| invalid("missing minor"))?;
    if parts.next().is_some() {
        return Err(invalid("expected '<major>.<minor>'"));
    }

    let major = major
        .parse::<u16>()
        .map_err(|_| invalid("non-numeric major"))?;
    let minor = minor
        .parse::<u16>()
        .map_err(|_| invalid("non-numeric minor"))?;

    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, DuplexStream};

    use super::*;
    use crate::codec::{FrameConfig, MESSAGE};

    fn framed_pair() -> (Framed<DuplexStream, FrameCodec>, Framed<DuplexStream, FrameCodec>) {
        let (left, right) = duplex(64 * 1024);
        (
            Framed::new(left, FrameCodec::new()),
            Framed::new(right, FrameCodec::new()),
        )
    }

    #[tokio::test]
    async fn successful_handshake() {
        let (mut client, mut server) = framed_pair();
        let config = HandshakeConfig::default();

        let server_config = config.clone();
        let server_task =
            tokio::spawn(async move { handshake_server(&mut server, &server_config).await });

        let client_result = handshake_client(&mut client, "storeClient:foo", &config)
            .await
            .expect("client handshake should succeed");
        let server_result = server_task
            .await
            .expect("server task should not panic")
            .expect("server handshake should succeed");

        assert_eq!(client_result.channel, "storeClient:foo");
        assert_eq!(client_result.peer_version, "1.0");
        assert_eq!(server_result.channel, "storeClient:foo");
        assert_eq!(server_result.peer_version, "1.0");
    }

    #[tokio::test]
    async fn payload_limit_restored_after_handshake() {
        let (mut client, mut server) = framed_pair();
        client.codec_mut().set_max_payload_size(1024 * 1024);

        let server_task = tokio::spawn(async move {
            handshake_server(&mut server, &HandshakeConfig::default()).await
        });
        handshake_client(&mut client, "storeClient:a", &HandshakeConfig::default())
            .await
            .expect("handshake should succeed");
        server_task.await.unwrap().unwrap();

        assert_eq!(client.codec().config().max_payload_size, 1024 * 1024);
    }

    #[tokio::test]
    async fn protocol_mismatch_rejected_by_server() {
        let (mut client, mut server) = framed_pair();
        let server_task = tokio::spawn(async move {
            handshake_server(&mut server, &HandshakeConfig::default()).await
        });

        let client_config = HandshakeConfig {
            protocol_name: "otherproto".to_string(),
            timeout: Duration::from_millis(500),
            ..HandshakeConfig::default()
        };
        let client_result = handshake_client(&mut client, "storeClient:a", &client_config).await;
        let server_result = server_task.await.unwrap();

        assert!(matches!(server_result, Err(FrameError::HandshakeFailed(ref msg)) if msg.contains("unknown protocol")));
        assert!(client_result.is_err());
    }

    #[tokio::test]
    async fn older_client_minor_is_incompatible() {
        let (mut client, mut server) = framed_pair();
        let server_task = tokio::spawn(async move {
            let config = HandshakeConfig {
                protocol_version: "1.2".to_string(),
                ..HandshakeConfig::default()
            };
            handshake_server(&mut server, &config).await
        });

        let client_config = HandshakeConfig {
            protocol_version: "1.1".to_string(),
            timeout: Duration::from_millis(500),
            ..HandshakeConfig::default()
        };
        let _ = handshake_client(&mut client, "storeClient:a", &client_config).await;

        assert!(matches!(
            server_task.await.unwrap(),
            Err(FrameError::HandshakeFailed(ref msg)) if msg.contains("incompatible version")
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let (mut client, _server) = framed_pair();
        let config = HandshakeConfig {
            timeout: Duration::from_millis(50),
            ..HandshakeConfig::default()
        };

        let result = handshake_client(&mut client, "storeClient:a", &config).await;
        assert!(matches!(result, Err(FrameError::Timeout(_))));
    }

    #[tokio::test]
    async fn closed_connection_during_handshake() {
        let (mut client, server) = framed_pair();
        drop(server);

        let result = handshake_server(&mut client, &HandshakeConfig::default()).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn message_frame_before_handshake_rejected() {
        let (mut client, mut server) = framed_pair();
        client
            .send(Frame::new(MESSAGE, &b"{}"[..]))
            .await
            .unwrap();

        let result = handshake_server(&mut server, &HandshakeConfig::default()).await;
        assert!(matches!(result, Err(FrameError::HandshakeFailed(ref msg)) if msg.contains("MESSAGE")));
    }

    #[tokio::test]
    async fn oversized_hello_rejected() {
        let (left, right) = duplex(64 * 1024);
        let mut client = Framed::new(
            left,
            FrameCodec::with_config(FrameConfig {
                max_payload_size: 64 * 1024,
            }),
        );
        let mut server = Framed::new(right, FrameCodec::new());
        client
            .send(Frame::new(CONTROL, vec![b' '; 32 * 1024]))
            .await
            .unwrap();

        let result = handshake_server(&mut server, &HandshakeConfig::default()).await;
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn invalid_channel_name_rejected_locally() {
        let (mut client, _server) = framed_pair();
        let result = handshake_client(&mut client, "", &HandshakeConfig::default()).await;
        assert!(matches!(result, Err(FrameError::HandshakeFailed(_))));

        let long = "x".repeat(MAX_CHANNEL_NAME_LEN + 1);
        let result = handshake_client(&mut client, &long, &HandshakeConfig::default()).await;
        assert!(matches!(result, Err(FrameError::HandshakeFailed(_))));
    }

    #[test]
    fn version_parsing_and_compatibility() {
        assert_eq!(parse_version("1.0").unwrap(), (1, 0));
        assert!(parse_version("1").is_err());
        assert!(parse_version("1.0.0").is_err());
        assert!(parse_version("a.b").is_err());

        assert!(is_version_compatible("1.0", "1.0").unwrap());
        assert!(is_version_compatible("1.3", "1.1").unwrap());
        assert!(!is_version_compatible("1.0", "1.1").unwrap());
        assert!(!is_version_compatible("2.0", "1.0").unwrap());
    }
}
