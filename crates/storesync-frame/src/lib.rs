//! Stream transport for storesync channels.
//!
//! Every connection carries exactly one protocol channel. Bytes on the wire
//! are framed with:
//! - A 2-byte magic number ("SS") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 2-byte little-endian frame kind (`CONTROL` or `MESSAGE`)
//!
//! A connection opens with a `CONTROL` handshake naming the channel; after
//! that every protocol message travels as JSON in a `MESSAGE` frame.

pub mod codec;
pub mod error;
pub mod handshake;
#[cfg(unix)]
pub mod stream;

pub use codec::{
    decode_frame, encode_frame, kind_name, Frame, FrameCodec, FrameConfig, CONTROL,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC, MESSAGE,
};
pub use error::{FrameError, Result};
pub use handshake::{
    handshake_client, handshake_server, HandshakeConfig, HandshakeResult, Hello, Welcome,
};
#[cfg(unix)]
pub use stream::{bridge, UnixChannelListener, UnixConnector};
