//! Channel naming convention.
//!
//! Protocol channels are named `storeClient:<clientName>`. Hosts share the
//! connection namespace with unrelated traffic and use the prefix to pick
//! out store clients.

/// Prefix carried by every store client channel name.
pub const STORE_CLIENT_PREFIX: &str = "storeClient:";

/// Client name used when the caller does not supply one.
pub const DEFAULT_CLIENT_NAME: &str = "default";

/// Build the channel name for a client.
pub fn client_channel_name(client: &str) -> String {
    format!("{STORE_CLIENT_PREFIX}{client}")
}

/// Returns true if the channel name belongs to the store protocol.
pub fn is_client_channel(channel: &str) -> bool {
    channel.starts_with(STORE_CLIENT_PREFIX)
}

/// Extract the client name from a protocol channel name.
pub fn client_name(channel: &str) -> Option<&str> {
    channel.strip_prefix(STORE_CLIENT_PREFIX)
}
