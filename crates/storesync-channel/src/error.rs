/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The other end of the channel is gone.
    #[error("channel {0} is closed")]
    Closed(String),

    /// The runtime could not create the channel.
    #[error("failed to open channel {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl ChannelError {
    /// Wrap a runtime failure to open the named channel.
    pub fn open(
        name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::Open {
            name: name.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
