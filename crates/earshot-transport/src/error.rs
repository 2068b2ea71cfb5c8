/// Errors that can occur on the position channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel could not be established.
    #[error("connect to {url} failed: {source}")]
    ConnectFailed {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Closing the channel failed.
    #[error("close failed: {0}")]
    CloseFailed(#[source] std::io::Error),
}
