//! Channel-boundary error type.

use thiserror::Error;

/// Errors raised while decoding inbound frames.
///
/// Handler-level failures never surface as this type; per the channel's
/// contract they are converted into reply events so the host process keeps
/// running.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The frame was not a valid message envelope.
    #[error("malformed channel frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope payload did not match the message's schema.
    #[error("invalid payload for {name}: {source}")]
    Payload {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}
