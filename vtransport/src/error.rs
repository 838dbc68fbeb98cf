//! Error types for the streaming engine.
//!
//! Protocol violations and codec failures are fatal for the peer that
//! observes them; transient socket conditions never surface here, they are
//! handled at the syscall boundary by the event loops.

use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the streaming engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MTU outside the supported range.
    #[error("reasonable MTU is between 512 and 1500 bytes, got {0}")]
    InvalidMtu(u16),

    /// Lazy level outside 0..=2.
    #[error("invalid lazy level: {0}")]
    InvalidLazyLevel(u8),

    /// Raw image dimensions disagree with the negotiated configuration.
    #[error("image dimensions don't match")]
    DimensionMismatch,

    /// A frame record cannot be created without fragments.
    #[error("frame cannot have zero fragments")]
    ZeroFragments,

    /// Datagram fields disagree with the frame record it belongs to.
    #[error("unable to insert an incompatible datagram")]
    IncompatibleDatagram,

    /// A datagram was registered twice as in flight.
    #[error("datagram already exists in unacked")]
    DuplicateUnacked,

    /// Attempted to consume a frame that is not complete.
    #[error("next frame must be complete before consuming it")]
    IncompleteFrame,

    /// Assembled frame does not fit the decoding buffer.
    #[error("frame size exceeds max decoding buffer size")]
    OversizedFrame,

    /// The encoder emitted more than one compressed frame in a single call.
    #[error("multiple frames were encoded at once")]
    MultipleFramesEncoded,

    /// The decoder emitted more than one picture in a single call.
    #[error("multiple frames were decoded at once")]
    MultipleFramesDecoded,

    /// Codec library returned a failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Raw video source is unusable or malformed.
    #[error("video input error: {0}")]
    VideoInput(String),

    /// Display surface failure.
    #[error("display error: {0}")]
    Display(String),
}
