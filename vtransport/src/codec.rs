//! Contract the engine consumes from the video codec library.
//!
//! The engine never touches codec internals; it reads exactly one
//! compressed frame per encode call and at most one picture per decode
//! call. Implementations that observe more must fail with the matching
//! protocol error.

use bytes::Bytes;

use crate::error::Result;
use crate::video::RawImage;

/// One compressed frame as produced by the encoder.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Bytes,

    /// True for an independently decodable frame (I-frame).
    pub is_key: bool,
}

/// Video encoder handle.
pub trait VideoEncoder {
    /// Compresses `image` into frame `frame_id`.
    ///
    /// With `force_keyframe` set, the emitted frame must be a key frame.
    fn encode(&mut self, image: &RawImage, frame_id: u32, force_keyframe: bool)
    -> Result<EncodedFrame>;

    /// Reconfigures the target bitrate in kbps.
    fn set_target_bitrate(&mut self, bitrate_kbps: u32) -> Result<()>;
}

/// Video decoder handle.
pub trait VideoDecoder {
    /// Decodes one compressed frame, yielding zero or one picture.
    fn decode(&mut self, data: &[u8]) -> Result<Option<RawImage>>;
}
