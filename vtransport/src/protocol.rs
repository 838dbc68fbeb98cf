//! Wire format shared by the sender and the receiver.
//!
//! Both directions run on a single UDP flow. Video goes sender to receiver
//! as [`Datagram`]s; control traffic ([`AckMsg`], [`ConfigMsg`]) is wrapped
//! in a one-byte-tagged [`Msg`]. All integers are big-endian.
//!
//! # Datagram Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Frame ID                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Frame Type   |          Fragment ID          |  Fragment ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   ... Count     |                   Send Timestamp (us) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!                         ... (8 bytes total)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Payload...                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Datagram header size in bytes.
pub const DATAGRAM_HEADER_SIZE: usize = 17;

/// Default MTU used when the sender is not configured otherwise.
pub const DEFAULT_MTU: u16 = 1500;

/// IPv4 header plus UDP header.
const IP_UDP_OVERHEAD: usize = 28;

/// Identifies a fragment in flight: `(frame_id, frag_id)`.
pub type SeqNum = (u32, u16);

/// Whether a fragment belongs to a key frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Placeholder before the real type is known.
    Unknown = 0,

    /// Independently decodable frame (I-frame).
    Key = 1,

    /// Frame that depends on earlier frames.
    NonKey = 2,
}

impl FrameType {
    /// Converts a byte to a FrameType.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Key),
            2 => Some(Self::NonKey),
            _ => None,
        }
    }
}

/// Computes the maximum UDP payload usable for fragment data under `mtu`.
///
/// MTUs outside 512..=1500 fail with a configuration error.
pub fn max_payload(mtu: u16) -> Result<usize> {
    if !(512..=1500).contains(&mtu) {
        return Err(Error::InvalidMtu(mtu));
    }
    Ok(mtu as usize - IP_UDP_OVERHEAD - DATAGRAM_HEADER_SIZE)
}

/// One fragment of a compressed video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Source frame, monotonically increasing from 0.
    pub frame_id: u32,

    /// Type of the frame this fragment belongs to.
    pub frame_type: FrameType,

    /// Fragment index within the frame.
    pub frag_id: u16,

    /// Total fragments in the frame, at least 1.
    pub frag_cnt: u16,

    /// Microseconds since epoch of the most recent transmission.
    pub send_ts: u64,

    /// Compressed-frame fragment bytes.
    pub payload: Bytes,
}

impl Datagram {
    /// Returns the `(frame_id, frag_id)` pair identifying this fragment.
    pub fn seq_num(&self) -> SeqNum {
        (self.frame_id, self.frag_id)
    }

    /// Parses a datagram from a received UDP payload.
    ///
    /// Returns `None` if the buffer is too small to contain a header or the
    /// frame type byte is unknown.
    pub fn parse(mut bin: &[u8]) -> Option<Self> {
        if bin.len() < DATAGRAM_HEADER_SIZE {
            return None;
        }

        let frame_id = bin.get_u32();
        let frame_type = FrameType::from_u8(bin.get_u8())?;
        let frag_id = bin.get_u16();
        let frag_cnt = bin.get_u16();
        let send_ts = bin.get_u64();

        Some(Self {
            frame_id,
            frame_type,
            frag_id,
            frag_cnt,
            send_ts,
            payload: Bytes::copy_from_slice(bin),
        })
    }

    /// Serializes the datagram into a single wire buffer.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DATAGRAM_HEADER_SIZE + self.payload.len());
        buf.put_u32(self.frame_id);
        buf.put_u8(self.frame_type as u8);
        buf.put_u16(self.frag_id);
        buf.put_u16(self.frag_cnt);
        buf.put_u64(self.send_ts);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }
}

/// Tags prefixing every control message.
const TAG_ACK: u8 = 1;
const TAG_CONFIG: u8 = 2;

/// Acknowledgment for a single fragment, echoing its send timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMsg {
    pub frame_id: u32,
    pub frag_id: u16,

    /// `send_ts` copied from the datagram being acknowledged.
    pub send_ts: u64,
}

/// Session configuration, sent by the receiver exactly once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigMsg {
    pub width: u16,
    pub height: u16,
    pub frame_rate: u16,

    /// Target bitrate in kbps; 0 leaves the encoder default in place.
    pub target_bitrate: u32,
}

/// A control message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg {
    Ack(AckMsg),
    Config(ConfigMsg),
}

impl Msg {
    /// Parses a control message.
    ///
    /// Returns `None` for an empty buffer, an unrecognized tag, or a
    /// truncated body, so callers can ignore stray traffic.
    pub fn parse(mut bin: &[u8]) -> Option<Self> {
        if bin.is_empty() {
            return None;
        }

        match bin.get_u8() {
            TAG_ACK => {
                if bin.remaining() < 4 + 2 + 8 {
                    return None;
                }
                Some(Msg::Ack(AckMsg {
                    frame_id: bin.get_u32(),
                    frag_id: bin.get_u16(),
                    send_ts: bin.get_u64(),
                }))
            }
            TAG_CONFIG => {
                if bin.remaining() < 2 + 2 + 2 + 4 {
                    return None;
                }
                Some(Msg::Config(ConfigMsg {
                    width: bin.get_u16(),
                    height: bin.get_u16(),
                    frame_rate: bin.get_u16(),
                    target_bitrate: bin.get_u32(),
                }))
            }
            _ => None,
        }
    }

    /// Serializes the control message, tag byte first.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(15);
        match self {
            Msg::Ack(ack) => {
                buf.put_u8(TAG_ACK);
                buf.put_u32(ack.frame_id);
                buf.put_u16(ack.frag_id);
                buf.put_u64(ack.send_ts);
            }
            Msg::Config(config) => {
                buf.put_u8(TAG_CONFIG);
                buf.put_u16(config.width);
                buf.put_u16(config.height);
                buf.put_u16(config.frame_rate);
                buf.put_u32(config.target_bitrate);
            }
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_roundtrip() {
        let datagram = Datagram {
            frame_id: 7,
            frame_type: FrameType::Key,
            frag_id: 3,
            frag_cnt: 9,
            send_ts: 1_234_567_890_123,
            payload: Bytes::from_static(b"compressed bits"),
        };

        let wire = datagram.serialize();
        assert_eq!(wire.len(), DATAGRAM_HEADER_SIZE + 15);

        let parsed = Datagram::parse(&wire).unwrap();
        assert_eq!(parsed, datagram);
    }

    #[test]
    fn datagram_header_layout() {
        let datagram = Datagram {
            frame_id: 0x01020304,
            frame_type: FrameType::NonKey,
            frag_id: 0x0506,
            frag_cnt: 0x0708,
            send_ts: 0x090A0B0C0D0E0F10,
            payload: Bytes::from_static(&[0xAA]),
        };

        let wire = datagram.serialize();
        assert_eq!(
            &wire[..],
            &[
                0x01, 0x02, 0x03, 0x04, // frame_id
                0x02, // frame_type
                0x05, 0x06, // frag_id
                0x07, 0x08, // frag_cnt
                0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, // send_ts
                0xAA, // payload
            ]
        );
    }

    #[test]
    fn datagram_too_small_is_rejected() {
        assert!(Datagram::parse(&[0u8; DATAGRAM_HEADER_SIZE - 1]).is_none());
        assert!(Datagram::parse(&[]).is_none());
    }

    #[test]
    fn datagram_empty_payload() {
        let datagram = Datagram {
            frame_id: 0,
            frame_type: FrameType::Key,
            frag_id: 0,
            frag_cnt: 1,
            send_ts: 0,
            payload: Bytes::new(),
        };

        let parsed = Datagram::parse(&datagram.serialize()).unwrap();
        assert!(parsed.payload.is_empty());
        assert_eq!(parsed, datagram);
    }

    #[test]
    fn datagram_unknown_frame_type_is_rejected() {
        let mut wire = Datagram {
            frame_id: 0,
            frame_type: FrameType::Key,
            frag_id: 0,
            frag_cnt: 1,
            send_ts: 0,
            payload: Bytes::new(),
        }
        .serialize()
        .to_vec();
        wire[4] = 3;

        assert!(Datagram::parse(&wire).is_none());
    }

    #[test]
    fn ack_roundtrip() {
        let msg = Msg::Ack(AckMsg {
            frame_id: 42,
            frag_id: 5,
            send_ts: 99_999,
        });

        let wire = msg.serialize();
        assert_eq!(wire.len(), 15);
        assert_eq!(wire[0], TAG_ACK);
        assert_eq!(Msg::parse(&wire), Some(msg));
    }

    #[test]
    fn config_roundtrip() {
        let msg = Msg::Config(ConfigMsg {
            width: 1280,
            height: 720,
            frame_rate: 30,
            target_bitrate: 2000,
        });

        let wire = msg.serialize();
        assert_eq!(wire.len(), 11);
        assert_eq!(wire[0], TAG_CONFIG);
        assert_eq!(Msg::parse(&wire), Some(msg));
    }

    #[test]
    fn invalid_msgs_are_rejected() {
        assert!(Msg::parse(&[]).is_none());
        assert!(Msg::parse(&[0]).is_none()); // invalid tag
        assert!(Msg::parse(&[9, 1, 2, 3]).is_none()); // unknown tag
        assert!(Msg::parse(&[TAG_ACK, 1, 2, 3]).is_none()); // truncated ack
        assert!(Msg::parse(&[TAG_CONFIG, 1]).is_none()); // truncated config
    }

    #[test]
    fn max_payload_follows_mtu() {
        assert_eq!(max_payload(1500).unwrap(), 1455);
        assert_eq!(max_payload(512).unwrap(), 467);
        assert!(matches!(max_payload(511), Err(Error::InvalidMtu(511))));
        assert!(matches!(max_payload(1501), Err(Error::InvalidMtu(1501))));
        assert!(matches!(max_payload(0), Err(Error::InvalidMtu(0))));
    }
}
