//! Live streaming engine between a video codec and a UDP socket.
//!
//! One sender serves one receiver. The sender compresses raw frames,
//! fragments each compressed frame into datagrams and retransmits
//! selectively, driven by per-fragment ACKs and an RTT estimate; after a
//! second of unacknowledged data it gives up and forces a key frame. The
//! receiver reassembles fragments, consumes frames in order and recovers
//! from gaps by skipping ahead to the newest complete key frame.
//!
//! The codec, the raw video source and the display surface enter through
//! the traits in [`codec`] and [`video`]; everything else lives here.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod reassembly;
pub mod receiver;
pub mod rtt;
pub mod sender;
pub mod stats;
pub mod time;
pub mod unacked;
pub mod video;
pub mod worker;

pub use codec::{EncodedFrame, VideoDecoder, VideoEncoder};
pub use error::{Error, Result};
pub use protocol::{AckMsg, ConfigMsg, DEFAULT_MTU, Datagram, FrameType, Msg};
pub use receiver::{LazyLevel, Receiver, run_receiver};
pub use sender::{Sender, SenderConfig, run_sender, wait_for_receiver};
pub use stats::StatsFile;
pub use video::{FrameSource, RawImage, VideoDisplay, Y4mInput};
pub use worker::WorkerInit;
