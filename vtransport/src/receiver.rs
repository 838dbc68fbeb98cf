//! Receiver engine: ingest datagrams, consume frames in order, recover by
//! skipping ahead to key frames.
//!
//! The network loop stays single-threaded: it receives, ACKs, reassembles
//! and consumes. Depending on the lazy level, consumption hands complete
//! frames to the decode worker or just accounts for them.

use log::{debug, info};
use tokio::net::UdpSocket;

use crate::error::{Error, Result};
use crate::protocol::{AckMsg, Datagram, Msg};
use crate::reassembly::FrameBuffer;
use crate::stats::StatsFile;
use crate::time::timestamp_us;
use crate::worker::{DecodeWorker, WorkerInit};

use std::time::{Duration, Instant};

/// How much work the receiver performs beyond the protocol itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyLevel {
    /// Decode and display frames.
    DecodeDisplay = 0,

    /// Decode but do not display frames.
    DecodeOnly = 1,

    /// Neither decode nor display; protocol and stats only.
    ProtocolOnly = 2,
}

impl TryFrom<u8> for LazyLevel {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Self::DecodeDisplay),
            1 => Ok(Self::DecodeOnly),
            2 => Ok(Self::ProtocolOnly),
            _ => Err(Error::InvalidLazyLevel(level)),
        }
    }
}

/// Receiver-side engine state.
pub struct Receiver {
    frame_buf: FrameBuffer,
    worker: Option<DecodeWorker>,

    /// Performance file, owned here only when no worker exists; otherwise
    /// the worker writes the decoded-frame records.
    output: Option<StatsFile>,

    // Periodic stats for decodable frames.
    num_decodable_frames: u32,
    total_decodable_frame_size: u64,
    last_stats_time: Instant,
}

impl Receiver {
    /// Creates the engine and, for lazy levels that decode, spawns the
    /// decode worker with `worker_init`.
    pub fn new(
        lazy_level: LazyLevel,
        worker_init: Option<WorkerInit>,
        output: Option<StatsFile>,
    ) -> Result<Self> {
        let (worker, output) = match lazy_level {
            LazyLevel::ProtocolOnly => (None, output),
            _ => {
                let init = worker_init.ok_or_else(|| {
                    Error::Codec("decoding requested but no decoder was provided".into())
                })?;
                (Some(DecodeWorker::spawn(init, output)?), None)
            }
        };

        Ok(Self {
            frame_buf: FrameBuffer::new(),
            worker,
            output,
            num_decodable_frames: 0,
            total_decodable_frame_size: 0,
            last_stats_time: Instant::now(),
        })
    }

    /// Lowest frame id not yet consumed.
    pub fn next_frame(&self) -> u32 {
        self.frame_buf.next_frame()
    }

    /// Ingests one datagram into the reassembly buffer.
    pub fn add_datagram(&mut self, datagram: Datagram) -> Result<()> {
        self.frame_buf.accept(datagram)
    }

    /// True if a frame is ready to consume, after any skip-ahead.
    pub fn next_frame_complete(&mut self) -> bool {
        self.frame_buf.next_frame_complete()
    }

    /// Consumes the frame under the cursor: account for it, then either
    /// hand it to the decode worker or record it as decodable.
    pub fn consume_next_frame(&mut self) -> Result<()> {
        let frame_id = self.frame_buf.next_frame();
        let frame = self.frame_buf.take_next()?;
        let frame_size = frame.frame_size().ok_or(Error::IncompleteFrame)?;

        self.num_decodable_frames += 1;
        self.total_decodable_frame_size += frame_size as u64;

        let stats_now = Instant::now();
        while stats_now >= self.last_stats_time + Duration::from_secs(1) {
            info!(
                "Decodable frames in the last ~1s: {}",
                self.num_decodable_frames
            );
            let diff_ms = (stats_now - self.last_stats_time).as_secs_f64() * 1000.0;
            if diff_ms > 0.0 {
                info!(
                    "  - Bitrate (kbps): {:.2}",
                    self.total_decodable_frame_size as f64 * 8.0 / diff_ms
                );
            }
            self.num_decodable_frames = 0;
            self.total_decodable_frame_size = 0;
            self.last_stats_time += Duration::from_secs(1);
        }

        match self.worker.as_ref() {
            Some(worker) => worker.push(frame),
            None => {
                if let Some(out) = self.output.as_mut() {
                    out.receiver_record(frame_id, frame_size, timestamp_us())?;
                }
            }
        }

        Ok(())
    }
}

/// Receiver loop over a connected UDP socket: receive, ACK, reassemble,
/// consume whatever became ready.
pub async fn run_receiver(sock: &UdpSocket, receiver: &mut Receiver) -> Result<()> {
    let mut buf = vec![0u8; 65536];
    loop {
        let len = match sock.recv(&mut buf).await {
            Ok(len) => len,
            // The sender may not be up yet; its absence is not fatal.
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => continue,
            Err(e) => return Err(e.into()),
        };

        let Some(datagram) = Datagram::parse(&buf[..len]) else {
            continue;
        };

        let ack = Msg::Ack(AckMsg {
            frame_id: datagram.frame_id,
            frag_id: datagram.frag_id,
            send_ts: datagram.send_ts,
        });
        sock.send(&ack.serialize()).await?;
        debug!(
            "Acked datagram: frame_id={} frag_id={}",
            datagram.frame_id, datagram.frag_id
        );

        receiver.add_datagram(datagram)?;

        while receiver.next_frame_complete() {
            receiver.consume_next_frame()?;
        }
    }
}
