//! Sender engine: packetize, send, retransmit.
//!
//! [`Sender`] is pure state — the send queue, the unacked table and the
//! RTT estimator — with no sockets or timers of its own; [`run_sender`]
//! drives it from a single-threaded event loop multiplexing the frame-rate
//! ticker, the stats ticker and UDP socket readiness.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::time::Duration;

use crate::codec::{EncodedFrame, VideoEncoder};
use crate::error::{Error, Result};
use crate::protocol::{AckMsg, ConfigMsg, Datagram, FrameType, Msg, SeqNum, max_payload};
use crate::rtt::RttEstimator;
use crate::stats::StatsFile;
use crate::time::{FrameTicker, timestamp_us};
use crate::unacked::UnackedMap;
use crate::video::{FrameSource, RawImage};

/// A fragment is never retransmitted more than this many times.
pub const MAX_NUM_RTX: u32 = 3;

/// Give up on repair once the oldest unacked fragment is this old (us).
pub const MAX_UNACKED_US: u64 = 1_000_000;

/// Session parameters fixed once the receiver's CONFIG arrives.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub width: u16,
    pub height: u16,
    pub frame_rate: u16,
    pub target_bitrate: u32,
    pub mtu: u16,
}

/// Entry in the send queue.
///
/// A fresh datagram is owned by the queue until its first transmission
/// moves it into the unacked table; a retransmission is only a handle back
/// into the table, so the record is never duplicated.
#[derive(Debug)]
enum QueueEntry {
    Fresh(Datagram),
    Rtx(SeqNum),
}

/// Sender-side engine state.
pub struct Sender {
    config: SenderConfig,
    max_payload: usize,

    /// Frame id to encode next.
    frame_id: u32,

    /// Datagrams waiting for the socket to become writable.
    /// Retransmissions go to the front, fresh packets to the back.
    send_buf: VecDeque<QueueEntry>,

    /// In-flight fragments in first-send order.
    unacked: UnackedMap,

    rtt: RttEstimator,
    output: Option<StatsFile>,

    // Periodic stats, reset every reporting interval.
    num_encoded_frames: u32,
    total_encode_time_ms: f64,
    max_encode_time_ms: f64,
}

impl Sender {
    pub fn new(config: SenderConfig, output: Option<StatsFile>) -> Result<Self> {
        let max_payload = max_payload(config.mtu)?;
        Ok(Self {
            config,
            max_payload,
            frame_id: 0,
            send_buf: VecDeque::new(),
            unacked: UnackedMap::new(),
            rtt: RttEstimator::new(),
            output,
            num_encoded_frames: 0,
            total_encode_time_ms: 0.0,
            max_encode_time_ms: 0.0,
        })
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// True while datagrams wait for the socket to become writable.
    pub fn has_pending(&self) -> bool {
        !self.send_buf.is_empty()
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    /// Compresses one raw frame and queues its fragments for sending.
    pub fn compress_frame<E: VideoEncoder>(
        &mut self,
        encoder: &mut E,
        image: &RawImage,
    ) -> Result<()> {
        let frame_generation_ts = timestamp_us();

        if image.width() != self.config.width || image.height() != self.config.height {
            return Err(Error::DimensionMismatch);
        }

        let force_keyframe = self.check_keyframe_force(frame_generation_ts);

        let encode_start = Instant::now();
        let encoded = encoder.encode(image, self.frame_id, force_keyframe)?;
        let encode_time_ms = encode_start.elapsed().as_secs_f64() * 1000.0;

        self.num_encoded_frames += 1;
        self.total_encode_time_ms += encode_time_ms;
        self.max_encode_time_ms = self.max_encode_time_ms.max(encode_time_ms);

        let frame_size = self.packetize(&encoded)?;

        if let Some(out) = self.output.as_mut() {
            let frame_encoded_ts = timestamp_us();
            out.sender_record(
                self.frame_id,
                self.config.target_bitrate,
                frame_size,
                frame_generation_ts,
                frame_encoded_ts,
            )?;
        }

        self.frame_id += 1;
        Ok(())
    }

    /// Decides whether the next frame must be a key frame.
    ///
    /// Once the oldest unacked fragment has gone unacknowledged past the
    /// threshold, retransmissions are abandoned wholesale: the send queue
    /// and the unacked table are cleared, and the encoder is asked for an
    /// I-frame the receiver can latch onto.
    fn check_keyframe_force(&mut self, now: u64) -> bool {
        let Some(first_unacked) = self.unacked.first() else {
            return false;
        };

        let us_since_first_send = now.saturating_sub(first_unacked.datagram.send_ts);
        if us_since_first_send <= MAX_UNACKED_US {
            return false;
        }

        info!(
            "* Recovery: gave up retransmissions and forced a key frame {}",
            self.frame_id
        );
        debug!(
            "Giving up on lost datagram: frame_id={} frag_id={} rtx={} us_since_first_send={}",
            first_unacked.datagram.frame_id,
            first_unacked.datagram.frag_id,
            first_unacked.num_rtx,
            us_since_first_send
        );

        self.send_buf.clear();
        self.unacked.clear();
        true
    }

    /// Splits a compressed frame into datagrams appended to the send queue.
    ///
    /// Returns the compressed frame size. The fragment count is
    /// `size / (max_payload + 1) + 1`, which yields one fragment even for
    /// an empty frame.
    fn packetize(&mut self, frame: &EncodedFrame) -> Result<usize> {
        let frame_size = frame.data.len();
        let frame_type = if frame.is_key {
            debug!("Encoded a key frame: frame_id={}", self.frame_id);
            FrameType::Key
        } else {
            FrameType::NonKey
        };

        let frag_cnt = frame_size / (self.max_payload + 1) + 1;
        if frag_cnt > usize::from(u16::MAX) {
            return Err(Error::OversizedFrame);
        }

        for frag_id in 0..frag_cnt as u16 {
            let start = usize::from(frag_id) * self.max_payload;
            let end = (start + self.max_payload).min(frame_size);
            self.send_buf.push_back(QueueEntry::Fresh(Datagram {
                frame_id: self.frame_id,
                frame_type,
                frag_id,
                frag_cnt: frag_cnt as u16,
                send_ts: 0,
                payload: frame.data.slice(start..end),
            }));
        }

        Ok(frame_size)
    }

    /// Stamps the head of the send queue with `now` and returns its wire
    /// form, or `None` when nothing is left to send.
    ///
    /// The entry stays queued until [`Sender::mark_sent`] or
    /// [`Sender::mark_blocked`] settles the outcome. Retransmissions whose
    /// record was acked while they waited in the queue are dropped here.
    pub fn next_datagram(&mut self, now: u64) -> Option<Bytes> {
        loop {
            let seq = match self.send_buf.front_mut()? {
                QueueEntry::Fresh(datagram) => {
                    datagram.send_ts = now;
                    return Some(datagram.serialize());
                }
                QueueEntry::Rtx(seq) => *seq,
            };

            match self.unacked.get_mut(&seq) {
                Some(pending) => {
                    pending.datagram.send_ts = now;
                    return Some(pending.datagram.serialize());
                }
                None => {
                    self.send_buf.pop_front();
                }
            }
        }
    }

    /// Settles the head entry after a successful send: a first transmission
    /// moves into the unacked table, a retransmission already lives there.
    pub fn mark_sent(&mut self) -> Result<()> {
        match self.send_buf.pop_front() {
            Some(QueueEntry::Fresh(datagram)) => {
                debug!(
                    "Sent datagram: frame_id={} frag_id={} frag_cnt={} rtx=0",
                    datagram.frame_id, datagram.frag_id, datagram.frag_cnt
                );
                self.unacked.insert(datagram)
            }
            Some(QueueEntry::Rtx(seq)) => {
                if let Some(pending) = self.unacked.get(&seq) {
                    debug!(
                        "Sent datagram: frame_id={} frag_id={} frag_cnt={} rtx={}",
                        seq.0, seq.1, pending.datagram.frag_cnt, pending.num_rtx
                    );
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Rolls back the head entry's timestamp after a would-block send; the
    /// datagram was not sent.
    pub fn mark_blocked(&mut self) {
        match self.send_buf.front_mut() {
            Some(QueueEntry::Fresh(datagram)) => datagram.send_ts = 0,
            Some(QueueEntry::Rtx(seq)) => {
                let seq = *seq;
                if let Some(pending) = self.unacked.get_mut(&seq) {
                    pending.datagram.send_ts = 0;
                }
            }
            None => {}
        }
    }

    /// Processes one ACK: RTT sample, selective fast retransmit of
    /// earlier-sent fragments, and removal of the acked record.
    ///
    /// Returns true if retransmissions were queued, so the caller can
    /// re-arm writable interest.
    pub fn handle_ack(&mut self, ack: &AckMsg, curr_ts: u64) -> bool {
        self.rtt.add_sample(curr_ts.saturating_sub(ack.send_ts));

        let acked_seq_num = (ack.frame_id, ack.frag_id);
        if !self.unacked.contains(&acked_seq_num) {
            return false;
        }

        // Walk backwards over fragments sent earlier than the acked one:
        // the ACK implies they are likely lost. Cap each at MAX_NUM_RTX and
        // pace repeats roughly one smoothed RTT apart.
        let mut to_rtx: Vec<SeqNum> = Vec::new();
        for (seq, pending) in self.unacked.iter_earlier(&acked_seq_num) {
            if pending.num_rtx >= MAX_NUM_RTX {
                continue;
            }
            let overdue = self
                .rtt
                .ewma_us()
                .is_some_and(|ewma| curr_ts.saturating_sub(pending.last_send_ts) as f64 > ewma);
            if pending.num_rtx == 0 || overdue {
                to_rtx.push(seq);
            }
        }

        for seq in &to_rtx {
            if let Some(pending) = self.unacked.get_mut(seq) {
                pending.num_rtx += 1;
                pending.last_send_ts = curr_ts;
            }
        }
        // Retransmissions are more urgent than fresh datagrams; pushing in
        // reverse walk order leaves the most recently sent one at the very
        // front of the queue.
        for seq in to_rtx.iter().rev() {
            self.send_buf.push_front(QueueEntry::Rtx(*seq));
        }

        self.unacked.remove(&acked_seq_num);
        !to_rtx.is_empty()
    }

    /// Logs and resets the per-second stats. RTT state persists.
    pub fn output_periodic_stats(&mut self) {
        info!(
            "Frames encoded in the last ~1s: {}",
            self.num_encoded_frames
        );
        if self.num_encoded_frames > 0 {
            info!(
                "  - Avg/Max encoding time (ms): {:.2}/{:.2}",
                self.total_encode_time_ms / f64::from(self.num_encoded_frames),
                self.max_encode_time_ms
            );
        }
        if let (Some(min), Some(ewma)) = (self.rtt.min_us(), self.rtt.ewma_us()) {
            info!(
                "  - Min/EWMA RTT (ms): {:.2}/{:.2}",
                min as f64 / 1000.0,
                ewma / 1000.0
            );
        }

        self.num_encoded_frames = 0;
        self.total_encode_time_ms = 0.0;
        self.max_encode_time_ms = 0.0;
    }
}

/// Blocks until a datagram parses as CONFIG, returning it with its origin.
///
/// The caller is expected to `connect` the socket to the returned address.
pub async fn wait_for_receiver(sock: &UdpSocket) -> Result<(SocketAddr, ConfigMsg)> {
    let mut buf = vec![0u8; 65536];
    loop {
        let (len, peer_addr) = sock.recv_from(&mut buf).await?;
        if let Some(Msg::Config(config)) = Msg::parse(&buf[..len]) {
            return Ok((peer_addr, config));
        }
    }
}

/// Sender event loop over a connected, non-blocking UDP socket.
///
/// Multiplexes the frame-rate ticker (encode and packetize), socket
/// readability (ACKs) and socket writability (drain the send queue, armed
/// only while the queue is non-empty), plus a 1 Hz stats ticker.
pub async fn run_sender<S, E>(
    sock: UdpSocket,
    mut source: S,
    mut encoder: E,
    mut sender: Sender,
) -> Result<()>
where
    S: FrameSource,
    E: VideoEncoder,
{
    let mut raw_img = RawImage::new(sender.config().width, sender.config().height);
    let mut ticker = FrameTicker::new(sender.config().frame_rate);
    let mut stats_timer = tokio::time::interval_at(
        tokio::time::Instant::now() + Duration::from_secs(1),
        Duration::from_secs(1),
    );
    let mut recv_buf = vec![0u8; 65536];

    loop {
        tokio::select! {
            num_exp = ticker.tick() => {
                // Being lenient: catch up on missed intervals and encode
                // only the most recent raw frame.
                if num_exp > 1 {
                    warn!("skipping {} raw frames", num_exp - 1);
                }
                for _ in 0..num_exp {
                    source.read_frame(&mut raw_img)?;
                }
                sender.compress_frame(&mut encoder, &raw_img)?;
            }

            _ = stats_timer.tick() => {
                sender.output_periodic_stats();
            }

            ready = sock.readable() => {
                ready?;
                loop {
                    match sock.try_recv(&mut recv_buf) {
                        Ok(len) => {
                            let Some(Msg::Ack(ack)) = Msg::parse(&recv_buf[..len]) else {
                                continue;
                            };
                            debug!("Received ACK: frame_id={} frag_id={}", ack.frame_id, ack.frag_id);
                            sender.handle_ack(&ack, timestamp_us());
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        // The peer signalled unreachable for an earlier
                        // send; it may simply not be up yet.
                        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            ready = sock.writable(), if sender.has_pending() => {
                ready?;
                while let Some(wire) = sender.next_datagram(timestamp_us()) {
                    match sock.try_send(&wire) {
                        Ok(_) => sender.mark_sent()?,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            sender.mark_blocked();
                            break;
                        }
                        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                            debug!("peer unreachable, datagram dropped");
                            sender.mark_sent()?;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockEncoder {
        frame_size: usize,
        forced: Vec<bool>,
    }

    impl MockEncoder {
        fn new(frame_size: usize) -> Self {
            Self {
                frame_size,
                forced: Vec::new(),
            }
        }
    }

    impl VideoEncoder for MockEncoder {
        fn encode(
            &mut self,
            _image: &RawImage,
            frame_id: u32,
            force_keyframe: bool,
        ) -> Result<EncodedFrame> {
            self.forced.push(force_keyframe);
            Ok(EncodedFrame {
                data: Bytes::from(vec![0u8; self.frame_size]),
                is_key: force_keyframe || frame_id == 0,
            })
        }

        fn set_target_bitrate(&mut self, _bitrate_kbps: u32) -> Result<()> {
            Ok(())
        }
    }

    fn test_sender(mtu: u16) -> Sender {
        Sender::new(
            SenderConfig {
                width: 4,
                height: 2,
                frame_rate: 30,
                target_bitrate: 500,
                mtu,
            },
            None,
        )
        .unwrap()
    }

    /// Drains the whole send queue as if the socket accepted everything.
    fn drain(sender: &mut Sender) -> Vec<Datagram> {
        let mut sent = Vec::new();
        while let Some(wire) = sender.next_datagram(timestamp_us()) {
            sent.push(Datagram::parse(&wire).unwrap());
            sender.mark_sent().unwrap();
        }
        sent
    }

    fn queued_seq_nums(sender: &Sender) -> Vec<SeqNum> {
        sender
            .send_buf
            .iter()
            .map(|entry| match entry {
                QueueEntry::Fresh(d) => d.seq_num(),
                QueueEntry::Rtx(seq) => *seq,
            })
            .collect()
    }

    #[test]
    fn single_fragment_roundtrip() {
        let mut sender = test_sender(1500);
        let mut encoder = MockEncoder::new(100);
        let image = RawImage::new(4, 2);

        sender.compress_frame(&mut encoder, &image).unwrap();
        assert_eq!(sender.frame_id(), 1);

        let sent = drain(&mut sender);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].frag_cnt, 1);
        assert_eq!(sent[0].frame_type, FrameType::Key);
        assert_eq!(sent[0].payload.len(), 100);
        assert_eq!(sender.unacked.len(), 1);

        let echoed = sender.unacked.get(&(0, 0)).unwrap().datagram.send_ts;
        let rtx = sender.handle_ack(
            &AckMsg {
                frame_id: 0,
                frag_id: 0,
                send_ts: echoed,
            },
            timestamp_us(),
        );
        assert!(!rtx);
        assert!(sender.unacked.is_empty());
        assert!(sender.rtt.min_us().is_some());
        assert!(sender.rtt.ewma_us().is_some());
    }

    #[test]
    fn fragment_count_formula() {
        let mut sender = test_sender(1500);
        let max = sender.max_payload;
        assert_eq!(max, 1455);

        for (size, expected) in [
            (0usize, 1u16),
            (1, 1),
            (max, 1),
            (max + 1, 2),
            (2 * max, 2),
            (3 * max + 1, 4),
        ] {
            let frame = EncodedFrame {
                data: Bytes::from(vec![0u8; size]),
                is_key: false,
            };
            sender.packetize(&frame).unwrap();
            let queued = queued_seq_nums(&sender);
            assert_eq!(queued.len(), usize::from(expected), "size {size}");
            sender.send_buf.clear();
            sender.frame_id += 1;
        }
    }

    #[test]
    fn fragments_cover_the_frame_exactly() {
        let mut sender = test_sender(1500);
        let max = sender.max_payload;
        let frame = EncodedFrame {
            data: Bytes::from(vec![7u8; 3 * max + 1]),
            is_key: true,
        };
        sender.packetize(&frame).unwrap();

        let sent = drain(&mut sender);
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].payload.len(), max);
        assert_eq!(sent[2].payload.len(), max);
        assert_eq!(sent[3].payload.len(), 1);
        for (i, d) in sent.iter().enumerate() {
            assert_eq!(d.frag_id, i as u16);
            assert_eq!(d.frag_cnt, 4);
        }
    }

    #[test]
    fn ack_triggers_retransmit_of_earlier_fragments() {
        let mut sender = test_sender(1500);
        let max = sender.max_payload;
        sender
            .packetize(&EncodedFrame {
                data: Bytes::from(vec![0u8; 3 * max + 1]),
                is_key: true,
            })
            .unwrap();
        drain(&mut sender);
        assert_eq!(sender.unacked.len(), 4);

        // Fragments 0 and 2 were dropped in flight; the ACK for the last
        // fragment arrives.
        let echoed = sender.unacked.get(&(0, 3)).unwrap().datagram.send_ts;
        let curr_ts = timestamp_us();
        let rtx = sender.handle_ack(
            &AckMsg {
                frame_id: 0,
                frag_id: 3,
                send_ts: echoed,
            },
            curr_ts,
        );
        assert!(rtx);

        // All three earlier fragments are scheduled, most recently sent
        // one at the very front, each bumped to one retransmission.
        assert_eq!(queued_seq_nums(&sender), vec![(0, 2), (0, 1), (0, 0)]);
        for frag_id in 0..3 {
            let pending = sender.unacked.get(&(0, frag_id)).unwrap();
            assert_eq!(pending.num_rtx, 1);
            assert_eq!(pending.last_send_ts, curr_ts);
        }

        // The acked fragment is gone from the table.
        assert!(!sender.unacked.contains(&(0, 3)));
        assert_eq!(sender.unacked.len(), 3);
    }

    #[test]
    fn ack_for_unknown_fragment_only_updates_rtt() {
        let mut sender = test_sender(1500);
        let rtx = sender.handle_ack(
            &AckMsg {
                frame_id: 9,
                frag_id: 9,
                send_ts: timestamp_us(),
            },
            timestamp_us(),
        );
        assert!(!rtx);
        assert!(sender.rtt.ewma_us().is_some());
    }

    #[test]
    fn retransmissions_are_paced_by_ewma_rtt() {
        let mut sender = test_sender(1500);
        sender
            .packetize(&EncodedFrame {
                data: Bytes::from(vec![0u8; 2000]),
                is_key: true,
            })
            .unwrap();
        drain(&mut sender);

        let base = timestamp_us();
        // First ACK schedules the first retransmission of fragment 0.
        let echoed = sender.unacked.get(&(0, 1)).unwrap().datagram.send_ts;
        sender.handle_ack(
            &AckMsg {
                frame_id: 0,
                frag_id: 1,
                send_ts: echoed,
            },
            base,
        );
        assert_eq!(sender.unacked.get(&(0, 0)).unwrap().num_rtx, 1);
        sender.send_buf.clear();

        // A duplicate-style trigger right away is suppressed: less than
        // one smoothed RTT since the retransmission was scheduled.
        sender.packetize_probe_for_pacing(base);
        assert_eq!(sender.unacked.get(&(0, 0)).unwrap().num_rtx, 1);
        assert!(sender.send_buf.is_empty());

        // Well past one smoothed RTT it fires again.
        let later = base + 60_000_000;
        sender.packetize_probe_for_pacing(later);
        assert_eq!(sender.unacked.get(&(0, 0)).unwrap().num_rtx, 2);
        assert_eq!(queued_seq_nums(&sender), vec![(0, 0)]);
    }

    #[test]
    fn retransmission_cap_is_respected() {
        let mut sender = test_sender(1500);
        sender
            .packetize(&EncodedFrame {
                data: Bytes::from(vec![0u8; 2000]),
                is_key: true,
            })
            .unwrap();
        drain(&mut sender);

        sender.unacked.get_mut(&(0, 0)).unwrap().num_rtx = MAX_NUM_RTX;
        let echoed = sender.unacked.get(&(0, 1)).unwrap().datagram.send_ts;
        let rtx = sender.handle_ack(
            &AckMsg {
                frame_id: 0,
                frag_id: 1,
                send_ts: echoed,
            },
            timestamp_us() + 60_000_000,
        );

        assert!(!rtx);
        assert!(sender.send_buf.is_empty());
        assert_eq!(sender.unacked.get(&(0, 0)).unwrap().num_rtx, MAX_NUM_RTX);
    }

    #[test]
    fn keyframe_force_after_unacked_timeout() {
        let mut sender = test_sender(1500);
        let mut encoder = MockEncoder::new(50);
        let image = RawImage::new(4, 2);

        sender.compress_frame(&mut encoder, &image).unwrap();
        drain(&mut sender);
        assert_eq!(encoder.forced, vec![false]);

        // Age the in-flight fragment past the recovery threshold.
        sender.unacked.get_mut(&(0, 0)).unwrap().datagram.send_ts =
            timestamp_us() - 1_200_000;

        sender.compress_frame(&mut encoder, &image).unwrap();
        assert_eq!(encoder.forced, vec![false, true]);
        // Old state was dropped; only the fresh key frame is queued.
        assert_eq!(queued_seq_nums(&sender), vec![(1, 0)]);
        assert_eq!(sender.unacked.len(), 0);
    }

    #[test]
    fn no_keyframe_force_below_threshold() {
        let mut sender = test_sender(1500);
        let mut encoder = MockEncoder::new(50);
        let image = RawImage::new(4, 2);

        sender.compress_frame(&mut encoder, &image).unwrap();
        drain(&mut sender);
        sender.compress_frame(&mut encoder, &image).unwrap();
        assert_eq!(encoder.forced, vec![false, false]);
    }

    #[test]
    fn blocked_send_rolls_back_the_timestamp() {
        let mut sender = test_sender(1500);
        sender
            .packetize(&EncodedFrame {
                data: Bytes::from(vec![0u8; 10]),
                is_key: true,
            })
            .unwrap();

        assert!(sender.next_datagram(123_456).is_some());
        sender.mark_blocked();
        let Some(QueueEntry::Fresh(datagram)) = sender.send_buf.front() else {
            panic!("datagram must stay queued");
        };
        assert_eq!(datagram.send_ts, 0);
    }

    #[test]
    fn acked_retransmission_is_skipped_at_send_time() {
        let mut sender = test_sender(1500);
        sender
            .packetize(&EncodedFrame {
                data: Bytes::from(vec![0u8; 2000]),
                is_key: true,
            })
            .unwrap();
        drain(&mut sender);

        let echoed = sender.unacked.get(&(0, 1)).unwrap().datagram.send_ts;
        sender.handle_ack(
            &AckMsg {
                frame_id: 0,
                frag_id: 1,
                send_ts: echoed,
            },
            timestamp_us(),
        );
        assert_eq!(queued_seq_nums(&sender), vec![(0, 0)]);

        // Fragment 0 gets acked before the socket drains its queued
        // retransmission; nothing is left to send.
        let echoed = sender.unacked.get(&(0, 0)).unwrap().datagram.send_ts;
        sender.handle_ack(
            &AckMsg {
                frame_id: 0,
                frag_id: 0,
                send_ts: echoed,
            },
            timestamp_us(),
        );
        assert!(sender.next_datagram(timestamp_us()).is_none());
        assert!(!sender.has_pending());
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let mut sender = test_sender(1500);
        let mut encoder = MockEncoder::new(50);
        let image = RawImage::new(8, 8);
        assert!(matches!(
            sender.compress_frame(&mut encoder, &image),
            Err(Error::DimensionMismatch)
        ));
    }

    #[test]
    fn invalid_mtu_is_a_configuration_error() {
        assert!(matches!(
            Sender::new(
                SenderConfig {
                    width: 4,
                    height: 2,
                    frame_rate: 30,
                    target_bitrate: 0,
                    mtu: 300,
                },
                None,
            ),
            Err(Error::InvalidMtu(300))
        ));
    }

    impl Sender {
        /// Test helper: replays the ACK-walk pacing decision for fragment
        /// 0 by acking a fresh later fragment at `curr_ts`.
        fn packetize_probe_for_pacing(&mut self, curr_ts: u64) {
            self.frame_id += 1;
            self.packetize(&EncodedFrame {
                data: Bytes::from(vec![0u8; 10]),
                is_key: false,
            })
            .unwrap();
            while let Some(_wire) = self.next_datagram(curr_ts) {
                self.mark_sent().unwrap();
            }
            let probe_seq = {
                let mut latest = None;
                for (seq, _) in self.unacked.iter() {
                    latest = Some(seq);
                }
                latest.unwrap()
            };
            let echoed = self.unacked.get(&probe_seq).unwrap().datagram.send_ts;
            self.handle_ack(
                &AckMsg {
                    frame_id: probe_seq.0,
                    frag_id: probe_seq.1,
                    send_ts: echoed,
                },
                curr_ts,
            );
        }
    }
}
