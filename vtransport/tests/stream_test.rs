//! End-to-end test of the sender and receiver event loops over real UDP
//! sockets on localhost, with a mock codec standing in for VP9.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use vtransport::codec::{EncodedFrame, VideoEncoder};
use vtransport::protocol::{ConfigMsg, Msg};
use vtransport::video::{FrameSource, RawImage};
use vtransport::{
    LazyLevel, Receiver, Result, Sender, SenderConfig, StatsFile, run_receiver, run_sender,
    wait_for_receiver,
};

struct CounterSource {
    frames_read: u32,
}

impl FrameSource for CounterSource {
    fn read_frame(&mut self, image: &mut RawImage) -> Result<()> {
        self.frames_read += 1;
        image.data_mut().fill(self.frames_read as u8);
        Ok(())
    }
}

/// Produces a key frame every 10 frames and alternates between frames that
/// fit one datagram and frames that need two.
struct PatternEncoder;

impl VideoEncoder for PatternEncoder {
    fn encode(
        &mut self,
        _image: &RawImage,
        frame_id: u32,
        force_keyframe: bool,
    ) -> Result<EncodedFrame> {
        let size = if frame_id % 2 == 0 { 200 } else { 2000 };
        Ok(EncodedFrame {
            data: Bytes::from(vec![frame_id as u8; size]),
            is_key: force_keyframe || frame_id % 10 == 0,
        })
    }

    fn set_target_bitrate(&mut self, _bitrate_kbps: u32) -> Result<()> {
        Ok(())
    }
}

fn stats_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("vtransport-e2e-{}-{name}", std::process::id()))
}

#[tokio::test]
async fn frames_flow_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();

    let sender_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let sender_addr = sender_sock.local_addr().unwrap();
    let receiver_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    receiver_sock.connect(sender_addr).await.unwrap();

    // Session startup: the receiver is the active party.
    let config = ConfigMsg {
        width: 4,
        height: 2,
        frame_rate: 100,
        target_bitrate: 500,
    };
    receiver_sock
        .send(&Msg::Config(config).serialize())
        .await
        .unwrap();

    let (peer_addr, received_config) = wait_for_receiver(&sender_sock).await.unwrap();
    assert_eq!(peer_addr, receiver_sock.local_addr().unwrap());
    assert_eq!(received_config, config);
    sender_sock.connect(peer_addr).await.unwrap();

    let engine = Sender::new(
        SenderConfig {
            width: received_config.width,
            height: received_config.height,
            frame_rate: received_config.frame_rate,
            target_bitrate: received_config.target_bitrate,
            mtu: 1500,
        },
        None,
    )
    .unwrap();

    let sender_task = tokio::spawn(run_sender(
        sender_sock,
        CounterSource { frames_read: 0 },
        PatternEncoder,
        engine,
    ));

    let path = stats_path("flow");
    let mut receiver = Receiver::new(
        LazyLevel::ProtocolOnly,
        None,
        Some(StatsFile::create(&path).unwrap()),
    )
    .unwrap();

    // Let the pair stream for a second, then stop.
    let outcome = timeout(
        Duration::from_secs(1),
        run_receiver(&receiver_sock, &mut receiver),
    )
    .await;
    assert!(outcome.is_err(), "receiver loop must still be running");
    sender_task.abort();

    let contents = std::fs::read_to_string(&path).unwrap();
    let records: Vec<(u32, usize)> = contents
        .lines()
        .map(|line| {
            let mut fields = line.split(',');
            (
                fields.next().unwrap().parse().unwrap(),
                fields.next().unwrap().parse().unwrap(),
            )
        })
        .collect();

    // At 100 fps for ~1 s a healthy pair moves far more than 5 frames.
    assert!(records.len() >= 5, "only {} frames consumed", records.len());
    assert_eq!(records[0].0, 0, "stream must start at frame 0");
    for pair in records.windows(2) {
        assert!(pair[1].0 > pair[0].0, "consumption order must increase");
    }
    for (frame_id, frame_size) in &records {
        let expected = if frame_id % 2 == 0 { 200 } else { 2000 };
        assert_eq!(*frame_size, expected);
    }

    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn config_handshake_ignores_stray_traffic() {
    let sender_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let sender_addr = sender_sock.local_addr().unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    peer.connect(sender_addr).await.unwrap();

    // Garbage, then a valid but non-CONFIG message, then the real thing.
    peer.send(b"not a message").await.unwrap();
    peer.send(
        &Msg::Ack(vtransport::AckMsg {
            frame_id: 0,
            frag_id: 0,
            send_ts: 0,
        })
        .serialize(),
    )
    .await
    .unwrap();
    let config = ConfigMsg {
        width: 1280,
        height: 720,
        frame_rate: 30,
        target_bitrate: 0,
    };
    peer.send(&Msg::Config(config).serialize()).await.unwrap();

    let (addr, received) = timeout(Duration::from_secs(2), wait_for_receiver(&sender_sock))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(addr, peer.local_addr().unwrap());
    assert_eq!(received, config);
}
