mod vpx;

use std::path::PathBuf;

use clap::Parser;
use log::info;
use tokio::net::UdpSocket;
use vtransport::codec::VideoEncoder;
use vtransport::{
    DEFAULT_MTU, Result, Sender, SenderConfig, StatsFile, Y4mInput, run_sender, wait_for_receiver,
};

#[derive(Parser)]
#[command(name = "sender", about = "Low-latency VP9 video sender over UDP")]
struct Args {
    /// MTU for deciding UDP payload size
    #[arg(long)]
    mtu: Option<u16>,

    /// file to output performance results to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// enable more logging for debugging
    #[arg(short, long)]
    verbose: bool,

    /// port number to listen on
    port: u16,

    /// YUV4MPEG2 video file to stream (wraps around at the end)
    y4m: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .init();

    let sock = UdpSocket::bind(("0.0.0.0", args.port)).await?;
    info!("Local address: {}", sock.local_addr()?);

    info!("Waiting for receiver...");
    let (peer_addr, config) = wait_for_receiver(&sock).await?;
    sock.connect(peer_addr).await?;
    info!("Peer address: {peer_addr}");
    info!(
        "Received config: width={} height={} FPS={} bitrate={}",
        config.width, config.height, config.frame_rate, config.target_bitrate
    );

    let video_input = Y4mInput::open(&args.y4m, config.width, config.height)?;

    let mut encoder = vpx::VpxEncoder::new(config.width, config.height, config.frame_rate)?;
    if config.target_bitrate > 0 {
        encoder.set_target_bitrate(config.target_bitrate)?;
    }

    let output = args.output.as_deref().map(StatsFile::create).transpose()?;
    let engine = Sender::new(
        SenderConfig {
            width: config.width,
            height: config.height,
            frame_rate: config.frame_rate,
            target_bitrate: config.target_bitrate,
            mtu: args.mtu.unwrap_or(DEFAULT_MTU),
        },
        output,
    )?;

    run_sender(sock, video_input, encoder, engine).await
}
