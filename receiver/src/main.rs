#[cfg(feature = "display")]
mod display;
#[cfg(feature = "vpx")]
mod vpx;

use std::path::PathBuf;

use clap::Parser;
use log::info;
use tokio::net::UdpSocket;
use vtransport::protocol::{ConfigMsg, Msg};
use vtransport::{LazyLevel, Receiver, Result, StatsFile, WorkerInit, run_receiver};

#[derive(Parser)]
#[command(name = "receiver", about = "Low-latency VP9 video receiver over UDP")]
struct Args {
    /// frame rate to request from sender
    #[arg(long, default_value_t = 30)]
    fps: u16,

    /// request CBR (kbps) from sender
    #[arg(long, default_value_t = 0)]
    cbr: u32,

    /// 0: decode and display frames, 1: decode but not display frames,
    /// 2: neither decode nor display frames
    #[arg(long, default_value_t = 0)]
    lazy: u8,

    /// file to output performance results to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// enable more logging for debugging
    #[arg(short, long)]
    verbose: bool,

    /// sender host address
    host: String,

    /// sender port number
    port: u16,

    /// video width to request
    width: u16,

    /// video height to request
    height: u16,
}

/// Builds the decoder/display constructor matching the lazy level, or
/// fails at startup when this build lacks the required support.
#[allow(unused_variables)]
fn worker_init(lazy_level: LazyLevel, width: u16, height: u16) -> Result<Option<WorkerInit>> {
    if lazy_level == LazyLevel::ProtocolOnly {
        return Ok(None);
    }

    #[cfg(not(feature = "vpx"))]
    {
        let _ = (width, height);
        return Err(vtransport::Error::Codec(
            "built without VP9 support; run with --lazy 2".into(),
        ));
    }

    #[cfg(feature = "vpx")]
    {
        use vtransport::{VideoDecoder, VideoDisplay};

        if lazy_level == LazyLevel::DecodeDisplay {
            #[cfg(not(feature = "display"))]
            {
                return Err(vtransport::Error::Display(
                    "built without display support; run with --lazy 1 or 2".into(),
                ));
            }

            #[cfg(feature = "display")]
            {
                return Ok(Some(Box::new(move || {
                    let decoder = vpx::VpxDecoder::new(width, height)?;
                    let display = display::SdlDisplay::new(width, height)?;
                    Ok((
                        Box::new(decoder) as Box<dyn VideoDecoder>,
                        Some(Box::new(display) as Box<dyn VideoDisplay>),
                    ))
                })));
            }
        }

        return Ok(Some(Box::new(move || {
            let decoder = vpx::VpxDecoder::new(width, height)?;
            Ok((Box::new(decoder) as Box<dyn VideoDecoder>, None))
        })));
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .init();

    let lazy_level = LazyLevel::try_from(args.lazy)?;

    let sock = UdpSocket::bind("0.0.0.0:0").await?;
    sock.connect((args.host.as_str(), args.port)).await?;
    info!("Peer address: {}:{}", args.host, args.port);
    info!("Local address: {}", sock.local_addr()?);

    // Request a specific configuration from the sender.
    let config = ConfigMsg {
        width: args.width,
        height: args.height,
        frame_rate: args.fps,
        target_bitrate: args.cbr,
    };
    sock.send(&Msg::Config(config).serialize()).await?;

    let output = args.output.as_deref().map(StatsFile::create).transpose()?;
    let init = worker_init(lazy_level, args.width, args.height)?;
    let mut receiver = Receiver::new(lazy_level, init, output)?;

    run_receiver(&sock, &mut receiver).await
}
