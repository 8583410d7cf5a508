//! `bambucamd`: republishes a Bambu Lab printer's proprietary MJPEG
//! camera stream as MJPEG-over-HTTP and/or RTP/MPEG-2. Grounded on
//! `app/src/main.rs`'s `tokio::select!`-over-two-servers shutdown
//! idiom, and on `main.c`'s argument contract — one binary covering
//! what the original split across `main.c` (RTP) and the
//! `server_microhttpd.c` caller (HTTP), per spec's REDESIGN FLAG
//! "Multiple `main.c` variants → one binary with a transport
//! selection; not part of the core."

use bc_broker::{BrokerMetrics, FrameBroker, LifecycleController};
use bc_core::telemetry;
use bc_egress_mjpeg::MjpegState;
use bc_egress_rtp::RtpPipelineConfig;
use bc_source::{live::LiveFrameSource, FrameSource};
use clap::{Parser, ValueEnum};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// `<port>` in the CLI belongs to the RTP egress, matching `main.c`'s
/// `<rtp-port>` argument verbatim. The MJPEG-HTTP egress has no
/// CLI-exposed port (spec §6 fixes the CLI surface at four positional
/// arguments), so it binds here by default — a resolved Open
/// Question not present in the original; see DESIGN.md.
const DEFAULT_HTTP_PORT: u16 = 8080;
const VIDEO_WIDTH: u32 = 1280;
const VIDEO_HEIGHT: u32 = 720;
const RTP_FPS: u32 = 30;

/// Which egress transport(s) to run. RTP has no connection-close
/// signal to gate its pseudo-viewer on (see `bc_egress_rtp::serve`),
/// so selecting it holds the upstream tunnel open for the whole
/// process lifetime; `Mjpeg` is the default precisely because it is
/// the one mode where the Lifecycle Controller's "connect only when a
/// viewer is present" invariant holds without caveats (spec §1,
/// Testable Scenario 1).
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Transport {
    Mjpeg,
    Rtp,
    Both,
}

#[derive(Parser)]
#[command(name = "bambucamd")]
#[command(about = "Republishes a Bambu Lab printer's camera stream as MJPEG and/or RTP")]
struct Cli {
    /// Printer IP address on the local network.
    ip: String,
    /// Printer device ID (LAN mode).
    device: String,
    /// Printer LAN-mode access code.
    passcode: String,
    /// RTP output port; the stream is sent to `rtp://localhost:<port>`.
    port: u16,
    /// Which egress transport(s) to run. `rtp` and `both` hold the
    /// upstream tunnel open for the whole process lifetime, since RTP
    /// has no per-consumer demand signal to gate on.
    #[arg(long, value_enum, default_value_t = Transport::Mjpeg)]
    transport: Transport,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init_tracing("development", "bambucamd");

    if let Err(e) = run(cli).await {
        error!(error = %e, "bambucamd exited with an error");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> bc_core::Result<()> {
    let source: Arc<dyn FrameSource> =
        Arc::new(LiveFrameSource::new(cli.ip, cli.device, cli.passcode));
    let broker = Arc::new(FrameBroker::new(source.clone(), BrokerMetrics::new()));
    let lifecycle = Arc::new(LifecycleController::new(source, broker));

    let shutdown = CancellationToken::new();

    let mjpeg_state = MjpegState::new(lifecycle.clone());
    let http_bind_addr: std::net::SocketAddr = ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into();

    let rtp_config = RtpPipelineConfig {
        port: cli.port,
        width: VIDEO_WIDTH,
        height: VIDEO_HEIGHT,
        fps: RTP_FPS,
    };

    info!(
        http_port = DEFAULT_HTTP_PORT,
        rtp_port = cli.port,
        transport = ?cli.transport,
        "bambucamd starting"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // Only the transports the operator actually asked for run.
    // `Transport::Mjpeg` (the default) never constructs the RTP
    // future at all, so the shared Lifecycle Controller is untouched
    // until an HTTP viewer connects — running RTP is what trades that
    // invariant away, and it is opt-in.
    match cli.transport {
        Transport::Mjpeg => {
            let result = bc_egress_mjpeg::serve(http_bind_addr, mjpeg_state, shutdown.clone());
            tokio::pin!(result);
            tokio::select! {
                result = &mut result => {
                    error!("mjpeg egress exited");
                    result.map_err(bc_core::Error::Io)?;
                }
                _ = &mut ctrl_c => {
                    info!("received ctrl-c, shutting down");
                    shutdown.cancel();
                    lifecycle.shutdown().await;
                }
            }
        }
        Transport::Rtp => {
            let result = bc_egress_rtp::serve(
                rtp_config,
                lifecycle.clone(),
                bc_egress_rtp::RtpMetrics::new(),
                shutdown.clone(),
            );
            tokio::pin!(result);
            tokio::select! {
                result = &mut result => {
                    error!("rtp egress exited");
                    result?;
                }
                _ = &mut ctrl_c => {
                    info!("received ctrl-c, shutting down");
                    shutdown.cancel();
                    lifecycle.shutdown().await;
                }
            }
        }
        Transport::Both => {
            let mjpeg_future = bc_egress_mjpeg::serve(http_bind_addr, mjpeg_state, shutdown.clone());
            let rtp_future = bc_egress_rtp::serve(
                rtp_config,
                lifecycle.clone(),
                bc_egress_rtp::RtpMetrics::new(),
                shutdown.clone(),
            );
            tokio::select! {
                result = mjpeg_future => {
                    error!("mjpeg egress exited");
                    result.map_err(bc_core::Error::Io)?;
                }
                result = rtp_future => {
                    error!("rtp egress exited");
                    result?;
                }
                _ = &mut ctrl_c => {
                    info!("received ctrl-c, shutting down");
                    shutdown.cancel();
                    lifecycle.shutdown().await;
                }
            }
        }
    }

    Ok(())
}
