// src/main.rs
use anyhow::{bail, Context, Result};
use gesture_bridge::config::BridgeConfig;
use gesture_bridge::connection::{ConnectionManager, TcpConnector, TransportError};
use gesture_bridge::session::{run_with_config, LoopMetrics};
use gesture_bridge::source::{JsonLinesSource, LandmarkSource, SimulatedSource};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const USAGE: &str = "\
Usage: gesture_bridge [OPTIONS]

Reads hand landmark frames (JSON lines, stdin by default) and streams
gesture events to the configured endpoint.

Options:
  --config <PATH>       Configuration file (JSON)
  --host <HOST>         Endpoint host override
  --port <PORT>         Endpoint port override
  --input <PATH>        Read frames from a file instead of stdin
  --simulate            Generate synthetic hands instead of reading input
  --frame-ms <MS>       Frame interval for --simulate (default 33)
  -h, --help            Show this message
";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    input: Option<PathBuf>,
    simulate: bool,
    frame_ms: Option<u64>,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().with_context(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--host" => parsed.host = Some(value("--host")?),
            "--port" => {
                let v = value("--port")?;
                parsed.port = Some(v.parse().with_context(|| format!("Invalid port '{}'", v))?);
            }
            "--input" => parsed.input = Some(PathBuf::from(value("--input")?)),
            "--simulate" => parsed.simulate = true,
            "--frame-ms" => {
                let v = value("--frame-ms")?;
                parsed.frame_ms = Some(v.parse().with_context(|| format!("Invalid frame interval '{}'", v))?);
            }
            "-h" | "--help" => parsed.help = true,
            other => bail!("Unknown argument '{}'\n\n{}", other, USAGE),
        }
    }

    if parsed.simulate && parsed.input.is_some() {
        bail!("--simulate and --input are mutually exclusive");
    }
    Ok(parsed)
}

fn open_source(args: &CliArgs) -> Result<Box<dyn LandmarkSource>> {
    if args.simulate {
        let interval = Duration::from_millis(args.frame_ms.unwrap_or(33));
        info!(?interval, "Using simulated hands");
        return Ok(Box::new(SimulatedSource::new(interval)));
    }
    match &args.input {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open input {}", path.display()))?;
            info!(path = %path.display(), "Reading landmark frames from file");
            Ok(Box::new(JsonLinesSource::new(BufReader::new(file))))
        }
        None => {
            info!("Reading landmark frames from stdin");
            Ok(Box::new(JsonLinesSource::new(std::io::stdin().lock())))
        }
    }
}

fn run(config: BridgeConfig, args: CliArgs, stop: Arc<AtomicBool>) -> Result<LoopMetrics> {
    let mut source = open_source(&args)?;

    let connector = TcpConnector::new(config.endpoint.address(), &config.connection);
    let mut connection =
        ConnectionManager::new(connector, config.connection.reconnect_delay()).with_shutdown(Arc::clone(&stop));

    // Nothing useful can happen without the consumer, so wait for it
    match connection.connect() {
        Ok(()) => {}
        Err(TransportError::Shutdown) => {
            source.close();
            return Ok(LoopMetrics::default());
        }
        Err(e) => return Err(e.into()),
    }

    run_with_config(config, source.as_mut(), &mut connection, stop)
}

#[tokio::main]
async fn main() -> Result<()> {
    gesture_bridge::init_tracing();

    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        print!("{}", USAGE);
        return Ok(());
    }

    let mut config = BridgeConfig::load(args.config.as_deref())?;
    if let Some(host) = &args.host {
        config.endpoint.host = host.clone();
    }
    if let Some(port) = args.port {
        config.endpoint.port = port;
    }
    config.validate()?;

    let session_id = Uuid::new_v4();
    info!(%session_id, endpoint = %config.endpoint.address(), "Starting gesture bridge");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if stop.swap(true, Ordering::SeqCst) {
                    // second Ctrl-C: the loop is stuck in a blocking read
                    warn!("Forced exit");
                    std::process::exit(130);
                }
                info!("Stop requested, finishing current frame");
            }
        });
    }

    let metrics = tokio::task::spawn_blocking(move || run(config, args, stop))
        .await
        .context("Frame loop task failed")??;

    info!(%session_id, frames = metrics.frames_processed, "Shutdown complete");
    Ok(())
}
