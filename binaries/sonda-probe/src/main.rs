//! Sonda - network measurement probe worker
//!
//! One worker process = one measurement engine behind a control channel.
//! The supervisor forks one worker per CPU and owns the real transport;
//! this binary adapts the engine to newline-delimited JSON frames on
//! stdio:
//!
//!   stdin:  {"event": "probe:measurement:request", "payload": {...}}
//!   stdout: {"event": "probe:measurement:progress" | "...:result" |
//!            "probe:status:ready", "payload": {...}}

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use sonda_common::logging::{init_logging, LogConfig};
use sonda_common::{
    event_channel, request_channel, OutboundEvent, ProbeConfig, RequestEnvelope, EVENT_REQUEST,
};
use sonda_dispatch::Dispatcher;
use sonda_measurements::{all_handlers, HandlerContext};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sonda - network measurement probe worker
#[derive(Parser, Debug)]
#[command(
    name = "sonda-probe",
    version = sonda_common::VERSION,
    about = "Sonda network-measurement probe worker",
    long_about = None
)]
struct Args {
    /// Log directory (defaults to stderr)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    event: String,
    payload: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Install rustls crypto provider (aws-lc-rs) before any TLS operations
    // This is required for rustls 0.23+
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    init_logging(LogConfig {
        log_dir: args.log_dir,
        level: args.log_level,
        use_stderr: true,
    })?;

    info!("Sonda probe worker v{}", sonda_common::VERSION);

    let config = match args.config {
        Some(path) => ProbeConfig::from_file(&path)?,
        None => ProbeConfig::default(),
    };

    let ctx = HandlerContext::new(&config);
    let (event_tx, mut event_rx) = event_channel();
    let (request_tx, request_rx) = request_channel();
    let dispatcher = Dispatcher::new(event_tx.clone(), all_handlers(ctx));

    let cancel = CancellationToken::new();

    // Outbound: events to stdout, one JSON frame per line
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = event_rx.recv().await {
            let frame = serde_json::json!({"event": event.name(), "payload": event});
            let mut line = frame.to_string();
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                warn!("stdout closed, shutting down");
                writer_cancel.cancel();
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // Inbound: frames from stdin to the dispatcher
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let frame: InboundFrame = match serde_json::from_str(&line) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("unparseable frame: {}", e);
                            continue;
                        }
                    };
                    if frame.event != EVENT_REQUEST {
                        debug!(event = %frame.event, "ignoring event");
                        continue;
                    }
                    match serde_json::from_value::<RequestEnvelope>(frame.payload) {
                        Ok(request) => {
                            if request_tx.send(request).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("malformed request payload: {}", e),
                    }
                }
                Ok(None) => {
                    info!("stdin closed, shutting down");
                    reader_cancel.cancel();
                    break;
                }
                Err(e) => {
                    error!("stdin read error: {}", e);
                    reader_cancel.cancel();
                    break;
                }
            }
        }
    });

    // The channel is connected once both pumps run
    if event_tx.send(OutboundEvent::Ready).is_err() {
        anyhow::bail!("event channel closed before startup completed");
    }
    info!("probe ready");

    tokio::select! {
        _ = dispatcher.run(request_rx, cancel.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C");
            cancel.cancel();
        }
    }

    // Let the writer drain pending events
    drop(dispatcher);
    drop(event_tx);
    let _ = writer.await;

    info!("Shutting down worker");
    Ok(())
}
