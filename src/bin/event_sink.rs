// src/bin/event_sink.rs - Minimal consumer that logs incoming gesture events
use anyhow::{Context, Result};
use gesture_bridge::payload::ActionPayload;
use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use tracing::{info, warn};

fn main() -> Result<()> {
    gesture_bridge::init_tracing();

    let port: u16 = match std::env::args().nth(1) {
        Some(p) => p.parse().with_context(|| format!("Invalid port '{}'", p))?,
        None => 8885,
    };

    let listener = TcpListener::bind(("0.0.0.0", port)).with_context(|| format!("Failed to bind port {}", port))?;
    info!(port, "Event sink listening");

    // one consumer connection at a time, like the bridge expects
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!(%peer, "Connect");

        let mut received = 0u64;
        for line in BufReader::new(stream).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(%peer, error = %e, "Read failed");
                    break;
                }
            };
            match ActionPayload::from_wire_json(&line) {
                Ok(payload) => {
                    received += 1;
                    info!(action = %payload.action(), ?payload, "Event");
                }
                Err(e) => warn!(error = %e, raw = %line, "Unreadable event"),
            }
        }
        info!(%peer, received, "Disconnect");
    }
    Ok(())
}
