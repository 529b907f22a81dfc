//! rdmux multiplexer entry point.
//!
//! Wires together the worker, the transport, and the peer-engine seam, then
//! parks until a shutdown signal arrives. VMs can be registered at startup
//! with `--vm`; at runtime they arrive through the operator control surface.
//!
//! The remote-desktop protocol engine and the shim socket transport are
//! attached through the `PeerSink` and `Transport` seams. This binary runs
//! headless: sink calls are logged and frames are discarded, which is enough
//! to exercise the listener/worker machinery end to end.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rdmux_core::PixelFormat;
use rdmux_mux::config;
use rdmux_mux::listener::Listener;
use rdmux_mux::peer::{Peer, PeerError, PeerSink};
use rdmux_mux::worker::{NullTransport, Worker};

#[derive(Parser, Debug)]
#[command(name = "rdmux", about = "Remote-desktop multiplexer for VM framebuffers")]
struct Args {
    /// Path to the TOML config file (defaults to the platform config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// VM to register at startup, as `uuid:vm_id[:port]`. Repeatable.
    #[arg(long = "vm", value_name = "UUID:VM_ID[:PORT]")]
    vms: Vec<String>,
}

/// Peer engine stand-in for the headless build: accepts every listener,
/// parks in `start`, and logs update traffic.
struct HeadlessPeerSink;

#[async_trait]
impl PeerSink for HeadlessPeerSink {
    fn allocate(&self) -> Result<(), PeerError> {
        Ok(())
    }

    async fn start(&self, listener: Arc<Listener>) -> Result<(), PeerError> {
        debug!(uuid = %listener.uuid(), "headless peer server started");
        std::future::pending::<()>().await;
        Ok(())
    }

    fn full_update(&self, peer: &Peer, width: u32, height: u32, format: PixelFormat) {
        debug!(peer = %peer.id(), width, height, ?format, "full update");
    }

    fn partial_update(&self, peer: &Peer, x: u32, y: u32, width: u32, height: u32) {
        debug!(peer = %peer.id(), x, y, width, height, "partial update");
    }

    fn capture_fps(&self, _peer: &Peer) -> u32 {
        30
    }
}

/// Parses a `--vm` value of the form `uuid:vm_id[:port]`.
fn parse_vm_spec(spec: &str) -> anyhow::Result<(String, u32, Option<u16>)> {
    let mut parts = spec.split(':');

    let uuid = parts
        .next()
        .filter(|s| !s.is_empty())
        .context("missing uuid in --vm spec")?;
    let vm_id = parts
        .next()
        .context("missing vm_id in --vm spec")?
        .parse::<u32>()
        .context("vm_id must be an unsigned integer")?;
    let port = parts
        .next()
        .map(|p| p.parse::<u16>().context("port must be a u16"))
        .transpose()?;
    if parts.next().is_some() {
        anyhow::bail!("too many fields in --vm spec {spec:?}");
    }

    Ok((uuid.to_string(), vm_id, port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = config::load_config(args.config.as_deref())?;

    // Structured logging; RUST_LOG overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.mux.log_level.clone())),
        )
        .init();

    info!("rdmux starting");

    let worker = Worker::new(
        Arc::new(HeadlessPeerSink),
        Arc::new(NullTransport),
        cfg.mux.outbound_queue_depth,
    );

    let mut next_port = cfg.listeners.port_base;
    for spec in &args.vms {
        let (uuid, vm_id, port) = parse_vm_spec(spec)?;
        let port = port.unwrap_or_else(|| {
            let assigned = next_port;
            next_port += 1;
            assigned
        });
        worker
            .register_vm(&uuid, vm_id, port, cfg.listeners.authentication)
            .with_context(|| format!("registering VM {uuid}"))?;
    }

    info!(vms = worker.num_registered(), "rdmux ready, press Ctrl-C to exit");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_spec_with_port() {
        let (uuid, vm_id, port) = parse_vm_spec("vm-1234:42:3901").unwrap();
        assert_eq!(uuid, "vm-1234");
        assert_eq!(vm_id, 42);
        assert_eq!(port, Some(3901));
    }

    #[test]
    fn test_parse_vm_spec_without_port() {
        let (uuid, vm_id, port) = parse_vm_spec("vm-1234:7").unwrap();
        assert_eq!(uuid, "vm-1234");
        assert_eq!(vm_id, 7);
        assert_eq!(port, None);
    }

    #[test]
    fn test_parse_vm_spec_rejects_garbage() {
        assert!(parse_vm_spec("").is_err());
        assert!(parse_vm_spec("uuid-only").is_err());
        assert!(parse_vm_spec("vm:notanumber").is_err());
        assert!(parse_vm_spec("vm:1:2:3").is_err());
    }
}
