//! SD-WSN Controller - Rust Implementation
//!
//! Runs the controller core against a simulated mesh.

mod error;
mod radio;
mod scenario;
mod sim;

use clap::{Parser, ValueEnum};
use radio::{SimClock, SimRadio};
use scenario::Scenario;
use sdwsn_core::{Controller, ResolverKind};
use sim::{Mesh, Uplink};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Cost resolver selection
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolverArg {
    /// Dijkstra over negated RSSI
    ShortestPath,
    /// Rank-layered maximum residual energy
    MaxEnergy,
}

impl From<ResolverArg> for ResolverKind {
    fn from(arg: ResolverArg) -> Self {
        match arg {
            ResolverArg::ShortestPath => ResolverKind::ShortestPath,
            ResolverArg::MaxEnergy => ResolverKind::MaxResidualEnergy,
        }
    }
}

/// SD-WSN controller with a simulated mesh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (JSON); a built-in mesh is used when omitted
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the scenario's resolver
    #[arg(short, long, value_enum)]
    resolver: Option<ResolverArg>,

    /// Enable differential dissemination
    #[arg(long)]
    differential: bool,

    /// Wall-clock run time in seconds
    #[arg(long, default_value = "60")]
    duration_s: u64,

    /// Wall-clock tick period in milliseconds
    #[arg(long, default_value = "50")]
    tick_ms: u64,

    /// Simulated milliseconds per wall-clock millisecond
    #[arg(long, default_value = "20")]
    time_scale: u64,

    /// Seed for packet loss and sequence numbers
    #[arg(long, default_value = "1")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load scenario, CLI flags override its controller section
    let mut scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::demo(),
    };
    if let Some(resolver) = args.resolver {
        scenario.controller.resolver = resolver.into();
    }
    if args.differential {
        scenario.controller.differential = true;
    }
    let config = scenario.controller;

    info!(
        "SD-WSN controller {} starting: {} nodes, {} links, resolver {:?}, differential {}",
        config.controller,
        scenario.nodes.len(),
        scenario.links.len(),
        config.resolver,
        config.differential
    );

    let clock = SimClock::default();
    let (downlink_tx, downlink_rx) = mpsc::unbounded_channel();
    let (uplink_tx, mut uplink_rx) = mpsc::unbounded_channel();

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let step_ms = args.tick_ms.max(1) * args.time_scale.max(1);

    // Spawn mesh task
    let mesh = Mesh::new(&scenario, clock.clone(), args.seed);
    let mesh_task = tokio::spawn(sim::run(mesh, downlink_rx, uplink_tx, tick));

    let radio = SimRadio::new(clock.clone(), downlink_tx, args.seed.wrapping_add(1));
    let mut ctrl = Controller::new(radio, Some(config));

    let mut ticker = interval(tick);
    let mut status_ticker = interval(Duration::from_secs(5));
    let deadline = sleep(Duration::from_secs(args.duration_s));
    tokio::pin!(deadline);

    // Main event loop
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                clock.advance(step_ms);
                ctrl.tick();
            }

            Some(msg) = uplink_rx.recv() => {
                match msg {
                    Uplink::Advert(advert) => {
                        for (neighbor, rssi) in &advert.neighbors {
                            if let Err(e) = ctrl.report_link(advert.addr, *neighbor, *rssi) {
                                warn!("Link {} - {} not recorded: {}", advert.addr, neighbor, e);
                            }
                        }
                        if let Err(e) = ctrl.report_node(advert.addr, advert.report) {
                            warn!("Report from {} not recorded: {}", advert.addr, e);
                        }
                        if let Some(checksum) = advert.checksum {
                            if let Err(e) = ctrl.report_table_checksum(advert.addr, checksum) {
                                warn!("Checksum from {} not recorded: {}", advert.addr, e);
                            }
                        }
                    }
                    Uplink::Frame(bytes) => {
                        if let Err(e) = ctrl.on_packet(&bytes) {
                            debug!("Inbound frame rejected: {}", e);
                        }
                    }
                }
            }

            _ = status_ticker.tick() => {
                let status = ctrl.status();
                info!(
                    "Status at {} s: {:?}, {} live nodes, {} edges, {} routes",
                    clock.now() / 1_000,
                    status.phase,
                    status.live_nodes,
                    status.edges,
                    status.routes
                );
            }

            _ = &mut deadline => break,
        }
    }

    // Closing the radio channel stops the mesh task
    let stats = *ctrl.stats();
    let delivery = *ctrl.dissemination().stats();
    drop(ctrl);
    let mesh_stats = mesh_task.await?;

    info!("Simulated {} s", clock.now() / 1_000);
    info!("Controller: {:?}", stats);
    info!("Dissemination: {:?}", delivery);
    info!("Mesh: {:?}", mesh_stats);
    Ok(())
}
