use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chord_ring::{Chord, Node, RingPosition};

use clap::Parser;

use tracing::{info, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on, others should use it to join through this node
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,
    /// Port to listen on
    #[arg(short, long, default_value_t = 0)]
    port: u16,
    /// Ring width in bits
    #[arg(long, default_value_t = 32)]
    bits: u8,
    /// Address of a node to join through, whose id is derived from this address
    #[arg(short, long)]
    bootstrap: Option<SocketAddr>,
    /// Ring position to look up every status update
    #[arg(short, long)]
    lookup: Option<u32>,
    /// Seconds between status updates
    #[arg(long, default_value_t = 10)]
    interval: u64,
    /// Log every message
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::TRACE
        } else {
            Level::DEBUG
        })
        .with_thread_names(true)
        .init();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    let mut builder = Chord::builder();
    builder.bits(cli.bits).bind_address(cli.bind).port(cli.port);

    if let Some(bootstrap) = cli.bootstrap {
        builder.bootstrap(Node::from_address(bootstrap));
    }

    let mut chord = builder.build().expect("Failed to start Chord node");

    let info = chord.info().expect("Chord node stopped");
    info!(
        id = %info.id(),
        address = %info.local_addr(),
        position = %info.position(),
        "Chord node is running! Press Ctrl+C to stop."
    );

    match chord.joined() {
        Ok(report) => info!(?report, "Joined"),
        Err(error) => info!(%error, "Running alone"),
    }

    let mut last_update = Instant::now();

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));

        if last_update.elapsed() < Duration::from_secs(cli.interval) {
            continue;
        }
        last_update = Instant::now();

        let Ok(info) = chord.info() else {
            break;
        };

        info!(
            successor = ?info.successor().map(|n| n.address),
            predecessor = ?info.predecessor().map(|n| n.address),
            live_wedges = info.live_wedges(),
            cycles = info.stabilization_cycles(),
            outstanding = info.outstanding_rpcs(),
            average_hops = info.lookups().average_hops(),
            "=== Chord Node Status ==="
        );

        if let Some(position) = cli.lookup {
            let start = Instant::now();

            match chord.find_successor(RingPosition(position)) {
                Ok(response) => info!(
                    position,
                    successor = ?response.successor.address,
                    hops = response.hops(),
                    elapsed = ?start.elapsed(),
                    "Lookup done"
                ),
                Err(error) => info!(position, %error, "Lookup failed"),
            }
        }
    }

    info!("Shutting down..");
    chord.shutdown();
}
