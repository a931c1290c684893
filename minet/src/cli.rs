//! Parses the command line arguments.
//!
//! Basic usage for running the fragmentation simulation with logging on:
//!
//! ```cargo run -- fragmentation --log```

use crate::simulations;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Stores the different command line arguments.
#[derive(Parser)]
#[command(version, about = "Simulates a small internet of routers")]
struct Args {
    /// The simulation to run.
    #[arg(value_enum, default_value_t = Sim::Forwarding)]
    sim: Sim,
    /// Number of routers, for simulations whose topology is sized by it.
    #[arg(short, long, default_value_t = 3)]
    routers: usize,
    /// Track and decrement TTL in the forwarding simulation.
    #[arg(long)]
    ttl: bool,
    /// How long a path-vector router listens without news before it
    /// considers its routes converged, in milliseconds.
    #[arg(short, long, default_value_t = 1000)]
    quiescence_ms: u64,
    /// Directory routing tables are read from and written into.
    #[arg(short, long)]
    tables: Option<PathBuf>,
    /// Logging flag. Used to turn logging on or off.
    #[arg(short, long)]
    log: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Sim {
    /// Static forwarding along a chain of routers.
    Forwarding,
    /// Rotating traffic across parallel next hops.
    RoundRobin,
    /// A large message fragmented across links with shrinking MTUs.
    Fragmentation,
    /// Path-vector route discovery over a line topology.
    PathVectorLine,
    /// Path-vector route discovery over a ring topology.
    PathVectorRing,
    /// Path-vector discovery, then a fresh run seeded from the saved tables.
    PathVectorReload,
}

/// Parses command line arguments and runs the chosen simulation.
pub async fn run_from_arguments() {
    let args = Args::parse();
    if args.log {
        initialize_logging();
    }
    let quiescence = Duration::from_millis(args.quiescence_ms);
    match args.sim {
        Sim::Forwarding => {
            simulations::forwarding(args.routers, args.ttl, args.tables.as_deref()).await
        }
        Sim::RoundRobin => simulations::round_robin().await,
        Sim::Fragmentation => simulations::fragmentation().await,
        Sim::PathVectorLine => {
            simulations::path_vector_line(args.routers, quiescence, args.tables).await
        }
        Sim::PathVectorRing => simulations::path_vector_ring(args.routers, quiescence).await,
        Sim::PathVectorReload => {
            let dir = args
                .tables
                .unwrap_or_else(|| std::env::temp_dir().join("minet_tables"));
            simulations::path_vector_reload(quiescence, &dir).await
        }
    }
}

/// Initializes tracing. Only should be called once when the sim starts.
/// Honors `RUST_LOG` and defaults to `info` otherwise.
fn initialize_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
