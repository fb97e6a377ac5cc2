use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use fastiso::{load_graph, weighting_from_name, GraphFile};
use fastiso_common::FastIsochroneConfig;
use fastiso_routing::{FastIsochroneIndex, Preparation, QueryMethod};

#[derive(Parser)]
#[command(name = "fastiso")]
#[command(about = "Fast isochrones over partitioned road graphs", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of the prepared stores (overrides the configuration)
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or reuse) the eccentricity and border distance stores
    Prepare {
        /// Graph file with cell assignment
        graph: PathBuf,
        /// Weighting: fastest or shortest
        #[arg(short, long, default_value = "fastest")]
        weighting: String,
        /// Vehicle profile
        #[arg(short, long, default_value = "car")]
        profile: String,
    },
    /// Nodes reachable from a source within a budget
    Isochrone {
        /// Graph file with cell assignment
        graph: PathBuf,
        /// Source node id
        #[arg(long)]
        source: u32,
        /// Budget in weighting units (seconds for fastest, meters for shortest)
        #[arg(long)]
        budget: f64,
        #[arg(short, long, default_value = "fastest")]
        weighting: String,
        #[arg(short, long, default_value = "car")]
        profile: String,
        /// Print every reachable node
        #[arg(long)]
        list: bool,
    },
    /// Summarize the prepared stores of a weighting
    Inspect {
        /// Graph file with cell assignment
        graph: PathBuf,
        #[arg(short, long, default_value = "fastest")]
        weighting: String,
        #[arg(short, long, default_value = "car")]
        profile: String,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "fastiso=debug,fastiso_routing=debug,fastiso_io=debug".into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,fastiso=info,fastiso_routing=info".into())
    };
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(path: Option<&Path>, storage_dir: Option<PathBuf>) -> Result<FastIsochroneConfig> {
    let mut config = match path {
        Some(path) => FastIsochroneConfig::from_file(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => FastIsochroneConfig::default(),
    };
    if let Some(dir) = storage_dir {
        config.storage_dir = dir;
    }
    config.validate()?;
    Ok(config)
}

fn load(path: &Path) -> Result<GraphFile> {
    let start = Instant::now();
    let file = load_graph(path)?;
    info!(
        path = %path.display(),
        nodes = file.graph.n_nodes(),
        arcs = file.graph.n_edges(),
        cells = file.partition.n_cells(),
        border_nodes = file.partition.border_node_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "graph loaded"
    );
    Ok(file)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);
    let config = load_config(cli.config.as_deref(), cli.storage_dir)?;

    match cli.command {
        Commands::Prepare {
            graph,
            weighting,
            profile,
        } => {
            let weighting = weighting_from_name(&weighting, &profile)?;
            let file = load(&graph)?;
            println!(
                "Graph: {} nodes, {} arcs, {} cells, {} border nodes",
                file.graph.n_nodes(),
                file.graph.n_edges(),
                file.partition.n_cells(),
                file.partition.border_node_count()
            );

            let start = Instant::now();
            let prep = Preparation::new(&file.graph, &file.partition, &config)?;
            let (distances, eccentricities) = prep
                .run(weighting.as_ref())
                .with_context(|| format!("preparation failed for {}", weighting.descriptor()))?;
            println!("Prepared in {:.2}s", start.elapsed().as_secs_f64());
            println!("  {}", distances.path().display());
            println!("  {}", eccentricities.path().display());
        }
        Commands::Isochrone {
            graph,
            source,
            budget,
            weighting,
            profile,
            list,
        } => {
            let weighting = weighting_from_name(&weighting, &profile)?;
            let file = load(&graph)?;
            let index = FastIsochroneIndex::open(config, &[weighting.as_ref()]);

            let start = Instant::now();
            let iso = index.isochrone(
                &file.graph,
                &file.partition,
                weighting.as_ref(),
                source,
                budget,
            )?;
            let elapsed = start.elapsed();
            info!(
                weighting = %weighting.descriptor(),
                source,
                budget,
                method = ?iso.method,
                elapsed_us = elapsed.as_micros() as u64,
                "isochrone answered"
            );

            let method = match iso.method {
                QueryMethod::Fast => "fast",
                QueryMethod::Exact => "exact",
            };
            let nodes = iso.reachable.node_ids(&file.partition);
            println!(
                "{} nodes reachable from {source} within {budget} ({method}, {:.3}ms)",
                nodes.len(),
                elapsed.as_secs_f64() * 1000.0
            );
            if iso.method == QueryMethod::Fast {
                let stats = &iso.reachable.stats;
                println!(
                    "  bulk cells: {}, active cells: {}, border nodes settled: {}",
                    stats.bulk_cells, stats.active_cells, stats.border_nodes_settled
                );
            }
            if list {
                for node in nodes {
                    match iso.reachable.distance(node) {
                        Some(d) => println!("{node}\t{d}"),
                        None => println!("{node}\t-"),
                    }
                }
            }
        }
        Commands::Inspect {
            graph,
            weighting,
            profile,
        } => {
            let weighting = weighting_from_name(&weighting, &profile)?;
            let file = load(&graph)?;
            let index = FastIsochroneIndex::open(config, &[weighting.as_ref()]);
            let (distances, eccentricities) = index
                .stores_for(weighting.as_ref())
                .with_context(|| format!("no prepared stores for {}", weighting.descriptor()))?;

            println!("{}", distances.path().display());
            println!(
                "  border nodes: {}, bytes used: {}",
                distances.border_node_count(),
                distances.used_bytes()
            );
            println!("{}", eccentricities.path().display());

            for cell in file.partition.all_cell_ids() {
                let border = file.partition.border_nodes_of_cell(cell);
                let mut fully = 0;
                let mut max_ecc = 0;
                for &node in &border {
                    if eccentricities.get_fully_reachable(node)? {
                        fully += 1;
                    }
                    max_ecc = max_ecc.max(eccentricities.get_eccentricity(node)?);
                }
                println!(
                    "  cell {cell}: {} nodes, {} border, {fully} fully reachable, max eccentricity {max_ecc}",
                    file.partition.nodes_of_cell(cell).len(),
                    border.len()
                );
            }
        }
    }

    Ok(())
}
