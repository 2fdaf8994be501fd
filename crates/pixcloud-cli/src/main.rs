use clap::{Parser, Subcommand, ValueEnum};
use pixcloud_core::host::{ComputationHost, Request, Response};
use pixcloud_core::layout::{place, LayoutMode, Position};
use pixcloud_core::{extract, logging, AtlasConfig, ConfigError, FeatureVariant, Item, ReduceConfig};
use pixcloud_core::{TsneConfig, UmapConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pixcloud")]
#[command(about = "Lay out pixel drawings so similar ones cluster together")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute a full layout for an item set
    Layout {
        /// JSON array of {id, pixels, createdAt}
        #[arg(short, long)]
        input: PathBuf,

        /// Atlas config JSON (defaults apply to missing fields)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the projector
        #[arg(short, long, value_enum)]
        algorithm: Option<Algorithm>,

        /// Override the layout mode
        #[arg(short, long)]
        mode: Option<LayoutMode>,

        /// Write {id: {x, y}} here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print feature vectors for an item set
    Features {
        #[arg(short, long)]
        input: PathBuf,

        /// Atlas config JSON; only its feature weights are used
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, default_value = "enhanced")]
        variant: FeatureVariant,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Algorithm {
    Umap,
    Tsne,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: pixcloud panicked");
        eprintln!(
            "  Location: {}",
            panic_info
                .location()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        eprintln!(
            "  Message: {}",
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .unwrap_or(&"<no message>")
        );
    }));

    let args = Args::parse();
    logging::init_with_filter(logging::level_filter(&args.log_level));

    match args.command {
        Command::Layout {
            input,
            config,
            algorithm,
            mode,
            output,
        } => layout(&input, config.as_deref(), algorithm, mode, output.as_deref()),
        Command::Features {
            input,
            config,
            variant,
        } => features(&input, config.as_deref(), variant),
    }
}

fn load_config(path: Option<&Path>) -> Result<AtlasConfig, ConfigError> {
    match path {
        Some(path) => {
            let config = AtlasConfig::from_file(path)?;
            debug!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(AtlasConfig::default()),
    }
}

fn read_items(path: &Path) -> Result<Vec<Item>, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let items: Vec<Item> = serde_json::from_str(&json)
        .map_err(|e| format!("invalid items in {}: {}", path.display(), e))?;
    info!("Loaded {} items from {}", items.len(), path.display());
    Ok(items)
}

fn write_json(path: Option<&Path>, json: &str) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            std::fs::write(path, json)
                .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn layout(
    input: &Path,
    config_path: Option<&Path>,
    algorithm: Option<Algorithm>,
    mode: Option<LayoutMode>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;

    // Keep the file's options when it already selects the requested algorithm
    match (algorithm, &config.reduce) {
        (Some(Algorithm::Umap), ReduceConfig::Tsne(_)) => {
            config.reduce = ReduceConfig::Umap(UmapConfig::default())
        }
        (Some(Algorithm::Tsne), ReduceConfig::Umap(_)) => {
            config.reduce = ReduceConfig::Tsne(TsneConfig::default())
        }
        _ => {}
    }
    if let Some(mode) = mode {
        config.mode = mode;
    }

    let items = read_items(input)?;
    let variant = config.reduce.feature_variant();
    let vectors: Vec<Vec<f64>> = items
        .iter()
        .map(|item| extract(&item.pixels, variant, &config.weights))
        .collect();
    debug!("Extracted {:?} features ({} dims)", variant, variant.dims());

    let start = Instant::now();
    let mut host = ComputationHost::spawn()?;
    let request = host.submit(Request {
        vectors,
        config: config.reduce.clone(),
    })?;
    info!("Running {} on {} items", config.reduce.name(), items.len());

    let embedding = loop {
        let event = host.recv()?;
        if event.request != request {
            continue;
        }
        match event.response {
            Response::Progress {
                iteration,
                total_iterations,
            } => info!("  {}/{}", iteration, total_iterations),
            Response::Done {
                embeddings,
                iterations,
                fallback,
            } => {
                if fallback {
                    warn!("Reduction failed, using a random layout");
                }
                info!(
                    "{} complete: {} points, {} iterations in {}ms",
                    config.reduce.name(),
                    embeddings.len(),
                    iterations,
                    start.elapsed().as_millis()
                );
                break embeddings;
            }
        }
    };

    let positions: BTreeMap<String, Position> = place(
        &items,
        &embedding,
        config.mode,
        &config.layout,
        chrono::Utc::now(),
    )
    .into_iter()
    .collect();

    write_json(output, &serde_json::to_string_pretty(&positions)?)
}

fn features(
    input: &Path,
    config_path: Option<&Path>,
    variant: FeatureVariant,
) -> Result<(), Box<dyn std::error::Error>> {
    let weights = load_config(config_path)?.weights;
    let items = read_items(input)?;
    let vectors: BTreeMap<&str, Vec<f64>> = items
        .iter()
        .map(|item| (item.id.as_str(), extract(&item.pixels, variant, &weights)))
        .collect();
    write_json(None, &serde_json::to_string(&vectors)?)
}
