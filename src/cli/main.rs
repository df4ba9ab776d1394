//! Wardrobe CLI tool
//!
//! Command-line interface for scanning garment photos into background-free
//! cutouts, storing them in the local wardrobe, and composing outfits.

use crate::{
    cache::{format_size, ModelCache},
    color,
    config::{EngineKind, ScanConfig},
    download::{validate_model_url, ModelFetcher},
    error::ClosetError,
    inference::create_segmenter_with_fetcher,
    models::{ModelSource, ModelSpec, ModelVariant, DEFAULT_MODEL_URL},
    processor::{GarmentProcessor, ScanResult},
    records::{BodySlot, Category, GarmentRecord, OutfitRecord},
    store::WardrobeStore,
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info as trace_info, trace};
use uuid::Uuid;

/// Horizontal rule used by the list-style commands
const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// File extensions considered scannable images
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];

/// Garment scanning and wardrobe CLI tool
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "closetkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use a custom wardrobe data directory
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Use a custom model cache directory
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan garment photos: cut out the garment and extract its color
    Scan(ScanArgs),

    /// Inspect and prune stored garments
    #[command(subcommand)]
    Garments(GarmentsCommand),

    /// Compose, inspect, and prune outfits
    #[command(subcommand)]
    Outfits(OutfitsCommand),

    /// List stored garments whose colors pair with the given one
    Suggest {
        /// Anchor garment id
        garment_id: Uuid,
    },

    /// Manage the model cache
    #[command(subcommand)]
    Models(ModelsCommand),
}

/// Arguments for the scan command
#[derive(Args)]
pub struct ScanArgs {
    /// Input image file or directory of images
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Segmentation engine
    #[arg(short, long, value_enum, default_value_t = EngineArg::Fast)]
    pub engine: EngineArg,

    /// Category to assign (top, bottom, dress, shoes, headwear, accessory, bag, other)
    #[arg(short, long)]
    pub category: Option<String>,

    /// Output file (single input) or directory (directory input) [default: next to each input]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Store the scan as a wardrobe garment
    #[arg(short, long)]
    pub save: bool,

    /// Recurse into subdirectories when INPUT is a directory
    #[arg(short, long)]
    pub recursive: bool,

    /// Model URL or path to local .onnx weights [default: bundled HuggingFace model]
    #[arg(short, long)]
    pub model: Option<String>,

    /// Model variant (fp16, fp32) [default: per engine]
    #[arg(long)]
    pub variant: Option<String>,
}

/// Wardrobe garment subcommands
#[derive(Subcommand)]
pub enum GarmentsCommand {
    /// List stored garments, newest first
    List,

    /// Re-run segmentation and color extraction on a stored garment
    Rescan {
        /// Garment id to rescan
        garment_id: Uuid,

        /// Segmentation engine
        #[arg(short, long, value_enum, default_value_t = EngineArg::Fast)]
        engine: EngineArg,
    },

    /// Remove a garment by id
    Remove {
        /// Garment id to remove
        garment_id: Uuid,
    },
}

/// Outfit subcommands
#[derive(Subcommand)]
pub enum OutfitsCommand {
    /// Compose an outfit from stored garments, at most one per body slot
    Create {
        /// Garment id for the headwear slot
        #[arg(long)]
        headwear: Option<Uuid>,

        /// Garment id for the top slot
        #[arg(long)]
        top: Option<Uuid>,

        /// Garment id for the bottom slot
        #[arg(long)]
        bottom: Option<Uuid>,

        /// Garment id for the shoes slot
        #[arg(long)]
        shoes: Option<Uuid>,

        /// Garment id for the accessory slot
        #[arg(long)]
        accessory: Option<Uuid>,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,
    },

    /// List stored outfits, newest first
    List,

    /// Remove an outfit by id
    Remove {
        /// Outfit id to remove
        outfit_id: Uuid,
    },
}

/// Model cache subcommands
#[derive(Subcommand)]
pub enum ModelsCommand {
    /// Download model weights into the cache
    Download {
        /// Model URL [default: the bundled HuggingFace model]
        #[arg(long)]
        url: Option<String>,

        /// Variant to fetch (fp16, fp32) [default: both]
        #[arg(long)]
        variant: Option<String>,

        /// Expected SHA-256 of the weight file (hex)
        #[arg(long, requires = "variant")]
        sha256: Option<String>,
    },

    /// List cached models
    List,

    /// Clear cached models
    Clear {
        /// Model id to clear [default: all]
        model_id: Option<String>,
    },

    /// Show the model cache directory
    Dir,
}

/// Segmentation engine choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineArg {
    /// Hardware-accelerated engine with on-demand session loading
    Fast,
    /// Pure-Rust engine, slower but free of native dependencies
    Quality,
}

impl std::fmt::Display for EngineArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Quality => write!(f, "quality"),
        }
    }
}

impl From<EngineArg> for EngineKind {
    fn from(value: EngineArg) -> Self {
        match value {
            EngineArg::Fast => Self::Fast,
            EngineArg::Quality => Self::Quality,
        }
    }
}

/// Main entry point for the CLI application
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose).context("Failed to initialize tracing")?;

    match &cli.command {
        Commands::Scan(args) => run_scan(&cli, args).await,
        Commands::Garments(command) => run_garments(&cli, command).await,
        Commands::Outfits(command) => run_outfits(&cli, command).await,
        Commands::Suggest { garment_id } => run_suggest(&cli, *garment_id).await,
        Commands::Models(command) => run_models(&cli, command).await,
    }
}

/// Initialize tracing based on verbosity level
fn init_tracing(verbose_count: u8) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbose_count {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose_count >= 2)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))?;

    match verbose_count {
        0 => {},
        1 => trace_info!("ℹ️  Info level: showing scan progress"),
        2 => debug!("🔧 Debug level: showing internal state and timings"),
        _ => trace!("🔍 Trace level: showing extremely detailed traces"),
    }

    Ok(())
}

/// Run the scan command against a file or a directory of files
async fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<()> {
    let config = build_scan_config(args).context("Invalid scan options")?;
    let fetcher = model_fetcher(cli)?;

    ensure_model_available(&fetcher, &config)
        .await
        .context("Failed to ensure model weights are available")?;

    let engine = create_segmenter_with_fetcher(&config, fetcher)
        .context("Failed to create segmentation engine")?;
    let processor = GarmentProcessor::with_engine(config, engine);

    let inputs = collect_inputs(&args.input, args.recursive)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    if inputs.is_empty() {
        bail!("No image files found under {}", args.input.display());
    }

    info!(
        "Scanning {} image(s) with the {} engine",
        inputs.len(),
        processor.config().engine
    );
    let start = Instant::now();

    match inputs.as_slice() {
        [single] => scan_single(cli, args, &processor, single).await?,
        _ => scan_batch(cli, args, &processor, &inputs).await?,
    }

    info!("Finished in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Convert scan arguments into an engine configuration
fn build_scan_config(args: &ScanArgs) -> Result<ScanConfig> {
    let mut builder = ScanConfig::builder().engine(args.engine.into());

    if let Some(category) = &args.category {
        builder = builder.default_category(category.parse::<Category>()?);
    }

    let variant = match &args.variant {
        Some(variant) => Some(variant.parse::<ModelVariant>()?),
        None => None,
    };

    let source = match &args.model {
        Some(model) if model.starts_with("http") => {
            validate_model_url(model).context("Invalid model URL")?;
            ModelSource::Downloaded(model.clone())
        },
        Some(model) => ModelSource::External(PathBuf::from(model)),
        None => ModelSource::Downloaded(String::new()),
    };

    builder = builder.model_spec(ModelSpec { source, variant });

    Ok(builder.build()?)
}

/// Ensure model weights are cached, auto-downloading them if needed
async fn ensure_model_available(fetcher: &ModelFetcher, config: &ScanConfig) -> Result<()> {
    if let ModelSource::Downloaded(url) = &config.model_spec.source {
        let url = if url.is_empty() {
            DEFAULT_MODEL_URL
        } else {
            url.as_str()
        };
        let model_id = ModelCache::url_to_model_id(url);
        let variant = match config.model_spec.variant {
            Some(variant) => variant,
            None => config.engine.default_variant(),
        };

        if fetcher.cache().has_variant(&model_id, variant) {
            return Ok(());
        }

        println!("📦 Model not cached. Downloading {model_id} ({variant})...");
        let bar = progress_bar(100)?;
        let sink = |percent: u8| bar.set_position(u64::from(percent));
        fetcher
            .fetch_variant(url, &model_id, variant, None, &sink)
            .await
            .context("Failed to download model weights")?;
        bar.finish_and_clear();
        println!("✅ Model ready");
    }

    Ok(())
}

/// Scan one file and write its cutout next to it or to the -o path
async fn scan_single(
    cli: &Cli,
    args: &ScanArgs,
    processor: &GarmentProcessor,
    input: &Path,
) -> Result<()> {
    let result = scan_file(processor, input).await?;
    if result.degraded {
        println!(
            "⚠️  {}: background removal failed, kept the full photo",
            input.display()
        );
    }

    let output_path = match &args.output {
        Some(path) => path.clone(),
        None => default_output_path(input),
    };

    let timings = result.timings;
    let category = result.category;
    let color = result.color.clone();

    if args.save {
        let store = open_store(cli)?;
        let record = result
            .into_garment_record(category)
            .context("Failed to build garment record")?;
        tokio::fs::write(&output_path, &record.image_bytes)
            .await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        store
            .put_garment(&record)
            .await
            .context("Failed to store garment")?;
        println!("✅ {} -> {}", input.display(), output_path.display());
        println!("   Color: {color}  Category: {category}");
        println!("📦 Saved garment {}", record.id);
    } else {
        let png = result.to_png_bytes().context("Failed to encode cutout")?;
        tokio::fs::write(&output_path, &png)
            .await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        println!("✅ {} -> {}", input.display(), output_path.display());
        println!("   Color: {color}  Category: {category}");
    }

    debug!(
        "Timings: decode {}ms, segmentation {}ms, color {}ms, total {}ms",
        timings.decode_ms, timings.segmentation_ms, timings.color_ms, timings.total_ms
    );
    Ok(())
}

/// Scan a directory of files, continuing past per-file failures
async fn scan_batch(
    cli: &Cli,
    args: &ScanArgs,
    processor: &GarmentProcessor,
    inputs: &[PathBuf],
) -> Result<()> {
    if let Some(output_dir) = &args.output {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    }

    let store = if args.save {
        Some(open_store(cli)?)
    } else {
        None
    };

    let bar = progress_bar(inputs.len() as u64)?;
    let mut scanned = 0usize;
    let mut failed = 0usize;

    for input in inputs {
        if let Some(name) = input.file_name().and_then(|n| n.to_str()) {
            bar.set_message(name.to_string());
        }

        let outcome = match scan_batch_entry(args, processor, store.as_ref(), input).await {
            Err(e) if is_transient(&e) => {
                debug!("Retrying {} after: {e:#}", input.display());
                scan_batch_entry(args, processor, store.as_ref(), input).await
            },
            outcome => outcome,
        };
        match outcome {
            Ok(()) => scanned += 1,
            Err(e) => {
                warn!("Skipping {}: {e:#}", input.display());
                failed += 1;
            },
        }
        bar.inc(1);
    }

    bar.finish_and_clear();
    if failed > 0 {
        println!("⚠️  Scanned {scanned} image(s), {failed} failed");
    } else {
        println!("✅ Scanned {scanned} image(s)");
    }
    Ok(())
}

/// Scan one batch member and write (and optionally store) its cutout
async fn scan_batch_entry(
    args: &ScanArgs,
    processor: &GarmentProcessor,
    store: Option<&WardrobeStore>,
    input: &Path,
) -> Result<()> {
    let result = scan_file(processor, input).await?;
    if result.degraded {
        warn!(
            "Background removal failed for {}; keeping the original photo",
            input.display()
        );
    }

    let output_path = match &args.output {
        Some(dir) => dir.join(default_output_name(input)),
        None => default_output_path(input),
    };
    let category = result.category;

    match store {
        Some(store) => {
            let record = result
                .into_garment_record(category)
                .context("Failed to build garment record")?;
            tokio::fs::write(&output_path, &record.image_bytes)
                .await
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            store
                .put_garment(&record)
                .await
                .context("Failed to store garment")?;
        },
        None => {
            let png = result.to_png_bytes().context("Failed to encode cutout")?;
            tokio::fs::write(&output_path, &png)
                .await
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
        },
    }

    Ok(())
}

/// True when a failed batch entry is worth one more attempt
fn is_transient(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ClosetError>()
        .is_some_and(ClosetError::is_retryable)
}

/// Read and scan one input file
async fn scan_file(processor: &GarmentProcessor, path: &Path) -> Result<ScanResult> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    processor
        .scan_bytes(&bytes)
        .await
        .with_context(|| format!("Failed to scan {}", path.display()))
}

/// Expand the input argument into a list of image files
fn collect_inputs(input: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("Input path does not exist: {}", input.display());
    }

    let mut files = Vec::new();
    if recursive {
        for entry in walkdir::WalkDir::new(input) {
            let entry = entry?;
            if entry.file_type().is_file() && is_image_file(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    } else {
        for entry in std::fs::read_dir(input)? {
            let entry = entry?;
            if entry.file_type()?.is_file() && is_image_file(&entry.path()) {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Check if file is an image based on extension
fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Cutout file name derived from the input file name
fn default_output_name(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    PathBuf::from(format!("{}_cutout.png", stem.to_string_lossy()))
}

/// Default cutout path: next to the input file
fn default_output_path(input: &Path) -> PathBuf {
    let dir = input.parent().unwrap_or(Path::new("."));
    dir.join(default_output_name(input))
}

/// Run a garments subcommand
async fn run_garments(cli: &Cli, command: &GarmentsCommand) -> Result<()> {
    let store = open_store(cli)?;

    match command {
        GarmentsCommand::List => {
            let garments = store.garments().await.context("Failed to list garments")?;

            println!("👕 Stored Garments");
            println!("{RULE}");

            if garments.is_empty() {
                println!("No garments stored yet.");
                println!("\n💡 Scan one into the wardrobe with:");
                println!("  closetkit scan photo.jpg --save");
                return Ok(());
            }

            for garment in garments {
                println!("📁 {}", garment.id);
                println!(
                    "  └─ Category: {} ({} slot)",
                    garment.category,
                    garment.category.body_slot()
                );
                println!("  └─ Color: {}", garment.color);
                println!("  └─ Added: {}", garment.created_at.format("%Y-%m-%d %H:%M"));
                println!(
                    "  └─ Image: {}",
                    format_size(garment.image_bytes.len() as u64)
                );
                println!();
            }
        },
        GarmentsCommand::Rescan { garment_id, engine } => {
            rescan_garment(cli, &store, *garment_id, *engine).await?;
        },
        GarmentsCommand::Remove { garment_id } => {
            if store
                .delete_garment(*garment_id)
                .await
                .context("Failed to remove garment")?
            {
                println!("🗑️  Removed garment {garment_id}");
            } else {
                println!("⚠️  Garment {garment_id} not found");
            }
        },
    }

    Ok(())
}

/// Re-run the scan pipeline on a stored garment's photo
///
/// Stored cutouts keep the original RGB under the cleared alpha, so the
/// full photo is still there to segment again, with a newer model or the
/// other engine. A degraded rescan leaves the stored record untouched.
async fn rescan_garment(
    cli: &Cli,
    store: &WardrobeStore,
    garment_id: Uuid,
    engine: EngineArg,
) -> Result<()> {
    let mut garment = store
        .get_garment(garment_id)
        .await
        .context("Failed to read garment")?
        .with_context(|| format!("No garment with id {garment_id}"))?;

    let config = ScanConfig::builder().engine(engine.into()).build()?;
    let fetcher = model_fetcher(cli)?;
    ensure_model_available(&fetcher, &config)
        .await
        .context("Failed to ensure model weights are available")?;
    let segmenter = create_segmenter_with_fetcher(&config, fetcher)
        .context("Failed to create segmentation engine")?;
    let processor = GarmentProcessor::with_engine(config, segmenter);

    let result = processor
        .scan_bytes(&garment.image_bytes)
        .await
        .context("Failed to rescan garment")?;
    if result.degraded {
        println!("⚠️  Rescan could not isolate the garment; keeping the stored record");
        return Ok(());
    }

    let png = result.to_png_bytes().context("Failed to encode cutout")?;
    garment.reprocess(png, result.color);
    store
        .put_garment(&garment)
        .await
        .context("Failed to store garment")?;

    println!("✅ Rescanned {}: {}", garment.id, garment.color);
    Ok(())
}

/// Run an outfits subcommand
async fn run_outfits(cli: &Cli, command: &OutfitsCommand) -> Result<()> {
    let store = open_store(cli)?;

    match command {
        OutfitsCommand::Create {
            headwear,
            top,
            bottom,
            shoes,
            accessory,
            name,
            description,
        } => {
            let selections = [
                (BodySlot::Headwear, headwear),
                (BodySlot::Top, top),
                (BodySlot::Bottom, bottom),
                (BodySlot::Shoes, shoes),
                (BodySlot::Accessory, accessory),
            ];

            let mut chosen: Vec<(BodySlot, GarmentRecord)> = Vec::new();
            for (slot, id) in selections {
                let Some(id) = id else { continue };
                let garment = store
                    .get_garment(*id)
                    .await
                    .context("Failed to read garment")?
                    .with_context(|| format!("No garment with id {id}"))?;
                if garment.category.body_slot() != slot {
                    bail!(
                        "Garment {} is a {} and belongs in the {} slot, not {}",
                        id,
                        garment.category,
                        garment.category.body_slot(),
                        slot
                    );
                }
                chosen.push((slot, garment));
            }

            let mut builder = OutfitRecord::builder();
            for (slot, garment) in &chosen {
                builder = builder.slot(*slot, garment.id);
            }
            if let Some(name) = name {
                builder = builder.name(name.clone());
            }
            if let Some(description) = description {
                builder = builder.description(description.clone());
            }

            let outfit = builder.build()?;
            store
                .put_outfit(&outfit)
                .await
                .context("Failed to store outfit")?;

            println!("✅ Created outfit {}", outfit.id);
            for (slot, garment) in &chosen {
                println!("  └─ {}: {} ({})", slot, garment.id, garment.color);
            }
        },
        OutfitsCommand::List => {
            let outfits = store.outfits().await.context("Failed to list outfits")?;

            println!("🧥 Stored Outfits");
            println!("{RULE}");

            if outfits.is_empty() {
                println!("No outfits stored yet.");
                println!("\n💡 Compose one with:");
                println!("  closetkit outfits create --top <ID> --bottom <ID>");
                return Ok(());
            }

            for outfit in outfits {
                println!("📁 {}", outfit.id);
                if let Some(name) = &outfit.name {
                    println!("  └─ Name: {name}");
                }
                if let Some(description) = &outfit.description {
                    println!("  └─ Description: {description}");
                }

                let garments = store
                    .resolve_garments(&outfit)
                    .await
                    .context("Failed to resolve outfit garments")?;
                for garment in &garments {
                    println!(
                        "  └─ {}: {} ({})",
                        garment.category.body_slot(),
                        garment.id,
                        garment.color
                    );
                }
                let missing = outfit.garment_ids.len().saturating_sub(garments.len());
                if missing > 0 {
                    println!("  └─ ⚠️  {missing} garment(s) no longer in the wardrobe");
                }
                println!(
                    "  └─ Created: {}",
                    outfit.created_at.format("%Y-%m-%d %H:%M")
                );
                println!();
            }
        },
        OutfitsCommand::Remove { outfit_id } => {
            if store
                .delete_outfit(*outfit_id)
                .await
                .context("Failed to remove outfit")?
            {
                println!("🗑️  Removed outfit {outfit_id}");
            } else {
                println!("⚠️  Outfit {outfit_id} not found");
            }
        },
    }

    Ok(())
}

/// List stored garments whose colors pair with the anchor garment
async fn run_suggest(cli: &Cli, garment_id: Uuid) -> Result<()> {
    let store = open_store(cli)?;
    let anchor = store
        .get_garment(garment_id)
        .await
        .context("Failed to read garment")?
        .with_context(|| format!("No garment with id {garment_id}"))?;

    let garments = store.garments().await.context("Failed to list garments")?;

    println!(
        "🎨 Pairings for {} ({} {})",
        anchor.id, anchor.color, anchor.category
    );
    println!("{RULE}");

    let mut by_slot: BTreeMap<BodySlot, Vec<&GarmentRecord>> = BTreeMap::new();
    for garment in &garments {
        if garment.id == anchor.id {
            continue;
        }
        if color::is_compatible(&anchor.color, &garment.color) {
            by_slot
                .entry(garment.category.body_slot())
                .or_default()
                .push(garment);
        }
    }

    if by_slot.is_empty() {
        println!("No compatible garments stored yet.");
        println!("\n💡 Scan more of the wardrobe with:");
        println!("  closetkit scan photos/ --save");
        return Ok(());
    }

    for slot in BodySlot::all() {
        if let Some(matches) = by_slot.get(&slot) {
            println!("{slot}:");
            for garment in matches {
                println!("  • {} {} ({})", garment.id, garment.color, garment.category);
            }
        }
    }

    Ok(())
}

/// Run a models subcommand
async fn run_models(cli: &Cli, command: &ModelsCommand) -> Result<()> {
    match command {
        ModelsCommand::Download {
            url,
            variant,
            sha256,
        } => download_model(cli, url.as_deref(), variant.as_deref(), sha256.as_deref()).await,
        ModelsCommand::List => list_cached_models(cli),
        ModelsCommand::Clear { model_id } => clear_cache_models(cli, model_id.as_deref()),
        ModelsCommand::Dir => show_current_cache_dir(cli),
    }
}

/// Download model weights without scanning anything
async fn download_model(
    cli: &Cli,
    url: Option<&str>,
    variant: Option<&str>,
    sha256: Option<&str>,
) -> Result<()> {
    let url = match url {
        Some(url) if url.starts_with("http") => url.to_string(),
        Some(_) => bail!("models download requires a URL, e.g. {DEFAULT_MODEL_URL}"),
        None => DEFAULT_MODEL_URL.to_string(),
    };
    validate_model_url(&url).context("Invalid model URL")?;

    let variants = match variant {
        Some(variant) => vec![variant.parse::<ModelVariant>()?],
        None => vec![ModelVariant::Fp16, ModelVariant::Fp32],
    };

    let fetcher = model_fetcher(cli)?;
    let model_id = ModelCache::url_to_model_id(&url);
    println!("📦 Downloading model: {url}");

    for variant in variants {
        if fetcher.cache().has_variant(&model_id, variant) {
            println!("   {variant} already cached");
            continue;
        }

        let bar = progress_bar(100)?;
        bar.set_message(variant.to_string());
        let sink = |percent: u8| bar.set_position(u64::from(percent));
        fetcher
            .fetch_variant(&url, &model_id, variant, sha256, &sink)
            .await
            .with_context(|| format!("Failed to download the {variant} variant"))?;
        bar.finish_and_clear();
        println!("   {variant} downloaded");
    }

    println!("✅ Model ready: {model_id}");
    println!(
        "   Cache location: {}",
        fetcher.cache().model_path(&model_id).display()
    );
    println!("\n💡 Scans now run without a network:");
    println!("   closetkit scan photo.jpg");
    Ok(())
}

/// List cached models with variants and sizes
fn list_cached_models(cli: &Cli) -> Result<()> {
    let cache = model_cache(cli)?;
    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    println!("📦 Cached Models");
    println!("{RULE}");

    if models.is_empty() {
        println!("No cached models found.");
        println!("\n💡 To download the default model:");
        println!("  closetkit models download");
        return Ok(());
    }

    for model in models {
        println!("📁 {}", model.model_id);
        println!("  └─ Cache location: {}", model.path.display());
        if !model.variants.is_empty() {
            let variants: Vec<String> = model.variants.iter().map(ToString::to_string).collect();
            println!("  └─ Variants: {}", variants.join(", "));
        }
        if let Some(url) = &model.source_url {
            println!("  └─ Source: {url}");
        }
        if model.size_bytes > 0 {
            println!("  └─ Size: {}", format_size(model.size_bytes));
        }
        println!();
    }

    Ok(())
}

/// Clear one cached model, or the whole cache
fn clear_cache_models(cli: &Cli, model_id: Option<&str>) -> Result<()> {
    let cache = model_cache(cli)?;

    if let Some(model_id) = model_id {
        println!("🗑️  Clearing model: {model_id}");
        if cache
            .clear_model(model_id)
            .context("Failed to clear model")?
        {
            println!("✅ Removed {model_id}");
        } else {
            println!("⚠️  Model '{model_id}' not found in cache");
            println!("   Use 'closetkit models list' to see cached models");
        }
    } else {
        println!("🗑️  Clearing entire model cache...");
        let removed = cache
            .clear_all_models()
            .context("Failed to clear model cache")?;
        if removed.is_empty() {
            println!("💡 Cache was already empty");
        } else {
            println!("✅ Removed {} model(s):", removed.len());
            for model_id in &removed {
                println!("   • {model_id}");
            }
        }
    }

    println!("📁 Cache directory: {}", cache.current_cache_dir().display());
    Ok(())
}

/// Show the active model cache directory
fn show_current_cache_dir(cli: &Cli) -> Result<()> {
    let cache = model_cache(cli)?;
    let dir = cache.current_cache_dir();
    println!("📁 Model cache directory: {}", dir.display());
    if !dir.exists() {
        println!("⚠️  Directory does not exist yet (created on first download)");
    }
    Ok(())
}

/// Open the wardrobe store, honoring --data-dir
fn open_store(cli: &Cli) -> Result<WardrobeStore> {
    match &cli.data_dir {
        Some(dir) => WardrobeStore::open(dir),
        None => WardrobeStore::open_default(),
    }
    .context("Failed to open wardrobe store")
}

/// Build the model cache, honoring --cache-dir
fn model_cache(cli: &Cli) -> Result<ModelCache> {
    match &cli.cache_dir {
        Some(dir) => ModelCache::with_custom_cache_dir(dir),
        None => ModelCache::new(),
    }
    .context("Failed to initialize model cache")
}

/// Build a model fetcher backed by the configured cache
fn model_fetcher(cli: &Cli) -> Result<ModelFetcher> {
    ModelFetcher::with_cache(model_cache(cli)?).context("Failed to create model fetcher")
}

/// Progress bar in the house style
fn progress_bar(len: u64) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::try_parse_from([
            "closetkit",
            "scan",
            "photo.jpg",
            "--engine",
            "quality",
            "--category",
            "top",
            "--save",
        ])
        .unwrap();

        match &cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.input, PathBuf::from("photo.jpg"));
                assert_eq!(args.engine, EngineArg::Quality);
                assert_eq!(args.category.as_deref(), Some("top"));
                assert!(args.save);
                assert!(!args.recursive);
            },
            _ => panic!("expected scan command"),
        }
    }

    #[test]
    fn test_cli_parses_outfit_create() {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let cli = Cli::try_parse_from([
            "closetkit",
            "outfits",
            "create",
            "--top",
            id_str.as_str(),
            "--name",
            "monday",
        ])
        .unwrap();

        match &cli.command {
            Commands::Outfits(OutfitsCommand::Create { top, name, .. }) => {
                assert_eq!(*top, Some(id));
                assert_eq!(name.as_deref(), Some("monday"));
            },
            _ => panic!("expected outfits create command"),
        }
    }

    #[test]
    fn test_cli_parses_garments_rescan() {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let cli = Cli::try_parse_from([
            "closetkit",
            "garments",
            "rescan",
            id_str.as_str(),
            "--engine",
            "quality",
        ])
        .unwrap();

        match &cli.command {
            Commands::Garments(GarmentsCommand::Rescan { garment_id, engine }) => {
                assert_eq!(*garment_id, id);
                assert_eq!(*engine, EngineArg::Quality);
            },
            _ => panic!("expected garments rescan command"),
        }
    }

    #[test]
    fn test_cli_rejects_sha256_without_variant() {
        let result = Cli::try_parse_from([
            "closetkit",
            "models",
            "download",
            "--sha256",
            "deadbeef",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_scan_config_rejects_unknown_category() {
        let cli = Cli::try_parse_from([
            "closetkit",
            "scan",
            "photo.jpg",
            "--category",
            "spacesuit",
        ])
        .unwrap();

        let Commands::Scan(args) = &cli.command else {
            panic!("expected scan command");
        };
        assert!(build_scan_config(args).is_err());
    }

    #[test]
    fn test_scan_config_maps_local_model_path() {
        let cli =
            Cli::try_parse_from(["closetkit", "scan", "photo.jpg", "--model", "weights.onnx"])
                .unwrap();

        let Commands::Scan(args) = &cli.command else {
            panic!("expected scan command");
        };
        let config = build_scan_config(args).unwrap();
        assert_eq!(
            config.model_spec.source,
            ModelSource::External(PathBuf::from("weights.onnx"))
        );
    }

    #[test]
    fn test_default_output_path_sits_next_to_input() {
        let path = default_output_path(Path::new("/closet/jacket.jpg"));
        assert_eq!(path, PathBuf::from("/closet/jacket_cutout.png"));
    }

    #[test]
    fn test_is_image_file_filters_extensions() {
        assert!(is_image_file(Path::new("a.JPG")));
        assert!(is_image_file(Path::new("b.png")));
        assert!(!is_image_file(Path::new("c.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_transient_failures_qualify_for_one_retry() {
        let transient = anyhow::Error::new(ClosetError::network("connection reset"))
            .context("Failed to scan photo.jpg");
        assert!(is_transient(&transient));

        let permanent = anyhow::Error::new(ClosetError::decode("not an image"))
            .context("Failed to scan photo.jpg");
        assert!(!is_transient(&permanent));
    }
}
