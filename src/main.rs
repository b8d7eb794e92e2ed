//! bitmap-decode - decode images with buffer reuse and downsampling.
//!
//! This binary wires the buffer pool, decode pipeline and processed store
//! together and runs them over files on disk.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bitmap_decode::{
    cache::{MemoryProcessedStore, ProcessedImageEncoder},
    config::{Cli, Command, DecodeConfig, ProbeConfig},
    decode::{
        BoundsProbe, BufferPool, DataSource, DecodePipeline, DecodeRequest, DecodedImage,
        FileSource, ImageCrateCodec, RequestOptions, SizeCalculator,
    },
    DecodeError, DecodeService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Decode(config) => run_decode(config).await,
        Command::Probe(config) => run_probe(config),
    }
}

// =============================================================================
// Decode Command
// =============================================================================

async fn run_decode(config: DecodeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &config.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("Cannot create output directory {}: {}", dir.display(), e);
            return ExitCode::FAILURE;
        }
    }

    info!("Configuration:");
    if config.has_max_size() {
        info!("  Max size: {}x{}", config.max_width, config.max_height);
    }
    info!("  Format: {}", config.format.name());
    if config.no_pool {
        info!("  Buffer pool: disabled");
    } else {
        info!(
            "  Buffer pool: {} entries, {}MB",
            config.pool_entries,
            config.pool_bytes / (1024 * 1024)
        );
    }
    if config.processed_cache {
        info!(
            "  Processed cache: {}MB, JPEG quality {}",
            config.cache_capacity / (1024 * 1024),
            config.jpeg_quality
        );
    }

    let pool = Arc::new(BufferPool::with_limits(config.pool_bytes, config.pool_entries));
    let pipeline = DecodePipeline::new(Arc::clone(&pool))
        .with_size_calculator(SizeCalculator::with_max_pixels(config.max_pixels));
    let store = Arc::new(MemoryProcessedStore::with_capacity(config.cache_capacity));
    let service = Arc::new(
        DecodeService::with_store(pipeline, store)
            .with_encoder(ProcessedImageEncoder::with_quality(config.jpeg_quality)),
    );

    let options = config.to_request_options();
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let mut failures = 0usize;

    for pass in 1..=config.passes {
        info!(pass = pass, files = config.files.len(), "Starting pass");

        let mut tasks = JoinSet::new();
        for path in &config.files {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let service = Arc::clone(&service);
            let path = path.clone();
            let options = options.clone();
            let output_dir = config.output_dir.clone();

            tasks.spawn(async move {
                let ok = decode_file(&service, &path, options, output_dir.as_deref()).await;
                drop(permit);
                ok
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => {}
                Ok(false) => failures += 1,
                Err(e) => {
                    error!("Decode task failed: {}", e);
                    failures += 1;
                }
            }
        }
    }

    let stats = service.pool_stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        allocations = stats.allocations,
        evictions = stats.evictions,
        pooled_bytes = pool.size(),
        "Buffer pool"
    );
    if config.processed_cache {
        let (size, capacity, count) = service.cache_stats().await;
        info!(
            entries = count,
            bytes = size,
            capacity = capacity,
            "Processed cache"
        );
    }

    if failures > 0 {
        error!("{} decode(s) failed", failures);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Decode one file, print a summary line and hand the buffer back.
async fn decode_file(
    service: &DecodeService,
    path: &Path,
    options: RequestOptions,
    output_dir: Option<&Path>,
) -> bool {
    let uri = path.display().to_string();
    let request = DecodeRequest::with_options(uri.as_str(), options);
    let source: Arc<dyn DataSource> = Arc::new(FileSource::new(path));

    let response = match service.load(request, source).await {
        Ok(response) => response,
        Err(e) => {
            error!(path = %uri, "Failed to decode: {}", e);
            return false;
        }
    };

    let result = response.result;
    println!(
        "{}\t{}x{} -> {}x{}\tsample={}\trotation={}\t{}\t{}",
        uri,
        result.attributes.original_width,
        result.attributes.original_height,
        result.image.width(),
        result.image.height(),
        result.sample_size,
        result.attributes.orientation_degrees,
        result.strategy.name(),
        if response.cache_hit { "hit" } else { "miss" }
    );

    let mut ok = true;
    if let Some(dir) = output_dir {
        if let Err(e) = write_png(dir, path, &result.image) {
            error!(path = %uri, "Failed to write output: {}", e);
            ok = false;
        }
    }

    if result.image.buffer().is_pooled() {
        service.pool().release(result.image.into_buffer());
    }
    ok
}

fn write_png(dir: &Path, source: &Path, image: &DecodedImage) -> image::ImageResult<()> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let target: PathBuf = dir.join(format!("{}.png", stem));

    image::save_buffer_with_format(
        &target,
        image.pixels(),
        image.width(),
        image.height(),
        image.format(),
        image::ImageFormat::Png,
    )
}

// =============================================================================
// Probe Command
// =============================================================================

#[derive(Serialize)]
struct ProbeReport {
    path: String,
    #[serde(flatten)]
    bounds: Option<BoundsProbe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn run_probe(config: ProbeConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let codec = ImageCrateCodec::new();
    let mut failed = false;

    let reports: Vec<ProbeReport> = config
        .files
        .iter()
        .map(|path| {
            let source = FileSource::new(path);
            let probed = source
                .open_for_decode()
                .map_err(DecodeError::from)
                .and_then(|data| source.probe_bounds(&codec, &data));
            failed |= probed.is_err();
            ProbeReport {
                path: path.display().to_string(),
                error: probed.as_ref().err().map(|e| e.to_string()),
                bounds: probed.ok(),
            }
        })
        .collect();

    let output = if config.pretty {
        serde_json::to_string_pretty(&reports)
    } else {
        serde_json::to_string(&reports)
    };

    match output {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "bitmap_decode=debug"
    } else {
        "bitmap_decode=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
