//! Command-line interface for trail-camera analysis and playback
//!
//! `analyze` writes the JSON batch artifact, `serve` runs the streaming and
//! results server over it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};
use trapcam_scan::{
    init_tracing, optimize_for_web, video_info, AnalysisBatch, AnalyzerConfig, BatchSummary, DetectorKind,
    ServerConfig, VideoAnalyzer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect wildlife in trail-camera videos")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a video file or every video in a directory
    Analyze(AnalyzeArgs),
    /// Serve videos, thumbnails and analysis results over HTTP
    Serve(ServeArgs),
    /// Print video metadata
    Info {
        path: PathBuf,
    },
    /// Re-encode a video for browser playback (requires ffmpeg)
    Optimize {
        path: PathBuf,
        /// Output file, defaults to `<stem>_web.<ext>`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Video file or directory of videos
    path: PathBuf,
    /// Where to write the JSON results
    #[arg(short, long, default_value = "analysis_results.json")]
    output: PathBuf,
    /// Detector variant
    #[arg(short, long, value_enum, env = "TRAP_DETECTOR")]
    detector: Option<DetectorKind>,
    /// Frames sampled per video
    #[arg(long, env = "TRAP_MAX_FRAMES")]
    max_frames: Option<usize>,
    /// Minimum confidence (exclusive) for a detection to be kept
    #[arg(short, long, env = "TRAP_CONFIDENCE")]
    threshold: Option<f64>,
    /// Videos analyzed in parallel
    #[arg(short, long, env = "TRAP_WORKERS")]
    workers: Option<usize>,
}

impl AnalyzeArgs {
    fn config(&self) -> AnalyzerConfig {
        let defaults = AnalyzerConfig::default();
        AnalyzerConfig {
            detector: self.detector.unwrap_or(defaults.detector),
            max_frames: self.max_frames.unwrap_or(defaults.max_frames),
            confidence_threshold: self.threshold.unwrap_or(defaults.confidence_threshold),
            workers: self.workers.unwrap_or(defaults.workers),
        }
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "TRAP_HOST")]
    host: Option<String>,
    #[arg(short, long, env = "TRAP_PORT")]
    port: Option<u16>,
    /// Directory searched first for requested videos
    #[arg(long, env = "TRAP_VIDEO_DIR")]
    video_dir: Option<PathBuf>,
    /// Batch artifact served by the results API
    #[arg(long, env = "TRAP_RESULTS_FILE")]
    results: Option<PathBuf>,
    /// Bytes read per body chunk when streaming
    #[arg(long, env = "TRAP_CHUNK_SIZE")]
    chunk_size: Option<usize>,
}

impl ServeArgs {
    fn config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            video_dir: self.video_dir.or(defaults.video_dir),
            results_file: self.results.unwrap_or(defaults.results_file),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            ..defaults
        }
    }
}

fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" });

    info!("trapcam-scan v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", cli);

    match cli.command {
        Command::Analyze(args) => run_analyze(&args),
        Command::Serve(args) => run_serve(args),
        Command::Info { path } => show_video_info(&path),
        Command::Optimize { path, output } => {
            let served = optimize_for_web(&path, output.as_deref());
            println!("{}", served.display());
            Ok(())
        }
    }
}

fn run_analyze(args: &AnalyzeArgs) -> Result<()> {
    let config = args.config();
    let analyzer = VideoAnalyzer::new(&config).context("Invalid analyzer configuration")?;

    let start = Instant::now();
    let batch = if args.path.is_dir() {
        analyzer
            .analyze_directory_to(&args.path, &args.output)
            .with_context(|| format!("Failed to analyze {}", args.path.display()))?
    } else {
        let batch = analyzer
            .analyze_path(&args.path)
            .with_context(|| format!("Failed to analyze {}", args.path.display()))?;
        batch
            .write_atomic(&args.output)
            .with_context(|| format!("Failed to write {}", args.output.display()))?;
        batch
    };

    print_summary(&batch, &args.output);
    info!("Analysis completed in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn print_summary(batch: &AnalysisBatch, output: &Path) {
    let summary = BatchSummary::from_results(batch.results());

    println!("Analysis complete:");
    println!("  Videos analyzed: {}", summary.total_videos);
    println!("  Videos with detections: {}", summary.videos_with_detections);
    println!("  Total detections: {}", summary.total_detections);
    for class in &summary.class_counts {
        println!("    {}: {}", class.class_label, class.count);
    }
    println!("  Results saved to: {}", output.display());
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let config = args.config();
    if !config.results_file.exists() {
        warn!(
            "Results file {} does not exist yet; results API will return 404",
            config.results_file.display()
        );
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(trapcam_scan::server::serve(config))
}

fn show_video_info(path: &Path) -> Result<()> {
    let path_str = path.to_str().context("Video path is not valid UTF-8")?;
    let info = video_info(path_str).with_context(|| format!("Failed to get video info for {}", path_str))?;

    println!("Video Information:");
    println!("  Path: {}", info.path);
    println!("  Dimensions: {}x{}", info.width, info.height);
    println!("  Frame Rate: {:.2} fps", info.fps);
    println!("  Frame Count: {}", info.frame_count);
    println!("  Duration: {:.2} seconds", info.duration_seconds);

    if !info.is_valid() {
        warn!("Video properties appear invalid - analysis may produce no detections");
    }
    Ok(())
}
