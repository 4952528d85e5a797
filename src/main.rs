use clap::Parser;
use colorkeep::config::{self, CliOverrides};
use colorkeep::imaging::RustEngine;
use colorkeep::{output, process, scan};
use std::path::PathBuf;
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "colorkeep")]
#[command(version)]
#[command(about = "Color-managed batch image renditions")]
#[command(long_about = "\
Color-managed batch image renditions

Every configured profile is applied to every input image: the image is
auto-rotated, stripped of capture metadata, converted into a linear working
space through its ICC profile, resized there, exported into the output
profile and encoded as JPEG, PNG, WebP or TIFF.

Profiles come from a config file (colorkeep.toml, .colorkeep.toml or
~/.colorkeep.toml, or --config), or from --width/--height/--input-profile/
--output-profile for a single profile named 'thumbnail' that keeps the
input's file type.

Existing outputs are skipped unless --rewrite is given, so repeated runs
only fill in what is missing.

Run 'colorkeep --print-config' for a documented colorkeep.toml.")]
struct Cli {
    /// Files or directories to process
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Path to a config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output root directory [default: .]
    #[arg(short, long)]
    output: Option<String>,

    /// Output filename format [default: {name}_{profile}]
    #[arg(short, long)]
    format: Option<String>,

    /// Overwrite existing outputs
    #[arg(long)]
    rewrite: bool,

    /// Descend into directories recursively
    #[arg(short, long)]
    recursive: bool,

    /// Width of the output image
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Height of the output image
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// Input ICC profile, used when the image embeds none
    #[arg(long, default_value = "")]
    input_profile: String,

    /// Output ICC profile ("same" keeps the embedded one)
    #[arg(long, default_value = "")]
    output_profile: String,

    /// Write a JSON report of every rendition to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Diagnostic log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print a stock colorkeep.toml with all options documented
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config: self.config.clone(),
            output: self.output.clone(),
            format: self.format.clone(),
            rewrite: self.rewrite,
            width: self.width,
            height: self.height,
            input_profile: self.input_profile.clone(),
            output_profile: self.output_profile.clone(),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&cli.log_level))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let home = std::env::var_os("HOME").map(PathBuf::from);
    let search = config::default_search_paths(home.as_deref());
    let job_config = config::resolve(&cli.overrides(), &search)?;
    debug!(profiles = job_config.profiles.len(), output = %job_config.output, "config resolved");

    let scanned = scan::collect_images(&cli.paths, cli.recursive)?;
    output::print_skipped(&scanned.skipped);
    if scanned.images.is_empty() {
        println!("{}", output::format_no_images());
        return Ok(());
    }

    let job = config::build_job(&job_config, scanned.images)?;
    init_thread_pool(&job_config.processing);
    let engine = RustEngine::with_profile_dirs(job_config.profile_dirs.clone());

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_process_event(&event) {
                println!("{}", line);
            }
        }
    });
    let report = process::process(&engine, &job, Some(tx));
    printer.join().ok();

    output::print_summary(&report);
    if let Some(path) = &cli.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }

    Ok(())
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
