//! Command-line interface for the bundle identifier collision resolver.
//!
//! Takes a built IPA and the configured main identifier, rewrites any
//! colliding or missing nested bundle identifiers, and writes a verified
//! archive plus a JSON report next to it.

use bundlefix::registry::RewriteMode;
use bundlefix::CollisionResolver;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "resolve-collisions")]
#[command(about = "Resolve duplicate bundle identifiers in an IPA archive")]
struct Cli {
    /// Input IPA archive
    archive: PathBuf,

    /// Main bundle identifier to protect (must match [A-Za-z0-9._-]+)
    main_identifier: String,

    /// Output path (default: <archive-dir>/<archive-name>_fixed.<ext>)
    output: Option<PathBuf>,

    /// ZIP compression level for the output (0-9)
    #[arg(short = 'z', long, default_value = "6")]
    zip_level: u32,

    /// Rewrite every non-main identifier, not just colliding ones
    #[arg(long)]
    rewrite_all: bool,

    /// Only scan bundles under this subtree of the app, e.g. "PlugIns"
    #[arg(long)]
    scope: Option<PathBuf>,

    /// Report path (default: <output>.report.json)
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.archive));
    let report_path = cli
        .report
        .clone()
        .unwrap_or_else(|| append_extension(&output, "report.json"));

    let mut resolver = CollisionResolver::new(cli.main_identifier.as_str())
        .compression_level(cli.zip_level);
    if cli.rewrite_all {
        resolver = resolver.rewrite_mode(RewriteMode::Always);
    }
    if let Some(ref scope) = cli.scope {
        resolver = resolver.scope(scope);
    }

    let report = resolver.resolve(&cli.archive, &output)?;
    report.write_json(&report_path)?;

    info!(
        collisions_fixed = report.collisions_fixed,
        missing_fixed = report.missing_fixed,
        unique = report.unique_identifiers,
        "run complete"
    );
    println!("Fixed: {}", output.display());
    println!("Report: {}", report_path.display());

    Ok(())
}

/// `<archive-dir>/<archive-stem>_fixed.<ext>`
fn default_output(archive: &PathBuf) -> PathBuf {
    let stem = archive
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive");
    let ext = archive
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("ipa");
    archive.with_file_name(format!("{}_fixed.{}", stem, ext))
}

/// `<path>.<suffix>` without replacing the existing extension.
fn append_extension(path: &PathBuf, suffix: &str) -> PathBuf {
    let mut s = path.clone().into_os_string();
    s.push(".");
    s.push(suffix);
    PathBuf::from(s)
}
