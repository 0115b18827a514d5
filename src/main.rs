use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use subsift::{init_tracing, FileConfig, SubredditExtractor, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "subsift")]
#[command(about = "Extract records for selected subreddits from zstd-compressed Reddit dumps", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Do not draw progress bars
    #[arg(long)]
    no_progress: bool,

    /// Also write the run summary as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_cfg = FileConfig::load(&cli.config)?;
    init_tracing(&file_cfg.logging)?;
    let opts = file_cfg.to_options()?;
    tracing::info!("Configuration loaded from {}", cli.config.display());

    let summary = SubredditExtractor::new(opts).progress(!cli.no_progress).run()?;

    println!(
        "Processed {}/{} archives successfully; {} matching records ({} scanned, {} malformed lines skipped)",
        summary.succeeded(),
        summary.archives.len(),
        summary.total_matched(),
        summary.total_scanned(),
        summary.total_parse_errors()
    );
    for (o, f) in summary.failed() {
        println!("  FAILED {} [{}] {}", o.archive.display(), f.kind, f.message);
    }

    if let Some(path) = &cli.summary_json {
        summary
            .write_json(path)
            .with_context(|| format!("write summary {}", path.display()))?;
    }
    Ok(())
}
