mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bitable_sync::compress::compress_image;
use bitable_sync::config::SyncConfig;
use bitable_sync::materializer::cache_file_name;
use bitable_sync::BitableSync;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync(args) => {
            let mut cfg = SyncConfig::load(cli.config.as_deref())?;
            args.apply(&mut cfg);
            let report = BitableSync::new(cfg)?.run().await?;
            println!("Data saved to {} ({} records)", report.output_path.display(), report.records);
        }
        Commands::Records => {
            let sync = BitableSync::new(SyncConfig::load(cli.config.as_deref())?)?;
            let (_, records) = sync.fetch_records().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Compress { input, output } => {
            let cfg = SyncConfig::load(cli.config.as_deref())?;
            cfg.compression.validate()?;
            let raw = tokio::fs::read(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;
            let out = compress_image(&raw, &cfg.compression)?;
            let dest = output.unwrap_or_else(|| input.with_extension("webp"));
            tokio::fs::write(&dest, &out.data)
                .await
                .with_context(|| format!("writing {}", dest.display()))?;
            println!(
                "{}: {}x{} q{} ({:.1}KB -> {:.1}KB, {} attempt(s))",
                dest.display(),
                out.width,
                out.height,
                out.quality,
                raw.len() as f64 / 1024.0,
                out.data.len() as f64 / 1024.0,
                out.attempts
            );
        }
        Commands::Fingerprint { url } => {
            println!("{}", cache_file_name(&url));
        }
    }
    Ok(())
}
