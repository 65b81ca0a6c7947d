use std::path::PathBuf;

use clap::{Parser, Subcommand};

use bitable_sync::config::{CoverPolicy, SyncConfig};

/// Sync a Bitable table into a static JSON dataset
#[derive(Parser)]
#[command(name = "bitable-sync")]
#[command(about = "Fetch Bitable records, cache their covers as WebP and write a JSON dataset", long_about = None)]
pub struct Cli {
    /// Config file (TOML). Defaults to ./bitable-sync.toml, then the user config dir
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch records, materialize cover images and write the dataset
    Sync(SyncArgs),
    /// Print the raw records payload as JSON
    Records,
    /// Compress a local image with the configured settings
    Compress {
        /// Image to compress
        input: PathBuf,
        /// Where to write the WebP output. Defaults to the input with a .webp extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the cache file name for an image URL
    Fingerprint {
        url: String,
    },
}

#[derive(clap::Args, Default)]
pub struct SyncArgs {
    /// Dataset output path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Directory for cached WebP covers
    #[arg(long)]
    pub image_dir: Option<PathBuf>,
    /// Leave cover links untouched and skip downloads
    #[arg(long)]
    pub skip_images: bool,
    /// How to write outcomes back into the cover field
    #[arg(long, value_enum)]
    pub cover_policy: Option<CoverPolicy>,
}

impl SyncArgs {
    pub fn apply(self, cfg: &mut SyncConfig) {
        if let Some(p) = self.output { cfg.output_path = p; }
        if let Some(p) = self.image_dir { cfg.image_dir = p; }
        if self.skip_images { cfg.download_images = false; }
        if let Some(p) = self.cover_policy { cfg.cover_policy = p; }
    }
}
