use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base for public image URLs, e.g. `http://localhost:3000`.
    pub public_url: String,
    pub max_retries: u32,
    pub max_width: u32,
    pub jpeg_quality: f32,
    /// Default compression capability for uploads that don't say otherwise.
    pub compression: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Wardrobe catalog API")]
pub struct Args {
    /// Host to bind to (overrides WARDROBE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides WARDROBE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where images are stored (overrides WARDROBE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides WARDROBE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL for image links (overrides WARDROBE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Upload attempts per image (overrides WARDROBE_MAX_RETRIES)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Widest image kept after compression (overrides WARDROBE_MAX_WIDTH)
    #[arg(long)]
    pub max_width: Option<u32>,

    /// JPEG quality between 0 and 1 (overrides WARDROBE_JPEG_QUALITY)
    #[arg(long)]
    pub jpeg_quality: Option<f32>,

    /// Skip image compression (overrides WARDROBE_COMPRESSION)
    #[arg(long)]
    pub no_compression: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    pub fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = lookup("WARDROBE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_env(&lookup, "WARDROBE_PORT", 3000u16)?;
        let env_storage =
            lookup("WARDROBE_STORAGE_DIR").unwrap_or_else(|| "./data/images".into());
        let env_db = lookup("WARDROBE_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/wardrobe.db".into());
        let env_public =
            lookup("WARDROBE_PUBLIC_URL").unwrap_or_else(|| "http://localhost:3000".into());
        let env_retries = parse_env(&lookup, "WARDROBE_MAX_RETRIES", 3u32)?;
        let env_width = parse_env(&lookup, "WARDROBE_MAX_WIDTH", 1200u32)?;
        let env_quality = parse_env(&lookup, "WARDROBE_JPEG_QUALITY", 0.8f32)?;
        let env_compression = parse_env(&lookup, "WARDROBE_COMPRESSION", true)?;

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url: args.public_url.unwrap_or(env_public),
            max_retries: args.max_retries.unwrap_or(env_retries),
            max_width: args.max_width.unwrap_or(env_width),
            jpeg_quality: args.jpeg_quality.unwrap_or(env_quality),
            compression: env_compression && !args.no_compression,
        };

        if !(0.0..=1.0).contains(&cfg.jpeg_quality) {
            anyhow::bail!("jpeg quality must be between 0 and 1, got {}", cfg.jpeg_quality);
        }
        if cfg.max_width == 0 {
            anyhow::bail!("max width must be positive");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(default),
    }
}
