use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use record_sitemap::{config, db, sitemap, xml};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Xml,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Generate an XML sitemap from the records of a SQLite database"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "sitemap.yaml")]
    config: PathBuf,

    /// Write the sitemap to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "xml")]
    format: Format,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.app.database_url.clone());
    let pool = db::init_pool(&database_url)
        .await
        .with_context(|| format!("failed to open {}", database_url))?;

    let entries = sitemap::build_entries(&cfg, &pool).await?;

    // Render fully before writing so a failed run leaves no partial sitemap.
    let rendered = match args.format {
        Format::Xml => xml::write_urlset(&entries)?,
        Format::Json => {
            let mut s = serde_json::to_string_pretty(&entries)?;
            s.push('\n');
            s
        }
    };

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, rendered.as_bytes())
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(entries = entries.len(), path = %path.display(), "sitemap written");
        }
        None => {
            print!("{}", rendered);
            info!(entries = entries.len(), "sitemap written to stdout");
        }
    }

    Ok(())
}
