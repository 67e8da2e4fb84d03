use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::config::{Config, Section};
use crate::db::{Pool, RecordRow, TableSource};
use crate::generator::SitemapGenerator;
use crate::model::{RawEntryData, SitemapEntry};
use crate::source::{ScopedSitemap, VecSource};

/// Generate every entry the configuration describes: static URLs first, then
/// each section in order. Any failure aborts the whole build.
#[instrument(skip_all)]
pub async fn build_entries(cfg: &Config, pool: &Pool) -> Result<Vec<SitemapEntry>> {
    let mut entries = static_entries(cfg).await?;

    for section in &cfg.sitemaps {
        let section_entries = section_sitemap(section, &cfg.app.base_url, pool.clone())?
            .generate()
            .await
            .with_context(|| format!("failed to build sitemap section '{}'", section.name))?;
        info!(
            section = %section.name,
            entries = section_entries.len(),
            "section generated"
        );
        entries.extend(section_entries);
    }

    Ok(entries)
}

async fn static_entries(cfg: &Config) -> Result<Vec<SitemapEntry>> {
    let generator = SitemapGenerator::builder()
        .mapping(|raw: &RawEntryData| Some(raw.clone()))
        .build()?;
    ScopedSitemap::new(VecSource::new(cfg.static_urls.clone()), generator)
        .generate()
        .await
        .context("failed to build static urls")
}

pub fn section_sitemap(
    section: &Section,
    base_url: &str,
    pool: Pool,
) -> Result<ScopedSitemap<TableSource>> {
    let mut builder = SitemapGenerator::<RecordRow>::builder().mapper(section.mapping(base_url));
    if let Some(c) = section.default_changefreq {
        builder = builder.default_changefreq(c);
    }
    if let Some(p) = section.default_priority {
        builder = builder.default_priority(p);
    }
    let generator = builder
        .build()
        .with_context(|| format!("invalid sitemap section '{}'", section.name))?;

    let owned = section.clone();
    Ok(
        ScopedSitemap::new(TableSource::new(pool, section.table.clone()), generator)
            .with_scope(move |q| owned.scope(q)),
    )
}
