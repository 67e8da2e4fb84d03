//! Configuration loader and validator for the sitemap builder.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::db::RecordQuery;
use crate::mapping::ColumnMapping;
use crate::model::{ChangeFreq, RawEntryData};

// Tables may be schema-qualified. Result columns never carry a qualifier.
static TABLE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("valid table name pattern")
});

static COLUMN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid column name pattern"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    /// Entries emitted before any table section, in order.
    #[serde(default)]
    pub static_urls: Vec<RawEntryData>,
    #[serde(default)]
    pub sitemaps: Vec<Section>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub database_url: String,
    /// Prefix for `loc` templates that start with `/`.
    pub base_url: String,
}

/// One table contributing entries to the sitemap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub select: Vec<String>,
    /// Raw SQL conditions, joined with AND.
    #[serde(default, rename = "where")]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    /// `loc` template, e.g. `/posts/{slug}`.
    pub loc: String,
    #[serde(default)]
    pub lastmod_column: Option<String>,
    #[serde(default)]
    pub changefreq_column: Option<String>,
    #[serde(default)]
    pub priority_column: Option<String>,
    #[serde(default)]
    pub default_changefreq: Option<ChangeFreq>,
    #[serde(default)]
    pub default_priority: Option<f64>,
}

impl Section {
    /// Apply this section's select/where/order/limit to a query.
    pub fn scope(&self, mut query: RecordQuery) -> RecordQuery {
        if !self.select.is_empty() {
            query = query.select(self.select.iter().cloned());
        }
        for cond in &self.conditions {
            query = query.and_where(cond.clone());
        }
        if let Some(order) = &self.order_by {
            query = query.order_by(order.clone());
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        query
    }

    pub fn mapping(&self, base_url: &str) -> ColumnMapping {
        let mut mapping = ColumnMapping::new(self.loc.clone()).base_url(base_url);
        if let Some(c) = &self.lastmod_column {
            mapping = mapping.lastmod_column(c.clone());
        }
        if let Some(c) = &self.changefreq_column {
            mapping = mapping.changefreq_column(c.clone());
        }
        if let Some(c) = &self.priority_column {
            mapping = mapping.priority_column(c.clone());
        }
        mapping
    }

    /// Columns the mapping reads, for checking against `select`.
    fn referenced_columns(&self) -> Vec<String> {
        let mut cols = ColumnMapping::placeholders(&self.loc);
        cols.extend(
            [
                &self.lastmod_column,
                &self.changefreq_column,
                &self.priority_column,
            ]
            .into_iter()
            .flatten()
            .cloned(),
        );
        cols
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `sitemap.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("sitemap.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_url must be non-empty"));
    }
    if cfg.app.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.base_url must be non-empty"));
    }

    for url in &cfg.static_urls {
        if url.loc.as_deref().map_or(true, |l| l.trim().is_empty()) {
            return Err(ConfigError::Invalid("static_urls[].loc must be non-empty"));
        }
        if url.priority.is_some_and(|p| !p.is_finite()) {
            return Err(ConfigError::Invalid("static_urls[].priority must be a finite number"));
        }
    }

    for section in &cfg.sitemaps {
        if section.name.trim().is_empty() {
            return Err(ConfigError::Invalid("sitemaps[].name must be non-empty"));
        }
        if !TABLE_NAME.is_match(&section.table) {
            return Err(ConfigError::Invalid("sitemaps[].table must be a plain identifier"));
        }
        if section.loc.trim().is_empty() {
            return Err(ConfigError::Invalid("sitemaps[].loc must be non-empty"));
        }
        if section.select.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid("sitemaps[].select entries must be non-empty"));
        }
        if section.conditions.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid("sitemaps[].where entries must be non-empty"));
        }
        if section.default_priority.is_some_and(|p| !p.is_finite()) {
            return Err(ConfigError::Invalid(
                "sitemaps[].default_priority must be a finite number",
            ));
        }
        let column_names = [
            &section.lastmod_column,
            &section.changefreq_column,
            &section.priority_column,
        ];
        if column_names
            .into_iter()
            .flatten()
            .any(|c| !COLUMN_NAME.is_match(c))
        {
            return Err(ConfigError::Invalid(
                "sitemaps[].*_column must be plain identifiers",
            ));
        }
        // With an explicit select list every referenced column must be in it.
        if !section.select.is_empty() {
            let selected: Vec<&str> = section.select.iter().map(|c| output_name(c)).collect();
            if section
                .referenced_columns()
                .iter()
                .any(|c| !selected.contains(&c.as_str()))
            {
                return Err(ConfigError::Invalid(
                    "sitemaps[] references a column missing from select",
                ));
            }
        }
    }

    Ok(())
}

/// Name a select item produces: the alias after `AS`, else the item itself.
fn output_name(item: &str) -> &str {
    let item = item.trim();
    let lower = item.to_ascii_lowercase();
    match lower.rfind(" as ") {
        Some(pos) => item[pos + 4..].trim(),
        None => item,
    }
}

/// Returns an example configuration.
pub fn example() -> &'static str {
    r#"app:
  database_url: "sqlite://./data/site.db"
  base_url: "https://example.com"

static_urls:
  - loc: "https://example.com/"
    changefreq: daily
    priority: 1.0

sitemaps:
  - name: posts
    table: posts
    select: [slug, updated_at]
    where:
      - "is_deleted = 0"
    order_by: "id ASC"
    loc: "/posts/{slug}"
    lastmod_column: updated_at
    default_changefreq: daily
    default_priority: 0.8
  - name: tags
    table: tags
    loc: "/tags/{name}"
    default_changefreq: weekly
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.static_urls.len(), 1);
        assert_eq!(cfg.sitemaps.len(), 2);
        let posts = &cfg.sitemaps[0];
        assert_eq!(posts.conditions, vec!["is_deleted = 0".to_string()]);
        assert_eq!(posts.default_changefreq, Some(ChangeFreq::Daily));
        assert_eq!(posts.default_priority, Some(0.8));
        assert!(cfg.sitemaps[1].select.is_empty());
    }

    #[test]
    fn invalid_app_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.database_url = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("database_url")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.base_url = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(msg)) if msg.contains("base_url")));
    }

    #[test]
    fn invalid_sections() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sitemaps[0].table = "posts; DROP TABLE posts".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(msg)) if msg.contains("table")));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sitemaps[0].loc = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(msg)) if msg.contains("loc")));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sitemaps[0].default_priority = Some(f64::NAN);
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sitemaps[0].lastmod_column = Some("modified".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(msg)) if msg.contains("select")));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.static_urls[0].loc = None;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(msg)) if msg.contains("static_urls")));
    }

    #[test]
    fn qualified_names_only_allowed_for_tables() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sitemaps[1].table = "main.tags".into();
        validate(&cfg).unwrap();

        cfg.sitemaps[1].lastmod_column = Some("tags.updated_at".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(msg)) if msg.contains("_column")));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sitemaps[0].select.push("posts.weight".into());
        cfg.sitemaps[0].priority_column = Some("posts.weight".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(msg)) if msg.contains("_column")));
    }

    #[test]
    fn select_aliases_satisfy_references() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sitemaps[0].select = vec![
            "slug".into(),
            "COALESCE(updated_at, created_at) AS modified".into(),
        ];
        cfg.sitemaps[0].lastmod_column = Some("modified".into());
        validate(&cfg).unwrap();
    }

    #[test]
    fn unknown_changefreq_is_parse_error() {
        let yaml = example().replace("default_changefreq: weekly", "default_changefreq: often");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn section_scope_builds_query() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        let q = cfg.sitemaps[0].scope(RecordQuery::table("posts"));
        assert_eq!(
            q.to_sql(),
            "SELECT slug, updated_at FROM posts WHERE (is_deleted = 0) ORDER BY id ASC"
        );
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("sitemap.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.base_url, "https://example.com");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
