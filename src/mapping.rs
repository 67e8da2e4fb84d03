//! Configuration-driven mapping from database rows to sitemap entry data.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::model::{ColumnValue, RecordRow};
use crate::error::SitemapError;
use crate::generator::EntryMapper;
use crate::model::{ChangeFreq, RawEntryData};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern")
});

/// Maps a [`RecordRow`] to [`RawEntryData`] using a `loc` template and the
/// names of the columns holding the optional fields.
///
/// `{column}` in the template is replaced by that column's value. A NULL in
/// any referenced column fails the record with a missing `loc`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    loc_template: String,
    base_url: Option<String>,
    lastmod_column: Option<String>,
    changefreq_column: Option<String>,
    priority_column: Option<String>,
}

impl ColumnMapping {
    pub fn new(loc_template: impl Into<String>) -> Self {
        Self {
            loc_template: loc_template.into(),
            base_url: None,
            lastmod_column: None,
            changefreq_column: None,
            priority_column: None,
        }
    }

    /// Prefix for templates that start with `/`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn lastmod_column(mut self, column: impl Into<String>) -> Self {
        self.lastmod_column = Some(column.into());
        self
    }

    pub fn changefreq_column(mut self, column: impl Into<String>) -> Self {
        self.changefreq_column = Some(column.into());
        self
    }

    pub fn priority_column(mut self, column: impl Into<String>) -> Self {
        self.priority_column = Some(column.into());
        self
    }

    /// Column names referenced by a `loc` template, in order of appearance.
    pub fn placeholders(template: &str) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(template)
            .map(|c| c[1].to_string())
            .collect()
    }

    fn render_loc(&self, row: &RecordRow) -> Result<String, SitemapError> {
        let tpl = &self.loc_template;
        let mut out = String::with_capacity(tpl.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(tpl) {
            let whole = caps.get(0).expect("capture group 0 always matches");
            let value = column(row, &caps[1])?;
            if value.is_null() {
                return Err(SitemapError::MissingRequiredField("loc"));
            }
            out.push_str(&tpl[last..whole.start()]);
            out.push_str(&value.to_string());
            last = whole.end();
        }
        out.push_str(&tpl[last..]);

        match &self.base_url {
            Some(base) if out.starts_with('/') => {
                Ok(format!("{}{}", base.trim_end_matches('/'), out))
            }
            _ => Ok(out),
        }
    }
}

impl EntryMapper<RecordRow> for ColumnMapping {
    fn map(&self, row: &RecordRow) -> Result<Option<RawEntryData>, SitemapError> {
        let mut raw = RawEntryData {
            loc: Some(self.render_loc(row)?),
            ..Default::default()
        };
        if let Some(name) = &self.lastmod_column {
            raw.lastmod = lastmod_from(column(row, name)?)?;
        }
        if let Some(name) = &self.changefreq_column {
            raw.changefreq = changefreq_from(column(row, name)?)?;
        }
        if let Some(name) = &self.priority_column {
            raw.priority = priority_from(column(row, name)?)?;
        }
        Ok(Some(raw))
    }
}

fn column<'a>(row: &'a RecordRow, name: &str) -> Result<&'a ColumnValue, SitemapError> {
    row.get(name).ok_or_else(|| {
        SitemapError::Configuration(format!("column '{}' is not present in the record", name))
    })
}

fn lastmod_from(value: &ColumnValue) -> Result<Option<i64>, SitemapError> {
    match value {
        ColumnValue::Null => Ok(None),
        ColumnValue::Integer(v) => Ok(Some(*v)),
        ColumnValue::Real(v) if v.is_finite() => Ok(Some(v.trunc() as i64)),
        ColumnValue::Real(v) => Err(SitemapError::malformed(
            "lastmod",
            format!("{} is not a timestamp", v),
        )),
        ColumnValue::Text(s) => parse_timestamp(s).map(Some).ok_or_else(|| {
            SitemapError::malformed("lastmod", format!("cannot parse '{}' as a timestamp", s))
        }),
    }
}

/// Accepts unix seconds, RFC 3339, SQLite's `YYYY-MM-DD HH:MM:SS` (UTC) and
/// plain dates.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

fn changefreq_from(value: &ColumnValue) -> Result<Option<ChangeFreq>, SitemapError> {
    match value {
        ColumnValue::Null => Ok(None),
        ColumnValue::Text(s) => s.parse().map(Some),
        other => Err(SitemapError::malformed(
            "changefreq",
            format!("expected text, got '{}'", other),
        )),
    }
}

fn priority_from(value: &ColumnValue) -> Result<Option<f64>, SitemapError> {
    match value {
        ColumnValue::Null => Ok(None),
        ColumnValue::Integer(v) => Ok(Some(*v as f64)),
        ColumnValue::Real(v) => Ok(Some(*v)),
        ColumnValue::Text(s) => s.trim().parse::<f64>().map(Some).map_err(|_| {
            SitemapError::malformed("priority", format!("cannot parse '{}' as a number", s))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cols: Vec<(&str, ColumnValue)>) -> RecordRow {
        cols.into_iter().collect()
    }

    #[test]
    fn placeholders_in_order() {
        assert_eq!(
            ColumnMapping::placeholders("/{lang}/posts/{slug}"),
            vec!["lang".to_string(), "slug".to_string()]
        );
        assert!(ColumnMapping::placeholders("/static").is_empty());
    }

    #[test]
    fn renders_relative_loc_against_base_url() {
        let mapping = ColumnMapping::new("/posts/{id}-{slug}").base_url("https://example.com/");
        let raw = mapping
            .map(&row(vec![("id", 7_i64.into()), ("slug", "hello".into())]))
            .unwrap()
            .unwrap();
        assert_eq!(raw.loc.as_deref(), Some("https://example.com/posts/7-hello"));
    }

    #[test]
    fn absolute_template_ignores_base_url() {
        let mapping = ColumnMapping::new("https://cdn.example/{slug}").base_url("https://example.com");
        let raw = mapping.map(&row(vec![("slug", "x".into())])).unwrap().unwrap();
        assert_eq!(raw.loc.as_deref(), Some("https://cdn.example/x"));
    }

    #[test]
    fn null_placeholder_is_missing_loc() {
        let mapping = ColumnMapping::new("/posts/{slug}").priority_column("prio");
        let err = mapping
            .map(&row(vec![("slug", ColumnValue::Null), ("prio", 0.4.into())]))
            .unwrap_err();
        assert_eq!(err, SitemapError::MissingRequiredField("loc"));
    }

    #[test]
    fn missing_column_is_configuration_error() {
        let mapping = ColumnMapping::new("/posts/{slug}");
        let err = mapping.map(&row(vec![("id", 1_i64.into())])).unwrap_err();
        assert!(matches!(err, SitemapError::Configuration(msg) if msg.contains("slug")));
    }

    #[test]
    fn lastmod_accepts_common_encodings() {
        assert_eq!(parse_timestamp("1700000000"), Some(1_700_000_000));
        assert_eq!(parse_timestamp("2023-11-14T22:13:20Z"), Some(1_700_000_000));
        assert_eq!(parse_timestamp("2023-11-14T23:13:20+01:00"), Some(1_700_000_000));
        assert_eq!(parse_timestamp("2023-11-14 22:13:20"), Some(1_700_000_000));
        assert_eq!(parse_timestamp("2023-11-14"), Some(1_699_920_000));
        assert_eq!(parse_timestamp("last tuesday"), None);
    }

    #[test]
    fn malformed_columns_are_rejected() {
        let mapping = ColumnMapping::new("/p")
            .lastmod_column("updated")
            .changefreq_column("freq")
            .priority_column("prio");

        let base = |updated: ColumnValue, freq: ColumnValue, prio: ColumnValue| {
            row(vec![("updated", updated), ("freq", freq), ("prio", prio)])
        };

        let err = mapping
            .map(&base("soon".into(), ColumnValue::Null, ColumnValue::Null))
            .unwrap_err();
        assert!(matches!(err, SitemapError::MalformedField { field: "lastmod", .. }));

        let err = mapping
            .map(&base(ColumnValue::Null, "often".into(), ColumnValue::Null))
            .unwrap_err();
        assert!(matches!(err, SitemapError::MalformedField { field: "changefreq", .. }));

        let err = mapping
            .map(&base(ColumnValue::Null, ColumnValue::Null, "high".into()))
            .unwrap_err();
        assert!(matches!(err, SitemapError::MalformedField { field: "priority", .. }));
    }

    #[test]
    fn typed_columns_map_to_fields() {
        let mapping = ColumnMapping::new("/p")
            .lastmod_column("updated")
            .changefreq_column("freq")
            .priority_column("prio");
        let raw = mapping
            .map(&row(vec![
                ("updated", 1_700_000_000.5.into()),
                ("freq", "Daily".into()),
                ("prio", 1_i64.into()),
            ]))
            .unwrap()
            .unwrap();
        assert_eq!(raw.lastmod, Some(1_700_000_000));
        assert_eq!(raw.changefreq, Some(ChangeFreq::Daily));
        assert_eq!(raw.priority, Some(1.0));
    }
}
