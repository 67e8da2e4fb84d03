use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SitemapError;

/// How frequently a page is likely to change, as defined by the sitemap protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFreq {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFreq {
    pub const ALL: [ChangeFreq; 7] = [
        ChangeFreq::Always,
        ChangeFreq::Hourly,
        ChangeFreq::Daily,
        ChangeFreq::Weekly,
        ChangeFreq::Monthly,
        ChangeFreq::Yearly,
        ChangeFreq::Never,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeFreq::Always => "always",
            ChangeFreq::Hourly => "hourly",
            ChangeFreq::Daily => "daily",
            ChangeFreq::Weekly => "weekly",
            ChangeFreq::Monthly => "monthly",
            ChangeFreq::Yearly => "yearly",
            ChangeFreq::Never => "never",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ChangeFreq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeFreq {
    type Err = SitemapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            SitemapError::malformed("changefreq", format!("unknown value '{}'", s))
        })
    }
}

/// What a mapping function returns for a single record.
///
/// Every field is optional. A value with no field set is treated the same as
/// the mapping returning `None`: the record is skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawEntryData {
    #[serde(default)]
    pub loc: Option<String>,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub lastmod: Option<i64>,
    #[serde(default)]
    pub changefreq: Option<ChangeFreq>,
    #[serde(default)]
    pub priority: Option<f64>,
}

impl RawEntryData {
    pub fn with_loc(loc: impl Into<String>) -> Self {
        Self {
            loc: Some(loc.into()),
            ..Default::default()
        }
    }

    pub fn lastmod(mut self, epoch_secs: i64) -> Self {
        self.lastmod = Some(epoch_secs);
        self
    }

    pub fn changefreq(mut self, changefreq: ChangeFreq) -> Self {
        self.changefreq = Some(changefreq);
        self
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.loc.is_none()
            && self.lastmod.is_none()
            && self.changefreq.is_none()
            && self.priority.is_none()
    }
}

/// One `<url>` element of a sitemap.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    /// W3C datetime in UTC, e.g. `2023-11-14T22:13:20+00:00`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastmod: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changefreq: Option<ChangeFreq>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

impl SitemapEntry {
    pub fn new(loc: impl Into<String>) -> Self {
        Self {
            loc: loc.into(),
            lastmod: None,
            changefreq: None,
            priority: None,
        }
    }
}
