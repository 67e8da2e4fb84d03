//! Turns a stream of records into sitemap entries.
//!
//! The generator is synchronous and keeps no state between runs. A run is
//! all-or-nothing: the first record that fails to map aborts it and no entries
//! are returned.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::error::SitemapError;
use crate::model::{ChangeFreq, RawEntryData, SitemapEntry};

/// Maps one record to the raw data of its sitemap entry.
///
/// Returning `Ok(None)` (or an empty [`RawEntryData`]) skips the record. Any
/// closure `Fn(&R) -> Option<RawEntryData>` is a mapper that never fails.
pub trait EntryMapper<R>: Send + Sync {
    fn map(&self, record: &R) -> Result<Option<RawEntryData>, SitemapError>;
}

impl<R, F> EntryMapper<R> for F
where
    F: Fn(&R) -> Option<RawEntryData> + Send + Sync,
{
    fn map(&self, record: &R) -> Result<Option<RawEntryData>, SitemapError> {
        Ok(self(record))
    }
}

pub struct SitemapGenerator<R> {
    mapping: Box<dyn EntryMapper<R>>,
    default_changefreq: Option<ChangeFreq>,
    default_priority: Option<f64>,
}

impl<R> fmt::Debug for SitemapGenerator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SitemapGenerator")
            .field("default_changefreq", &self.default_changefreq)
            .field("default_priority", &self.default_priority)
            .finish_non_exhaustive()
    }
}

pub struct SitemapGeneratorBuilder<R> {
    mapping: Option<Box<dyn EntryMapper<R>>>,
    default_changefreq: Option<ChangeFreq>,
    default_priority: Option<f64>,
}

impl<R> Default for SitemapGeneratorBuilder<R> {
    fn default() -> Self {
        Self {
            mapping: None,
            default_changefreq: None,
            default_priority: None,
        }
    }
}

impl<R: 'static> SitemapGeneratorBuilder<R> {
    /// Use a closure as the mapping function.
    pub fn mapping<F>(self, f: F) -> Self
    where
        F: Fn(&R) -> Option<RawEntryData> + Send + Sync + 'static,
    {
        self.mapper(f)
    }

    /// Use any [`EntryMapper`] as the mapping function.
    pub fn mapper<M>(mut self, mapper: M) -> Self
    where
        M: EntryMapper<R> + 'static,
    {
        self.mapping = Some(Box::new(mapper));
        self
    }

    pub fn default_changefreq(mut self, changefreq: ChangeFreq) -> Self {
        self.default_changefreq = Some(changefreq);
        self
    }

    pub fn default_priority(mut self, priority: f64) -> Self {
        self.default_priority = Some(priority);
        self
    }

    pub fn build(self) -> Result<SitemapGenerator<R>, SitemapError> {
        let Some(mapping) = self.mapping else {
            return Err(SitemapError::Configuration(
                "mapping function is not set".into(),
            ));
        };
        if let Some(p) = self.default_priority {
            if !p.is_finite() {
                return Err(SitemapError::Configuration(format!(
                    "default priority must be a finite number, got {}",
                    p
                )));
            }
        }
        Ok(SitemapGenerator {
            mapping,
            default_changefreq: self.default_changefreq,
            default_priority: self.default_priority,
        })
    }
}

impl<R: 'static> SitemapGenerator<R> {
    pub fn builder() -> SitemapGeneratorBuilder<R> {
        SitemapGeneratorBuilder::default()
    }
}

impl<R> SitemapGenerator<R> {
    /// Map every record in order and collect the resulting entries.
    #[instrument(skip_all)]
    pub fn generate<'a, I>(&self, records: I) -> Result<Vec<SitemapEntry>, SitemapError>
    where
        I: IntoIterator<Item = &'a R>,
        R: 'a,
    {
        let mut result = Vec::new();
        let mut skipped = 0usize;

        for (index, record) in records.into_iter().enumerate() {
            let raw = match self.mapping.map(record) {
                Ok(Some(raw)) if !raw.is_empty() => raw,
                Ok(_) => {
                    skipped += 1;
                    debug!(index, "mapping returned no data; skipping record");
                    continue;
                }
                Err(err) => {
                    warn!(index, %err, "mapping failed; aborting sitemap generation");
                    return Err(err);
                }
            };

            match self.build_entry(raw) {
                Ok(entry) => result.push(entry),
                Err(err) => {
                    warn!(index, %err, "invalid entry data; aborting sitemap generation");
                    return Err(err);
                }
            }
        }

        debug!(entries = result.len(), skipped, "sitemap entries generated");
        Ok(result)
    }

    fn build_entry(&self, raw: RawEntryData) -> Result<SitemapEntry, SitemapError> {
        let loc = raw
            .loc
            .filter(|loc| !loc.trim().is_empty())
            .ok_or(SitemapError::MissingRequiredField("loc"))?;

        let lastmod = raw.lastmod.map(format_lastmod).transpose()?;

        let priority = match raw.priority {
            Some(p) if !p.is_finite() => {
                return Err(SitemapError::malformed(
                    "priority",
                    format!("{} is not a finite number", p),
                ));
            }
            Some(p) => Some(p),
            None => self.default_priority,
        };

        Ok(SitemapEntry {
            loc,
            lastmod,
            changefreq: raw.changefreq.or(self.default_changefreq),
            priority,
        })
    }
}

/// Format a unix timestamp as a W3C datetime in UTC.
///
/// Only years 0000 through 9999 have a four-digit W3C form.
pub fn format_lastmod(epoch_secs: i64) -> Result<String, SitemapError> {
    let dt = DateTime::<Utc>::from_timestamp(epoch_secs, 0).ok_or_else(|| {
        SitemapError::malformed(
            "lastmod",
            format!("timestamp {} is out of range", epoch_secs),
        )
    })?;
    if !(0..=9999).contains(&dt.year()) {
        return Err(SitemapError::malformed(
            "lastmod",
            format!("timestamp {} is outside years 0000-9999", epoch_secs),
        ));
    }
    Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Page {
        id: i64,
    }

    fn pages(ids: &[i64]) -> Vec<Page> {
        ids.iter().map(|&id| Page { id }).collect()
    }

    #[test]
    fn build_without_mapping_is_configuration_error() {
        let err = SitemapGenerator::<Page>::builder()
            .default_changefreq(ChangeFreq::Daily)
            .build()
            .unwrap_err();
        assert!(matches!(err, SitemapError::Configuration(_)));
    }

    #[test]
    fn build_rejects_non_finite_default_priority() {
        let err = SitemapGenerator::<Page>::builder()
            .mapping(|_| None)
            .default_priority(f64::NAN)
            .build()
            .unwrap_err();
        assert!(matches!(err, SitemapError::Configuration(_)));
    }

    #[test]
    fn lastmod_formats_as_utc_w3c() {
        assert_eq!(format_lastmod(1_700_000_000).unwrap(), "2023-11-14T22:13:20+00:00");
        assert_eq!(format_lastmod(0).unwrap(), "1970-01-01T00:00:00+00:00");
        assert_eq!(format_lastmod(253_402_300_799).unwrap(), "9999-12-31T23:59:59+00:00");
        assert_eq!(format_lastmod(-62_167_219_200).unwrap(), "0000-01-01T00:00:00+00:00");
        for epoch in [i64::MAX, 1_700_000_000_000, 253_402_300_800, -70_000_000_000, -62_167_219_201] {
            assert!(
                matches!(
                    format_lastmod(epoch),
                    Err(SitemapError::MalformedField { field: "lastmod", .. })
                ),
                "epoch {} should be rejected",
                epoch
            );
        }
    }

    #[test]
    fn empty_raw_data_is_skipped_like_none() {
        let gen = SitemapGenerator::builder()
            .mapping(|p: &Page| {
                if p.id == 1 {
                    Some(RawEntryData::default())
                } else {
                    Some(RawEntryData::with_loc(format!("/p/{}", p.id)))
                }
            })
            .build()
            .unwrap();
        let out = gen.generate(&pages(&[1, 2])).unwrap();
        assert_eq!(out, vec![SitemapEntry::new("/p/2")]);
    }

    #[test]
    fn blank_loc_counts_as_missing() {
        let gen = SitemapGenerator::builder()
            .mapping(|_: &Page| Some(RawEntryData::with_loc("  ")))
            .build()
            .unwrap();
        assert_eq!(
            gen.generate(&pages(&[1])).unwrap_err(),
            SitemapError::MissingRequiredField("loc")
        );
    }

    #[test]
    fn infinite_priority_is_malformed() {
        let gen = SitemapGenerator::builder()
            .mapping(|_: &Page| Some(RawEntryData::with_loc("/a").priority(f64::INFINITY)))
            .build()
            .unwrap();
        assert!(matches!(
            gen.generate(&pages(&[1])),
            Err(SitemapError::MalformedField { field: "priority", .. })
        ));
    }

    #[test]
    fn mapper_errors_abort_the_run() {
        struct Failing;
        impl EntryMapper<Page> for Failing {
            fn map(&self, record: &Page) -> Result<Option<RawEntryData>, SitemapError> {
                if record.id == 2 {
                    Err(SitemapError::malformed("lastmod", "not a date"))
                } else {
                    Ok(Some(RawEntryData::with_loc("/ok")))
                }
            }
        }

        let gen = SitemapGenerator::builder().mapper(Failing).build().unwrap();
        let err = gen.generate(&pages(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, SitemapError::MalformedField { field: "lastmod", .. }));
    }

    #[test]
    fn generator_is_reusable_across_runs() {
        let gen = SitemapGenerator::builder()
            .mapping(|p: &Page| Some(RawEntryData::with_loc(format!("/p/{}", p.id))))
            .build()
            .unwrap();
        let first = gen.generate(&pages(&[1, 2])).unwrap();
        let second = gen.generate(&pages(&[3])).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second, vec![SitemapEntry::new("/p/3")]);
    }
}
