//! Build XML sitemaps from database records.
//!
//! A [`SitemapGenerator`] maps records to [`SitemapEntry`] values; a
//! [`ScopedSitemap`] pairs it with a [`RecordSource`] and an optional scope.

pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod mapping;
pub mod model;
pub mod sitemap;
pub mod source;
pub mod xml;

pub use error::SitemapError;
pub use generator::{EntryMapper, SitemapGenerator, SitemapGeneratorBuilder};
pub use model::{ChangeFreq, RawEntryData, SitemapEntry};
pub use source::{RecordSource, ScopedSitemap, VecSource};
