//! Record sources and the glue that runs a generator over one.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use tracing::{info, instrument};

use crate::generator::SitemapGenerator;
use crate::model::SitemapEntry;

/// Narrows a source's query before it runs.
pub type ScopeFn<Q> = Box<dyn Fn(Q) -> Q + Send + Sync>;

/// Produces an ordered, finite list of records for a query.
#[async_trait]
pub trait RecordSource: Send + Sync {
    type Record: Send + Sync;
    type Query: Send;

    /// The unscoped query that selects every record.
    fn query(&self) -> Self::Query;

    async fn fetch_all(&self, query: Self::Query) -> Result<Vec<Self::Record>>;
}

/// A record source paired with an optional scope and a generator.
pub struct ScopedSitemap<S: RecordSource> {
    source: S,
    scope: Option<ScopeFn<S::Query>>,
    generator: SitemapGenerator<S::Record>,
}

impl<S: RecordSource> fmt::Debug for ScopedSitemap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedSitemap")
            .field("scoped", &self.scope.is_some())
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl<S: RecordSource> ScopedSitemap<S> {
    pub fn new(source: S, generator: SitemapGenerator<S::Record>) -> Self {
        Self {
            source,
            scope: None,
            generator,
        }
    }

    pub fn with_scope<F>(mut self, scope: F) -> Self
    where
        F: Fn(S::Query) -> S::Query + Send + Sync + 'static,
    {
        self.scope = Some(Box::new(scope));
        self
    }

    /// Query the source and map every record into an entry.
    ///
    /// Errors from the source are returned as-is; generation errors are
    /// [`crate::error::SitemapError`] values inside the `anyhow::Error`.
    #[instrument(skip_all)]
    pub async fn generate(&self) -> Result<Vec<SitemapEntry>> {
        let mut query = self.source.query();
        if let Some(scope) = &self.scope {
            query = scope(query);
        }
        let records = self.source.fetch_all(query).await?;
        let fetched = records.len();
        let entries = self.generator.generate(&records)?;
        info!(fetched, entries = entries.len(), "sitemap generated");
        Ok(entries)
    }
}

/// In-memory source. Its query is the record list itself, so a scope can
/// filter or reorder it directly.
#[derive(Debug, Clone, Default)]
pub struct VecSource<R> {
    records: Vec<R>,
}

impl<R> VecSource<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl<R> RecordSource for VecSource<R>
where
    R: Clone + Send + Sync,
{
    type Record = R;
    type Query = Vec<R>;

    fn query(&self) -> Vec<R> {
        self.records.clone()
    }

    async fn fetch_all(&self, query: Vec<R>) -> Result<Vec<R>> {
        Ok(query)
    }
}
