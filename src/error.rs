use thiserror::Error;

/// Errors raised while building or running a sitemap generator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SitemapError {
    #[error("Invalid generator configuration: {0}")]
    Configuration(String),
    #[error("Required param `{0}` isn't set")]
    MissingRequiredField(&'static str),
    #[error("Malformed `{field}`: {reason}")]
    MalformedField { field: &'static str, reason: String },
}

impl SitemapError {
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        SitemapError::MalformedField {
            field,
            reason: reason.into(),
        }
    }
}
