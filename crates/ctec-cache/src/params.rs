//! Per-call cache configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::key::DependencySet;

/// Explicit configuration passed to every cache read and write.
///
/// - `dependencies`: tables the value depends on; empty means tag-only.
/// - `tag`: optional label for direct lookup and invalidation.
/// - `ttl`: entry lifetime; `None` falls back to the cache default.
/// - `auto_invalidate`: when `false`, reads go straight to the tag-only partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheParams {
    pub dependencies: DependencySet,
    pub tag: Option<String>,
    pub ttl: Option<Duration>,
    pub auto_invalidate: bool,
}

impl CacheParams {
    /// Entry invalidated whenever any of `tables` is mutated.
    pub fn tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dependencies: tables.into_iter().collect(),
            tag: None,
            ttl: None,
            auto_invalidate: true,
        }
    }

    /// Entry with no table dependencies, invalidated only by tag or TTL.
    pub fn tag_only() -> Self {
        Self {
            dependencies: DependencySet::new(),
            tag: None,
            ttl: None,
            auto_invalidate: false,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn with_auto_invalidate(mut self, auto_invalidate: bool) -> Self {
        self.auto_invalidate = auto_invalidate;
        self
    }

    /// Lifetime actually applied to a write; zero means no expiry.
    pub(crate) fn effective_ttl(&self, default: Option<Duration>) -> Option<Duration> {
        self.ttl.or(default).filter(|ttl| !ttl.is_zero())
    }
}

/// Tags and tables to purge in one atomic invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub tags: BTreeSet<String>,
    pub tables: BTreeSet<String>,
}

impl Invalidation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate everything that depends on `tables`.
    pub fn tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().with_tables(tables)
    }

    /// Invalidate the entries written under `tags`.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().with_tags(tags)
    }

    #[must_use]
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.extend(tables.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_ttl() {
        let params = CacheParams::tables(["players"]);
        assert_eq!(params.effective_ttl(None), None);
        assert_eq!(
            params.effective_ttl(Some(Duration::from_secs(120))),
            Some(Duration::from_secs(120))
        );

        let params = params.with_ttl(Duration::from_secs(5));
        assert_eq!(
            params.effective_ttl(Some(Duration::from_secs(120))),
            Some(Duration::from_secs(5))
        );

        let params = CacheParams::tag_only().with_ttl(Duration::ZERO);
        assert_eq!(params.effective_ttl(Some(Duration::from_secs(120))), None);
    }

    #[test]
    fn test_invalidation_builder() {
        let inv = Invalidation::tables(["players", "servers"]).with_tags(["x"]);
        assert!(!inv.is_empty());
        assert_eq!(inv.tables.len(), 2);
        assert!(inv.tags.contains("x"));
        assert!(Invalidation::new().is_empty());
    }
}
