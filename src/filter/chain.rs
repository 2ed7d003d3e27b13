//! Ordered filter pipeline

use std::sync::Arc;

use tracing::{debug, trace};

use super::{
    ContentFilter, DecryptionFilter, Decryptor, InflateFilter, ObfuscationFilter, Result,
};
use crate::config::FilterConfig;
use crate::package::{ManifestItem, Package};
use crate::stream::BoxedStream;

/// Immutable, ordered list of content filters
///
/// Cloning shares the underlying list. The chain applies filters exactly in
/// the order given; callers order decryption before decompression.
#[derive(Debug, Clone)]
pub struct FilterChain {
    filters: Arc<[Arc<dyn ContentFilter>]>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn ContentFilter>>) -> Self {
        Self {
            filters: filters.into(),
        }
    }

    /// Chain that never transforms anything
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Default EPUB chain: decrypt, then inflate, then deobfuscate fonts.
    ///
    /// Without a decryptor, encrypted resources pass through untouched,
    /// compressed or not.
    pub fn for_package(
        package: &Package,
        config: &FilterConfig,
        decryptor: Option<Arc<dyn Decryptor>>,
    ) -> Self {
        let mut filters: Vec<Arc<dyn ContentFilter>> = Vec::new();
        if let Some(decryptor) = decryptor {
            let algorithm = decryptor.algorithm().to_string();
            filters.push(Arc::new(DecryptionFilter::new(decryptor)));
            if config.inflate {
                filters.push(Arc::new(InflateFilter::new(algorithm)));
            }
        }
        if config.deobfuscate_fonts {
            filters.push(Arc::new(ObfuscationFilter::new(&package.package_id)));
        }
        debug!(
            package = %package.unique_id,
            filters = ?filters.iter().map(|f| f.name()).collect::<Vec<_>>(),
            "Built filter chain"
        );
        Self::new(filters)
    }

    pub fn filters(&self) -> &[Arc<dyn ContentFilter>] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filters that would transform `item`, in chain order
    pub fn applicable<'a>(
        &'a self,
        item: &'a ManifestItem,
    ) -> impl Iterator<Item = &'a Arc<dyn ContentFilter>> + 'a {
        self.filters.iter().filter(move |f| f.applies_to(item))
    }

    /// Compose every applicable filter over `raw`.
    ///
    /// Returns `raw` itself when nothing applies.
    pub fn filtered_stream(&self, raw: BoxedStream, item: &ManifestItem) -> Result<BoxedStream> {
        let mut stream = raw;
        let mut applied = 0usize;
        for filter in self.applicable(item) {
            trace!(item = %item.id, filter = filter.name(), operation = %filter.operation(), "Applying filter");
            stream = filter.wrap(stream, item)?;
            applied += 1;
        }
        if applied > 0 {
            debug!(item = %item.id, applied, "Filtered manifest item stream");
        }
        Ok(stream)
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::empty()
    }
}
