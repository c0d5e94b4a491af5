use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sourcemap::{DecodedMap, SourceMap};
use tracing::info;

use crate::error::{StoreError, SymbolicationError};
use crate::metric_consts::{
    MAPPER_PARSE_TIME, SOURCEMAP_DIRECTIVE_FOUND, SOURCEMAP_FETCH_TIME,
};

use super::{sibling_key, source_key, ArtifactProvider, ObjectStore};

// Minified sources reference their map with a trailing directive. Both the
// modern `//#` and the legacy `//@` spellings are in the wild.
static SOURCE_MAPPING_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"//[#@]\s(sourceMappingURL)=\s*(\S+)").unwrap());

// Identity of a JS debug artifact: the script url, plus the build uuid when
// the SDK stamped one. Two builds of the same bundle url get distinct cache
// entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapRef {
    pub url: String,
    pub build_id: String,
}

impl Display for SourceMapRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.build_id.is_empty() {
            write!(f, "{}", self.url)
        } else {
            write!(f, "{}|{}", self.url, self.build_id)
        }
    }
}

pub struct SourceMapProvider {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl SourceMapProvider {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl ArtifactProvider for SourceMapProvider {
    type Ref = SourceMapRef;
    type Mapper = SourceMap;

    // Two-step flow: fetch the minified source, scan its tail for the
    // sourceMappingURL directive, then fetch the named map from the same
    // directory.
    async fn fetch(&self, r: &SourceMapRef) -> Result<Vec<u8>, StoreError> {
        let start = common_metrics::timing_guard(SOURCEMAP_FETCH_TIME, &[]);
        let source_key = source_key(&self.prefix, &r.url);

        info!("Fetching minified source at {}", source_key);
        let source = self.store.fetch(&source_key).await.map_err(|e| match e {
            StoreError::NotFound(path) => StoreError::FailedToFindSourceFile(path),
            other => other,
        })?;

        let Some(map_name) = find_source_mapping_url(&source) else {
            return Err(StoreError::FailedToFindSourceMapLocation(source_key));
        };
        metrics::counter!(SOURCEMAP_DIRECTIVE_FOUND).increment(1);

        let map_key = sibling_key(&source_key, &map_name);
        info!("Fetching source map at {}", map_key);
        let map = self.store.fetch(&map_key).await.map_err(|e| match e {
            StoreError::NotFound(path) => StoreError::FailedToFindSourceMap(path),
            other => other,
        })?;

        start.label("outcome", "success").fin();
        Ok(map)
    }

    fn parse(&self, data: Vec<u8>) -> Result<SourceMap, SymbolicationError> {
        let start =
            common_metrics::timing_guard(MAPPER_PARSE_TIME, &[]).label("kind", "sourcemap");
        let decoded = sourcemap::decode_slice(&data)
            .map_err(|e| SymbolicationError::Parse(e.to_string()))?;
        let map = match decoded {
            DecodedMap::Regular(map) => map,
            DecodedMap::Index(index) => index
                .flatten()
                .map_err(|e| SymbolicationError::Parse(e.to_string()))?,
            _ => {
                return Err(SymbolicationError::Parse(
                    "unsupported source map flavor".to_string(),
                ))
            }
        };
        start.label("outcome", "success").fin();
        Ok(map)
    }
}

// Our needle tends to be at the bottom of the haystack, so scan in reverse.
fn find_source_mapping_url(source: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(source);
    text.lines()
        .rev()
        .find_map(|line| SOURCE_MAPPING_URL.captures(line))
        .map(|caps| caps[2].to_string())
}
