use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::SymbolicationError;
use crate::symbol_store::caching::CachingLoader;
use crate::symbol_store::sourcemap::{SourceMapProvider, SourceMapRef};
use crate::symbol_store::ObjectStore;

use super::{validate_position, MappedFrame};

// A minified JS stack frame, plus the build uuid from the record's resource
// (empty when the SDK didn't stamp one).
#[derive(Debug, Clone, PartialEq)]
pub struct JsFrame {
    pub function: String,
    pub url: String,
    pub build_id: String,
    pub line: i64,
    pub column: i64,
}

impl JsFrame {
    pub fn artifact_ref(&self) -> SourceMapRef {
        SourceMapRef {
            url: self.url.clone(),
            build_id: self.build_id.clone(),
        }
    }

    pub fn artifact_key(&self) -> String {
        self.artifact_ref().to_string()
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SymbolicateJs: Send + Sync {
    async fn symbolicate(&self, frame: &JsFrame) -> Result<Vec<MappedFrame>, SymbolicationError>;
}

pub struct SourceMapSymbolicator {
    loader: CachingLoader<SourceMapProvider>,
}

impl SourceMapSymbolicator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        cache_size: u64,
        gate_timeout: Duration,
    ) -> Self {
        Self {
            loader: CachingLoader::new(SourceMapProvider::new(store, prefix), cache_size, gate_timeout),
        }
    }
}

#[async_trait]
impl SymbolicateJs for SourceMapSymbolicator {
    async fn symbolicate(&self, frame: &JsFrame) -> Result<Vec<MappedFrame>, SymbolicationError> {
        // Frames with no source url are native-frame markers. There's nothing
        // to look up, so echo them through without touching the cache.
        if frame.url.is_empty() {
            return Ok(vec![MappedFrame {
                name: frame.function.clone(),
                source: String::new(),
                line: frame.line,
                column: frame.column,
            }]);
        }

        let (line, column) = validate_position(frame.line, frame.column)?;
        let r = frame.artifact_ref();

        self.loader
            .with_mapper(&r, |map| {
                let Some(token) = map.lookup_token(line, column) else {
                    return Err(SymbolicationError::TokenNotFound(
                        frame.url.clone(),
                        line,
                        column,
                    ));
                };
                Ok(vec![MappedFrame {
                    name: token
                        .get_name()
                        .unwrap_or(frame.function.as_str())
                        .to_string(),
                    source: token.get_source().unwrap_or_default().to_string(),
                    // Token positions are 0-based; emitted positions follow the
                    // browser's 1-based convention.
                    line: i64::from(token.get_src_line()) + 1,
                    column: i64::from(token.get_src_col()) + 1,
                }])
            })
            .await
    }
}
