use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::SymbolicationError;
use crate::symbol_store::caching::CachingLoader;
use crate::symbol_store::proguard::{ProguardProvider, ProguardRef};
use crate::symbol_store::ObjectStore;

use super::MappedFrame;

// Android convention: -1 is "unknown source", -2 is "native method". Both
// traverse the system as integer sentinels and are textualized only at output.
pub const LINE_UNKNOWN_SOURCE: i64 = -1;
pub const LINE_NATIVE_METHOD: i64 = -2;

// An obfuscated java frame, plus the proguard mapping uuid from the record.
#[derive(Debug, Clone, PartialEq)]
pub struct JavaFrame {
    pub class: String,
    pub method: String,
    pub line: i64,
    pub source_file: String,
    pub uuid: String,
}

impl JavaFrame {
    pub fn artifact_key(&self) -> String {
        self.uuid.clone()
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SymbolicateJava: Send + Sync {
    async fn symbolicate(&self, frame: &JavaFrame)
        -> Result<Vec<MappedFrame>, SymbolicationError>;

    // Best-effort deobfuscation of an exception class name, used for the
    // `<type>: <message>` header line. Failures here are swallowed - a header
    // that stays obfuscated is not a frame failure.
    async fn remap_class(&self, uuid: &str, class: &str) -> Option<String>;
}

pub struct ProguardSymbolicator {
    loader: CachingLoader<ProguardProvider>,
}

impl ProguardSymbolicator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        cache_size: u64,
        gate_timeout: Duration,
    ) -> Self {
        Self {
            loader: CachingLoader::new(ProguardProvider::new(store, prefix), cache_size, gate_timeout),
        }
    }
}

#[async_trait]
impl SymbolicateJava for ProguardSymbolicator {
    async fn symbolicate(
        &self,
        frame: &JavaFrame,
    ) -> Result<Vec<MappedFrame>, SymbolicationError> {
        // Sentinel lines bypass symbolication entirely; the caller synthesizes
        // a passthrough frame for them, same as for an empty remap result.
        if frame.line == LINE_UNKNOWN_SOURCE || frame.line == LINE_NATIVE_METHOD {
            return Ok(vec![]);
        }
        if frame.line < LINE_NATIVE_METHOD {
            return Err(SymbolicationError::InvalidLine(frame.line));
        }

        let r = ProguardRef {
            uuid: frame.uuid.clone(),
        };
        self.loader
            .with_mapper(&r, |mapping| {
                Ok(mapping.remap(&frame.class, &frame.method, frame.line as usize))
            })
            .await
    }

    async fn remap_class(&self, uuid: &str, class: &str) -> Option<String> {
        let r = ProguardRef {
            uuid: uuid.to_string(),
        };
        self.loader
            .with_mapper(&r, |mapping| Ok(mapping.remap_class(class)))
            .await
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod test {
    use crate::symbol_store::MockObjectStore;

    use super::*;

    #[tokio::test]
    async fn sentinel_lines_bypass_the_store() {
        // No expectations set: any fetch would panic the mock.
        let symbolicator = ProguardSymbolicator::new(
            Arc::new(MockObjectStore::new()),
            "",
            8,
            Duration::from_millis(100),
        );

        for line in [LINE_UNKNOWN_SOURCE, LINE_NATIVE_METHOD] {
            let frame = JavaFrame {
                class: "com.example.Test".to_string(),
                method: "run".to_string(),
                line,
                source_file: "Test.java".to_string(),
                uuid: "uuid-1".to_string(),
            };
            assert!(symbolicator.symbolicate(&frame).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn lines_below_the_sentinels_fail_validation() {
        let symbolicator = ProguardSymbolicator::new(
            Arc::new(MockObjectStore::new()),
            "",
            8,
            Duration::from_millis(100),
        );
        let frame = JavaFrame {
            class: "com.example.Test".to_string(),
            method: "run".to_string(),
            line: -3,
            source_file: "Test.java".to_string(),
            uuid: "uuid-1".to_string(),
        };
        let err = symbolicator.symbolicate(&frame).await.unwrap_err();
        assert!(matches!(err, SymbolicationError::InvalidLine(-3)));
    }
}
