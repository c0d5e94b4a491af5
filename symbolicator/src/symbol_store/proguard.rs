use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use proguard::{ProguardMapper, ProguardMapping, StackFrame};

use crate::error::{StoreError, SymbolicationError};
use crate::langs::MappedFrame;
use crate::metric_consts::{MAPPER_PARSE_TIME, PROGUARD_FETCH_TIME};

use super::{join_key, ArtifactProvider, ObjectStore};

// Identity of a proguard mapping artifact - the build uuid the SDK stamped on
// the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProguardRef {
    pub uuid: String,
}

impl Display for ProguardRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

pub struct ProguardProvider {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ProguardProvider {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl ArtifactProvider for ProguardProvider {
    type Ref = ProguardRef;
    type Mapper = FetchedMapping;

    async fn fetch(&self, r: &ProguardRef) -> Result<Vec<u8>, StoreError> {
        let start = common_metrics::timing_guard(PROGUARD_FETCH_TIME, &[]);
        let key = join_key(&self.prefix, &format!("{}.txt", r.uuid));
        let res = self.store.fetch(&key).await;
        start
            .label("outcome", if res.is_ok() { "success" } else { "failure" })
            .fin();
        res
    }

    fn parse(&self, data: Vec<u8>) -> Result<FetchedMapping, SymbolicationError> {
        let start =
            common_metrics::timing_guard(MAPPER_PARSE_TIME, &[]).label("kind", "proguard");
        let content = String::from_utf8(data)
            .map_err(|_| SymbolicationError::Parse("mapping is not valid utf-8".to_string()))?;
        let mapping = FetchedMapping::new(content)?;
        start.label("outcome", "success").fin();
        Ok(mapping)
    }
}

// A validated proguard mapping. Mapper construction is cheap relative to the
// fetch, so we hold the raw mapping text and rebuild the mapper on each use
// rather than fighting the borrow it would hold on our own field.
#[derive(Debug)]
pub struct FetchedMapping {
    content: String,
}

impl FetchedMapping {
    pub fn new(content: String) -> Result<Self, SymbolicationError> {
        let mapping = ProguardMapping::new(content.as_bytes());
        if !mapping.is_valid() {
            return Err(SymbolicationError::Parse(
                "invalid proguard mapping".to_string(),
            ));
        }
        Ok(Self { content })
    }

    // Remaps one obfuscated frame. Zero results means the mapping has no entry
    // for the class or method, which callers treat as "no remapping needed".
    // More than one result means the compiler inlined calls; frames come back
    // innermost first.
    pub fn remap(&self, class: &str, method: &str, line: usize) -> Vec<MappedFrame> {
        let mapping = ProguardMapping::new(self.content.as_bytes());
        let mapper = ProguardMapper::new(mapping);
        mapper
            .remap_frame(&StackFrame::new(class, method, line))
            .map(|frame| MappedFrame {
                name: format!("{}.{}", frame.class(), frame.method()),
                source: frame
                    .file()
                    .map(str::to_string)
                    .unwrap_or_else(|| default_source_file(frame.class())),
                line: frame.line().map(|l| l as i64).unwrap_or(0),
                column: 0,
            })
            .collect()
    }

    pub fn remap_class(&self, class: &str) -> Option<String> {
        let mapping = ProguardMapping::new(self.content.as_bytes());
        let mapper = ProguardMapper::new(mapping);
        mapper.remap_class(class).map(str::to_string)
    }
}

// Retrace convention: when the mapping doesn't name a file, derive it from the
// simple class name, dropping any inner-class suffix.
fn default_source_file(class: &str) -> String {
    let simple = class.rsplit('.').next().unwrap_or(class);
    let simple = simple.split('$').next().unwrap_or(simple);
    format!("{simple}.java")
}
