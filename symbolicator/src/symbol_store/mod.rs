use std::fmt::Display;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::{StoreError, SymbolicationError};

pub mod caching;
pub mod gcs;
pub mod local;
pub mod proguard;
pub mod s3;
pub mod sourcemap;

// A pluggable debug-artifact backend. Implementations map a logical key to a
// backend object and must report "the object isn't there" distinctly from
// "we couldn't talk to the backend" - the caching layer treats both as grounds
// for a negative-cache entry, but users see very different messages.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

// A source of parsed mappers. Fetch and parse are split so the caching layer
// can negative-cache fetch failures while letting parse failures stay
// transient.
#[async_trait]
pub trait ArtifactProvider: Send + Sync + 'static {
    type Ref: Display + Send + Sync;
    type Mapper: Send + Sync + 'static;

    async fn fetch(&self, r: &Self::Ref) -> Result<Vec<u8>, StoreError>;
    fn parse(&self, data: Vec<u8>) -> Result<Self::Mapper, SymbolicationError>;
}

pub(crate) fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

// Computes the storage key for a minified source url:
// <prefix>/<basename(url.path)>[?<query>]
pub(crate) fn source_key(prefix: &str, url: &str) -> String {
    let url = url.split('#').next().unwrap_or(url);
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };
    let base = path.rsplit('/').next().unwrap_or(path);
    let mut key = join_key(prefix, base);
    if let Some(query) = query {
        key.push('?');
        key.push_str(query);
    }
    key
}

// The source map named by a sourceMappingURL directive lives next to the
// source it was found in.
pub(crate) fn sibling_key(key: &str, name: &str) -> String {
    match key.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{name}"),
        None => name.to_string(),
    }
}
