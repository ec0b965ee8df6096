//! Fetching the worlds and PROTO libraries a scene refers to.
//!
//! The scene only ever sees finished [`ResourceStream`]s. Where the bytes
//! come from is up to a [`ResourceFetcher`]; fetches run on worker threads
//! owned by a [`ResourceLoader`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::error::ResourceError;

mod loader;
mod rw_mutex;
mod stream_registry;

pub use loader::{LoadResult, LoadTicket, ResourceLoader};
pub use rw_mutex::{ReadGuard, RwMutex, UpgradableReadGuard, WriteGuard};
pub use stream_registry::{HostFetcher, StreamRegistry};

pub const VRML_MIME_TYPE: &str = "model/vrml";

/// Source of resource bytes. Called from loader worker threads.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<ResourceStream, ResourceError>;
}

impl<F: ResourceFetcher + ?Sized> ResourceFetcher for Arc<F> {
    fn fetch(&self, url: &str) -> Result<ResourceStream, ResourceError> {
        (**self).fetch(url)
    }
}

/// Bytes of one resource together with the identity the source gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceStream {
    url: String,
    mime_type: String,
    data: Vec<u8>,
}

impl ResourceStream {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// URL the data was actually loaded from, after any redirection.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data_available(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn text(&self) -> Result<&str, ResourceError> {
        std::str::from_utf8(&self.data).map_err(|_| ResourceError::NotText(self.url.clone()))
    }
}

/// Resolve `relative` against the URL of the document that mentions it.
///
/// Absolute URLs and rooted paths are returned unchanged; anything else
/// replaces the last path segment of `base`.
pub fn resolve_url(base: &str, relative: &str) -> String {
    if url::Url::parse(relative).is_ok() || relative.starts_with('/') {
        return relative.to_string();
    }
    if let Ok(base) = url::Url::parse(base) {
        if let Ok(joined) = base.join(relative) {
            return joined.to_string();
        }
    }
    let base = base.split(['#', '?']).next().unwrap_or_default();
    let directory = match base.rfind('/') {
        Some(slash) => &base[..=slash],
        None => "",
    };
    normalize_path(&format!("{directory}{relative}"))
}

/// Drop `.` segments and fold `..` into the preceding segment.
fn normalize_path(path: &str) -> String {
    let (path, fragment) = match path.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (path, None),
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "." => {}
            ".." if segments.last().is_some_and(|last| *last != "..") => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    let mut normalized = segments.join("/");
    if let Some(fragment) = fragment {
        normalized.push('#');
        normalized.push_str(fragment);
    }
    normalized
}

fn guess_mime_type(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|extension| extension.to_str()) {
        Some("wrl" | "vrml") => VRML_MIME_TYPE,
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Reads `file:` URLs and plain paths from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher;

impl FileFetcher {
    fn path(url: &str) -> Result<String, ResourceError> {
        if let Ok(parsed) = url::Url::parse(url) {
            if parsed.scheme() == "file" {
                return parsed
                    .to_file_path()
                    .map(|path| path.to_string_lossy().into_owned())
                    .map_err(|()| ResourceError::unreachable(url, "not a local path"));
            }
            // Windows drive letters parse as a one-letter scheme
            if parsed.scheme().len() > 1 {
                return Err(ResourceError::unreachable(url, format!("unsupported scheme {}", parsed.scheme())));
            }
        }
        Ok(url.to_string())
    }
}

impl ResourceFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<ResourceStream, ResourceError> {
        let path = Self::path(url)?;
        debug!("reading {path}");
        let data = std::fs::read(&path).map_err(|error| ResourceError::unreachable(url, error))?;
        Ok(ResourceStream::new(url, guess_mime_type(&path), data))
    }
}

/// In-memory resources, keyed by exact URL.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    resources: HashMap<String, ResourceStream>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a VRML document.
    pub fn with(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(url, VRML_MIME_TYPE, text.into().into_bytes());
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) {
        let url = url.into();
        let stream = ResourceStream::new(url.clone(), mime_type, data);
        self.resources.insert(url, stream);
    }
}

impl ResourceFetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<ResourceStream, ResourceError> {
        self.resources
            .get(url)
            .cloned()
            .ok_or_else(|| ResourceError::unreachable(url, "no such resource"))
    }
}
