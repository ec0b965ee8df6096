//! Streams pushed in by an embedding host.
//!
//! A fetch registers its request URL and waits. The host later announces a
//! stream for that URL under its own stream id (possibly after redirects,
//! with the MIME type it settled on), writes data to it and destroys it.
//! Until `new_stream` arrives the stream can only be found by request URL,
//! afterwards only by stream id.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use log::debug;

use super::rw_mutex::RwMutex;
use super::{ResourceFetcher, ResourceStream};
use crate::error::ResourceError;

#[derive(Debug, Default)]
struct StreamData {
    url: Option<String>,
    mime_type: Option<String>,
    data: Vec<u8>,
    outcome: Option<Result<(), ResourceError>>,
}

/// One pending stream, shared between the waiting fetch and the host.
#[derive(Debug, Default)]
struct HostStream {
    data: Mutex<StreamData>,
    finished: Condvar,
}

impl HostStream {
    fn finish(&self, outcome: Result<(), ResourceError>) {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.outcome.get_or_insert(outcome);
        self.finished.notify_all();
    }

    fn wait(&self, request_url: &str) -> Result<ResourceStream, ResourceError> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        while data.outcome.is_none() {
            data = self.finished.wait(data).unwrap_or_else(PoisonError::into_inner);
        }
        data.outcome.clone().unwrap_or(Ok(()))?;
        Ok(ResourceStream::new(
            data.url.clone().unwrap_or_else(|| request_url.to_string()),
            data.mime_type.clone().unwrap_or_default(),
            data.data.clone(),
        ))
    }
}

/// Request URL → unidentified stream, stream id → identified stream.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    unidentified: RwMutex<HashMap<String, Arc<HostStream>>>,
    identified: RwMutex<HashMap<u64, Arc<HostStream>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concurrent fetches of one URL share its stream.
    fn request(&self, url: &str) -> Arc<HostStream> {
        let mut pending = self.unidentified.write();
        Arc::clone(pending.entry(url.to_string()).or_default())
    }

    /// URLs waiting for the host to open a stream.
    pub fn pending_requests(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.unidentified.read().keys().cloned().collect();
        urls.sort();
        urls
    }

    /// The host opened `stream_id` for the request made for `request_url`.
    /// `url` is where the data really comes from.
    pub fn new_stream(
        &self,
        request_url: &str,
        stream_id: u64,
        url: &str,
        mime_type: &str,
    ) -> Result<(), ResourceError> {
        let pending = self.unidentified.upgradable_read();
        if !pending.contains_key(request_url) {
            return Err(ResourceError::UnknownStream(request_url.to_string()));
        }
        let stream = pending.upgrade().remove(request_url);
        let Some(stream) = stream else {
            return Err(ResourceError::UnknownStream(request_url.to_string()));
        };
        {
            let mut data = stream.data.lock().unwrap_or_else(PoisonError::into_inner);
            data.url = Some(url.to_string());
            data.mime_type = Some(mime_type.to_string());
        }
        debug!("stream {stream_id} opened for {request_url} ({mime_type})");
        self.identified.write().insert(stream_id, stream);
        Ok(())
    }

    /// Append data to an open stream.
    pub fn write(&self, stream_id: u64, bytes: &[u8]) -> Result<usize, ResourceError> {
        let streams = self.identified.read();
        let stream = streams
            .get(&stream_id)
            .ok_or_else(|| ResourceError::UnknownStream(stream_id.to_string()))?;
        stream
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Close a stream. `completed` is false when the host gave up on it.
    pub fn destroy_stream(&self, stream_id: u64, completed: bool) -> Result<(), ResourceError> {
        let stream = self
            .identified
            .write()
            .remove(&stream_id)
            .ok_or_else(|| ResourceError::UnknownStream(stream_id.to_string()))?;
        let outcome = if completed {
            Ok(())
        } else {
            let url = stream.data.lock().unwrap_or_else(PoisonError::into_inner).url.clone();
            Err(ResourceError::Interrupted(url.unwrap_or_else(|| stream_id.to_string())))
        };
        debug!("stream {stream_id} destroyed (completed: {completed})");
        stream.finish(outcome);
        Ok(())
    }

    /// The host cannot provide `request_url` at all.
    pub fn fail_request(&self, request_url: &str, reason: &str) -> Result<(), ResourceError> {
        let stream = self
            .unidentified
            .write()
            .remove(request_url)
            .ok_or_else(|| ResourceError::UnknownStream(request_url.to_string()))?;
        stream.finish(Err(ResourceError::unreachable(request_url, reason)));
        Ok(())
    }
}

/// Fetcher that hands every request to the host through a
/// [`StreamRegistry`] and blocks its worker until the host is done.
#[derive(Debug, Clone, Default)]
pub struct HostFetcher {
    registry: Arc<StreamRegistry>,
}

impl HostFetcher {
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }
}

impl ResourceFetcher for HostFetcher {
    fn fetch(&self, url: &str) -> Result<ResourceStream, ResourceError> {
        self.registry.request(url).wait(url)
    }
}
