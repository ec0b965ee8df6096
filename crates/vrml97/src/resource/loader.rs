use std::sync::Arc;
use std::thread::{self, JoinHandle};

use futures_channel::oneshot;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::ResourceFetcher;
use crate::error::ResourceError;

/// Identifies one load started by a [`ResourceLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoadTicket(pub Ulid);

impl std::fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "load-{}", self.0)
    }
}

/// URL that was loaded (with the requested `#fragment` kept) and its text.
pub type LoadResult = Result<(String, String), ResourceError>;

struct InFlight {
    ticket: LoadTicket,
    worker: Option<JoinHandle<()>>,
    receiver: oneshot::Receiver<LoadResult>,
}

/// Runs fetches on worker threads, one thread per load.
///
/// There is no cancellation: a load finishes or fails, and
/// [`ResourceLoader::join_all`] waits for whatever is still running.
pub struct ResourceLoader {
    fetcher: Arc<dyn ResourceFetcher>,
    in_flight: Vec<InFlight>,
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            in_flight: Vec::new(),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn ResourceFetcher> {
        &self.fetcher
    }

    /// Start loading the first reachable URL of `urls`.
    pub fn start(&mut self, urls: Vec<String>) -> LoadTicket {
        let ticket = LoadTicket(Ulid::new());
        let (sender, receiver) = oneshot::channel();
        let fetcher = Arc::clone(&self.fetcher);
        debug!("{ticket}: loading {urls:?}");

        let spawned = thread::Builder::new()
            .name(format!("vrml97-{ticket}"))
            .spawn(move || {
                let _ = sender.send(fetch_first(fetcher.as_ref(), &urls));
            });
        let worker = match spawned {
            Ok(worker) => Some(worker),
            Err(error) => {
                warn!("{ticket}: could not start a worker: {error}");
                None
            }
        };
        self.in_flight.push(InFlight {
            ticket,
            worker,
            receiver,
        });
        ticket
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Loads that finished since the last call, in start order. Never
    /// blocks.
    pub fn poll(&mut self) -> Vec<(LoadTicket, LoadResult)> {
        let mut finished = Vec::new();
        let mut index = 0;
        while index < self.in_flight.len() {
            let load = &mut self.in_flight[index];
            let result = match load.receiver.try_recv() {
                Ok(Some(result)) => Some(result),
                Ok(None) => None,
                Err(oneshot::Canceled) => Some(Err(ResourceError::Interrupted(load.ticket.to_string()))),
            };
            match result {
                Some(result) => {
                    let mut load = self.in_flight.remove(index);
                    if let Some(worker) = load.worker.take() {
                        let _ = worker.join();
                    }
                    finished.push((load.ticket, result));
                }
                None => index += 1,
            }
        }
        finished
    }

    /// Wait for every running load and return all results not yet polled.
    pub fn join_all(&mut self) -> Vec<(LoadTicket, LoadResult)> {
        for load in &mut self.in_flight {
            if let Some(worker) = load.worker.take() {
                if worker.join().is_err() {
                    warn!("{}: worker panicked", load.ticket);
                }
            }
        }
        self.poll()
    }
}

impl Drop for ResourceLoader {
    fn drop(&mut self) {
        self.join_all();
    }
}

fn fetch_first(fetcher: &dyn ResourceFetcher, urls: &[String]) -> LoadResult {
    let mut last_error = ResourceError::unreachable(String::new(), "no URL given");
    for url in urls {
        let (location, fragment) = match url.split_once('#') {
            Some((location, fragment)) => (location, Some(fragment)),
            None => (url.as_str(), None),
        };
        let stream = match fetcher.fetch(location) {
            Ok(stream) => stream,
            Err(error) => {
                debug!("{url}: {error}");
                last_error = error;
                continue;
            }
        };
        let text = stream.text()?.to_string();
        let loaded = match fragment {
            Some(fragment) => format!("{}#{fragment}", stream.url()),
            None => stream.url().to_string(),
        };
        return Ok((loaded, text));
    }
    Err(last_error)
}
