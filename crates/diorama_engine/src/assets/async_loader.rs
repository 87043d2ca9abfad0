//! Background asset loading
//!
//! A single worker thread services requests in FIFO order and reports back
//! over a channel. The frame thread polls for results; once the loader is
//! shut down, anything still in flight is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver, Sender};

use super::obj_loader::ModelAsset;
use super::resource_cache::ResourceCache;
use super::AssetError;
use crate::render::Texture;

/// Work run on the loader thread against the shared cache
pub type LoadTask = Box<dyn FnOnce(&ResourceCache) -> Result<LoadedAsset, AssetError> + Send>;

/// What to load
pub enum AssetRequest {
    /// OBJ model at a URL
    Model(String),
    /// Image at a URL
    Texture(String),
    /// Raw bytes at a URL (fonts)
    Bytes(String),
    /// Arbitrary fetch, e.g. a template lookup
    Task(LoadTask),
}

impl std::fmt::Debug for AssetRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model(url) => write!(f, "Model({url})"),
            Self::Texture(url) => write!(f, "Texture({url})"),
            Self::Bytes(url) => write!(f, "Bytes({url})"),
            Self::Task(_) => write!(f, "Task"),
        }
    }
}

/// Result payload delivered to the frame thread
#[derive(Debug, Clone)]
pub enum LoadedAsset {
    /// Independent copy of a cached model
    Model(ModelAsset),
    /// Shared decoded image
    Texture(Arc<Texture>),
    /// Shared raw bytes
    Bytes(Arc<Vec<u8>>),
    /// Parsed JSON document
    Document(serde_json::Value),
}

/// Identifies a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetTicket(u64);

/// A finished request and its outcome
pub type Completion = (AssetTicket, Result<LoadedAsset, AssetError>);

/// Worker-thread asset loader
pub struct AsyncLoader {
    sender: Option<Sender<(AssetTicket, AssetRequest)>>,
    results: Receiver<Completion>,
    worker: Option<JoinHandle<()>>,
    closed: Arc<AtomicBool>,
    next_ticket: u64,
}

impl AsyncLoader {
    /// Spawn the worker thread
    pub fn new(cache: Arc<ResourceCache>) -> Self {
        let (sender, requests) = unbounded::<(AssetTicket, AssetRequest)>();
        let (done, results) = unbounded::<Completion>();
        let closed = Arc::new(AtomicBool::new(false));
        let worker_closed = Arc::clone(&closed);

        let worker = std::thread::Builder::new()
            .name("asset-loader".to_string())
            .spawn(move || {
                for (ticket, request) in requests {
                    if worker_closed.load(Ordering::SeqCst) {
                        break;
                    }
                    log::trace!("Loading {:?}", request);
                    let result = match request {
                        AssetRequest::Model(url) => cache.load_model(&url).map(LoadedAsset::Model),
                        AssetRequest::Texture(url) => cache.load_texture(&url).map(LoadedAsset::Texture),
                        AssetRequest::Bytes(url) => cache.load_bytes(&url).map(LoadedAsset::Bytes),
                        AssetRequest::Task(task) => task(cache.as_ref()),
                    };
                    if done.send((ticket, result)).is_err() {
                        break;
                    }
                }
                log::debug!("Asset loader thread exiting");
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to spawn asset loader thread: {}", e);
                closed.store(true, Ordering::SeqCst);
                None
            }
        };

        Self {
            sender: worker.as_ref().map(|_| sender),
            results,
            worker,
            closed,
            next_ticket: 1,
        }
    }

    /// Queue a request
    ///
    /// # Errors
    /// [`AssetError::LoaderClosed`] after [`shutdown`](Self::shutdown).
    pub fn request(&mut self, request: AssetRequest) -> Result<AssetTicket, AssetError> {
        let sender = self.sender.as_ref().ok_or(AssetError::LoaderClosed)?;
        let ticket = AssetTicket(self.next_ticket);
        self.next_ticket += 1;
        sender
            .send((ticket, request))
            .map_err(|_| AssetError::LoaderClosed)?;
        Ok(ticket)
    }

    /// Drain finished requests without blocking
    pub fn poll(&mut self) -> Vec<Completion> {
        if self.is_closed() {
            return Vec::new();
        }
        self.results.try_iter().collect()
    }

    /// Block until the next request finishes
    ///
    /// # Errors
    /// [`AssetError::LoaderClosed`] when shut down or the worker has exited.
    pub fn wait(&mut self) -> Result<Completion, AssetError> {
        if self.is_closed() {
            return Err(AssetError::LoaderClosed);
        }
        self.results.recv().map_err(|_| AssetError::LoaderClosed)
    }

    /// Whether the worker has shut down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting work and join the worker; pending results are dropped
    pub fn shutdown(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) && self.worker.is_none() {
            return;
        }
        self.sender = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Asset loader thread panicked");
            }
        }
        let discarded = self.results.try_iter().count();
        if discarded > 0 {
            log::debug!("Discarded {} late asset results", discarded);
        }
    }
}

impl Drop for AsyncLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetFetcher, MemoryFetcher};

    fn loader() -> AsyncLoader {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("a.txt", b"alpha".to_vec());
        let cache = Arc::new(ResourceCache::new(fetcher as Arc<dyn AssetFetcher>, ""));
        AsyncLoader::new(cache)
    }

    #[test]
    fn test_requests_complete_in_order() {
        let mut loader = loader();
        let first = loader.request(AssetRequest::Bytes("a.txt".into())).unwrap();
        let second = loader.request(AssetRequest::Bytes("missing".into())).unwrap();

        let (ticket, result) = loader.wait().unwrap();
        assert_eq!(ticket, first);
        match result.unwrap() {
            LoadedAsset::Bytes(bytes) => assert_eq!(bytes.as_slice(), b"alpha"),
            other => panic!("unexpected {other:?}"),
        }
        let (ticket, result) = loader.wait().unwrap();
        assert_eq!(ticket, second);
        assert!(matches!(result, Err(AssetError::NotFound(_))));
    }

    #[test]
    fn test_task_runs_against_cache() {
        let mut loader = loader();
        loader
            .request(AssetRequest::Task(Box::new(|cache| {
                let bytes = cache.load_bytes("a.txt")?;
                Ok(LoadedAsset::Document(serde_json::json!({ "len": bytes.len() })))
            })))
            .unwrap();
        let (_, result) = loader.wait().unwrap();
        match result.unwrap() {
            LoadedAsset::Document(doc) => assert_eq!(doc["len"], 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_shutdown_discards_and_refuses() {
        let mut loader = loader();
        loader.request(AssetRequest::Bytes("a.txt".into())).unwrap();
        loader.shutdown();
        assert!(loader.poll().is_empty());
        assert!(matches!(loader.wait(), Err(AssetError::LoaderClosed)));
        assert!(matches!(
            loader.request(AssetRequest::Bytes("a.txt".into())),
            Err(AssetError::LoaderClosed)
        ));
        loader.shutdown();
    }
}
