//! Latest-wins guard for dependent lookups
//!
//! Lookups such as artifact tags are keyed by an input the user keeps
//! editing. Every new request supersedes the previous one: the old task is
//! aborted and, should it still finish, its response is dropped because its
//! generation is no longer the newest.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::{ApiError, NgClient};

/// Observable state of a guarded lookup
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    Idle,
    Loading { generation: u64 },
    Ready { generation: u64, value: T },
    Failed { generation: u64, error: ApiError },
}

impl<T> FetchState<T> {
    pub fn generation(&self) -> Option<u64> {
        match self {
            FetchState::Idle => None,
            FetchState::Loading { generation }
            | FetchState::Ready { generation, .. }
            | FetchState::Failed { generation, .. } => Some(*generation),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            FetchState::Ready { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Runs at most one lookup at a time, newest request wins
pub struct LatestOnly<T> {
    latest: Arc<AtomicU64>,
    state: Arc<watch::Sender<FetchState<T>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> LatestOnly<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (state, _) = watch::channel(FetchState::Idle);
        Self {
            latest: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
            task: Mutex::new(None),
        }
    }

    /// Generation of the newest request
    pub fn generation(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }

    /// Start a lookup, superseding any in flight; returns its generation
    ///
    /// Must be called from within a tokio runtime.
    pub fn request<F>(&self, lookup: F) -> u64
    where
        F: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        // The lock orders concurrent callers: the newest generation is
        // always the last one published
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = task.take() {
            previous.abort();
        }
        self.state.send_replace(FetchState::Loading { generation });

        let latest = Arc::clone(&self.latest);
        let state = Arc::clone(&self.state);
        *task = Some(tokio::spawn(async move {
            let result = lookup.await;
            state.send_if_modified(|current| {
                if latest.load(Ordering::SeqCst) != generation {
                    tracing::debug!(generation, "dropping stale lookup response");
                    return false;
                }
                *current = match result {
                    Ok(value) => FetchState::Ready { generation, value },
                    Err(error) => FetchState::Failed { generation, error },
                };
                true
            });
        }));
        generation
    }

    /// Abort the lookup in flight and reset to `Idle`
    pub fn cancel(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        self.latest.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = task.take() {
            previous.abort();
        }
        self.state.send_replace(FetchState::Idle);
    }

    /// Wait until the newest request settles
    ///
    /// Returns `Idle` if the lookup is cancelled while waiting.
    pub async fn settled(&self) -> FetchState<T> {
        let mut rx = self.subscribe();
        let latest = Arc::clone(&self.latest);
        let result = rx
            .wait_for(|state| match state {
                FetchState::Idle => true,
                FetchState::Loading { .. } => false,
                settled => settled.generation() == Some(latest.load(Ordering::SeqCst)),
            })
            .await
            .map(|state| state.clone());
        result.unwrap_or(FetchState::Idle)
    }
}

impl<T> Default for LatestOnly<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LatestOnly<T> {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

/// Backend that lists image tags
#[async_trait]
pub trait TagSource: Send + Sync + 'static {
    async fn tags(&self, connector_ref: &str, image_path: &str) -> Result<Vec<String>, ApiError>;
}

#[async_trait]
impl TagSource for NgClient {
    async fn tags(&self, connector_ref: &str, image_path: &str) -> Result<Vec<String>, ApiError> {
        self.list_docker_tags(connector_ref, image_path).await
    }
}

/// Tag list that follows the image path being typed
pub struct TagLookup<S> {
    source: Arc<S>,
    guard: LatestOnly<Vec<String>>,
}

impl<S: TagSource> TagLookup<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            guard: LatestOnly::new(),
        }
    }

    /// Refetch tags for a new image path
    pub fn image_changed(&self, connector_ref: &str, image_path: &str) -> u64 {
        let source = Arc::clone(&self.source);
        let connector_ref = connector_ref.to_string();
        let image_path = image_path.to_string();
        self.guard
            .request(async move { source.tags(&connector_ref, &image_path).await })
    }

    pub fn guard(&self) -> &LatestOnly<Vec<String>> {
        &self.guard
    }

    /// Tags of the newest image path, once loaded
    pub async fn tags(&self) -> Result<Vec<String>, ApiError> {
        match self.guard.settled().await {
            FetchState::Ready { value, .. } => Ok(value),
            FetchState::Failed { error, .. } => Err(error),
            FetchState::Idle | FetchState::Loading { .. } => Ok(Vec::new()),
        }
    }
}
