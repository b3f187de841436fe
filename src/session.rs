//! Session-level collaborators the coordinator reads but never owns:
//! the caching policy, the event handler, the stop signal, and the
//! execution-context mode that feeds result-strategy selection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Result;
use crate::metadata::{ResultMetadata, ResultRow};
use crate::query::result::ResultIterator;

/// Which part of the report lifecycle is driving this execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Generating a report document for later presentation.
    Generation,
    /// Rendering straight from the data source, no intermediate document.
    DirectPresentation,
    /// Presenting a previously generated document.
    Presentation,
}

/// The data-set design the caching policy is currently working against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataSetDesign {
    /// Design name.
    pub name: String,
    /// Primary result set addressed by name, when the design names one.
    pub primary_result_set_name: Option<String>,
    /// Primary result set addressed by 1-based number; zero means unset.
    pub primary_result_set_number: u32,
    /// Row-fetch cap configured on the design; zero means unlimited.
    pub row_fetch_limit: u32,
}

impl DataSetDesign {
    /// Creates a design with no primary result set and no row cap.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Names the primary result set.
    pub fn with_primary_result_name(mut self, name: impl Into<String>) -> Self {
        self.primary_result_set_name = Some(name.into());
        self
    }

    /// Numbers the primary result set (1-based).
    pub fn with_primary_result_number(mut self, number: u32) -> Self {
        self.primary_result_set_number = number;
        self
    }

    /// Sets the design's row-fetch cap.
    pub fn with_row_fetch_limit(mut self, limit: u32) -> Self {
        self.row_fetch_limit = limit;
        self
    }
}

/// Caching policy for the session. The coordinator only reads it.
pub trait CacheManager: Send + Sync {
    /// The design the cache is currently keyed on, if any.
    fn current_design(&self) -> Option<&DataSetDesign>;

    /// Whether this invocation's rows should be saved to the cache.
    fn save_to_cache(&self) -> bool;

    /// Configured cache row cap; zero means none.
    fn cache_row_limit(&self) -> u32;

    /// Opens a store for the rows of one execution.
    fn open_store(&self, metadata: &ResultMetadata) -> Result<Box<dyn CacheStore>>;
}

/// Sink that materializes rows on their way to the cache.
pub trait CacheStore: Send {
    /// Appends one row.
    fn append(&mut self, row: &ResultRow) -> Result<()>;

    /// Marks the row stream complete. Called only when the source was
    /// drained; an early close leaves the store unfinished.
    fn finish(&mut self, row_count: usize) -> Result<()>;
}

/// Notified when a pass-through result reaches end-of-data-set processing.
pub trait EventHandler: Send + Sync {
    /// Called once, before `execute` returns, when the pass-through
    /// strategy was selected.
    fn end_of_data_set(&self, iterator: &ResultIterator);
}

/// Cooperative cancellation flag.
///
/// Owned by the caller; the coordinator only ever polls it. Raising it does
/// not interrupt an in-flight driver call, it only stops the coordinator
/// from waiting on one.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    /// Creates an unraised signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether the signal has been raised.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Coordinator tunables.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// How often the coordinator checks the stop signal while the driver
    /// call is in flight. Bounds cancellation latency.
    pub cancel_poll_interval: Duration,
    /// Row-fetch cap applied to queries that configure none. Zero means
    /// unlimited.
    pub default_row_limit: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cancel_poll_interval: Duration::from_millis(10),
            default_row_limit: 0,
        }
    }
}

impl SessionOptions {
    /// Tighter cancellation latency at the cost of more wakeups.
    pub fn responsive() -> Self {
        Self {
            cancel_poll_interval: Duration::from_millis(1),
            ..Self::default()
        }
    }
}

/// Everything a query needs to know about the session running it.
#[derive(Clone)]
pub struct Session {
    mode: ExecutionMode,
    cache: Arc<dyn CacheManager>,
    options: SessionOptions,
}

impl Session {
    /// Creates a session with default options.
    pub fn new(mode: ExecutionMode, cache: Arc<dyn CacheManager>) -> Self {
        Self {
            mode,
            cache,
            options: SessionOptions::default(),
        }
    }

    /// Overrides the coordinator tunables.
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// The session's execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// The session's caching policy.
    pub fn cache_manager(&self) -> &dyn CacheManager {
        self.cache.as_ref()
    }

    /// The coordinator tunables.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

/// In-memory caching policy used for tests or prototyping.
///
/// Rows written through its stores stay inspectable after execution.
#[derive(Default)]
pub struct MemoryCacheManager {
    design: Option<DataSetDesign>,
    save: bool,
    row_limit: u32,
    rows: Arc<Mutex<Vec<ResultRow>>>,
    finished: Arc<Mutex<Option<usize>>>,
}

impl MemoryCacheManager {
    /// Creates a policy that never caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current design.
    pub fn with_design(mut self, design: DataSetDesign) -> Self {
        self.design = Some(design);
        self
    }

    /// Requests save-to-cache for every invocation.
    pub fn with_save_to_cache(mut self) -> Self {
        self.save = true;
        self
    }

    /// Sets the cache row cap.
    pub fn with_row_limit(mut self, limit: u32) -> Self {
        self.row_limit = limit;
        self
    }

    /// Rows materialized through this policy's stores so far.
    pub fn cached_rows(&self) -> Vec<ResultRow> {
        self.rows.lock().clone()
    }

    /// The row count reported at finish, if the stream completed.
    pub fn finished_count(&self) -> Option<usize> {
        *self.finished.lock()
    }
}

impl CacheManager for MemoryCacheManager {
    fn current_design(&self) -> Option<&DataSetDesign> {
        self.design.as_ref()
    }

    fn save_to_cache(&self) -> bool {
        self.save
    }

    fn cache_row_limit(&self) -> u32 {
        self.row_limit
    }

    fn open_store(&self, _metadata: &ResultMetadata) -> Result<Box<dyn CacheStore>> {
        Ok(Box::new(MemoryCacheStore {
            rows: Arc::clone(&self.rows),
            finished: Arc::clone(&self.finished),
        }))
    }
}

struct MemoryCacheStore {
    rows: Arc<Mutex<Vec<ResultRow>>>,
    finished: Arc<Mutex<Option<usize>>>,
}

impl CacheStore for MemoryCacheStore {
    fn append(&mut self, row: &ResultRow) -> Result<()> {
        self.rows.lock().push(row.clone());
        Ok(())
    }

    fn finish(&mut self, row_count: usize) -> Result<()> {
        *self.finished.lock() = Some(row_count);
        Ok(())
    }
}

/// Event handler that counts end-of-data notifications.
#[derive(Default)]
pub struct CountingEventHandler {
    notifications: AtomicUsize,
}

impl CountingEventHandler {
    /// Creates a handler with zero notifications.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of end-of-data notifications received.
    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

impl EventHandler for CountingEventHandler {
    fn end_of_data_set(&self, _iterator: &ResultIterator) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
}
