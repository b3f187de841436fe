//! Result delivery: one tagged iterator type covering every strategy.
//!
//! The selector picks, per execution, which variant backs the iterator the
//! caller gets: `Cached` materializes rows through the session's cache
//! store on their way out, `PassThrough` streams the live driver result
//! with no buffering (and announces end-of-data processing immediately),
//! `General` streams the live result for every other shape, and `Empty` is
//! the inert iterator a cancelled execution returns. Every non-empty
//! variant keeps hold of the driver result so `close` can release it.

use tracing::debug;

use crate::driver::DriverResultSet;
use crate::error::Result;
use crate::metadata::{ResultMetadata, ResultRow};
use crate::query::definition::QueryShape;
use crate::session::{CacheStore, EventHandler, ExecutionMode, Session};

/// Where the next row comes from. Implementations wrap the live driver
/// result, with or without a materializing detour through the cache.
trait RowSource: Send {
    fn fetch(&mut self) -> Result<Option<ResultRow>>;
    fn release(&mut self) -> Result<()>;
}

struct LiveRows {
    inner: Box<dyn DriverResultSet>,
}

impl RowSource for LiveRows {
    fn fetch(&mut self) -> Result<Option<ResultRow>> {
        self.inner.fetch()
    }

    fn release(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// Materializing cache adapter: every fetched row is appended to the
/// session's cache store; the store is finished only when the source is
/// drained, so an early close leaves a partial store unfinished.
struct CachingRows {
    inner: Box<dyn DriverResultSet>,
    store: Box<dyn CacheStore>,
    appended: usize,
    finished: bool,
}

impl RowSource for CachingRows {
    fn fetch(&mut self) -> Result<Option<ResultRow>> {
        match self.inner.fetch()? {
            Some(row) => {
                self.store.append(&row)?;
                self.appended += 1;
                Ok(Some(row))
            }
            None => {
                if !self.finished {
                    self.finished = true;
                    self.store.finish(self.appended)?;
                }
                Ok(None)
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// Forward-only row stream shared by every non-empty iterator variant.
pub struct RowStream {
    source: Box<dyn RowSource>,
    metadata: ResultMetadata,
    current: Option<ResultRow>,
    fetched: usize,
    closed: bool,
}

impl RowStream {
    fn new(source: Box<dyn RowSource>, metadata: ResultMetadata) -> Self {
        Self {
            source,
            metadata,
            current: None,
            fetched: 0,
            closed: false,
        }
    }

    fn advance(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.current = self.source.fetch()?;
        if self.current.is_some() {
            self.fetched += 1;
        }
        Ok(self.current.is_some())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.current = None;
        self.source.release()
    }
}

/// The result iterator a successful (or cancelled) execution hands back.
pub enum ResultIterator {
    /// Inert iterator: no rows, no metadata, no failing operation. What a
    /// cancelled execution returns.
    Empty,
    /// Unbuffered stream over the live driver result.
    PassThrough(RowStream),
    /// Stream whose rows materialize into the session cache on the way
    /// out.
    Cached(RowStream),
    /// General-purpose stream over the live driver result.
    General(RowStream),
}

impl std::fmt::Debug for ResultIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            ResultIterator::Empty => "Empty",
            ResultIterator::PassThrough(_) => "PassThrough",
            ResultIterator::Cached(_) => "Cached",
            ResultIterator::General(_) => "General",
        };
        f.debug_tuple(variant).finish()
    }
}

impl ResultIterator {
    /// Advances to the next row. `false` at end of data, which the empty
    /// variant reports immediately.
    pub fn next(&mut self) -> Result<bool> {
        match self {
            ResultIterator::Empty => Ok(false),
            ResultIterator::PassThrough(s)
            | ResultIterator::Cached(s)
            | ResultIterator::General(s) => s.advance(),
        }
    }

    /// The row `next` landed on, if any.
    pub fn current(&self) -> Option<&ResultRow> {
        match self {
            ResultIterator::Empty => None,
            ResultIterator::PassThrough(s)
            | ResultIterator::Cached(s)
            | ResultIterator::General(s) => s.current.as_ref(),
        }
    }

    /// Rows fetched so far. Zero for the empty variant.
    pub fn row_count(&self) -> usize {
        match self {
            ResultIterator::Empty => 0,
            ResultIterator::PassThrough(s)
            | ResultIterator::Cached(s)
            | ResultIterator::General(s) => s.fetched,
        }
    }

    /// The result shape, when one exists.
    pub fn metadata(&self) -> Option<&ResultMetadata> {
        match self {
            ResultIterator::Empty => None,
            ResultIterator::PassThrough(s)
            | ResultIterator::Cached(s)
            | ResultIterator::General(s) => Some(&s.metadata),
        }
    }

    /// Releases the underlying driver result. Idempotent; a no-op for the
    /// empty variant.
    pub fn close(&mut self) -> Result<()> {
        match self {
            ResultIterator::Empty => Ok(()),
            ResultIterator::PassThrough(s)
            | ResultIterator::Cached(s)
            | ResultIterator::General(s) => s.close(),
        }
    }
}

/// Picks the delivery strategy for one successful execution and builds the
/// iterator. The pass-through branch notifies the event handler before
/// returning.
pub(crate) fn select_strategy(
    result: Box<dyn DriverResultSet>,
    metadata: ResultMetadata,
    session: &Session,
    shape: QueryShape,
    event_handler: &dyn EventHandler,
) -> Result<ResultIterator> {
    let cache = session.cache_manager();
    if cache.save_to_cache() {
        debug!("result strategy: cache");
        let store = cache.open_store(&metadata)?;
        let source = CachingRows {
            inner: result,
            store,
            appended: 0,
            finished: false,
        };
        return Ok(ResultIterator::Cached(RowStream::new(
            Box::new(source),
            metadata,
        )));
    }
    if session.mode() == ExecutionMode::DirectPresentation && shape.is_simple() {
        debug!("result strategy: pass-through");
        let iterator = ResultIterator::PassThrough(RowStream::new(
            Box::new(LiveRows { inner: result }),
            metadata,
        ));
        event_handler.end_of_data_set(&iterator);
        return Ok(iterator);
    }
    debug!("result strategy: general");
    Ok(ResultIterator::General(RowStream::new(
        Box::new(LiveRows { inner: result }),
        metadata,
    )))
}
