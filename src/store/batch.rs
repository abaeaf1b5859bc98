//! Batch scopes for notification dispatch.
//!
//! Every dispatch runs inside one call to [`BatchStrategy::run_batched`]. A
//! host integration uses that scope to coalesce whatever re-render requests
//! the invoked listeners make. Without one, [`Immediate`] simply runs the
//! batch.

/// Wraps one dispatch of notifications.
///
/// Implementations must call `batch` exactly once before returning.
pub trait BatchStrategy {
    /// Runs `batch` inside the strategy's scope.
    fn run_batched(&self, batch: &mut dyn FnMut());
}

/// Runs the batch straight away with no coalescing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl BatchStrategy for Immediate {
    fn run_batched(&self, batch: &mut dyn FnMut()) {
        batch();
    }
}

/// A strategy produced off-thread by a batching loader.
pub type LoadedStrategy = Box<dyn BatchStrategy + Send>;

impl<F> BatchStrategy for F
where
    F: Fn(&mut dyn FnMut()),
{
    fn run_batched(&self, batch: &mut dyn FnMut()) {
        self(batch);
    }
}
