//! Process-wide store context.
//!
//! A [`StoreContext`] carries what every store attached to it shares: the
//! context-level [`Delegate`] and the batch strategy used for dispatch.
//! Stores attach to [`StoreContext::global`] unless a builder passes another
//! context explicitly. Tests that install hooks should either use a private
//! context or call [`StoreContext::reset`] when done.
//!
//! # Batch strategy loading
//!
//! A richer batch strategy can be produced off-thread with
//! [`StoreContext::load_batching`]. The loader runs once on a background
//! thread and hands its result over a bounded channel; dispatch polls that
//! channel without blocking and switches strategies the first time a result
//! is there. Until then dispatch keeps using whatever is installed, which is
//! always correct: strategies only differ in how they coalesce host work.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use tracing::{debug, warn};

use crate::store::batch::{BatchStrategy, Immediate, LoadedStrategy};
use crate::store::delegate::Delegate;

thread_local! {
    static GLOBAL: StoreContext = StoreContext::new();
}

struct ContextInner {
    delegate: RefCell<Delegate>,
    batching: RefCell<Rc<dyn BatchStrategy>>,
    pending: RefCell<Option<Receiver<LoadedStrategy>>>,
}

/// Shared delegate and batch strategy for a group of stores.
///
/// Cloning creates a new handle to the same context.
#[derive(Clone)]
pub struct StoreContext {
    inner: Rc<ContextInner>,
}

impl StoreContext {
    /// Creates an empty context: no hooks, immediate batching.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ContextInner {
                delegate: RefCell::new(Delegate::default()),
                batching: RefCell::new(Rc::new(Immediate)),
                pending: RefCell::new(None),
            }),
        }
    }

    /// The default context of the current thread.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.with(Clone::clone)
    }

    /// True if both handles refer to the same context.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current context-level delegate.
    #[must_use]
    pub fn delegate(&self) -> Delegate {
        self.inner.delegate.borrow().clone()
    }

    /// Replaces the context-level delegate.
    pub fn set_delegate(&self, delegate: Delegate) {
        *self.inner.delegate.borrow_mut() = delegate;
    }

    /// Removes both context-level hooks.
    pub fn clear_delegate(&self) {
        self.set_delegate(Delegate::default());
    }

    /// Installs a batch strategy right away.
    pub fn set_batching(&self, strategy: impl BatchStrategy + 'static) {
        *self.inner.batching.borrow_mut() = Rc::new(strategy);
        debug!("batch strategy installed");
    }

    /// Starts loading a batch strategy on a background thread.
    ///
    /// `loader` runs once. If it yields a strategy, the strategy is picked up
    /// by the first dispatch after it arrives; if it yields `None`, nothing
    /// changes. A second call supersedes a load still in flight.
    pub fn load_batching<F>(&self, loader: F)
    where
        F: FnOnce() -> Option<LoadedStrategy> + Send + 'static,
    {
        let (tx, rx) = bounded::<LoadedStrategy>(1);
        let spawned = thread::Builder::new()
            .name("rekv-batch-loader".to_string())
            .spawn(move || {
                if let Some(strategy) = loader() {
                    // The context may already be gone; nothing to do then.
                    let _ = tx.send(strategy);
                }
            });

        match spawned {
            Ok(_detached) => {
                *self.inner.pending.borrow_mut() = Some(rx);
            }
            Err(err) => {
                warn!(error = %err, "failed to start batch strategy loader; keeping current strategy");
            }
        }
    }

    /// True while a load started by [`load_batching`](Self::load_batching)
    /// has not been picked up yet.
    #[must_use]
    pub fn is_loading_batching(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    /// Blocks until an in-flight load finishes or `timeout` elapses.
    ///
    /// Returns true if a strategy was installed. Meant for start-up code and
    /// tests; dispatch itself never waits.
    pub fn wait_for_batching(&self, timeout: Duration) -> bool {
        let received = {
            let pending = self.inner.pending.borrow();
            let Some(rx) = pending.as_ref() else {
                return false;
            };
            rx.recv_timeout(timeout)
        };
        match received {
            Ok(strategy) => {
                self.install_loaded(strategy);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                self.inner.pending.borrow_mut().take();
                debug!("batch strategy loader finished without a strategy");
                false
            }
        }
    }

    /// The strategy to dispatch with, after checking for a loaded one.
    pub(crate) fn batching(&self) -> Rc<dyn BatchStrategy> {
        self.poll_pending();
        Rc::clone(&self.inner.batching.borrow())
    }

    /// Drops hooks, pending loads and any installed strategy.
    pub fn reset(&self) {
        self.clear_delegate();
        self.inner.pending.borrow_mut().take();
        *self.inner.batching.borrow_mut() = Rc::new(Immediate);
    }

    fn poll_pending(&self) {
        let polled = {
            let pending = self.inner.pending.borrow();
            let Some(rx) = pending.as_ref() else {
                return;
            };
            rx.try_recv()
        };
        match polled {
            Ok(strategy) => self.install_loaded(strategy),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.inner.pending.borrow_mut().take();
                debug!("batch strategy loader finished without a strategy");
            }
        }
    }

    fn install_loaded(&self, strategy: LoadedStrategy) {
        self.inner.pending.borrow_mut().take();
        let strategy: Rc<dyn BatchStrategy + Send> = Rc::from(strategy);
        let strategy: Rc<dyn BatchStrategy> = strategy;
        *self.inner.batching.borrow_mut() = strategy;
        debug!("loaded batch strategy installed");
    }
}

impl Default for StoreContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("delegate", &*self.inner.delegate.borrow())
            .field("loading_batching", &self.is_loading_batching())
            .finish_non_exhaustive()
    }
}
