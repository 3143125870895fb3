use std::fmt::{Debug, Display, Formatter};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::graph::NodeIndex;

/// Identifies the scheduler a token was issued by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Scope(u64);

impl Scope {
    /// A scope no other scheduler in this process has.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque identifier of a registered task.
///
/// Tokens are handed out densely, starting at zero, in registration order.
/// A token is only meaningful for the [`Scheduler`](crate::Scheduler) that
/// issued it, any other scheduler reports it as out of range.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderToken {
    pub(crate) scope: Scope,
    pub(crate) node: NodeIndex,
}

impl OrderToken {
    pub(crate) fn new(scope: Scope, index: usize) -> Self {
        Self {
            scope,
            node: NodeIndex::new(index),
        }
    }

    /// Position of the task in registration order.
    pub fn index(&self) -> usize {
        self.node.index()
    }
}

impl Debug for OrderToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderToken({})", self.index())
    }
}

impl Display for OrderToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index())
    }
}

/// A typed reference to the eventual result of another task.
///
/// A `FutureHandle<T>` carries no data, only the token of the producing task
/// and the type `T` the consumer expects in `PhantomData`. Passing it as an
/// argument when registering a task wires a dependency edge: the producer is
/// computed on demand, the first time the consumer needs the value.
///
/// The handle does not keep the producer alive and does not check its result
/// type when created. A producer whose result is not `T` is reported as a
/// [`SchedulerError::TypeMismatch`](crate::SchedulerError::TypeMismatch) when
/// the handle is resolved.
pub struct FutureHandle<T> {
    pub(crate) token: OrderToken,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> FutureHandle<T> {
    pub(crate) fn new(token: OrderToken) -> Self {
        Self {
            token,
            _phantom: PhantomData,
        }
    }

    /// Returns the token of the task this handle points at.
    pub fn token(&self) -> OrderToken {
        self.token
    }
}

impl<T> Clone for FutureHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FutureHandle<T> {}

impl<T> PartialEq for FutureHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl<T> Eq for FutureHandle<T> {}

impl<T> Debug for FutureHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FutureHandle<{}>({})",
            std::any::type_name::<T>(),
            self.token
        )
    }
}
