//! The type-erased task graph.
//!
//! A task is a unit of work producing one value. Tasks live in a single
//! `petgraph` graph, so their outputs are stored type-erased as
//! `Rc<dyn Any>`.
//!
//! ## Phantom handles
//!
//! * **Compile-time**: [`FutureHandle<T>`] carries no data but holds the type
//!   `T` in `PhantomData`, so a task registered with it as an argument is
//!   type checked against `T`.
//! * **Runtime**: the handle is resolved by comparing the producer's
//!   [`TypeTag`] with `T` and only then downcasting the stored output. A
//!   handle pointing at a producer of a different type yields
//!   [`SchedulerError::TypeMismatch`] instead of a value.
//!
//! Producers are computed lazily: resolving a task that has not run yet
//! first walks its producers along the graph edges and computes the missing
//! ones, deepest first. By the time a task resolves its arguments they are
//! already memoized, so the depth of a chain never shows up on the stack.

mod binding;
mod handle;
mod node;
mod tag;
mod task;

use std::any::Any;
use std::rc::Rc;

use petgraph::graph::DiGraph;
use petgraph::visit::{DfsPostOrder, Reversed};

pub use crate::engine::binding::Arg;
pub use crate::engine::handle::{FutureHandle, OrderToken};
pub use crate::engine::tag::TypeTag;

pub(crate) use crate::engine::binding::Arguments;
pub(crate) use crate::engine::handle::Scope;
pub(crate) use crate::engine::node::TaskNode;
pub(crate) use crate::engine::task::{ResultSlot, Task, TypedTask};

use crate::error::SchedulerError;

/// A type-erased, single-threaded container.
pub(crate) type Dynamic = Rc<dyn Any>;

/// Tasks indexed by their [`OrderToken`], edges point from producer to
/// consumer.
pub(crate) type TaskGraph = DiGraph<Box<dyn Task>, ()>;

/// Finds the task behind `token`. Tokens issued by another scheduler are
/// reported as out of range, even if their index exists here.
pub(crate) fn lookup(graph: &TaskGraph, token: OrderToken) -> Result<&dyn Task, SchedulerError> {
    graph
        .node_weight(token.node)
        .map(|task| &**task)
        .filter(|task| task.token() == token)
        .ok_or(SchedulerError::OutOfRange {
            token,
            len: graph.node_count(),
        })
}

/// Returns the memoized output of a task, computing it first if needed.
pub(crate) fn ensure(task: &dyn Task, graph: &TaskGraph) -> Result<Dynamic, SchedulerError> {
    match task.output() {
        Some(output) => {
            tracing::trace!(token = %task.token(), "memoized");
            Ok(output)
        }
        None => task.invoke(graph),
    }
}

/// Computes every producer `token` transitively depends on that has no
/// result yet. Producers are visited in post-order over the reversed graph,
/// so each one runs after all of its own producers.
fn compute_producers(graph: &TaskGraph, token: OrderToken) -> Result<(), SchedulerError> {
    let reversed = Reversed(graph);
    let mut dfs = DfsPostOrder::new(reversed, token.node);

    while let Some(index) = dfs.next(reversed) {
        if index == token.node {
            continue;
        }

        let producer = &*graph[index];
        if !producer.is_computed() {
            producer.invoke(graph)?;
        }
    }

    Ok(())
}

/// Resolves `token` into a value of type `T`.
///
/// The result type is checked before anything runs, so asking for the wrong
/// type never triggers a computation.
pub(crate) fn resolve<T>(graph: &TaskGraph, token: OrderToken) -> Result<T, SchedulerError>
where
    T: Clone + 'static,
{
    let task = lookup(graph, token)?;
    let found = task.result_type();

    let mismatch = || SchedulerError::TypeMismatch {
        token,
        expected: std::any::type_name::<T>(),
        found: found.name(),
    };

    if !found.is::<T>() {
        return Err(mismatch());
    }

    if !task.is_computed() {
        compute_producers(graph, token)?;
    }

    let output = ensure(task, graph)?;
    output.downcast_ref::<T>().cloned().ok_or_else(mismatch)
}
