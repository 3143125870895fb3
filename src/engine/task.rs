use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::time::Instant;

use crate::engine::{Dynamic, OrderToken, TaskGraph, TypeTag};
use crate::error::SchedulerError;

/// Memoized result of a task.
///
/// The slot is empty until the task has completed once. It is only ever
/// written by its own task, after the task function has returned, so no
/// borrow is held while user code runs.
#[derive(Default)]
pub(crate) struct ResultSlot {
    value: RefCell<Option<Dynamic>>,
    invocations: Cell<u32>,
}

impl ResultSlot {
    pub(crate) fn get(&self) -> Option<Dynamic> {
        self.value.borrow().clone()
    }

    pub(crate) fn is_filled(&self) -> bool {
        self.value.borrow().is_some()
    }

    pub(crate) fn invocations(&self) -> u32 {
        self.invocations.get()
    }

    fn store(&self, value: Dynamic) {
        *self.value.borrow_mut() = Some(value);
        self.invocations.set(self.invocations.get().saturating_add(1));
    }
}

pub(crate) trait TypedTask: 'static {
    /// The concrete output type of this task.
    type Output: Clone + 'static;

    fn token(&self) -> OrderToken;

    fn slot(&self) -> &ResultSlot;

    /// Resolves the arguments and runs the task function once.
    fn execute(&self, graph: &TaskGraph) -> Result<Self::Output, SchedulerError>;
}

/// The type-erased interface of a task.
///
/// Most code goes through the typed registration API on
/// [`Scheduler`](crate::Scheduler); this trait is what lets the graph hold
/// tasks with different output types side by side.
pub(crate) trait Task {
    fn token(&self) -> OrderToken;

    fn result_type(&self) -> TypeTag;

    fn is_computed(&self) -> bool;

    fn invocations(&self) -> u32;

    /// The memoized result, `None` until the task has computed once.
    fn output(&self) -> Option<Dynamic>;

    /// Runs the task function, even if a result is already stored, and
    /// overwrites the slot. Unresolved producers are computed first.
    ///
    /// On failure the slot keeps whatever it held before.
    fn invoke(&self, graph: &TaskGraph) -> Result<Dynamic, SchedulerError>;
}

// A blanket implementation to automatically bridge the two. This is where the
// type erasure actually happens.
impl<T> Task for T
where
    T: TypedTask,
{
    fn token(&self) -> OrderToken {
        T::token(self)
    }

    fn result_type(&self) -> TypeTag {
        TypeTag::of::<T::Output>()
    }

    fn is_computed(&self) -> bool {
        self.slot().is_filled()
    }

    fn invocations(&self) -> u32 {
        self.slot().invocations()
    }

    fn output(&self) -> Option<Dynamic> {
        self.slot().get()
    }

    fn invoke(&self, graph: &TaskGraph) -> Result<Dynamic, SchedulerError> {
        let token = T::token(self);
        let span = tracing::trace_span!("task", %token);
        let _enter = span.enter();

        let start = Instant::now();

        // Panics are reported like any other task failure. The slot is only
        // written after the task function returns.
        let output = match catch_unwind(AssertUnwindSafe(|| T::execute(self, graph))) {
            Ok(result) => result?,
            Err(panic) => {
                let message = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    String::from("unknown payload")
                };

                return Err(SchedulerError::Panicked { token, message });
            }
        };

        let output: Dynamic = Rc::new(output);
        self.slot().store(output.clone());

        tracing::debug!(
            %token,
            output = std::any::type_name::<T::Output>(),
            elapsed = ?start.elapsed(),
            "computed"
        );

        Ok(output)
    }
}
