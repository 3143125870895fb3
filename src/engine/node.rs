use std::marker::PhantomData;

use crate::engine::{Arguments, OrderToken, ResultSlot, TaskGraph, TypedTask};
use crate::error::{SchedulerError, TaskResult};

pub(crate) struct TaskNode<R, D, F>
where
    R: Clone + 'static,
    D: Arguments,
    F: Fn(D::Values) -> TaskResult<R>,
{
    pub token: OrderToken,
    pub arguments: D,
    pub callback: F,
    pub slot: ResultSlot,
    pub _phantom: PhantomData<fn() -> R>,
}

impl<R, D, F> TaskNode<R, D, F>
where
    R: Clone + 'static,
    D: Arguments,
    F: Fn(D::Values) -> TaskResult<R>,
{
    pub(crate) fn new(token: OrderToken, arguments: D, callback: F) -> Self {
        Self {
            token,
            arguments,
            callback,
            slot: ResultSlot::default(),
            _phantom: PhantomData,
        }
    }
}

impl<R, D, F> TypedTask for TaskNode<R, D, F>
where
    R: Clone + 'static,
    D: Arguments,
    F: Fn(D::Values) -> TaskResult<R> + 'static,
{
    type Output = R;

    fn token(&self) -> OrderToken {
        self.token
    }

    fn slot(&self) -> &ResultSlot {
        &self.slot
    }

    fn execute(&self, graph: &TaskGraph) -> Result<Self::Output, SchedulerError> {
        let arguments = self.arguments.resolve(graph)?;
        (self.callback)(arguments).map_err(|source| SchedulerError::Task {
            token: self.token,
            source,
        })
    }
}
