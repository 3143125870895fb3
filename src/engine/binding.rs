use crate::engine::{FutureHandle, OrderToken, TaskGraph};
use crate::error::SchedulerError;

/// A single task argument, bound at registration time.
///
/// Plain values convert into [`Arg::Literal`] and future handles into
/// [`Arg::Future`], so the registration methods accept either one wherever
/// they take an `impl Into<Arg<T>>`.
#[derive(Debug, Clone)]
pub enum Arg<T> {
    /// A value supplied up front, cloned for every invocation.
    Literal(T),
    /// The result of another task, computed on demand.
    Future(FutureHandle<T>),
}

impl<T> From<T> for Arg<T> {
    fn from(value: T) -> Self {
        Arg::Literal(value)
    }
}

impl<T> From<FutureHandle<T>> for Arg<T> {
    fn from(handle: FutureHandle<T>) -> Self {
        Arg::Future(handle)
    }
}

impl<T> Arg<T>
where
    T: Clone + 'static,
{
    /// Returns the producer this argument waits on, if any.
    pub(crate) fn dependency(&self) -> Option<OrderToken> {
        match self {
            Arg::Literal(_) => None,
            Arg::Future(handle) => Some(handle.token),
        }
    }

    /// Produces the argument value, computing the producer first if needed.
    pub(crate) fn resolve(&self, graph: &TaskGraph) -> Result<T, SchedulerError> {
        match self {
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Future(handle) => super::resolve(graph, handle.token),
        }
    }
}

/// The full argument list of a task.
///
/// Implemented for `()` and for tuples of [`Arg`]s. It exposes the
/// producers the list depends on, so the scheduler can record the edges,
/// and resolves every argument into the tuple of values the task function
/// is called with.
pub(crate) trait Arguments: 'static {
    /// The resolved values, e.g. `(A, B)` for `(Arg<A>, Arg<B>)`.
    type Values;

    fn dependencies(&self) -> Vec<OrderToken>;

    /// Resolves the arguments left to right. The first failing argument
    /// aborts the whole resolution.
    fn resolve(&self, graph: &TaskGraph) -> Result<Self::Values, SchedulerError>;
}

impl Arguments for () {
    type Values = ();

    fn dependencies(&self) -> Vec<OrderToken> {
        vec![]
    }

    fn resolve(&self, _: &TaskGraph) -> Result<Self::Values, SchedulerError> {
        Ok(())
    }
}

macro_rules! impl_arguments {
    ($($A:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($A),*> Arguments for ($(Arg<$A>,)*)
        where
            $($A: Clone + 'static),* {
            type Values = ($($A,)*);

            fn dependencies(&self) -> Vec<OrderToken> {
                let ($($A,)*) = self;
                [$($A.dependency(),)*].into_iter().flatten().collect()
            }

            fn resolve(&self, graph: &TaskGraph) -> Result<Self::Values, SchedulerError> {
                let ($($A,)*) = self;
                Ok(($($A.resolve(graph)?,)*))
            }
        }
    };
}

impl_arguments!(A);
impl_arguments!(A, B);
impl_arguments!(A, B, C);
impl_arguments!(A, B, C, D);
