mod diagnostics;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use petgraph::Direction;

use crate::engine::{
    self, Arg, Arguments, FutureHandle, OrderToken, Scope, TaskGraph, TaskNode, TypeTag,
};
use crate::error::{SchedulerError, TaskResult};

pub use diagnostics::Diagnostics;

/// Decides what [`Scheduler::execute_all`] does with tasks that already hold
/// a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// Skip tasks that are already computed. Every task function runs at
    /// most once.
    #[default]
    Memoized,
    /// Invoke every task again, in registration order, overwriting stored
    /// results. Dependency resolution still reuses stored results.
    Fresh,
}

/// Settings for a [`Scheduler`].
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub policy: ExecutionPolicy,
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Owns the task graph and drives its evaluation.
///
/// Tasks are registered with one of the `add*` methods, each returning an
/// [`OrderToken`]. A token can be turned into a [`FutureHandle`] with
/// [`future`](Self::future) and passed as an argument to later
/// registrations, which wires a dependency edge. Because a handle can only
/// point at a task registered earlier, the graph is acyclic by construction.
/// Tokens and handles are bound to the scheduler that issued them.
///
/// Nothing runs at registration. Results are computed lazily, either for a
/// single task and its transitive producers with [`get`](Self::get), or for
/// the whole graph with [`execute_all`](Self::execute_all).
///
/// # Example
///
/// ```rust
/// use sakimono::Scheduler;
///
/// # fn main() -> Result<(), sakimono::SchedulerError> {
/// let mut scheduler = Scheduler::new();
///
/// let base = scheduler.add(|| 10);
/// let doubled = scheduler.add1(|x: i32| x * 2, scheduler.future::<i32>(base)?);
/// let answer = scheduler.add2(|x: i32, y: i32| x + y, scheduler.future::<i32>(doubled)?, 22);
///
/// assert_eq!(scheduler.get::<i32>(answer)?, 42);
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    graph: TaskGraph,
    config: SchedulerConfig,
    scope: Scope,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::with_config(SchedulerConfig::default())
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            graph: TaskGraph::default(),
            config,
            scope: Scope::next(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Registers a task without arguments.
    pub fn add<R, F>(&mut self, func: F) -> OrderToken
    where
        R: Clone + 'static,
        F: Fn() -> R + 'static,
    {
        self.try_add(move || Ok(func()))
    }

    /// Registers a task with one argument, either a value or a
    /// [`FutureHandle`].
    pub fn add1<A, R, F>(&mut self, func: F, a: impl Into<Arg<A>>) -> OrderToken
    where
        A: Clone + 'static,
        R: Clone + 'static,
        F: Fn(A) -> R + 'static,
    {
        self.try_add1(move |a: A| Ok(func(a)), a)
    }

    /// Registers a task with two arguments, each either a value or a
    /// [`FutureHandle`].
    pub fn add2<A, B, R, F>(
        &mut self,
        func: F,
        a: impl Into<Arg<A>>,
        b: impl Into<Arg<B>>,
    ) -> OrderToken
    where
        A: Clone + 'static,
        B: Clone + 'static,
        R: Clone + 'static,
        F: Fn(A, B) -> R + 'static,
    {
        self.try_add2(move |a: A, b: B| Ok(func(a, b)), a, b)
    }

    /// Registers a task calling a method on a copy of `receiver`.
    ///
    /// Both the receiver and the argument may be futures. This is the same
    /// as [`add2`](Self::add2) with the receiver as the first argument.
    pub fn add_method<C, A, R, M>(
        &mut self,
        method: M,
        receiver: impl Into<Arg<C>>,
        arg: impl Into<Arg<A>>,
    ) -> OrderToken
    where
        C: Clone + 'static,
        A: Clone + 'static,
        R: Clone + 'static,
        M: Fn(&C, A) -> R + 'static,
    {
        self.add2(move |receiver: C, arg: A| method(&receiver, arg), receiver, arg)
    }

    /// Registers a fallible task without arguments.
    pub fn try_add<R, F>(&mut self, func: F) -> OrderToken
    where
        R: Clone + 'static,
        F: Fn() -> TaskResult<R> + 'static,
    {
        self.register((), move |()| func())
    }

    /// Registers a fallible task with one argument.
    pub fn try_add1<A, R, F>(&mut self, func: F, a: impl Into<Arg<A>>) -> OrderToken
    where
        A: Clone + 'static,
        R: Clone + 'static,
        F: Fn(A) -> TaskResult<R> + 'static,
    {
        self.register((a.into(),), move |(a,)| func(a))
    }

    /// Registers a fallible task with two arguments.
    pub fn try_add2<A, B, R, F>(
        &mut self,
        func: F,
        a: impl Into<Arg<A>>,
        b: impl Into<Arg<B>>,
    ) -> OrderToken
    where
        A: Clone + 'static,
        B: Clone + 'static,
        R: Clone + 'static,
        F: Fn(A, B) -> TaskResult<R> + 'static,
    {
        self.register((a.into(), b.into()), move |(a, b)| func(a, b))
    }

    fn register<R, D, F>(&mut self, arguments: D, callback: F) -> OrderToken
    where
        R: Clone + 'static,
        D: Arguments,
        F: Fn(D::Values) -> TaskResult<R> + 'static,
    {
        let token = OrderToken::new(self.scope, self.graph.node_count());
        let dependencies = arguments.dependencies();

        let index = self
            .graph
            .add_node(Box::new(TaskNode::new(token, arguments, callback)));

        for dependency in &dependencies {
            // A handle issued by another scheduler gets no edge. It is
            // reported as out of range when resolved.
            if dependency.scope == self.scope && dependency.index() < index.index() {
                self.graph.update_edge(dependency.node, index, ());
            } else {
                tracing::warn!(
                    %token,
                    dependency = dependency.index(),
                    "dependency does not refer to an earlier task of this scheduler"
                );
            }
        }

        tracing::debug!(
            %token,
            output = std::any::type_name::<R>(),
            dependencies = ?dependencies.iter().map(|d| d.index()).collect::<Vec<_>>(),
            "registered task"
        );

        token
    }

    /// Returns a handle to the eventual result of `token`.
    ///
    /// Nothing is computed and the result type is not checked here, a
    /// mismatch surfaces when the handle is resolved.
    pub fn future<T>(&self, token: OrderToken) -> Result<FutureHandle<T>, SchedulerError> {
        engine::lookup(&self.graph, token)?;
        Ok(FutureHandle::new(token))
    }

    /// Returns the result of `token`, computing it and its transitive
    /// producers first if they have not run yet.
    pub fn get<T>(&self, token: OrderToken) -> Result<T, SchedulerError>
    where
        T: Clone + 'static,
    {
        engine::resolve(&self.graph, token)
    }

    /// Invokes every task in registration order.
    ///
    /// Producers that a task needs and that have not run yet are computed
    /// on the way, so the order in which tasks were registered never breaks
    /// a dependency. Under [`ExecutionPolicy::Memoized`] tasks that already
    /// hold a result are skipped.
    ///
    /// Stops at the first failing task, later tasks are not invoked.
    pub fn execute_all(&self) -> Result<Diagnostics, SchedulerError> {
        let span = tracing::info_span!("execute_all", tasks = self.len(), policy = ?self.config.policy);
        let _enter = span.enter();

        let mut execution_times = HashMap::new();

        for index in self.graph.node_indices() {
            let task = &*self.graph[index];

            if self.config.policy == ExecutionPolicy::Memoized && task.is_computed() {
                tracing::trace!(token = %task.token(), "skipping computed task");
                continue;
            }

            let start = Instant::now();

            if let Err(err) = task.invoke(&self.graph) {
                tracing::error!(token = %task.token(), "{err}");
                return Err(err);
            }

            let duration = start.elapsed();
            execution_times.insert(task.token(), TaskExecution { start, duration });
        }

        tracing::info!("invoked {} of {} tasks", execution_times.len(), self.len());

        Ok(Diagnostics { execution_times })
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All tokens, in registration order.
    pub fn tokens(&self) -> impl Iterator<Item = OrderToken> + '_ {
        self.graph.node_weights().map(|task| task.token())
    }

    pub fn is_computed(&self, token: OrderToken) -> Result<bool, SchedulerError> {
        Ok(engine::lookup(&self.graph, token)?.is_computed())
    }

    pub fn result_type(&self, token: OrderToken) -> Result<TypeTag, SchedulerError> {
        Ok(engine::lookup(&self.graph, token)?.result_type())
    }

    /// How many times the task function of `token` has completed.
    pub fn invocations(&self, token: OrderToken) -> Result<u32, SchedulerError> {
        Ok(engine::lookup(&self.graph, token)?.invocations())
    }

    /// Producers `token` takes future arguments from, in ascending order.
    pub fn dependencies(&self, token: OrderToken) -> Result<Vec<OrderToken>, SchedulerError> {
        self.neighbors(token, Direction::Incoming)
    }

    /// Tasks that take a future argument from `token`, in ascending order.
    pub fn dependents(&self, token: OrderToken) -> Result<Vec<OrderToken>, SchedulerError> {
        self.neighbors(token, Direction::Outgoing)
    }

    fn neighbors(
        &self,
        token: OrderToken,
        direction: Direction,
    ) -> Result<Vec<OrderToken>, SchedulerError> {
        engine::lookup(&self.graph, token)?;

        let mut tokens: Vec<_> = self
            .graph
            .neighbors_directed(token.node, direction)
            .map(|index| self.graph[index].token())
            .collect();

        tokens.sort();
        Ok(tokens)
    }

    pub(crate) fn graph(&self) -> &TaskGraph {
        &self.graph
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn test_tokens_are_dense() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.add(|| 1);
        let b = scheduler.add(|| 2);
        let c = scheduler.add1(|x: i32| x, 3);

        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
        assert_eq!(scheduler.len(), 3);
        assert_eq!(scheduler.tokens().collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn test_registration_is_lazy() {
        let (count, seen) = counter();
        let mut scheduler = Scheduler::new();
        let token = scheduler.add(move || {
            count.set(count.get() + 1);
            5
        });

        assert_eq!(seen.get(), 0);
        assert!(!scheduler.is_computed(token).unwrap());

        assert_eq!(scheduler.get::<i32>(token).unwrap(), 5);
        assert_eq!(seen.get(), 1);
        assert!(scheduler.is_computed(token).unwrap());
    }

    #[test]
    fn test_get_resolves_only_needed_tasks() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.add(|| 10);
        let unrelated = scheduler.add(|| 99);
        let b = scheduler.add1(|x: i32| x * 2, scheduler.future::<i32>(a).unwrap());

        assert_eq!(scheduler.get::<i32>(b).unwrap(), 20);
        assert!(scheduler.is_computed(a).unwrap());
        assert!(!scheduler.is_computed(unrelated).unwrap());
    }

    #[test]
    fn test_memoized_execute_all_runs_once() {
        let (count, seen) = counter();
        let mut scheduler = Scheduler::new();
        let a = scheduler.add(move || {
            count.set(count.get() + 1);
            1
        });
        let fa = scheduler.future::<i32>(a).unwrap();
        let b = scheduler.add1(|x: i32| x + 1, fa);

        scheduler.get::<i32>(b).unwrap();
        let diagnostics = scheduler.execute_all().unwrap();
        scheduler.execute_all().unwrap();

        assert_eq!(seen.get(), 1);
        assert_eq!(scheduler.invocations(a).unwrap(), 1);
        assert!(diagnostics.execution_times.is_empty());
    }

    #[test]
    fn test_fresh_execute_all_reinvokes() {
        let (count, seen) = counter();
        let config = SchedulerConfig::new().policy(ExecutionPolicy::Fresh);
        let mut scheduler = Scheduler::with_config(config);
        let a = scheduler.add(move || {
            count.set(count.get() + 1);
            1
        });
        let fa = scheduler.future::<i32>(a).unwrap();
        let b = scheduler.add1(|x: i32| x + 1, fa);

        let diagnostics = scheduler.execute_all().unwrap();

        // `a` runs once on its own, `b` finds it already computed.
        assert_eq!(seen.get(), 1);
        assert_eq!(diagnostics.execution_times.len(), 2);

        scheduler.execute_all().unwrap();
        assert_eq!(seen.get(), 2);
        assert_eq!(scheduler.invocations(b).unwrap(), 2);
        assert_eq!(scheduler.get::<i32>(b).unwrap(), 2);
    }

    #[test]
    fn test_fresh_recomputes_resolved_dependency() {
        let (count, seen) = counter();
        let config = SchedulerConfig::new().policy(ExecutionPolicy::Fresh);
        let mut scheduler = Scheduler::with_config(config);
        let a = scheduler.add(|| 3);
        let fa = scheduler.future::<i32>(a).unwrap();
        let b = scheduler.add1(
            move |x: i32| {
                count.set(count.get() + 1);
                x * 3
            },
            fa,
        );
        let fb = scheduler.future::<i32>(b).unwrap();
        let c = scheduler.add1(|x: i32| x + 1, fb);

        assert_eq!(scheduler.get::<i32>(c).unwrap(), 10);
        assert_eq!(seen.get(), 1);

        scheduler.execute_all().unwrap();
        assert_eq!(seen.get(), 2);
        assert_eq!(scheduler.get::<i32>(c).unwrap(), 10);
    }

    #[test]
    fn test_type_mismatch_on_get() {
        let mut scheduler = Scheduler::new();
        let token = scheduler.add(|| 42);

        let err = scheduler.get::<f32>(token).unwrap_err();
        match err {
            SchedulerError::TypeMismatch {
                token: t,
                expected,
                found,
            } => {
                assert_eq!(t, token);
                assert_eq!(expected, "f32");
                assert_eq!(found, "i32");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Asking for the wrong type does not compute anything.
        assert!(!scheduler.is_computed(token).unwrap());
    }

    #[test]
    fn test_type_mismatch_through_future() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.add(|| 1.5f64);
        let wrong = scheduler.future::<f32>(a).unwrap();
        let b = scheduler.add1(|x: f32| x * 2.0, wrong);

        let err = scheduler.get::<f32>(b).unwrap_err();
        assert!(matches!(err, SchedulerError::TypeMismatch { found: "f64", .. }));
        assert_eq!(err.token(), a);

        let err = scheduler.execute_all().unwrap_err();
        assert!(matches!(err, SchedulerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_out_of_range() {
        let mut big = Scheduler::new();
        big.add(|| 0);
        let far = big.add(|| 1);

        let mut small = Scheduler::new();
        small.add(|| 2);

        assert!(matches!(
            small.get::<i32>(far),
            Err(SchedulerError::OutOfRange { len: 1, .. })
        ));
        assert!(matches!(
            small.future::<i32>(far),
            Err(SchedulerError::OutOfRange { len: 1, .. })
        ));
        assert!(matches!(
            Scheduler::new().is_computed(far),
            Err(SchedulerError::OutOfRange { len: 0, .. })
        ));
    }

    #[test]
    fn test_foreign_future_is_reported_on_resolution() {
        let mut other = Scheduler::new();
        other.add(|| 0);
        other.add(|| 0);
        let handle = other.future::<i32>(OrderToken::new(other.scope, 1)).unwrap();

        let mut scheduler = Scheduler::new();
        let token = scheduler.add1(|x: i32| x, handle);

        assert!(scheduler.dependencies(token).unwrap().is_empty());
        assert!(matches!(
            scheduler.get::<i32>(token),
            Err(SchedulerError::OutOfRange { len: 2, .. })
        ));
    }

    #[test]
    fn test_foreign_token_in_range_is_rejected() {
        let mut other = Scheduler::new();
        let foreign = other.add(|| 100);
        let handle = other.future::<i32>(foreign).unwrap();

        let mut scheduler = Scheduler::new();
        let local = scheduler.add(|| 1);
        let consumer = scheduler.add1(|x: i32| x + 1, handle);

        assert_eq!(foreign.index(), local.index());
        assert_ne!(foreign, local);

        assert!(matches!(
            scheduler.get::<i32>(foreign),
            Err(SchedulerError::OutOfRange { len: 2, .. })
        ));
        assert!(matches!(
            scheduler.future::<i32>(foreign),
            Err(SchedulerError::OutOfRange { .. })
        ));
        assert!(scheduler.dependencies(consumer).unwrap().is_empty());
        assert!(scheduler.dependents(local).unwrap().is_empty());

        let err = scheduler.get::<i32>(consumer).unwrap_err();
        assert!(matches!(err, SchedulerError::OutOfRange { .. }));
        assert_eq!(err.token(), foreign);
        assert!(!scheduler.is_computed(local).unwrap());
    }

    #[test]
    fn test_get_on_deep_chain() {
        const DEPTH: u64 = 5000;

        let mut scheduler = Scheduler::new();
        let mut last = scheduler.add(|| 0u64);
        for _ in 0..DEPTH {
            let previous = scheduler.future::<u64>(last).unwrap();
            last = scheduler.add1(|x: u64| x + 1, previous);
        }

        assert_eq!(scheduler.get::<u64>(last).unwrap(), DEPTH);
        assert!(scheduler.tokens().all(|t| scheduler.invocations(t).unwrap() == 1));
    }

    #[test]
    fn test_failed_rerun_keeps_previous_result() {
        let (count, seen) = counter();
        let config = SchedulerConfig::new().policy(ExecutionPolicy::Fresh);
        let mut scheduler = Scheduler::with_config(config);
        let token = scheduler.try_add(move || -> TaskResult<i32> {
            count.set(count.get() + 1);
            if count.get() > 1 {
                anyhow::bail!("second run fails");
            }
            Ok(5)
        });

        scheduler.execute_all().unwrap();

        let err = scheduler.execute_all().unwrap_err();
        assert!(matches!(err, SchedulerError::Task { .. }));
        assert_eq!(seen.get(), 2);

        assert!(scheduler.is_computed(token).unwrap());
        assert_eq!(scheduler.get::<i32>(token).unwrap(), 5);
        assert_eq!(scheduler.invocations(token).unwrap(), 1);
    }

    #[test]
    fn test_execute_all_stops_at_failure() {
        let mut scheduler = Scheduler::new();
        let ok = scheduler.add(|| 1);
        let failing = scheduler.try_add(|| -> TaskResult<i32> { anyhow::bail!("no luck") });
        let later = scheduler.add(|| 3);

        let err = scheduler.execute_all().unwrap_err();
        assert!(matches!(err, SchedulerError::Task { .. }));
        assert_eq!(err.token(), failing);

        assert!(scheduler.is_computed(ok).unwrap());
        assert!(!scheduler.is_computed(failing).unwrap());
        assert!(!scheduler.is_computed(later).unwrap());
    }

    #[test]
    fn test_failure_propagates_through_consumers() {
        let mut scheduler = Scheduler::new();
        let failing = scheduler.try_add1(
            |x: i32| -> TaskResult<i32> {
                if x < 0 {
                    anyhow::bail!("negative input {x}");
                }
                Ok(x)
            },
            -1,
        );
        let ff = scheduler.future::<i32>(failing).unwrap();
        let consumer = scheduler.add1(|x: i32| x + 1, ff);

        let err = scheduler.get::<i32>(consumer).unwrap_err();
        assert_eq!(err.token(), failing);
        assert!(err.to_string().contains("negative input -1"));
        assert!(!scheduler.is_computed(consumer).unwrap());
    }

    #[test]
    fn test_panicking_task_is_reported() {
        let mut scheduler = Scheduler::new();
        let token = scheduler.add1(|x: i32| -> i32 { panic!("bad input {x}") }, 7);

        match scheduler.get::<i32>(token) {
            Err(SchedulerError::Panicked { token: t, message }) => {
                assert_eq!(t, token);
                assert_eq!(message, "bad input 7");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_dependency_edges() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.add(|| 1);
        let b = scheduler.add(|| 2);
        let fa = scheduler.future::<i32>(a).unwrap();
        let fb = scheduler.future::<i32>(b).unwrap();
        let c = scheduler.add2(|x: i32, y: i32| x + y, fb, fa);
        let d = scheduler.add2(|x: i32, y: i32| x * y, fa, fa);

        assert_eq!(scheduler.dependencies(c).unwrap(), vec![a, b]);
        assert_eq!(scheduler.dependencies(d).unwrap(), vec![a]);
        assert_eq!(scheduler.dependents(a).unwrap(), vec![c, d]);
        assert!(scheduler.dependents(d).unwrap().is_empty());
        assert_eq!(scheduler.get::<i32>(d).unwrap(), 1);
    }

    #[test]
    fn test_method_with_future_receiver() {
        #[derive(Clone)]
        struct Scale {
            factor: f32,
        }

        impl Scale {
            fn apply(&self, input: f32) -> f32 {
                input * self.factor
            }
        }

        let mut scheduler = Scheduler::new();
        let scale = scheduler.add(|| Scale { factor: 2.0 });
        let input = scheduler.add(|| 21.0f32);
        let fs = scheduler.future::<Scale>(scale).unwrap();
        let fi = scheduler.future::<f32>(input).unwrap();
        let token = scheduler.add_method(Scale::apply, fs, fi);

        assert_eq!(scheduler.get::<f32>(token).unwrap(), 42.0);
        assert!(scheduler.result_type(token).unwrap().is::<f32>());
    }

    #[test]
    fn test_repeated_get_returns_same_value() {
        let mut scheduler = Scheduler::new();
        let token = scheduler.add(|| String::from("stable"));
        scheduler.execute_all().unwrap();

        for _ in 0..3 {
            assert_eq!(scheduler.get::<String>(token).unwrap(), "stable");
        }
        assert_eq!(scheduler.invocations(token).unwrap(), 1);
    }
}
