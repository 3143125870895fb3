#![forbid(unsafe_code)]
//! # Sakimono
//!
//! A small, in-process, lazy task graph. Register computations whose
//! arguments are either plain values or the future result of another task,
//! and let the scheduler work out the order in which they have to run.
//!
//! ```rust
//! use sakimono::Scheduler;
//!
//! # fn main() -> Result<(), sakimono::SchedulerError> {
//! let mut scheduler = Scheduler::new();
//!
//! // Quadratic equation x^2 - 3x + 2 = 0
//! let (a, b, c) = (1.0f32, -3.0f32, 2.0f32);
//!
//! let ac = scheduler.add2(|a: f32, c: f32| -4.0 * a * c, a, c);
//! let disc = scheduler.add2(|b: f32, v: f32| b * b + v, b, scheduler.future::<f32>(ac)?);
//!
//! let plus = scheduler.add2(|b: f32, d: f32| -b + d.sqrt(), b, scheduler.future::<f32>(disc)?);
//! let x1 = scheduler.add2(|a: f32, v: f32| v / (2.0 * a), a, scheduler.future::<f32>(plus)?);
//!
//! let minus = scheduler.add2(|b: f32, d: f32| -b - d.sqrt(), b, scheduler.future::<f32>(disc)?);
//! let x2 = scheduler.add2(|a: f32, v: f32| v / (2.0 * a), a, scheduler.future::<f32>(minus)?);
//!
//! scheduler.execute_all()?;
//!
//! assert_eq!(scheduler.get::<f32>(x1)?, 2.0);
//! assert_eq!(scheduler.get::<f32>(x2)?, 1.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core abstractions
//!
//! * [`OrderToken`]: returned for every registered task, dense and ordered.
//! * [`FutureHandle<T>`]: a typed reference to the eventual result of a task,
//!   obtained with [`Scheduler::future`] and passed as an argument.
//! * [`Arg<T>`]: a task argument, either [`Arg::Literal`] or [`Arg::Future`].
//!   Registration methods take `impl Into<Arg<T>>`, so both values and
//!   handles can be passed directly.
//! * [`TypeTag`]: the runtime witness used to check that a result is read
//!   back with the type it was produced with.
//!
//! Closures passed to the registration methods should annotate their
//! argument types, the argument may otherwise be ambiguous between a value
//! and a handle.

mod engine;
mod error;
#[cfg(feature = "logging")]
mod logging;
mod scheduler;

pub use crate::engine::{Arg, FutureHandle, OrderToken, TypeTag};
pub use crate::error::*;
#[cfg(feature = "logging")]
pub use crate::logging::init_logging;
pub use crate::scheduler::{
    Diagnostics, ExecutionPolicy, Scheduler, SchedulerConfig, TaskExecution,
};
