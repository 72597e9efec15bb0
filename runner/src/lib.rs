//! Dispatch of assembled command lines to a local shell, an MPI launcher or a PBS queue.
//!
//! Callers build a [`command::CommandLine`] and a [`resources::ResourceRequest`] and hand both
//! to a [`dispatcher::Dispatcher`], which blocks until the job has finished and reports a
//! failed job as [`executors::ExecutorError::JobFailure`] carrying its exit status.

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod environment;
pub mod executors;
pub mod locator;
pub mod resources;

#[cfg(test)]
mod test_utils;
