//! AWS implementations of the core collaborator traits.
//!
//! The traits are synchronous; every adapter blocks in place on the current
//! multi-threaded Tokio runtime to drive the async SDK call.

use std::future::Future;

pub mod catalog;
pub mod notifier;
pub mod object_store;
pub mod workflow;

pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
