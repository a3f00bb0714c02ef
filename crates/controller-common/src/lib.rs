//! # Controller Common
//!
//! The watch loop both controllers run their reconcilers under. Each
//! controller keeps a thin typed watcher that hands its reconcile function
//! and context to [`watch_resource`].

pub mod watch;

pub use watch::{watch_resource, ErrorPolicy};
