//! Pod Capture Controller
//!
//! Runs on every node and starts a rotating `tcpdump` capture for each local
//! pod annotated with `tcpdump.antrea.io: "<N>"`. Changing N restarts the
//! capture with the new rotation count; removing the annotation or deleting
//! the pod stops it and removes its capture files.

pub mod annotation;
pub mod backoff;
pub mod cache;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod reconciler;
pub mod registry;
pub mod watcher;

#[cfg(test)]
mod test_utils;

pub use controller::Controller;
pub use config::ControllerConfig;
pub use error::ControllerError;
