//! Declarative execution engine for AVS operator registration.
//!
//! A [`spec::Specification`] describes an AVS's contracts and, for each
//! operation, which method to call and how every argument is obtained. The
//! [`controller::ExecutionController`] resolves those argument expressions
//! through the [`cache`], the [`functions`] registry, the [`transform`] engine
//! and the [`converter`], then submits or reads the call.

pub mod cache;
pub mod chain;
pub mod cli;
pub mod config;
pub mod controller;
pub mod converter;
pub mod error;
pub mod functions;
pub mod logging;
pub mod signer;
pub mod spec;
pub mod transaction;
pub mod transform;
pub mod value;

#[cfg(test)]
mod tests;

pub use error::{ExecutorError, ExecutorResult};
