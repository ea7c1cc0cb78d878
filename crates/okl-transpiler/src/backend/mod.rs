//! Per-backend attribute handlers.
//!
//! Every backend module exposes a `register` function filling the handler
//! table for its [`okl_core::TargetBackend`]; [`register`] calls them in a
//! fixed order.

pub mod atomic;
pub mod common;
pub mod cuda;
pub mod cuda_subset;
pub mod dpcpp;
pub mod hip;
pub mod host;
pub mod openmp;
pub mod serial;
pub mod simt;
pub mod tile;

use crate::registry::AttributeRegistry;

pub fn register(registry: &mut AttributeRegistry) {
    serial::register(registry);
    openmp::register(registry);
    cuda::register(registry);
    hip::register(registry);
    dpcpp::register(registry);
}
