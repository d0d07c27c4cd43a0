//! The training worker.

mod worker;

pub use worker::*;
