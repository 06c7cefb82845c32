#![warn(missing_docs)]
//! This lib provide several utilities for use in the `coap` project.

mod resolver;
mod scanner;

pub use resolver::*;
pub use scanner::*;
