#![forbid(unsafe_code)]

pub mod graph;
pub use graph::*;

pub mod host;
pub use host::*;

pub mod tables;
pub use tables::*;

pub mod writer;
pub use writer::*;
