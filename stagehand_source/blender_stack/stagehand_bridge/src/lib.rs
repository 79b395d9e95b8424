#![forbid(unsafe_code)]

pub mod channel;
pub mod command;

pub use channel::*;
pub use command::*;
