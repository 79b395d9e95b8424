#![forbid(unsafe_code)]

pub mod props;
pub use props::*;

pub mod declared;
pub use declared::*;

pub mod entity;
pub use entity::*;

pub mod tree;
pub use tree::*;

pub mod reconcile;
pub use reconcile::*;

pub mod clock;
pub use clock::*;
