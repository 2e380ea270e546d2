pub mod apply;
pub mod backup;
pub mod bundle;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod io;
pub mod meta;
pub mod paths;
pub mod plan;
pub mod tree;

pub use engine::Engine;
pub use error::{Result, WmError};
