//! Command implementations for the `okl` binary

pub mod backends;
pub mod common;
pub mod normalize;
pub mod transpile;

pub use backends::backends_command;
pub use normalize::normalize_command;
pub use transpile::transpile_command;
