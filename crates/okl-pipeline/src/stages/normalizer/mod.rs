//! Marker syntax lowering. `@name(args)` first becomes an attribute the
//! parser accepts, spelled the GNU way where the C++ spelling has no slot,
//! and then every GNU-spelled OKL attribute is moved to the standard
//! `[[...]]` position in front of the node it decorates.

mod gnu_to_std;
mod okl_to_gnu;

pub use gnu_to_std::{normalize_gnu, GnuNormalized, GnuToStdStage};
pub use okl_to_gnu::{normalize_okl, OklNormalized, OklToGnuStage};
