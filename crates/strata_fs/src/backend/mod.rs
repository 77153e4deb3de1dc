//! Reference backends implementing [`crate::FileSystem`].
//!
//! - `memory`   : in-process tree
//! - `os`       : host directory
//! - `sub`      : path-rebasing sub-view
//! - `readonly` : mutation-rejecting wrapper

mod memory;
mod os;
mod readonly;
mod sub;

pub use memory::MemoryFs;
pub use os::OsFs;
pub use readonly::ReadOnlyFs;
pub use sub::{SubFs, make_dir, open_dir};
