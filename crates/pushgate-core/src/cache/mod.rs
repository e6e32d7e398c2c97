//! Process-wide caches shared across pushes.

pub mod directory;
pub mod query;

pub use directory::{AccountDirectory, DirectoryCache, DirectorySnapshot, StaticDirectory};
pub use query::{CachedOracle, QueryCache};
