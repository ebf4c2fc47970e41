//! Utility functions and types.

mod fs;
mod path;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use fs::*;
pub use path::*;
