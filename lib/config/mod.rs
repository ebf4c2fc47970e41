//! Configuration types and helpers.

mod defaults;
mod env_config;
mod ports;
mod urls;
mod validate;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use env_config::*;
pub use ports::*;
pub use urls::*;
