//! Common utilities and helpers.

mod conversion;
mod exit;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use conversion::*;
pub use exit::*;
