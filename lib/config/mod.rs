//! Virtual machine configuration.
//!
//! The types here form the user-facing description of a machine: a bootloader, a set of
//! devices, and the optional timesync parameter. Each type knows how to parse itself from its
//! command-line form and how to render itself back, and the whole aggregate serializes to a
//! stable JSON document.

mod bootloader;
mod mac_address;
mod options;
mod virtio;
mod vm;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use bootloader::*;
pub use mac_address::*;
pub use options::*;
pub use virtio::*;
pub use vm::*;
