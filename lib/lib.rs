//! `vmkit` configures, launches, and controls a single virtual machine whose execution is
//! delegated to an external virtualization engine.
//!
//! # Overview
//!
//! vmkit sits between a human- or automation-facing description of a virtual machine and the
//! engine's native configuration objects. It handles:
//! - A typed, extensible catalogue of virtual devices with a stable command-line and JSON
//!   representation
//! - A bidirectional socket proxy bridging host UNIX sockets and guest socket channels
//! - A small control-plane service wrapping the engine's lifecycle primitives
//! - Host/guest time synchronization through the guest agent
//!
//! # Architecture
//!
//! - **Config**: device codec, polymorphic serialization, and the `VirtualMachine` aggregate
//! - **Engine**: the adapter seam behind which the actual hypervisor lives
//! - **Proxy**: relays between host UNIX sockets and guest channel ports
//! - **Rest**: the `/vm/state` and `/vm/inspect` control plane
//!
//! # Usage Example
//!
//! ```rust
//! use vmkit::config::{Bootloader, VirtualMachine, VirtioDevice};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut vm = VirtualMachine::builder()
//!         .vcpus(2)
//!         .memory_bytes(1024 * 1024 * 1024)
//!         .bootloader(Bootloader::new_efi("/tmp/efi-store", true))
//!         .build();
//!
//!     vm.add_device(VirtioDevice::from_cmd_line("virtio-blk,path=/tmp/disk.img")?);
//!     let args = vm.to_cmd_line()?;
//!     assert!(args.contains(&"--device".to_string()));
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Device catalogue, configuration types and validation
//! - [`engine`] - The virtualization engine adapter seam
//! - [`proxy`] - Host/guest socket channel relays
//! - [`rest`] - Control-plane service implementation
//! - [`timesync`] - Guest clock resynchronization
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod engine;
pub mod proxy;
pub mod rest;
pub mod timesync;
pub mod utils;

pub use error::*;
