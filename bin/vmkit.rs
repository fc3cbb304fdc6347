//! `vmkit` builds and validates a virtual machine configuration and emits the invocation the
//! virtualization engine consumes.
//!
//! ## Usage
//!
//! ```bash
//! vmkit \
//!     --cpus=2 \
//!     --memory=2048 \
//!     --bootloader=efi,variable-store=/var/lib/vm/efi-store,create \
//!     --device=virtio-blk,path=/var/lib/vm/disk.img \
//!     --device=virtio-net,nat \
//!     --device=virtio-vsock,port=1024,socketURL=/run/vm/chan.sock,listen \
//!     --timesync=vsockPort=1024 \
//!     --restful-uri=unix:///run/vm/rest.sock
//! ```
//!
//! By default the normalized command-line token sequence is printed; `--output=json` prints the
//! canonical JSON document instead.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vmkit::{
    cli::{OutputFormat, VmkitArgs},
    rest::RestEndpoint,
};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // Parse command line arguments
    let args = VmkitArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level)?)
        .init();

    // Configuration errors are fatal before any engine resource exists.
    let vm = args.to_virtual_machine()?;
    let endpoint = RestEndpoint::parse(&args.restful_uri)?;
    tracing::debug!(?endpoint, "validated control service endpoint");

    match args.output {
        OutputFormat::CmdLine => {
            println!("{}", vm.to_cmd_line()?.join(" "));
        }
        OutputFormat::Json => {
            // Rendering also validates mandatory device fields.
            vm.to_cmd_line()?;
            println!("{}", serde_json::to_string_pretty(&vm)?);
        }
    }

    Ok(())
}
