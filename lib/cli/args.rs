use clap::{Parser, ValueEnum};

use crate::{
    config::{Bootloader, VirtualMachine},
    VmkitResult,
};

use super::styles;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Arguments for the vmkit command
#[derive(Debug, Parser)]
#[command(name = "vmkit", author, version, styles=styles::styles())]
pub struct VmkitArgs {
    /// Number of virtual CPUs
    #[arg(long, default_value_t = 1)]
    pub cpus: u32,

    /// Guest memory size in MiB
    #[arg(long, value_name = "MIB", default_value_t = 512)]
    pub memory: u64,

    /// Bootloader specification, e.g. `efi,variable-store=/store,create`
    #[arg(long, conflicts_with = "kernel")]
    pub bootloader: Option<String>,

    /// Path to the kernel image to boot
    #[arg(long)]
    pub kernel: Option<String>,

    /// Kernel command line
    #[arg(long, requires = "kernel")]
    pub kernel_cmdline: Option<String>,

    /// Path to the initrd image
    #[arg(long, requires = "kernel")]
    pub initrd: Option<String>,

    /// Device specification, e.g. `virtio-blk,path=/disk.img` (repeatable)
    #[arg(long = "device")]
    pub devices: Vec<String>,

    /// Timesync specification, e.g. `vsockPort=1234`
    #[arg(long)]
    pub timesync: Option<String>,

    /// Control service endpoint URI (`unix://`, `tcp://` or `none://`)
    #[arg(long, default_value = "none://")]
    pub restful_uri: String,

    /// Attach a host window to configured graphics adapters
    #[arg(long)]
    pub gui: bool,

    /// Log level filter, e.g. `debug` or `vmkit=trace`
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// What to emit for the engine invocation
    #[arg(long, value_enum, default_value_t = OutputFormat::CmdLine)]
    pub output: OutputFormat,
}

/// Engine invocation output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The normalized command-line token sequence.
    CmdLine,

    /// The canonical JSON document.
    Json,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VmkitArgs {
    /// Builds and validates the virtual machine configuration these arguments describe.
    pub fn to_virtual_machine(&self) -> VmkitResult<VirtualMachine> {
        let mut vm = VirtualMachine::builder()
            .vcpus(self.cpus)
            .memory_bytes(crate::utils::mib_to_bytes(self.memory))
            .build();

        if let Some(kernel) = &self.kernel {
            vm.bootloader = Some(Bootloader::new_linux(
                kernel,
                self.kernel_cmdline.as_deref().unwrap_or_default(),
                self.initrd.as_deref().unwrap_or_default(),
            ));
        } else if let Some(spec) = &self.bootloader {
            vm.bootloader = Some(Bootloader::from_cmd_line(spec)?);
        }

        vm.add_devices_from_cmd_line(&self.devices)?;
        if let Some(spec) = &self.timesync {
            vm.add_timesync_from_cmd_line(spec)?;
        }

        if self.gui {
            for gpu in vm.gpu_devices_mut() {
                gpu.uses_gui = true;
            }
        }

        Ok(vm)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
