use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{utils, VmkitError, VmkitResult};

use super::{
    bootloader::Bootloader,
    options::parse_options,
    virtio::{NetworkBlockDevice, VirtioDevice, VirtioGpu, VirtioNet, VirtioVsock},
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The complete configuration of a virtual machine.
///
/// Serializes to the canonical JSON document and renders to the normalized command-line token
/// sequence; both representations round-trip.
///
/// ## Examples
///
/// ```
/// use vmkit::config::{Bootloader, VirtualMachine, VirtioDevice};
///
/// # fn main() -> anyhow::Result<()> {
/// let mut vm = VirtualMachine::builder()
///     .vcpus(2)
///     .memory_bytes(1024 * 1024 * 1024)
///     .bootloader(Bootloader::new_efi("/tmp/efi-store", true))
///     .build();
///
/// vm.add_device(VirtioDevice::from_cmd_line("virtio-blk,path=/tmp/disk.img")?);
/// assert!(vm.to_cmd_line()?.contains(&"--device".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct VirtualMachine {
    /// Number of virtual CPUs.
    #[serde(default)]
    #[builder(default)]
    pub vcpus: u32,

    /// Guest memory size in bytes.
    #[serde(rename = "memoryBytes", default)]
    #[builder(default)]
    pub memory_bytes: u64,

    /// How the machine boots. Mandatory for rendering; a machine without one cannot start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub bootloader: Option<Bootloader>,

    /// Attached virtual devices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub devices: Vec<VirtioDevice>,

    /// Guest clock synchronization configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub timesync: Option<TimeSync>,
}

/// Guest clock synchronization over a socket channel port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSync {
    /// Channel port the guest agent listens on.
    #[serde(rename = "vsockPort")]
    pub vsock_port: u32,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VirtualMachine {
    /// Creates a machine with `memory_mib` MiB of guest memory.
    pub fn new(vcpus: u32, memory_mib: u64, bootloader: Bootloader) -> Self {
        Self {
            vcpus,
            memory_bytes: utils::mib_to_bytes(memory_mib),
            bootloader: Some(bootloader),
            devices: Vec::new(),
            timesync: None,
        }
    }

    /// Attaches a device to the machine.
    pub fn add_device(&mut self, device: VirtioDevice) {
        self.devices.push(device);
    }

    /// Parses and attaches one device per `--device` specification.
    ///
    /// All-or-nothing: if any specification fails to parse, no device is added.
    pub fn add_devices_from_cmd_line<S: AsRef<str>>(&mut self, specs: &[S]) -> VmkitResult<()> {
        let devices = specs
            .iter()
            .map(|spec| VirtioDevice::from_cmd_line(spec.as_ref()))
            .collect::<VmkitResult<Vec<_>>>()?;
        self.devices.extend(devices);
        Ok(())
    }

    /// Parses a `--timesync` specification, e.g. `vsockPort=1234`.
    pub fn add_timesync_from_cmd_line(&mut self, spec: &str) -> VmkitResult<()> {
        let tokens: Vec<&str> = spec.split(',').collect();
        let mut vsock_port = 0u32;
        for option in parse_options(&tokens) {
            match option.key.as_str() {
                "vsockPort" => {
                    vsock_port = option
                        .value
                        .parse()
                        .map_err(|_| VmkitError::MissingTimesyncPort)?;
                }
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "timesync",
                        key: option.key.clone(),
                    })
                }
            }
        }
        self.timesync = Some(TimeSync::new(vsock_port)?);
        Ok(())
    }

    /// Renders the machine to its normalized command-line token sequence.
    pub fn to_cmd_line(&self) -> VmkitResult<Vec<String>> {
        let mut args = Vec::new();
        if self.vcpus > 0 {
            args.push("--cpus".to_string());
            args.push(self.vcpus.to_string());
        }
        if self.memory_bytes > 0 {
            args.push("--memory".to_string());
            args.push(utils::bytes_to_mib_ceil(self.memory_bytes).to_string());
        }

        let bootloader = self.bootloader.as_ref().ok_or(VmkitError::MissingBootloader)?;
        args.extend(bootloader.to_cmd_line()?);

        for device in &self.devices {
            args.extend(device.to_cmd_line()?);
        }

        if let Some(timesync) = &self.timesync {
            args.push("--timesync".to_string());
            args.push(format!("vsockPort={}", timesync.vsock_port));
        }

        Ok(args)
    }

    /// Returns the configured socket channel devices.
    pub fn vsock_devices(&self) -> Vec<&VirtioVsock> {
        self.devices
            .iter()
            .filter_map(|dev| match dev {
                VirtioDevice::Vsock(vsock) => Some(vsock),
                _ => None,
            })
            .collect()
    }

    /// Returns the configured network interfaces.
    pub fn virtio_net_devices(&self) -> Vec<&VirtioNet> {
        self.devices
            .iter()
            .filter_map(|dev| match dev {
                VirtioDevice::Net(net) => Some(net),
                _ => None,
            })
            .collect()
    }

    /// Returns mutable references to the configured graphics adapters.
    pub fn gpu_devices_mut(&mut self) -> Vec<&mut VirtioGpu> {
        self.devices
            .iter_mut()
            .filter_map(|dev| match dev {
                VirtioDevice::Gpu(gpu) => Some(gpu),
                _ => None,
            })
            .collect()
    }

    /// Looks up a network block device by its device identifier.
    pub fn network_block_device(&self, device_id: &str) -> Option<&NetworkBlockDevice> {
        self.devices.iter().find_map(|dev| match dev {
            VirtioDevice::Nbd(nbd) if nbd.device_identifier == device_id => Some(nbd),
            _ => None,
        })
    }
}

impl TimeSync {
    /// Creates a timesync configuration. The channel port is mandatory and non-zero.
    pub fn new(vsock_port: u32) -> VmkitResult<Self> {
        if vsock_port == 0 {
            return Err(VmkitError::MissingTimesyncPort);
        }
        Ok(Self { vsock_port })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
