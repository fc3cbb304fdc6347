//! The virtual device catalogue.
//!
//! Every device has two frozen external representations: a comma-separated command-line
//! specification (`--device virtio-blk,path=/disk.img,deviceId=disk0`) and a JSON object tagged
//! with a `kind` discriminator. Both vocabularies are a compatibility contract; the tests at the
//! bottom of this module pin them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{VmkitError, VmkitResult};

use super::{
    mac_address::MacAddress,
    options::{parse_options, DeviceOption},
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default network block device timeout.
pub const DEFAULT_NBD_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default graphics adapter resolution.
pub const DEFAULT_GPU_RESOLUTION: (u32, u32) = (800, 600);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A virtual device attached to a [`VirtualMachine`](super::VirtualMachine).
///
/// The `kind` JSON tag selects the variant; unknown or missing kinds are rejected during
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VirtioDevice {
    /// Virtio block storage backed by a disk image or block device.
    #[serde(rename = "virtioblk")]
    Blk(VirtioBlk),

    /// NVM Express controller storage.
    #[serde(rename = "nvme")]
    Nvme(NvmExpressController),

    /// USB mass storage.
    #[serde(rename = "usbmassstorage")]
    UsbMassStorage(UsbMassStorage),

    /// Network block device reached over a URI.
    #[serde(rename = "nbd")]
    Nbd(NetworkBlockDevice),

    /// Shared host directory.
    #[serde(rename = "virtiofs")]
    Fs(VirtioFs),

    /// Rosetta translation share.
    #[serde(rename = "rosetta")]
    Rosetta(RosettaShare),

    /// Network interface.
    #[serde(rename = "virtionet")]
    Net(VirtioNet),

    /// Serial console.
    #[serde(rename = "virtioserial")]
    Serial(VirtioSerial),

    /// Entropy source.
    #[serde(rename = "virtiorng")]
    Rng(VirtioRng),

    /// Socket channel between host and guest.
    #[serde(rename = "virtiosock")]
    Vsock(VirtioVsock),

    /// Graphics adapter.
    #[serde(rename = "virtiogpu")]
    Gpu(VirtioGpu),

    /// Pointing or keyboard input device.
    #[serde(rename = "virtioinput")]
    Input(VirtioInput),

    /// Memory balloon.
    #[serde(rename = "virtioballoon")]
    Balloon(VirtioBalloon),
}

/// The backend a disk-like storage device sits on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskBackend {
    /// Backend left unspecified; the engine treats the path as a raw image.
    #[default]
    #[serde(rename = "")]
    Default,

    /// A raw disk image file.
    #[serde(rename = "image")]
    Image,

    /// A host block device.
    #[serde(rename = "dev")]
    BlockDevice,
}

/// Virtio block storage device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtioBlk {
    /// Stable device name carried in the JSON contract.
    #[serde(rename = "devName", default = "VirtioBlk::dev_name")]
    pub dev_name: String,

    /// Path to the disk image or block device.
    #[serde(rename = "imagePath", default)]
    pub image_path: String,

    /// Whether the guest sees the storage read-only.
    #[serde(rename = "readOnly", default, skip_serializing_if = "is_false")]
    pub read_only: bool,

    /// Storage backend type.
    #[serde(rename = "type", default, skip_serializing_if = "DiskBackend::is_default")]
    pub backend: DiskBackend,

    /// Identifier the guest can use to address this disk.
    #[serde(rename = "deviceIdentifier", default, skip_serializing_if = "String::is_empty")]
    pub device_identifier: String,
}

/// NVM Express controller storage device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvmExpressController {
    /// Stable device name carried in the JSON contract.
    #[serde(rename = "devName", default = "NvmExpressController::dev_name")]
    pub dev_name: String,

    /// Path to the disk image or block device.
    #[serde(rename = "imagePath", default)]
    pub image_path: String,

    /// Whether the guest sees the storage read-only.
    #[serde(rename = "readOnly", default, skip_serializing_if = "is_false")]
    pub read_only: bool,

    /// Storage backend type.
    #[serde(rename = "type", default, skip_serializing_if = "DiskBackend::is_default")]
    pub backend: DiskBackend,
}

/// USB mass storage device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsbMassStorage {
    /// Stable device name carried in the JSON contract.
    #[serde(rename = "devName", default = "UsbMassStorage::dev_name")]
    pub dev_name: String,

    /// Path to the disk image.
    #[serde(rename = "imagePath", default)]
    pub image_path: String,

    /// Whether the guest sees the storage read-only.
    #[serde(rename = "readOnly", default, skip_serializing_if = "is_false")]
    pub read_only: bool,

    /// Storage backend type.
    #[serde(rename = "type", default, skip_serializing_if = "DiskBackend::is_default")]
    pub backend: DiskBackend,
}

/// How a network block device orders its writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SynchronizationMode {
    /// Every write reaches the server before completion is reported.
    #[default]
    #[serde(rename = "full")]
    Full,

    /// Writes may be acknowledged before they are durable.
    #[serde(rename = "none")]
    None,
}

/// Network block device.
///
/// The capitalized JSON field names are a historical accident kept for compatibility;
/// `Timeout` is serialized in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkBlockDevice {
    /// Stable device name carried in the JSON contract.
    #[serde(rename = "devName", default = "NetworkBlockDevice::dev_name")]
    pub dev_name: String,

    /// URI of the NBD server, e.g. `nbd://1.1.1.1:10000`.
    #[serde(default)]
    pub uri: String,

    /// Whether the guest sees the storage read-only.
    #[serde(rename = "readOnly", default, skip_serializing_if = "is_false")]
    pub read_only: bool,

    /// Identifier the guest can use to address this disk. Always serialized.
    #[serde(rename = "DeviceIdentifier", default)]
    pub device_identifier: String,

    /// How long to wait for the NBD server before giving up.
    #[serde(rename = "Timeout", with = "duration_nanos", default = "default_nbd_timeout")]
    pub timeout: Duration,

    /// Write ordering guarantee.
    #[serde(rename = "SynchronizationMode", default)]
    pub synchronization_mode: SynchronizationMode,
}

/// Shared host directory exposed to the guest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtioFs {
    /// Tag the guest mounts the share under.
    #[serde(rename = "mountTag", default)]
    pub mount_tag: String,

    /// Host directory to share.
    #[serde(rename = "sharedDir", default)]
    pub shared_dir: String,
}

/// Rosetta translation share.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosettaShare {
    /// Tag the guest mounts the share under.
    #[serde(rename = "mountTag", default)]
    pub mount_tag: String,

    /// Whether to install Rosetta if it is missing from the host.
    #[serde(rename = "installRosetta", default)]
    pub install_rosetta: bool,

    /// Whether a missing Rosetta installation is tolerated.
    #[serde(rename = "ignoreIfMissing", default)]
    pub ignore_if_missing: bool,
}

/// Network interface.
///
/// Exactly one of NAT mode and a unixgram socket path must be configured before the device can
/// render itself. The magic-handshake flag has asymmetric defaults kept for backward
/// compatibility: devices parsed from a command line or JSON document with a socket path default
/// it on, directly constructed devices default it off.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtioNet {
    /// Whether the interface uses host NAT.
    pub nat: bool,

    /// Path of the unixgram socket backing the interface.
    #[serde(rename = "unixSocketPath", skip_serializing_if = "String::is_empty")]
    pub unix_socket_path: String,

    /// Whether the datagram stream starts with the magic handshake packet.
    #[serde(rename = "vfkitMagic", skip_serializing_if = "is_false")]
    pub vfkit_magic: bool,

    /// Hardware address of the interface; the engine picks one when unset.
    #[serde(rename = "macAddress", skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<MacAddress>,
}

/// Serial console device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtioSerial {
    /// File the console output is appended to.
    #[serde(rename = "logFile", default, skip_serializing_if = "String::is_empty")]
    pub log_file: String,

    /// Name of the pty allocated at runtime; never set from the command line.
    #[serde(rename = "ptyName", default, skip_serializing_if = "String::is_empty")]
    pub pty_name: String,

    /// Whether the console is attached to a pty.
    #[serde(rename = "usesPty", default, skip_serializing_if = "is_false")]
    pub uses_pty: bool,

    /// Whether the console is attached to the host stdio.
    #[serde(rename = "usesStdio", default, skip_serializing_if = "is_false")]
    pub uses_stdio: bool,
}

/// Entropy source device. Carries no configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtioRng {}

/// Memory balloon device. Carries no configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtioBalloon {}

/// Socket channel between a guest port and a host UNIX socket.
///
/// An empty `socket_url` marks an internal-use channel which is never proxied. On the command
/// line the direction defaults to `listen`; in JSON the `listen` field is only serialized when
/// true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtioVsock {
    /// Guest channel port.
    #[serde(default)]
    pub port: u32,

    /// Host UNIX socket path bridged to the channel port.
    #[serde(rename = "socketURL", default, skip_serializing_if = "String::is_empty")]
    pub socket_url: String,

    /// Whether the host side listens (guest connects) rather than connects.
    #[serde(default, skip_serializing_if = "is_false")]
    pub listen: bool,
}

/// Graphics adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtioGpu {
    /// Whether a host window is attached to this adapter.
    #[serde(rename = "usesGUI", default)]
    pub uses_gui: bool,

    /// Horizontal resolution in pixels.
    #[serde(default)]
    pub width: u32,

    /// Vertical resolution in pixels.
    #[serde(default)]
    pub height: u32,
}

/// The kind of input device exposed to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    /// A pointing device.
    #[serde(rename = "pointing")]
    Pointing,

    /// A keyboard.
    #[serde(rename = "keyboard")]
    Keyboard,
}

/// Input device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtioInput {
    /// Whether this is a pointing device or a keyboard.
    #[serde(rename = "inputType")]
    pub input_type: InputType,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VirtioDevice {
    /// Parses a `--device` command-line specification.
    ///
    /// The leading comma-separated token selects the device kind, the remaining tokens are
    /// `key[=value]` options dispatched to that kind. Option order does not matter.
    pub fn from_cmd_line(spec: &str) -> VmkitResult<Self> {
        let tokens: Vec<&str> = spec.split(',').collect();
        let (kind, rest) = tokens
            .split_first()
            .ok_or_else(|| VmkitError::UnknownDeviceKind(String::new()))?;
        let options = parse_options(rest);

        match *kind {
            "virtio-blk" => Ok(Self::Blk(VirtioBlk::from_options(&options)?)),
            "nvme" => Ok(Self::Nvme(NvmExpressController::from_options(&options)?)),
            "usb-mass-storage" => Ok(Self::UsbMassStorage(UsbMassStorage::from_options(&options)?)),
            "nbd" => Ok(Self::Nbd(NetworkBlockDevice::from_options(&options)?)),
            "virtio-fs" => Ok(Self::Fs(VirtioFs::from_options(&options)?)),
            "rosetta" => Ok(Self::Rosetta(RosettaShare::from_options(&options)?)),
            "virtio-net" => Ok(Self::Net(VirtioNet::from_options(&options)?)),
            "virtio-serial" => Ok(Self::Serial(VirtioSerial::from_options(&options)?)),
            "virtio-rng" => Ok(Self::Rng(VirtioRng::from_options(&options)?)),
            "virtio-vsock" => Ok(Self::Vsock(VirtioVsock::from_options(&options)?)),
            "virtio-gpu" => Ok(Self::Gpu(VirtioGpu::from_options(&options)?)),
            "virtio-input" => Ok(Self::Input(VirtioInput::from_options(&options)?)),
            "virtio-balloon" => Ok(Self::Balloon(VirtioBalloon::from_options(&options)?)),
            other => Err(VmkitError::UnknownDeviceKind(other.to_string())),
        }
    }

    /// Renders this device back to its command-line form, `["--device", "<spec>"]`.
    ///
    /// For any device `d`, `from_cmd_line(d.to_cmd_line()?[1])` reconstructs `d`. Option order
    /// in the rendered spec is stable.
    pub fn to_cmd_line(&self) -> VmkitResult<Vec<String>> {
        let spec = match self {
            Self::Blk(dev) => dev.cmd_line_spec()?,
            Self::Nvme(dev) => dev.cmd_line_spec()?,
            Self::UsbMassStorage(dev) => dev.cmd_line_spec()?,
            Self::Nbd(dev) => dev.cmd_line_spec()?,
            Self::Fs(dev) => dev.cmd_line_spec()?,
            Self::Rosetta(dev) => dev.cmd_line_spec()?,
            Self::Net(dev) => dev.cmd_line_spec()?,
            Self::Serial(dev) => dev.cmd_line_spec()?,
            Self::Rng(_) => "virtio-rng".to_string(),
            Self::Vsock(dev) => dev.cmd_line_spec()?,
            Self::Gpu(dev) => dev.cmd_line_spec(),
            Self::Input(dev) => dev.cmd_line_spec(),
            Self::Balloon(_) => "virtio-balloon".to_string(),
        };
        Ok(vec!["--device".to_string(), spec])
    }
}

impl VirtioBlk {
    fn dev_name() -> String {
        "virtio-blk".to_string()
    }

    /// Creates a virtio block device backed by `image_path`.
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            dev_name: Self::dev_name(),
            image_path: image_path.into(),
            read_only: false,
            backend: DiskBackend::Default,
            device_identifier: String::new(),
        }
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self::new("");
        for option in options {
            match option.key.as_str() {
                "path" => dev.image_path = option.value.clone(),
                "deviceId" => dev.device_identifier = option.value.clone(),
                "type" => dev.backend = parse_disk_backend(&option.value)?,
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "virtio-blk",
                        key: option.key.clone(),
                    })
                }
            }
        }
        if dev.image_path.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "virtio-blk",
                field: "path",
            });
        }
        Ok(dev)
    }

    fn cmd_line_spec(&self) -> VmkitResult<String> {
        if self.image_path.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "virtio-blk",
                field: "path",
            });
        }
        let mut spec = format!("virtio-blk,path={}", self.image_path);
        if !self.device_identifier.is_empty() {
            spec.push_str(&format!(",deviceId={}", self.device_identifier));
        }
        if let Some(backend) = disk_backend_token(self.backend) {
            spec.push_str(&format!(",type={backend}"));
        }
        Ok(spec)
    }
}

impl NvmExpressController {
    fn dev_name() -> String {
        "nvme".to_string()
    }

    /// Creates an NVMe controller backed by `image_path`.
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            dev_name: Self::dev_name(),
            image_path: image_path.into(),
            read_only: false,
            backend: DiskBackend::Default,
        }
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self::new("");
        for option in options {
            match option.key.as_str() {
                "path" => dev.image_path = option.value.clone(),
                "type" => dev.backend = parse_disk_backend(&option.value)?,
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "nvme",
                        key: option.key.clone(),
                    })
                }
            }
        }
        if dev.image_path.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "nvme",
                field: "path",
            });
        }
        Ok(dev)
    }

    fn cmd_line_spec(&self) -> VmkitResult<String> {
        if self.image_path.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "nvme",
                field: "path",
            });
        }
        let mut spec = format!("nvme,path={}", self.image_path);
        if let Some(backend) = disk_backend_token(self.backend) {
            spec.push_str(&format!(",type={backend}"));
        }
        Ok(spec)
    }
}

impl UsbMassStorage {
    fn dev_name() -> String {
        "usb-mass-storage".to_string()
    }

    /// Creates a USB mass storage device backed by `image_path`.
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            dev_name: Self::dev_name(),
            image_path: image_path.into(),
            read_only: false,
            backend: DiskBackend::Default,
        }
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self::new("");
        for option in options {
            match option.key.as_str() {
                "path" => dev.image_path = option.value.clone(),
                "readonly" => dev.read_only = true,
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "usb-mass-storage",
                        key: option.key.clone(),
                    })
                }
            }
        }
        if dev.image_path.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "usb-mass-storage",
                field: "path",
            });
        }
        Ok(dev)
    }

    fn cmd_line_spec(&self) -> VmkitResult<String> {
        if self.image_path.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "usb-mass-storage",
                field: "path",
            });
        }
        let mut spec = format!("usb-mass-storage,path={}", self.image_path);
        if self.read_only {
            spec.push_str(",readonly");
        }
        Ok(spec)
    }
}

impl NetworkBlockDevice {
    fn dev_name() -> String {
        "nbd".to_string()
    }

    /// Creates a network block device pointing at `uri`.
    pub fn new(
        uri: impl Into<String>,
        timeout: Duration,
        synchronization_mode: SynchronizationMode,
    ) -> Self {
        Self {
            dev_name: Self::dev_name(),
            uri: uri.into(),
            read_only: false,
            device_identifier: String::new(),
            timeout,
            synchronization_mode,
        }
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self::new("", DEFAULT_NBD_TIMEOUT, SynchronizationMode::Full);
        for option in options {
            match option.key.as_str() {
                "uri" => dev.uri = option.value.clone(),
                "deviceId" => dev.device_identifier = option.value.clone(),
                "timeout" => {
                    let millis: u64 = option.value.parse().map_err(|_| {
                        VmkitError::InvalidOptionValue {
                            kind: "nbd",
                            key: "timeout",
                            value: option.value.clone(),
                            expected: "a duration in milliseconds",
                        }
                    })?;
                    dev.timeout = Duration::from_millis(millis);
                }
                "sync" => {
                    dev.synchronization_mode = match option.value.as_str() {
                        "full" => SynchronizationMode::Full,
                        "none" => SynchronizationMode::None,
                        _ => {
                            return Err(VmkitError::InvalidOptionValue {
                                kind: "nbd",
                                key: "sync",
                                value: option.value.clone(),
                                expected: "full/none",
                            })
                        }
                    }
                }
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "nbd",
                        key: option.key.clone(),
                    })
                }
            }
        }
        if dev.uri.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "nbd",
                field: "uri",
            });
        }
        Ok(dev)
    }

    fn cmd_line_spec(&self) -> VmkitResult<String> {
        if self.uri.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "nbd",
                field: "uri",
            });
        }
        let mut spec = format!("nbd,uri={}", self.uri);
        if !self.device_identifier.is_empty() {
            spec.push_str(&format!(",deviceId={}", self.device_identifier));
        }
        spec.push_str(&format!(",timeout={}", self.timeout.as_millis()));
        let sync = match self.synchronization_mode {
            SynchronizationMode::Full => "full",
            SynchronizationMode::None => "none",
        };
        spec.push_str(&format!(",sync={sync}"));
        Ok(spec)
    }
}

impl VirtioFs {
    /// Creates a shared directory device.
    pub fn new(shared_dir: impl Into<String>, mount_tag: impl Into<String>) -> Self {
        Self {
            shared_dir: shared_dir.into(),
            mount_tag: mount_tag.into(),
        }
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self::default();
        for option in options {
            match option.key.as_str() {
                "sharedDir" => dev.shared_dir = option.value.clone(),
                "mountTag" => dev.mount_tag = option.value.clone(),
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "virtio-fs",
                        key: option.key.clone(),
                    })
                }
            }
        }
        if dev.shared_dir.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "virtio-fs",
                field: "sharedDir",
            });
        }
        Ok(dev)
    }

    fn cmd_line_spec(&self) -> VmkitResult<String> {
        if self.shared_dir.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "virtio-fs",
                field: "sharedDir",
            });
        }
        let mut spec = format!("virtio-fs,sharedDir={}", self.shared_dir);
        if !self.mount_tag.is_empty() {
            spec.push_str(&format!(",mountTag={}", self.mount_tag));
        }
        Ok(spec)
    }
}

impl RosettaShare {
    /// Creates a Rosetta share mounted under `mount_tag`.
    pub fn new(mount_tag: impl Into<String>) -> Self {
        Self {
            mount_tag: mount_tag.into(),
            install_rosetta: false,
            ignore_if_missing: false,
        }
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self::default();
        for option in options {
            match option.key.as_str() {
                "mountTag" => dev.mount_tag = option.value.clone(),
                "install" => dev.install_rosetta = true,
                "ignore-if-missing" => dev.ignore_if_missing = true,
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "rosetta",
                        key: option.key.clone(),
                    })
                }
            }
        }
        if dev.mount_tag.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "rosetta",
                field: "mountTag",
            });
        }
        Ok(dev)
    }

    fn cmd_line_spec(&self) -> VmkitResult<String> {
        if self.mount_tag.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "rosetta",
                field: "mountTag",
            });
        }
        let mut spec = format!("rosetta,mountTag={}", self.mount_tag);
        if self.install_rosetta {
            spec.push_str(",install");
        }
        if self.ignore_if_missing {
            spec.push_str(",ignore-if-missing");
        }
        Ok(spec)
    }
}

impl VirtioNet {
    /// Creates a NAT network interface, optionally pinning its hardware address.
    pub fn new(mac_address: Option<MacAddress>) -> Self {
        Self {
            nat: true,
            unix_socket_path: String::new(),
            vfkit_magic: false,
            mac_address,
        }
    }

    /// Switches the interface from NAT to a unixgram socket backend.
    ///
    /// Enables the magic handshake, matching what command-line parsing of a socket-backed
    /// interface does.
    pub fn set_unix_socket_path(&mut self, path: impl Into<String>) {
        self.unix_socket_path = path.into();
        self.nat = false;
        self.vfkit_magic = true;
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self {
            nat: false,
            unix_socket_path: String::new(),
            vfkit_magic: false,
            mac_address: None,
        };
        let mut magic: Option<bool> = None;
        let mut backend_type: Option<String> = None;
        let mut backend_path: Option<String> = None;

        for option in options {
            match option.key.as_str() {
                "nat" => {
                    if !option.value.is_empty() {
                        return Err(VmkitError::InvalidOptionValue {
                            kind: "virtio-net",
                            key: "nat",
                            value: option.value.clone(),
                            expected: "no value",
                        });
                    }
                    dev.nat = true;
                }
                "mac" => dev.mac_address = Some(option.value.parse()?),
                "unixSocketPath" => dev.unix_socket_path = option.value.clone(),
                "type" => {
                    if option.value != "unixgram" {
                        return Err(VmkitError::InvalidOptionValue {
                            kind: "virtio-net",
                            key: "type",
                            value: option.value.clone(),
                            expected: "unixgram",
                        });
                    }
                    backend_type = Some(option.value.clone());
                }
                "path" => backend_path = Some(option.value.clone()),
                "vfkitMagic" => {
                    magic = Some(match option.value.as_str() {
                        "on" => true,
                        "off" => false,
                        _ => {
                            return Err(VmkitError::InvalidOptionValue {
                                kind: "virtio-net",
                                key: "vfkitMagic",
                                value: option.value.clone(),
                                expected: "on/off",
                            })
                        }
                    });
                }
                "offloading" => {
                    if option.value != "off" {
                        return Err(VmkitError::InvalidOptionValue {
                            kind: "virtio-net",
                            key: "offloading",
                            value: option.value.clone(),
                            expected: "off",
                        });
                    }
                }
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "virtio-net",
                        key: option.key.clone(),
                    })
                }
            }
        }

        if backend_type.is_some() && backend_path.is_none() {
            return Err(VmkitError::InvalidDeviceOptions {
                kind: "virtio-net",
                reason: "'type' option requires 'path' to be specified".to_string(),
            });
        }
        if backend_path.is_some() && backend_type.is_none() {
            return Err(VmkitError::InvalidDeviceOptions {
                kind: "virtio-net",
                reason: "'path' option requires 'type' to be specified".to_string(),
            });
        }
        if let Some(path) = backend_path {
            if dev.unix_socket_path.is_empty() {
                dev.unix_socket_path = path;
            }
        }
        if dev.nat && !dev.unix_socket_path.is_empty() {
            return Err(VmkitError::InvalidDeviceOptions {
                kind: "virtio-net",
                reason: "'nat' and a unix socket path are mutually exclusive".to_string(),
            });
        }

        // Socket-backed interfaces default the magic handshake on.
        dev.vfkit_magic = magic.unwrap_or(!dev.unix_socket_path.is_empty());

        Ok(dev)
    }

    fn cmd_line_spec(&self) -> VmkitResult<String> {
        let mut spec = if !self.unix_socket_path.is_empty() {
            if self.vfkit_magic {
                format!("virtio-net,unixSocketPath={}", self.unix_socket_path)
            } else {
                format!(
                    "virtio-net,type=unixgram,path={},vfkitMagic=off",
                    self.unix_socket_path
                )
            }
        } else if self.nat {
            "virtio-net,nat".to_string()
        } else {
            return Err(VmkitError::InvalidDeviceOptions {
                kind: "virtio-net",
                reason: "one of 'nat' or a unix socket path is required".to_string(),
            });
        };
        if let Some(mac) = &self.mac_address {
            spec.push_str(&format!(",mac={mac}"));
        }
        Ok(spec)
    }
}

impl VirtioSerial {
    /// Creates a serial console logging to `log_file`.
    pub fn new_file(log_file: impl Into<String>) -> Self {
        Self {
            log_file: log_file.into(),
            ..Self::default()
        }
    }

    /// Creates a serial console attached to the host stdio.
    pub fn new_stdio() -> Self {
        Self {
            uses_stdio: true,
            ..Self::default()
        }
    }

    /// Creates a serial console attached to a pty allocated at start.
    pub fn new_pty() -> Self {
        Self {
            uses_pty: true,
            ..Self::default()
        }
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self::default();
        for option in options {
            match option.key.as_str() {
                "logFilePath" => dev.log_file = option.value.clone(),
                "stdio" => dev.uses_stdio = true,
                "pty" => dev.uses_pty = true,
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "virtio-serial",
                        key: option.key.clone(),
                    })
                }
            }
        }
        dev.check_attachment()?;
        Ok(dev)
    }

    fn check_attachment(&self) -> VmkitResult<()> {
        let attachments = [!self.log_file.is_empty(), self.uses_stdio, self.uses_pty]
            .iter()
            .filter(|set| **set)
            .count();
        if attachments != 1 {
            return Err(VmkitError::InvalidDeviceOptions {
                kind: "virtio-serial",
                reason: "exactly one of 'logFilePath', 'stdio' or 'pty' is required".to_string(),
            });
        }
        Ok(())
    }

    fn cmd_line_spec(&self) -> VmkitResult<String> {
        self.check_attachment()?;
        if !self.log_file.is_empty() {
            Ok(format!("virtio-serial,logFilePath={}", self.log_file))
        } else if self.uses_stdio {
            Ok("virtio-serial,stdio".to_string())
        } else {
            Ok("virtio-serial,pty".to_string())
        }
    }
}

impl VirtioRng {
    /// Creates an entropy source device.
    pub fn new() -> Self {
        Self::default()
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        if let Some(option) = options.first() {
            return Err(VmkitError::UnknownOption {
                kind: "virtio-rng",
                key: option.key.clone(),
            });
        }
        Ok(Self::default())
    }
}

impl VirtioBalloon {
    /// Creates a memory balloon device.
    pub fn new() -> Self {
        Self::default()
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        if let Some(option) = options.first() {
            return Err(VmkitError::UnknownOption {
                kind: "virtio-balloon",
                key: option.key.clone(),
            });
        }
        Ok(Self::default())
    }
}

impl VirtioVsock {
    /// Creates a socket channel device.
    pub fn new(port: u32, socket_url: impl Into<String>, listen: bool) -> Self {
        Self {
            port,
            socket_url: socket_url.into(),
            listen,
        }
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self::default();
        let mut listen_flag = false;
        let mut connect_flag = false;
        for option in options {
            match option.key.as_str() {
                "port" => {
                    dev.port = option.value.parse().map_err(|_| {
                        VmkitError::InvalidOptionValue {
                            kind: "virtio-vsock",
                            key: "port",
                            value: option.value.clone(),
                            expected: "a non-zero integer",
                        }
                    })?;
                }
                "socketURL" => dev.socket_url = option.value.clone(),
                "listen" => listen_flag = true,
                "connect" => connect_flag = true,
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "virtio-vsock",
                        key: option.key.clone(),
                    })
                }
            }
        }
        if listen_flag && connect_flag {
            return Err(VmkitError::InvalidDeviceOptions {
                kind: "virtio-vsock",
                reason: "'listen' and 'connect' are mutually exclusive".to_string(),
            });
        }
        // With neither flag present the channel listens, the historical default.
        dev.listen = listen_flag || !connect_flag;
        if dev.port == 0 {
            return Err(VmkitError::MissingMandatoryField {
                kind: "virtio-vsock",
                field: "port",
            });
        }
        Ok(dev)
    }

    fn cmd_line_spec(&self) -> VmkitResult<String> {
        if self.port == 0 {
            return Err(VmkitError::MissingMandatoryField {
                kind: "virtio-vsock",
                field: "port",
            });
        }
        let mut spec = format!("virtio-vsock,port={}", self.port);
        if !self.socket_url.is_empty() {
            spec.push_str(&format!(",socketURL={}", self.socket_url));
        }
        spec.push_str(if self.listen { ",listen" } else { ",connect" });
        Ok(spec)
    }
}

impl VirtioGpu {
    /// Creates a graphics adapter at the default resolution.
    pub fn new() -> Self {
        Self::default()
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut dev = Self::default();
        for option in options {
            match option.key.as_str() {
                "width" => {
                    dev.width = option.value.parse().map_err(|_| {
                        VmkitError::InvalidOptionValue {
                            kind: "virtio-gpu",
                            key: "width",
                            value: option.value.clone(),
                            expected: "a pixel count",
                        }
                    })?;
                }
                "height" => {
                    dev.height = option.value.parse().map_err(|_| {
                        VmkitError::InvalidOptionValue {
                            kind: "virtio-gpu",
                            key: "height",
                            value: option.value.clone(),
                            expected: "a pixel count",
                        }
                    })?;
                }
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "virtio-gpu",
                        key: option.key.clone(),
                    })
                }
            }
        }
        Ok(dev)
    }

    fn cmd_line_spec(&self) -> String {
        format!("virtio-gpu,width={},height={}", self.width, self.height)
    }
}

impl VirtioInput {
    /// Creates an input device of the given type.
    pub fn new(input_type: InputType) -> Self {
        Self { input_type }
    }

    fn from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut input_type: Option<InputType> = None;
        for option in options {
            let parsed = match option.key.as_str() {
                "pointing" => InputType::Pointing,
                "keyboard" => InputType::Keyboard,
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "virtio-input",
                        key: option.key.clone(),
                    })
                }
            };
            if input_type.is_some() {
                return Err(VmkitError::InvalidDeviceOptions {
                    kind: "virtio-input",
                    reason: "'pointing' and 'keyboard' are mutually exclusive".to_string(),
                });
            }
            input_type = Some(parsed);
        }
        let input_type = input_type.ok_or(VmkitError::MissingMandatoryField {
            kind: "virtio-input",
            field: "pointing/keyboard",
        })?;
        Ok(Self { input_type })
    }

    fn cmd_line_spec(&self) -> String {
        match self.input_type {
            InputType::Pointing => "virtio-input,pointing".to_string(),
            InputType::Keyboard => "virtio-input,keyboard".to_string(),
        }
    }
}

impl DiskBackend {
    fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn parse_disk_backend(value: &str) -> VmkitResult<DiskBackend> {
    match value {
        "image" => Ok(DiskBackend::Image),
        "dev" => Ok(DiskBackend::BlockDevice),
        _ => Err(VmkitError::UnknownStorageBackend(value.to_string())),
    }
}

fn disk_backend_token(backend: DiskBackend) -> Option<&'static str> {
    match backend {
        DiskBackend::Default => None,
        DiskBackend::Image => Some("image"),
        DiskBackend::BlockDevice => Some("dev"),
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_nbd_timeout() -> Duration {
    DEFAULT_NBD_TIMEOUT
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<'de> Deserialize<'de> for VirtioNet {
    // Socket-backed interfaces missing the `vfkitMagic` field default it on; NAT interfaces
    // default it off. A plain field default cannot express that.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            nat: bool,
            #[serde(rename = "unixSocketPath", default)]
            unix_socket_path: String,
            #[serde(rename = "vfkitMagic", default)]
            vfkit_magic: Option<bool>,
            #[serde(rename = "macAddress", default)]
            mac_address: Option<MacAddress>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let vfkit_magic = raw
            .vfkit_magic
            .unwrap_or(!raw.unix_socket_path.is_empty());
        Result::Ok(Self {
            nat: raw.nat,
            unix_socket_path: raw.unix_socket_path,
            vfkit_magic,
            mac_address: raw.mac_address,
        })
    }
}

impl Default for VirtioGpu {
    fn default() -> Self {
        Self {
            uses_gui: false,
            width: DEFAULT_GPU_RESOLUTION.0,
            height: DEFAULT_GPU_RESOLUTION.1,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct RoundTrip {
        device: VirtioDevice,
        cmd_line: &'static str,
        alternate_cmd_line: Option<&'static str>,
    }

    fn check_round_trip(test: RoundTrip) {
        let rendered = test.device.to_cmd_line().unwrap();
        assert_eq!(rendered, vec!["--device".to_string(), test.cmd_line.to_string()]);

        let reparsed = VirtioDevice::from_cmd_line(&rendered[1]).unwrap();
        assert_eq!(reparsed, test.device);

        if let Some(alternate) = test.alternate_cmd_line {
            let from_alternate = VirtioDevice::from_cmd_line(alternate).unwrap();
            assert_eq!(from_alternate, test.device);
            assert_eq!(from_alternate.to_cmd_line().unwrap(), rendered);
        }
    }

    #[test]
    fn test_virtio_blk_round_trips() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::Blk(VirtioBlk::new("/tmp/disk.img")),
            cmd_line: "virtio-blk,path=/tmp/disk.img",
            alternate_cmd_line: None,
        });

        let mut with_id = VirtioBlk::new("/tmp/disk.img");
        with_id.device_identifier = "test".to_string();
        check_round_trip(RoundTrip {
            device: VirtioDevice::Blk(with_id),
            cmd_line: "virtio-blk,path=/tmp/disk.img,deviceId=test",
            alternate_cmd_line: Some("virtio-blk,deviceId=test,path=/tmp/disk.img"),
        });

        let mut with_backend = VirtioBlk::new("/tmp/disk.img");
        with_backend.backend = DiskBackend::BlockDevice;
        check_round_trip(RoundTrip {
            device: VirtioDevice::Blk(with_backend),
            cmd_line: "virtio-blk,path=/tmp/disk.img,type=dev",
            alternate_cmd_line: Some("virtio-blk,type=dev,path=/tmp/disk.img"),
        });
    }

    #[test]
    fn test_nvme_round_trips() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::Nvme(NvmExpressController::new("/foo/bar")),
            cmd_line: "nvme,path=/foo/bar",
            alternate_cmd_line: None,
        });

        let mut with_backend = NvmExpressController::new("/foo/bar");
        with_backend.backend = DiskBackend::Image;
        check_round_trip(RoundTrip {
            device: VirtioDevice::Nvme(with_backend),
            cmd_line: "nvme,path=/foo/bar,type=image",
            alternate_cmd_line: Some("nvme,type=image,path=/foo/bar"),
        });
    }

    #[test]
    fn test_usb_mass_storage_round_trips() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::UsbMassStorage(UsbMassStorage::new("/foo/bar")),
            cmd_line: "usb-mass-storage,path=/foo/bar",
            alternate_cmd_line: None,
        });

        let mut read_only = UsbMassStorage::new("/foo/bar");
        read_only.read_only = true;
        check_round_trip(RoundTrip {
            device: VirtioDevice::UsbMassStorage(read_only),
            cmd_line: "usb-mass-storage,path=/foo/bar,readonly",
            alternate_cmd_line: Some("usb-mass-storage,readonly,path=/foo/bar"),
        });
    }

    #[test]
    fn test_nbd_round_trips() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::Nbd(NetworkBlockDevice::new(
                "nbd://1.1.1.1:10000",
                Duration::from_millis(1000),
                SynchronizationMode::None,
            )),
            cmd_line: "nbd,uri=nbd://1.1.1.1:10000,timeout=1000,sync=none",
            alternate_cmd_line: Some("nbd,sync=none,timeout=1000,uri=nbd://1.1.1.1:10000"),
        });
    }

    #[test]
    fn test_nbd_defaults_and_errors() {
        let device = VirtioDevice::from_cmd_line("nbd,uri=nbd://host:10000").unwrap();
        let VirtioDevice::Nbd(nbd) = device else {
            panic!("expected an nbd device");
        };
        assert_eq!(nbd.timeout, DEFAULT_NBD_TIMEOUT);
        assert_eq!(nbd.synchronization_mode, SynchronizationMode::Full);

        assert!(matches!(
            VirtioDevice::from_cmd_line("nbd,uri=nbd://host:10000,sync=later"),
            Err(VmkitError::InvalidOptionValue { kind: "nbd", key: "sync", .. })
        ));
        assert!(matches!(
            VirtioDevice::from_cmd_line("nbd,timeout=1000"),
            Err(VmkitError::MissingMandatoryField { kind: "nbd", field: "uri" })
        ));
    }

    #[test]
    fn test_virtio_fs_round_trips() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::Fs(VirtioFs::new("/foo/bar", "")),
            cmd_line: "virtio-fs,sharedDir=/foo/bar",
            alternate_cmd_line: None,
        });
        check_round_trip(RoundTrip {
            device: VirtioDevice::Fs(VirtioFs::new("/foo/bar", "myTag")),
            cmd_line: "virtio-fs,sharedDir=/foo/bar,mountTag=myTag",
            alternate_cmd_line: Some("virtio-fs,mountTag=myTag,sharedDir=/foo/bar"),
        });
    }

    #[test]
    fn test_rosetta_round_trips() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::Rosetta(RosettaShare::new("myTag")),
            cmd_line: "rosetta,mountTag=myTag",
            alternate_cmd_line: None,
        });

        let mut full = RosettaShare::new("myTag");
        full.install_rosetta = true;
        full.ignore_if_missing = true;
        check_round_trip(RoundTrip {
            device: VirtioDevice::Rosetta(full),
            cmd_line: "rosetta,mountTag=myTag,install,ignore-if-missing",
            alternate_cmd_line: Some("rosetta,ignore-if-missing,install,mountTag=myTag"),
        });
    }

    #[test]
    fn test_virtio_vsock_round_trips() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::Vsock(VirtioVsock::new(1234, "/foo/bar.unix", false)),
            cmd_line: "virtio-vsock,port=1234,socketURL=/foo/bar.unix,connect",
            alternate_cmd_line: Some("virtio-vsock,socketURL=/foo/bar.unix,connect,port=1234"),
        });
        check_round_trip(RoundTrip {
            device: VirtioDevice::Vsock(VirtioVsock::new(1234, "/foo/bar.unix", true)),
            cmd_line: "virtio-vsock,port=1234,socketURL=/foo/bar.unix,listen",
            alternate_cmd_line: Some("virtio-vsock,socketURL=/foo/bar.unix,listen,port=1234"),
        });
    }

    #[test]
    fn test_virtio_vsock_defaults_to_listen() {
        let device = VirtioDevice::from_cmd_line("virtio-vsock,port=1025,socketURL=/run/chan.sock")
            .unwrap();
        assert_eq!(
            device,
            VirtioDevice::Vsock(VirtioVsock::new(1025, "/run/chan.sock", true))
        );

        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-vsock,socketURL=/run/chan.sock"),
            Err(VmkitError::MissingMandatoryField { kind: "virtio-vsock", field: "port" })
        ));
        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-vsock,port=1,listen,connect"),
            Err(VmkitError::InvalidDeviceOptions { kind: "virtio-vsock", .. })
        ));
    }

    #[test]
    fn test_virtio_serial_round_trips() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::Serial(VirtioSerial::new_file("/foo/bar.log")),
            cmd_line: "virtio-serial,logFilePath=/foo/bar.log",
            alternate_cmd_line: None,
        });
        check_round_trip(RoundTrip {
            device: VirtioDevice::Serial(VirtioSerial::new_stdio()),
            cmd_line: "virtio-serial,stdio",
            alternate_cmd_line: None,
        });
        check_round_trip(RoundTrip {
            device: VirtioDevice::Serial(VirtioSerial::new_pty()),
            cmd_line: "virtio-serial,pty",
            alternate_cmd_line: None,
        });

        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-serial,stdio,pty"),
            Err(VmkitError::InvalidDeviceOptions { kind: "virtio-serial", .. })
        ));
        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-serial"),
            Err(VmkitError::InvalidDeviceOptions { kind: "virtio-serial", .. })
        ));
    }

    #[test]
    fn test_virtio_net_round_trips() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::Net(VirtioNet::new(None)),
            cmd_line: "virtio-net,nat",
            alternate_cmd_line: None,
        });
        check_round_trip(RoundTrip {
            device: VirtioDevice::Net(VirtioNet::new(Some(
                "00:11:22:33:44:55".parse().unwrap(),
            ))),
            cmd_line: "virtio-net,nat,mac=00:11:22:33:44:55",
            alternate_cmd_line: Some("virtio-net,mac=00:11:22:33:44:55,nat"),
        });

        let mut socket_backed = VirtioNet::new(None);
        socket_backed.set_unix_socket_path("/tmp/unix.sock");
        check_round_trip(RoundTrip {
            device: VirtioDevice::Net(socket_backed),
            cmd_line: "virtio-net,unixSocketPath=/tmp/unix.sock",
            alternate_cmd_line: Some("virtio-net,type=unixgram,path=/tmp/unix.sock"),
        });
    }

    #[test]
    fn test_virtio_net_magic_defaults() {
        // Command-line parsing of any socket-backed form defaults the handshake on.
        for spec in [
            "virtio-net,type=unixgram,path=/tmp/default.sock",
            "virtio-net,unixSocketPath=/tmp/default.sock",
        ] {
            let VirtioDevice::Net(dev) = VirtioDevice::from_cmd_line(spec).unwrap() else {
                panic!("expected a virtio-net device");
            };
            assert!(dev.vfkit_magic, "{spec}");
        }

        // Direct construction defaults it off.
        let built = VirtioNet {
            nat: false,
            unix_socket_path: "/tmp/test.sock".to_string(),
            vfkit_magic: false,
            mac_address: None,
        };
        assert_eq!(
            built.cmd_line_spec().unwrap(),
            "virtio-net,type=unixgram,path=/tmp/test.sock,vfkitMagic=off"
        );

        let VirtioDevice::Net(magic_off) =
            VirtioDevice::from_cmd_line("virtio-net,unixSocketPath=/tmp/socket.sock,vfkitMagic=off")
                .unwrap()
        else {
            panic!("expected a virtio-net device");
        };
        assert!(!magic_off.vfkit_magic);
        assert_eq!(
            magic_off.cmd_line_spec().unwrap(),
            "virtio-net,type=unixgram,path=/tmp/socket.sock,vfkitMagic=off"
        );
    }

    #[test]
    fn test_virtio_net_option_errors() {
        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-net,unixSocketPath=/tmp/test.sock,vfkitMagic=foo"),
            Err(VmkitError::InvalidOptionValue { kind: "virtio-net", key: "vfkitMagic", .. })
        ));
        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-net,type=foo"),
            Err(VmkitError::InvalidOptionValue { kind: "virtio-net", key: "type", .. })
        ));
        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-net,type=unixgram"),
            Err(VmkitError::InvalidDeviceOptions { kind: "virtio-net", .. })
        ));
        assert!(matches!(
            VirtioDevice::from_cmd_line(
                "virtio-net,type=unixgram,path=/tmp/test.sock,offloading=on"
            ),
            Err(VmkitError::InvalidOptionValue { kind: "virtio-net", key: "offloading", .. })
        ));

        // offloading=off is accepted and discarded.
        let device =
            VirtioDevice::from_cmd_line("virtio-net,type=unixgram,path=/tmp/test.sock,offloading=off")
                .unwrap();
        assert_eq!(
            device.to_cmd_line().unwrap()[1],
            "virtio-net,unixSocketPath=/tmp/test.sock"
        );
    }

    #[test]
    fn test_simple_devices_round_trip() {
        check_round_trip(RoundTrip {
            device: VirtioDevice::Rng(VirtioRng::new()),
            cmd_line: "virtio-rng",
            alternate_cmd_line: None,
        });
        check_round_trip(RoundTrip {
            device: VirtioDevice::Balloon(VirtioBalloon::new()),
            cmd_line: "virtio-balloon",
            alternate_cmd_line: None,
        });
        check_round_trip(RoundTrip {
            device: VirtioDevice::Input(VirtioInput::new(InputType::Pointing)),
            cmd_line: "virtio-input,pointing",
            alternate_cmd_line: None,
        });
        check_round_trip(RoundTrip {
            device: VirtioDevice::Input(VirtioInput::new(InputType::Keyboard)),
            cmd_line: "virtio-input,keyboard",
            alternate_cmd_line: None,
        });
        check_round_trip(RoundTrip {
            device: VirtioDevice::Gpu(VirtioGpu::new()),
            cmd_line: "virtio-gpu,width=800,height=600",
            alternate_cmd_line: None,
        });

        let mut gpu = VirtioGpu::new();
        gpu.width = 1920;
        gpu.height = 1080;
        check_round_trip(RoundTrip {
            device: VirtioDevice::Gpu(gpu),
            cmd_line: "virtio-gpu,width=1920,height=1080",
            alternate_cmd_line: Some("virtio-gpu,height=1080,width=1920"),
        });
    }

    #[test]
    fn test_unknown_device_and_options() {
        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-9p,path=/foo"),
            Err(VmkitError::UnknownDeviceKind(kind)) if kind == "virtio-9p"
        ));
        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-rng,path=/foo"),
            Err(VmkitError::UnknownOption { kind: "virtio-rng", .. })
        ));
        assert!(matches!(
            VirtioDevice::from_cmd_line("virtio-blk,path=/foo,type=cloud"),
            Err(VmkitError::UnknownStorageBackend(value)) if value == "cloud"
        ));
    }

    #[test]
    fn test_device_json_goldens() {
        let mut blk = VirtioBlk::new("/virtioblk2");
        blk.device_identifier = "virtio-blk2".to_string();
        assert_eq!(
            serde_json::to_value(VirtioDevice::Blk(blk)).unwrap(),
            json!({
                "kind": "virtioblk",
                "devName": "virtio-blk",
                "imagePath": "/virtioblk2",
                "deviceIdentifier": "virtio-blk2"
            })
        );

        let mut usb = UsbMassStorage::new("/usbmassstorage");
        usb.read_only = true;
        assert_eq!(
            serde_json::to_value(VirtioDevice::UsbMassStorage(usb)).unwrap(),
            json!({
                "kind": "usbmassstorage",
                "devName": "usb-mass-storage",
                "imagePath": "/usbmassstorage",
                "readOnly": true
            })
        );

        let nbd = NetworkBlockDevice::new("uri", Duration::from_millis(1), SynchronizationMode::Full);
        assert_eq!(
            serde_json::to_value(VirtioDevice::Nbd(nbd)).unwrap(),
            json!({
                "kind": "nbd",
                "devName": "nbd",
                "uri": "uri",
                "DeviceIdentifier": "",
                "SynchronizationMode": "full",
                "Timeout": 1_000_000
            })
        );

        assert_eq!(
            serde_json::to_value(VirtioDevice::Fs(VirtioFs::new("/virtiofs", "tag"))).unwrap(),
            json!({"kind": "virtiofs", "mountTag": "tag", "sharedDir": "/virtiofs"})
        );

        assert_eq!(
            serde_json::to_value(VirtioDevice::Rosetta(RosettaShare::new("vz-rosetta"))).unwrap(),
            json!({
                "kind": "rosetta",
                "mountTag": "vz-rosetta",
                "installRosetta": false,
                "ignoreIfMissing": false
            })
        );

        assert_eq!(
            serde_json::to_value(VirtioDevice::Net(VirtioNet::new(Some(
                "00:11:22:33:44:55".parse().unwrap()
            ))))
            .unwrap(),
            json!({"kind": "virtionet", "nat": true, "macAddress": "00:11:22:33:44:55"})
        );

        assert_eq!(
            serde_json::to_value(VirtioDevice::Serial(VirtioSerial::new_file("/virtioserial")))
                .unwrap(),
            json!({"kind": "virtioserial", "logFile": "/virtioserial"})
        );

        assert_eq!(
            serde_json::to_value(VirtioDevice::Rng(VirtioRng::new())).unwrap(),
            json!({"kind": "virtiorng"})
        );
        assert_eq!(
            serde_json::to_value(VirtioDevice::Balloon(VirtioBalloon::new())).unwrap(),
            json!({"kind": "virtioballoon"})
        );

        assert_eq!(
            serde_json::to_value(VirtioDevice::Vsock(VirtioVsock::new(1234, "/virtiovsock", false)))
                .unwrap(),
            json!({"kind": "virtiosock", "port": 1234, "socketURL": "/virtiovsock"})
        );
        assert_eq!(
            serde_json::to_value(VirtioDevice::Vsock(VirtioVsock::new(1234, "/virtiovsock", true)))
                .unwrap(),
            json!({"kind": "virtiosock", "port": 1234, "socketURL": "/virtiovsock", "listen": true})
        );

        assert_eq!(
            serde_json::to_value(VirtioDevice::Gpu(VirtioGpu::new())).unwrap(),
            json!({"kind": "virtiogpu", "usesGUI": false, "width": 800, "height": 600})
        );

        assert_eq!(
            serde_json::to_value(VirtioDevice::Input(VirtioInput::new(InputType::Keyboard)))
                .unwrap(),
            json!({"kind": "virtioinput", "inputType": "keyboard"})
        );
    }

    #[test]
    fn test_device_json_decoding() {
        let device: VirtioDevice = serde_json::from_value(json!({
            "kind": "virtioblk",
            "devName": "virtio-blk",
            "imagePath": "/virtioblk1"
        }))
        .unwrap();
        assert_eq!(device, VirtioDevice::Blk(VirtioBlk::new("/virtioblk1")));

        // Unknown and missing kinds are rejected; unknown extra fields are ignored.
        assert!(serde_json::from_value::<VirtioDevice>(
            json!({"kind": "invalid", "imagePath": "/x"})
        )
        .is_err());
        assert!(serde_json::from_value::<VirtioDevice>(json!({"kind": "", "imagePath": "/x"}))
            .is_err());
        assert!(serde_json::from_value::<VirtioDevice>(json!({"imagePath": "/x"})).is_err());
        assert!(serde_json::from_value::<VirtioDevice>(
            json!({"kind": "virtiorng", "futureField": 1})
        )
        .is_ok());
    }

    #[test]
    fn test_nbd_json_decode_defaults_timeout() {
        // Older documents omit `Timeout`; decoding falls back to the standard timeout.
        let device: VirtioDevice = serde_json::from_value(json!({
            "kind": "nbd",
            "uri": "nbd://host:10000",
            "DeviceIdentifier": "",
            "SynchronizationMode": "full"
        }))
        .unwrap();
        let VirtioDevice::Nbd(nbd) = device else {
            panic!("expected an nbd device");
        };
        assert_eq!(nbd.timeout, DEFAULT_NBD_TIMEOUT);
        assert_eq!(nbd.synchronization_mode, SynchronizationMode::Full);
    }

    #[test]
    fn test_virtio_net_magic_json_default() {
        // A socket-backed interface without the field defaults the handshake on.
        let device: VirtioDevice = serde_json::from_value(json!({
            "kind": "virtionet",
            "nat": false,
            "unixSocketPath": "/some/path/to/socket",
            "macAddress": "00:11:22:33:44:55"
        }))
        .unwrap();
        let VirtioDevice::Net(dev) = device else {
            panic!("expected a virtio-net device");
        };
        assert!(dev.vfkit_magic);

        let device: VirtioDevice = serde_json::from_value(json!({
            "kind": "virtionet",
            "nat": false,
            "unixSocketPath": "/some/path/to/socket",
            "vfkitMagic": false
        }))
        .unwrap();
        let VirtioDevice::Net(dev) = device else {
            panic!("expected a virtio-net device");
        };
        assert!(!dev.vfkit_magic);

        // NAT interfaces without the field keep it off.
        let device: VirtioDevice =
            serde_json::from_value(json!({"kind": "virtionet", "nat": true})).unwrap();
        assert_eq!(device, VirtioDevice::Net(VirtioNet::new(None)));
    }
}
