use serde::{Deserialize, Serialize};

use crate::{VmkitError, VmkitResult};

use super::options::{parse_options, DeviceOption};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How the virtual machine is booted.
///
/// Setting a bootloader on the [`VirtualMachine`](super::VirtualMachine) is mandatory; the
/// machine cannot start without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Bootloader {
    /// Boots a specific kernel/initrd with a kernel command line.
    #[serde(rename = "linuxBootloader")]
    Linux(LinuxBootloader),

    /// Boots through EFI with a persistent variable store.
    #[serde(rename = "efiBootloader")]
    Efi(EfiBootloader),
}

/// Kernel/initrd/command-line boot configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinuxBootloader {
    /// Path to the uncompressed kernel image.
    #[serde(rename = "vmlinuzPath", default)]
    pub vmlinuz_path: String,

    /// Kernel command line.
    #[serde(rename = "kernelCmdLine", default)]
    pub kernel_cmd_line: String,

    /// Path to the initrd image.
    #[serde(rename = "initrdPath", default)]
    pub initrd_path: String,
}

/// EFI boot configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EfiBootloader {
    /// Path to the EFI variable store.
    #[serde(rename = "efiVariableStorePath", default)]
    pub efi_variable_store_path: String,

    /// Whether to create the variable store if it does not exist yet.
    #[serde(rename = "createVariableStore", default)]
    pub create_variable_store: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Bootloader {
    /// Creates a Linux bootloader configuration.
    pub fn new_linux(
        vmlinuz_path: impl Into<String>,
        kernel_cmd_line: impl Into<String>,
        initrd_path: impl Into<String>,
    ) -> Self {
        Self::Linux(LinuxBootloader {
            vmlinuz_path: vmlinuz_path.into(),
            kernel_cmd_line: kernel_cmd_line.into(),
            initrd_path: initrd_path.into(),
        })
    }

    /// Creates an EFI bootloader configuration.
    pub fn new_efi(efi_variable_store_path: impl Into<String>, create_variable_store: bool) -> Self {
        Self::Efi(EfiBootloader {
            efi_variable_store_path: efi_variable_store_path.into(),
            create_variable_store,
        })
    }

    /// Parses a `--bootloader` command-line argument.
    ///
    /// The leading token selects the bootloader kind (`efi` or `linux`); the remaining tokens
    /// are `key=value` options specific to that kind.
    pub fn from_cmd_line(spec: &str) -> VmkitResult<Self> {
        let tokens: Vec<&str> = spec.split(',').collect();
        let (kind, rest) = tokens
            .split_first()
            .ok_or_else(|| VmkitError::UnknownDeviceKind(String::new()))?;
        let options = parse_options(rest);

        match *kind {
            "efi" => Self::efi_from_options(&options),
            "linux" => Self::linux_from_options(&options),
            other => Err(VmkitError::UnknownDeviceKind(other.to_string())),
        }
    }

    /// Renders this bootloader back to command-line arguments.
    pub fn to_cmd_line(&self) -> VmkitResult<Vec<String>> {
        match self {
            Self::Linux(linux) => {
                if linux.vmlinuz_path.is_empty() {
                    return Err(VmkitError::MissingMandatoryField {
                        kind: "linux bootloader",
                        field: "kernel",
                    });
                }
                let mut args = vec!["--kernel".to_string(), linux.vmlinuz_path.clone()];
                if !linux.kernel_cmd_line.is_empty() {
                    args.push("--kernel-cmdline".to_string());
                    args.push(linux.kernel_cmd_line.clone());
                }
                if !linux.initrd_path.is_empty() {
                    args.push("--initrd".to_string());
                    args.push(linux.initrd_path.clone());
                }
                Ok(args)
            }
            Self::Efi(efi) => {
                if efi.efi_variable_store_path.is_empty() {
                    return Err(VmkitError::MissingMandatoryField {
                        kind: "efi bootloader",
                        field: "variable-store",
                    });
                }
                let mut spec = format!("efi,variable-store={}", efi.efi_variable_store_path);
                if efi.create_variable_store {
                    spec.push_str(",create");
                }
                Ok(vec!["--bootloader".to_string(), spec])
            }
        }
    }

    fn efi_from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut efi = EfiBootloader::default();
        for option in options {
            match option.key.as_str() {
                "variable-store" => efi.efi_variable_store_path = option.value.clone(),
                "create" => efi.create_variable_store = true,
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "efi bootloader",
                        key: option.key.clone(),
                    })
                }
            }
        }
        if efi.efi_variable_store_path.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "efi bootloader",
                field: "variable-store",
            });
        }
        Ok(Self::Efi(efi))
    }

    fn linux_from_options(options: &[DeviceOption]) -> VmkitResult<Self> {
        let mut linux = LinuxBootloader::default();
        for option in options {
            match option.key.as_str() {
                "kernel" => linux.vmlinuz_path = option.value.clone(),
                "initrd" => linux.initrd_path = option.value.clone(),
                "cmdline" => linux.kernel_cmd_line = option.value.clone(),
                _ => {
                    return Err(VmkitError::UnknownOption {
                        kind: "linux bootloader",
                        key: option.key.clone(),
                    })
                }
            }
        }
        if linux.vmlinuz_path.is_empty() {
            return Err(VmkitError::MissingMandatoryField {
                kind: "linux bootloader",
                field: "kernel",
            });
        }
        Ok(Self::Linux(linux))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
