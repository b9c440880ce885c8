//! User request and region selection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::device::{DeviceDescriptor, MemoryKind};
use crate::error::ProgError;
use crate::protocol::constants::{
    DEFAULT_CONFIG_FILENAME, DEFAULT_DATA_FILENAME, MP_ICSP_ENABLE, MP_ICSP_VCC,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

/// Region selected on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MemoryRegion {
    /// No `-c` given: read cascades through every region, write targets Code.
    #[default]
    Unspecified,
    Code,
    Data,
    Config,
}

impl MemoryRegion {
    pub fn memory_kind(&self) -> Option<MemoryKind> {
        match self {
            MemoryRegion::Unspecified | MemoryRegion::Code => Some(MemoryKind::Code),
            MemoryRegion::Data => Some(MemoryKind::Data),
            MemoryRegion::Config => None,
        }
    }
}

impl FromStr for MemoryRegion {
    type Err = ProgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(MemoryRegion::Code),
            "data" => Ok(MemoryRegion::Data),
            "config" => Ok(MemoryRegion::Config),
            _ => Err(ProgError::usage(format!("Unknown memory type `{s}`"))),
        }
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryRegion::Unspecified => write!(f, "unspecified"),
            MemoryRegion::Code => write!(f, "code"),
            MemoryRegion::Data => write!(f, "data"),
            MemoryRegion::Config => write!(f, "config"),
        }
    }
}

/// How a file/region size mismatch is handled on write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizeCheck {
    /// Abort before touching the device.
    Strict,
    /// Warn and continue.
    #[default]
    Warn,
    /// Continue silently.
    Silent,
}

/// Programming voltage mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgrammingMode {
    #[default]
    Standard,
    /// In-circuit, target powered externally.
    Icsp,
    /// In-circuit, programmer supplies Vcc.
    IcspWithVcc,
}

impl ProgrammingMode {
    /// Value of the ICSP byte in command headers.
    pub fn icsp_byte(&self) -> u8 {
        match self {
            ProgrammingMode::Standard => 0,
            ProgrammingMode::Icsp => MP_ICSP_ENABLE,
            ProgrammingMode::IcspWithVcc => MP_ICSP_ENABLE | MP_ICSP_VCC,
        }
    }
}

/// One run's worth of user intent. Built once, then only borrowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: Action,
    pub path: PathBuf,
    pub region: MemoryRegion,
    pub skip_erase: bool,
    pub skip_protect_off: bool,
    pub skip_protect_on: bool,
    pub size_check: SizeCheck,
    pub mode: ProgrammingMode,
    /// Directory for the cascade's fixed output names.
    pub default_dir: PathBuf,
}

impl ActionRequest {
    pub fn new(action: Action, path: impl Into<PathBuf>) -> Self {
        Self {
            action,
            path: path.into(),
            region: MemoryRegion::Unspecified,
            skip_erase: false,
            skip_protect_off: false,
            skip_protect_on: false,
            size_check: SizeCheck::Warn,
            mode: ProgrammingMode::Standard,
            default_dir: PathBuf::new(),
        }
    }

    pub fn read(path: impl Into<PathBuf>) -> Self {
        Self::new(Action::Read, path)
    }

    pub fn write(path: impl Into<PathBuf>) -> Self {
        Self::new(Action::Write, path)
    }

    pub fn with_region(mut self, region: MemoryRegion) -> Self {
        self.region = region;
        self
    }

    pub fn with_size_check(mut self, size_check: SizeCheck) -> Self {
        self.size_check = size_check;
        self
    }

    pub fn with_mode(mut self, mode: ProgrammingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_default_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_dir = dir.into();
        self
    }

    pub fn skipping(mut self, erase: bool, protect_off: bool, protect_on: bool) -> Self {
        self.skip_erase = erase;
        self.skip_protect_off = protect_off;
        self.skip_protect_on = protect_on;
        self
    }
}

/// One entry of the read cascade.
#[derive(Clone, Copy)]
pub struct CascadeStep {
    pub region: MemoryRegion,
    /// Output name used when the step is reached by cascading.
    pub default_name: Option<&'static str>,
    /// Whether the device has this region at all.
    pub applies: fn(&DeviceDescriptor) -> bool,
}

impl fmt::Debug for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CascadeStep")
            .field("region", &self.region)
            .field("default_name", &self.default_name)
            .finish()
    }
}

/// Regions read, in order, when none was selected.
pub const READ_CASCADE: [CascadeStep; 3] = [
    CascadeStep {
        region: MemoryRegion::Code,
        default_name: None,
        applies: |_| true,
    },
    CascadeStep {
        region: MemoryRegion::Data,
        default_name: Some(DEFAULT_DATA_FILENAME),
        applies: DeviceDescriptor::has_data_memory,
    },
    CascadeStep {
        region: MemoryRegion::Config,
        default_name: Some(DEFAULT_CONFIG_FILENAME),
        applies: DeviceDescriptor::has_fuses,
    },
];

/// A region and the file it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRead {
    pub region: MemoryRegion,
    pub path: PathBuf,
}

/// Which part of the cascade a read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionPlan {
    pub start: MemoryRegion,
    /// `false`: only `start`. `true`: `start` and every later cascade entry.
    pub follow_cascade: bool,
}

impl RegionPlan {
    pub fn for_selection(region: MemoryRegion) -> Self {
        match region {
            MemoryRegion::Unspecified => Self {
                start: MemoryRegion::Code,
                follow_cascade: true,
            },
            explicit => Self {
                start: explicit,
                follow_cascade: false,
            },
        }
    }

    /// Resolve the plan against a device.
    ///
    /// The first step writes to `user_path`; steps reached by cascading use
    /// their fixed names under `default_dir`. Steps the device lacks are
    /// dropped.
    pub fn resolve(
        &self,
        device: &DeviceDescriptor,
        user_path: &Path,
        default_dir: &Path,
    ) -> Vec<PlannedRead> {
        let first = READ_CASCADE
            .iter()
            .position(|step| step.region == self.start)
            .unwrap_or(0);
        let count = if self.follow_cascade { READ_CASCADE.len() - first } else { 1 };

        READ_CASCADE[first..first + count]
            .iter()
            .enumerate()
            .filter(|(_, step)| (step.applies)(device))
            .map(|(i, step)| {
                let path = match step.default_name {
                    Some(name) if i > 0 => default_dir.join(name),
                    _ => user_path.to_path_buf(),
                };
                PlannedRead {
                    region: step.region,
                    path,
                }
            })
            .collect()
    }
}
