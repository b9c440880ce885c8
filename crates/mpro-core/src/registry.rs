//! Device registry.
//!
//! Name-keyed, immutable after construction. Every entry is validated on the
//! way in, so a descriptor handed out by [`DeviceRegistry::lookup`] always has
//! a usable geometry and a sorted fuse table.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use crate::device::{Capabilities, DeviceDescriptor, FuseDecl};
use crate::error::{ProgError, Result};

/// Protocol id of AVR parts.
pub const PROTOCOL_AVR: u32 = 0x71;
/// Protocol ids of PIC parts with a single configuration word.
pub const PROTOCOL_PIC: u32 = 0x63;
pub const PROTOCOL_PIC_ALT: u32 = 0x65;
/// PIC parts with two configuration words; sent on the wire as [`PROTOCOL_PIC`].
pub const PROTOCOL_PIC2: u32 = 0x10063;

fn avr_fuses() -> Vec<FuseDecl> {
    vec![
        FuseDecl::new("fuses", 0x10, 0, 1),
        FuseDecl::new("lock_byte", 0x41, 0, 1),
    ]
}

fn pic_fuses() -> Vec<FuseDecl> {
    vec![
        FuseDecl::new("user_id0", 0x10, 0, 2),
        FuseDecl::new("user_id1", 0x10, 2, 2),
        FuseDecl::new("user_id2", 0x10, 4, 2),
        FuseDecl::new("user_id3", 0x10, 6, 2),
        FuseDecl::new("conf_word", 0x14, 0, 2),
    ]
}

fn pic2_fuses() -> Vec<FuseDecl> {
    let mut fuses = pic_fuses();
    fuses.push(FuseDecl::new("conf_word1", 0x14, 2, 2));
    fuses
}

/// Built-in fuse table for a protocol, and the protocol id to use on the wire.
pub fn fuses_for_protocol(protocol_id: u32) -> Option<(Vec<FuseDecl>, u32)> {
    match protocol_id {
        PROTOCOL_AVR => Some((avr_fuses(), protocol_id)),
        PROTOCOL_PIC | PROTOCOL_PIC_ALT => Some((pic_fuses(), protocol_id)),
        PROTOCOL_PIC2 => Some((pic2_fuses(), PROTOCOL_PIC)),
        _ => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn entry(
    name: &str,
    protocol_id: u32,
    chip_id: Option<(u32, u8)>,
    code_memory_size: usize,
    data_memory_size: usize,
    read_buffer_size: usize,
    write_buffer_size: usize,
    capabilities: Capabilities,
) -> DeviceDescriptor {
    DeviceDescriptor {
        name: name.to_string(),
        protocol_id,
        variant: 0,
        chip_id: chip_id.map(|(id, _)| id),
        chip_id_bytes: chip_id.map_or(0, |(_, bytes)| bytes),
        code_memory_size,
        data_memory_size,
        read_buffer_size,
        write_buffer_size,
        capabilities,
        fuses: Vec::new(),
    }
}

fn builtin_entries() -> Vec<DeviceDescriptor> {
    let words = Capabilities {
        word_addressed: true,
        write_protect: false,
    };
    let protected = Capabilities {
        word_addressed: false,
        write_protect: true,
    };
    vec![
        entry("ATMEGA8", PROTOCOL_AVR, Some((0x1E9307, 3)), 0x2000, 0x200, 64, 64, words),
        entry("ATTINY13A", PROTOCOL_AVR, Some((0x1E9007, 3)), 0x400, 0x40, 64, 32, words),
        entry("PIC16F84A", PROTOCOL_PIC, Some((0x0560, 2)), 0x800, 0x40, 64, 32, words),
        entry("PIC16F628A", PROTOCOL_PIC2, Some((0x1060, 2)), 0x1000, 0x80, 64, 32, words),
        entry("AT28C256", 0x41, None, 0x8000, 0, 128, 64, protected),
        entry("AT24C02", 0x21, None, 0x100, 0, 64, 16, Capabilities::default()),
        entry("W25Q80", 0x03, Some((0xEF4014, 3)), 0x10_0000, 0, 1024, 256, protected),
    ]
}

#[derive(Debug, Deserialize)]
struct DeviceDatabase {
    #[serde(default, rename = "device")]
    devices: Vec<DeviceDescriptor>,
}

/// Immutable name → descriptor table.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceRegistry {
    /// Registry with the built-in device table.
    pub fn builtin() -> Result<Self> {
        Self::from_entries(builtin_entries())
    }

    /// Build a registry, attaching protocol fuse tables and validating each entry.
    pub fn from_entries(entries: Vec<DeviceDescriptor>) -> Result<Self> {
        let mut devices: Vec<DeviceDescriptor> = Vec::with_capacity(entries.len());
        for mut device in entries {
            if let Some((fuses, protocol_id)) = fuses_for_protocol(device.protocol_id) {
                if device.fuses.is_empty() {
                    device.fuses = fuses;
                }
                device.protocol_id = protocol_id;
            }
            device.validate()?;
            if devices.iter().any(|d| d.name.eq_ignore_ascii_case(&device.name)) {
                return Err(ProgError::InvalidDevice {
                    name: device.name,
                    reason: "duplicate device name".to_string(),
                });
            }
            devices.push(device);
        }
        debug!(count = devices.len(), "Device registry loaded");
        Ok(Self { devices })
    }

    /// Parse a TOML device database of `[[device]]` entries.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let db: DeviceDatabase = toml::from_str(content).context("Invalid device database")?;
        Ok(Self::from_entries(db.devices)?)
    }

    /// Load a TOML device database file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Couldn't read device database {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Couldn't load device database {}", path.display()))
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Lookup that reports an unknown name as a usage error.
    pub fn lookup(&self, name: &str) -> Result<&DeviceDescriptor> {
        self.get(name)
            .ok_or_else(|| ProgError::usage(format!("Unknown device: {name}")))
    }

    /// Device names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_builtin_registry() {
        let registry = DeviceRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.names().next(), Some("ATMEGA8"));

        let atmega = registry.lookup("atmega8").unwrap();
        assert_eq!(atmega.fuses, avr_fuses());
        assert_eq!(atmega.expected_chip_id(), Some((0x1E9307, 3)));

        let eeprom = registry.lookup("AT28C256").unwrap();
        assert!(!eeprom.has_fuses());
        assert!(eeprom.supports_write_protect());
    }

    #[test]
    fn test_pic2_protocol_normalised() {
        let registry = DeviceRegistry::builtin().unwrap();
        let pic = registry.lookup("PIC16F628A").unwrap();
        assert_eq!(pic.protocol_id, PROTOCOL_PIC);
        assert_eq!(pic.fuses.len(), 6);
        assert_eq!(pic.fuses.last().map(|f| f.name.as_str()), Some("conf_word1"));

        let single = registry.lookup("PIC16F84A").unwrap();
        assert_eq!(single.fuses, pic_fuses());
    }

    #[test]
    fn test_unknown_device_is_usage_error() {
        let registry = DeviceRegistry::builtin().unwrap();
        let err = registry.lookup("Z80").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.to_string(), "Unknown device: Z80");
    }

    #[test]
    fn test_toml_database() {
        let registry = DeviceRegistry::from_toml_str(
            r#"
            [[device]]
            name = "ATTINY85"
            protocol_id = 0x71
            chip_id = 0x1E930B
            chip_id_bytes = 3
            code_memory_size = 8192
            data_memory_size = 512
            read_buffer_size = 64
            write_buffer_size = 64
            capabilities = { word_addressed = true }

            [[device]]
            name = "CUSTOM"
            protocol_id = 0x99
            code_memory_size = 256
            read_buffer_size = 32
            write_buffer_size = 32

            [[device.fuses]]
            name = "cfg"
            opcode = 0x12
            offset = 0
            length = 2
            "#,
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        let tiny = registry.lookup("attiny85").unwrap();
        assert_eq!(tiny.fuses, avr_fuses());
        assert!(tiny.capabilities.word_addressed);
        assert!(!tiny.capabilities.write_protect);

        let custom = registry.lookup("custom").unwrap();
        assert_eq!(custom.fuses, vec![FuseDecl::new("cfg", 0x12, 0, 2)]);
    }

    #[test]
    fn test_unsorted_database_entry_rejected() {
        let err = DeviceRegistry::from_toml_str(
            r#"
            [[device]]
            name = "BROKEN"
            protocol_id = 0x99
            code_memory_size = 256
            read_buffer_size = 32
            write_buffer_size = 32
            fuses = [
                { name = "b", opcode = 0x14, offset = 0, length = 1 },
                { name = "a", opcode = 0x10, offset = 0, length = 1 },
            ]
            "#,
        )
        .unwrap_err();

        let prog = err.downcast_ref::<ProgError>().unwrap();
        assert_eq!(prog.kind(), ErrorKind::ConfigIntegrity);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut entries = builtin_entries();
        entries.push(entries[0].clone());
        assert!(matches!(
            DeviceRegistry::from_entries(entries),
            Err(ProgError::InvalidDevice { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.toml");
        std::fs::write(
            &path,
            "[[device]]\nname = \"X\"\nprotocol_id = 1\ncode_memory_size = 16\nread_buffer_size = 16\nwrite_buffer_size = 16\n",
        )
        .unwrap();
        assert_eq!(DeviceRegistry::load_from_file(&path).unwrap().len(), 1);
        assert!(DeviceRegistry::load_from_file(dir.path().join("none.toml")).is_err());
    }
}
