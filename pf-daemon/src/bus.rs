//! Register-file bus transport
//!
//! Each addressable device is one binary file under the devices directory;
//! a register address is a byte offset into that file. This is the shape
//! CPLD and EEPROM register images take when the platform exposes them
//! through the filesystem. The transport is a fallible primitive: errors
//! propagate to the caller and no retries happen here.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use pf_core::{Bus, PlatfandError, Result};

#[derive(Debug, Clone)]
pub struct FileBus {
    devices_dir: PathBuf,
}

impl FileBus {
    pub fn new(devices_dir: impl Into<PathBuf>) -> Self {
        Self {
            devices_dir: devices_dir.into(),
        }
    }

    fn device_path(&self, device: &str) -> Result<PathBuf> {
        // Device names come from the hardware catalog; a path separator in
        // one would escape the devices directory.
        if device.is_empty() || device.contains('/') || device.contains("..") {
            return Err(PlatfandError::UnknownDevice(device.to_string()));
        }
        Ok(self.devices_dir.join(device))
    }
}

impl Bus for FileBus {
    fn read(&mut self, device: &str, address: u32, buf: &mut [u8]) -> Result<()> {
        let path = self.device_path(device)?;
        let mut file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| PlatfandError::bus(device, address, e))?;
        file.seek(SeekFrom::Start(u64::from(address)))
            .and_then(|_| file.read_exact(buf))
            .map_err(|e| PlatfandError::bus(device, address, e))
    }

    fn write(&mut self, device: &str, address: u32, buf: &[u8]) -> Result<()> {
        let path = self.device_path(device)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| PlatfandError::bus(device, address, e))?;
        file.seek(SeekFrom::Start(u64::from(address)))
            .and_then(|_| file.write_all(buf))
            .and_then(|_| file.flush())
            .map_err(|e| PlatfandError::bus(device, address, e))
    }
}
