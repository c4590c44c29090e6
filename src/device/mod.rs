// Copyright 2026 The solo5-bio Authors. All Rights Reserved.
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause

//! The table of block devices known to the backend.
//!
//! Each device name is translated into a vbd, and each distinct vbd gets one of
//! `MAX_BLOCK_DEVICES` slots for the lifetime of the table. The slot index doubles as the solo5
//! device number. Slots are never released: closing a device does not drop its reservation or
//! its open count.

use std::{fmt, result};

use xenblk::{DeviceSpec, Vbd};

use crate::hypervisor::{BlockHypervisor, BlockInfo};
use crate::rumpuser::RUMPUSER_FT_BLK;

/// Number of slots in the device table.
pub const MAX_BLOCK_DEVICES: usize = 10;

/// Device table errors.
#[derive(Debug)]
pub enum Error {
    /// The device name could not be translated into a vbd.
    Name(xenblk::Error),
    /// All slots are reserved for other devices.
    TableFull,
    /// The slot index is out of range, or the slot holds no device.
    InvalidSlot(usize),
    /// The device in the slot has not been opened yet.
    NotOpen(usize),
}

impl Error {
    /// Returns `true` if the name was not meant for this backend at all.
    pub fn is_not_my_device(&self) -> bool {
        matches!(self, Error::Name(xenblk::Error::NotMyDevice))
    }

    /// The host error code for this error.
    pub fn errno(&self) -> i32 {
        libc::ENXIO
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Error::*;

        match self {
            Name(e) => write!(f, "{}", e),
            TableFull => write!(
                f,
                "blkdev table full, at most {} devices are supported",
                MAX_BLOCK_DEVICES
            ),
            InvalidSlot(index) => write!(f, "no block device in slot {}", index),
            NotOpen(index) => write!(f, "block device in slot {} is not open", index),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Name(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Kind of file reported for a device name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Block,
}

impl FileType {
    /// The rumpuser file type code.
    pub fn raw(self) -> i32 {
        match self {
            FileType::Block => RUMPUSER_FT_BLK,
        }
    }
}

/// What `stat` knows about a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Size of the device in bytes.
    pub size: u64,
    pub file_type: FileType,
}

/// A device table entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockDeviceSlot {
    vbd: Option<Vbd>,
    open_count: u32,
    // Fetched on the first open and never refreshed.
    info: Option<BlockInfo>,
}

impl BlockDeviceSlot {
    /// The device holding this slot, if any.
    pub fn vbd(&self) -> Option<Vbd> {
        self.vbd
    }

    /// Number of opens seen so far.
    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    /// Device geometry, available once the slot has been opened.
    pub fn info(&self) -> Option<BlockInfo> {
        self.info
    }

    pub fn is_free(&self) -> bool {
        self.vbd.is_none()
    }

    pub fn is_open(&self) -> bool {
        self.open_count > 0
    }
}

/// Fixed size vbd to slot registry.
#[derive(Debug)]
pub struct DeviceTable {
    slots: [BlockDeviceSlot; MAX_BLOCK_DEVICES],
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTable {
    /// Creates a table with every slot unreserved.
    pub fn new() -> Self {
        DeviceTable {
            slots: [BlockDeviceSlot::default(); MAX_BLOCK_DEVICES],
        }
    }

    /// Drops every reservation. Only meant to be called at startup.
    pub fn reset(&mut self) {
        self.slots = [BlockDeviceSlot::default(); MAX_BLOCK_DEVICES];
    }

    /// Returns the slot at `index`.
    pub fn slot(&self, index: usize) -> Option<&BlockDeviceSlot> {
        self.slots.get(index)
    }

    /// Number of reserved slots.
    pub fn occupancy(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    /// Returns the index of the slot reserved for `vbd`.
    pub fn find(&self, vbd: Vbd) -> Option<usize> {
        self.slots.iter().position(|slot| slot.vbd == Some(vbd))
    }

    /// Translates `name` and returns the slot of the device, reserving the first free slot if
    /// the device has not been seen before.
    pub fn resolve(&mut self, name: &str) -> Result<usize> {
        let spec = DeviceSpec::parse(name).map_err(Error::Name)?;
        let vbd = spec.vbd();

        if let Some(index) = self.find(vbd) {
            return Ok(index);
        }

        match self.slots.iter().position(BlockDeviceSlot::is_free) {
            Some(index) => {
                self.slots[index].vbd = Some(vbd);
                info!(
                    "New block device {} registered with vbd={} ({}) as num={}",
                    spec,
                    vbd,
                    vbd.xenstore_path(),
                    index
                );
                Ok(index)
            }
            None => {
                error!("blkdev table full, cannot register {}", spec);
                Err(Error::TableFull)
            }
        }
    }

    /// Opens the device in slot `index`. The geometry is queried from the hypervisor on the
    /// first open only. Returns whether this was the first open.
    pub fn open<H: BlockHypervisor + ?Sized>(&mut self, hv: &H, index: usize) -> Result<bool> {
        let slot = match self.slots.get_mut(index) {
            Some(slot) if !slot.is_free() => slot,
            _ => return Err(Error::InvalidSlot(index)),
        };

        if slot.is_open() {
            slot.open_count = slot.open_count.saturating_add(1);
            return Ok(false);
        }

        let info = hv.block_info(index);
        debug!(
            "opened block device num={}: capacity {} bytes, block size {}",
            index, info.capacity, info.block_size
        );
        slot.info = Some(info);
        slot.open_count = 1;
        Ok(true)
    }

    /// Describes the device in slot `index`, which must have been opened before.
    pub fn stat(&self, index: usize) -> Result<FileInfo> {
        let slot = self
            .slots
            .get(index)
            .filter(|slot| !slot.is_free())
            .ok_or(Error::InvalidSlot(index))?;
        let info = slot.info.ok_or(Error::NotOpen(index))?;

        Ok(FileInfo {
            size: info.capacity,
            file_type: FileType::Block,
        })
    }

    /// Closing keeps both the reservation and the open count.
    pub fn close(&mut self, index: usize) {
        debug!("close of block device num={} ignored", index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use log::Level;

    use crate::hypervisor::tests::MockHypervisor;
    use crate::log_capture::logged;

    fn xvd(disk: usize) -> String {
        format!("XENBLK_xvd{}", char::from(b'a' + disk as u8))
    }

    #[test]
    fn test_resolve_is_stable() {
        let mut table = DeviceTable::new();

        assert_eq!(table.resolve("XENBLK_sda").unwrap(), 0);
        assert_eq!(table.resolve("XENBLK_hdb1").unwrap(), 1);
        assert_eq!(table.resolve("XENBLK_sda").unwrap(), 0);
        // Same device, different spelling.
        assert_eq!(table.resolve("XENBLK_sda0").unwrap(), 0);
        assert_eq!(table.occupancy(), 2);

        let vbd = table.slot(1).unwrap().vbd().unwrap();
        assert_eq!(vbd.raw(), 833);
        assert_eq!(table.find(vbd), Some(1));
    }

    #[test]
    fn test_resolve_foreign_and_malformed() {
        let mut table = DeviceTable::new();

        let (res, records) = logged(|| table.resolve("/dev/sda"));
        let err = res.unwrap_err();
        assert!(err.is_not_my_device());
        assert_eq!(err.errno(), libc::ENXIO);
        assert!(records.is_empty());

        let (res, records) = logged(|| table.resolve("XENBLK_xvd"));
        let err = res.unwrap_err();
        assert!(!err.is_not_my_device());
        assert!(matches!(err, Error::Name(ref e) if e.is_malformed()));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, Level::Warn);

        assert_eq!(table.occupancy(), 0);
    }

    #[test]
    fn test_table_full() {
        let mut table = DeviceTable::new();

        for disk in 0..MAX_BLOCK_DEVICES {
            assert_eq!(table.resolve(&xvd(disk)).unwrap(), disk);
        }
        let before: Vec<_> = (0..MAX_BLOCK_DEVICES)
            .map(|i| table.slot(i).unwrap().vbd())
            .collect();

        let (res, records) = logged(|| table.resolve(&xvd(MAX_BLOCK_DEVICES)));
        assert!(matches!(res, Err(Error::TableFull)));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, Level::Error);
        // Known devices still resolve.
        assert_eq!(table.resolve(&xvd(3)).unwrap(), 3);

        let after: Vec<_> = (0..MAX_BLOCK_DEVICES)
            .map(|i| table.slot(i).unwrap().vbd())
            .collect();
        assert_eq!(before, after);

        table.reset();
        assert_eq!(table.occupancy(), 0);
        assert_eq!(table.resolve(&xvd(MAX_BLOCK_DEVICES)).unwrap(), 0);
    }

    #[test]
    fn test_open_queries_info_once() {
        let hv = MockHypervisor::new(4096);
        let mut table = DeviceTable::new();
        let index = table.resolve("XENBLK_xvdb").unwrap();

        assert!(!table.slot(index).unwrap().is_open());
        assert!(matches!(table.stat(index), Err(Error::NotOpen(_))));

        assert!(table.open(&hv, index).unwrap());
        assert_eq!(hv.info_queries.get(), 1);
        assert!(!table.open(&hv, index).unwrap());
        assert_eq!(hv.info_queries.get(), 1);

        let slot = table.slot(index).unwrap();
        assert_eq!(slot.open_count(), 2);
        assert_eq!(slot.info(), Some(hv.info));

        table.close(index);
        assert_eq!(table.slot(index).unwrap().open_count(), 2);

        let info = table.stat(index).unwrap();
        assert_eq!(info.size, 4096);
        assert_eq!(info.file_type, FileType::Block);
        assert_eq!(info.file_type.raw(), RUMPUSER_FT_BLK);
    }

    #[test]
    fn test_invalid_slot() {
        let hv = MockHypervisor::new(512);
        let mut table = DeviceTable::new();

        assert!(matches!(table.open(&hv, 0), Err(Error::InvalidSlot(0))));
        assert!(matches!(
            table.open(&hv, MAX_BLOCK_DEVICES),
            Err(Error::InvalidSlot(_))
        ));
        assert!(matches!(table.stat(42), Err(Error::InvalidSlot(42))));
        assert_eq!(hv.info_queries.get(), 0);
    }
}
