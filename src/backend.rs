// Copyright 2026 The solo5-bio Authors. All Rights Reserved.
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause

//! The rumpuser file and block I/O entry points for `XENBLK_` devices.
//!
//! `BlockBackend` owns the device table and the hypervisor handle. Every entry point takes
//! `&mut self`, so concurrent callers have to serialize access themselves.

use std::convert::TryFrom;
use std::{fmt, result};

use vm_memory::{GuestAddress, GuestMemory};
use xenblk::XENBLK_MAGIC;

use crate::block::{self, BioOp};
use crate::device::{self, DeviceTable, FileInfo, MAX_BLOCK_DEVICES};
use crate::hypervisor::BlockHypervisor;
use crate::rumpuser::RUMPUSER_OPEN_BIO;

/// Handles are slot indices shifted by this value, to keep them apart from other descriptor
/// namespaces of the host.
pub const BLOCK_FD_OFFSET: i32 = 64;

/// Backend errors.
#[derive(Debug)]
pub enum Error {
    /// The open mode lacks `RUMPUSER_OPEN_BIO`.
    NotBlockIo(i32),
    /// Device resolution or lookup failed.
    Device(device::Error),
}

impl Error {
    /// Returns `true` if the name should be offered to another backend.
    pub fn is_not_my_device(&self) -> bool {
        match self {
            Error::Device(e) => e.is_not_my_device(),
            _ => false,
        }
    }

    /// The host error code for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Error::NotBlockIo(_) => libc::ENXIO,
            Error::Device(e) => e.errno(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotBlockIo(mode) => write!(f, "open mode 0x{:x} is not a block I/O mode", mode),
            Error::Device(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<device::Error> for Error {
    fn from(e: device::Error) -> Self {
        Error::Device(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// An open block device, as seen by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle(i32);

impl Handle {
    fn from_slot(index: usize) -> Self {
        // Slot indices are below `MAX_BLOCK_DEVICES`.
        Handle(BLOCK_FD_OFFSET + index as i32)
    }

    /// Wraps a descriptor number received from the host.
    pub fn from_fd(fd: i32) -> Self {
        Handle(fd)
    }

    /// The descriptor number handed to the host.
    pub fn fd(self) -> i32 {
        self.0
    }

    /// The table slot this handle refers to, if it is in range.
    pub fn slot(self) -> Option<usize> {
        self.0
            .checked_sub(BLOCK_FD_OFFSET)
            .and_then(|index| usize::try_from(index).ok())
            .filter(|&index| index < MAX_BLOCK_DEVICES)
    }
}

/// Block device backend over a solo5 style hypervisor.
pub struct BlockBackend<H> {
    table: DeviceTable,
    hv: H,
}

impl<H: BlockHypervisor> BlockBackend<H> {
    /// Creates a backend with an empty device table.
    pub fn new(hv: H) -> Self {
        BlockBackend {
            table: DeviceTable::new(),
            hv,
        }
    }

    /// Forgets every device. Meant to run once, when the process starts.
    pub fn init(&mut self) {
        self.table.reset();
    }

    pub fn table(&self) -> &DeviceTable {
        &self.table
    }

    pub fn hypervisor(&self) -> &H {
        &self.hv
    }

    // Resolves `name` and opens its slot.
    fn open_slot(&mut self, name: &str) -> Result<usize> {
        let index = self.table.resolve(name)?;
        self.table.open(&self.hv, index)?;
        Ok(index)
    }

    /// Opens the device called `name` for block I/O.
    pub fn open(&mut self, name: &str, mode: i32) -> Result<Handle> {
        // Names of other backends are declined before anything else, and silently.
        if !name.starts_with(XENBLK_MAGIC) {
            return Err(device::Error::Name(xenblk::Error::NotMyDevice).into());
        }
        if mode & RUMPUSER_OPEN_BIO == 0 {
            return Err(Error::NotBlockIo(mode));
        }

        let index = self.open_slot(name)?;
        debug!("opened {} as device num={}", name, index);
        Ok(Handle::from_slot(index))
    }

    /// Closing leaves the device open.
    pub fn close(&mut self, handle: Handle) -> Result<()> {
        if let Some(index) = handle.slot() {
            self.table.close(index);
        }
        Ok(())
    }

    /// Describes the device called `name`, opening it if needed.
    pub fn get_file_info(&mut self, name: &str) -> Result<FileInfo> {
        let index = self.open_slot(name)?;
        Ok(self.table.stat(index)?)
    }

    /// Runs a block request on `handle` and reports the bytes transferred and the error code
    /// (0 on success) to `done`, before returning.
    ///
    /// `op` carries the rumpuser request flags.
    #[allow(clippy::too_many_arguments)]
    pub fn bio<M, F>(
        &mut self,
        handle: Handle,
        op: u32,
        mem: &M,
        addr: GuestAddress,
        len: usize,
        offset: i64,
        done: F,
    ) where
        M: GuestMemory + ?Sized,
        F: FnOnce(usize, i32),
    {
        let table = &self.table;
        let index = match handle
            .slot()
            .filter(|&index| table.slot(index).map_or(false, |slot| slot.is_open()))
        {
            Some(index) => index,
            None => {
                warn!("block I/O on unknown handle {}", handle.fd());
                return done(0, libc::EBADF);
            }
        };

        block::perform_io(
            &mut self.hv,
            index,
            BioOp::from(op),
            mem,
            addr,
            len,
            offset,
            |transferred, result| done(transferred, result.map_or_else(|e| e.errno(), |()| 0)),
        );
    }
}
