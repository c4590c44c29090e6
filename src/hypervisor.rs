// Copyright 2026 The solo5-bio Authors. All Rights Reserved.
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause

//! The solo5 block interface, as consumed by this crate.

use std::result;

use vmm_sys_util::errno;

/// Geometry of a solo5 block device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockInfo {
    /// Capacity of the device in bytes.
    pub capacity: u64,
    /// Minimum unit of I/O in bytes.
    pub block_size: u64,
}

/// Block primitives offered by the hypervisor. Devices are addressed by their number, which is
/// the slot index of the device table.
pub trait BlockHypervisor {
    /// Returns the geometry of `device`.
    fn block_info(&self, device: usize) -> BlockInfo;

    /// Reads `buf.len()` bytes at `offset` from `device` into `buf`.
    fn block_read(
        &mut self,
        device: usize,
        offset: u64,
        buf: &mut [u8],
    ) -> result::Result<(), errno::Error>;

    /// Writes `buf` to `device` at `offset`.
    fn block_write(
        &mut self,
        device: usize,
        offset: u64,
        buf: &[u8],
    ) -> result::Result<(), errno::Error>;
}

impl<H: BlockHypervisor + ?Sized> BlockHypervisor for &mut H {
    fn block_info(&self, device: usize) -> BlockInfo {
        (**self).block_info(device)
    }

    fn block_read(
        &mut self,
        device: usize,
        offset: u64,
        buf: &mut [u8],
    ) -> result::Result<(), errno::Error> {
        (**self).block_read(device, offset, buf)
    }

    fn block_write(
        &mut self,
        device: usize,
        offset: u64,
        buf: &[u8],
    ) -> result::Result<(), errno::Error> {
        (**self).block_write(device, offset, buf)
    }
}
