// Copyright 2026 The solo5-bio Authors. All Rights Reserved.
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause

//! Block device backend of the rumpuser hypercall interface, running on top of the solo5 block
//! API.
//!
//! A guest refers to its disks with names such as `XENBLK_xvda1`. The backend translates each
//! name into a virtual block device id (see the `xenblk` crate), gives every distinct device a
//! slot in a small fixed [`DeviceTable`], and serves block I/O on open devices one sector at a
//! time through a [`BlockHypervisor`].
//!
//! Everything is synchronous: a request runs to completion, or to its first failed sector, and
//! its completion callback is called before the request function returns.

#[macro_use]
extern crate log;

pub mod backend;
pub mod block;
pub mod device;
pub mod file;
pub mod hypervisor;
pub mod rumpuser;

#[cfg(test)]
mod log_capture;

pub use backend::{BlockBackend, Handle, BLOCK_FD_OFFSET};
pub use block::{perform_io, BioOp, BioRequest, SECTOR_SIZE};
pub use device::{BlockDeviceSlot, DeviceTable, FileInfo, FileType, MAX_BLOCK_DEVICES};
pub use file::FileHypervisor;
pub use hypervisor::{BlockHypervisor, BlockInfo};
pub use xenblk::{parse_device_name, DeviceSpec, DiskClass, Vbd};
