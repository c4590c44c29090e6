// Copyright 2026 The solo5-bio Authors. All Rights Reserved.
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause

//! Sector granular block I/O against the hypervisor.
//!
//! A request is split into `SECTOR_SIZE` chunks which are transferred one at a time, in order of
//! increasing offset. The first failed chunk ends the request; the completion then reports the
//! bytes transferred before it.

mod request;

use std::{fmt, result};

use vm_memory::{GuestAddress, GuestMemory, GuestMemoryError};
use vmm_sys_util::errno;

use crate::hypervisor::BlockHypervisor;
use crate::rumpuser::RUMPUSER_BIO_READ;

pub use request::BioRequest;

pub const SECTOR_SHIFT: u8 = 9;
pub const SECTOR_SIZE: usize = 1 << SECTOR_SHIFT;

/// Block I/O errors.
#[derive(Debug)]
pub enum Error {
    /// The length is zero or not a multiple of `SECTOR_SIZE`.
    BadLength(usize),
    /// The offset is negative, or the request runs past the largest offset.
    BadOffset(i64),
    /// The hypervisor failed to transfer the sector at `offset`.
    Hypercall { offset: u64, source: errno::Error },
    /// A sector could not be copied from or to guest memory.
    GuestMemory(GuestMemoryError),
}

impl Error {
    /// The host error code for this error.
    pub fn errno(&self) -> i32 {
        libc::EIO
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Error::*;

        match self {
            BadLength(len) => write!(f, "length {} is not a whole number of sectors", len),
            BadOffset(offset) => write!(f, "invalid offset {}", offset),
            Hypercall { offset, source } => {
                write!(f, "block transfer at offset {} failed: {}", offset, source)
            }
            GuestMemory(e) => write!(f, "guest memory error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Hypercall { source, .. } => Some(source),
            Error::GuestMemory(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Direction of a block request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BioOp {
    /// Device to guest memory.
    Read,
    /// Guest memory to device.
    Write,
}

impl From<u32> for BioOp {
    fn from(flags: u32) -> Self {
        if flags & RUMPUSER_BIO_READ != 0 {
            BioOp::Read
        } else {
            BioOp::Write
        }
    }
}

/// Transfers `len` bytes between guest memory at `addr` and `device` at `offset`, then calls
/// `done` with the number of bytes transferred and the outcome.
///
/// `done` is always called exactly once, before this function returns. Requests whose length
/// is zero or not sector aligned complete with `(0, Err(BadLength))` without any hypercall.
#[allow(clippy::too_many_arguments)]
pub fn perform_io<H, M, F>(
    hv: &mut H,
    device: usize,
    op: BioOp,
    mem: &M,
    addr: GuestAddress,
    len: usize,
    offset: i64,
    done: F,
) where
    H: BlockHypervisor + ?Sized,
    M: GuestMemory + ?Sized,
    F: FnOnce(usize, Result<()>),
{
    let (transferred, result) = match BioRequest::new(op, addr, len, offset) {
        Ok(request) => request.execute(hv, device, mem),
        Err(e) => (0, Err(e)),
    };

    if let Err(ref e) = result {
        error!(
            "Failed to execute {:?} request on device {}: {} ({} of {} bytes done)",
            op, device, e, transferred, len
        );
    }

    done(transferred, result)
}
