// Copyright 2026 The solo5-bio Authors. All Rights Reserved.
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause

use std::convert::TryFrom;

use vm_memory::{Address, Bytes, GuestAddress, GuestMemory, GuestMemoryError};

use super::{BioOp, Error, Result, SECTOR_SIZE};
use crate::hypervisor::BlockHypervisor;

/// A validated block request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BioRequest {
    /// Direction of the transfer.
    op: BioOp,
    /// Guest address of the first byte of the buffer.
    addr: GuestAddress,
    /// Length of the transfer, a non-zero multiple of `SECTOR_SIZE`.
    len: usize,
    /// Byte offset on the device where the transfer starts.
    offset: u64,
}

impl BioRequest {
    /// Builds a request, rejecting lengths that are not a whole number of sectors and offsets
    /// that cannot be addressed.
    pub fn new(op: BioOp, addr: GuestAddress, len: usize, offset: i64) -> Result<BioRequest> {
        if len == 0 || len % SECTOR_SIZE != 0 {
            return Err(Error::BadLength(len));
        }

        let start = u64::try_from(offset).map_err(|_| Error::BadOffset(offset))?;
        // The last sector must be addressable as well.
        start
            .checked_add(len as u64)
            .ok_or(Error::BadOffset(offset))?;

        Ok(BioRequest {
            op,
            addr,
            len,
            offset: start,
        })
    }

    pub fn op(&self) -> BioOp {
        self.op
    }

    pub fn addr(&self) -> GuestAddress {
        self.addr
    }

    pub fn data_len(&self) -> usize {
        self.len
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of sectors covered by the request.
    pub fn sectors(&self) -> usize {
        self.len / SECTOR_SIZE
    }

    /// Runs the request against `device`, one sector per hypercall. Returns the number of bytes
    /// transferred, which on error only counts the sectors before the failed one.
    pub fn execute<H, M>(&self, hv: &mut H, device: usize, mem: &M) -> (usize, Result<()>)
    where
        H: BlockHypervisor + ?Sized,
        M: GuestMemory + ?Sized,
    {
        let mut sector = [0u8; SECTOR_SIZE];
        let mut done = 0;

        while done < self.len {
            if let Err(e) = self.transfer_sector(hv, device, mem, done, &mut sector) {
                return (done, Err(e));
            }
            done += SECTOR_SIZE;
        }

        (done, Ok(()))
    }

    // Moves the sector at byte `pos` of the request through the bounce buffer `sector`.
    fn transfer_sector<H, M>(
        &self,
        hv: &mut H,
        device: usize,
        mem: &M,
        pos: usize,
        sector: &mut [u8; SECTOR_SIZE],
    ) -> Result<()>
    where
        H: BlockHypervisor + ?Sized,
        M: GuestMemory + ?Sized,
    {
        // Cannot overflow, the whole range was checked in `new`.
        let offset = self.offset + pos as u64;
        let addr = self
            .addr
            .checked_add(pos as u64)
            .ok_or(Error::GuestMemory(GuestMemoryError::InvalidGuestAddress(
                self.addr,
            )))?;
        let hypercall_error = |source| Error::Hypercall { offset, source };

        match self.op {
            BioOp::Read => {
                hv.block_read(device, offset, &mut sector[..])
                    .map_err(hypercall_error)?;
                mem.write_slice(&sector[..], addr)
                    .map_err(Error::GuestMemory)
            }
            BioOp::Write => {
                mem.read_slice(&mut sector[..], addr)
                    .map_err(Error::GuestMemory)?;
                hv.block_write(device, offset, &sector[..])
                    .map_err(hypercall_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let addr = GuestAddress(0x2000);

        let request = BioRequest::new(BioOp::Write, addr, 4 * SECTOR_SIZE, 4096).unwrap();
        assert_eq!(request.op(), BioOp::Write);
        assert_eq!(request.addr(), addr);
        assert_eq!(request.data_len(), 4 * SECTOR_SIZE);
        assert_eq!(request.offset(), 4096);
        assert_eq!(request.sectors(), 4);

        assert!(matches!(
            BioRequest::new(BioOp::Read, addr, 0, 0),
            Err(Error::BadLength(0))
        ));
        assert!(matches!(
            BioRequest::new(BioOp::Read, addr, 1000, 0),
            Err(Error::BadLength(1000))
        ));
        assert!(matches!(
            BioRequest::new(BioOp::Read, addr, SECTOR_SIZE, -1),
            Err(Error::BadOffset(-1))
        ));
    }

    #[test]
    fn test_unaligned_offset_is_accepted() {
        // Only the length has to be sector aligned; the device decides about the offset.
        let request = BioRequest::new(BioOp::Read, GuestAddress(0), SECTOR_SIZE, 100).unwrap();
        assert_eq!(request.offset(), 100);
    }
}
