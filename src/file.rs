// Copyright 2026 The solo5-bio Authors. All Rights Reserved.
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause

//! A `BlockHypervisor` serving block devices from host files, the way a solo5 tender attaches
//! disk images to a guest.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::result;

use vmm_sys_util::errno;

use crate::block::SECTOR_SIZE;
use crate::hypervisor::{BlockHypervisor, BlockInfo};

struct Disk {
    file: File,
    // Whole sectors only.
    capacity: u64,
}

/// Block devices backed by files, numbered in the order they were given.
pub struct FileHypervisor {
    disks: Vec<Disk>,
}

fn io_errno(e: io::Error) -> errno::Error {
    errno::Error::new(e.raw_os_error().unwrap_or(libc::EIO))
}

impl FileHypervisor {
    /// Attaches `files` as devices 0, 1, ... The capacity of each device is the length of its
    /// file at this point.
    pub fn new<I>(files: I) -> io::Result<Self>
    where
        I: IntoIterator<Item = File>,
    {
        let disks = files
            .into_iter()
            .map(|file| {
                let len = file.metadata()?.len();
                let tail = len % SECTOR_SIZE as u64;
                if tail != 0 {
                    warn!(
                        "disk image size {} is not a multiple of {}, the tail is unreachable",
                        len, SECTOR_SIZE
                    );
                }
                Ok(Disk {
                    file,
                    capacity: len - tail,
                })
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(FileHypervisor { disks })
    }

    /// Number of attached devices.
    pub fn num_devices(&self) -> usize {
        self.disks.len()
    }

    // Checks that `len` bytes at `offset` are a whole number of blocks inside `device`.
    fn disk(
        &self,
        device: usize,
        offset: u64,
        len: usize,
    ) -> result::Result<&Disk, errno::Error> {
        let disk = self
            .disks
            .get(device)
            .ok_or_else(|| errno::Error::new(libc::ENXIO))?;

        let block_size = SECTOR_SIZE as u64;
        let len = len as u64;
        if offset % block_size != 0 || len % block_size != 0 {
            return Err(errno::Error::new(libc::EINVAL));
        }
        match offset.checked_add(len) {
            Some(end) if end <= disk.capacity => Ok(disk),
            _ => Err(errno::Error::new(libc::EINVAL)),
        }
    }
}

impl BlockHypervisor for FileHypervisor {
    fn block_info(&self, device: usize) -> BlockInfo {
        let capacity = match self.disks.get(device) {
            Some(disk) => disk.capacity,
            None => {
                warn!("block info requested for unknown device {}", device);
                0
            }
        };

        BlockInfo {
            capacity,
            block_size: SECTOR_SIZE as u64,
        }
    }

    fn block_read(
        &mut self,
        device: usize,
        offset: u64,
        buf: &mut [u8],
    ) -> result::Result<(), errno::Error> {
        self.disk(device, offset, buf.len())?
            .file
            .read_exact_at(buf, offset)
            .map_err(io_errno)
    }

    fn block_write(
        &mut self,
        device: usize,
        offset: u64,
        buf: &[u8],
    ) -> result::Result<(), errno::Error> {
        self.disk(device, offset, buf.len())?
            .file
            .write_all_at(buf, offset)
            .map_err(io_errno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vmm_sys_util::tempfile::TempFile;

    fn disk_image(len: u64) -> (TempFile, File) {
        let image = TempFile::new().unwrap();
        image.as_file().set_len(len).unwrap();
        let file = image.as_file().try_clone().unwrap();
        (image, file)
    }

    #[test]
    fn test_block_info() {
        let (_a, a) = disk_image(8 * 512);
        let (_b, b) = disk_image(1000);
        let hv = FileHypervisor::new(vec![a, b]).unwrap();

        assert_eq!(hv.num_devices(), 2);
        assert_eq!(
            hv.block_info(0),
            BlockInfo {
                capacity: 4096,
                block_size: 512
            }
        );
        // The partial sector at the end is not reported.
        assert_eq!(hv.block_info(1).capacity, 512);
        assert_eq!(hv.block_info(2).capacity, 0);
    }

    #[test]
    fn test_read_write() {
        let (_image, file) = disk_image(4 * 512);
        let mut hv = FileHypervisor::new(vec![file]).unwrap();

        let sector = [0xa5u8; 512];
        hv.block_write(0, 1024, &sector).unwrap();

        let mut buf = [0u8; 512];
        hv.block_read(0, 1024, &mut buf).unwrap();
        assert_eq!(buf[..], sector[..]);
        hv.block_read(0, 512, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rejected_requests() {
        let (_image, file) = disk_image(4 * 512);
        let mut hv = FileHypervisor::new(vec![file]).unwrap();
        let mut buf = [0u8; 512];

        assert_eq!(hv.block_read(1, 0, &mut buf).unwrap_err().errno(), libc::ENXIO);
        assert_eq!(hv.block_read(0, 100, &mut buf).unwrap_err().errno(), libc::EINVAL);
        assert_eq!(
            hv.block_read(0, 0, &mut buf[..100]).unwrap_err().errno(),
            libc::EINVAL
        );
        assert_eq!(hv.block_write(0, 4 * 512, &buf).unwrap_err().errno(), libc::EINVAL);
        assert_eq!(
            hv.block_write(0, u64::MAX - 511, &buf).unwrap_err().errno(),
            libc::EINVAL
        );
    }
}
