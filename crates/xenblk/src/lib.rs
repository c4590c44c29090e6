// Copyright 2026 The solo5-bio Authors. All Rights Reserved.
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause

//! Translation of Xen-style block device specifications into virtual block device ids.
//!
//! A specification looks like `XENBLK_xvda1`: the `XENBLK_` prefix, a disk class tag (`hd`,
//! `sd` or `xvd`), a disk letter and an optional single digit partition. The resulting vbd
//! packs the class, disk and partition the way the legacy major/minor numbers do, which is what
//! a guest kernel expects to find under `device/vbd/<vbd>`.
//!
//! Names without the prefix are declined silently with [`Error::NotMyDevice`], so that a host
//! can offer the same name to other backends. Every other rejection is logged.

#[macro_use]
extern crate log;

use std::{fmt, result};

/// Prefix of every name handled by this crate.
pub const XENBLK_MAGIC: &str = "XENBLK_";

const HD_MAJOR: u32 = 3;
// Second IDE controller, holding the third and fourth disks.
const HD_SECONDARY_MAJOR: u32 = 22;
const SD_MAJOR: u32 = 8;
const XVD_MAJOR: u32 = 202;
// Extended xvd numbering, used past the 16th disk.
const XVD_EXTENDED: u32 = 1 << 28;

/// Device name translation errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The name lacks the `XENBLK_` prefix.
    NotMyDevice,
    /// The disk class tag is neither `hd`, `sd` nor `xvd`.
    UnsupportedDiskClass(String),
    /// The disk/partition suffix is not one or two characters long.
    UnsupportedSpec(String),
    /// The disk letter or partition digit is not valid.
    DiskPartition { disk: i32, partition: i32 },
    /// The disk or partition index is outside what the disk class can encode.
    OutOfRange(String),
}

impl Error {
    /// Returns `true` for errors on names that carry the prefix, i.e. names meant for this
    /// backend but malformed.
    pub fn is_malformed(&self) -> bool {
        *self != Error::NotMyDevice
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Error::*;

        match self {
            NotMyDevice => write!(f, "not a {} device", XENBLK_MAGIC),
            UnsupportedDiskClass(spec) => write!(f, "unsupported devtype {}", spec),
            UnsupportedSpec(spec) => write!(f, "unsupported blkspec {}", spec),
            DiskPartition { disk, partition } => {
                write!(f, "unsupported disk/partition {} {}", disk, partition)
            }
            OutOfRange(spec) => write!(f, "unsupported disk/partition spec {}", spec),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Disk classes that can appear in a device specification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiskClass {
    /// IDE disk, `hd`.
    Hd,
    /// SCSI disk, `sd`.
    Sd,
    /// Xen para-virtual disk, `xvd`.
    Xvd,
}

impl DiskClass {
    /// The tag used for this class in device names.
    pub fn tag(self) -> &'static str {
        match self {
            DiskClass::Hd => "hd",
            DiskClass::Sd => "sd",
            DiskClass::Xvd => "xvd",
        }
    }

    // Splits a known class tag off the front of `spec`.
    fn split_tag(spec: &str) -> Option<(DiskClass, &str)> {
        [DiskClass::Hd, DiskClass::Sd, DiskClass::Xvd]
            .iter()
            .find_map(|&class| spec.strip_prefix(class.tag()).map(|rest| (class, rest)))
    }

    fn accepts(self, disk: i32, partition: i32) -> bool {
        match self {
            DiskClass::Hd => disk < 4,
            DiskClass::Sd => disk <= 16 && partition <= 16,
            DiskClass::Xvd => disk <= i32::from(b'z' - b'a'),
        }
    }
}

/// A virtual block device id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vbd(u32);

impl Vbd {
    /// Returns the numeric id.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Returns the xenstore backend path of the device.
    pub fn xenstore_path(self) -> String {
        format!("device/vbd/{}", self.0)
    }
}

impl fmt::Display for Vbd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded device specification.
///
/// Only values produced by [`DeviceSpec::parse`] exist, so the disk and partition are always
/// within the range of the class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceSpec {
    class: DiskClass,
    disk: u8,
    partition: u8,
}

impl DeviceSpec {
    /// Parses a full device name, such as `XENBLK_sdb2`.
    pub fn parse(name: &str) -> Result<DeviceSpec> {
        // Do not log anything for names that are clearly not ours.
        let spec = name
            .strip_prefix(XENBLK_MAGIC)
            .ok_or(Error::NotMyDevice)?;

        Self::parse_spec(spec).map_err(|e| {
            warn!("{}", e);
            e
        })
    }

    fn parse_spec(spec: &str) -> Result<DeviceSpec> {
        let (class, suffix) = DiskClass::split_tag(spec)
            .ok_or_else(|| Error::UnsupportedDiskClass(spec.to_owned()))?;

        let suffix = suffix.as_bytes();
        if suffix.is_empty() || suffix.len() > 2 {
            return Err(Error::UnsupportedSpec(spec.to_owned()));
        }

        let disk = i32::from(suffix[0]) - i32::from(b'a');
        let partition = match suffix.get(1) {
            Some(&c) => i32::from(c) - i32::from(b'0'),
            None => 0,
        };
        if disk < 0 || partition < 0 || partition > 9 {
            return Err(Error::DiskPartition { disk, partition });
        }

        if !class.accepts(disk, partition) {
            return Err(Error::OutOfRange(spec.to_owned()));
        }

        // Both fit in a byte after the checks above.
        Ok(DeviceSpec {
            class,
            disk: disk as u8,
            partition: partition as u8,
        })
    }

    pub fn class(&self) -> DiskClass {
        self.class
    }

    /// Zero based disk index, `a` being 0.
    pub fn disk(&self) -> u8 {
        self.disk
    }

    pub fn partition(&self) -> u8 {
        self.partition
    }

    /// Packs the specification into its vbd.
    pub fn vbd(&self) -> Vbd {
        let disk = u32::from(self.disk);
        let part = u32::from(self.partition);

        let id = match self.class {
            DiskClass::Hd if disk < 2 => (HD_MAJOR << 8) | (disk << 6) | part,
            DiskClass::Hd => (HD_SECONDARY_MAJOR << 8) | ((disk - 2) << 6) | part,
            DiskClass::Sd => (SD_MAJOR << 8) | (disk << 4) | part,
            DiskClass::Xvd if disk < 16 => (XVD_MAJOR << 8) | (disk << 4) | part,
            DiskClass::Xvd => XVD_EXTENDED | (disk << 8) | part,
        };
        Vbd(id)
    }
}

impl fmt::Display for DeviceSpec {
    /// Formats the canonical name without the prefix, e.g. `xvdb1`. Partition 0 is omitted.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.class.tag(), char::from(b'a' + self.disk))?;
        if self.partition != 0 {
            write!(f, "{}", self.partition)?;
        }
        Ok(())
    }
}

/// Translates a device name into its vbd.
pub fn parse_device_name(name: &str) -> Result<Vbd> {
    DeviceSpec::parse(name).map(|spec| spec.vbd())
}
