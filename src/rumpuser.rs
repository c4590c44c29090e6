// Copyright 2026 The solo5-bio Authors. All Rights Reserved.
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause

//! Flag and type values of the rumpuser hypercall interface that the backend understands.

/// Open for reading only.
pub const RUMPUSER_OPEN_RDONLY: i32 = 0x0000;
/// Open for writing only.
pub const RUMPUSER_OPEN_WRONLY: i32 = 0x0001;
/// Open for reading and writing.
pub const RUMPUSER_OPEN_RDWR: i32 = 0x0002;
/// The file will be used for block I/O. Opens without it are refused.
pub const RUMPUSER_OPEN_BIO: i32 = 0x0010;

/// Block I/O direction: read when set, write otherwise.
pub const RUMPUSER_BIO_READ: u32 = 0x01;
pub const RUMPUSER_BIO_WRITE: u32 = 0x02;
/// Synchronous request. Every request is synchronous here, so this is ignored.
pub const RUMPUSER_BIO_SYNC: u32 = 0x04;

/// File type reported for block devices.
pub const RUMPUSER_FT_BLK: i32 = 3;
