//! # Disk Images
//!
//! The controller treats images as flat byte arrays, but it does need to tell the two
//! layouts the device supports apart, and it can create blank images of either kind.
//! * ADF is the sector dump, 160 tracks of 11 × 512 bytes
//! * RAW is the MFM track dump, 160 tracks of 12668 bytes
//!
//! A blank ADF is formatted as an empty AmigaDOS OFS volume.

use std::fmt;
use std::str::FromStr;
use crate::protocol::{TRACK_BYTES,RAW_TRACK_BYTES,TRACKS_PER_DISK};
use crate::commands::CommandError;

pub const ADF_SIZE: usize = TRACK_BYTES * TRACKS_PER_DISK;
pub const RAW_SIZE: usize = RAW_TRACK_BYTES * TRACKS_PER_DISK;
pub const BLOCK_SIZE: usize = 512;
const ROOT_BLOCK: usize = 880;
const BITMAP_BLOCK: usize = 881;
const HASH_TABLE_SIZE: u32 = 72;
const T_HEADER: u32 = 2;
const ST_ROOT: u32 = 1;
pub const MAX_NAME_LEN: usize = 30;
const RAW_FILL: u8 = 0xaa;
/// 1978-01-01 in seconds since the unix epoch
const AMIGA_EPOCH: i64 = 252460800;

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum ImageKind {
    Adf,
    Raw,
    Other
}

impl ImageKind {
    pub fn from_len(len: usize) -> Self {
        match len {
            ADF_SIZE => Self::Adf,
            RAW_SIZE => Self::Raw,
            _ => Self::Other
        }
    }
}

impl FromStr for ImageKind {
    type Err = CommandError;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "adf" => Ok(Self::Adf),
            "raw" => Ok(Self::Raw),
            _ => Err(CommandError::UnsupportedImageKind)
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adf => write!(f,"adf"),
            Self::Raw => write!(f,"raw"),
            Self::Other => write!(f,"other")
        }
    }
}

/// AmigaDOS time stamp: days since 1978, minutes since midnight, ticks (1/50 s) in the minute
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub struct AmigaDate {
    pub days: u32,
    pub mins: u32,
    pub ticks: u32
}

impl AmigaDate {
    /// Convert from seconds since the unix epoch, dates before 1978 clamp to the epoch.
    pub fn from_unix(secs: i64) -> Self {
        let rel = (secs - AMIGA_EPOCH).max(0);
        Self {
            days: (rel / 86400) as u32,
            mins: ((rel % 86400) / 60) as u32,
            ticks: ((rel % 60) * 50) as u32
        }
    }
    /// Current local time, AmigaDOS has no notion of time zones.
    pub fn now() -> Self {
        Self::from_unix(chrono::Local::now().naive_local().and_utc().timestamp())
    }
    fn put(&self,block: &mut [u8],offset: usize) {
        put_long(block,offset,self.days);
        put_long(block,offset+4,self.mins);
        put_long(block,offset+8,self.ticks);
    }
}

fn put_long(block: &mut [u8],offset: usize,val: u32) {
    block[offset..offset+4].copy_from_slice(&val.to_be_bytes());
}

/// Value that makes the sum of all longs in the block zero.
/// The checksum slot itself must be zero when this is called.
fn block_checksum(block: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    for long in block.chunks(4) {
        sum = sum.wrapping_add(u32::from_be_bytes([long[0],long[1],long[2],long[3]]));
    }
    sum.wrapping_neg()
}

/// Disk name as stored in the root block, truncated at the first `.` and to 30 bytes.
fn volume_name(name: &str) -> &[u8] {
    let stem = match name.find('.') {
        Some(idx) => &name[0..idx],
        None => name
    };
    let bytes = stem.as_bytes();
    &bytes[0..bytes.len().min(MAX_NAME_LEN)]
}

/// Build an empty, non-bootable OFS volume.
pub fn blank_adf(name: &str,date: AmigaDate) -> Vec<u8> {
    let mut img = vec![0;ADF_SIZE];
    img[0..4].copy_from_slice(b"DOS\0");

    let root = &mut img[ROOT_BLOCK*BLOCK_SIZE..(ROOT_BLOCK+1)*BLOCK_SIZE];
    put_long(root,0x000,T_HEADER);
    put_long(root,0x00c,HASH_TABLE_SIZE);
    put_long(root,0x138,0xffffffff);
    put_long(root,0x13c,BITMAP_BLOCK as u32);
    date.put(root,0x1a4);
    let vol = volume_name(name);
    root[0x1b0] = vol.len() as u8;
    root[0x1b1..0x1b1+vol.len()].copy_from_slice(vol);
    date.put(root,0x1d8);
    date.put(root,0x1e4);
    put_long(root,0x1fc,ST_ROOT);
    let cksum = block_checksum(root);
    put_long(root,0x014,cksum);

    // one bit per block starting with block 2, set means free
    let bitmap = &mut img[BITMAP_BLOCK*BLOCK_SIZE..(BITMAP_BLOCK+1)*BLOCK_SIZE];
    let total_blocks = ADF_SIZE / BLOCK_SIZE;
    let longs = (total_blocks - 2 + 31) / 32;
    for i in 0..longs {
        put_long(bitmap,4+i*4,0xffffffff);
    }
    for used in [ROOT_BLOCK,BITMAP_BLOCK] {
        let bit = used - 2;
        let byte = 4 + (bit/32)*4 + 3 - (bit%32)/8;
        bitmap[byte] &= !(1 << (bit%8));
    }
    let cksum = block_checksum(bitmap);
    put_long(bitmap,0,cksum);
    img
}

/// Build an unformatted MFM track image
pub fn blank_raw() -> Vec<u8> {
    vec![RAW_FILL;RAW_SIZE]
}
