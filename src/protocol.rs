//! # Wire Protocol
//!
//! Outbound traffic is a sequence of frames, each an `END` byte followed by a one byte opcode
//! and, for `Fill`, the SLIP encoded image.  A transmission is always padded with no-op filler
//! to a multiple of `CHUNK_SIZE`, which is the unit the device side moves across its SPI link.
//!
//! The device only has two opcode slots per operation in each range, so drives 0-1 and 2-3
//! use disjoint ranges.  This is captured in a lookup table, the rest of the crate
//! only ever asks for an `Op` on a drive.
//!
//! Inbound traffic is `END`, drive number, track number, then one track of SLIP encoded data,
//! see `receive`.

use crate::slip;
use crate::drive;

pub const DRIVES: usize = 4;
/// bytes per track of an ADF image, 11 sectors of 512 bytes
pub const TRACK_BYTES: usize = 512 * 11;
/// bytes per track of a RAW (MFM) image
pub const RAW_TRACK_BYTES: usize = 12668;
pub const TRACKS_PER_DISK: usize = 2 * 80;
pub const CHUNK_SIZE: usize = 64;
/// size of the filler sent while an inbound transfer is stalled
pub const FILLER_SIZE: usize = 4096;

pub const OP_NOP: u8 = 0x00;

/// Operations the device understands, each one exists once per drive
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Op {
    Insert,
    Eject,
    Fill,
    Protect,
    Unprotect,
    TypeAdf,
    TypeRaw
}

const OPCODES: [[u8;DRIVES];7] = [
    [0x01,0x02,0x11,0x12],
    [0x03,0x04,0x13,0x14],
    [0x05,0x06,0x15,0x16],
    [0x07,0x08,0x17,0x18],
    [0x09,0x0a,0x19,0x1a],
    [0x1b,0x1c,0x1d,0x1e],
    [0x1f,0x20,0x21,0x22]
];

impl Op {
    /// Opcode for this operation on `drive`, or error if there is no such drive.
    pub fn code(&self,drive: usize) -> Result<u8,drive::Error> {
        match OPCODES[*self as usize].get(drive) {
            Some(code) => Ok(*code),
            None => Err(drive::Error::DriveOutOfRange(drive))
        }
    }
}

/// Number of filler bytes needed after `len` bytes.
/// A single byte cannot hold `END` plus a no-op, so that case gets a whole extra chunk.
pub fn padding_len(len: usize) -> usize {
    match (CHUNK_SIZE - len % CHUNK_SIZE) % CHUNK_SIZE {
        1 => CHUNK_SIZE + 1,
        n => n
    }
}

/// Builder for one outbound transmission.
/// Frames are accumulated and `finish` appends the padding.
pub struct Message {
    buf: Vec<u8>
}

impl Message {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }
    /// Start a frame with a raw opcode
    pub fn frame(mut self,opcode: u8) -> Self {
        self.buf.extend_from_slice(&[slip::END,opcode]);
        self
    }
    /// Start a frame for `op` addressed to `drive`
    pub fn op(self,op: Op,drive: usize) -> Result<Self,drive::Error> {
        Ok(self.frame(op.code(drive)?))
    }
    /// Append data to the current frame, escaping as needed
    pub fn payload(mut self,dat: &[u8]) -> Self {
        self.buf.append(&mut slip::encode(dat));
        self
    }
    /// Append `count` no-op bytes to the current frame
    pub fn filler(mut self,count: usize) -> Self {
        self.buf.resize(self.buf.len() + count,OP_NOP);
        self
    }
    pub fn finish(mut self) -> Vec<u8> {
        let pad = padding_len(self.buf.len());
        if pad > 0 {
            self.buf.push(slip::END);
            self.buf.resize(self.buf.len() + pad - 1,OP_NOP);
        }
        self.buf
    }
}

/// Single no-op frame, sent when the link is idle
pub fn keepalive() -> Vec<u8> {
    Message::new().frame(OP_NOP).finish()
}

/// One link unit of no-op, pushes a stalled inbound frame out of the device buffers
pub fn flush_filler() -> Vec<u8> {
    Message::new().frame(OP_NOP).filler(FILLER_SIZE - 2).finish()
}
