//! # SLIP Framing
//!
//! Both directions of the link use SLIP style byte stuffing.  The `END` byte marks the
//! start of a message, and the `ESC` byte introduces one of two reserved successors
//! that stand for a literal `END` or `ESC`.
//!
//! Encoding is a pure function of the input.  Decoding happens one byte at a time, because
//! inbound data arrives in arbitrary chunks, so the decoder only remembers whether the
//! previous byte was an escape.

pub const END: u8 = 0xc0;
pub const ESC: u8 = 0xdb;
pub const ESC_END: u8 = 0xdc;
pub const ESC_ESC: u8 = 0xdd;

/// Result of decoding a single wire byte
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Symbol {
    /// literal data byte, possibly recovered from an escape sequence
    Data(u8),
    /// unescaped frame delimiter
    End,
    /// first half of an escape sequence, carries no data by itself
    Escape,
    /// escape followed by something other than `ESC_END` or `ESC_ESC`
    Error
}

/// Escape every `END` and `ESC` in `data`.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut ans = Vec::with_capacity(data.len() + data.len()/64);
    for b in data {
        match *b {
            END => ans.extend_from_slice(&[ESC,ESC_END]),
            ESC => ans.extend_from_slice(&[ESC,ESC_ESC]),
            x => ans.push(x)
        }
    }
    ans
}

/// Stateful per-byte inverse of `encode`.
#[derive(Default)]
pub struct Decoder {
    escaping: bool
}

impl Decoder {
    pub fn new() -> Self {
        Self { escaping: false }
    }
    pub fn decode(&mut self,b: u8) -> Symbol {
        if self.escaping {
            self.escaping = false;
            return match b {
                ESC_END => Symbol::Data(END),
                ESC_ESC => Symbol::Data(ESC),
                _ => Symbol::Error
            };
        }
        match b {
            END => Symbol::End,
            ESC => {
                self.escaping = true;
                Symbol::Escape
            },
            x => Symbol::Data(x)
        }
    }
}
