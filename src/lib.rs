//! # `phloppy` main library
//!
//! This library runs the host side of a floppy drive emulator that sits on the far end
//! of a TCP connection.  Up to four disk image files are mapped into memory, pushed to the
//! device when inserted, and updated in place whenever the emulated drive writes a track.
//!
//! ## Architecture
//!
//! All state lives with a single command processor thread (`processor`):
//! * it is the only writer to the socket
//! * it owns the four drive slots (`drive`) and is the only writer to the mapped images
//! * it runs the inbound state machine (`receive`) over every byte the device sends
//!
//! A socket reader thread forwards raw inbound chunks to the processor, and the front end
//! talks to it through the `emulator::Emulator` handle, which blocks until each command
//! has been carried out.  Messages are handled strictly in the order they arrive.
//!
//! ## Wire Format
//!
//! Both directions use SLIP framing (`slip`).  Outbound messages are opcode frames padded
//! with no-ops to 64 byte chunks, inbound messages carry one track of a drive (`protocol`).
//!
//! ## Disk Images
//!
//! Images are flat byte arrays.  The `image` module tells ADF and RAW images apart by
//! size and can create blank ones.

pub mod slip;
pub mod protocol;
pub mod image;
pub mod drive;
pub mod receive;
pub mod processor;
pub mod emulator;
pub mod commands;

pub type DYNERR = Box<dyn std::error::Error>;
pub type STDRESULT = Result<(),Box<dyn std::error::Error>>;
