//! # Command Processor
//!
//! One thread owns the link to the device and all four drive slots.  Everything that can
//! change drive state or put bytes on the wire arrives here as a `Pending` message on a
//! single inbox and is handled strictly in arrival order:
//! * user commands from the gateway, each carrying its own reply channel
//! * chunks of inbound bytes from the socket reader
//! * ticks, synthesized here when the inbox stays quiet
//!
//! While an inbound transfer is in progress the inbox is polled without waiting, so that
//! the transfer is never held up by the tick interval.

use std::io::{self,Write};
use std::net::{Shutdown,TcpStream};
use std::time::Duration;
use crossbeam_channel as cb;
use log::{trace,debug,info,warn,error};
use crate::drive::{DriveStore,SlotStatus};
use crate::image::ImageKind;
use crate::protocol::{self,Message,Op};
use crate::receive::{TrackReceiver,RxEvent};

/// Outbound side of the connection as seen by the processor
pub trait Link: Write {
    /// Tear down the connection in both directions
    fn close(&mut self) -> io::Result<()>;
}

impl Link for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Commands that originate with the user
#[derive(PartialEq,Eq,Clone,Debug)]
pub enum UserCommand {
    Insert { drive: usize, path: String },
    Eject { drive: usize },
    SetProtection { drive: usize, flag: bool },
    Status
}

#[derive(PartialEq,Eq,Clone,Debug)]
pub enum Reply {
    Done,
    Status(Vec<SlotStatus>)
}

/// Outcome posted back to the gateway, failures carry a description
pub type Response = Result<Reply,String>;

pub enum Pending {
    User(UserCommand,cb::Sender<Response>),
    InboundBytes(Vec<u8>),
    Tick,
    Shutdown
}

/// Whether the loop keeps going after a message
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Flow {
    Continue,
    Stop
}

pub struct Processor<L: Link> {
    link: L,
    drives: DriveStore,
    rx: TrackReceiver,
    inbox: cb::Receiver<Pending>,
    tick: Duration,
    announce_type: bool,
    rx_count: usize
}

impl<L: Link> Processor<L> {
    /// With `announce_type`, inserts tell the device whether the image is ADF or RAW,
    /// and inbound RAW tracks use the MFM track size.
    pub fn new(link: L,inbox: cb::Receiver<Pending>,tick: Duration,announce_type: bool) -> Self {
        Self {
            link,
            drives: DriveStore::new(),
            rx: TrackReceiver::new(announce_type),
            inbox,
            tick,
            announce_type,
            rx_count: 0
        }
    }
    pub fn drives(&self) -> &DriveStore {
        &self.drives
    }
    pub fn link(&self) -> &L {
        &self.link
    }
    pub fn receiver(&self) -> &TrackReceiver {
        &self.rx
    }
    /// Next message, or a tick if nothing arrives in time.
    /// A vanished gateway is treated like a shutdown request.
    fn next(&self) -> Pending {
        if self.rx.is_idle() {
            match self.inbox.recv_timeout(self.tick) {
                Ok(msg) => msg,
                Err(cb::RecvTimeoutError::Timeout) => Pending::Tick,
                Err(cb::RecvTimeoutError::Disconnected) => Pending::Shutdown
            }
        } else {
            match self.inbox.try_recv() {
                Ok(msg) => msg,
                Err(cb::TryRecvError::Empty) => Pending::Tick,
                Err(cb::TryRecvError::Disconnected) => Pending::Shutdown
            }
        }
    }
    /// Run until shutdown.  A failed write to the link ends the loop with that error,
    /// the slots are closed either way.
    pub fn run(mut self) -> io::Result<()> {
        loop {
            let msg = self.next();
            match self.handle(msg) {
                Ok(Flow::Continue) => {},
                Ok(Flow::Stop) => return Ok(()),
                Err(e) => {
                    error!("link failed: {}",e);
                    let _ = self.link.close();
                    self.drives.close_all();
                    return Err(e);
                }
            }
        }
    }
    fn send(&mut self,dat: &[u8]) -> io::Result<()> {
        trace!("send {} bytes",dat.len());
        self.link.write_all(dat)?;
        self.link.flush()
    }
    pub fn handle(&mut self,msg: Pending) -> io::Result<Flow> {
        match msg {
            Pending::User(cmd,reply) => {
                debug!("{:?}",cmd);
                let (result,outcome) = self.execute(cmd);
                // the caller may have given up, nothing to do about it
                let _ = reply.send(result);
                outcome?;
            },
            Pending::InboundBytes(dat) => self.receive(&dat),
            Pending::Tick => {
                let dat = match self.rx.is_idle() {
                    true => protocol::keepalive(),
                    false => protocol::flush_filler()
                };
                self.send(&dat)?;
            },
            Pending::Shutdown => {
                debug!("shutting down");
                if let Err(e) = self.link.close() {
                    debug!("closing link: {}",e);
                }
                self.drives.close_all();
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }
    /// Carry out a user command.  Returns the response for the caller, and separately
    /// any link failure, which is fatal to the processor.
    fn execute(&mut self,cmd: UserCommand) -> (Response,io::Result<()>) {
        match cmd {
            UserCommand::Insert { drive, path } => {
                let msg = match self.insert_message(drive,&path) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("drive {}: cannot insert {}: {}",drive,path,e);
                        return (Err(e.to_string()),Ok(()));
                    }
                };
                self.send_and_reply(&msg)
            },
            UserCommand::Eject { drive } => {
                let msg = match self.drives.close(drive).and_then(|_| Message::new().op(Op::Eject,drive)) {
                    Ok(msg) => msg.finish(),
                    Err(e) => return (Err(e.to_string()),Ok(()))
                };
                self.send_and_reply(&msg)
            },
            UserCommand::SetProtection { drive, flag } => {
                let op = match flag {
                    true => Op::Protect,
                    false => Op::Unprotect
                };
                let msg = match self.drives.set_protection(drive,flag).and_then(|_| Message::new().op(op,drive)) {
                    Ok(msg) => msg.finish(),
                    Err(e) => return (Err(e.to_string()),Ok(()))
                };
                self.send_and_reply(&msg)
            },
            UserCommand::Status => (Ok(Reply::Status(self.drives.status())),Ok(()))
        }
    }
    fn send_and_reply(&mut self,msg: &[u8]) -> (Response,io::Result<()>) {
        match self.send(msg) {
            Ok(()) => (Ok(Reply::Done),Ok(())),
            Err(e) => (Err(e.to_string()),Err(e))
        }
    }
    /// Map the image and build the eject, fill, insert sequence that loads it into the device.
    fn insert_message(&mut self,drive: usize,path: &str) -> Result<Vec<u8>,crate::DYNERR> {
        // resolve opcodes before touching the slot
        let eject = Op::Eject.code(drive)?;
        let announce_type = self.announce_type;
        let data = self.drives.insert(drive,path)?;
        let mut msg = Message::new().frame(eject);
        match (announce_type,ImageKind::from_len(data.len())) {
            (true,ImageKind::Adf) => msg = msg.op(Op::TypeAdf,drive)?,
            (true,ImageKind::Raw) => msg = msg.op(Op::TypeRaw,drive)?,
            _ => {}
        }
        let msg = msg.op(Op::Fill,drive)?.payload(data).op(Op::Insert,drive)?.finish();
        debug!("drive {}: sending {} byte image as {} bytes",drive,data.len(),msg.len());
        Ok(msg)
    }
    fn receive(&mut self,dat: &[u8]) {
        trace!("recv {}",hex::encode(dat));
        self.rx_count += dat.len();
        for b in dat {
            match self.rx.feed(*b,&mut self.drives) {
                None => {},
                Some(RxEvent::TrackWritten { drive, track, offset, len }) => {
                    info!("drive {}: track {} written",drive,track);
                    self.drives.flush_range(drive,offset,len);
                },
                Some(RxEvent::Protected(drive)) => debug!("drive {}: write protected, ignoring track",drive),
                Some(RxEvent::FramingError(state)) => warn!("framing error while receiving {}",state),
                Some(RxEvent::NoSuchDrive(d)) => warn!("track write for nonexistent drive {}",d),
                Some(RxEvent::NoImage(drive)) => warn!("drive {}: track write with no image inserted",drive),
                Some(RxEvent::OutOfRange { drive, track }) => warn!("drive {}: track {} is beyond the image",drive,track)
            }
        }
        debug!("total rx bytes: {}, state: {}",self.rx_count,self.rx.state());
    }
}
