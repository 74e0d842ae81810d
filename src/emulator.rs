//! # Emulator Connection
//!
//! `Emulator` is the handle the front end holds.  Connecting starts two threads:
//! * the socket reader, which only forwards whatever it reads to the processor inbox
//! * the command processor, which owns the socket and the drive slots
//!
//! Calls on the handle post a command to the inbox and block until the processor answers.
//! They take `&mut self`, so one caller can never have two commands in flight.

use std::io::{self,Read};
use std::net::{Shutdown,TcpStream};
use std::thread::{self,JoinHandle};
use std::time::Duration;
use crossbeam_channel as cb;
use log::{debug,info};
use crate::drive::SlotStatus;
use crate::processor::{Pending,Processor,Reply,UserCommand};
use crate::{STDRESULT,DYNERR};

pub const DEFAULT_ADDRESS: &str = "192.168.4.1";
pub const DEFAULT_PORT: u16 = 4500;
pub const DEFAULT_TICK_MS: u64 = 500;
const READ_SIZE: usize = 4096;

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("command processor is not running")]
    Disconnected,
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected reply from command processor")]
    UnexpectedReply
}

#[derive(Clone,Debug)]
pub struct EmulatorConfig {
    pub address: String,
    pub port: u16,
    /// idle time before a keepalive is sent
    pub tick: Duration,
    /// tell the device the image type on insert
    pub announce_type: bool
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            announce_type: false
        }
    }
}

/// What a front end needs from the drives
pub trait DriveControl {
    /// Load the image at `path` into `drive`, replacing any image already there
    fn insert(&mut self,drive: usize,path: &str) -> STDRESULT;
    fn eject(&mut self,drive: usize) -> STDRESULT;
    fn set_protection(&mut self,drive: usize,flag: bool) -> STDRESULT;
    fn status(&mut self) -> Result<Vec<SlotStatus>,DYNERR>;
}

fn spawn_reader(mut stream: TcpStream,inbox: cb::Sender<Pending>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("phloppy-reader".to_string()).spawn(move || {
        let mut buf = [0;READ_SIZE];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    info!("device closed the connection");
                    break;
                },
                Ok(n) => {
                    if inbox.send(Pending::InboundBytes(buf[0..n].to_vec())).is_err() {
                        break;
                    }
                },
                Err(e) => {
                    debug!("socket reader stopping: {}",e);
                    break;
                }
            }
        }
    })
}

/// Unblock the reader by tearing down the socket under it, then wait for it
fn stop_reader(stream: &TcpStream,reader: JoinHandle<()>) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!("shutting down socket: {}",e);
    }
    let _ = reader.join();
}

pub struct Emulator {
    inbox: cb::Sender<Pending>,
    processor: Option<JoinHandle<io::Result<()>>>,
    reader: Option<JoinHandle<()>>
}

impl Emulator {
    /// Connect to the device and start serving it
    pub fn connect(config: &EmulatorConfig) -> Result<Self,DYNERR> {
        let stream = TcpStream::connect((config.address.as_str(),config.port))?;
        info!("connected to {}:{}",config.address,config.port);
        Self::start(stream,config)
    }
    /// Start serving a device on an already open connection
    pub fn start(stream: TcpStream,config: &EmulatorConfig) -> Result<Self,DYNERR> {
        let (tx,rx) = cb::unbounded();
        let guard = stream.try_clone()?;
        let reader = spawn_reader(stream.try_clone()?,tx.clone())?;
        let tick = config.tick;
        let announce_type = config.announce_type;
        let spawned = thread::Builder::new().name("phloppy-processor".to_string()).spawn(move || {
            Processor::new(stream,rx,tick,announce_type).run()
        });
        let processor = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                stop_reader(&guard,reader);
                return Err(Box::new(e));
            }
        };
        Ok(Self {
            inbox: tx,
            processor: Some(processor),
            reader: Some(reader)
        })
    }
    fn request(&mut self,cmd: UserCommand) -> Result<Reply,Error> {
        let (tx,rx) = cb::bounded(1);
        self.inbox.send(Pending::User(cmd,tx)).map_err(|_| Error::Disconnected)?;
        match rx.recv() {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(msg)) => Err(Error::Rejected(msg)),
            Err(_) => Err(Error::Disconnected)
        }
    }
    fn request_done(&mut self,cmd: UserCommand) -> STDRESULT {
        match self.request(cmd)? {
            Reply::Done => Ok(()),
            _ => Err(Box::new(Error::UnexpectedReply))
        }
    }
    /// Shut down the processor after everything already queued, and wait for both threads.
    /// If the processor had already died on a link failure, that failure is returned.
    pub fn close(mut self) -> STDRESULT {
        self.shutdown()
    }
    fn shutdown(&mut self) -> STDRESULT {
        let _ = self.inbox.send(Pending::Shutdown);
        let mut ans: STDRESULT = Ok(());
        if let Some(handle) = self.processor.take() {
            ans = match handle.join() {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Box::new(e)),
                Err(_) => Err(Box::new(Error::Disconnected))
            };
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        debug!("emulator closed");
        ans
    }
}

impl DriveControl for Emulator {
    fn insert(&mut self,drive: usize,path: &str) -> STDRESULT {
        self.request_done(UserCommand::Insert { drive, path: path.to_string() })
    }
    fn eject(&mut self,drive: usize) -> STDRESULT {
        self.request_done(UserCommand::Eject { drive })
    }
    fn set_protection(&mut self,drive: usize,flag: bool) -> STDRESULT {
        self.request_done(UserCommand::SetProtection { drive, flag })
    }
    fn status(&mut self) -> Result<Vec<SlotStatus>,DYNERR> {
        match self.request(UserCommand::Status)? {
            Reply::Status(stat) => Ok(stat),
            _ => Err(Box::new(Error::UnexpectedReply))
        }
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        if self.processor.is_some() {
            let _ = self.shutdown();
        }
    }
}
