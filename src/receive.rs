//! # Inbound Track Writes
//!
//! When the emulated drive is written to, the device sends the whole track back:
//! `END`, drive number, track number, then exactly one track of data, all SLIP encoded.
//! This state machine consumes the raw socket bytes one at a time and copies the
//! track straight into the mapped image of the target drive.
//!
//! Any framing problem abandons the transfer, the next `END` starts over.  A write
//! aimed at a protected drive is dropped as soon as the drive number is seen.

use std::fmt;
use log::trace;
use crate::slip::{Decoder,Symbol};
use crate::drive::DriveStore;
use crate::image::ImageKind;
use crate::protocol::{DRIVES,TRACK_BYTES,RAW_TRACK_BYTES};

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum RxState {
    Idle,
    DriveNumber,
    Track,
    Transfer
}

impl fmt::Display for RxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f,"idle"),
            Self::DriveNumber => write!(f,"drive number"),
            Self::Track => write!(f,"track number"),
            Self::Transfer => write!(f,"track data")
        }
    }
}

/// Noteworthy outcomes, reported back to the caller for logging
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum RxEvent {
    /// a whole track landed in the image
    TrackWritten { drive: usize, track: usize, offset: usize, len: usize },
    /// unexpected `END` or bad escape, the state that was interrupted
    FramingError(RxState),
    /// drive number byte does not name a drive
    NoSuchDrive(u8),
    /// write to a protected drive, silently dropped by design of the device
    Protected(usize),
    /// drive is unprotected but has no image
    NoImage(usize),
    /// track lies beyond the end of the image
    OutOfRange { drive: usize, track: usize }
}

/// Position of a transfer that is in progress
struct Cursor {
    drive: usize,
    track: usize,
    start: usize,
    offset: usize,
    end: usize
}

pub struct TrackReceiver {
    decoder: Decoder,
    state: RxState,
    cursor: Cursor,
    raw_tracks: bool
}

impl TrackReceiver {
    /// If `raw_tracks` is set, RAW images are addressed in MFM track units.
    /// Otherwise every track is `TRACK_BYTES`.
    pub fn new(raw_tracks: bool) -> Self {
        Self {
            decoder: Decoder::new(),
            state: RxState::Idle,
            cursor: Cursor { drive: 0, track: 0, start: 0, offset: 0, end: 0 },
            raw_tracks
        }
    }
    pub fn state(&self) -> RxState {
        self.state
    }
    pub fn is_idle(&self) -> bool {
        self.state == RxState::Idle
    }
    fn track_bytes(&self,drives: &DriveStore,drive: usize) -> usize {
        match (self.raw_tracks,drives.kind(drive)) {
            (true,ImageKind::Raw) => RAW_TRACK_BYTES,
            _ => TRACK_BYTES
        }
    }
    fn abort(&mut self) -> Option<RxEvent> {
        let interrupted = self.state;
        self.state = RxState::Idle;
        Some(RxEvent::FramingError(interrupted))
    }
    /// Consume one byte off the wire.
    pub fn feed(&mut self,b: u8,drives: &mut DriveStore) -> Option<RxEvent> {
        let sym = self.decoder.decode(b);
        match (self.state,sym) {
            (RxState::Idle,Symbol::End) => {
                self.state = RxState::DriveNumber;
                None
            },
            (RxState::Idle,_) => None,
            (_,Symbol::Escape) => None,
            (_,Symbol::End) | (_,Symbol::Error) => self.abort(),
            (RxState::DriveNumber,Symbol::Data(d)) => {
                let drive = d as usize;
                self.state = RxState::Idle;
                if drive >= DRIVES {
                    return Some(RxEvent::NoSuchDrive(d));
                }
                if drives.is_protected(drive) {
                    return Some(RxEvent::Protected(drive));
                }
                if drives.image(drive).is_none() {
                    return Some(RxEvent::NoImage(drive));
                }
                self.cursor.drive = drive;
                self.state = RxState::Track;
                None
            },
            (RxState::Track,Symbol::Data(t)) => {
                let drive = self.cursor.drive;
                let track = t as usize;
                let len = self.track_bytes(drives,drive);
                let size = drives.image(drive).map_or(0,|img| img.len());
                self.state = RxState::Idle;
                if (track+1)*len > size {
                    return Some(RxEvent::OutOfRange { drive, track });
                }
                trace!("receiving drive {} track {}",drive,track);
                self.cursor.track = track;
                self.cursor.start = track*len;
                self.cursor.offset = self.cursor.start;
                self.cursor.end = self.cursor.start + len;
                self.state = RxState::Transfer;
                None
            },
            (RxState::Transfer,Symbol::Data(x)) => {
                let c = &mut self.cursor;
                // protection may have been switched on mid-track
                if drives.is_protected(c.drive) {
                    self.state = RxState::Idle;
                    return Some(RxEvent::Protected(c.drive));
                }
                match drives.image_mut(c.drive) {
                    Some(img) if c.offset < img.len() => img[c.offset] = x,
                    _ => {
                        // image went away underneath us, cannot happen while the processor owns both
                        self.state = RxState::Idle;
                        return Some(RxEvent::NoImage(c.drive));
                    }
                }
                c.offset += 1;
                if c.offset < c.end {
                    return None;
                }
                self.state = RxState::Idle;
                Some(RxEvent::TrackWritten { drive: c.drive, track: c.track, offset: c.start, len: c.end - c.start })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use crate::slip;

    fn store_with_image(drive: usize,size: usize,protected: bool) -> (DriveStore,tempfile::NamedTempFile) {
        let mut f = tempfile::NamedTempFile::new().expect("could not create temp file");
        f.write_all(&vec![0;size]).expect("could not write temp file");
        let mut store = DriveStore::new();
        store.insert(drive,f.path().to_str().unwrap()).expect("insert failed");
        store.set_protection(drive,protected).unwrap();
        (store,f)
    }

    fn feed_all(rx: &mut TrackReceiver,store: &mut DriveStore,dat: &[u8]) -> Vec<RxEvent> {
        dat.iter().filter_map(|b| rx.feed(*b,store)).collect()
    }

    fn track_payload() -> Vec<u8> {
        (0..TRACK_BYTES).map(|i| (i % 251) as u8).collect()
    }

    fn frame(drive: u8,track: u8,payload: &[u8]) -> Vec<u8> {
        let mut ans = vec![slip::END,drive,track];
        ans.append(&mut slip::encode(payload));
        ans
    }

    #[test]
    fn writes_one_track() {
        let (mut store,_f) = store_with_image(1,TRACK_BYTES*4,false);
        let mut rx = TrackReceiver::new(false);
        let payload = track_payload();
        let mut wire = frame(1,0,&payload);
        wire.push(slip::END);
        let events = feed_all(&mut rx,&mut store,&wire[0..wire.len()-1]);
        assert_eq!(events,vec![RxEvent::TrackWritten { drive: 1, track: 0, offset: 0, len: TRACK_BYTES }]);
        assert!(rx.is_idle());
        assert_eq!(&store.image(1).unwrap()[0..TRACK_BYTES],&payload[..]);
        assert!(store.image(1).unwrap()[TRACK_BYTES..].iter().all(|b| *b==0));
        // trailing END opens the next frame
        assert!(feed_all(&mut rx,&mut store,&wire[wire.len()-1..]).is_empty());
        assert_eq!(rx.state(),RxState::DriveNumber);
    }

    #[test]
    fn track_offset_and_escapes() {
        let (mut store,_f) = store_with_image(0,TRACK_BYTES*4,false);
        let mut rx = TrackReceiver::new(false);
        let mut payload = track_payload();
        payload[0] = slip::END;
        payload[1] = slip::ESC;
        payload[TRACK_BYTES-1] = slip::END;
        let events = feed_all(&mut rx,&mut store,&frame(0,2,&payload));
        assert_eq!(events.len(),1);
        assert_eq!(&store.image(0).unwrap()[2*TRACK_BYTES..3*TRACK_BYTES],&payload[..]);
        assert!(store.image(0).unwrap()[0..2*TRACK_BYTES].iter().all(|b| *b==0));
    }

    #[test]
    fn protected_drive_is_untouched() {
        let payload = vec![0x5a;TRACK_BYTES];
        for track in [0,1,3] {
            let (mut store,_f) = store_with_image(2,TRACK_BYTES*4,true);
            let mut rx = TrackReceiver::new(false);
            let events = feed_all(&mut rx,&mut store,&frame(2,track,&payload));
            assert_eq!(events,vec![RxEvent::Protected(2)]);
            assert!(store.image(2).unwrap().iter().all(|b| *b==0));
            assert!(rx.is_idle());
        }
    }

    #[test]
    fn empty_or_missing_drive() {
        let (mut store,_f) = store_with_image(0,TRACK_BYTES,false);
        store.set_protection(3,false).unwrap();
        let mut rx = TrackReceiver::new(false);
        assert_eq!(feed_all(&mut rx,&mut store,&[slip::END,3,0,1,2]),vec![RxEvent::NoImage(3)]);
        assert_eq!(feed_all(&mut rx,&mut store,&[slip::END,9,0,1,2]),vec![RxEvent::NoSuchDrive(9)]);
        assert!(rx.is_idle());
    }

    #[test]
    fn track_beyond_image() {
        let (mut store,_f) = store_with_image(0,TRACK_BYTES*2,false);
        let mut rx = TrackReceiver::new(false);
        let events = feed_all(&mut rx,&mut store,&frame(0,2,&[1;16]));
        assert_eq!(events,vec![RxEvent::OutOfRange { drive: 0, track: 2 }]);
        assert!(store.image(0).unwrap().iter().all(|b| *b==0));
    }

    #[test]
    fn framing_errors_resynchronize() {
        let (mut store,_f) = store_with_image(1,TRACK_BYTES*2,false);
        let mut rx = TrackReceiver::new(false);
        // premature END in the middle of the data
        let events = feed_all(&mut rx,&mut store,&[slip::END,1,0,7,7,slip::END]);
        assert_eq!(events,vec![RxEvent::FramingError(RxState::Transfer)]);
        assert!(rx.is_idle());
        // bad escape while reading the track number
        let events = feed_all(&mut rx,&mut store,&[slip::END,1,slip::ESC,0x00]);
        assert_eq!(events,vec![RxEvent::FramingError(RxState::Track)]);
        // END while expecting a drive number
        let events = feed_all(&mut rx,&mut store,&[slip::END,slip::END]);
        assert_eq!(events,vec![RxEvent::FramingError(RxState::DriveNumber)]);
        // a clean frame afterwards still goes through
        let payload = track_payload();
        let events = feed_all(&mut rx,&mut store,&frame(1,1,&payload));
        assert_eq!(events.len(),1);
        assert_eq!(&store.image(1).unwrap()[TRACK_BYTES..],&payload[..]);
        // the two bytes written before the abort stay where they were
        assert_eq!(&store.image(1).unwrap()[0..3],&[7,7,0]);
    }

    #[test]
    fn escaped_header_bytes() {
        // an escaped END is a legitimate track number
        let (mut store,_f) = store_with_image(0,TRACK_BYTES*(slip::END as usize + 1),false);
        let mut rx = TrackReceiver::new(false);
        let mut wire = vec![slip::END,0,slip::ESC,slip::ESC_END];
        wire.append(&mut slip::encode(&[3;TRACK_BYTES]));
        let events = feed_all(&mut rx,&mut store,&wire);
        assert_eq!(events,vec![RxEvent::TrackWritten { drive: 0, track: 0xc0, offset: 0xc0*TRACK_BYTES, len: TRACK_BYTES }]);
    }

    #[test]
    fn raw_tracks_when_typed() {
        let (mut store,_f) = store_with_image(0,crate::image::RAW_SIZE,false);
        let mut rx = TrackReceiver::new(true);
        let events = feed_all(&mut rx,&mut store,&frame(0,1,&vec![9;RAW_TRACK_BYTES]));
        assert_eq!(events,vec![RxEvent::TrackWritten { drive: 0, track: 1, offset: RAW_TRACK_BYTES, len: RAW_TRACK_BYTES }]);
    }

    #[test]
    fn protect_during_transfer() {
        let (mut store,_f) = store_with_image(0,TRACK_BYTES*2,false);
        let mut rx = TrackReceiver::new(false);
        let events = feed_all(&mut rx,&mut store,&[slip::END,0,0,1,1]);
        assert!(events.is_empty());
        assert_eq!(rx.state(),RxState::Transfer);
        store.set_protection(0,true).unwrap();
        let events = feed_all(&mut rx,&mut store,&[0x77;16]);
        assert_eq!(events,vec![RxEvent::Protected(0)]);
        assert!(rx.is_idle());
        assert_eq!(&store.image(0).unwrap()[0..6],&[1,1,0,0,0,0]);
    }
}
