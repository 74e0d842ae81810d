//! # Drive Slots
//!
//! Four slots, each either empty or holding an image file mapped into memory in its
//! entirety.  The mapping is shared with the file, so bytes written by the device land
//! in the image file without an explicit save step.
//!
//! The store is owned by the command processor, nothing else ever holds a reference to it.

use std::fs::{File,OpenOptions};
use memmap2::MmapMut;
use log::{debug,info,warn};
use crate::image::ImageKind;
use crate::protocol::DRIVES;
use crate::DYNERR;

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("drive {0} does not exist")]
    DriveOutOfRange(usize),
    #[error("image file is empty")]
    EmptyImage
}

/// Open file and its mapping, they live and die together
struct Mapping {
    map: MmapMut,
    _file: File
}

struct Slot {
    path: String,
    mapping: Option<Mapping>,
    kind: ImageKind,
    write_protected: bool
}

impl Slot {
    fn new() -> Self {
        Self {
            path: String::new(),
            mapping: None,
            kind: ImageKind::Other,
            write_protected: true
        }
    }
}

/// Snapshot of a slot for display
#[derive(PartialEq,Eq,Clone,Debug)]
pub struct SlotStatus {
    pub path: String,
    pub write_protected: bool,
    pub kind: ImageKind,
    pub size: usize
}

pub struct DriveStore {
    slots: [Slot;DRIVES]
}

impl DriveStore {
    /// All slots start empty and write protected
    pub fn new() -> Self {
        Self {
            slots: [Slot::new(),Slot::new(),Slot::new(),Slot::new()]
        }
    }
    fn slot(&self,drive: usize) -> Result<&Slot,Error> {
        self.slots.get(drive).ok_or(Error::DriveOutOfRange(drive))
    }
    fn slot_mut(&mut self,drive: usize) -> Result<&mut Slot,Error> {
        self.slots.get_mut(drive).ok_or(Error::DriveOutOfRange(drive))
    }
    /// Map the file at `path` into `drive`, closing whatever was there first.
    /// On failure the slot is left empty.
    pub fn insert(&mut self,drive: usize,path: &str) -> Result<&[u8],DYNERR> {
        self.close(drive)?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(Box::new(Error::EmptyImage));
        }
        // SAFETY: the file handle is kept next to the map for as long as the map lives.
        // Changes to the file by other processes show through, as with any shared mapping.
        let map = unsafe { MmapMut::map_mut(&file)? };
        let slot = self.slot_mut(drive)?;
        slot.kind = ImageKind::from_len(map.len());
        slot.path = path.to_string();
        info!("drive {}: mapped {} ({} bytes, {})",drive,path,map.len(),slot.kind);
        let mapping = slot.mapping.insert(Mapping { map, _file: file });
        Ok(&mapping.map[..])
    }
    /// Unmap and close the image in `drive`.  Returns false if the slot was already empty.
    pub fn close(&mut self,drive: usize) -> Result<bool,Error> {
        let slot = self.slot_mut(drive)?;
        match slot.mapping.take() {
            Some(mapping) => {
                if let Err(e) = mapping.map.flush() {
                    warn!("drive {}: flush of {} failed: {}",drive,slot.path,e);
                }
                debug!("drive {}: closed {}",drive,slot.path);
                slot.path = String::new();
                slot.kind = ImageKind::Other;
                Ok(true)
            },
            None => Ok(false)
        }
    }
    pub fn close_all(&mut self) {
        for drive in 0..DRIVES {
            let _ = self.close(drive);
        }
    }
    pub fn set_protection(&mut self,drive: usize,flag: bool) -> Result<(),Error> {
        self.slot_mut(drive)?.write_protected = flag;
        Ok(())
    }
    /// Nonexistent drives count as protected.
    pub fn is_protected(&self,drive: usize) -> bool {
        match self.slot(drive) {
            Ok(slot) => slot.write_protected,
            Err(_) => true
        }
    }
    pub fn kind(&self,drive: usize) -> ImageKind {
        match self.slot(drive) {
            Ok(slot) => slot.kind,
            Err(_) => ImageKind::Other
        }
    }
    pub fn image(&self,drive: usize) -> Option<&[u8]> {
        match self.slots.get(drive) {
            Some(slot) => slot.mapping.as_ref().map(|m| &m.map[..]),
            None => None
        }
    }
    pub fn image_mut(&mut self,drive: usize) -> Option<&mut [u8]> {
        match self.slots.get_mut(drive) {
            Some(slot) => slot.mapping.as_mut().map(|m| &mut m.map[..]),
            None => None
        }
    }
    /// Start writing back the given range without waiting for it
    pub fn flush_range(&self,drive: usize,offset: usize,len: usize) {
        if let Some(Some(mapping)) = self.slots.get(drive).map(|s| s.mapping.as_ref()) {
            if let Err(e) = mapping.map.flush_async_range(offset,len) {
                warn!("drive {}: flush failed: {}",drive,e);
            }
        }
    }
    pub fn status(&self) -> Vec<SlotStatus> {
        self.slots.iter().map(|slot| SlotStatus {
            path: slot.path.clone(),
            write_protected: slot.write_protected,
            kind: slot.kind,
            size: slot.mapping.as_ref().map_or(0,|m| m.map.len())
        }).collect()
    }
}

impl Drop for DriveStore {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_image(dat: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("could not create temp file");
        f.write_all(dat).expect("could not write temp file");
        f
    }

    #[test]
    fn starts_empty_and_protected() {
        let store = DriveStore::new();
        for stat in store.status() {
            assert_eq!(stat.path,"");
            assert!(stat.write_protected);
            assert_eq!(stat.size,0);
        }
        assert!(store.image(0).is_none());
        assert!(store.is_protected(7));
    }

    #[test]
    fn insert_maps_whole_file() {
        let f = temp_image(&[1,2,3,4,5]);
        let path = f.path().to_str().unwrap();
        let mut store = DriveStore::new();
        assert_eq!(store.insert(1,path).unwrap(),&[1,2,3,4,5]);
        assert_eq!(store.status()[1].path,path);
        assert_eq!(store.status()[1].size,5);
        assert_eq!(store.kind(1),ImageKind::Other);
    }

    #[test]
    fn reinsert_replaces_mapping() {
        let a = temp_image(&[0xaa;16]);
        let b = temp_image(&[0xbb;8]);
        let mut store = DriveStore::new();
        store.insert(0,a.path().to_str().unwrap()).unwrap();
        store.insert(0,b.path().to_str().unwrap()).unwrap();
        assert_eq!(store.image(0).unwrap(),&[0xbb;8]);
        assert_eq!(store.status()[0].path,b.path().to_str().unwrap());
    }

    #[test]
    fn failed_insert_leaves_slot_empty() {
        let a = temp_image(&[0xaa;16]);
        let mut store = DriveStore::new();
        store.insert(2,a.path().to_str().unwrap()).unwrap();
        assert!(store.insert(2,"/no/such/dir/image.adf").is_err());
        assert!(store.image(2).is_none());
        assert_eq!(store.status()[2].path,"");
        let empty = temp_image(&[]);
        assert!(store.insert(2,empty.path().to_str().unwrap()).is_err());
        assert_eq!(store.status()[2].path,"");
    }

    #[test]
    fn writes_reach_the_file() {
        let f = temp_image(&[0;32]);
        let mut store = DriveStore::new();
        store.insert(3,f.path().to_str().unwrap()).unwrap();
        store.image_mut(3).unwrap()[5] = 0x55;
        assert!(store.close(3).unwrap());
        assert_eq!(std::fs::read(f.path()).unwrap()[5],0x55);
    }

    #[test]
    fn close_is_idempotent() {
        let mut store = DriveStore::new();
        assert!(!store.close(0).unwrap());
        assert!(!store.close(0).unwrap());
        assert!(store.close(4).is_err());
        assert_eq!(store.status()[0].path,"");
    }

    #[test]
    fn protection_flag() {
        let mut store = DriveStore::new();
        store.set_protection(1,false).unwrap();
        assert!(!store.is_protected(1));
        assert!(store.is_protected(0));
        assert!(store.set_protection(9,false).is_err());
    }
}
