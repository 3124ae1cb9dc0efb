use std::sync::{Mutex, PoisonError};

use remoteio_transport::Vmo;

use crate::error::{Result, RioError};
use crate::remote::Whence;

/// A read-only window `[start, start + length)` of a memory object, with
/// its own seek position.
#[derive(Debug)]
pub struct VmoFile {
    vmo: Vmo,
    start: u64,
    length: u64,
    position: Mutex<u64>,
}

impl VmoFile {
    pub fn new(vmo: Vmo, start: u64, length: u64) -> Self {
        Self {
            vmo,
            start,
            length,
            position: Mutex::new(0),
        }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Read at a window offset; reads past the end are truncated.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if offset >= self.length {
            return Ok(0);
        }
        let at = self
            .start
            .checked_add(offset)
            .ok_or(RioError::InvalidArgs("window offset overflows"))?;
        let count = (self.length - offset).min(buf.len() as u64) as usize;
        self.vmo.read(&mut buf[..count], at)?;
        Ok(count)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        let count = self.read_at(buf, *position)?;
        *position += count as u64;
        Ok(count)
    }

    /// Move the position within the window.
    pub fn seek(&self, offset: i64, whence: Whence) -> Result<i64> {
        let length = i64::try_from(self.length).map_err(|_| RioError::InvalidArgs("window too large"))?;
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        let base = match whence {
            Whence::Set => 0,
            Whence::Current => *position as i64,
            Whence::End => length,
        };
        let target = base
            .checked_add(offset)
            .filter(|target| (0..=length).contains(target))
            .ok_or(RioError::InvalidArgs("seek outside the file"))?;
        *position = target as u64;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remoteio_transport::HandleTable;

    fn window() -> VmoFile {
        let table = HandleTable::new();
        let vmo = Vmo::create(&table, 64);
        vmo.write(b"....window-bytes....", 0).expect("vmo write");
        VmoFile::new(vmo, 4, 12)
    }

    #[test]
    fn reads_stay_inside_window() {
        let file = window();
        let mut buf = [0u8; 32];
        let n = file.read(&mut buf).expect("read");
        assert_eq!(&buf[..n], b"window-bytes");
        assert_eq!(file.read(&mut buf).expect("read at end"), 0);
        assert_eq!(file.read_at(&mut buf[..3], 7).expect("read_at"), 3);
        assert_eq!(&buf[..3], b"byt");
    }

    #[test]
    fn seek_is_bounded() {
        let file = window();
        assert_eq!(file.seek(-5, Whence::End).expect("seek"), 7);
        let mut buf = [0u8; 5];
        assert_eq!(file.read(&mut buf).expect("read"), 5);
        assert_eq!(&buf, b"bytes");
        assert!(file.seek(1, Whence::End).is_err());
        assert!(file.seek(-1, Whence::Set).is_err());
        assert_eq!(file.seek(0, Whence::Current).expect("seek"), 12);
    }

    #[test]
    fn window_past_the_address_space_errors_instead_of_wrapping() {
        let table = HandleTable::new();
        let file = VmoFile::new(Vmo::create(&table, 16), u64::MAX, 16);
        let mut buf = [0u8; 4];
        assert!(matches!(
            file.read_at(&mut buf, 4),
            Err(RioError::InvalidArgs(_))
        ));

        let huge = VmoFile::new(Vmo::create(&table, 16), 0, u64::MAX);
        assert!(matches!(
            huge.seek(0, Whence::Set),
            Err(RioError::InvalidArgs("window too large"))
        ));
    }
}
