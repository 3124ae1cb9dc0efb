use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, Status};
use crate::handle::{handle_based, Handle, HandleTable, Object, ObjectKind};

pub(crate) struct VmoObject {
    pages: Mutex<Vec<u8>>,
}

impl VmoObject {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed-size shared memory object.
#[derive(Debug)]
pub struct Vmo(Handle);

handle_based!(Vmo, ObjectKind::Vmo);

fn range(offset: u64, len: usize, size: usize) -> Result<std::ops::Range<usize>> {
    let start = usize::try_from(offset).map_err(|_| Status::OUT_OF_RANGE)?;
    let end = start.checked_add(len).ok_or(Status::OUT_OF_RANGE)?;
    if end > size {
        return Err(Status::OUT_OF_RANGE);
    }
    Ok(start..end)
}

impl Vmo {
    /// Create a zero-filled object of `size` bytes.
    pub fn create(table: &Arc<HandleTable>, size: usize) -> Vmo {
        Vmo(table.install(Object::Vmo(Arc::new(VmoObject {
            pages: Mutex::new(vec![0; size]),
        }))))
    }

    fn object(&self) -> &VmoObject {
        match self.0.object() {
            Object::Vmo(vmo) => vmo,
            _ => unreachable!("Vmo always wraps a vmo handle"),
        }
    }

    pub fn size(&self) -> u64 {
        self.object().lock().len() as u64
    }

    /// Fill `buf` from `offset`. The whole range must lie inside the object.
    pub fn read(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let pages = self.object().lock();
        let range = range(offset, buf.len(), pages.len())?;
        buf.copy_from_slice(&pages[range]);
        Ok(())
    }

    /// Store `data` at `offset`. The whole range must lie inside the object.
    pub fn write(&self, data: &[u8], offset: u64) -> Result<()> {
        let mut pages = self.object().lock();
        let range = range(offset, data.len(), pages.len())?;
        pages[range].copy_from_slice(data);
        Ok(())
    }
}
