use log::error;

use super::error::{RecordError, RecordResult};
use super::page::RecordPage;
use super::record::{Record, Rid};
use crate::file::{DiskBufferPool, FileId, PageHandle, PageNum};

/// Runs `f` against a pinned page and guarantees the unpin on every exit
/// path, including errors.
fn with_page<T>(
    pool: &mut DiskBufferPool,
    file_id: FileId,
    page_num: PageNum,
    f: impl FnOnce(&mut DiskBufferPool, &PageHandle) -> RecordResult<T>,
) -> RecordResult<T> {
    let handle = pool.get_this_page(file_id, page_num)?;
    let result = f(pool, &handle);
    let unpinned = pool.unpin_page(handle);
    match result {
        Ok(value) => {
            unpinned?;
            Ok(value)
        }
        Err(e) => Err(e),
    }
}

/// Maps a table's paged data file into fixed-width record slots. Pages
/// ≥ 1 are record pages; page 0 belongs to the buffer pool.
pub struct RecordFileHandler {
    file_id: FileId,
    record_size: usize,
    /// Insertion hint so sequential inserts skip already-full pages.
    last_insert_page: PageNum,
}

impl RecordFileHandler {
    pub fn new(file_id: FileId, record_size: usize) -> RecordResult<Self> {
        if RecordPage::capacity(record_size) == 0 {
            return Err(RecordError::RecordTooLarge(record_size));
        }
        Ok(Self {
            file_id,
            record_size,
            last_insert_page: 1,
        })
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Store a record in the first free slot, allocating a fresh page when
    /// every existing page is full. Returns the slot's RID.
    pub fn insert_record(&mut self, pool: &mut DiskBufferPool, data: &[u8]) -> RecordResult<Rid> {
        if data.len() != self.record_size {
            return Err(RecordError::SizeMismatch {
                expected: self.record_size,
                actual: data.len(),
            });
        }

        let page_count = pool.page_count(self.file_id)?;
        let hint = self.last_insert_page.min(page_count.saturating_sub(1)).max(1);
        let candidates = (hint..page_count).chain(1..hint);
        for page_num in candidates {
            if !pool.is_page_allocated(self.file_id, page_num)? {
                continue;
            }
            if let Some(slot) = self.try_insert_into(pool, page_num, data)? {
                self.last_insert_page = page_num;
                return Ok(Rid::new(page_num, slot));
            }
        }

        // every page is full; extend the file
        let handle = pool.allocate_page(self.file_id)?;
        let page_num = handle.page_num();
        let result: Result<(), RecordError> = (|| {
            {
                let mut page = RecordPage::init(pool.page_data_mut(&handle), self.record_size)?;
                page.set_record(0, data)?;
                page.mark_slot_used(0)?;
            }
            pool.mark_dirty(&handle);
            Ok(())
        })();
        let unpinned = pool.unpin_page(handle);
        result?;
        unpinned?;
        self.last_insert_page = page_num;
        Ok(Rid::new(page_num, 0))
    }

    fn try_insert_into(
        &self,
        pool: &mut DiskBufferPool,
        page_num: PageNum,
        data: &[u8],
    ) -> RecordResult<Option<usize>> {
        with_page(pool, self.file_id, page_num, |pool, handle| {
            let slot = {
                let mut page = RecordPage::from_buf(pool.page_data_mut(handle))?;
                let Some(slot) = page.find_free_slot() else {
                    return Ok(None);
                };
                page.set_record(slot, data)?;
                page.mark_slot_used(slot)?;
                slot
            };
            pool.mark_dirty(handle);
            Ok(Some(slot))
        })
    }

    /// Copy the record at `rid` out of its page.
    pub fn get_record(&self, pool: &mut DiskBufferPool, rid: &Rid) -> RecordResult<Record> {
        if rid.page_num == 0 {
            return Err(RecordError::InvalidRid(*rid));
        }
        let rid = *rid;
        with_page(pool, self.file_id, rid.page_num, |pool, handle| {
            let page = RecordPage::from_buf(pool.page_data_mut(handle))?;
            if !page.is_slot_used(rid.slot_num) {
                return Err(RecordError::InvalidRid(rid));
            }
            let data = page.record(rid.slot_num)?.to_vec();
            Ok(Record::with_rid(rid, data))
        })
    }

    /// Clear the record's slot. The page stays allocated even when this
    /// empties it.
    pub fn delete_record(&mut self, pool: &mut DiskBufferPool, rid: &Rid) -> RecordResult<()> {
        if rid.page_num == 0 {
            return Err(RecordError::InvalidRid(*rid));
        }
        let rid = *rid;
        with_page(pool, self.file_id, rid.page_num, |pool, handle| {
            {
                let mut page = RecordPage::from_buf(pool.page_data_mut(handle))?;
                if !page.is_slot_used(rid.slot_num) {
                    error!("delete of missing record {rid}");
                    return Err(RecordError::InvalidRid(rid));
                }
                page.mark_slot_free(rid.slot_num)?;
            }
            pool.mark_dirty(handle);
            Ok(())
        })
    }

    /// Overwrite the record bytes in place. Used by transaction
    /// finalization to restamp system fields.
    pub(crate) fn update_record(
        &mut self,
        pool: &mut DiskBufferPool,
        rid: &Rid,
        data: &[u8],
    ) -> RecordResult<()> {
        if data.len() != self.record_size {
            return Err(RecordError::SizeMismatch {
                expected: self.record_size,
                actual: data.len(),
            });
        }
        if rid.page_num == 0 {
            return Err(RecordError::InvalidRid(*rid));
        }
        let rid = *rid;
        with_page(pool, self.file_id, rid.page_num, |pool, handle| {
            {
                let mut page = RecordPage::from_buf(pool.page_data_mut(handle))?;
                if !page.is_slot_used(rid.slot_num) {
                    return Err(RecordError::InvalidRid(rid));
                }
                page.set_record(rid.slot_num, data)?;
            }
            pool.mark_dirty(handle);
            Ok(())
        })
    }
}
