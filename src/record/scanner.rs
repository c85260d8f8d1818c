use super::error::{RecordError, RecordResult};
use super::page::RecordPage;
use super::record::{Record, Rid, SlotNum};
use crate::file::{DiskBufferPool, FileId, PageHandle, PageNum};
use crate::table::ConditionFilter;

/// Forward-only iteration over every live record of a data file, one
/// pinned page at a time. Records failing the filter are skipped. The
/// sequence ends with `RecordError::Eof`; `close_scan` releases the
/// current pin and must run on every exit path.
pub struct RecordFileScanner<'f> {
    file_id: FileId,
    filter: Option<&'f ConditionFilter>,
    next_page: PageNum,
    next_slot: SlotNum,
    current: Option<PageHandle>,
}

impl<'f> RecordFileScanner<'f> {
    pub fn open_scan(file_id: FileId, filter: Option<&'f ConditionFilter>) -> Self {
        Self {
            file_id,
            filter,
            next_page: 1,
            next_slot: 0,
            current: None,
        }
    }

    pub fn next_record(&mut self, pool: &mut DiskBufferPool) -> RecordResult<Record> {
        loop {
            let handle = match self.current.take() {
                Some(handle) => handle,
                None => {
                    let Some(handle) = self.pin_next_page(pool)? else {
                        return Err(RecordError::Eof);
                    };
                    self.next_slot = 0;
                    handle
                }
            };

            match self.scan_page(pool, &handle) {
                Ok(Some(record)) => {
                    self.current = Some(handle);
                    return Ok(record);
                }
                Ok(None) => pool.unpin_page(handle)?,
                Err(e) => {
                    let _ = pool.unpin_page(handle);
                    return Err(e);
                }
            }
        }
    }

    pub fn close_scan(&mut self, pool: &mut DiskBufferPool) -> RecordResult<()> {
        if let Some(handle) = self.current.take() {
            pool.unpin_page(handle)?;
        }
        Ok(())
    }

    /// Pin the next allocated page, skipping bitmap holes left by
    /// disposed pages.
    fn pin_next_page(&mut self, pool: &mut DiskBufferPool) -> RecordResult<Option<PageHandle>> {
        let page_count = pool.page_count(self.file_id)?;
        while self.next_page < page_count {
            let page_num = self.next_page;
            self.next_page += 1;
            if pool.is_page_allocated(self.file_id, page_num)? {
                return Ok(Some(pool.get_this_page(self.file_id, page_num)?));
            }
        }
        Ok(None)
    }

    fn scan_page(
        &mut self,
        pool: &mut DiskBufferPool,
        handle: &PageHandle,
    ) -> RecordResult<Option<Record>> {
        let page_num = handle.page_num();
        let page = RecordPage::from_buf(pool.page_data_mut(handle))?;
        while self.next_slot < page.slot_count() {
            let slot = self.next_slot;
            self.next_slot += 1;
            if !page.is_slot_used(slot) {
                continue;
            }
            let data = page.record(slot)?;
            if self.filter.is_none_or(|f| f.matches(data)) {
                return Ok(Some(Record::with_rid(Rid::new(page_num, slot), data.to_vec())));
            }
        }
        Ok(None)
    }
}
