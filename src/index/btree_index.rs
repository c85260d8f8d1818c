use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::path::Path;

use log::{debug, info};

use super::error::{IndexError, IndexResult};
use super::key::IndexKey;
use crate::file::{DiskBufferPool, FileId, PageNum, PAGE_DATA_SIZE};
use crate::record::Rid;
use crate::table::{CompOp, FieldMeta, IndexMeta, Value};

/// Per-page prefix: number of entries stored in the page
const ENTRY_COUNT_SIZE: usize = 2;

/// Ordered index over one field. Entries live in memory while the index
/// is open; `sync` serializes them into the index file's data pages
/// through the buffer pool, so an open sees exactly what the last sync
/// wrote.
pub struct BplusTreeIndex {
    index_meta: IndexMeta,
    field_meta: FieldMeta,
    file_id: FileId,
    entries: BTreeMap<IndexKey, Vec<Rid>>,
    /// Pages currently backing the entries, in write order.
    data_pages: Vec<PageNum>,
    dirty: bool,
}

impl BplusTreeIndex {
    /// Create the index file. The index starts empty.
    pub fn create(
        pool: &mut DiskBufferPool,
        path: &Path,
        index_meta: IndexMeta,
        field_meta: FieldMeta,
    ) -> IndexResult<Self> {
        pool.create_file(path)?;
        let file_id = pool.open_file(path)?;
        info!("created index {} on field {}", index_meta.name(), field_meta.name());
        Ok(Self {
            index_meta,
            field_meta,
            file_id,
            entries: BTreeMap::new(),
            data_pages: Vec::new(),
            dirty: false,
        })
    }

    /// Open an existing index file and load its entries.
    pub fn open(
        pool: &mut DiskBufferPool,
        path: &Path,
        index_meta: IndexMeta,
        field_meta: FieldMeta,
    ) -> IndexResult<Self> {
        let file_id = pool.open_file(path)?;
        let mut index = Self {
            index_meta,
            field_meta,
            file_id,
            entries: BTreeMap::new(),
            data_pages: Vec::new(),
            dirty: false,
        };
        index.load_pages(pool)?;
        Ok(index)
    }

    pub fn index_meta(&self) -> &IndexMeta {
        &self.index_meta
    }

    pub fn field_meta(&self) -> &FieldMeta {
        &self.field_meta
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    fn entry_size(&self) -> usize {
        self.field_meta.len() + 8
    }

    fn entries_per_page(&self) -> usize {
        (PAGE_DATA_SIZE - ENTRY_COUNT_SIZE) / self.entry_size()
    }

    /// Add `(key(record_data), rid)`. Duplicate keys are allowed.
    pub fn insert_entry(&mut self, record_data: &[u8], rid: &Rid) -> IndexResult<()> {
        let key = IndexKey::from_record(record_data, &self.field_meta);
        self.entries.entry(key).or_default().push(*rid);
        self.dirty = true;
        Ok(())
    }

    /// Remove `(key(record_data), rid)`; a missing entry is `KeyNotFound`.
    pub fn delete_entry(&mut self, record_data: &[u8], rid: &Rid) -> IndexResult<()> {
        let key = IndexKey::from_record(record_data, &self.field_meta);
        let Some(rids) = self.entries.get_mut(&key) else {
            return Err(IndexError::KeyNotFound);
        };
        let Some(pos) = rids.iter().position(|r| r == rid) else {
            return Err(IndexError::KeyNotFound);
        };
        rids.remove(pos);
        if rids.is_empty() {
            self.entries.remove(&key);
        }
        self.dirty = true;
        Ok(())
    }

    /// All RIDs stored under `value`'s key.
    pub fn lookup(&self, value: &Value) -> Vec<Rid> {
        match IndexKey::from_value(value, &self.field_meta) {
            Some(key) => self.entries.get(&key).cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Cursor over the RIDs satisfying `field op value`, in key order.
    /// `NotEqual` yields every entry — a superset the caller re-filters.
    /// Returns `None` when `value` cannot key this field.
    pub fn create_scanner(&self, op: CompOp, value: &Value) -> Option<IndexScanner> {
        let key = IndexKey::from_value(value, &self.field_meta)?;
        let rids = match op {
            CompOp::EqualTo => self.entries.get(&key).cloned().unwrap_or_default(),
            CompOp::NotEqual => self.entries.values().flatten().copied().collect(),
            CompOp::LessThan => self.collect_range((Unbounded, Excluded(&key))),
            CompOp::LessEqual => self.collect_range((Unbounded, Included(&key))),
            CompOp::GreatThan => self.collect_range((Excluded(&key), Unbounded)),
            CompOp::GreatEqual => self.collect_range((Included(&key), Unbounded)),
        };
        Some(IndexScanner::new(rids))
    }

    fn collect_range(
        &self,
        bounds: (std::ops::Bound<&IndexKey>, std::ops::Bound<&IndexKey>),
    ) -> Vec<Rid> {
        self.entries
            .range(bounds)
            .flat_map(|(_, rids)| rids.iter().copied())
            .collect()
    }

    /// Serialize the entries into the file's data pages and flush them.
    pub fn sync(&mut self, pool: &mut DiskBufferPool) -> IndexResult<()> {
        if self.dirty {
            self.write_pages(pool)?;
            self.dirty = false;
        }
        pool.purge_all_pages(self.file_id)?;
        Ok(())
    }

    /// Sync and close the index file.
    pub fn close(&mut self, pool: &mut DiskBufferPool) -> IndexResult<()> {
        self.sync(pool)?;
        pool.close_file(self.file_id)?;
        Ok(())
    }

    fn load_pages(&mut self, pool: &mut DiskBufferPool) -> IndexResult<()> {
        let entry_size = self.entry_size();
        let per_page = self.entries_per_page();
        let key_len = self.field_meta.len();
        let field_type = self.field_meta.field_type();

        let page_count = pool.page_count(self.file_id)?;
        for page_num in 1..page_count {
            if !pool.is_page_allocated(self.file_id, page_num)? {
                continue;
            }
            let handle = pool.get_this_page(self.file_id, page_num)?;
            let parsed = {
                let data = pool.page_data(&handle);
                let count = u16::from_le_bytes([data[0], data[1]]) as usize;
                if count > per_page {
                    Err(IndexError::Corrupted(format!(
                        "page {page_num} claims {count} entries"
                    )))
                } else {
                    for i in 0..count {
                        let at = ENTRY_COUNT_SIZE + i * entry_size;
                        let chunk = &data[at..at + entry_size];
                        let key = IndexKey::from_bytes(&chunk[..key_len], field_type);
                        let page = u32::from_le_bytes([
                            chunk[key_len],
                            chunk[key_len + 1],
                            chunk[key_len + 2],
                            chunk[key_len + 3],
                        ]);
                        let slot = u32::from_le_bytes([
                            chunk[key_len + 4],
                            chunk[key_len + 5],
                            chunk[key_len + 6],
                            chunk[key_len + 7],
                        ]);
                        self.entries
                            .entry(key)
                            .or_default()
                            .push(Rid::new(page, slot as usize));
                    }
                    Ok(())
                }
            };
            let unpinned = pool.unpin_page(handle);
            parsed?;
            unpinned?;
            self.data_pages.push(page_num);
        }
        debug!(
            "loaded {} entries of index {}",
            self.entry_count(),
            self.index_meta.name()
        );
        Ok(())
    }

    fn write_pages(&mut self, pool: &mut DiskBufferPool) -> IndexResult<()> {
        let key_len = self.field_meta.len();
        let entry_size = self.entry_size();
        let per_page = self.entries_per_page();

        let mut encoded: Vec<u8> = Vec::with_capacity(self.entry_count() * entry_size);
        for (key, rids) in &self.entries {
            for rid in rids {
                encoded.extend_from_slice(&key.encode(key_len));
                encoded.extend_from_slice(&(rid.page_num).to_le_bytes());
                encoded.extend_from_slice(&(rid.slot_num as u32).to_le_bytes());
            }
        }
        let total = encoded.len() / entry_size.max(1);
        let needed = total.div_ceil(per_page);

        for i in 0..needed {
            let handle = if i < self.data_pages.len() {
                pool.get_this_page(self.file_id, self.data_pages[i])?
            } else {
                let handle = pool.allocate_page(self.file_id)?;
                self.data_pages.push(handle.page_num());
                handle
            };
            let start = i * per_page;
            let count = per_page.min(total - start);
            {
                let data = pool.page_data_mut(&handle);
                data[0..2].copy_from_slice(&(count as u16).to_le_bytes());
                let bytes = &encoded[start * entry_size..(start + count) * entry_size];
                data[ENTRY_COUNT_SIZE..ENTRY_COUNT_SIZE + bytes.len()].copy_from_slice(bytes);
            }
            pool.mark_dirty(&handle);
            pool.unpin_page(handle)?;
        }

        // shrink: give surplus pages back to the file
        let surplus: Vec<PageNum> = self.data_pages.split_off(needed);
        for page_num in surplus {
            pool.dispose_page(self.file_id, page_num)?;
        }
        Ok(())
    }
}

/// A finite cursor of RIDs matching an index predicate, in key order
pub struct IndexScanner {
    rids: std::vec::IntoIter<Rid>,
}

impl IndexScanner {
    fn new(rids: Vec<Rid>) -> Self {
        Self { rids: rids.into_iter() }
    }

    /// The next matching RID, or `None` at the end of the sequence.
    pub fn next_entry(&mut self) -> Option<Rid> {
        self.rids.next()
    }
}
