mod condition;
mod error;
mod meta;
mod value;

pub use condition::{CompOp, ComparisonFilter, CompositeFilter, CondOperand, ConditionFilter};
pub use error::{TableError, TableResult};
pub use meta::{
    AttrInfo, FieldMeta, IndexMeta, TableMeta, TRX_FIELD_NAME, table_data_file, table_index_file,
    table_meta_file,
};
pub use value::{FieldType, Value};

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{error, info, warn};

use crate::file::{DiskBufferPool, FileId};
use crate::index::{BplusTreeIndex, IndexError, IndexScanner};
use crate::record::{Record, RecordError, RecordFileHandler, RecordFileScanner, Rid};
use crate::transaction::Transaction;

/// A table: schema, paged data file and open indexes. All page I/O goes
/// through the shared buffer pool handle.
pub struct Table {
    base_dir: PathBuf,
    table_meta: TableMeta,
    buffer_pool: Arc<Mutex<DiskBufferPool>>,
    file_id: FileId,
    record_handler: RecordFileHandler,
    indexes: Vec<BplusTreeIndex>,
}

impl Table {
    /// Create a table: serialize its meta to an exclusively created meta
    /// file and create the empty data file. The table starts with no
    /// indexes.
    pub fn create(
        buffer_pool: Arc<Mutex<DiskBufferPool>>,
        base_dir: &Path,
        name: &str,
        attrs: &[AttrInfo],
    ) -> TableResult<Self> {
        let table_meta = TableMeta::new(name, attrs)?;

        let meta_file = table_meta_file(base_dir, name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&meta_file)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    TableError::TableExists(name.to_string())
                } else {
                    TableError::Io(e)
                }
            })?;
        let content = serde_json::to_string_pretty(&table_meta)?;
        file.write_all(content.as_bytes())?;

        let data_file = table_data_file(base_dir, name);
        let (file_id, record_handler) = {
            let mut pool = buffer_pool.lock().unwrap();
            pool.create_file(&data_file)?;
            let file_id = pool.open_file(&data_file)?;
            match RecordFileHandler::new(file_id, table_meta.record_size()) {
                Ok(handler) => (file_id, handler),
                Err(e) => {
                    let _ = pool.close_file(file_id);
                    return Err(e.into());
                }
            }
        };

        info!("created table {name} in {}", base_dir.display());
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            table_meta,
            buffer_pool,
            file_id,
            record_handler,
            indexes: Vec::new(),
        })
    }

    /// Open a table from its meta file, then its data file and every
    /// declared index. A failed index open aborts the whole open; drop
    /// cleans up whatever was opened.
    pub fn open(
        buffer_pool: Arc<Mutex<DiskBufferPool>>,
        base_dir: &Path,
        meta_file_name: &str,
    ) -> TableResult<Self> {
        let table_meta = TableMeta::load(&base_dir.join(meta_file_name))?;

        let data_file = table_data_file(base_dir, table_meta.name());
        let (file_id, record_handler) = {
            let mut pool = buffer_pool.lock().unwrap();
            let file_id = pool.open_file(&data_file)?;
            match RecordFileHandler::new(file_id, table_meta.record_size()) {
                Ok(handler) => (file_id, handler),
                Err(e) => {
                    let _ = pool.close_file(file_id);
                    return Err(e.into());
                }
            }
        };

        let mut table = Self {
            base_dir: base_dir.to_path_buf(),
            table_meta,
            buffer_pool,
            file_id,
            record_handler,
            indexes: Vec::new(),
        };

        for index_meta in table.table_meta.indexes().to_vec() {
            let Some(field_meta) = table.table_meta.field(index_meta.field_name()) else {
                error!(
                    "index {} of table {} names a non-existent field {}",
                    index_meta.name(),
                    table.name(),
                    index_meta.field_name()
                );
                return Err(TableError::FieldMissing(index_meta.field_name().to_string()));
            };
            let index_file = table_index_file(&table.base_dir, table.table_meta.name(), index_meta.name());
            let index = {
                let mut pool = table.buffer_pool.lock().unwrap();
                BplusTreeIndex::open(&mut pool, &index_file, index_meta.clone(), field_meta.clone())?
            };
            table.indexes.push(index);
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        self.table_meta.name()
    }

    pub fn table_meta(&self) -> &TableMeta {
        &self.table_meta
    }

    /// Encode user values into record bytes, leaving system fields zeroed.
    pub fn make_record(&self, values: &[Value]) -> TableResult<Vec<u8>> {
        let meta = &self.table_meta;
        if values.len() + meta.sys_field_count() != meta.field_count() {
            return Err(TableError::FieldMissing(format!(
                "table {} expects {} values, got {}",
                meta.name(),
                meta.field_count() - meta.sys_field_count(),
                values.len()
            )));
        }

        for (i, value) in values.iter().enumerate() {
            let field = meta.field_at(meta.sys_field_count() + i);
            if !value.matches_type(field.field_type()) {
                return Err(TableError::FieldTypeMismatch {
                    field: field.name().to_string(),
                    expected: field.field_type().name().to_string(),
                    actual: value.type_name().to_string(),
                });
            }
        }

        let mut data = vec![0u8; meta.record_size()];
        for (i, value) in values.iter().enumerate() {
            let field = meta.field_at(meta.sys_field_count() + i);
            value.encode_into(&mut data[field.offset()..field.offset() + field.len()]);
        }
        Ok(data)
    }

    /// Build a record from user values and insert it. Returns its RID.
    pub fn insert_values(
        &mut self,
        txn: Option<&mut Transaction>,
        values: &[Value],
    ) -> TableResult<Rid> {
        if values.is_empty() {
            return Err(TableError::InvalidArgument(format!(
                "no values to insert into table {}",
                self.name()
            )));
        }
        let data = self.make_record(values)?;
        let mut record = Record::new(data);
        self.insert_record(txn, &mut record)?;
        Ok(record.rid)
    }

    /// Insert a record: stamp transaction info, claim a slot, log the
    /// intent, then fan out to every index. Failures roll the earlier
    /// steps back and return the primary error.
    pub fn insert_record(
        &mut self,
        mut txn: Option<&mut Transaction>,
        record: &mut Record,
    ) -> TableResult<()> {
        if let Some(txn) = txn.as_deref_mut() {
            txn.init_transaction_info(&self.table_meta, record);
        }

        let rid = {
            let mut pool = self.buffer_pool.lock().unwrap();
            self.record_handler.insert_record(&mut pool, &record.data)?
        };
        record.rid = rid;

        if let Some(txn) = txn.as_deref_mut() {
            if let Err(e) = txn.insert_record(&self.table_meta, record) {
                error!("failed to log insert into table {}: {e}", self.name());
                let mut pool = self.buffer_pool.lock().unwrap();
                if let Err(e2) = self.record_handler.delete_record(&mut pool, &rid) {
                    error!("failed to roll back record {rid} of table {}: {e2}", self.name());
                }
                return Err(e);
            }
        }

        if let Err(e) = self.insert_entry_of_indexes(&record.data, &rid) {
            if let Err(e2) = self.delete_entry_of_indexes(&record.data, &rid, true) {
                error!(
                    "failed to roll back index entries of record {rid} of table {}: {e2}",
                    self.name()
                );
            }
            let mut pool = self.buffer_pool.lock().unwrap();
            if let Err(e2) = self.record_handler.delete_record(&mut pool, &rid) {
                error!(
                    "invariant violated: cannot roll back record {rid} of table {} after index failure: {e2}",
                    self.name()
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Scan records matching `filter`, invoking `reader` for each visible
    /// one, up to `limit`. Uses an index when one matches the filter.
    /// `Some(0)` succeeds immediately; `None` is unlimited.
    pub fn scan_record<F>(
        &mut self,
        txn: Option<&Transaction>,
        filter: Option<&ConditionFilter>,
        limit: Option<usize>,
        reader: F,
    ) -> TableResult<()>
    where
        F: FnMut(&Record) -> TableResult<()>,
    {
        if limit == Some(0) {
            return Ok(());
        }
        let limit = limit.unwrap_or(usize::MAX);

        if let Some(scanner) = self.find_index_for_scan(filter) {
            return self.scan_record_by_index(txn, scanner, filter, limit, reader);
        }
        self.scan_record_by_file(txn, filter, limit, reader)
    }

    fn scan_record_by_file<F>(
        &mut self,
        txn: Option<&Transaction>,
        filter: Option<&ConditionFilter>,
        limit: usize,
        mut reader: F,
    ) -> TableResult<()>
    where
        F: FnMut(&Record) -> TableResult<()>,
    {
        let mut scanner = RecordFileScanner::open_scan(self.file_id, filter);
        let mut pool = self.buffer_pool.lock().unwrap();

        let mut count = 0usize;
        let result = loop {
            if count >= limit {
                break Ok(());
            }
            let record = match scanner.next_record(&mut pool) {
                Ok(record) => record,
                Err(RecordError::Eof) => break Ok(()),
                Err(e) => {
                    error!("failed to scan table {}: {e}", self.name());
                    break Err(TableError::from(e));
                }
            };
            if txn.is_none_or(|t| t.is_visible(&self.table_meta, &record)) {
                if let Err(e) = reader(&record) {
                    break Err(e);
                }
                count += 1;
            }
        };
        let closed = scanner.close_scan(&mut pool);
        result?;
        closed?;
        Ok(())
    }

    /// Drive an index scanner. The filter is applied even here: a scanner
    /// may return a superset of the matching RIDs.
    fn scan_record_by_index<F>(
        &mut self,
        txn: Option<&Transaction>,
        mut scanner: IndexScanner,
        filter: Option<&ConditionFilter>,
        limit: usize,
        mut reader: F,
    ) -> TableResult<()>
    where
        F: FnMut(&Record) -> TableResult<()>,
    {
        let mut pool = self.buffer_pool.lock().unwrap();
        let mut count = 0usize;
        while count < limit {
            let Some(rid) = scanner.next_entry() else {
                break;
            };
            let record = self.record_handler.get_record(&mut pool, &rid)?;
            if txn.is_none_or(|t| t.is_visible(&self.table_meta, &record))
                && filter.is_none_or(|f| f.matches(&record.data))
            {
                reader(&record)?;
                count += 1;
            }
        }
        Ok(())
    }

    /// Pick an index usable for the filter: a comparison of one field
    /// against a constant whose field has an index. Composite filters are
    /// walked in order and the first usable child wins; there is no cost
    /// model.
    fn find_index_for_scan(&self, filter: Option<&ConditionFilter>) -> Option<IndexScanner> {
        match filter? {
            ConditionFilter::Comparison(cmp) => self.find_index_for_comparison(cmp),
            ConditionFilter::Composite(composite) => composite
                .filters()
                .iter()
                .find_map(|child| self.find_index_for_scan(Some(child))),
        }
    }

    fn find_index_for_comparison(&self, cmp: &ComparisonFilter) -> Option<IndexScanner> {
        let (field_offset, op, value) = match (cmp.left(), cmp.right()) {
            (CondOperand::Field { offset, .. }, CondOperand::Value(value)) => {
                (*offset, cmp.op(), value)
            }
            (CondOperand::Value(value), CondOperand::Field { offset, .. }) => {
                (*offset, cmp.op().swapped(), value)
            }
            _ => return None,
        };

        let Some(field_meta) = self.table_meta.find_field_by_offset(field_offset) else {
            error!(
                "invariant violated: no field at offset {field_offset} in table {}",
                self.name()
            );
            return None;
        };
        let index_meta = self.table_meta.find_index_by_field(field_meta.name())?;
        let index = self.find_index(index_meta.name())?;
        index.create_scanner(op, value)
    }

    fn find_index(&self, name: &str) -> Option<&BplusTreeIndex> {
        self.indexes.iter().find(|index| index.index_meta().name() == name)
    }

    /// Delete every record matching the filter. Matches are collected
    /// first, then deleted one by one. Returns the number deleted.
    pub fn delete_records(
        &mut self,
        mut txn: Option<&mut Transaction>,
        filter: Option<&ConditionFilter>,
    ) -> TableResult<usize> {
        let mut matches: Vec<Record> = Vec::new();
        self.scan_record(txn.as_deref(), filter, None, |record| {
            matches.push(record.clone());
            Ok(())
        })?;

        let mut deleted = 0;
        for record in &matches {
            self.delete_record(txn.as_deref_mut(), record)?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Delete one record. Inside a transaction the deletion is logged and
    /// tombstoned; without one it is applied eagerly.
    pub fn delete_record(
        &mut self,
        txn: Option<&mut Transaction>,
        record: &Record,
    ) -> TableResult<()> {
        if let Some(txn) = txn {
            return txn.delete_record(self, record);
        }
        if let Err(e) = self.delete_entry_of_indexes(&record.data, &record.rid, false) {
            error!(
                "failed to delete index entries of record {} of table {}: {e}",
                record.rid,
                self.name()
            );
            return Err(e.into());
        }
        let mut pool = self.buffer_pool.lock().unwrap();
        self.record_handler.delete_record(&mut pool, &record.rid)?;
        Ok(())
    }

    /// Create an index over `attribute_name`, backfill it from a full
    /// scan, then swap the new meta in via an atomic rename.
    pub fn create_index(
        &mut self,
        txn: Option<&Transaction>,
        index_name: &str,
        attribute_name: &str,
    ) -> TableResult<()> {
        if index_name.trim().is_empty() || attribute_name.trim().is_empty() {
            return Err(TableError::InvalidArgument(
                "index name or attribute name is blank".into(),
            ));
        }
        if self.table_meta.index(index_name).is_some()
            || self.table_meta.find_index_by_field(attribute_name).is_some()
        {
            return Err(TableError::IndexExists(index_name.to_string()));
        }
        let Some(field_meta) = self.table_meta.field(attribute_name).cloned() else {
            return Err(TableError::FieldMissing(attribute_name.to_string()));
        };

        let index_meta = IndexMeta::new(index_name, attribute_name);
        let index_file = table_index_file(&self.base_dir, self.name(), index_name);
        let mut index = {
            let mut pool = self.buffer_pool.lock().unwrap();
            BplusTreeIndex::create(&mut pool, &index_file, index_meta.clone(), field_meta)?
        };

        // backfill from every visible record
        let built = self
            .scan_record(txn, None, None, |record| {
                index.insert_entry(&record.data, &record.rid).map_err(TableError::from)
            })
            .and_then(|_| {
                let mut pool = self.buffer_pool.lock().unwrap();
                index.sync(&mut pool).map_err(TableError::from)
            });
        if let Err(e) = built {
            error!("failed to build index {index_name} on table {}: {e}", self.name());
            let mut pool = self.buffer_pool.lock().unwrap();
            if let Err(e2) = pool.close_file(index.file_id()) {
                warn!("failed to close abandoned index file: {e2}");
            }
            drop(pool);
            if let Err(e2) = std::fs::remove_file(&index_file) {
                warn!("failed to remove abandoned index file: {e2}");
            }
            return Err(e);
        }
        self.indexes.push(index);

        // write the new meta beside the live one, then rename over it; a
        // failure from here on leaves the index live in memory only
        let mut new_meta = self.table_meta.clone();
        new_meta.add_index(index_meta);
        let meta_file = table_meta_file(&self.base_dir, self.name());
        let tmp_file = {
            let mut path = meta_file.clone().into_os_string();
            path.push(".tmp");
            PathBuf::from(path)
        };
        new_meta.save(&tmp_file)?;
        std::fs::rename(&tmp_file, &meta_file)?;
        self.table_meta = new_meta;

        info!("added index {index_name} on table {}", self.name());
        Ok(())
    }

    /// Finalize a pending insert: clear its transaction stamp.
    pub(crate) fn commit_insert(&mut self, txn: &mut Transaction, rid: &Rid) -> TableResult<()> {
        let mut record = {
            let mut pool = self.buffer_pool.lock().unwrap();
            self.record_handler.get_record(&mut pool, rid)?
        };
        txn.commit_insert(&self.table_meta, &mut record)?;
        self.write_record(rid, &record.data)
    }

    /// Undo a pending insert: drop its index entries and free the slot.
    pub(crate) fn rollback_insert(&mut self, rid: &Rid) -> TableResult<()> {
        let record = {
            let mut pool = self.buffer_pool.lock().unwrap();
            self.record_handler.get_record(&mut pool, rid)?
        };
        self.delete_entry_of_indexes(&record.data, rid, true)?;
        let mut pool = self.buffer_pool.lock().unwrap();
        self.record_handler.delete_record(&mut pool, rid)?;
        Ok(())
    }

    /// Finalize a pending delete: remove index entries and free the slot.
    pub(crate) fn commit_delete(&mut self, rid: &Rid) -> TableResult<()> {
        let record = {
            let mut pool = self.buffer_pool.lock().unwrap();
            self.record_handler.get_record(&mut pool, rid)?
        };
        if let Err(e) = self.delete_entry_of_indexes(&record.data, rid, false) {
            error!(
                "failed to delete index entries of record {rid} of table {}: {e}",
                self.name()
            );
        }
        let mut pool = self.buffer_pool.lock().unwrap();
        self.record_handler.delete_record(&mut pool, rid)?;
        Ok(())
    }

    /// Undo a pending delete: clear the tombstone stamp.
    pub(crate) fn rollback_delete(&mut self, txn: &mut Transaction, rid: &Rid) -> TableResult<()> {
        let mut record = {
            let mut pool = self.buffer_pool.lock().unwrap();
            self.record_handler.get_record(&mut pool, rid)?
        };
        txn.rollback_delete(&self.table_meta, &mut record)?;
        self.write_record(rid, &record.data)
    }

    /// Overwrite a record's bytes in place; transaction stamping only.
    pub(crate) fn write_record(&mut self, rid: &Rid, data: &[u8]) -> TableResult<()> {
        let mut pool = self.buffer_pool.lock().unwrap();
        self.record_handler.update_record(&mut pool, rid, data)?;
        Ok(())
    }

    /// Flush the table's dirty pages and every index.
    pub fn sync(&mut self) -> TableResult<()> {
        let mut pool = self.buffer_pool.lock().unwrap();
        pool.purge_all_pages(self.file_id)?;
        for index in &mut self.indexes {
            index.sync(&mut pool)?;
        }
        Ok(())
    }

    fn insert_entry_of_indexes(&mut self, data: &[u8], rid: &Rid) -> Result<(), IndexError> {
        for index in &mut self.indexes {
            index.insert_entry(data, rid)?;
        }
        Ok(())
    }

    /// Remove the record's entry from every index. With `ignore_missing`,
    /// a `KeyNotFound` is skipped — rollback uses this to tolerate
    /// indexes the failed insert never reached.
    fn delete_entry_of_indexes(
        &mut self,
        data: &[u8],
        rid: &Rid,
        ignore_missing: bool,
    ) -> Result<(), IndexError> {
        for index in &mut self.indexes {
            match index.delete_entry(data, rid) {
                Ok(()) => {}
                Err(IndexError::KeyNotFound) if ignore_missing => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if let Ok(mut pool) = self.buffer_pool.lock() {
            for index in &mut self.indexes {
                if let Err(e) = index.close(&mut pool) {
                    warn!("failed to close index {}: {e}", index.index_meta().name());
                }
            }
            if let Err(e) = pool.close_file(self.file_id) {
                warn!("failed to close data file of table {}: {e}", self.name());
            }
        }
    }
}
