//! MVCC-lite transactions over the hidden `__trx` system field.
//!
//! The stamp in a record's system field encodes its state: `0` means
//! committed, a positive id an uncommitted insert visible only to its
//! owner, a negative id a pending delete invisible to its owner but
//! still visible to everyone else.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicI32, Ordering};

use log::warn;

use crate::record::{Record, Rid};
use crate::table::{Table, TableMeta, TableResult};

static NEXT_TRX_ID: AtomicI32 = AtomicI32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Insert,
    Delete,
}

/// One transaction: an id, lazily assigned on first use, and the set of
/// pending operations per table. Commit and rollback fan the pending set
/// out into the owning tables; afterwards the object is reset and can
/// start a new transaction.
#[derive(Debug, Default)]
pub struct Transaction {
    trx_id: i32,
    operations: HashMap<String, HashMap<Rid, Operation>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trx_id(&self) -> i32 {
        self.trx_id
    }

    pub fn is_started(&self) -> bool {
        self.trx_id != 0
    }

    fn start_if_stopped(&mut self) {
        if self.trx_id == 0 {
            self.trx_id = NEXT_TRX_ID.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Stamp the record as an uncommitted insert of this transaction.
    /// Runs before the record bytes reach disk.
    pub fn init_transaction_info(&mut self, meta: &TableMeta, record: &mut Record) {
        self.start_if_stopped();
        set_trx_field(meta, &mut record.data, self.trx_id);
    }

    /// Log an insert against this transaction.
    pub fn insert_record(&mut self, meta: &TableMeta, record: &Record) -> TableResult<()> {
        self.start_if_stopped();
        self.operations
            .entry(meta.name().to_string())
            .or_default()
            .insert(record.rid, Operation::Insert);
        Ok(())
    }

    /// Log a delete: tombstone the record in place. Deleting a record
    /// this transaction inserted cancels both operations and rolls the
    /// insert back immediately.
    pub fn delete_record(&mut self, table: &mut Table, record: &Record) -> TableResult<()> {
        self.start_if_stopped();
        let table_name = table.name().to_string();
        let existing = self
            .operations
            .get(&table_name)
            .and_then(|ops| ops.get(&record.rid))
            .copied();
        match existing {
            Some(Operation::Insert) => {
                if let Some(ops) = self.operations.get_mut(&table_name) {
                    ops.remove(&record.rid);
                }
                table.rollback_insert(&record.rid)
            }
            Some(Operation::Delete) => Ok(()),
            None => {
                let mut data = record.data.clone();
                set_trx_field(table.table_meta(), &mut data, -self.trx_id);
                table.write_record(&record.rid, &data)?;
                self.operations
                    .entry(table_name)
                    .or_default()
                    .insert(record.rid, Operation::Delete);
                Ok(())
            }
        }
    }

    /// Whether this transaction may see the record.
    pub fn is_visible(&self, meta: &TableMeta, record: &Record) -> bool {
        let record_trx_id = get_trx_field(meta, &record.data);
        if record_trx_id == 0 {
            true
        } else if record_trx_id > 0 {
            record_trx_id == self.trx_id
        } else {
            -record_trx_id != self.trx_id
        }
    }

    /// Finalize an insert: clear the stamp so everyone sees the record.
    pub fn commit_insert(&mut self, meta: &TableMeta, record: &mut Record) -> TableResult<()> {
        set_trx_field(meta, &mut record.data, 0);
        if let Some(ops) = self.operations.get_mut(meta.name()) {
            ops.remove(&record.rid);
        }
        Ok(())
    }

    /// Undo a delete: clear the tombstone stamp.
    pub fn rollback_delete(&mut self, meta: &TableMeta, record: &mut Record) -> TableResult<()> {
        set_trx_field(meta, &mut record.data, 0);
        if let Some(ops) = self.operations.get_mut(meta.name()) {
            ops.remove(&record.rid);
        }
        Ok(())
    }

    /// Apply every pending operation and reset the transaction.
    pub fn commit(&mut self, tables: &mut HashMap<String, Table>) -> TableResult<()> {
        let operations = mem::take(&mut self.operations);
        for (table_name, ops) in operations {
            let Some(table) = tables.get_mut(&table_name) else {
                warn!("table {table_name} is gone, dropping its pending operations");
                continue;
            };
            for (rid, op) in ops {
                match op {
                    Operation::Insert => table.commit_insert(self, &rid)?,
                    Operation::Delete => table.commit_delete(&rid)?,
                }
            }
        }
        self.trx_id = 0;
        Ok(())
    }

    /// Undo every pending operation and reset the transaction.
    pub fn rollback(&mut self, tables: &mut HashMap<String, Table>) -> TableResult<()> {
        let operations = mem::take(&mut self.operations);
        for (table_name, ops) in operations {
            let Some(table) = tables.get_mut(&table_name) else {
                warn!("table {table_name} is gone, dropping its pending operations");
                continue;
            };
            for (rid, op) in ops {
                match op {
                    Operation::Insert => table.rollback_insert(&rid)?,
                    Operation::Delete => table.rollback_delete(self, &rid)?,
                }
            }
        }
        self.trx_id = 0;
        Ok(())
    }
}

fn set_trx_field(meta: &TableMeta, data: &mut [u8], value: i32) {
    let field = meta.trx_field();
    data[field.offset()..field.offset() + field.len()].copy_from_slice(&value.to_le_bytes());
}

fn get_trx_field(meta: &TableMeta, data: &[u8]) -> i32 {
    let field = meta.trx_field();
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[field.offset()..field.offset() + field.len()]);
    i32::from_le_bytes(buf)
}
