#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::info;
use thiserror::Error;

use crate::file::DiskBufferPool;
use crate::record::{Record, Rid};
use crate::table::{AttrInfo, ConditionFilter, Table, TableError, TableResult, Value};
use crate::transaction::Transaction;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// A database session: the shared buffer pool, the open tables of one
/// base directory and the session's transaction, created lazily on first
/// use.
pub struct Database {
    base_dir: PathBuf,
    buffer_pool: Arc<Mutex<DiskBufferPool>>,
    tables: HashMap<String, Table>,
    transaction: Option<Transaction>,
}

impl Database {
    /// Open a database directory, loading every table whose meta file is
    /// found there.
    pub fn open<P: AsRef<Path>>(base_dir: P) -> DbResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        let buffer_pool = Arc::new(Mutex::new(DiskBufferPool::new()));

        let mut tables = HashMap::new();
        let mut meta_files: Vec<String> = fs::read_dir(&base_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "table"))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        meta_files.sort();
        for meta_file in meta_files {
            let table = Table::open(Arc::clone(&buffer_pool), &base_dir, &meta_file)?;
            tables.insert(table.name().to_string(), table);
        }

        info!("opened database {} with {} tables", base_dir.display(), tables.len());
        Ok(Self {
            base_dir,
            buffer_pool,
            tables,
            transaction: None,
        })
    }

    pub fn create_table(&mut self, name: &str, attrs: &[AttrInfo]) -> DbResult<()> {
        if self.tables.contains_key(name) {
            return Err(TableError::TableExists(name.to_string()).into());
        }
        let table = Table::create(Arc::clone(&self.buffer_pool), &self.base_dir, name, attrs)?;
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> DbResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> DbResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    /// The session transaction, created on first use.
    pub fn transaction(&mut self) -> &mut Transaction {
        self.transaction.get_or_insert_with(Transaction::new)
    }

    /// Insert a row through the session transaction.
    pub fn insert(&mut self, table_name: &str, values: &[Value]) -> DbResult<Rid> {
        let Self { tables, transaction, .. } = self;
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))?;
        let txn = transaction.get_or_insert_with(Transaction::new);
        Ok(table.insert_values(Some(txn), values)?)
    }

    /// Scan a table with the session transaction's visibility.
    pub fn scan<F>(
        &mut self,
        table_name: &str,
        filter: Option<&ConditionFilter>,
        limit: Option<usize>,
        reader: F,
    ) -> DbResult<()>
    where
        F: FnMut(&Record) -> TableResult<()>,
    {
        let Self { tables, transaction, .. } = self;
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))?;
        table.scan_record(transaction.as_ref(), filter, limit, reader)?;
        Ok(())
    }

    /// Delete matching rows through the session transaction. Returns the
    /// number of rows deleted.
    pub fn delete_where(
        &mut self,
        table_name: &str,
        filter: Option<&ConditionFilter>,
    ) -> DbResult<usize> {
        let Self { tables, transaction, .. } = self;
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))?;
        let txn = transaction.get_or_insert_with(Transaction::new);
        Ok(table.delete_records(Some(txn), filter)?)
    }

    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        attribute_name: &str,
    ) -> DbResult<()> {
        let Self { tables, transaction, .. } = self;
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))?;
        table.create_index(transaction.as_ref(), index_name, attribute_name)?;
        Ok(())
    }

    /// Commit the session transaction's pending operations.
    pub fn commit(&mut self) -> DbResult<()> {
        let Self { tables, transaction, .. } = self;
        if let Some(txn) = transaction.as_mut() {
            txn.commit(tables)?;
        }
        Ok(())
    }

    /// Roll the session transaction's pending operations back.
    pub fn rollback(&mut self) -> DbResult<()> {
        let Self { tables, transaction, .. } = self;
        if let Some(txn) = transaction.as_mut() {
            txn.rollback(tables)?;
        }
        Ok(())
    }

    /// Flush every table's pages and indexes.
    pub fn sync(&mut self) -> DbResult<()> {
        for table in self.tables.values_mut() {
            table.sync()?;
        }
        Ok(())
    }
}
