use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{TableError, TableResult};
use super::value::FieldType;

/// Name of the hidden transaction system field stamped into every record
pub const TRX_FIELD_NAME: &str = "__trx";

/// A user-declared column
#[derive(Debug, Clone)]
pub struct AttrInfo {
    pub name: String,
    pub field_type: FieldType,
}

impl AttrInfo {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMeta {
    name: String,
    field_type: FieldType,
    offset: usize,
    len: usize,
}

impl FieldMeta {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    name: String,
    field_name: String,
}

impl IndexMeta {
    pub fn new(name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_name: field_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }
}

/// Table schema: ordered fields (system fields first) and declared
/// indexes. Field offsets partition `[0, record_size)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    name: String,
    sys_field_count: usize,
    fields: Vec<FieldMeta>,
    indexes: Vec<IndexMeta>,
    record_size: usize,
}

impl TableMeta {
    pub fn new(name: &str, attrs: &[AttrInfo]) -> TableResult<Self> {
        if name.trim().is_empty() {
            return Err(TableError::InvalidArgument("table name is blank".into()));
        }
        if attrs.is_empty() {
            return Err(TableError::InvalidArgument(format!(
                "table {name} declares no fields"
            )));
        }

        let mut fields = Vec::with_capacity(attrs.len() + 1);
        let mut offset = 0;
        let trx_type = FieldType::Int;
        fields.push(FieldMeta {
            name: TRX_FIELD_NAME.to_string(),
            field_type: trx_type,
            offset,
            len: trx_type.size(),
        });
        offset += trx_type.size();

        for attr in attrs {
            if attr.name.trim().is_empty() {
                return Err(TableError::InvalidArgument(format!(
                    "table {name} has a blank field name"
                )));
            }
            if fields.iter().any(|f| f.name == attr.name) {
                return Err(TableError::InvalidArgument(format!(
                    "duplicate field name {} in table {name}",
                    attr.name
                )));
            }
            let len = attr.field_type.size();
            fields.push(FieldMeta {
                name: attr.name.clone(),
                field_type: attr.field_type,
                offset,
                len,
            });
            offset += len;
        }

        Ok(Self {
            name: name.to_string(),
            sys_field_count: 1,
            fields,
            indexes: Vec::new(),
            record_size: offset,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn sys_field_count(&self) -> usize {
        self.sys_field_count
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn field_at(&self, index: usize) -> &FieldMeta {
        &self.fields[index]
    }

    pub fn trx_field(&self) -> &FieldMeta {
        &self.fields[0]
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_field_by_offset(&self, offset: usize) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.offset == offset)
    }

    pub fn indexes(&self) -> &[IndexMeta] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn find_index_by_field(&self, field_name: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.field_name == field_name)
    }

    pub fn add_index(&mut self, index: IndexMeta) {
        self.indexes.push(index);
    }

    pub fn load(path: &Path) -> TableResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> TableResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub fn table_meta_file(base_dir: &Path, table_name: &str) -> PathBuf {
    base_dir.join(format!("{table_name}.table"))
}

pub fn table_data_file(base_dir: &Path, table_name: &str) -> PathBuf {
    base_dir.join(format!("{table_name}.data"))
}

pub fn table_index_file(base_dir: &Path, table_name: &str, index_name: &str) -> PathBuf {
    base_dir.join(format!("{table_name}_{index_name}.idx"))
}
