use tempfile::TempDir;

use super::*;
use crate::record::Record;
use crate::table::{CompOp, FieldType};

fn sample_attrs() -> Vec<AttrInfo> {
    vec![
        AttrInfo::new("id", FieldType::Int),
        AttrInfo::new("name", FieldType::Chars(16)),
    ]
}

fn setup() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(dir.path()).unwrap();
    db.create_table("t", &sample_attrs()).unwrap();
    (dir, db)
}

fn row(id: i32, name: &str) -> Vec<Value> {
    vec![Value::Int(id), Value::Chars(name.to_string())]
}

fn scan_ids(db: &mut Database, filter: Option<&ConditionFilter>) -> Vec<i32> {
    let mut records: Vec<Record> = Vec::new();
    let sink = &mut records;
    db.scan("t", filter, None, |record| {
        sink.push(record.clone());
        Ok(())
    })
    .unwrap();

    let table = db.table("t").unwrap();
    let id_field = table.table_meta().field("id").unwrap();
    records
        .iter()
        .map(|record| {
            match Value::decode(
                &record.data[id_field.offset()..id_field.offset() + id_field.len()],
                id_field.field_type(),
            ) {
                Some(Value::Int(id)) => id,
                other => panic!("bad id: {other:?}"),
            }
        })
        .collect()
}

fn id_filter(db: &Database, op: CompOp, id: i32) -> ConditionFilter {
    let table = db.table("t").unwrap();
    ConditionFilter::comparison(table.table_meta().field("id").unwrap(), op, Value::Int(id))
}

#[test]
fn test_insert_commit_scan() {
    let (_dir, mut db) = setup();
    db.insert("t", &row(1, "a")).unwrap();
    db.insert("t", &row(2, "b")).unwrap();

    // the session transaction sees its own writes before commit
    assert_eq!(scan_ids(&mut db, None), vec![1, 2]);

    db.commit().unwrap();
    assert_eq!(scan_ids(&mut db, None), vec![1, 2]);
}

#[test]
fn test_rollback_insert() {
    let (_dir, mut db) = setup();
    db.create_index("t", "idx_id", "id").unwrap();
    db.insert("t", &row(1, "a")).unwrap();

    db.rollback().unwrap();
    assert!(scan_ids(&mut db, None).is_empty());
    // the slot was reclaimed: the next insert lands on the same rid
    let rid = db.insert("t", &row(2, "b")).unwrap();
    assert_eq!(rid, crate::record::Rid::new(1, 0));
}

#[test]
fn test_transactional_delete_visibility() {
    let (_dir, mut db) = setup();
    db.insert("t", &row(1, "a")).unwrap();
    db.insert("t", &row(2, "b")).unwrap();
    db.commit().unwrap();

    let filter = id_filter(&db, CompOp::EqualTo, 1);
    let deleted = db.delete_where("t", Some(&filter)).unwrap();
    assert_eq!(deleted, 1);

    // hidden from the deleting session before commit
    assert_eq!(scan_ids(&mut db, None), vec![2]);

    // still visible to an unrelated transaction until the commit
    {
        let mut other = crate::transaction::Transaction::new();
        let table_meta_size = db.table("t").unwrap().table_meta().record_size();
        let mut probe = Record::new(vec![0u8; table_meta_size]);
        other.init_transaction_info(db.table("t").unwrap().table_meta(), &mut probe);

        let table = db.table_mut("t").unwrap();
        let mut count = 0;
        let count_ref = &mut count;
        table
            .scan_record(Some(&other), None, None, |_| {
                *count_ref += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    db.commit().unwrap();
    assert_eq!(scan_ids(&mut db, None), vec![2]);
}

#[test]
fn test_rollback_delete_restores_row() {
    let (_dir, mut db) = setup();
    db.insert("t", &row(1, "a")).unwrap();
    db.commit().unwrap();

    let filter = id_filter(&db, CompOp::EqualTo, 1);
    db.delete_where("t", Some(&filter)).unwrap();
    assert!(scan_ids(&mut db, None).is_empty());

    db.rollback().unwrap();
    assert_eq!(scan_ids(&mut db, None), vec![1]);
}

#[test]
fn test_insert_then_delete_in_same_transaction_cancels() {
    let (_dir, mut db) = setup();
    db.create_index("t", "idx_id", "id").unwrap();
    db.insert("t", &row(7, "g")).unwrap();

    let filter = id_filter(&db, CompOp::EqualTo, 7);
    let deleted = db.delete_where("t", Some(&filter)).unwrap();
    assert_eq!(deleted, 1);

    db.commit().unwrap();
    assert!(scan_ids(&mut db, None).is_empty());
}

#[test]
fn test_delete_without_filter_deletes_everything() {
    let (_dir, mut db) = setup();
    for i in 0..8 {
        db.insert("t", &row(i, "x")).unwrap();
    }
    db.commit().unwrap();

    let deleted = db.delete_where("t", None).unwrap();
    assert_eq!(deleted, 8);
    db.commit().unwrap();
    assert!(scan_ids(&mut db, None).is_empty());
}

#[test]
fn test_reopen_database_restores_state() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut db = Database::open(dir.path()).unwrap();
        db.create_table("t", &sample_attrs()).unwrap();
        db.insert("t", &row(1, "a")).unwrap();
        db.insert("t", &row(2, "b")).unwrap();
        db.commit().unwrap();
        db.create_index("t", "idx_id", "id").unwrap();
        db.sync().unwrap();
    }

    let mut db = Database::open(dir.path()).unwrap();
    assert_eq!(scan_ids(&mut db, None), vec![1, 2]);

    // the reopened table still resolves the index for filtered scans
    let filter = id_filter(&db, CompOp::EqualTo, 2);
    assert_eq!(scan_ids(&mut db, Some(&filter)), vec![2]);
}

#[test]
fn test_unknown_table() {
    let (_dir, mut db) = setup();
    let result = db.insert("missing", &row(1, "a"));
    assert!(matches!(result, Err(DbError::TableNotFound(_))));
}

#[test]
fn test_duplicate_table() {
    let (_dir, mut db) = setup();
    let result = db.create_table("t", &sample_attrs());
    assert!(matches!(result, Err(DbError::Table(TableError::TableExists(_)))));
}
