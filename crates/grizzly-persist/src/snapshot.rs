//! Snapshot writer/reader (C9): a full materialization of a `Database` into
//! one binary file plus a companion `.lakehouse/` directory.

use std::fs;
use std::path::Path;

use grizzly_column::{choose_codec, decode, encode};
use grizzly_error::{GrizzlyError, Result};
use grizzly_table::{ColumnDef, Database, Table};
use grizzly_types::DataType;
use serde::Serialize;
use tracing::info;

use crate::checkpoint::{CheckpointRecord, CheckpointStatus, CheckpointStore};
use crate::manifest::{Manifest, TableRowCount};
use crate::wire::{write_bytes, write_string, write_u16, write_u32, write_u64, Reader};

/// Snapshot file magic, `"GRIZ"`.
pub const MAGIC: &[u8; 4] = b"GRIZ";
/// Current snapshot format version. Versions below 4 are out of scope
/// (spec §9) and rejected by [`load`].
pub const FORMAT_VERSION: u16 = 4;

#[derive(Serialize)]
struct ColumnMetadataEntry {
    name: String,
    codec: String,
    original_size: usize,
    compressed_size: usize,
    min: Option<String>,
    max: Option<String>,
}

#[derive(Serialize)]
struct TableMetadata {
    table: String,
    row_count: u64,
    columns: Vec<ColumnMetadataEntry>,
}

/// Write a full snapshot of `db` to `path`, following the checkpointed
/// save sequence from spec §4.8. The checkpoint store is updated before
/// and after each table so a crash mid-save is visible to the next
/// caller; because every table's encoded bytes are a pure function of its
/// contents, a fresh `save` always reproduces the same file regardless of
/// what a prior, interrupted `save` left behind.
pub fn save(db: &Database, dbname: &str, path: &Path, checkpoint: &CheckpointStore) -> Result<()> {
    let tables: Vec<(&str, &Table)> = db.tables_in_order().collect();

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    write_u16(&mut out, FORMAT_VERSION);
    write_string(&mut out, dbname);
    write_u32(&mut out, tables.len() as u32);

    let mut table_metadata = Vec::with_capacity(tables.len());
    let mut row_counts = Vec::with_capacity(tables.len());

    for (name, table) in &tables {
        checkpoint.write(&CheckpointRecord {
            task: "save".to_owned(),
            step: "writeTable".to_owned(),
            table: (*name).to_owned(),
            column_index: None,
            status: CheckpointStatus::InProgress,
            timestamp: CheckpointStore::now(),
            error: None,
        })?;

        write_string(&mut out, name);
        write_u32(&mut out, table.schema().len() as u32);
        for def in table.schema() {
            write_string(&mut out, &def.name);
            out.push(def.data_type.tag_byte());
            let dim = match def.data_type {
                DataType::Vector { dim } => dim,
                _ => 0,
            };
            write_u16(&mut out, dim);
        }
        write_u64(&mut out, table.row_count());

        let mut columns_meta = Vec::with_capacity(table.schema().len());
        for (i, def) in table.schema().iter().enumerate() {
            let column = table.column(i).expect("schema and columns are parallel");
            let codec = choose_codec(column)?;
            let blob = encode(column, codec)?;
            out.push(codec.tag_byte());
            write_bytes(&mut out, &blob);
            columns_meta.push(ColumnMetadataEntry {
                name: def.name.clone(),
                codec: format!("{codec:?}"),
                original_size: column.len() * def.data_type.row_stride(),
                compressed_size: blob.len(),
                min: column.min().ok().map(|v| format!("{v:?}")),
                max: column.max().ok().map(|v| format!("{v:?}")),
            });
        }

        let descriptors = table.btree_index_descriptors();
        write_u32(&mut out, descriptors.len() as u32);
        for (index_name, column) in &descriptors {
            write_string(&mut out, index_name);
            write_string(&mut out, column);
        }

        checkpoint.write(&CheckpointRecord {
            task: "save".to_owned(),
            step: "writeTable".to_owned(),
            table: (*name).to_owned(),
            column_index: None,
            status: CheckpointStatus::Completed,
            timestamp: CheckpointStore::now(),
            error: None,
        })?;

        table_metadata.push(TableMetadata {
            table: (*name).to_owned(),
            row_count: table.row_count(),
            columns: columns_meta,
        });
        row_counts.push(TableRowCount { name: (*name).to_owned(), row_count: table.row_count() });
    }

    checkpoint.clear()?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &out)?;
    fs::rename(&tmp_path, path)?;

    let lakehouse = Manifest::lakehouse_dir(path);
    for sub in ["metadata", "data", "unstructured"] {
        fs::create_dir_all(lakehouse.join(sub))?;
    }
    for meta in &table_metadata {
        let body = serde_json::to_vec_pretty(meta)?;
        fs::write(lakehouse.join("metadata").join(format!("{}.json", meta.table)), body)?;
    }

    Manifest::new_full(row_counts, Manifest::now()).save(path)?;
    info!(tables = tables.len(), path = %path.display(), "snapshot saved");
    Ok(())
}

/// Load a full snapshot from `path`, reconstructing every table's columns
/// and B-tree indexes. Fails [`GrizzlyError::InvalidFileFormat`] on a bad
/// magic and [`GrizzlyError::UnsupportedVersion`] on anything but the
/// current format version.
pub fn load(path: &Path) -> Result<Database> {
    let bytes = fs::read(path)?;
    let mut reader = Reader::new(&bytes);
    reader.expect_magic(MAGIC)?;
    let version = reader.read_u16()?;
    if version != FORMAT_VERSION {
        return Err(GrizzlyError::UnsupportedVersion(version));
    }
    let _dbname = reader.read_string()?;
    let table_count = reader.read_u32()?;

    let mut db = Database::new();
    for _ in 0..table_count {
        let name = reader.read_string()?;
        let column_count = reader.read_u32()?;
        let mut schema = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let col_name = reader.read_string()?;
            let tag = reader.read_u8()?;
            let dim = reader.read_u16()?;
            schema.push(ColumnDef { name: col_name, data_type: DataType::from_tag(tag, dim)? });
        }
        let row_count = reader.read_u64()?;

        let mut columns = Vec::with_capacity(schema.len());
        for def in &schema {
            let codec_tag = reader.read_u8()?;
            let codec = grizzly_column::Codec::from_tag_byte(codec_tag)?;
            let blob = reader.read_bytes()?;
            columns.push(decode(blob, codec, def.data_type, row_count as usize)?);
        }

        let index_count = reader.read_u32()?;
        let mut descriptors = Vec::with_capacity(index_count as usize);
        for _ in 0..index_count {
            let index_name = reader.read_string()?;
            let column = reader.read_string()?;
            descriptors.push((index_name, column));
        }

        let mut table = Table::from_parts(name, schema, columns, row_count);
        for (index_name, column) in descriptors {
            table.create_index(index_name, &column)?;
        }
        db.insert_table(table)?;
    }

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grizzly_types::Value;

    fn metrics_db() -> Database {
        let mut db = Database::new();
        db.create_table(
            "metrics",
            vec![
                ColumnDef { name: "id".to_owned(), data_type: DataType::Int32 },
                ColumnDef { name: "value".to_owned(), data_type: DataType::String },
            ],
        )
        .unwrap();
        let table = db.get_table_mut("metrics").unwrap();
        table.insert_row(&[Value::Int32(1), Value::String(b"alpha")]).unwrap();
        table.insert_row(&[Value::Int32(2), Value::String(b"beta")]).unwrap();
        db
    }

    #[test]
    fn save_then_load_roundtrips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.griz");
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let db = metrics_db();
        save(&db, "maindb", &path, &checkpoint).unwrap();
        assert!(checkpoint.read().unwrap().is_none(), "checkpoint cleared after success");

        let loaded = load(&path).unwrap();
        let table = loaded.get_table("metrics").unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column(0).unwrap().get(0).unwrap(), Value::Int32(1));
        assert_eq!(table.column(1).unwrap().get(1).unwrap(), Value::String(b"beta"));
    }

    #[test]
    fn load_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.griz");
        fs::write(&path, b"NOPE0000").unwrap();
        assert!(matches!(load(&path).unwrap_err(), GrizzlyError::InvalidFileFormat { .. }));
    }

    #[test]
    fn load_rejects_future_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.griz");
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&99u16.to_le_bytes());
        fs::write(&path, bytes).unwrap();
        assert!(matches!(load(&path).unwrap_err(), GrizzlyError::UnsupportedVersion(99)));
    }

    #[test]
    fn save_writes_manifest_and_lakehouse_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.griz");
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));
        save(&metrics_db(), "maindb", &path, &checkpoint).unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.table_row_count("metrics"), Some(2));
        assert!(Manifest::lakehouse_dir(&path).join("metadata").join("metrics.json").is_file());
    }
}
