//! Delta writer/reader (C10) and chain compaction (C11 policy).
//!
//! A delta is an append-only row-range file referencing a base snapshot.
//! `saveIncremental` compacts the chain into a fresh full snapshot once it
//! reaches [`crate::manifest::COMPACTION_THRESHOLD`] entries.

use std::fs;
use std::path::{Path, PathBuf};

use grizzly_error::{GrizzlyError, Result};
use grizzly_table::{ColumnDef, Database};
use grizzly_types::{DataType, Value};
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::manifest::{DeltaEntry, Manifest, SnapshotType, TableRowCount, COMPACTION_THRESHOLD};
use crate::snapshot::save;
use crate::wire::{write_bytes, write_string, write_u16, write_u32, write_u64, Reader};

/// Delta file magic, `"GRZD"`.
pub const MAGIC: &[u8; 4] = b"GRZD";
/// Current delta format version.
pub const FORMAT_VERSION: u16 = 1;

/// An owned, heap-backed copy of a cell's contents, used to round-trip a
/// value through the delta's row-major body without borrowing from the
/// byte cursor.
enum OwnedCell {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
    String(Vec<u8>),
    Timestamp(i64),
    Vector(Vec<f32>),
}

impl OwnedCell {
    fn as_value(&self) -> Value<'_> {
        match self {
            Self::Int32(v) => Value::Int32(*v),
            Self::Int64(v) => Value::Int64(*v),
            Self::Float32(v) => Value::Float32(*v),
            Self::Float64(v) => Value::Float64(*v),
            Self::Boolean(v) => Value::Boolean(*v),
            Self::String(v) => Value::String(v),
            Self::Timestamp(v) => Value::Timestamp(*v),
            Self::Vector(v) => Value::Vector(v),
        }
    }
}

fn write_value(out: &mut Vec<u8>, value: &Value<'_>) -> Result<()> {
    match value {
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int64(v) | Value::Timestamp(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Boolean(v) => out.push(u8::from(*v)),
        Value::String(bytes) => write_bytes(out, bytes),
        Value::Vector(floats) => {
            for f in *floats {
                out.extend_from_slice(&f.to_le_bytes());
            }
        }
        Value::Custom(_) | Value::Exception(_) => return Err(GrizzlyError::CustomTypeNotSupported),
    }
    Ok(())
}

fn read_cell(reader: &mut Reader<'_>, data_type: DataType) -> Result<OwnedCell> {
    Ok(match data_type {
        DataType::Int32 => OwnedCell::Int32(i32::from_le_bytes(reader.read_fixed(4)?.try_into().unwrap())),
        DataType::Int64 => OwnedCell::Int64(reader.read_i64()?),
        DataType::Timestamp => OwnedCell::Timestamp(reader.read_i64()?),
        DataType::Float32 => OwnedCell::Float32(f32::from_le_bytes(reader.read_fixed(4)?.try_into().unwrap())),
        DataType::Float64 => OwnedCell::Float64(f64::from_le_bytes(reader.read_fixed(8)?.try_into().unwrap())),
        DataType::Boolean => OwnedCell::Boolean(reader.read_u8()? != 0),
        DataType::String => OwnedCell::String(reader.read_bytes()?.to_vec()),
        DataType::Vector { dim } => {
            let mut floats = Vec::with_capacity(dim as usize);
            for _ in 0..dim {
                floats.push(f32::from_le_bytes(reader.read_fixed(4)?.try_into().unwrap()));
            }
            OwnedCell::Vector(floats)
        }
        DataType::Custom | DataType::Exception => return Err(GrizzlyError::CustomTypeNotSupported),
    })
}

/// Write every row appended to `db`'s tables since `base_snapshot`'s
/// manifest, then update (or compact) that manifest.
///
/// Fails [`GrizzlyError::NoChanges`] if no table has new rows.
pub fn save_incremental(
    db: &Database,
    dbname: &str,
    base_snapshot: &Path,
    delta_path: &Path,
    checkpoint: &CheckpointStore,
) -> Result<()> {
    let mut manifest = Manifest::load(base_snapshot)?;

    let mut pending = Vec::new();
    for (name, table) in db.tables_in_order() {
        let baseline = manifest.table_row_count(name).unwrap_or(0);
        let current = table.row_count();
        if current < baseline {
            return Err(GrizzlyError::SchemaMismatch {
                table: name.to_owned(),
                reason: "row_count regressed relative to the manifest".to_owned(),
            });
        }
        let new_rows = current - baseline;
        if new_rows > 0 {
            pending.push((name, table, baseline, new_rows));
        }
    }
    if pending.is_empty() {
        return Err(GrizzlyError::NoChanges);
    }

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    write_u16(&mut out, FORMAT_VERSION);
    write_string(&mut out, &base_snapshot.display().to_string());
    write_u32(&mut out, pending.len() as u32);
    for (name, table, start_row, new_rows) in &pending {
        write_string(&mut out, name);
        write_u64(&mut out, *start_row);
        write_u32(&mut out, table.schema().len() as u32);
        for def in table.schema() {
            write_string(&mut out, &def.name);
            out.push(def.data_type.tag_byte());
        }
        write_u64(&mut out, *new_rows);
        for row in *start_row..(*start_row + *new_rows) {
            for i in 0..table.schema().len() {
                let value = table.column(i).expect("schema/columns parallel").get(row as usize)?;
                write_value(&mut out, &value)?;
            }
        }
    }
    fs::write(delta_path, &out)?;

    for (name, table, _, _) in &pending {
        let row_count = table.row_count();
        match manifest.tables.iter_mut().find(|t| &t.name == name) {
            Some(entry) => entry.row_count = row_count,
            None => manifest.tables.push(TableRowCount { name: (*name).to_owned(), row_count }),
        }
    }
    manifest.deltas.push(DeltaEntry { path: delta_path.display().to_string(), timestamp: Manifest::now() });

    if manifest.delta_chain_length() >= COMPACTION_THRESHOLD {
        info!(chain_length = manifest.delta_chain_length(), "compacting delta chain into full snapshot");
        let stale_deltas = std::mem::take(&mut manifest.deltas);
        save(db, dbname, base_snapshot, checkpoint)?;
        for delta in stale_deltas {
            let _ = fs::remove_file(PathBuf::from(&delta.path));
        }
    } else {
        manifest.snapshot_type = SnapshotType::Incremental;
        manifest.timestamp = Manifest::now();
        manifest.save(base_snapshot)?;
    }
    Ok(())
}

/// Apply a previously written delta to `db`. Validates the delta's
/// recorded base path, each table's `start_row`, and column-by-column
/// schema equality before appending any rows.
pub fn apply_incremental(db: &mut Database, base_snapshot: &Path, delta_path: &Path) -> Result<()> {
    let bytes = fs::read(delta_path)?;
    let mut reader = Reader::new(&bytes);
    reader.expect_magic(MAGIC)?;
    let version = reader.read_u16()?;
    if version != FORMAT_VERSION {
        return Err(GrizzlyError::UnsupportedVersion(version));
    }
    let recorded_base = reader.read_string()?;
    let expected_base = base_snapshot.display().to_string();
    if recorded_base != expected_base {
        return Err(GrizzlyError::SnapshotMismatch { expected: expected_base, actual: recorded_base });
    }

    let table_count = reader.read_u32()?;
    for _ in 0..table_count {
        let name = reader.read_string()?;
        let start_row = reader.read_u64()?;
        let column_count = reader.read_u32()?;
        let mut delta_columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let col_name = reader.read_string()?;
            let tag = reader.read_u8()?;
            delta_columns.push((col_name, tag));
        }
        let new_row_count = reader.read_u64()?;

        let schema: Vec<ColumnDef> = {
            let table = db.get_table(&name)?;
            if table.row_count() != start_row {
                return Err(GrizzlyError::SnapshotOutOfDate {
                    table: name.clone(),
                    expected: start_row,
                    actual: table.row_count(),
                });
            }
            if table.schema().len() != delta_columns.len() {
                return Err(GrizzlyError::SchemaMismatch {
                    table: name.clone(),
                    reason: "column count differs from the delta".to_owned(),
                });
            }
            for (def, (col_name, tag)) in table.schema().iter().zip(&delta_columns) {
                if &def.name != col_name || def.data_type.tag_byte() != *tag {
                    return Err(GrizzlyError::SchemaMismatch {
                        table: name.clone(),
                        reason: format!("column {col_name} does not match the live schema"),
                    });
                }
            }
            table.schema().to_vec()
        };

        for _ in 0..new_row_count {
            let mut cells = Vec::with_capacity(schema.len());
            for def in &schema {
                cells.push(read_cell(&mut reader, def.data_type)?);
            }
            let values: Vec<Value<'_>> = cells.iter().map(OwnedCell::as_value).collect();
            db.get_table_mut(&name)?.insert_row(&values)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{load, save};
    use grizzly_types::DataType;

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
        db
    }

    #[test]
    fn incremental_snapshot_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("a.griz");
        let delta_path = dir.path().join("a.grzd");
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let mut db = metrics_db();
        {
            let table = db.get_table_mut("metrics").unwrap();
            table.insert_row(&[Value::Int32(1), Value::String(b"alpha")]).unwrap();
            table.insert_row(&[Value::Int32(2), Value::String(b"beta")]).unwrap();
        }
        save(&db, "maindb", &snapshot_path, &checkpoint).unwrap();

        db.get_table_mut("metrics").unwrap().insert_row(&[Value::Int32(3), Value::String(b"gamma")]).unwrap();
        save_incremental(&db, "maindb", &snapshot_path, &delta_path, &checkpoint).unwrap();

        let mut reloaded = load(&snapshot_path).unwrap();
        apply_incremental(&mut reloaded, &snapshot_path, &delta_path).unwrap();

        let table = reloaded.get_table("metrics").unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column(1).unwrap().get(2).unwrap(), Value::String(b"gamma"));
    }

    #[test]
    fn non_utf8_string_survives_incremental_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("a.griz");
        let delta_path = dir.path().join("a.grzd");
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let mut db = metrics_db();
        db.get_table_mut("metrics").unwrap().insert_row(&[Value::Int32(1), Value::String(b"alpha")]).unwrap();
        save(&db, "maindb", &snapshot_path, &checkpoint).unwrap();

        let non_utf8: &[u8] = b"\xff\xfe";
        db.get_table_mut("metrics").unwrap().insert_row(&[Value::Int32(2), Value::String(non_utf8)]).unwrap();
        save_incremental(&db, "maindb", &snapshot_path, &delta_path, &checkpoint).unwrap();

        let mut reloaded = load(&snapshot_path).unwrap();
        apply_incremental(&mut reloaded, &snapshot_path, &delta_path).unwrap();

        let table = reloaded.get_table("metrics").unwrap();
        assert_eq!(table.column(1).unwrap().get(1).unwrap(), Value::String(non_utf8));
    }

    #[test]
    fn no_new_rows_is_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("a.griz");
        let delta_path = dir.path().join("a.grzd");
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let db = metrics_db();
        save(&db, "maindb", &snapshot_path, &checkpoint).unwrap();
        let err = save_incremental(&db, "maindb", &snapshot_path, &delta_path, &checkpoint).unwrap_err();
        assert!(matches!(err, GrizzlyError::NoChanges));
    }

    #[test]
    fn reapplying_a_delta_is_out_of_date() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("a.griz");
        let delta_path = dir.path().join("a.grzd");
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let mut db = metrics_db();
        db.get_table_mut("metrics").unwrap().insert_row(&[Value::Int32(1), Value::String(b"alpha")]).unwrap();
        save(&db, "maindb", &snapshot_path, &checkpoint).unwrap();
        db.get_table_mut("metrics").unwrap().insert_row(&[Value::Int32(2), Value::String(b"beta")]).unwrap();
        save_incremental(&db, "maindb", &snapshot_path, &delta_path, &checkpoint).unwrap();

        let mut reloaded = load(&snapshot_path).unwrap();
        apply_incremental(&mut reloaded, &snapshot_path, &delta_path).unwrap();
        let err = apply_incremental(&mut reloaded, &snapshot_path, &delta_path).unwrap_err();
        assert!(matches!(err, GrizzlyError::SnapshotOutOfDate { .. }));
    }

    #[test]
    fn five_incremental_saves_compact_into_a_full_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("a.griz");
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let mut db = metrics_db();
        db.get_table_mut("metrics").unwrap().insert_row(&[Value::Int32(0), Value::String(b"seed")]).unwrap();
        save(&db, "maindb", &snapshot_path, &checkpoint).unwrap();

        for i in 1..=5 {
            db.get_table_mut("metrics")
                .unwrap()
                .insert_row(&[Value::Int32(i), Value::String(b"row")])
                .unwrap();
            let delta_path = dir.path().join(format!("delta-{i}.grzd"));
            save_incremental(&db, "maindb", &snapshot_path, &delta_path, &checkpoint).unwrap();
        }

        let manifest = Manifest::load(&snapshot_path).unwrap();
        assert_eq!(manifest.snapshot_type, SnapshotType::Full);
        assert!(manifest.deltas.is_empty());
        assert_eq!(manifest.table_row_count("metrics"), Some(6));
        for i in 1..=5 {
            assert!(!dir.path().join(format!("delta-{i}.grzd")).exists());
        }
    }
}
