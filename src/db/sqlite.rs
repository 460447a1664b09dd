/*
 * Copyright 2020 Actyx AG
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */
use super::{check_key, ColumnKind, DbMechanics, DbRecord, DbRecordExt, DbValue, MachineStore};
use crate::{error::PersistenceError, model::MachineRecord};
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::{params_from_iter, Connection, OpenFlags, Row, ToSql};
use std::path::PathBuf;
use tracing::{debug, info, instrument, trace_span};

/// Database driver for Sqlite3, based on the rusqlite crate
///
/// Every operation opens the database file, creating it and the record table if
/// necessary, and closes it again when done.
pub struct SqliteStore {
    path: PathBuf,
    mechanics: SqliteDbMechanics,
}

fn read_row<T: DbRecord>(row: &Row<'_>) -> Result<T> {
    let values = T::columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| -> Result<DbValue> {
            Ok(match col.kind {
                ColumnKind::Text => {
                    DbValue::Text(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
                }
                ColumnKind::Number => {
                    DbValue::Number(row.get::<_, Option<f64>>(idx)?.unwrap_or_default())
                }
            })
        })
        .collect::<Result<Vec<_>>>()?;
    T::from_values(values)
}

impl SqliteStore {
    pub fn new(prefix: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mechanics: SqliteDbMechanics::new(prefix),
        }
    }

    fn connect<T: DbRecord>(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = trace_span!("connect", path = %self.path.display()).in_scope(
            || -> Result<_> {
                let conn = Connection::open_with_flags(&self.path, flags)?;

                // `PRAGMA journal_mode = WAL;` https://www.sqlite.org/wal.html
                // This PRAGMA statement returns the new journal mode, so we need to see if it succeeded
                let mode = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| {
                    row.get::<_, String>(0)
                })?;
                match mode.as_str() {
                    "wal" | "memory" => {}
                    other => return Err(anyhow!("cannot switch to WAL, journal mode is {}", other)),
                }
                // `PRAGMA synchronous = NORMAL;` https://www.sqlite.org/pragma.html#pragma_synchronous
                conn.execute("PRAGMA synchronous = NORMAL;", [])?;

                debug!("new connection");
                Ok(conn)
            },
        )?;

        conn.execute_batch(
            format!(
                "{};",
                <T as DbRecordExt<SqliteDbMechanics>>::create_table(&self.mechanics)
            )
            .as_str(),
        )?;
        Ok(conn)
    }

    #[instrument(skip(self, record), level = "trace")]
    fn upsert_record<T: DbRecord>(&self, record: &T) -> Result<()> {
        let mut conn = self.connect::<T>()?;
        let tx = conn.transaction()?;
        let upsert = <T as DbRecordExt<SqliteDbMechanics>>::upsert_record(&self.mechanics);
        let values = <T as DbRecordExt<SqliteDbMechanics>>::sql_values(record);
        let rows = tx.execute(upsert.as_str(), params_from_iter(values.iter()))?;
        tx.commit()?;
        debug!(rows, "done writing");
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    fn select_record<T: DbRecord>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.connect::<T>()?;
        let select = <T as DbRecordExt<SqliteDbMechanics>>::select_record(&self.mechanics);
        let mut stmt = conn.prepare(select.as_str())?;
        let mut rows = stmt.query([key])?;
        let ret = match rows.next()? {
            Some(row) => Some(read_row::<T>(row)?),
            None => None,
        };
        Ok(ret)
    }

    #[instrument(skip(self), level = "trace")]
    fn select_all<T: DbRecord>(&self) -> Result<Vec<T>> {
        let conn = self.connect::<T>()?;
        let select = <T as DbRecordExt<SqliteDbMechanics>>::select_all(&self.mechanics);
        let mut stmt = conn.prepare(select.as_str())?;
        let mut rows = stmt.query([])?;
        let mut ret = vec![];
        while let Some(row) = rows.next()? {
            ret.push(read_row::<T>(row)?);
        }
        Ok(ret)
    }
}

/// Database mechanics definitions for the Sqlite3 driver
pub struct SqliteDbMechanics {
    prefix: String,
}

impl SqliteDbMechanics {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() {
            prefix.push('_');
        }
        Self { prefix }
    }
}

impl DbMechanics for SqliteDbMechanics {
    type SqlValue = Box<dyn ToSql>;

    fn table_prefix(&self) -> &str {
        &self.prefix
    }
    fn field_iter() -> Box<dyn Iterator<Item = String>> {
        Box::new(std::iter::repeat("?".to_owned()))
    }
    fn column_type(kind: ColumnKind) -> &'static str {
        match kind {
            ColumnKind::Text => "text",
            // numeric affinity stores whole numbers as integers, rusqlite widens them back
            ColumnKind::Number => "numeric",
        }
    }
    fn sql_value(value: DbValue) -> Self::SqlValue {
        match value {
            DbValue::Text(s) => Box::new(s),
            DbValue::Number(n) => Box::new(n),
        }
    }
}

impl MachineStore for SqliteStore {
    fn name(&self) -> &'static str {
        "Sqlite3(rusqlite)"
    }

    fn upsert(&mut self, record: &MachineRecord) -> Result<(), PersistenceError> {
        check_key(record)?;
        Ok(self.upsert_record(record)?)
    }

    fn fetch(&mut self, id: &str) -> Result<Option<MachineRecord>, PersistenceError> {
        Ok(self.select_record::<MachineRecord>(id)?)
    }

    fn list(&mut self) -> Result<Vec<MachineRecord>, PersistenceError> {
        Ok(self.select_all::<MachineRecord>()?)
    }

    fn server_time(&mut self) -> Result<DateTime<Utc>, PersistenceError> {
        let conn = self.connect::<MachineRecord>()?;
        let now = conn
            .query_row("select datetime('now')", [], |row| row.get::<_, String>(0))
            .map_err(anyhow::Error::from)?;
        let now = NaiveDateTime::parse_from_str(now.as_str(), "%Y-%m-%d %H:%M:%S")
            .map_err(anyhow::Error::from)?;
        Ok(Utc.from_utc_datetime(&now))
    }

    fn ensure_schema(&mut self) -> Result<(), PersistenceError> {
        self.connect::<MachineRecord>()?;
        info!(
            "table {} is present in {}",
            self.mechanics.table_name(MachineRecord::table_name()),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MachineStatus;

    fn record(id: &str) -> MachineRecord {
        MachineRecord {
            id: id.to_owned(),
            name: "Packaging Unit 03".to_owned(),
            status: MachineStatus::Fault,
            total_produced: 1205.0,
            total_rejects: 156.0,
            accepted_pieces: 1049.0,
            ppm_rejection: 129461.0,
            efficiency: 45.2,
            oee: 38.7,
            on_time: 3.0,
            off_time: 2.5,
            idle_time: 1.0,
            fault_time: 1.5,
            shift_start: "06:00".to_owned(),
            shift_end: "14:00".to_owned(),
        }
    }

    fn store(dir: &tempfile::TempDir) -> SqliteStore {
        SqliteStore::new("", dir.path().join("machines.db"))
    }

    #[test_log::test]
    fn sqlite_must_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = store(&dir);
        assert_eq!(db.fetch("machine-3").unwrap(), None);

        let input = record("machine-3");
        db.upsert(&input).unwrap();
        assert_eq!(db.fetch("machine-3").unwrap(), Some(input));
    }

    #[test]
    fn sqlite_must_be_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = store(&dir);
        let input = record("machine-3");
        db.upsert(&input).unwrap();
        let once = db.list().unwrap();
        db.upsert(&input).unwrap();
        assert_eq!(db.list().unwrap(), once);
        assert_eq!(once, vec![input]);
    }

    #[test]
    fn sqlite_must_replace_all_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = store(&dir);
        db.upsert(&record("machine-3")).unwrap();
        let replacement = MachineRecord {
            id: "machine-3".to_owned(),
            name: "Packaging Unit 03b".to_owned(),
            ..MachineRecord::default()
        };
        db.upsert(&replacement).unwrap();
        assert_eq!(db.list().unwrap(), vec![replacement]);
    }

    #[test]
    fn sqlite_must_list_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = store(&dir);
        for id in &["machine-3", "machine-1", "machine-2"] {
            db.upsert(&record(id)).unwrap();
        }
        let ids = db
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["machine-1", "machine-2", "machine-3"]);
    }

    #[test]
    fn sqlite_must_reject_empty_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = store(&dir);
        for id in &["", "   "] {
            let err = db.upsert(&record(id)).unwrap_err();
            assert!(err.message().starts_with("machine id must not be empty"), "{}", err);
        }
        let err = db.upsert_record(&record("")).unwrap_err();
        assert!(format!("{:#}", err).contains("CHECK constraint failed"), "{:#}", err);
        assert_eq!(db.list().unwrap(), vec![]);
    }

    #[test]
    fn sqlite_must_reject_empty_key_without_constraint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machines.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "create table machines (id text primary key, name text, status text, \
             total_produced numeric, total_rejects numeric, accepted_pieces numeric, \
             ppm_rejection numeric, efficiency numeric, oee numeric, on_time numeric, \
             off_time numeric, idle_time numeric, fault_time numeric, \
             shift_start text, shift_end text);",
        )
        .unwrap();
        drop(conn);

        let mut db = SqliteStore::new("", path);
        assert!(db.upsert(&record("")).is_err());
        db.upsert(&record("machine-3")).unwrap();
        let ids = db
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["machine-3"]);
    }

    #[test]
    fn sqlite_must_keep_fractions_and_whole_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = store(&dir);
        let input = MachineRecord {
            total_produced: 4582.0,
            efficiency: 0.1 + 0.2,
            ..record("machine-1")
        };
        db.upsert(&input).unwrap();
        assert_eq!(db.fetch("machine-1").unwrap(), Some(input));
    }

    #[test]
    fn sqlite_must_use_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machines.db");
        let mut db = SqliteStore::new("hall2", path.clone());
        db.ensure_schema().unwrap();
        db.upsert(&record("machine-1")).unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("select count(*) from hall2_machines", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn sqlite_must_report_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = store(&dir);
        let before = Utc::now() - chrono::Duration::seconds(5);
        assert!(db.server_time().unwrap() > before);
    }

    #[test]
    fn sqlite_must_report_unopenable_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = SqliteStore::new("", dir.path().join("missing").join("machines.db"));
        let err = db.upsert(&record("machine-1")).unwrap_err();
        assert!(err.message().contains("unable to open"), "{}", err);
    }
}
