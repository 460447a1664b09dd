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
//! Tools for writing machine records into SQL databases
//!
//! The core is the [`MachineStore`](trait.MachineStore.html) trait, the persistence
//! gateway used by the form: it upserts a whole record keyed by its identifier and
//! can read records back. Every operation opens its own connection, runs a single
//! transaction and closes the connection again; nothing is pooled or cached.
//!
//! The SQL statements are not written by hand for each database. A record type
//! describes its table through the [`DbRecord`](trait.DbRecord.html) trait (one
//! [`DbColumn`](struct.DbColumn.html) per column, values in the same order) and the
//! [`DbRecordExt`](trait.DbRecordExt.html) extension trait derives the statements
//! from that, using the primitives of the database driver’s
//! [`DbMechanics`](trait.DbMechanics.html) implementation.
//!
//! # Upsert semantics
//!
//! Writing uses `insert … on conflict (key) do update set …` for every non-key
//! column, so saving a record twice yields the same row as saving it once, and a
//! later save fully replaces an earlier one (last write wins). All values are
//! bound as statement parameters.
//!
//! # Schema
//!
//! No migrations are performed. [`ensure_schema`](trait.MachineStore.html#method.ensure_schema)
//! creates the table if it does not exist; the key column carries a check
//! constraint rejecting the empty string, so a record without identifier is
//! refused by the store itself.
use crate::{
    config::{Backend, Settings},
    error::{ConfigurationError, PersistenceError},
    model::MachineRecord,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use itertools::Itertools;

mod postgre;
mod sqlite;

pub use postgre::{PostgresDbMechanics, PostgresStore};
pub use sqlite::{SqliteDbMechanics, SqliteStore};

/// Functions and types needed for constructing the SQL queries for a database driver
pub trait DbMechanics {
    /// the type into which each record value must be converted before binding it to a statement
    type SqlValue;

    /// A common prefix that is prepended to all table names within this database
    fn table_prefix(&self) -> &str;
    /// A function that computes a final table name; by default prepends the [`table_prefix`](#method.table_prefix)
    fn table_name(&self, table: &str) -> String {
        format!("{}{}", self.table_prefix(), table)
    }

    /// An iterator emitting parameter placeholder strings for use in prepared statements
    fn field_iter() -> Box<dyn Iterator<Item = String>>;
    /// Compute the SQL statement necessary to create the given table if it does not yet exist
    fn create_table(name: String, definition: String) -> String {
        format!("create table if not exists {} ({})", name, definition)
    }
    /// The column type to use in a CREATE TABLE statement
    fn column_type(kind: ColumnKind) -> &'static str;
    /// Wrap a parameter placeholder such that the database accepts the bound value for the column
    ///
    /// By default the placeholder is used as is.
    fn bind_value(placeholder: String, _kind: ColumnKind) -> String {
        placeholder
    }
    /// Expression for reading the column such that the driver can decode it as the column kind
    fn read_column(column: &str, _kind: ColumnKind) -> String {
        column.to_owned()
    }
    /// Convert one record value into something the driver can bind
    fn sql_value(value: DbValue) -> Self::SqlValue;
}

/// The two kinds of data stored in a record table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
}

/// A single value as transported between a record and its table row
#[derive(Clone, Debug, PartialEq)]
pub enum DbValue {
    Text(String),
    Number(f64),
}

impl DbValue {
    pub fn kind(&self) -> ColumnKind {
        match self {
            DbValue::Text(_) => ColumnKind::Text,
            DbValue::Number(_) => ColumnKind::Number,
        }
    }
    pub fn into_text(self) -> Result<String> {
        match self {
            DbValue::Text(s) => Ok(s),
            DbValue::Number(n) => Err(anyhow!("expected text, got number {}", n)),
        }
    }
    pub fn into_number(self) -> Result<f64> {
        match self {
            DbValue::Number(n) => Ok(n),
            DbValue::Text(s) => Err(anyhow!("expected number, got text {:?}", s)),
        }
    }
}

/// representation of a database column for use in a DbRecord
#[derive(Debug)]
pub struct DbColumn {
    /// name of the column to be used; must be suitable for the database as is, no quoting is done
    pub name: &'static str,
    /// kind of data held, mapped to a concrete type by the driver
    pub kind: ColumnKind,
    /// if true, this column is the primary key used for upserts
    ///
    /// Exactly one column must set this. Key columns of kind `Text` must not be empty.
    pub key: bool,
}

/// representation of a database table for some record type
pub trait DbRecord: Sized {
    /// name of the table
    ///
    /// If the database has been configured to use a common [`table_prefix()`](trait.DbMechanics.html#method.table_prefix)
    /// then that is prepended to this name to obtain the final name used in the database.
    fn table_name() -> &'static str;
    /// columns of this table
    ///
    /// Note that this intentionally has a return type that cannot be implemented dynamically.
    fn columns() -> &'static [DbColumn];
    /// values to fill the columns as defined by the `columns` function, in the same order
    fn values(&self) -> Vec<DbValue>;
    /// reconstruct a record from one row, the values being in `columns` order
    fn from_values(values: Vec<DbValue>) -> Result<Self>;
}

/// Extension trait automatically defined for every [`DbRecord`](trait.DbRecord.html)
///
/// The methods provided by this trait compute the SQL used by the store
/// implementations, based on the primitives of the underlying
/// [`DbMechanics`](trait.DbMechanics.html) implementation.
pub trait DbRecordExt<D: DbMechanics>: DbRecord {
    fn key_column() -> &'static DbColumn;
    fn create_table(db: &D) -> String;
    fn upsert_record(db: &D) -> String;
    fn select_record(db: &D) -> String;
    fn select_all(db: &D) -> String;
    fn sql_values(&self) -> Vec<D::SqlValue>;
}

impl<D: DbMechanics, T: DbRecord> DbRecordExt<D> for T {
    fn key_column() -> &'static DbColumn {
        // records are static descriptions, a missing key is a programming error
        T::columns()
            .iter()
            .find(|col| col.key)
            .unwrap_or_else(|| panic!("table {} has no key column", T::table_name()))
    }

    fn create_table(db: &D) -> String {
        let columns = T::columns()
            .iter()
            .map(|col| {
                if col.key {
                    format!(
                        "{name} {tpe} primary key check ({name} <> '')",
                        name = col.name,
                        tpe = D::column_type(col.kind)
                    )
                } else {
                    format!("{} {}", col.name, D::column_type(col.kind))
                }
            })
            .join(", ");
        D::create_table(db.table_name(T::table_name()), columns)
    }

    fn upsert_record(db: &D) -> String {
        let key = <T as DbRecordExt<D>>::key_column();
        let columns = T::columns().iter().map(|col| col.name).join(", ");
        let holes = T::columns()
            .iter()
            .zip(D::field_iter())
            .map(|(col, hole)| D::bind_value(hole, col.kind))
            .join(", ");
        let updates = T::columns()
            .iter()
            .filter(|col| !col.key)
            .map(|col| format!("{name} = excluded.{name}", name = col.name))
            .join(", ");
        format!(
            "insert into {} ({}) values ({}) on conflict ({}) do update set {}",
            db.table_name(T::table_name()),
            columns,
            holes,
            key.name,
            updates
        )
    }

    fn select_record(db: &D) -> String {
        let key = <T as DbRecordExt<D>>::key_column();
        let mut fields = D::field_iter();
        let hole = fields.next().unwrap_or_else(|| "?".to_owned());
        format!(
            "{} where {} = {}",
            select_columns::<D, T>(db),
            key.name,
            D::bind_value(hole, key.kind)
        )
    }

    fn select_all(db: &D) -> String {
        let key = <T as DbRecordExt<D>>::key_column();
        format!("{} order by {}", select_columns::<D, T>(db), key.name)
    }

    fn sql_values(&self) -> Vec<D::SqlValue> {
        self.values().into_iter().map(D::sql_value).collect()
    }
}

fn select_columns<D: DbMechanics, T: DbRecord>(db: &D) -> String {
    let columns = T::columns()
        .iter()
        .map(|col| D::read_column(col.name, col.kind))
        .join(", ");
    format!("select {} from {}", columns, db.table_name(T::table_name()))
}

/// The persistence gateway: one connection, one transaction per operation
pub trait MachineStore {
    /// human readable name of the driver, for logging
    fn name(&self) -> &'static str;
    /// insert the record or replace all non-key columns of the stored row with the same id
    fn upsert(&mut self, record: &MachineRecord) -> Result<(), PersistenceError>;
    /// read the stored row for the given id
    fn fetch(&mut self, id: &str) -> Result<Option<MachineRecord>, PersistenceError>;
    /// read all stored rows, ordered by id
    fn list(&mut self) -> Result<Vec<MachineRecord>, PersistenceError>;
    /// the current time as reported by the database server
    fn server_time(&mut self) -> Result<DateTime<Utc>, PersistenceError>;
    /// create the machines table if it does not exist yet
    fn ensure_schema(&mut self) -> Result<(), PersistenceError>;
}

impl<S: MachineStore + ?Sized> MachineStore for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn upsert(&mut self, record: &MachineRecord) -> Result<(), PersistenceError> {
        (**self).upsert(record)
    }
    fn fetch(&mut self, id: &str) -> Result<Option<MachineRecord>, PersistenceError> {
        (**self).fetch(id)
    }
    fn list(&mut self) -> Result<Vec<MachineRecord>, PersistenceError> {
        (**self).list()
    }
    fn server_time(&mut self) -> Result<DateTime<Utc>, PersistenceError> {
        (**self).server_time()
    }
    fn ensure_schema(&mut self) -> Result<(), PersistenceError> {
        (**self).ensure_schema()
    }
}

/// Refuse a record with a blank key before any connection is made
///
/// Tables created elsewhere need not carry the `check` constraint of
/// [`create_table`](trait.DbRecordExt.html#tymethod.create_table).
fn check_key(record: &MachineRecord) -> Result<(), PersistenceError> {
    if record.id.trim().is_empty() {
        return Err(PersistenceError::new(format!(
            "machine id must not be empty, got {:?}",
            record.id
        )));
    }
    Ok(())
}

/// Construct the store matching the configured connection URL
///
/// No connection is opened here; the first operation will do that.
pub fn open_store(settings: &Settings) -> Result<Box<dyn MachineStore>, ConfigurationError> {
    let prefix = settings.table_prefix.clone();
    Ok(match settings.backend()? {
        Backend::Postgres => Box::new(PostgresStore::new(prefix, settings.database_url.clone())),
        Backend::Sqlite(path) => Box::new(SqliteStore::new(prefix, path)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn must_build_postgres_upsert() {
        let db = PostgresDbMechanics::new("");
        let sql = <MachineRecord as DbRecordExt<_>>::upsert_record(&db);
        assert!(sql.starts_with(
            "insert into machines (id, name, status, total_produced, total_rejects, accepted_pieces, \
             ppm_rejection, efficiency, oee, on_time, off_time, idle_time, fault_time, shift_start, shift_end) \
             values ($1, $2, $3, $4::text::numeric, $5::text::numeric,"
        ));
        assert!(sql.contains("$15) on conflict (id) do update set name = excluded.name, status = excluded.status,"));
        assert!(sql.ends_with("shift_end = excluded.shift_end"));
        assert!(!sql.contains("id = excluded.id"));
    }

    #[test]
    fn must_refuse_blank_keys() {
        for id in &["", " ", "\t  "] {
            let record = MachineRecord {
                id: (*id).to_owned(),
                ..MachineRecord::default()
            };
            let err = check_key(&record).unwrap_err();
            assert!(err.message().starts_with("machine id must not be empty"), "{}", err);
        }
        let record = MachineRecord {
            id: "press 4".to_owned(),
            ..MachineRecord::default()
        };
        assert_eq!(check_key(&record), Ok(()));
    }

    #[test]
    fn must_build_sqlite_upsert() {
        let db = SqliteDbMechanics::new("plant");
        let sql = <MachineRecord as DbRecordExt<_>>::upsert_record(&db);
        assert!(sql.starts_with("insert into plant_machines (id, name,"));
        assert!(sql.contains(&format!("values ({})", vec!["?"; 15].join(", "))));
    }

    #[test]
    fn must_build_create_table() {
        let db = PostgresDbMechanics::new("");
        let sql = <MachineRecord as DbRecordExt<_>>::create_table(&db);
        assert!(sql.starts_with(
            "create table if not exists machines (id text primary key check (id <> ''), \
             name text, status text, total_produced numeric,"
        ));
        assert!(sql.ends_with("shift_start text, shift_end text)"));
    }

    #[test]
    fn must_build_selects() {
        let db = PostgresDbMechanics::new("");
        assert_eq!(
            <MachineRecord as DbRecordExt<_>>::select_all(&SqliteDbMechanics::new("")),
            "select id, name, status, total_produced, total_rejects, accepted_pieces, ppm_rejection, \
             efficiency, oee, on_time, off_time, idle_time, fault_time, shift_start, shift_end \
             from machines order by id"
        );
        let sql = <MachineRecord as DbRecordExt<_>>::select_record(&db);
        assert!(sql.contains("oee::double precision"));
        assert!(sql.ends_with("from machines where id = $1"));
    }

    #[test]
    fn must_pick_store_by_scheme() {
        let settings = Settings::from_lookup(|name| match name {
            "DATABASE_URL" => Some("sqlite:machines.db".to_owned()),
            _ => None,
        })
        .unwrap();
        assert_eq!(open_store(&settings).unwrap().name(), "Sqlite3(rusqlite)");

        let settings = Settings::from_lookup(|name| match name {
            "DATABASE_URL" => Some("postgres://localhost/plant".to_owned()),
            _ => None,
        })
        .unwrap();
        assert_eq!(
            open_store(&settings).unwrap().name(),
            "PostgreSQL(postgres)"
        );
    }
}
