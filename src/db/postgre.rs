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
use anyhow::Result;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use postgres::{types::ToSql, Client, Row};
use postgres_native_tls::MakeTlsConnector;
use tracing::{debug, info, instrument, trace_span};

/// Database driver for PostgreSQL, based on the postgres crate
///
/// Holds only the connection string; each operation connects anew and closes the
/// connection when done.
pub struct PostgresStore {
    url: String,
    mechanics: PostgresDbMechanics,
}

fn with_sql<T>(
    v: Vec<Box<dyn ToSql + Sync>>,
    f: impl FnOnce(&[&(dyn ToSql + Sync)]) -> Result<T>,
) -> Result<T> {
    let v2 = v.iter().map(|b| &**b).collect::<Vec<_>>();
    f(v2.as_slice())
}

fn read_row<T: DbRecord>(row: &Row) -> Result<T> {
    let values = T::columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| -> Result<DbValue> {
            // NULLs may be present in tables not created by us
            Ok(match col.kind {
                ColumnKind::Text => {
                    DbValue::Text(row.try_get::<_, Option<String>>(idx)?.unwrap_or_default())
                }
                ColumnKind::Number => {
                    DbValue::Number(row.try_get::<_, Option<f64>>(idx)?.unwrap_or_default())
                }
            })
        })
        .collect::<Result<Vec<_>>>()?;
    T::from_values(values)
}

impl PostgresStore {
    pub fn new(prefix: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mechanics: PostgresDbMechanics::new(prefix),
        }
    }

    fn connect(&self) -> Result<Client> {
        let tls_mode = MakeTlsConnector::new(TlsConnector::new()?);
        trace_span!("connect").in_scope(|| -> Result<_> {
            let ret = Client::connect(self.url.as_str(), tls_mode)?;
            debug!("new connection");
            Ok(ret)
        })
    }

    #[instrument(skip(self, record), level = "trace")]
    fn upsert_record<T: DbRecord>(&self, record: &T) -> Result<()> {
        let mut conn = self.connect()?;
        let mut tx = conn.transaction()?;
        let upsert = <T as DbRecordExt<PostgresDbMechanics>>::upsert_record(&self.mechanics);
        let values = <T as DbRecordExt<PostgresDbMechanics>>::sql_values(record);
        let rows = with_sql(values, |params| Ok(tx.execute(upsert.as_str(), params)?))?;
        tx.commit()?;
        debug!(rows, "done writing");
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    fn select_record<T: DbRecord>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connect()?;
        let mut tx = conn.transaction()?;
        let select = <T as DbRecordExt<PostgresDbMechanics>>::select_record(&self.mechanics);
        let row = tx.query_opt(select.as_str(), &[&key])?;
        tx.commit()?;
        row.as_ref().map(read_row::<T>).transpose()
    }

    #[instrument(skip(self), level = "trace")]
    fn select_all<T: DbRecord>(&self) -> Result<Vec<T>> {
        let mut conn = self.connect()?;
        let mut tx = conn.transaction()?;
        let select = <T as DbRecordExt<PostgresDbMechanics>>::select_all(&self.mechanics);
        let rows = tx.query(select.as_str(), &[])?;
        tx.commit()?;
        rows.iter().map(read_row::<T>).collect()
    }

    #[instrument(skip(self), level = "trace")]
    fn create_table<T: DbRecord>(&self) -> Result<()> {
        let mut conn = self.connect()?;
        let mut tx = conn.transaction()?;
        let create = <T as DbRecordExt<PostgresDbMechanics>>::create_table(&self.mechanics);
        tx.execute(create.as_str(), &[])?;
        tx.commit()?;
        info!(
            "table {} is present",
            self.mechanics.table_name(T::table_name())
        );
        Ok(())
    }

    #[cfg(test)]
    fn drop_table<T: DbRecord>(&self) -> Result<()> {
        let mut conn = self.connect()?;
        conn.batch_execute(
            format!(
                "drop table if exists {}",
                self.mechanics.table_name(T::table_name())
            )
            .as_str(),
        )?;
        Ok(())
    }
}

/// Database mechanics definitions for the PostgreSQL driver
///
/// Record numbers are bound as their shortest decimal text and cast by the server
/// into the `numeric` columns, so every `f64` is stored exactly. They are read
/// back as `double precision`.
pub struct PostgresDbMechanics {
    prefix: String,
}

impl PostgresDbMechanics {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() {
            prefix.push('_');
        }
        Self { prefix }
    }
}

impl DbMechanics for PostgresDbMechanics {
    type SqlValue = Box<dyn ToSql + Sync>;

    fn table_prefix(&self) -> &str {
        &self.prefix
    }
    fn field_iter() -> Box<dyn Iterator<Item = String>> {
        Box::new((1..usize::MAX).map(|i| format!("${}", i)))
    }
    fn column_type(kind: ColumnKind) -> &'static str {
        match kind {
            ColumnKind::Text => "text",
            ColumnKind::Number => "numeric",
        }
    }
    fn bind_value(placeholder: String, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::Text => placeholder,
            ColumnKind::Number => format!("{}::text::numeric", placeholder),
        }
    }
    fn read_column(column: &str, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::Text => column.to_owned(),
            ColumnKind::Number => format!("{}::double precision", column),
        }
    }
    fn sql_value(value: DbValue) -> Self::SqlValue {
        match value {
            DbValue::Text(s) => Box::new(s),
            DbValue::Number(n) => Box::new(n.to_string()),
        }
    }
}

impl MachineStore for PostgresStore {
    fn name(&self) -> &'static str {
        "PostgreSQL(postgres)"
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
        let mut conn = self.connect()?;
        let row = conn
            .query_one("select now()", &[])
            .map_err(anyhow::Error::from)?;
        Ok(row
            .try_get::<_, DateTime<Utc>>(0)
            .map_err(anyhow::Error::from)?)
    }

    fn ensure_schema(&mut self) -> Result<(), PersistenceError> {
        Ok(self.create_table::<MachineRecord>()?)
    }
}
