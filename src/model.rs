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
//! The machine record and its table layout
use crate::db::{DbColumn, DbRecord, DbValue};
use anyhow::{anyhow, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const MACHINES_TABLE: &str = "machines";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    #[display(fmt = "running")]
    Running,
    #[display(fmt = "idle")]
    Idle,
    #[display(fmt = "off")]
    Off,
    #[display(fmt = "fault")]
    Fault,
}

impl MachineStatus {
    pub const ALL: [MachineStatus; 4] = [
        MachineStatus::Running,
        MachineStatus::Idle,
        MachineStatus::Off,
        MachineStatus::Fault,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MachineStatus::Running => "running",
            MachineStatus::Idle => "idle",
            MachineStatus::Off => "off",
            MachineStatus::Fault => "fault",
        }
    }
}

impl Default for MachineStatus {
    fn default() -> Self {
        MachineStatus::Running
    }
}

impl FromStr for MachineStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MachineStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "is not one of {}",
                    MachineStatus::ALL
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// Status and shift metrics of one machine, the only thing ever written to the store
///
/// The `id` is the primary key: saving a record with an existing `id` replaces all
/// other columns of the stored row.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRecord {
    pub id: String,
    pub name: String,
    pub status: MachineStatus,
    pub total_produced: f64,
    pub total_rejects: f64,
    pub accepted_pieces: f64,
    pub ppm_rejection: f64,
    pub efficiency: f64,
    pub oee: f64,
    /// hours
    pub on_time: f64,
    pub off_time: f64,
    pub idle_time: f64,
    pub fault_time: f64,
    /// HH:MM, not validated
    pub shift_start: String,
    pub shift_end: String,
}

impl MachineRecord {
    /// metric counters and rates in form order
    pub fn metrics(&self) -> [f64; 6] {
        [
            self.total_produced,
            self.total_rejects,
            self.accepted_pieces,
            self.ppm_rejection,
            self.efficiency,
            self.oee,
        ]
    }

    /// on/off/idle/fault hours in form order
    pub fn durations(&self) -> [f64; 4] {
        [self.on_time, self.off_time, self.idle_time, self.fault_time]
    }
}

impl DbRecord for MachineRecord {
    fn table_name() -> &'static str {
        MACHINES_TABLE
    }

    fn columns() -> &'static [DbColumn] {
        use crate::db::ColumnKind::{Number, Text};
        static X: &[DbColumn] = &[
            DbColumn {
                name: "id",
                kind: Text,
                key: true,
            },
            DbColumn {
                name: "name",
                kind: Text,
                key: false,
            },
            DbColumn {
                name: "status",
                kind: Text,
                key: false,
            },
            DbColumn {
                name: "total_produced",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "total_rejects",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "accepted_pieces",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "ppm_rejection",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "efficiency",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "oee",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "on_time",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "off_time",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "idle_time",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "fault_time",
                kind: Number,
                key: false,
            },
            DbColumn {
                name: "shift_start",
                kind: Text,
                key: false,
            },
            DbColumn {
                name: "shift_end",
                kind: Text,
                key: false,
            },
        ];
        X
    }

    fn values(&self) -> Vec<DbValue> {
        vec![
            DbValue::Text(self.id.clone()),
            DbValue::Text(self.name.clone()),
            DbValue::Text(self.status.to_string()),
            DbValue::Number(self.total_produced),
            DbValue::Number(self.total_rejects),
            DbValue::Number(self.accepted_pieces),
            DbValue::Number(self.ppm_rejection),
            DbValue::Number(self.efficiency),
            DbValue::Number(self.oee),
            DbValue::Number(self.on_time),
            DbValue::Number(self.off_time),
            DbValue::Number(self.idle_time),
            DbValue::Number(self.fault_time),
            DbValue::Text(self.shift_start.clone()),
            DbValue::Text(self.shift_end.clone()),
        ]
    }

    fn from_values(values: Vec<DbValue>) -> Result<Self> {
        let expected = Self::columns().len();
        if values.len() != expected {
            return Err(anyhow!(
                "expected {} columns for a machine row, got {}",
                expected,
                values.len()
            ));
        }
        let mut it = values.into_iter();
        let mut text = || -> Result<String> { it_next(&mut it)?.into_text() };
        let id = text()?;
        let name = text()?;
        let status = text()?;
        let status = status
            .parse::<MachineStatus>()
            .map_err(|reason| anyhow!("stored status {:?} {}", status, reason))?;
        let mut number = || -> Result<f64> { it_next(&mut it)?.into_number() };
        let total_produced = number()?;
        let total_rejects = number()?;
        let accepted_pieces = number()?;
        let ppm_rejection = number()?;
        let efficiency = number()?;
        let oee = number()?;
        let on_time = number()?;
        let off_time = number()?;
        let idle_time = number()?;
        let fault_time = number()?;
        let mut text = || -> Result<String> { it_next(&mut it)?.into_text() };
        let shift_start = text()?;
        let shift_end = text()?;
        Ok(Self {
            id,
            name,
            status,
            total_produced,
            total_rejects,
            accepted_pieces,
            ppm_rejection,
            efficiency,
            oee,
            on_time,
            off_time,
            idle_time,
            fault_time,
            shift_start,
            shift_end,
        })
    }
}

fn it_next(it: &mut impl Iterator<Item = DbValue>) -> Result<DbValue> {
    it.next().ok_or_else(|| anyhow!("machine row ended early"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn must_parse_status() {
        for status in MachineStatus::ALL.iter() {
            assert_eq!(status.to_string().parse::<MachineStatus>(), Ok(*status));
        }
        assert_eq!(
            "broken".parse::<MachineStatus>(),
            Err("is not one of running, idle, off, fault".to_owned())
        );
        assert_eq!(MachineStatus::default(), MachineStatus::Running);
    }

    #[test]
    fn must_match_columns() {
        let record = MachineRecord {
            id: "m".to_owned(),
            status: MachineStatus::Off,
            oee: 12.5,
            shift_end: "22:00".to_owned(),
            ..MachineRecord::default()
        };
        let values = record.values();
        assert_eq!(values.len(), MachineRecord::columns().len());
        for (value, col) in values.iter().zip(MachineRecord::columns()) {
            assert_eq!(value.kind(), col.kind, "column {}", col.name);
        }
        assert_eq!(MachineRecord::from_values(values).unwrap(), record);
    }

    #[test]
    fn must_reject_short_rows() {
        let mut values = MachineRecord::default().values();
        values.pop();
        assert!(MachineRecord::from_values(values).is_err());
    }

    #[test]
    fn must_serialize_camel_case() {
        let record = MachineRecord {
            id: "machine-9".to_owned(),
            total_produced: 3.0,
            ..MachineRecord::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["totalProduced"], 3.0);
        assert_eq!(json["status"], "running");
        assert_eq!(json["shiftStart"], "");
    }
}
