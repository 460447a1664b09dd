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
//! The machine form: field state, sample pre-fill and the save action
//!
//! The form holds the text of every field exactly as typed. Nothing is converted
//! until [`save`](struct.FormController.html#method.save) turns a snapshot of the
//! fields into a [`MachineRecord`](../model/struct.MachineRecord.html) and hands it
//! to the persistence gateway. Selecting an identifier only ever touches the
//! in-memory fields, so all of this can be exercised without a database or a
//! terminal.
use crate::{
    catalog,
    db::MachineStore,
    error::{SaveError, ValidationError},
    model::{MachineRecord, MachineStatus},
};
use serde::Serialize;
use std::{fmt, str::FromStr};
use tracing::{debug, warn};

/// One editable field of the form
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Id,
    Name,
    Status,
    TotalProduced,
    TotalRejects,
    AcceptedPieces,
    PpmRejection,
    Efficiency,
    Oee,
    OnTime,
    OffTime,
    IdleTime,
    FaultTime,
    ShiftStart,
    ShiftEnd,
}

const METRICS: [Field; 6] = [
    Field::TotalProduced,
    Field::TotalRejects,
    Field::AcceptedPieces,
    Field::PpmRejection,
    Field::Efficiency,
    Field::Oee,
];

const DURATIONS: [Field; 4] = [
    Field::OnTime,
    Field::OffTime,
    Field::IdleTime,
    Field::FaultTime,
];

impl Field {
    /// all fields in display order
    pub const ALL: [Field; 15] = [
        Field::Id,
        Field::Name,
        Field::Status,
        Field::TotalProduced,
        Field::TotalRejects,
        Field::AcceptedPieces,
        Field::PpmRejection,
        Field::Efficiency,
        Field::Oee,
        Field::OnTime,
        Field::OffTime,
        Field::IdleTime,
        Field::FaultTime,
        Field::ShiftStart,
        Field::ShiftEnd,
    ];

    /// name used on the command line
    pub fn key(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Name => "name",
            Field::Status => "status",
            Field::TotalProduced => "total-produced",
            Field::TotalRejects => "total-rejects",
            Field::AcceptedPieces => "accepted-pieces",
            Field::PpmRejection => "ppm-rejection",
            Field::Efficiency => "efficiency",
            Field::Oee => "oee",
            Field::OnTime => "on-time",
            Field::OffTime => "off-time",
            Field::IdleTime => "idle-time",
            Field::FaultTime => "fault-time",
            Field::ShiftStart => "shift-start",
            Field::ShiftEnd => "shift-end",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Id => "Machine ID",
            Field::Name => "Machine Name",
            Field::Status => "Status",
            Field::TotalProduced => "Total Produced",
            Field::TotalRejects => "Total Rejects",
            Field::AcceptedPieces => "Accepted Pieces",
            Field::PpmRejection => "PPM Rejection",
            Field::Efficiency => "Efficiency",
            Field::Oee => "OEE",
            Field::OnTime => "On Time",
            Field::OffTime => "Off Time",
            Field::IdleTime => "Idle Time",
            Field::FaultTime => "Fault Time",
            Field::ShiftStart => "Shift Start (HH:MM)",
            Field::ShiftEnd => "Shift End (HH:MM)",
        }
    }

    pub fn is_numeric(self) -> bool {
        METRICS.contains(&self) || DURATIONS.contains(&self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.key() == wanted)
            .ok_or_else(|| format!("unknown field {:?}", s))
    }
}

/// The text of all form fields
///
/// Numeric fields are kept as text like in an entry widget; they are parsed
/// only when a record is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub id: String,
    pub name: String,
    pub status: String,
    pub metrics: [String; 6],
    pub durations: [String; 4],
    pub shift_start: String,
    pub shift_end: String,
}

fn number_text(n: f64) -> String {
    n.to_string()
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            status: MachineStatus::default().to_string(),
            metrics: Default::default(),
            durations: Default::default(),
            shift_start: String::new(),
            shift_end: String::new(),
        }
        .with_zeroes()
    }
}

impl FormState {
    fn with_zeroes(mut self) -> Self {
        for text in self.metrics.iter_mut().chain(self.durations.iter_mut()) {
            *text = number_text(0.0);
        }
        self
    }

    /// The field texts showing the given record
    pub fn from_record(record: &MachineRecord) -> Self {
        let mut metrics: [String; 6] = Default::default();
        for (text, n) in metrics.iter_mut().zip(record.metrics().iter()) {
            *text = number_text(*n);
        }
        let mut durations: [String; 4] = Default::default();
        for (text, n) in durations.iter_mut().zip(record.durations().iter()) {
            *text = number_text(*n);
        }
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            status: record.status.to_string(),
            metrics,
            durations,
            shift_start: record.shift_start.clone(),
            shift_end: record.shift_end.clone(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Id => &self.id,
            Field::Name => &self.name,
            Field::Status => &self.status,
            Field::ShiftStart => &self.shift_start,
            Field::ShiftEnd => &self.shift_end,
            numeric => self.numeric(numeric),
        }
    }

    fn numeric(&self, field: Field) -> &str {
        if let Some(idx) = METRICS.iter().position(|f| *f == field) {
            &self.metrics[idx]
        } else if let Some(idx) = DURATIONS.iter().position(|f| *f == field) {
            &self.durations[idx]
        } else {
            ""
        }
    }

    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Id => &mut self.id,
            Field::Name => &mut self.name,
            Field::Status => &mut self.status,
            Field::ShiftStart => &mut self.shift_start,
            Field::ShiftEnd => &mut self.shift_end,
            numeric => {
                if let Some(idx) = METRICS.iter().position(|f| *f == numeric) {
                    &mut self.metrics[idx]
                } else {
                    let idx = DURATIONS
                        .iter()
                        .position(|f| *f == numeric)
                        .unwrap_or_default();
                    &mut self.durations[idx]
                }
            }
        }
    }

    /// Convert the field texts into a record
    ///
    /// Blank numeric fields count as zero; anything else must be a finite number.
    pub fn to_record(&self) -> Result<MachineRecord, ValidationError> {
        let status = self
            .status
            .trim()
            .parse::<MachineStatus>()
            .map_err(|reason| ValidationError::new(Field::Status.label(), &self.status, reason))?;
        let number = |field: Field| parse_number(field, self.get(field));
        Ok(MachineRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            status,
            total_produced: number(Field::TotalProduced)?,
            total_rejects: number(Field::TotalRejects)?,
            accepted_pieces: number(Field::AcceptedPieces)?,
            ppm_rejection: number(Field::PpmRejection)?,
            efficiency: number(Field::Efficiency)?,
            oee: number(Field::Oee)?,
            on_time: number(Field::OnTime)?,
            off_time: number(Field::OffTime)?,
            idle_time: number(Field::IdleTime)?,
            fault_time: number(Field::FaultTime)?,
            shift_start: self.shift_start.clone(),
            shift_end: self.shift_end.clone(),
        })
    }
}

fn parse_number(field: Field, text: &str) -> Result<f64, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(ValidationError::new(
            field.label(),
            text,
            "is not a finite number",
        )),
    }
}

/// Owns the form state and implements the form's actions
#[derive(Debug, Default)]
pub struct FormController {
    state: FormState,
}

impl FormController {
    pub fn new() -> Self {
        Self::default()
    }

    /// An owned copy of the current field texts
    pub fn snapshot(&self) -> FormState {
        self.state.clone()
    }

    pub fn get(&self, field: Field) -> &str {
        self.state.get(field)
    }

    /// Handler for a change of the identifier field
    ///
    /// A sample identifier fills all other fields from the catalog; any other
    /// identifier leaves them alone so a new machine can be entered by hand.
    pub fn on_identifier_changed(&mut self, id: &str) {
        self.state.id = id.to_owned();
        if let Some(sample) = catalog::lookup(id) {
            debug!(id, "filling form from sample catalog");
            self.state = FormState::from_record(&sample);
        }
    }

    /// Select a machine by identifier, see [`on_identifier_changed`](#method.on_identifier_changed)
    pub fn select_machine(&mut self, id: &str) {
        self.on_identifier_changed(id)
    }

    /// Replace the text of one field
    ///
    /// The status only accepts one of the machine states and keeps its value
    /// otherwise. Changing the identifier goes through the identifier handler.
    pub fn set_field(&mut self, field: Field, value: &str) -> Result<(), ValidationError> {
        match field {
            Field::Id => self.on_identifier_changed(value),
            Field::Status => {
                let status = value
                    .trim()
                    .parse::<MachineStatus>()
                    .map_err(|reason| ValidationError::new(field.label(), value, reason))?;
                self.state.status = status.to_string();
            }
            other => *self.state.slot(other) = value.to_owned(),
        }
        Ok(())
    }

    /// Clear the form for entering a new machine
    pub fn reset(&mut self) {
        self.state = FormState::default();
    }

    /// Write the current field values to the store with a single upsert
    ///
    /// The form state is never modified, whatever the outcome, so the user may
    /// correct the input and try again.
    pub fn save<S: MachineStore + ?Sized>(&self, store: &mut S) -> Result<MachineRecord, SaveError> {
        let snapshot = self.snapshot();
        let record = snapshot.to_record().map_err(|err| {
            debug!(%err, "form input rejected");
            err
        })?;
        store.upsert(&record).map_err(|err| {
            warn!(id = %record.id, store = store.name(), %err, "saving machine failed");
            err
        })?;
        debug!(id = %record.id, "machine saved");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::SqliteStore, error::PersistenceError};
    use chrono::{DateTime, Utc};
    use std::collections::BTreeMap;

    /// in-memory stand-in for the database
    #[derive(Default)]
    struct MemoryStore {
        rows: BTreeMap<String, MachineRecord>,
        upserts: usize,
        fail_with: Option<String>,
    }

    impl MachineStore for MemoryStore {
        fn name(&self) -> &'static str {
            "memory"
        }
        fn upsert(&mut self, record: &MachineRecord) -> Result<(), PersistenceError> {
            self.upserts += 1;
            if let Some(msg) = &self.fail_with {
                return Err(PersistenceError::new(msg.clone()));
            }
            self.rows.insert(record.id.clone(), record.clone());
            Ok(())
        }
        fn fetch(&mut self, id: &str) -> Result<Option<MachineRecord>, PersistenceError> {
            Ok(self.rows.get(id).cloned())
        }
        fn list(&mut self) -> Result<Vec<MachineRecord>, PersistenceError> {
            Ok(self.rows.values().cloned().collect())
        }
        fn server_time(&mut self) -> Result<DateTime<Utc>, PersistenceError> {
            Ok(Utc::now())
        }
        fn ensure_schema(&mut self) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    fn all_fields(form: &FormController) -> Vec<String> {
        Field::ALL.iter().map(|f| form.get(*f).to_owned()).collect()
    }

    #[test]
    fn must_fill_from_catalog() {
        for id in catalog::ids() {
            let mut form = FormController::new();
            form.select_machine(id);
            let expected = catalog::lookup(id).unwrap();
            assert_eq!(form.snapshot(), FormState::from_record(&expected));
            assert_eq!(form.snapshot().to_record(), Ok(expected));
        }
    }

    #[test]
    fn must_show_machine_2() {
        let mut form = FormController::new();
        form.select_machine("machine-2");
        assert_eq!(
            all_fields(&form),
            vec![
                "machine-2",
                "Assembly Line 02",
                "idle",
                "2847",
                "89",
                "2758",
                "31259",
                "78.4",
                "72.1",
                "5.2",
                "1",
                "1.5",
                "0.3",
                "06:00",
                "14:00"
            ]
        );
    }

    #[test]
    fn must_keep_fields_for_unknown_id() {
        let mut form = FormController::new();
        form.select_machine("machine-1");
        form.set_field(Field::Oee, "55.5").unwrap();
        let before = form.snapshot();
        for id in &["", "machine-7", "press 4"] {
            form.select_machine(id);
            let after = form.snapshot();
            assert_eq!(after.id, *id);
            assert_eq!(FormState { id: before.id.clone(), ..after }, before);
        }
    }

    #[test]
    fn must_route_id_field_through_handler() {
        let mut form = FormController::new();
        form.set_field(Field::Id, "machine-3").unwrap();
        assert_eq!(form.get(Field::Name), "Packaging Unit 03");
        assert_eq!(form.get(Field::Status), "fault");
    }

    #[test]
    fn must_reset() {
        let mut form = FormController::new();
        form.select_machine("machine-3");
        form.set_field(Field::ShiftEnd, "22:00").unwrap();
        form.reset();
        let mut expected = vec!["", "", "running"];
        expected.extend(vec!["0"; 10]);
        expected.extend(vec!["", ""]);
        assert_eq!(all_fields(&form), expected);
        form.reset();
        assert_eq!(all_fields(&form), expected);
    }

    #[test]
    fn must_guard_status() {
        let mut form = FormController::new();
        form.set_field(Field::Status, "off").unwrap();
        let err = form.set_field(Field::Status, "broken").unwrap_err();
        assert_eq!(err.field, "Status");
        assert_eq!(form.get(Field::Status), "off");
    }

    #[test]
    fn must_parse_fields() {
        assert_eq!("total-produced".parse::<Field>(), Ok(Field::TotalProduced));
        assert_eq!("shift_start".parse::<Field>(), Ok(Field::ShiftStart));
        assert_eq!("OEE".parse::<Field>(), Ok(Field::Oee));
        assert!("speed".parse::<Field>().is_err());
        assert_eq!(Field::ALL.iter().filter(|f| f.is_numeric()).count(), 10);
    }

    #[test]
    fn must_save_machine_2() {
        let mut store = MemoryStore::default();
        let mut form = FormController::new();
        form.select_machine("machine-2");
        let saved = form.save(&mut store).unwrap();
        assert_eq!(saved, catalog::lookup("machine-2").unwrap());
        assert_eq!(store.fetch("machine-2").unwrap(), Some(saved));
        assert_eq!(store.upserts, 1);
    }

    #[test]
    fn must_treat_blank_numbers_as_zero() {
        let mut store = MemoryStore::default();
        let mut form = FormController::new();
        form.set_field(Field::Id, "press-4").unwrap();
        form.set_field(Field::TotalProduced, "").unwrap();
        form.set_field(Field::OnTime, "   ").unwrap();
        form.set_field(Field::Efficiency, " 81.5 ").unwrap();
        let saved = form.save(&mut store).unwrap();
        assert_eq!(saved.total_produced, 0.0);
        assert_eq!(saved.on_time, 0.0);
        assert_eq!(saved.efficiency, 81.5);
        // the blank text stays as typed
        assert_eq!(form.get(Field::TotalProduced), "");
    }

    #[test]
    fn must_reject_garbage_numbers() {
        let mut store = MemoryStore::default();
        let mut form = FormController::new();
        form.select_machine("machine-1");
        form.set_field(Field::IdleTime, "1,5").unwrap();
        let before = form.snapshot();
        let err = form.save(&mut store).unwrap_err();
        assert_eq!(
            err,
            SaveError::Validation(ValidationError::new(
                "Idle Time",
                "1,5",
                "is not a finite number"
            ))
        );
        assert_eq!(store.upserts, 0);
        assert_eq!(form.snapshot(), before);

        form.set_field(Field::IdleTime, "NaN").unwrap();
        assert!(matches!(
            form.save(&mut store),
            Err(SaveError::Validation(_))
        ));
    }

    #[test]
    fn must_keep_form_on_store_failure() {
        let mut store = MemoryStore {
            fail_with: Some("could not connect to server: Connection refused".to_owned()),
            ..MemoryStore::default()
        };
        let mut form = FormController::new();
        form.select_machine("machine-3");
        form.set_field(Field::Name, "Packaging Unit 03 (rebuilt)").unwrap();
        let before = form.snapshot();
        let err = form.save(&mut store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not connect to server: Connection refused"
        );
        assert!(matches!(err, SaveError::Persistence(_)));
        assert_eq!(store.upserts, 1);
        assert_eq!(form.snapshot(), before);
    }

    #[test]
    fn must_refuse_empty_id_on_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machines.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "create table machines (id text primary key, name text, status text, \
                 total_produced numeric, total_rejects numeric, accepted_pieces numeric, \
                 ppm_rejection numeric, efficiency numeric, oee numeric, on_time numeric, \
                 off_time numeric, idle_time numeric, fault_time numeric, \
                 shift_start text, shift_end text);",
            )
            .unwrap();
        let mut store = SqliteStore::new("", path);

        let mut form = FormController::new();
        form.select_machine("machine-1");
        form.reset();
        let err = form.save(&mut store).unwrap_err();
        assert!(matches!(err, SaveError::Persistence(_)), "{}", err);
        assert_eq!(store.list().unwrap(), vec![]);
    }

    #[test]
    fn must_replace_on_second_save() {
        let mut store = MemoryStore::default();
        let mut form = FormController::new();
        form.select_machine("machine-1");
        form.save(&mut store).unwrap();
        form.set_field(Field::Status, "fault").unwrap();
        form.set_field(Field::TotalRejects, "48").unwrap();
        form.save(&mut store).unwrap();
        let rows = store.list().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, MachineStatus::Fault);
        assert_eq!(rows[0].total_rejects, 48.0);
    }
}
