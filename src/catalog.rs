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
//! Canned sample machines used to pre-fill the form
//!
//! The catalog is never written to and is not the system of record; the database is.
use crate::model::{MachineRecord, MachineStatus};

struct Sample {
    id: &'static str,
    name: &'static str,
    status: MachineStatus,
    metrics: [f64; 6],
    durations: [f64; 4],
    shift: (&'static str, &'static str),
}

static SAMPLES: &[Sample] = &[
    Sample {
        id: "machine-1",
        name: "CNC Machine 01",
        status: MachineStatus::Running,
        metrics: [4582.0, 47.0, 4535.0, 10256.0, 92.3, 87.5],
        durations: [6.5, 0.5, 0.75, 0.25],
        shift: ("06:00", "14:00"),
    },
    Sample {
        id: "machine-2",
        name: "Assembly Line 02",
        status: MachineStatus::Idle,
        metrics: [2847.0, 89.0, 2758.0, 31259.0, 78.4, 72.1],
        durations: [5.2, 1.0, 1.5, 0.3],
        shift: ("06:00", "14:00"),
    },
    Sample {
        id: "machine-3",
        name: "Packaging Unit 03",
        status: MachineStatus::Fault,
        metrics: [1205.0, 156.0, 1049.0, 129461.0, 45.2, 38.7],
        durations: [3.0, 2.5, 1.0, 1.5],
        shift: ("06:00", "14:00"),
    },
];

impl Sample {
    fn record(&self) -> MachineRecord {
        let [total_produced, total_rejects, accepted_pieces, ppm_rejection, efficiency, oee] =
            self.metrics;
        let [on_time, off_time, idle_time, fault_time] = self.durations;
        MachineRecord {
            id: self.id.to_owned(),
            name: self.name.to_owned(),
            status: self.status,
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
            shift_start: self.shift.0.to_owned(),
            shift_end: self.shift.1.to_owned(),
        }
    }
}

/// The identifiers offered for selection, in catalog order
pub fn ids() -> impl Iterator<Item = &'static str> {
    SAMPLES.iter().map(|s| s.id)
}

/// The canned record for the given identifier, if it is a sample machine
pub fn lookup(id: &str) -> Option<MachineRecord> {
    SAMPLES.iter().find(|s| s.id == id).map(Sample::record)
}
