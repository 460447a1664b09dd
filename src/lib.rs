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
//! Data entry for shop-floor machine status and shift metrics
//!
//! Each machine is described by one row in the `machines` table: its name, its
//! current status, production counters and rates, and how the hours of the current
//! shift were spent. This crate provides a small form for entering such rows and
//! writing them to PostgreSQL (or a local SQLite file) with a single upsert:
//!
//! ```rust,no_run
//! use machine_data_manager::{config::Settings, db::open_store, form::{Field, FormController}};
//!
//! # fn main() -> anyhow::Result<()> {
//! let settings = Settings::load(None)?;
//! let mut store = open_store(&settings)?;
//!
//! let mut form = FormController::new();
//! form.select_machine("machine-2"); // pre-filled from the sample catalog
//! form.set_field(Field::TotalRejects, "91")?;
//! form.save(&mut store)?;
//! # Ok(())
//! # }
//! ```
//!
//! The `machine-form` binary wraps this in an interactive terminal console, the
//! `db-check` binary only verifies that the configured database can be reached.
//! Both read `DATABASE_URL` from the environment or a `.env` file.

pub mod catalog;
pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod form;
pub mod model;
