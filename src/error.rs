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
//! The error kinds surfaced by the form, the gateway and the startup sequence
//!
//! Driver code works with `anyhow::Result` internally; errors are converted into
//! these types where they cross a component boundary, so that the user interface
//! can tell a typo in a field apart from an unreachable database.
use derive_more::{Display, From};
use std::error::Error;

/// The connection settings are missing or unusable; fatal at startup
#[derive(Clone, Debug, PartialEq, Eq, Display)]
pub enum ConfigurationError {
    #[display(fmt = "{} missing in environment or .env file", _0)]
    Missing(&'static str),
    #[display(fmt = "{} has unsupported value {:?}: {}", name, value, reason)]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}
impl Error for ConfigurationError {}

/// A form field holds text that cannot be turned into a record value
#[derive(Clone, Debug, PartialEq, Eq, Display)]
#[display(fmt = "{}: {:?} {}", field, input, reason)]
pub struct ValidationError {
    /// user-facing label of the offending field
    pub field: &'static str,
    pub input: String,
    pub reason: String,
}
impl Error for ValidationError {}

impl ValidationError {
    pub fn new(field: &'static str, input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field,
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Anything that went wrong while talking to the store, carrying the driver's message
#[derive(Clone, Debug, PartialEq, Eq, Display)]
#[display(fmt = "{}", message)]
pub struct PersistenceError {
    message: String,
}
impl Error for PersistenceError {}

impl PersistenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
    pub fn message(&self) -> &str {
        &self.message
    }
}

// keep the whole context chain, the outermost layer alone is usually just "db error"
impl From<anyhow::Error> for PersistenceError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// Outcome of a failed save action
#[derive(Clone, Debug, PartialEq, Eq, Display, From)]
pub enum SaveError {
    #[display(fmt = "{}", _0)]
    Validation(ValidationError),
    #[display(fmt = "{}", _0)]
    Persistence(PersistenceError),
}
impl Error for SaveError {}
