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
//! Startup configuration taken from the environment and an optional `.env` file
use crate::error::ConfigurationError;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::debug;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const TABLE_PREFIX: &str = "TABLE_PREFIX";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// `postgres://…`, `postgresql://…` or `sqlite:<path>`
    pub database_url: String,
    /// prepended with an underscore to the table name, empty for none
    pub table_prefix: String,
}

/// The kind of database a connection URL points to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite(PathBuf),
}

impl Settings {
    /// Load the `.env` file (the given one, or `./.env` if present) and read the settings
    ///
    /// Variables already set in the process environment take precedence over the file.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigurationError> {
        let env = |name: &str| std::env::var(name).ok();
        match env_file {
            Some(path) => Self::from_env_file(path, env),
            None => {
                if let Ok(path) = dotenvy::dotenv() {
                    debug!("loaded {}", path.display());
                }
                Self::from_lookup(env)
            }
        }
    }

    /// Read the settings from the given env file, `lookup` taking precedence over it
    ///
    /// The file is parsed without touching the process environment.
    pub fn from_env_file(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let invalid = |e: dotenvy::Error| ConfigurationError::Invalid {
            name: "--env-file",
            value: path.display().to_string(),
            reason: e.to_string(),
        };
        let vars = dotenvy::from_path_iter(path)
            .map_err(invalid)?
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(invalid)?;
        debug!(vars = vars.len(), "loaded {}", path.display());
        Self::from_lookup(|name| lookup(name).or_else(|| vars.get(name).cloned()))
    }

    /// Build the settings from a variable lookup function
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let database_url = lookup(DATABASE_URL)
            .map(|url| url.trim().to_owned())
            .filter(|url| !url.is_empty())
            .ok_or(ConfigurationError::Missing(DATABASE_URL))?;
        let table_prefix = lookup(TABLE_PREFIX)
            .map(|p| p.trim().to_owned())
            .unwrap_or_default();
        let ret = Self {
            database_url,
            table_prefix,
        };
        ret.backend()?;
        Ok(ret)
    }

    pub fn backend(&self) -> Result<Backend, ConfigurationError> {
        let url = self.database_url.as_str();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Backend::Postgres);
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"));
        match path {
            Some(path) if !path.is_empty() => Ok(Backend::Sqlite(PathBuf::from(path))),
            _ => Err(ConfigurationError::Invalid {
                name: DATABASE_URL,
                value: url.to_owned(),
                reason: "expected postgres://, postgresql:// or sqlite:<path>".to_owned(),
            }),
        }
    }
}
