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
use anyhow::Result;
use clap::Parser;
use machine_data_manager::{config::Settings, db::open_store};
use std::{io, path::PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Check that the configured database is reachable
#[derive(Parser, Debug)]
#[command(name = "db-check", version)]
struct Opts {
    /// Read settings from this file instead of `./.env`
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Create the machines table if it does not exist
    #[arg(long)]
    init_schema: bool,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::load(opts.env_file.as_deref())?;
    let mut store = open_store(&settings)?;
    if opts.init_schema {
        store.ensure_schema()?;
    }
    let now = store.server_time()?;
    println!("Connected! Time: {}", now.to_rfc3339());
    Ok(())
}
