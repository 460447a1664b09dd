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
use machine_data_manager::{config::Settings, console::Console, db::open_store};
use std::{io, path::PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Enter machine status and shift metrics and save them to the database
#[derive(Parser, Debug)]
#[command(name = "machine-form", version)]
struct Opts {
    /// Read settings from this file instead of `./.env`
    #[arg(long)]
    env_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    // set up logging, stdout belongs to the form
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // configuration problems end the program before the form is shown
    let settings = Settings::load(opts.env_file.as_deref())?;
    let store = open_store(&settings)?;
    info!(store = store.name(), "starting form");

    let stdin = io::stdin();
    let mut console = Console::new(store);
    console.run(stdin.lock(), io::stdout())
}
