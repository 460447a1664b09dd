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
//! Line-driven terminal front end for the machine form
//!
//! One command is read and dispatched at a time; a save blocks until the store
//! has answered. Outcomes of the save action are shown as dialog lines.
//!
//! The words of a line are parsed to pick the command and field, while the
//! values handed to the form are taken from the raw line, spaces included.
use crate::{
    catalog,
    db::MachineStore,
    form::{Field, FormController},
    model::MachineStatus,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use itertools::Itertools;
use std::io::{BufRead, Write};

/// Parser executed for each input line.
#[derive(Parser, Debug)]
#[command(
    name = "",
    no_binary_name = true,
    disable_version_flag = true,
    override_usage = "<COMMAND> [ARGS]"
)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

/// Commands understood by the form console.
#[derive(Subcommand, Debug, PartialEq)]
pub enum ConsoleCommand {
    /// Select or type a machine identifier; sample machines fill the form.
    #[command(name = "machine", alias = "select")]
    Machine {
        /// Machine identifier, may contain spaces; leave out to clear it.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
        id: Vec<String>,
    },
    /// Change one field, e.g. `set total-produced 4600`.
    #[command(name = "set")]
    Set {
        /// Field name as shown by `show`.
        field: Field,
        /// New text, may contain spaces; leave out to clear the field.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
        value: Vec<String>,
    },
    /// Show all fields of the form.
    #[command(name = "show")]
    Show {
        /// Print the field texts as JSON instead.
        #[arg(long)]
        json: bool,
    },
    /// Save Machine: write the form to the database.
    #[command(name = "save")]
    Save,
    /// New Machine: clear the form.
    #[command(name = "new")]
    New,
    /// List the sample machine identifiers.
    #[command(name = "samples")]
    Samples,
    /// List the machines stored in the database.
    #[command(name = "list")]
    List,
    /// Leave the console.
    #[command(name = "quit", alias = "exit")]
    Quit,
}

enum Flow {
    Continue,
    Quit,
}

/// The interactive form bound to a store
pub struct Console<S> {
    form: FormController,
    store: S,
}

impl<S: MachineStore> Console<S> {
    pub fn new(store: S) -> Self {
        Self {
            form: FormController::new(),
            store,
        }
    }

    pub fn form(&self) -> &FormController {
        &self.form
    }

    pub fn store(&mut self) -> &mut S {
        &mut self.store
    }

    /// Run the event loop until `quit` or the end of the input
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut out: W) -> Result<()> {
        writeln!(out, "{}", "Machine Data Manager".bold())?;
        writeln!(out, "type `help` for the list of commands")?;
        self.show(&mut out)?;
        prompt(&mut out)?;
        for line in input.lines() {
            let line = line?;
            let words = line.split_whitespace().collect::<Vec<_>>();
            if !words.is_empty() {
                match ConsoleLine::try_parse_from(words) {
                    Ok(parsed) => {
                        if let Flow::Quit = self.dispatch(parsed.command, &line, &mut out)? {
                            return Ok(());
                        }
                    }
                    Err(err) => write!(out, "{}", err)?,
                }
            }
            prompt(&mut out)?;
        }
        writeln!(out)?;
        Ok(())
    }

    fn dispatch<W: Write>(
        &mut self,
        command: ConsoleCommand,
        line: &str,
        out: &mut W,
    ) -> Result<Flow> {
        match command {
            ConsoleCommand::Machine { .. } => {
                self.form.select_machine(words_tail(line, 1));
                self.show(out)?;
            }
            ConsoleCommand::Set { field, .. } => {
                if let Err(err) = self.form.set_field(field, words_tail(line, 2)) {
                    dialog_error(out, &err)?;
                } else if field == Field::Id {
                    self.show(out)?;
                }
            }
            ConsoleCommand::Show { json } => {
                if json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&self.form.snapshot())?)?;
                } else {
                    self.show(out)?;
                }
            }
            ConsoleCommand::Save => match self.form.save(&mut self.store) {
                Ok(_) => writeln!(
                    out,
                    "{} Machine saved successfully",
                    "Success:".green().bold()
                )?,
                Err(err) => dialog_error(out, &err)?,
            },
            ConsoleCommand::New => {
                self.form.reset();
                self.show(out)?;
            }
            ConsoleCommand::Samples => {
                for id in catalog::ids() {
                    writeln!(out, "  {}", id)?;
                }
            }
            ConsoleCommand::List => match self.store.list() {
                Ok(rows) if rows.is_empty() => writeln!(out, "no machines stored")?,
                Ok(rows) => {
                    for row in rows {
                        writeln!(out, "  {:<16} {:<24} {}", row.id, row.name, row.status)?;
                    }
                }
                Err(err) => dialog_error(out, &err)?,
            },
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn show<W: Write>(&self, out: &mut W) -> Result<()> {
        for field in Field::ALL.iter().copied() {
            let hint = match field {
                Field::Id => format!("one of {} or new", catalog::ids().join(", ")),
                Field::Status => MachineStatus::ALL.iter().join(" | "),
                _ => String::new(),
            };
            writeln!(
                out,
                "  {:<20} {:<16} {:<24} {}",
                field.label(),
                field.key().dimmed(),
                self.form.get(field),
                hint.as_str().dimmed()
            )?;
        }
        Ok(())
    }
}

/// The text following the first `words` words of `line` and one separator, as typed
fn words_tail(line: &str, words: usize) -> &str {
    let mut rest = line;
    for _ in 0..words {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace).unwrap_or_else(|| rest.len());
        rest = &rest[end..];
    }
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() => chars.as_str(),
        _ => rest,
    }
}

fn prompt<W: Write>(out: &mut W) -> Result<()> {
    write!(out, "{} ", ">".cyan().bold())?;
    out.flush()?;
    Ok(())
}

fn dialog_error<W: Write>(out: &mut W, err: &dyn std::fmt::Display) -> Result<()> {
    writeln!(out, "{} {}", "Error:".red().bold(), err)?;
    Ok(())
}
