use clap::{Args, Subcommand};
use std::io::{self, Write};

use coop_ledger_core::keys::RESETTABLE_COLLECTIONS;
use coop_ledger_core::Context;

/// Reset the farm data collections
#[derive(Args)]
pub struct DataCommand {
    #[command(subcommand)]
    pub command: DataSubcommand,
}

#[derive(Subcommand)]
pub enum DataSubcommand {
    /// Empty every collection (settings and identity are kept)
    StartFresh {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Remove every collection so the built-in defaults apply again
    RestoreDefaults {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl DataCommand {
    pub fn run(&self, context: &Context) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            DataSubcommand::StartFresh { force } => {
                if !*force && !confirm("Empty all farm records?")? {
                    println!("Reset cancelled.");
                    return Ok(());
                }
                context.start_fresh();
                println!("Emptied {} collections.", RESETTABLE_COLLECTIONS.len());
                Ok(())
            }

            DataSubcommand::RestoreDefaults { force } => {
                if !*force && !confirm("Remove all farm records and restore defaults?")? {
                    println!("Reset cancelled.");
                    return Ok(());
                }
                context.restore_defaults();
                println!("Removed {} collections.", RESETTABLE_COLLECTIONS.len());
                Ok(())
            }
        }
    }
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
