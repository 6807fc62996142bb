use clap::{Args, Subcommand};

use coop_ledger_core::keys;
use coop_ledger_core::{
    population, Clock, Context, FlockMember, FlockStage, FlockStatus, SystemClock,
};

use super::{bind_writable, find_index, parse_date, CommandError, OutputFormat};

#[derive(Args)]
pub struct FlockCommand {
    #[command(subcommand)]
    pub command: FlockSubcommand,
}

#[derive(Subcommand)]
pub enum FlockSubcommand {
    /// Add a bird or a batch of birds
    Add {
        /// Tag number (must be unique)
        tag: String,

        /// Breed
        #[arg(long)]
        breed: String,

        /// Number of birds in the batch
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Stage (chick, pullet, hen, rooster)
        #[arg(long, default_value = "hen")]
        stage: String,

        /// Hatch date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        hatched: Option<String>,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List flock members
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Include sold and deceased members
        #[arg(long)]
        all: bool,
    },

    /// Change a member's status
    SetStatus {
        /// Member ID or tag number
        identifier: String,

        /// New status (active, sold, deceased)
        status: String,
    },
}

impl FlockCommand {
    pub fn run(&self, context: &Context) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            FlockSubcommand::Add {
                tag,
                breed,
                count,
                stage,
                hatched,
                name,
                notes,
            } => {
                let count = batch_size(*count)?;
                let stage: FlockStage = stage.parse().map_err(CommandError::InvalidInput)?;
                let hatch_date = match hatched {
                    Some(d) => parse_date(d)?,
                    None => SystemClock.today(),
                };

                let mut member = FlockMember::new(tag, count, breed, stage, hatch_date);
                if let Some(name) = name {
                    member = member.with_name(name);
                }
                if let Some(notes) = notes {
                    member = member.with_notes(notes);
                }

                let added = add_member(context, member)?;
                println!("Added flock member:");
                println!("{}", added);
                Ok(())
            }

            FlockSubcommand::List { format, all } => {
                let members = context.bind(keys::FLOCK, Vec::<FlockMember>::new()).get();
                let shown: Vec<&FlockMember> =
                    members.iter().filter(|m| *all || m.is_active()).collect();

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&shown)?);
                    }
                    OutputFormat::Text => {
                        if shown.is_empty() {
                            println!("No flock members.");
                        }
                        for member in &shown {
                            println!("{}", member);
                        }
                        println!("\nActive birds: {}", population(&members));
                    }
                }
                Ok(())
            }

            FlockSubcommand::SetStatus { identifier, status } => {
                let status: FlockStatus = status.parse().map_err(CommandError::InvalidInput)?;
                let updated = set_status(context, identifier, status)?;
                println!("Updated flock member:");
                println!("{}", updated);
                Ok(())
            }
        }
    }
}

fn batch_size(count: u32) -> Result<u32, CommandError> {
    if count == 0 {
        return Err(CommandError::InvalidInput("Count must be at least 1".to_string()));
    }
    Ok(count)
}

/// Appends a stamped member, rejecting duplicate tag numbers.
fn add_member(context: &Context, member: FlockMember) -> Result<FlockMember, CommandError> {
    let flock = bind_writable(context, keys::FLOCK, Vec::<FlockMember>::new())?;
    let taken = flock.with(|members| {
        members
            .iter()
            .any(|m| m.tag_number.eq_ignore_ascii_case(&member.tag_number))
    });
    if taken {
        return Err(CommandError::InvalidInput(format!(
            "Tag number '{}' is already in use",
            member.tag_number
        )));
    }

    let member = context.stamper().stamp(member);
    flock.update(|members| {
        let mut next = members.clone();
        next.push(member.clone());
        next
    });
    Ok(member)
}

fn set_status(
    context: &Context,
    identifier: &str,
    status: FlockStatus,
) -> Result<FlockMember, CommandError> {
    let flock = bind_writable(context, keys::FLOCK, Vec::<FlockMember>::new())?;
    let mut members = flock.get();
    let index = find_index(
        &members,
        identifier,
        |m: &FlockMember| m.id.as_str(),
        |m: &FlockMember| m.tag_number.as_str(),
    )?;

    let mut member = members[index].clone();
    member.status = status;
    let member = context.stamper().stamp(member);
    members[index] = member.clone();
    flock.set(members);
    Ok(member)
}
