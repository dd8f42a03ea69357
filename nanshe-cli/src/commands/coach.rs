//! Coach commands.

use anyhow::{Result, bail};
use chrono::Utc;
use clap::{Args, Subcommand};
use dialoguer::{Input, theme::ColorfulTheme};
use nanshe_engine::coach::CoachReply;
use nanshe_engine::types::{CoachContext, EnergyStatus, Id};
use nanshe_engine::{Engine, EngineError};

use super::open_engine;

#[derive(Args, Debug)]
pub struct CoachArgs {
    #[command(subcommand)]
    pub command: CoachCommands,
}

/// Where the conversation happens; no flags means the dashboard.
#[derive(Args, Debug, Clone, Copy)]
pub struct LocationArgs {
    #[arg(long)]
    capsule: Option<Id>,
    /// Requires --capsule
    #[arg(long)]
    molecule: Option<Id>,
}

impl LocationArgs {
    fn context(self) -> Result<CoachContext> {
        match (self.capsule, self.molecule) {
            (None, None) => Ok(CoachContext::Dashboard),
            (Some(capsule_id), None) => Ok(CoachContext::Capsule { capsule_id }),
            (Some(capsule_id), Some(molecule_id)) => Ok(CoachContext::Molecule {
                capsule_id,
                molecule_id,
            }),
            (None, Some(_)) => bail!("--molecule needs --capsule"),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CoachCommands {
    /// Ask one question
    Ask {
        message: String,
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Interactive conversation; an empty line quits
    Chat {
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Show the energy wallet
    Energy,
    /// Print the stored conversation for a location
    History {
        #[command(flatten)]
        location: LocationArgs,
    },
}

pub async fn run(args: CoachArgs, user_id: Id) -> Result<()> {
    let engine = open_engine().await?;
    match args.command {
        CoachCommands::Ask { message, location } => {
            let context = location.context()?;
            match ask(&engine, user_id, &message, context).await? {
                Some(reply) => print_reply(&reply),
                None => bail!("out of coach energy"),
            }
        }
        CoachCommands::Chat { location } => chat(&engine, user_id, location.context()?).await?,
        CoachCommands::Energy => {
            let status = engine.coach.energy_status(user_id, Utc::now()).await?;
            print_energy(&status);
        }
        CoachCommands::History { location } => {
            let messages = engine.coach.history(user_id, location.context()?).await?;
            if messages.is_empty() {
                println!("No conversation yet.");
            }
            for message in messages {
                println!(
                    "[{}] {}: {}",
                    message.created_at.format("%Y-%m-%d %H:%M"),
                    message.role,
                    message.content
                );
            }
        }
    }
    Ok(())
}

/// `None` when the wallet is empty; the wait is printed.
async fn ask(
    engine: &Engine,
    user_id: Id,
    message: &str,
    context: CoachContext,
) -> Result<Option<CoachReply>> {
    match engine.coach.ask(user_id, message, context).await {
        Ok(reply) => Ok(Some(reply)),
        Err(EngineError::CoachEnergyDepleted(status)) => {
            print_energy(&status);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

async fn chat(engine: &Engine, user_id: Id, context: CoachContext) -> Result<()> {
    let theme = ColorfulTheme::default();
    println!("Coach ({}). Empty line to quit.", context.location_key());
    loop {
        let message: String = Input::with_theme(&theme)
            .with_prompt("you")
            .allow_empty(true)
            .interact_text()?;
        if message.trim().is_empty() {
            return Ok(());
        }
        if let Some(reply) = ask(engine, user_id, &message, context).await? {
            print_reply(&reply);
        }
    }
}

fn print_reply(reply: &CoachReply) {
    println!("{}", reply.response);
    if let Some(suggestions) = &reply.suggestions {
        println!();
        for suggestion in suggestions {
            println!("  * {}", suggestion);
        }
    }
    if let Some(steps) = &reply.next_steps {
        println!();
        println!("Next steps:");
        for (i, step) in steps.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
    }
}

fn print_energy(status: &EnergyStatus) {
    println!("Energy: {:.1}/{:.0}", status.current, status.max);
    if status.seconds_until_next_message > 0 {
        println!(
            "Next message in {} min ({})",
            status.seconds_until_next_message.div_ceil(60),
            status.next_message_available_at.format("%H:%M UTC")
        );
    }
}
