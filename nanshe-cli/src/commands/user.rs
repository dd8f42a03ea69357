use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use nanshe_engine::types::{Id, SubscriptionTier, User};

use super::{open_engine, print_json};

#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommands,
}

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Create or update an account
    Add {
        id: Id,
        email: String,
        /// free, premium or canceled
        #[arg(long, default_value = "free")]
        tier: SubscriptionTier,
        /// Staff account with unlimited coaching
        #[arg(long)]
        superuser: bool,
    },
    /// Show an account with its model usage
    Show { id: Id },
    /// Record a login, which keeps the streak alive
    Login { id: Id },
    /// Delete an account, its capsules and its history
    Delete { id: Id },
}

pub async fn run(args: UserArgs) -> Result<()> {
    let engine = open_engine().await?;
    match args.command {
        UserCommands::Add {
            id,
            email,
            tier,
            superuser,
        } => {
            let mut user = match engine.store.get_user(id).await? {
                Some(existing) => User {
                    email,
                    tier,
                    ..existing
                },
                None => User::new(id, email).with_tier(tier),
            };
            user.is_superuser = superuser;
            engine.store.upsert_user(&user).await?;
            println!("User {} saved ({}).", user.id, user.tier);
        }
        UserCommands::Show { id } => {
            let user = engine.store.require_user(id).await?;
            let usage = engine.store.usage_summary(id).await?;
            print_json(&serde_json::json!({
                "user": user,
                "enrolled_capsules": engine.store.enrolled_capsules(id).await?,
                "usage": usage,
            }))?;
        }
        UserCommands::Login { id } => {
            engine.store.touch_login(id, Utc::now()).await?;
            println!("Login recorded for user {}.", id);
        }
        UserCommands::Delete { id } => {
            engine.store.delete_user(id).await?;
            println!("User {} deleted.", id);
        }
    }
    Ok(())
}
