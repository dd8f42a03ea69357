//! Provider credential commands.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use dialoguer::{Password, theme::ColorfulTheme};
use nanshe_models::auth::{CredentialSource, CredentialStore};

use super::CREDENTIAL_SERVICE;

#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// List providers with a usable key
    List,
    /// Store an API key in the system keyring
    Set {
        /// Provider name (openai, gemini)
        provider: String,
    },
    /// Delete a stored API key
    Delete {
        /// Provider name (openai, gemini)
        provider: String,
    },
}

pub fn run(args: AuthArgs) -> Result<()> {
    let store = CredentialStore::new(CREDENTIAL_SERVICE).with_env_fallback();
    match args.command {
        AuthCommands::List => list(&store),
        AuthCommands::Set { provider } => set(&store, &provider),
        AuthCommands::Delete { provider } => delete(&store, &provider),
    }
}

fn list(store: &CredentialStore) -> Result<()> {
    let providers = store.list_providers();
    if providers.is_empty() {
        println!("No API credentials configured.");
        println!();
        println!("Configure credentials with: nanshe auth set <provider>");
        return Ok(());
    }
    println!("Configured providers:");
    println!();
    for provider in providers {
        let source = match store.credential_source(&provider) {
            Some(CredentialSource::Keyring) => "(keyring)",
            Some(CredentialSource::Environment) => "(environment)",
            None => "",
        };
        println!("  {} {}", provider, source);
    }
    Ok(())
}

fn set(store: &CredentialStore, provider: &str) -> Result<()> {
    println!("Enter API key for {}", provider);
    let key = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("API key")
        .interact()?;
    if key.trim().is_empty() {
        bail!("API key cannot be empty");
    }
    store.set(provider, key.trim())?;
    println!("Credentials for '{}' saved to keyring.", provider);
    Ok(())
}

fn delete(store: &CredentialStore, provider: &str) -> Result<()> {
    match store.delete(provider) {
        Ok(()) => println!("Credentials for '{}' deleted.", provider),
        Err(nanshe_models::Error::CredentialsNotFound(_)) => {
            println!("No credentials found for '{}'.", provider)
        }
        Err(e) => bail!("Failed to delete credentials: {}", e),
    }
    Ok(())
}
