//! Progress, spaced repetition and learner dashboards.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use nanshe_engine::types::{Id, MoleculeReview};
use serde_json::Value;

use super::{open_engine, print_json};

#[derive(Args, Debug)]
pub struct ProgressArgs {
    #[command(subcommand)]
    pub command: ProgressCommands,
}

#[derive(Subcommand, Debug)]
pub enum ProgressCommands {
    /// Mark an atom completed and credit its XP
    Complete { atom_id: Id },
    /// Log an answer and update the molecule's review schedule
    Answer {
        atom_id: Id,
        /// The answer was wrong
        #[arg(long)]
        wrong: bool,
        /// Answer payload as JSON, e.g. '{"error_type": "grammar"}'
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Restart a molecule; awarded XP is kept
    Reset { molecule_id: Id },
    /// Log a finished study session ending now
    Activity {
        /// Session length in minutes
        minutes: i64,
        #[arg(long)]
        capsule: Option<Id>,
    },
    /// Study time, sessions and streak
    Stats,
    /// Spaced-repetition dashboard
    Srs,
    /// Mistakes grouped by molecule
    Journal,
}

pub async fn run(args: ProgressArgs, user_id: Id) -> Result<()> {
    let engine = open_engine().await?;
    let now = Utc::now();
    match args.command {
        ProgressCommands::Complete { atom_id } => {
            let outcome = engine
                .progress
                .record_atom_completion(user_id, atom_id, now)
                .await?;
            if outcome.already_awarded {
                println!("Atom {} was already completed; no XP added.", atom_id);
            } else {
                println!(
                    "+{} XP (capsule {}: {} core, {} bonus)",
                    outcome.xp_gained, outcome.capsule_id, outcome.capsule_xp, outcome.capsule_bonus_xp
                );
            }
            for badge in &outcome.badges {
                println!("Badge earned: {}", badge);
            }
        }
        ProgressCommands::Answer {
            atom_id,
            wrong,
            payload,
        } => {
            let payload = parse_payload(&payload)?;
            let review = engine
                .progress
                .register_answer(user_id, atom_id, !wrong, &payload, now)
                .await?;
            print_review(&review);
        }
        ProgressCommands::Reset { molecule_id } => {
            let review = engine
                .progress
                .reset_molecule(user_id, molecule_id, now)
                .await?;
            print_review(&review);
        }
        ProgressCommands::Activity { minutes, capsule } => {
            let start = now - Duration::minutes(minutes);
            let log = engine
                .progress
                .record_activity(user_id, capsule, start, Some(now))
                .await?;
            println!("Session {} logged ({} min).", log.id, minutes);
        }
        ProgressCommands::Stats => {
            print_json(&engine.progress.get_user_stats(user_id, now).await?)?;
        }
        ProgressCommands::Srs => {
            print_json(&engine.progress.srs_summary(user_id, now).await?)?;
        }
        ProgressCommands::Journal => {
            print_json(&engine.progress.error_journal(user_id).await?)?;
        }
    }
    Ok(())
}

fn parse_payload(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw).context("payload must be JSON")?;
    anyhow::ensure!(value.is_object(), "payload must be a JSON object");
    Ok(value)
}

fn print_review(review: &MoleculeReview) {
    println!(
        "Molecule {}: next review {} (interval {:.2} days, ease {:.2}, streak {})",
        review.molecule_id,
        review.next_review_at.format("%Y-%m-%d %H:%M UTC"),
        review.interval_days,
        review.ease_factor,
        review.streak
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload_accepts_objects() {
        let payload = parse_payload(r#"{"error_type": "grammar"}"#).unwrap();
        assert_eq!(payload["error_type"], "grammar");
        assert!(parse_payload("{}").unwrap().as_object().unwrap().is_empty());
    }

    #[test]
    fn test_parse_payload_rejects_other_json() {
        assert!(parse_payload("[1, 2]").is_err());
        assert!(parse_payload("grammar").is_err());
    }
}
