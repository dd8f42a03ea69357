//! Taxonomy classifier commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use nanshe_engine::classifier::{FeedbackInput, TaxonomySeed};
use nanshe_engine::types::{Id, LearningPlan, TaxonomyLabel};

use super::{open_engine, print_json};

#[derive(Args, Debug)]
pub struct TaxonomyArgs {
    #[command(subcommand)]
    pub command: TaxonomyCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaxonomyCommands {
    /// Index taxonomy entries from a JSON array of {domain, area, skill, description}
    Seed { file: PathBuf },
    /// Reload the in-memory index from the store
    Rebuild,
    /// Classify a topic
    Classify { text: String },
    /// Record the correct label for a topic
    Feedback {
        text: String,
        domain: String,
        area: String,
        skill: String,
        /// The current prediction was already right
        #[arg(long)]
        correct: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List recorded feedback
    FeedbackList,
    /// Store a curated plan used as a planning reference
    Golden {
        domain: String,
        area: String,
        main_skill: String,
        /// Plan JSON file ({overview, levels})
        file: PathBuf,
    },
}

pub async fn run(args: TaxonomyArgs, user_id: Id) -> Result<()> {
    let engine = open_engine().await?;
    match args.command {
        TaxonomyCommands::Seed { file } => {
            let seeds = read_seeds(&file)?;
            let indexed = engine.classifier.seed(&seeds).await?;
            println!("Indexed {} taxonomy entries from {}.", indexed, file.display());
        }
        TaxonomyCommands::Rebuild => {
            let loaded = engine.classifier.rebuild().await?;
            println!("Classifier index holds {} entries.", loaded);
        }
        TaxonomyCommands::Classify { text } => {
            let matches = engine.classifier.classify(&text).await?;
            if matches.is_empty() {
                println!("No category above the confidence threshold.");
                return Ok(());
            }
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec![
                Cell::new("Domain").fg(Color::Cyan),
                Cell::new("Area").fg(Color::Cyan),
                Cell::new("Skill").fg(Color::Cyan),
                Cell::new("Confidence").fg(Color::Cyan),
            ]);
            for m in &matches {
                table.add_row(vec![
                    Cell::new(&m.category.domain),
                    Cell::new(&m.category.area),
                    Cell::new(&m.category.name),
                    Cell::new(format!("{:.3}", m.confidence)),
                ]);
            }
            println!("{table}");
        }
        TaxonomyCommands::Feedback {
            text,
            domain,
            area,
            skill,
            correct,
            notes,
        } => {
            let predicted = engine
                .classifier
                .classify(&text)
                .await?
                .first()
                .map(|m| m.label());
            let feedback = engine
                .classifier
                .record_feedback(FeedbackInput {
                    user_id: Some(user_id),
                    input_text: text,
                    predicted,
                    final_label: TaxonomyLabel { domain, area, skill },
                    is_correct: correct,
                    notes,
                })
                .await?;
            print_json(&feedback)?;
        }
        TaxonomyCommands::FeedbackList => {
            print_json(&engine.store.list_feedback().await?)?;
        }
        TaxonomyCommands::Golden {
            domain,
            area,
            main_skill,
            file,
        } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let plan: LearningPlan = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not a learning plan", file.display()))?;
            let golden = engine
                .store
                .save_golden_plan(&domain, &area, &main_skill, &plan)
                .await?;
            println!(
                "Golden plan {} saved for {}/{} ({} levels).",
                golden.id,
                golden.domain,
                golden.area,
                golden.plan.levels.len()
            );
        }
    }
    Ok(())
}

fn read_seeds(path: &Path) -> Result<Vec<TaxonomySeed>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a JSON array of taxonomy entries", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_seeds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(
            &path,
            r#"[
                {"domain": "languages", "area": "romance_languages", "skill": "spanish"},
                {"domain": "programming", "area": "systems", "skill": "rust",
                 "description": "Memory-safe systems language"}
            ]"#,
        )
        .unwrap();
        let seeds = read_seeds(&path).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].skill, "spanish");
        assert!(seeds[0].description.is_none());
        assert_eq!(seeds[1].description.as_deref(), Some("Memory-safe systems language"));
    }

    #[test]
    fn test_read_seeds_rejects_objects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(&path, r#"{"domain": "languages"}"#).unwrap();
        assert!(read_seeds(&path).is_err());
    }
}
