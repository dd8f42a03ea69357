//! Capsule generation and inspection commands.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use nanshe_engine::Engine;
use nanshe_engine::generator::CapsuleTree;
use nanshe_engine::types::{Capsule, ContentType, Id};
use nanshe_engine::worker::{GenerationTask, WorkerResult};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{open_engine, print_json};

#[derive(Args, Debug)]
pub struct CapsuleArgs {
    #[command(subcommand)]
    pub command: CapsuleCommands,
}

#[derive(Subcommand, Debug)]
pub enum CapsuleCommands {
    /// Classify a topic, plan it and build the first molecule
    Generate {
        topic: String,
        /// Learner language (ISO code)
        #[arg(long)]
        language: Option<String>,
        /// Hand the capsule to the generation worker and build every molecule
        #[arg(long)]
        all: bool,
    },
    /// Build a capsule from a document (premium)
    FromSource {
        title: String,
        /// Text file with the source material
        file: PathBuf,
        #[arg(long)]
        language: Option<String>,
    },
    /// Print a capsule's learning plan
    Plan { capsule_id: Id },
    /// Build one plan position (1-based level and chapter)
    Molecule {
        capsule_id: Id,
        level: u32,
        chapter: u32,
    },
    /// Build every remaining plan position; Ctrl-C stops between molecules
    Build { capsule_id: Id },
    /// Show the materialized tree with XP per atom
    Tree {
        capsule_id: Id,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Add a premium bonus atom to a molecule
    Bonus {
        molecule_id: Id,
        /// Content type (lesson, quiz, flashcards, ...)
        content_type: ContentType,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        difficulty: Option<String>,
    },
    /// Drop a molecule's atoms and build them again
    Regenerate { molecule_id: Id },
    /// Delete a capsule you created, with all progress and coach threads on it
    Delete { capsule_id: Id },
}

pub async fn run(args: CapsuleArgs, user_id: Id) -> Result<()> {
    let engine = open_engine().await?;
    match args.command {
        CapsuleCommands::Generate {
            topic,
            language,
            all,
        } => {
            if all {
                let capsule = engine
                    .generator
                    .create_pending(user_id, &topic, language.as_deref())
                    .await?;
                print_capsule(&capsule);
                run_worker(
                    &engine,
                    vec![
                        GenerationTask::GenerateCapsule {
                            capsule_id: capsule.id,
                        },
                        GenerationTask::MaterializeCapsule {
                            capsule_id: capsule.id,
                        },
                    ],
                )
                .await?;
                print_capsule(&engine.store.require_capsule(capsule.id).await?);
            } else {
                let capsule = engine
                    .generator
                    .generate(user_id, &topic, language.as_deref())
                    .await?;
                print_capsule(&capsule);
            }
        }
        CapsuleCommands::FromSource {
            title,
            file,
            language,
        } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let capsule = engine
                .generator
                .create_capsule_from_source(user_id, &title, &source, language.as_deref())
                .await?;
            print_capsule(&capsule);
        }
        CapsuleCommands::Plan { capsule_id } => {
            let capsule = engine.store.require_capsule(capsule_id).await?;
            print_json(capsule.plan()?)?;
        }
        CapsuleCommands::Molecule {
            capsule_id,
            level,
            chapter,
        } => {
            let (molecule, atoms) = engine
                .generator
                .materialize_molecule(capsule_id, level, chapter)
                .await?;
            println!(
                "Molecule {} '{}' ({}): {} atoms",
                molecule.id,
                molecule.title,
                molecule.generation_status,
                atoms.len()
            );
        }
        CapsuleCommands::Build { capsule_id } => {
            engine.store.require_capsule(capsule_id).await?;
            run_worker(&engine, vec![GenerationTask::MaterializeCapsule { capsule_id }]).await?;
        }
        CapsuleCommands::Tree { capsule_id, json } => {
            let tree = engine.generator.capsule_tree(capsule_id).await?;
            if json {
                print_json(&tree)?;
            } else {
                print_tree(&tree);
            }
        }
        CapsuleCommands::Bonus {
            molecule_id,
            content_type,
            title,
            difficulty,
        } => {
            let atom = engine
                .generator
                .create_bonus_atom(
                    user_id,
                    molecule_id,
                    content_type,
                    title.as_deref(),
                    difficulty.as_deref(),
                )
                .await?;
            println!(
                "Bonus atom {} '{}' added at position {}.",
                atom.id, atom.title, atom.order
            );
        }
        CapsuleCommands::Regenerate { molecule_id } => {
            let atoms = engine.generator.regenerate_molecule(molecule_id).await?;
            println!("Molecule {} rebuilt with {} atoms.", molecule_id, atoms.len());
        }
        CapsuleCommands::Delete { capsule_id } => {
            engine.generator.delete_capsule(user_id, capsule_id).await?;
            println!("Capsule {} deleted.", capsule_id);
        }
    }
    Ok(())
}

/// Run tasks on a background worker until the queue drains or Ctrl-C.
async fn run_worker(engine: &Engine, tasks: Vec<GenerationTask>) -> Result<()> {
    let shutdown = CancellationToken::new();
    let (queue, handle) = engine.spawn_worker(shutdown.clone());
    for task in tasks {
        queue.submit(task).await?;
    }
    // the worker stops once the last sender is gone and the queue is empty
    drop(queue);

    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current molecule");
            interrupt.cancel();
        }
    });

    match handle.await? {
        WorkerResult::QueueClosed => Ok(()),
        WorkerResult::Shutdown => {
            warn!("Generation stopped early; run `nanshe capsule build` to resume");
            bail!("interrupted")
        }
    }
}

fn print_capsule(capsule: &Capsule) {
    println!(
        "Capsule {} '{}' [{}/{}/{}] {}",
        capsule.id,
        capsule.title,
        capsule.domain,
        capsule.area,
        capsule.main_skill,
        capsule.generation_status
    );
}

fn print_tree(tree: &CapsuleTree) {
    println!(
        "{} [{}/{}/{}] {}",
        tree.title, tree.domain, tree.area, tree.main_skill, tree.generation_status
    );

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Position").fg(Color::Cyan),
        Cell::new("Molecule").fg(Color::Cyan),
        Cell::new("Atom").fg(Color::Cyan),
        Cell::new("Type").fg(Color::Cyan),
        Cell::new("XP").fg(Color::Cyan),
    ]);
    for granule in &tree.granules {
        for molecule in &granule.molecules {
            let position = format!("{}.{}", granule.order, molecule.order);
            if molecule.atoms.is_empty() {
                table.add_row(vec![
                    Cell::new(&position),
                    Cell::new(&molecule.title),
                    Cell::new("-"),
                    Cell::new(molecule.generation_status.as_str()),
                    Cell::new(molecule.xp_total),
                ]);
            }
            for atom in &molecule.atoms {
                let kind = if atom.is_bonus {
                    format!("{} (bonus)", atom.content_type)
                } else {
                    atom.content_type.to_string()
                };
                table.add_row(vec![
                    Cell::new(&position),
                    Cell::new(&molecule.title),
                    Cell::new(format!("{} {}", atom.id, atom.title)),
                    Cell::new(kind),
                    Cell::new(atom.xp_value),
                ]);
            }
        }
    }
    println!("{table}");
}
