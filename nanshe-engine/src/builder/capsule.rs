//! Shared materialization steps for every domain builder.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::{BuilderRegistry, MoleculeContext, RecipeStep};
use crate::atoms::AtomFactory;
use crate::content::AtomContent;
use crate::planner::Planner;
use crate::store::{CozoStore, NewCapsule};
use crate::types::{
    Atom, AtomSlot, Capsule, ContentType, GenerationStatus, LearningPlan, Molecule, NewAtom,
};
use crate::{EngineError, Result};

/// Turns plans into Capsule → Granule → Molecule → Atom rows.
pub struct CapsuleBuilder {
    store: Arc<CozoStore>,
    planner: Arc<Planner>,
    factory: Arc<AtomFactory>,
    registry: BuilderRegistry,
    hierarchy_lock: Mutex<()>,
}

impl CapsuleBuilder {
    pub fn new(
        store: Arc<CozoStore>,
        planner: Arc<Planner>,
        factory: Arc<AtomFactory>,
        registry: BuilderRegistry,
    ) -> Self {
        Self {
            store,
            planner,
            factory,
            registry,
            hierarchy_lock: Mutex::new(()),
        }
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Insert the capsule row with status `pending`
    pub async fn create_capsule(&self, new: NewCapsule) -> Result<Capsule> {
        let capsule = self.store.create_capsule(new, Utc::now()).await?;
        info!(capsule_id = capsule.id, status = %capsule.generation_status, "Capsule created");
        Ok(capsule)
    }

    /// Build (or fetch) the plan and attach it to the capsule
    pub async fn generate_plan(&self, capsule: &mut Capsule) -> Result<LearningPlan> {
        let plan = self.planner.get_or_build_plan(capsule).await?;
        self.attach_plan(capsule, plan).await
    }

    /// Build a plan from a document and attach it to the capsule
    pub async fn generate_plan_from_source(
        &self,
        capsule: &mut Capsule,
        source_text: &str,
    ) -> Result<LearningPlan> {
        let plan = self
            .planner
            .get_or_build_plan_from_source(capsule, source_text)
            .await?;
        self.attach_plan(capsule, plan).await
    }

    async fn attach_plan(&self, capsule: &mut Capsule, plan: LearningPlan) -> Result<LearningPlan> {
        self.store.set_capsule_plan(capsule.id, &plan).await?;
        capsule.learning_plan = Some(plan.clone());
        Ok(plan)
    }

    /// Granule and molecule rows for a plan position, created on first use.
    ///
    /// Positions are 1-based; one outside the plan is
    /// [`EngineError::PlanIndexOutOfRange`].
    pub async fn ensure_hierarchy(
        &self,
        capsule: &Capsule,
        granule_order: u32,
        molecule_order: u32,
    ) -> Result<Molecule> {
        let plan = capsule.plan()?;
        let (level, chapter) =
            plan.chapter(granule_order, molecule_order)
                .ok_or(EngineError::PlanIndexOutOfRange {
                    granule: granule_order,
                    molecule: molecule_order,
                })?;

        let _guard = self.hierarchy_lock.lock().await;
        let granule = match self.store.find_granule(capsule.id, granule_order).await? {
            Some(granule) => granule,
            None => {
                self.store
                    .insert_granule(capsule.id, granule_order, &level.level_title)
                    .await?
            }
        };
        match self.store.find_molecule(granule.id, molecule_order).await? {
            Some(molecule) => Ok(molecule),
            None => {
                self.store
                    .insert_molecule(
                        granule.id,
                        molecule_order,
                        &chapter.chapter_title,
                        GenerationStatus::Pending,
                    )
                    .await
            }
        }
    }

    /// Ensure the molecule exists and has content; existing content is kept
    pub async fn materialize(
        &self,
        capsule: &Capsule,
        granule_order: u32,
        molecule_order: u32,
    ) -> Result<(Molecule, Vec<Atom>)> {
        let molecule = self
            .ensure_hierarchy(capsule, granule_order, molecule_order)
            .await?;
        let atoms = self.store.atoms(molecule.id).await?;
        if molecule.generation_status == GenerationStatus::Completed && !atoms.is_empty() {
            return Ok((molecule, atoms));
        }
        let atoms = self.build_molecule_content(&molecule).await?;
        let molecule = self.store.require_molecule(molecule.id).await?;
        Ok((molecule, atoms))
    }

    /// Run the molecule's recipe, reusing atoms that already exist.
    ///
    /// Core atoms are deduplicated per type (lowest id wins), matched to
    /// recipe steps, and new ones generated for the gaps. Leftover core
    /// atoms then bonus atoms follow, and the whole set is written in one
    /// transaction with orders 1..N.
    #[instrument(skip(self, molecule), fields(molecule_id = molecule.id))]
    pub async fn build_molecule_content(&self, molecule: &Molecule) -> Result<Vec<Atom>> {
        self.build(molecule, RecipeMode::Reuse).await
    }

    /// Replace every core atom with freshly generated content.
    ///
    /// Bonus atoms stay, after the new core set. Nothing is written unless
    /// the recipe completes, and a failure restores the molecule's status.
    #[instrument(skip(self, molecule), fields(molecule_id = molecule.id))]
    pub async fn regenerate_molecule_content(&self, molecule: &Molecule) -> Result<Vec<Atom>> {
        self.build(molecule, RecipeMode::Fresh).await
    }

    async fn build(&self, molecule: &Molecule, mode: RecipeMode) -> Result<Vec<Atom>> {
        let (granule, capsule) = self.store.molecule_parents(molecule).await?;
        self.store
            .set_molecule_status(molecule.id, GenerationStatus::Generating)
            .await?;

        let ctx = MoleculeContext {
            capsule: &capsule,
            granule: &granule,
            molecule,
            plan: capsule.learning_plan.as_ref(),
        };
        match self.run_recipe(&ctx, mode).await {
            Ok(atoms) => {
                self.store
                    .set_molecule_status(molecule.id, GenerationStatus::Completed)
                    .await?;
                Ok(atoms)
            }
            Err(e) => {
                let status = match mode {
                    RecipeMode::Reuse => GenerationStatus::Failed,
                    RecipeMode::Fresh => molecule.generation_status,
                };
                if let Err(status_err) = self.store.set_molecule_status(molecule.id, status).await {
                    warn!(error = %status_err, "Could not reset molecule status");
                }
                Err(e)
            }
        }
    }

    async fn run_recipe(&self, ctx: &MoleculeContext<'_>, mode: RecipeMode) -> Result<Vec<Atom>> {
        let molecule = ctx.molecule;
        let builder = self.registry.select(&ctx.capsule.domain, &ctx.capsule.area);
        let existing = self.store.atoms(molecule.id).await?;
        let (mut core, bonus): (Vec<Atom>, Vec<Atom>) =
            existing.iter().cloned().partition(|a| !a.is_bonus);
        let replaced = match mode {
            RecipeMode::Reuse => 0,
            RecipeMode::Fresh => std::mem::take(&mut core).len(),
        };

        let mut buckets: HashMap<ContentType, Atom> = HashMap::new();
        for atom in &core {
            match buckets.get(&atom.content_type) {
                Some(kept) if kept.id <= atom.id => {}
                _ => {
                    buckets.insert(atom.content_type, atom.clone());
                }
            }
        }
        let duplicates = core.len() - buckets.len();

        let mut slots = Vec::new();
        let mut context: Vec<AtomContent> = Vec::new();
        let mut seen = HashSet::new();
        let mut created = 0usize;
        for step in builder.recipe(ctx) {
            if !seen.insert(step.content_type) {
                warn!(content_type = %step.content_type, "Recipe repeats a type, step skipped");
                continue;
            }
            if let Some(mut atom) = buckets.remove(&step.content_type) {
                if step.difficulty.is_some() && atom.difficulty != step.difficulty {
                    atom.difficulty = step.difficulty.clone();
                }
                context.push(atom.content.clone());
                slots.push(AtomSlot::Existing(atom));
                continue;
            }
            let Some(content) = builder
                .build_atom(&self.factory, &step, ctx, &context)
                .await
            else {
                continue;
            };
            if content.content_type() != step.content_type {
                warn!(
                    wanted = %step.content_type,
                    got = %content.content_type(),
                    "Builder returned another type, step skipped"
                );
                continue;
            }
            context.push(content.clone());
            slots.push(new_core_slot(&step, content));
            created += 1;
        }

        // leftover core atoms keep their previous relative order
        for atom in &core {
            if buckets.get(&atom.content_type).map(|a| a.id) == Some(atom.id)
                && let Some(kept) = buckets.remove(&atom.content_type)
            {
                slots.push(AtomSlot::Existing(kept));
            }
        }
        slots.extend(bonus.into_iter().map(AtomSlot::Existing));

        if is_unchanged(&slots, &existing) {
            info!(builder = builder.name(), atoms = existing.len(), "Molecule content already up to date");
            return Ok(existing);
        }

        let atoms = self
            .store
            .replace_molecule_atoms(molecule.id, slots, Utc::now())
            .await?;
        info!(
            builder = builder.name(),
            atoms = atoms.len(),
            created,
            replaced,
            duplicates_removed = duplicates,
            "Molecule content built"
        );
        Ok(atoms)
    }

    /// Append a bonus atom after every existing atom of the molecule
    pub async fn create_bonus_atom(
        &self,
        molecule: &Molecule,
        content_type: ContentType,
        title: Option<&str>,
        difficulty: Option<&str>,
    ) -> Result<Atom> {
        let (granule, capsule) = self.store.molecule_parents(molecule).await?;
        let ctx = MoleculeContext {
            capsule: &capsule,
            granule: &granule,
            molecule,
            plan: capsule.learning_plan.as_ref(),
        };
        let builder = self.registry.select(&capsule.domain, &capsule.area);
        let existing = self.store.atoms(molecule.id).await?;
        let context: Vec<AtomContent> = existing
            .iter()
            .filter(|a| !a.is_bonus)
            .map(|a| a.content.clone())
            .collect();

        let step = RecipeStep {
            content_type,
            title: title.map(str::to_string),
            difficulty: difficulty.map(str::to_string),
        };
        let content = builder
            .build_atom(&self.factory, &step, &ctx, &context)
            .await
            .ok_or_else(|| EngineError::InvalidInput(format!("no {content_type} content produced")))?;

        let mut slots: Vec<AtomSlot> = existing.into_iter().map(AtomSlot::Existing).collect();
        slots.push(AtomSlot::New(
            NewAtom::bonus(step.atom_title(), content).with_difficulty(step.difficulty.clone()),
        ));
        let atoms = self
            .store
            .replace_molecule_atoms(molecule.id, slots, Utc::now())
            .await?;
        let atom = atoms
            .into_iter()
            .last()
            .ok_or_else(|| EngineError::Database("bonus atom was not written".into()))?;
        info!(atom_id = atom.id, content_type = %content_type, "Bonus atom created");
        Ok(atom)
    }
}

/// Whether a build keeps the molecule's current core atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecipeMode {
    Reuse,
    Fresh,
}

fn new_core_slot(step: &RecipeStep, content: AtomContent) -> AtomSlot {
    AtomSlot::New(NewAtom::core(step.atom_title(), content).with_difficulty(step.difficulty.clone()))
}

/// Same atoms, same difficulties, already numbered 1..N in this order
fn is_unchanged(slots: &[AtomSlot], existing: &[Atom]) -> bool {
    slots.len() == existing.len()
        && slots.iter().zip(existing).enumerate().all(|(i, (slot, old))| {
            matches!(slot, AtomSlot::Existing(a)
                if a.id == old.id && a.difficulty == old.difficulty && a.order == i as u32 + 1)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, LlmConfig};
    use crate::content::{FallbackInput, fallback_content};
    use crate::embedding::EmbeddingService;
    use crate::llm::LlmGateway;
    use crate::types::Classification;
    use nanshe_models::ProviderRegistry;

    async fn fixture() -> (CapsuleBuilder, Arc<CozoStore>, Molecule) {
        let store = Arc::new(CozoStore::open_mem().await.unwrap());
        let embeddings = Arc::new(EmbeddingService::new(&EmbeddingConfig::default()));
        // no providers: every atom falls back to static content
        let llm = Arc::new(LlmGateway::new(
            ProviderRegistry::new(),
            store.clone(),
            &LlmConfig::default(),
        ));
        let planner = Arc::new(Planner::new(store.clone(), embeddings.clone(), llm.clone()));
        let factory = Arc::new(AtomFactory::new(store.clone(), embeddings, llm));
        let builder = CapsuleBuilder::new(store.clone(), planner, factory, BuilderRegistry::default());

        let capsule = store
            .create_capsule(
                NewCapsule {
                    title: "Pottery".into(),
                    classification: Classification::new("others", "general", "pottery"),
                    creator_id: 1,
                    is_public: false,
                    language: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let granule = store.insert_granule(capsule.id, 1, "Basics").await.unwrap();
        let molecule = store
            .insert_molecule(granule.id, 1, "Wedging clay", GenerationStatus::Pending)
            .await
            .unwrap();
        (builder, store, molecule)
    }

    fn content(content_type: ContentType) -> AtomContent {
        fallback_content(
            content_type,
            &FallbackInput {
                molecule_title: "Wedging clay",
                main_skill: "pottery",
                ..Default::default()
            },
        )
    }

    fn core(title: &str, content_type: ContentType) -> AtomSlot {
        AtomSlot::New(NewAtom::core(title, content(content_type)))
    }

    fn types(atoms: &[Atom]) -> Vec<ContentType> {
        atoms.iter().map(|a| a.content_type).collect()
    }

    fn ids(atoms: &[Atom]) -> Vec<i64> {
        atoms.iter().map(|a| a.id).collect()
    }

    #[tokio::test]
    async fn test_duplicate_core_types_keep_the_lowest_id() {
        let (builder, store, molecule) = fixture().await;
        let seeded = store
            .replace_molecule_atoms(
                molecule.id,
                vec![
                    core("First lesson", ContentType::Lesson),
                    core("Second lesson", ContentType::Lesson),
                    core("Quiz", ContentType::Quiz),
                ],
                Utc::now(),
            )
            .await
            .unwrap();

        let atoms = builder.build_molecule_content(&molecule).await.unwrap();
        assert_eq!(
            types(&atoms),
            vec![
                ContentType::Lesson,
                ContentType::Flashcards,
                ContentType::Quiz,
                ContentType::ShortAnswer
            ]
        );
        assert_eq!(atoms[0].id, seeded[0].id);
        assert_eq!(atoms[2].id, seeded[2].id);
        assert!(atoms.iter().all(|a| a.id != seeded[1].id));

        let stored = store.require_molecule(molecule.id).await.unwrap();
        assert_eq!(stored.generation_status, GenerationStatus::Completed);
    }

    #[tokio::test]
    async fn test_leftover_core_atoms_follow_the_recipe() {
        let (builder, store, molecule) = fixture().await;
        let seeded = store
            .replace_molecule_atoms(
                molecule.id,
                vec![
                    core("Pairs", ContentType::Matching),
                    AtomSlot::New(NewAtom::bonus("Extra", content(ContentType::TrueFalse))),
                    core("Order", ContentType::Ordering),
                    core("Lesson", ContentType::Lesson),
                ],
                Utc::now(),
            )
            .await
            .unwrap();

        let atoms = builder.build_molecule_content(&molecule).await.unwrap();
        assert_eq!(
            types(&atoms),
            vec![
                ContentType::Lesson,
                ContentType::Flashcards,
                ContentType::Quiz,
                ContentType::ShortAnswer,
                ContentType::Matching,
                ContentType::Ordering,
                ContentType::TrueFalse,
            ]
        );
        assert_eq!(atoms[0].id, seeded[3].id);
        assert_eq!(atoms[4].id, seeded[0].id);
        assert!(atoms[6].is_bonus);
        let orders: Vec<u32> = atoms.iter().map(|a| a.order).collect();
        assert_eq!(orders, (1..=7).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn test_regenerate_keeps_bonus_atoms() {
        let (builder, store, molecule) = fixture().await;
        let first = builder.build_molecule_content(&molecule).await.unwrap();
        let bonus = builder
            .create_bonus_atom(&molecule, ContentType::TrueFalse, None, None)
            .await
            .unwrap();

        let atoms = builder.regenerate_molecule_content(&molecule).await.unwrap();
        assert_eq!(atoms.len(), first.len() + 1);
        assert!(atoms.iter().filter(|a| !a.is_bonus).all(|a| first.iter().all(|f| f.id != a.id)));
        assert_eq!(atoms.last().map(|a| a.id), Some(bonus.id));
        assert_eq!(ids(&store.atoms(molecule.id).await.unwrap()), ids(&atoms));
    }

    #[tokio::test]
    async fn test_unchanged_detection() {
        let (builder, store, molecule) = fixture().await;
        let atoms = builder.build_molecule_content(&molecule).await.unwrap();
        let same: Vec<AtomSlot> = atoms.iter().cloned().map(AtomSlot::Existing).collect();
        assert!(is_unchanged(&same, &atoms));

        let mut swapped = same.clone();
        swapped.swap(0, 1);
        assert!(!is_unchanged(&swapped, &atoms));

        let mut harder = atoms.clone();
        harder[0].difficulty = Some("hard".into());
        let retuned: Vec<AtomSlot> = harder.into_iter().map(AtomSlot::Existing).collect();
        assert!(!is_unchanged(&retuned, &atoms));

        let mut grown = same;
        grown.push(core("Extra", ContentType::Matching));
        assert!(!is_unchanged(&grown, &atoms));

        // a second build writes nothing
        let again = builder.build_molecule_content(&molecule).await.unwrap();
        assert_eq!(ids(&again), ids(&atoms));
        assert_eq!(ids(&store.atoms(molecule.id).await.unwrap()), ids(&atoms));
    }
}
