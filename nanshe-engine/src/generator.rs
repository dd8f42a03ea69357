//! End-to-end capsule workflows: classify, plan, materialize.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::builder::CapsuleBuilder;
use crate::classifier::TaxonomyClassifier;
use crate::config::XpConfig;
use crate::store::{CozoStore, NewCapsule, VectorStore};
use crate::types::{
    Atom, Capsule, Classification, ContentType, GenerationStatus, Id, Molecule, VectorFilter,
};
use crate::{EngineError, Result, xp};

/// Classification used when nothing in the taxonomy matches.
pub const FALLBACK_DOMAIN: &str = "others";
pub const FALLBACK_AREA: &str = "general";

/// Nested capsule view with per-atom XP.
#[derive(Debug, Clone, Serialize)]
pub struct CapsuleTree {
    pub id: Id,
    pub title: String,
    pub domain: String,
    pub area: String,
    pub main_skill: String,
    pub language: Option<String>,
    pub generation_status: GenerationStatus,
    pub granules: Vec<GranuleNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GranuleNode {
    pub id: Id,
    pub order: u32,
    pub title: String,
    pub molecules: Vec<MoleculeNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoleculeNode {
    pub id: Id,
    pub order: u32,
    pub title: String,
    pub generation_status: GenerationStatus,
    pub xp_total: u64,
    pub atoms: Vec<AtomNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AtomNode {
    pub id: Id,
    pub order: u32,
    pub title: String,
    pub content_type: ContentType,
    pub difficulty: Option<String>,
    pub is_bonus: bool,
    /// Bare body, as stored
    pub content: serde_json::Value,
    pub xp_value: u64,
}

pub struct CapsuleGenerator {
    store: Arc<CozoStore>,
    classifier: Arc<TaxonomyClassifier>,
    builder: Arc<CapsuleBuilder>,
    xp: XpConfig,
}

impl CapsuleGenerator {
    pub fn new(
        store: Arc<CozoStore>,
        classifier: Arc<TaxonomyClassifier>,
        builder: Arc<CapsuleBuilder>,
        xp: XpConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            builder,
            xp,
        }
    }

    /// Classify a topic, create the capsule and enroll its creator.
    /// The capsule is left `pending`.
    pub async fn create_pending(
        &self,
        user_id: Id,
        topic: &str,
        language: Option<&str>,
    ) -> Result<Capsule> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(EngineError::InvalidInput("topic is empty".into()));
        }
        self.store.require_user(user_id).await?;
        let classification = self.classify_topic(topic).await;
        let capsule = self
            .builder
            .create_capsule(NewCapsule {
                title: topic.to_string(),
                classification,
                creator_id: user_id,
                is_public: false,
                language: language.map(str::to_string),
            })
            .await?;
        self.store.enroll(user_id, capsule.id, Utc::now()).await?;
        Ok(capsule)
    }

    /// Plan the capsule and materialize its first molecule.
    #[instrument(skip(self))]
    pub async fn run_generation(&self, capsule_id: Id) -> Result<Capsule> {
        let mut capsule = self.store.require_capsule(capsule_id).await?;
        self.store
            .set_capsule_status(capsule_id, GenerationStatus::Generating)
            .await?;
        let result = async {
            self.builder.generate_plan(&mut capsule).await?;
            self.builder.materialize(&capsule, 1, 1).await
        }
        .await;
        self.finish(capsule_id, result.map(|_| ())).await
    }

    /// Full synchronous workflow
    pub async fn generate(&self, user_id: Id, topic: &str, language: Option<&str>) -> Result<Capsule> {
        let capsule = self.create_pending(user_id, topic, language).await?;
        self.run_generation(capsule.id).await
    }

    /// Build a capsule from a document. Premium only.
    #[instrument(skip(self, source_text), fields(source_chars = source_text.len()))]
    pub async fn create_capsule_from_source(
        &self,
        user_id: Id,
        title: &str,
        source_text: &str,
        language: Option<&str>,
    ) -> Result<Capsule> {
        let user = self.store.require_user(user_id).await?;
        if !user.is_premium() {
            return Err(EngineError::PermissionDenied(
                "document-based capsules require a premium subscription".into(),
            ));
        }
        if source_text.trim().is_empty() {
            return Err(EngineError::InvalidInput("source text is empty".into()));
        }
        let mut capsule = self.create_pending(user_id, title, language).await?;
        let capsule_id = capsule.id;
        self.store
            .set_capsule_status(capsule_id, GenerationStatus::Generating)
            .await?;
        let result = async {
            self.builder
                .generate_plan_from_source(&mut capsule, source_text)
                .await?;
            self.builder.materialize(&capsule, 1, 1).await
        }
        .await;
        self.finish(capsule_id, result.map(|_| ())).await
    }

    async fn finish(&self, capsule_id: Id, result: Result<()>) -> Result<Capsule> {
        match result {
            Ok(()) => {
                self.store
                    .set_capsule_status(capsule_id, GenerationStatus::Completed)
                    .await?;
                info!(capsule_id, "Capsule generated");
                self.store.require_capsule(capsule_id).await
            }
            Err(e) => {
                warn!(capsule_id, error = %e, "Capsule generation failed");
                if let Err(status_err) = self
                    .store
                    .set_capsule_status(capsule_id, GenerationStatus::Failed)
                    .await
                {
                    warn!(capsule_id, error = %status_err, "Could not mark capsule failed");
                }
                Err(e)
            }
        }
    }

    /// Every `(granule, molecule)` position of the capsule's plan
    pub async fn plan_positions(&self, capsule_id: Id) -> Result<Vec<(u32, u32)>> {
        let capsule = self.store.require_capsule(capsule_id).await?;
        Ok(capsule.plan()?.positions())
    }

    /// Materialize one plan position of an existing capsule
    pub async fn materialize_molecule(
        &self,
        capsule_id: Id,
        granule_order: u32,
        molecule_order: u32,
    ) -> Result<(Molecule, Vec<Atom>)> {
        let capsule = self.store.require_capsule(capsule_id).await?;
        self.builder
            .materialize(&capsule, granule_order, molecule_order)
            .await
    }

    /// Regenerate a molecule's core atoms.
    ///
    /// The new set replaces the old one in a single write, bonus atoms
    /// included. Index rows of the replaced atoms are removed afterwards,
    /// so a failed rebuild leaves both atoms and vectors untouched.
    pub async fn regenerate_molecule(&self, molecule_id: Id) -> Result<Vec<Atom>> {
        let molecule = self.store.require_molecule(molecule_id).await?;
        let replaced: BTreeSet<ContentType> = self
            .store
            .atoms(molecule_id)
            .await?
            .iter()
            .filter(|a| !a.is_bonus)
            .map(|a| a.content_type)
            .collect();
        let stale = if replaced.is_empty() {
            Vec::new()
        } else {
            let filter = replaced
                .iter()
                .fold(VectorFilter::new().molecule(molecule_id), |f, ct| f.content_type(ct.as_str()));
            self.store.entries(&filter).await?
        };

        let atoms = self.builder.regenerate_molecule_content(&molecule).await?;

        // rows re-upserted with identical text already describe the new atoms
        let live: HashSet<String> = atoms.iter().map(|a| a.content.text_for_embedding()).collect();
        let stale_ids: Vec<Id> = stale
            .into_iter()
            .filter(|e| !live.contains(&e.text))
            .map(|e| e.id)
            .collect();
        let deleted = self.store.delete_vector_ids(&stale_ids).await?;
        info!(molecule_id, atoms = atoms.len(), vectors_removed = deleted, "Molecule regenerated");
        Ok(atoms)
    }

    /// Add a bonus atom to a molecule. Premium only.
    pub async fn create_bonus_atom(
        &self,
        user_id: Id,
        molecule_id: Id,
        content_type: ContentType,
        title: Option<&str>,
        difficulty: Option<&str>,
    ) -> Result<Atom> {
        let user = self.store.require_user(user_id).await?;
        if !user.is_premium() {
            return Err(EngineError::PermissionDenied(
                "bonus atoms require a premium subscription".into(),
            ));
        }
        let molecule = self.store.require_molecule(molecule_id).await?;
        self.builder
            .create_bonus_atom(&molecule, content_type, title, difficulty)
            .await
    }

    /// Delete a capsule with everything built from it. Creator or superuser only.
    pub async fn delete_capsule(&self, user_id: Id, capsule_id: Id) -> Result<()> {
        let user = self.store.require_user(user_id).await?;
        let capsule = self.store.require_capsule(capsule_id).await?;
        if capsule.creator_id != user_id && !user.is_superuser {
            return Err(EngineError::PermissionDenied(format!(
                "capsule {capsule_id} belongs to another user"
            )));
        }
        self.store.delete_capsule(capsule_id).await?;
        info!(capsule_id, user_id, "Capsule deleted");
        Ok(())
    }

    /// Nested view of everything materialized so far
    pub async fn capsule_tree(&self, capsule_id: Id) -> Result<CapsuleTree> {
        let capsule = self.store.require_capsule(capsule_id).await?;
        let outline = self.store.capsule_outline(capsule_id).await?;
        let distribution = xp::distribute(&outline, &self.xp);

        let mut granules: Vec<GranuleNode> = self
            .store
            .granules(capsule_id)
            .await?
            .into_iter()
            .map(|g| GranuleNode {
                id: g.id,
                order: g.order,
                title: g.title,
                molecules: Vec::new(),
            })
            .collect();
        granules.sort_by_key(|g| g.order);

        for entry in outline {
            let xp_total = distribution
                .molecule_totals
                .iter()
                .find(|(id, _)| *id == entry.molecule.id)
                .map(|(_, xp)| *xp)
                .unwrap_or(0);
            let atoms = entry
                .atoms
                .into_iter()
                .map(|a| AtomNode {
                    xp_value: distribution.xp_for(a.id),
                    id: a.id,
                    order: a.order,
                    title: a.title,
                    content_type: a.content_type,
                    difficulty: a.difficulty,
                    is_bonus: a.is_bonus,
                    content: a.content.to_value(),
                })
                .collect();
            let node = MoleculeNode {
                id: entry.molecule.id,
                order: entry.molecule.order,
                title: entry.molecule.title,
                generation_status: entry.molecule.generation_status,
                xp_total,
                atoms,
            };
            if let Some(granule) = granules.iter_mut().find(|g| g.id == entry.granule.id) {
                granule.molecules.push(node);
            }
        }
        for granule in &mut granules {
            granule.molecules.sort_by_key(|m| m.order);
        }

        Ok(CapsuleTree {
            id: capsule.id,
            title: capsule.title,
            domain: capsule.domain,
            area: capsule.area,
            main_skill: capsule.main_skill,
            language: capsule.language,
            generation_status: capsule.generation_status,
            granules,
        })
    }

    async fn classify_topic(&self, topic: &str) -> Classification {
        match self.classifier.classify(topic).await {
            Ok(matches) => match matches.into_iter().next() {
                Some(best) => {
                    info!(
                        domain = %best.category.domain,
                        area = %best.category.area,
                        skill = %best.category.name,
                        confidence = best.confidence,
                        "Topic classified"
                    );
                    Classification::new(best.category.domain, best.category.area, best.category.name)
                }
                None => fallback_classification(topic),
            },
            Err(e) => {
                warn!(error = %e, "Classification failed, using fallback");
                fallback_classification(topic)
            }
        }
    }
}

fn fallback_classification(topic: &str) -> Classification {
    Classification::new(FALLBACK_DOMAIN, FALLBACK_AREA, topic.to_lowercase())
}
