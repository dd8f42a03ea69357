//! Capsule → Granule → Molecule → Atom rows.

use chrono::{DateTime, Utc};
use cozo::DataValue;

use super::cozo::*;
use crate::content::AtomContent;
use crate::types::{
    Atom, AtomLineage, AtomSlot, Capsule, Classification, CoachContext, ContentType,
    GenerationStatus, Granule, Id, LearningPlan, Molecule, from_millis, to_millis,
};
use crate::{EngineError, Result};

const CAPSULE_COLUMNS: &str =
    "id, title, domain, area, main_skill, creator_id, is_public, language, plan_json, status, created_at";
const GRANULE_COLUMNS: &str = "id, capsule_id, position, title";
const MOLECULE_COLUMNS: &str = "id, granule_id, position, title, status";
const ATOM_COLUMNS: &str =
    "id, molecule_id, title, position, content_type, content_json, difficulty, is_bonus, created_at";

/// Fields of a capsule row before it exists.
#[derive(Debug, Clone)]
pub struct NewCapsule {
    pub title: String,
    pub classification: Classification,
    pub creator_id: Id,
    pub is_public: bool,
    pub language: Option<String>,
}

/// A molecule with its granule and its atoms in order.
#[derive(Debug, Clone)]
pub struct MoleculeOutline {
    pub granule: Granule,
    pub molecule: Molecule,
    pub atoms: Vec<Atom>,
}

impl CozoStore {
    // --- capsules ---

    pub async fn create_capsule(&self, new: NewCapsule, at: DateTime<Utc>) -> Result<Capsule> {
        let capsule = Capsule {
            id: self.next_id().await?,
            title: new.title,
            domain: new.classification.domain,
            area: new.classification.area,
            main_skill: new.classification.main_skill,
            creator_id: new.creator_id,
            is_public: new.is_public,
            language: new.language,
            learning_plan: None,
            generation_status: GenerationStatus::Pending,
            created_at: from_millis(to_millis(at)),
        };
        self.put_capsule(&capsule).await?;
        Ok(capsule)
    }

    /// Insert or replace a capsule row
    pub async fn put_capsule(&self, capsule: &Capsule) -> Result<()> {
        let plan_json = capsule.learning_plan.as_ref().map(to_json).transpose()?;
        let query = format!(
            "?[{CAPSULE_COLUMNS}] <- [[$id, $title, $domain, $area, $main_skill, $creator_id, \
             $is_public, $language, $plan_json, $status, $created_at]] \
             :put capsules {{id => title, domain, area, main_skill, creator_id, is_public, \
             language, plan_json, status, created_at}}"
        );
        self.run_mutation(
            &query,
            params([
                ("id", DataValue::from(capsule.id)),
                ("title", DataValue::from(capsule.title.as_str())),
                ("domain", DataValue::from(capsule.domain.as_str())),
                ("area", DataValue::from(capsule.area.as_str())),
                ("main_skill", DataValue::from(capsule.main_skill.as_str())),
                ("creator_id", DataValue::from(capsule.creator_id)),
                ("is_public", DataValue::from(capsule.is_public)),
                ("language", opt_str(capsule.language.as_deref())),
                ("plan_json", opt_str(plan_json.as_deref())),
                ("status", DataValue::from(capsule.generation_status.as_str())),
                ("created_at", time(capsule.created_at)),
            ]),
        )
        .await?;
        Ok(())
    }

    pub async fn get_capsule(&self, id: Id) -> Result<Option<Capsule>> {
        let query = format!("?[{CAPSULE_COLUMNS}] := *capsules{{{CAPSULE_COLUMNS}}}, id = $id");
        let rows = self.run_query(&query, params([("id", DataValue::from(id))])).await?;
        rows.rows.first().map(|row| parse_capsule_row(row)).transpose()
    }

    pub async fn require_capsule(&self, id: Id) -> Result<Capsule> {
        self.get_capsule(id)
            .await?
            .ok_or_else(|| EngineError::not_found("capsule", id))
    }

    pub async fn set_capsule_status(&self, id: Id, status: GenerationStatus) -> Result<()> {
        let mut capsule = self.require_capsule(id).await?;
        capsule.generation_status = status;
        self.put_capsule(&capsule).await
    }

    pub async fn set_capsule_plan(&self, id: Id, plan: &LearningPlan) -> Result<()> {
        let mut capsule = self.require_capsule(id).await?;
        capsule.learning_plan = Some(plan.clone());
        self.put_capsule(&capsule).await
    }

    /// Delete a capsule and everything hanging off it.
    ///
    /// Removes the tree, learner progress on its atoms and molecules, coach
    /// threads opened inside it, its activity sessions and vector rows.
    pub async fn delete_capsule(&self, id: Id) -> Result<()> {
        let rows = self
            .run_query(
                "?[m] := *granules{id: g, capsule_id}, capsule_id = $capsule_id, \
                 *molecules{id: m, granule_id: g}",
                params([("capsule_id", DataValue::from(id))]),
            )
            .await?;
        let molecule_ids = rows
            .rows
            .iter()
            .map(|row| get_int(row, 0, "molecule id"))
            .collect::<Result<Vec<_>>>()?;
        let location_keys = std::iter::once(CoachContext::Capsule { capsule_id: id })
            .chain(molecule_ids.iter().map(|&molecule_id| CoachContext::Molecule {
                capsule_id: id,
                molecule_id,
            }))
            .map(|context| DataValue::from(context.location_key()))
            .collect();

        let script = r#"
        {
            ?[id] := *granules{id: g, capsule_id}, capsule_id = $capsule_id,
                     *molecules{id: m, granule_id: g}, *atoms{id: a, molecule_id: m},
                     *answer_logs{id, atom_id: a}
            :rm answer_logs {id}
        }
        {
            ?[user_id, atom_id] := *granules{id: g, capsule_id}, capsule_id = $capsule_id,
                     *molecules{id: m, granule_id: g}, *atoms{id: atom_id, molecule_id: m},
                     *atom_progress{user_id, atom_id}
            :rm atom_progress {user_id, atom_id}
        }
        {
            ?[user_id, molecule_id] := *granules{id: g, capsule_id}, capsule_id = $capsule_id,
                     *molecules{id: molecule_id, granule_id: g},
                     *molecule_reviews{user_id, molecule_id}
            :rm molecule_reviews {user_id, molecule_id}
        }
        {
            ?[id] := *coach_threads{id: t, location_key}, is_in(location_key, $location_keys),
                     *coach_messages{id, thread_id: t}
            :rm coach_messages {id}
        }
        {
            ?[id] := *coach_threads{id, location_key}, is_in(location_key, $location_keys)
            :rm coach_threads {id}
        }
        {
            ?[id] := *vector_entries{id, capsule_id}, capsule_id == $capsule_id
            :rm vector_entries {id}
        }
        {
            ?[id] := *activity_logs{id, capsule_id}, capsule_id == $capsule_id
            :rm activity_logs {id}
        }
        {
            ?[id] := *granules{id: g, capsule_id}, capsule_id = $capsule_id,
                     *molecules{id: m, granule_id: g}, *atoms{id, molecule_id: m}
            :rm atoms {id}
        }
        {
            ?[id] := *granules{id: g, capsule_id}, capsule_id = $capsule_id,
                     *molecules{id, granule_id: g}
            :rm molecules {id}
        }
        {
            ?[id] := *granules{id, capsule_id}, capsule_id = $capsule_id
            :rm granules {id}
        }
        {
            ?[user_id, capsule_id] := *enrollments{user_id, capsule_id}, capsule_id = $capsule_id
            :rm enrollments {user_id, capsule_id}
        }
        {
            ?[user_id, capsule_id] := *capsule_progress{user_id, capsule_id}, capsule_id = $capsule_id
            :rm capsule_progress {user_id, capsule_id}
        }
        {
            ?[id] <- [[$capsule_id]]
            :rm capsules {id}
        }
        "#;
        self.run_mutation(
            script,
            params([
                ("capsule_id", DataValue::from(id)),
                ("location_keys", DataValue::List(location_keys)),
            ]),
        )
        .await?;
        Ok(())
    }

    /// Ids of the capsules a user created
    pub async fn capsules_created_by(&self, user_id: Id) -> Result<Vec<Id>> {
        let rows = self
            .run_query(
                "?[id] := *capsules{id, creator_id}, creator_id = $user_id",
                params([("user_id", DataValue::from(user_id))]),
            )
            .await?;
        rows.rows.iter().map(|row| get_int(row, 0, "capsule id")).collect()
    }

    // --- granules ---

    pub async fn insert_granule(&self, capsule_id: Id, order: u32, title: &str) -> Result<Granule> {
        let granule = Granule {
            id: self.next_id().await?,
            capsule_id,
            order,
            title: title.to_string(),
        };
        let query = format!(
            "?[{GRANULE_COLUMNS}] <- [[$id, $capsule_id, $position, $title]] \
             :put granules {{id => capsule_id, position, title}}"
        );
        self.run_mutation(
            &query,
            params([
                ("id", DataValue::from(granule.id)),
                ("capsule_id", DataValue::from(capsule_id)),
                ("position", DataValue::from(order as i64)),
                ("title", DataValue::from(title)),
            ]),
        )
        .await?;
        Ok(granule)
    }

    /// Granules of a capsule sorted by order
    pub async fn granules(&self, capsule_id: Id) -> Result<Vec<Granule>> {
        let query = format!(
            "?[{GRANULE_COLUMNS}] := *granules{{{GRANULE_COLUMNS}}}, capsule_id = $capsule_id"
        );
        let rows = self
            .run_query(&query, params([("capsule_id", DataValue::from(capsule_id))]))
            .await?;
        let mut granules = rows
            .rows
            .iter()
            .map(|row| parse_granule_row(row))
            .collect::<Result<Vec<_>>>()?;
        granules.sort_by_key(|g| (g.order, g.id));
        Ok(granules)
    }

    pub async fn get_granule(&self, id: Id) -> Result<Option<Granule>> {
        let query = format!("?[{GRANULE_COLUMNS}] := *granules{{{GRANULE_COLUMNS}}}, id = $id");
        let rows = self.run_query(&query, params([("id", DataValue::from(id))])).await?;
        rows.rows.first().map(|row| parse_granule_row(row)).transpose()
    }

    pub async fn find_granule(&self, capsule_id: Id, order: u32) -> Result<Option<Granule>> {
        Ok(self
            .granules(capsule_id)
            .await?
            .into_iter()
            .find(|g| g.order == order))
    }

    // --- molecules ---

    pub async fn insert_molecule(
        &self,
        granule_id: Id,
        order: u32,
        title: &str,
        status: GenerationStatus,
    ) -> Result<Molecule> {
        let molecule = Molecule {
            id: self.next_id().await?,
            granule_id,
            order,
            title: title.to_string(),
            generation_status: status,
        };
        self.put_molecule(&molecule).await?;
        Ok(molecule)
    }

    pub async fn put_molecule(&self, molecule: &Molecule) -> Result<()> {
        let query = format!(
            "?[{MOLECULE_COLUMNS}] <- [[$id, $granule_id, $position, $title, $status]] \
             :put molecules {{id => granule_id, position, title, status}}"
        );
        self.run_mutation(
            &query,
            params([
                ("id", DataValue::from(molecule.id)),
                ("granule_id", DataValue::from(molecule.granule_id)),
                ("position", DataValue::from(molecule.order as i64)),
                ("title", DataValue::from(molecule.title.as_str())),
                ("status", DataValue::from(molecule.generation_status.as_str())),
            ]),
        )
        .await?;
        Ok(())
    }

    /// Molecules of a granule sorted by order
    pub async fn molecules(&self, granule_id: Id) -> Result<Vec<Molecule>> {
        let query = format!(
            "?[{MOLECULE_COLUMNS}] := *molecules{{{MOLECULE_COLUMNS}}}, granule_id = $granule_id"
        );
        let rows = self
            .run_query(&query, params([("granule_id", DataValue::from(granule_id))]))
            .await?;
        let mut molecules = rows
            .rows
            .iter()
            .map(|row| parse_molecule_row(row))
            .collect::<Result<Vec<_>>>()?;
        molecules.sort_by_key(|m| (m.order, m.id));
        Ok(molecules)
    }

    pub async fn get_molecule(&self, id: Id) -> Result<Option<Molecule>> {
        let query = format!("?[{MOLECULE_COLUMNS}] := *molecules{{{MOLECULE_COLUMNS}}}, id = $id");
        let rows = self.run_query(&query, params([("id", DataValue::from(id))])).await?;
        rows.rows.first().map(|row| parse_molecule_row(row)).transpose()
    }

    pub async fn require_molecule(&self, id: Id) -> Result<Molecule> {
        self.get_molecule(id)
            .await?
            .ok_or_else(|| EngineError::not_found("molecule", id))
    }

    pub async fn find_molecule(&self, granule_id: Id, order: u32) -> Result<Option<Molecule>> {
        Ok(self
            .molecules(granule_id)
            .await?
            .into_iter()
            .find(|m| m.order == order))
    }

    pub async fn set_molecule_status(&self, id: Id, status: GenerationStatus) -> Result<()> {
        let mut molecule = self.require_molecule(id).await?;
        molecule.generation_status = status;
        self.put_molecule(&molecule).await
    }

    /// The molecule's granule and capsule
    pub async fn molecule_parents(&self, molecule: &Molecule) -> Result<(Granule, Capsule)> {
        let granule = self
            .get_granule(molecule.granule_id)
            .await?
            .ok_or_else(|| EngineError::not_found("granule", molecule.granule_id))?;
        let capsule = self.require_capsule(granule.capsule_id).await?;
        Ok((granule, capsule))
    }

    /// Every materialized molecule of a capsule with its atoms, sorted by
    /// `(granule.order, molecule.order)`
    pub async fn capsule_outline(&self, capsule_id: Id) -> Result<Vec<MoleculeOutline>> {
        let mut outline = Vec::new();
        for granule in self.granules(capsule_id).await? {
            for molecule in self.molecules(granule.id).await? {
                let atoms = self.atoms(molecule.id).await?;
                outline.push(MoleculeOutline {
                    granule: granule.clone(),
                    molecule,
                    atoms,
                });
            }
        }
        Ok(outline)
    }

    // --- atoms ---

    /// Atoms of a molecule sorted by `(order, id)`
    pub async fn atoms(&self, molecule_id: Id) -> Result<Vec<Atom>> {
        let query = format!(
            "?[{ATOM_COLUMNS}] := *atoms{{{ATOM_COLUMNS}}}, molecule_id = $molecule_id"
        );
        let rows = self
            .run_query(&query, params([("molecule_id", DataValue::from(molecule_id))]))
            .await?;
        let mut atoms = rows
            .rows
            .iter()
            .map(|row| parse_atom_row(row))
            .collect::<Result<Vec<_>>>()?;
        atoms.sort_by_key(|a| (a.order, a.id));
        Ok(atoms)
    }

    pub async fn get_atom(&self, id: Id) -> Result<Option<Atom>> {
        let query = format!("?[{ATOM_COLUMNS}] := *atoms{{{ATOM_COLUMNS}}}, id = $id");
        let rows = self.run_query(&query, params([("id", DataValue::from(id))])).await?;
        rows.rows.first().map(|row| parse_atom_row(row)).transpose()
    }

    /// An atom with its molecule, granule and capsule
    pub async fn atom_lineage(&self, atom_id: Id) -> Result<AtomLineage> {
        let atom = self
            .get_atom(atom_id)
            .await?
            .ok_or_else(|| EngineError::not_found("atom", atom_id))?;
        let molecule = self.require_molecule(atom.molecule_id).await?;
        let (granule, capsule) = self.molecule_parents(&molecule).await?;
        Ok(AtomLineage {
            atom,
            molecule,
            granule,
            capsule,
        })
    }

    /// Replace the atom set of a molecule in one transaction.
    ///
    /// Slots are written in the given order with positions 1..N. Existing
    /// atoms keep their ids; atoms of the molecule not in `slots` are
    /// removed.
    pub async fn replace_molecule_atoms(
        &self,
        molecule_id: Id,
        slots: Vec<AtomSlot>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Atom>> {
        let new_count = slots.iter().filter(|s| matches!(s, AtomSlot::New(_))).count();
        let mut fresh_ids = self.next_ids(new_count).await?.into_iter();
        let created_at = from_millis(to_millis(at));

        let mut atoms = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            let order = index as u32 + 1;
            let atom = match slot {
                AtomSlot::Existing(mut atom) => {
                    atom.order = order;
                    atom.molecule_id = molecule_id;
                    atom
                }
                AtomSlot::New(new) => {
                    let id = fresh_ids
                        .next()
                        .ok_or_else(|| EngineError::Database("id allocation exhausted".into()))?;
                    Atom {
                        id,
                        molecule_id,
                        title: new.title,
                        order,
                        content_type: new.content.content_type(),
                        content: new.content,
                        difficulty: new.difficulty,
                        is_bonus: new.is_bonus,
                        created_at,
                    }
                }
            };
            atoms.push(atom);
        }

        let rows = atoms
            .iter()
            .map(atom_row)
            .collect::<Result<Vec<_>>>()?;

        let mut script = String::from(
            "{ ?[id] := *atoms{id, molecule_id}, molecule_id = $molecule_id :rm atoms {id} }",
        );
        if !rows.is_empty() {
            script.push_str(&format!(
                " {{ ?[{ATOM_COLUMNS}] <- $rows :put atoms {{id => molecule_id, title, position, \
                 content_type, content_json, difficulty, is_bonus, created_at}} }}"
            ));
        }
        self.run_mutation(
            &script,
            params([
                ("molecule_id", DataValue::from(molecule_id)),
                ("rows", DataValue::List(rows)),
            ]),
        )
        .await?;
        Ok(atoms)
    }
}

fn atom_row(atom: &Atom) -> Result<DataValue> {
    let content_json = to_json(&atom.content.to_value())?;
    Ok(DataValue::List(vec![
        DataValue::from(atom.id),
        DataValue::from(atom.molecule_id),
        DataValue::from(atom.title.as_str()),
        DataValue::from(atom.order as i64),
        DataValue::from(atom.content_type.as_str()),
        DataValue::from(content_json),
        opt_str(atom.difficulty.as_deref()),
        DataValue::from(atom.is_bonus),
        time(atom.created_at),
    ]))
}

fn parse_capsule_row(row: &[DataValue]) -> Result<Capsule> {
    let learning_plan = match get_opt_string(row, 8) {
        Some(text) => Some(serde_json::from_str::<LearningPlan>(&text).map_err(|e| {
            EngineError::Database(format!("Invalid plan_json: {e}"))
        })?),
        None => None,
    };
    Ok(Capsule {
        id: get_int(row, 0, "capsule id")?,
        title: get_string(row, 1, "title")?,
        domain: get_string(row, 2, "domain")?,
        area: get_string(row, 3, "area")?,
        main_skill: get_string(row, 4, "main_skill")?,
        creator_id: get_int(row, 5, "creator_id")?,
        is_public: get_bool(row, 6, "is_public")?,
        language: get_opt_string(row, 7),
        learning_plan,
        generation_status: get_string(row, 9, "status")?.parse()?,
        created_at: get_time(row, 10, "created_at")?,
    })
}

fn parse_granule_row(row: &[DataValue]) -> Result<Granule> {
    Ok(Granule {
        id: get_int(row, 0, "granule id")?,
        capsule_id: get_int(row, 1, "capsule_id")?,
        order: get_int(row, 2, "position")? as u32,
        title: get_string(row, 3, "title")?,
    })
}

fn parse_molecule_row(row: &[DataValue]) -> Result<Molecule> {
    Ok(Molecule {
        id: get_int(row, 0, "molecule id")?,
        granule_id: get_int(row, 1, "granule_id")?,
        order: get_int(row, 2, "position")? as u32,
        title: get_string(row, 3, "title")?,
        generation_status: get_string(row, 4, "status")?.parse()?,
    })
}

fn parse_atom_row(row: &[DataValue]) -> Result<Atom> {
    let content_type: ContentType = get_string(row, 4, "content_type")?.parse()?;
    let body: serde_json::Value = get_json(row, 5, "content_json")?;
    Ok(Atom {
        id: get_int(row, 0, "atom id")?,
        molecule_id: get_int(row, 1, "molecule_id")?,
        title: get_string(row, 2, "title")?,
        order: get_int(row, 3, "position")? as u32,
        content_type,
        content: AtomContent::from_stored(content_type, body)?,
        difficulty: get_opt_string(row, 6),
        is_bonus: get_bool(row, 7, "is_bonus")?,
        created_at: get_time(row, 8, "created_at")?,
    })
}
