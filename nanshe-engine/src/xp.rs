//! XP distribution across a capsule.
//!
//! Every capsule is worth a fixed XP total. The total is split evenly
//! between molecules, then inside each molecule proportionally to a
//! per-type weight. Bonus atoms draw from a separate, small budget per
//! molecule and never touch the core total.

use std::collections::HashMap;

use crate::Result;
use crate::config::XpConfig;
use crate::store::{CozoStore, MoleculeOutline};
use crate::types::{Atom, ContentType, Id};

/// Weight used for types missing from the table.
pub const DEFAULT_WEIGHT: u64 = 2;

/// Relative XP weight of a core atom.
pub fn weight(content_type: ContentType) -> u64 {
    match content_type {
        ContentType::Lesson => 4,
        ContentType::Quiz => 2,
        ContentType::CodeExample => 2,
        ContentType::CodeChallenge => 5,
        ContentType::LiveCodeExecutor => 3,
        ContentType::CodeSandboxSetup => 1,
        ContentType::CodeProjectBrief => 4,
        ContentType::Vocabulary => 2,
        ContentType::Grammar => 2,
        ContentType::Dialogue => 3,
        ContentType::FillInBlank => 2,
        ContentType::Translation => 2,
        ContentType::Flashcards => 1,
        ContentType::EssayPrompt => 3,
        ContentType::Character => 2,
        _ => DEFAULT_WEIGHT,
    }
}

/// Result of [`distribute`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XpDistribution {
    /// XP for every atom of the capsule, bonus atoms included
    pub atom_xp: HashMap<Id, u64>,
    /// Core share of each molecule, in plan order
    pub molecule_totals: Vec<(Id, u64)>,
}

impl XpDistribution {
    pub fn xp_for(&self, atom_id: Id) -> u64 {
        self.atom_xp.get(&atom_id).copied().unwrap_or(0)
    }

    pub fn core_total(&self) -> u64 {
        self.molecule_totals.iter().map(|(_, xp)| xp).sum()
    }
}

/// Split the capsule total over the outline's molecules.
///
/// A molecule without core atoms still reserves its share in
/// `molecule_totals`; nothing in `atom_xp` carries it until atoms exist.
pub fn distribute(outline: &[MoleculeOutline], config: &XpConfig) -> XpDistribution {
    let mut ordered: Vec<&MoleculeOutline> = outline.iter().collect();
    ordered.sort_by_key(|o| (o.granule.order, o.molecule.order, o.molecule.id));

    let mut result = XpDistribution::default();
    let n = ordered.len() as u64;
    if n == 0 {
        return result;
    }
    let base = config.total_per_capsule / n;
    let rem = config.total_per_capsule % n;

    for (i, entry) in ordered.iter().enumerate() {
        let molecule_total = base + u64::from((i as u64) < rem);
        result.molecule_totals.push((entry.molecule.id, molecule_total));

        let mut atoms: Vec<&Atom> = entry.atoms.iter().collect();
        atoms.sort_by_key(|a| (a.order, a.id));
        let (bonus, core): (Vec<&Atom>, Vec<&Atom>) = atoms.into_iter().partition(|a| a.is_bonus);

        for (id, xp) in split_weighted(molecule_total, &core) {
            result.atom_xp.insert(id, xp);
        }
        for (atom, xp) in bonus.iter().zip(split_bonus(config.bonus_budget_per_molecule, bonus.len())) {
            result.atom_xp.insert(atom.id, xp);
        }
    }
    result
}

/// Distribution for a stored capsule
pub async fn for_capsule(store: &CozoStore, capsule_id: Id, config: &XpConfig) -> Result<XpDistribution> {
    let outline = store.capsule_outline(capsule_id).await?;
    Ok(distribute(&outline, config))
}

fn split_weighted(total: u64, core: &[&Atom]) -> Vec<(Id, u64)> {
    let weight_sum: u64 = core.iter().map(|a| weight(a.content_type)).sum();
    if weight_sum == 0 {
        return Vec::new();
    }
    let mut shares: Vec<(Id, u64)> = core
        .iter()
        .map(|a| (a.id, total * weight(a.content_type) / weight_sum))
        .collect();
    let mut left = total - shares.iter().map(|(_, xp)| xp).sum::<u64>();
    // floor loses less than one XP per atom, so a single pass suffices
    for share in shares.iter_mut() {
        if left == 0 {
            break;
        }
        share.1 += 1;
        left -= 1;
    }
    shares
}

fn split_bonus(budget: u64, count: usize) -> Vec<u64> {
    let count = count as u64;
    if count == 0 {
        return Vec::new();
    }
    if count > budget {
        return vec![1; count as usize];
    }
    let base = budget / count;
    let rem = budget % count;
    (0..count).map(|i| base + u64::from(i < rem)).collect()
}
