//! Error journal built from wrong answers.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::{AnswerLog, Id};

/// Payload keys tried, in order, for the kind of mistake.
const ERROR_TYPE_KEYS: [&str; 4] = ["error_type", "type", "category", "reason"];

/// Bucket for answers that carry no error kind.
pub const UNKNOWN_ERROR_TYPE: &str = "autre";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoleculeErrors {
    pub molecule_id: Id,
    pub molecule_title: String,
    pub total_errors: u32,
    pub error_types: BTreeMap<String, u32>,
    pub top_error_types: Vec<String>,
    pub last_error_at: DateTime<Utc>,
    pub suggested_action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorJournal {
    pub total_errors: u32,
    pub molecules: Vec<MoleculeErrors>,
    pub premium_suggestions: Vec<String>,
}

/// Kind of mistake recorded in an answer payload
pub fn error_type(payload: &Value) -> String {
    ERROR_TYPE_KEYS
        .iter()
        .filter_map(|k| payload.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| UNKNOWN_ERROR_TYPE.to_string())
}

/// Build the journal. `molecule_of` maps atom ids to `(molecule_id, title)`;
/// answers for unknown atoms are skipped.
pub fn build(
    answers: &[AnswerLog],
    molecule_of: &HashMap<Id, (Id, String)>,
    premium: bool,
) -> ErrorJournal {
    let mut by_molecule: BTreeMap<Id, (String, Vec<&AnswerLog>)> = BTreeMap::new();
    for answer in answers.iter().filter(|a| !a.is_correct) {
        if let Some((molecule_id, title)) = molecule_of.get(&answer.atom_id) {
            by_molecule
                .entry(*molecule_id)
                .or_insert_with(|| (title.clone(), Vec::new()))
                .1
                .push(answer);
        }
    }

    let mut overall: BTreeMap<String, u32> = BTreeMap::new();
    let mut journal = ErrorJournal::default();
    for (molecule_id, (title, wrong)) in by_molecule {
        let mut error_types: BTreeMap<String, u32> = BTreeMap::new();
        for answer in &wrong {
            let kind = error_type(&answer.submitted_payload);
            *overall.entry(kind.clone()).or_default() += 1;
            *error_types.entry(kind).or_default() += 1;
        }
        let top_error_types = ranked(&error_types).into_iter().take(3).collect::<Vec<_>>();
        let Some(last_error_at) = wrong.iter().map(|a| a.created_at).max() else {
            continue;
        };
        let total = wrong.len() as u32;
        journal.total_errors += total;
        journal.molecules.push(MoleculeErrors {
            molecule_id,
            suggested_action: suggestion(&title, top_error_types.first().map(String::as_str), total),
            molecule_title: title,
            total_errors: total,
            error_types,
            top_error_types,
            last_error_at,
        });
    }
    journal
        .molecules
        .sort_by(|a, b| b.total_errors.cmp(&a.total_errors).then(b.last_error_at.cmp(&a.last_error_at)));

    if premium && let Some(top) = ranked(&overall).first() {
        let count = overall.get(top).copied().unwrap_or(0);
        journal.premium_suggestions.push(format!(
            "Most of your mistakes ({count}) are of type '{top}'. Ask the coach for a focused drill on it."
        ));
        if let Some(worst) = journal.molecules.first() {
            journal.premium_suggestions.push(format!(
                "Replay '{}' before moving on; it holds {} of your errors.",
                worst.molecule_title, worst.total_errors
            ));
        }
    }
    journal
}

/// Keys by descending count, ties alphabetical
fn ranked(counts: &BTreeMap<String, u32>) -> Vec<String> {
    let mut keys: Vec<(&String, &u32)> = counts.iter().collect();
    keys.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    keys.into_iter().map(|(k, _)| k.clone()).collect()
}

fn suggestion(title: &str, top: Option<&str>, total: u32) -> String {
    match top {
        Some(kind) if kind != UNKNOWN_ERROR_TYPE && total >= 3 => {
            format!("Reset '{title}' and review the '{kind}' points before retrying.")
        }
        Some(kind) if kind != UNKNOWN_ERROR_TYPE => {
            format!("Review the '{kind}' points of '{title}'.")
        }
        _ if total >= 3 => format!("Reset '{title}' and work through it again."),
        _ => format!("Review '{title}' during your next session."),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn wrong(id: Id, atom_id: Id, payload: Value) -> AnswerLog {
        AnswerLog {
            id,
            user_id: 1,
            atom_id,
            is_correct: false,
            submitted_payload: payload,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_error_type_keys() {
        assert_eq!(error_type(&json!({"error_type": "Syntax"})), "syntax");
        assert_eq!(error_type(&json!({"reason": "timeout"})), "timeout");
        assert_eq!(error_type(&json!({"type": "", "category": "grammar"})), "grammar");
        assert_eq!(error_type(&json!({"answer": 3})), UNKNOWN_ERROR_TYPE);
        assert_eq!(error_type(&Value::Null), UNKNOWN_ERROR_TYPE);
    }

    #[test]
    fn test_journal_groups_by_molecule() {
        let molecules: HashMap<Id, (Id, String)> =
            [(1, (10, "Loops".to_string())), (2, (20, "Closures".to_string()))].into();
        let answers = vec![
            wrong(1, 1, json!({"error_type": "syntax"})),
            wrong(2, 1, json!({"error_type": "syntax"})),
            wrong(3, 1, json!({})),
            wrong(4, 2, json!({"type": "logic"})),
            wrong(5, 99, json!({})),
        ];
        let journal = build(&answers, &molecules, false);
        assert_eq!(journal.total_errors, 4);
        assert_eq!(journal.molecules[0].molecule_id, 10);
        assert_eq!(journal.molecules[0].top_error_types[0], "syntax");
        assert_eq!(journal.molecules[0].error_types[UNKNOWN_ERROR_TYPE], 1);
        assert!(journal.premium_suggestions.is_empty());

        let premium = build(&answers, &molecules, true);
        assert!(premium.premium_suggestions[0].contains("syntax"));
    }
}
