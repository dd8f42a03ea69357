//! Learning plans: the JSON blueprint a capsule is materialized from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root of a plan: `{overview, levels: [...]}`.
///
/// Unknown keys are kept so a cached plan is returned exactly as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPlan {
    pub overview: Value,
    pub levels: Vec<PlanLevel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One level of a plan, materialized as a granule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLevel {
    pub level_title: String,
    #[serde(default)]
    pub chapters: Vec<PlanChapter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One chapter of a level, materialized as a molecule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanChapter {
    pub chapter_title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlanChapter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            chapter_title: title.into(),
            extra: Map::new(),
        }
    }

    /// String field carried next to the title (`chapter_summary`, ...).
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

impl LearningPlan {
    /// Parse a JSON value; `None` unless it has an overview and at least
    /// one titled level.
    pub fn from_value(value: Value) -> Option<Self> {
        let plan: LearningPlan = serde_json::from_value(value).ok()?;
        if plan.levels.is_empty() || plan.overview.is_null() {
            return None;
        }
        Some(plan)
    }

    /// Parse JSON text, as stored in a vector entry.
    pub fn from_json_str(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        Self::from_value(value)
    }

    /// Chapter at a 1-based position.
    pub fn chapter(&self, granule_order: u32, molecule_order: u32) -> Option<(&PlanLevel, &PlanChapter)> {
        let level = self.levels.get(granule_order.checked_sub(1)? as usize)?;
        let chapter = level.chapters.get(molecule_order.checked_sub(1)? as usize)?;
        Some((level, chapter))
    }

    pub fn chapter_count(&self) -> usize {
        self.levels.iter().map(|l| l.chapters.len()).sum()
    }

    /// 0-based index of a chapter across all levels.
    pub fn flat_index(&self, granule_order: u32, molecule_order: u32) -> Option<usize> {
        self.chapter(granule_order, molecule_order)?;
        let before: usize = self
            .levels
            .iter()
            .take(granule_order as usize - 1)
            .map(|l| l.chapters.len())
            .sum();
        Some(before + molecule_order as usize - 1)
    }

    /// Every (granule_order, molecule_order) pair in plan order.
    pub fn positions(&self) -> Vec<(u32, u32)> {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(gi, level)| {
                (0..level.chapters.len()).map(move |mi| (gi as u32 + 1, mi as u32 + 1))
            })
            .collect()
    }

    /// Overview as plain text.
    pub fn overview_text(&self) -> String {
        match &self.overview {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "overview": "Japanese from scratch",
            "levels": [
                {"level_title": "Kana", "chapters": [
                    {"chapter_title": "Hiragana", "duration": 3},
                    {"chapter_title": "Katakana"}
                ]},
                {"level_title": "Basics", "chapters": [{"chapter_title": "Greetings"}]}
            ],
            "audience": "beginners"
        })
    }

    #[test]
    fn test_from_value_keeps_unknown_keys() {
        let value = sample();
        let plan = LearningPlan::from_value(value.clone()).unwrap();
        assert_eq!(plan.to_value(), value);
        assert_eq!(plan.levels[0].chapters[0].extra["duration"], 3);
    }

    #[test]
    fn test_from_value_rejects_non_plans() {
        assert!(LearningPlan::from_value(json!({"levels": []})).is_none());
        assert!(LearningPlan::from_value(json!({"overview": "x", "levels": []})).is_none());
        assert!(LearningPlan::from_json_str("not json").is_none());
    }

    #[test]
    fn test_chapter_lookup_is_one_based() {
        let plan = LearningPlan::from_value(sample()).unwrap();
        let (level, chapter) = plan.chapter(1, 2).unwrap();
        assert_eq!(level.level_title, "Kana");
        assert_eq!(chapter.chapter_title, "Katakana");
        assert!(plan.chapter(0, 1).is_none());
        assert!(plan.chapter(2, 2).is_none());
        assert!(plan.chapter(3, 1).is_none());
    }

    #[test]
    fn test_flat_index_and_positions() {
        let plan = LearningPlan::from_value(sample()).unwrap();
        assert_eq!(plan.chapter_count(), 3);
        assert_eq!(plan.flat_index(2, 1), Some(2));
        assert_eq!(plan.positions(), vec![(1, 1), (1, 2), (2, 1)]);
    }
}
