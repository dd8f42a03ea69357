//! Classification feedback, golden plans and LLM usage records.

use chrono::{DateTime, Utc};
use cozo::DataValue;

use super::cozo::*;
use crate::types::{
    ClassificationFeedback, GoldenPlan, Id, LearningPlan, LlmUsage, TaxonomyLabel, UsageSummary,
    from_millis, to_millis,
};
use crate::Result;

/// Feedback fields before the row exists.
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub user_id: Option<Id>,
    pub input_text: String,
    pub predicted: Option<TaxonomyLabel>,
    pub final_label: TaxonomyLabel,
    pub is_correct: bool,
    pub notes: Option<String>,
    pub metadata: serde_json::Value,
}

/// Usage fields before the row exists.
#[derive(Debug, Clone)]
pub struct NewUsage {
    pub user_id: Id,
    pub feature: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

impl CozoStore {
    pub async fn insert_feedback(
        &self,
        new: NewFeedback,
        at: DateTime<Utc>,
    ) -> Result<ClassificationFeedback> {
        let feedback = ClassificationFeedback {
            id: self.next_id().await?,
            user_id: new.user_id,
            input_text: new.input_text,
            predicted: new.predicted,
            final_label: new.final_label,
            is_correct: new.is_correct,
            notes: new.notes,
            metadata: new.metadata,
            created_at: from_millis(to_millis(at)),
        };
        self.put_feedback(&feedback).await?;
        Ok(feedback)
    }

    pub async fn put_feedback(&self, feedback: &ClassificationFeedback) -> Result<()> {
        let predicted_json = feedback.predicted.as_ref().map(to_json).transpose()?;
        self.run_mutation(
            "?[id, user_id, input_text, predicted_json, final_domain, final_area, final_skill, \
             is_correct, notes, metadata_json, created_at] <- [[$id, $user_id, $input_text, \
             $predicted_json, $final_domain, $final_area, $final_skill, $is_correct, $notes, \
             $metadata_json, $created_at]] \
             :put classification_feedback {id => user_id, input_text, predicted_json, final_domain, \
             final_area, final_skill, is_correct, notes, metadata_json, created_at}",
            params([
                ("id", DataValue::from(feedback.id)),
                ("user_id", opt_int(feedback.user_id)),
                ("input_text", DataValue::from(feedback.input_text.as_str())),
                ("predicted_json", opt_str(predicted_json.as_deref())),
                ("final_domain", DataValue::from(feedback.final_label.domain.as_str())),
                ("final_area", DataValue::from(feedback.final_label.area.as_str())),
                ("final_skill", DataValue::from(feedback.final_label.skill.as_str())),
                ("is_correct", DataValue::from(feedback.is_correct)),
                ("notes", opt_str(feedback.notes.as_deref())),
                ("metadata_json", DataValue::from(to_json(&feedback.metadata)?)),
                ("created_at", time(feedback.created_at)),
            ]),
        )
        .await?;
        Ok(())
    }

    /// All feedback records, oldest first
    pub async fn list_feedback(&self) -> Result<Vec<ClassificationFeedback>> {
        let rows = self
            .run_query(
                "?[id, user_id, input_text, predicted_json, final_domain, final_area, final_skill, \
                 is_correct, notes, metadata_json, created_at] := *classification_feedback{id, \
                 user_id, input_text, predicted_json, final_domain, final_area, final_skill, \
                 is_correct, notes, metadata_json, created_at}",
                Default::default(),
            )
            .await?;
        let mut records = rows
            .rows
            .iter()
            .map(|row| {
                let predicted = get_opt_string(row, 3)
                    .map(|text| serde_json::from_str(&text))
                    .transpose()?;
                Ok(ClassificationFeedback {
                    id: get_int(row, 0, "feedback id")?,
                    user_id: get_opt_int(row, 1),
                    input_text: get_string(row, 2, "input_text")?,
                    predicted,
                    final_label: TaxonomyLabel {
                        domain: get_string(row, 4, "final_domain")?,
                        area: get_string(row, 5, "final_area")?,
                        skill: get_string(row, 6, "final_skill")?,
                    },
                    is_correct: get_bool(row, 7, "is_correct")?,
                    notes: get_opt_string(row, 8),
                    metadata: get_json(row, 9, "metadata_json")?,
                    created_at: get_time(row, 10, "created_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    // --- golden plans ---

    pub async fn save_golden_plan(
        &self,
        domain: &str,
        area: &str,
        main_skill: &str,
        plan: &LearningPlan,
    ) -> Result<GoldenPlan> {
        let golden = GoldenPlan {
            id: self.next_id().await?,
            domain: domain.to_string(),
            area: area.to_string(),
            main_skill: main_skill.to_string(),
            plan: plan.clone(),
            created_at: from_millis(to_millis(Utc::now())),
        };
        self.run_mutation(
            "?[id, domain, area, main_skill, plan_json, created_at] <- \
             [[$id, $domain, $area, $main_skill, $plan_json, $created_at]] \
             :put golden_plans {id => domain, area, main_skill, plan_json, created_at}",
            params([
                ("id", DataValue::from(golden.id)),
                ("domain", DataValue::from(domain)),
                ("area", DataValue::from(area)),
                ("main_skill", DataValue::from(main_skill)),
                ("plan_json", DataValue::from(to_json(plan)?)),
                ("created_at", time(golden.created_at)),
            ]),
        )
        .await?;
        Ok(golden)
    }

    /// Up to `limit` golden plans for a `(domain, area)`, oldest first
    pub async fn golden_plans(&self, domain: &str, area: &str, limit: usize) -> Result<Vec<GoldenPlan>> {
        let rows = self
            .run_query(
                "?[id, main_skill, plan_json, created_at] := \
                 *golden_plans{id, domain, area, main_skill, plan_json, created_at}, \
                 domain = $domain, area = $area",
                params([
                    ("domain", DataValue::from(domain)),
                    ("area", DataValue::from(area)),
                ]),
            )
            .await?;
        let mut plans = rows
            .rows
            .iter()
            .map(|row| {
                Ok(GoldenPlan {
                    id: get_int(row, 0, "golden plan id")?,
                    domain: domain.to_string(),
                    area: area.to_string(),
                    main_skill: get_string(row, 1, "main_skill")?,
                    plan: get_json(row, 2, "plan_json")?,
                    created_at: get_time(row, 3, "created_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        plans.sort_by_key(|p| p.id);
        plans.truncate(limit);
        Ok(plans)
    }

    // --- LLM usage ---

    pub async fn insert_usage(&self, new: NewUsage, at: DateTime<Utc>) -> Result<LlmUsage> {
        let usage = LlmUsage {
            id: self.next_id().await?,
            user_id: new.user_id,
            feature: new.feature,
            model: new.model,
            prompt_tokens: new.prompt_tokens,
            completion_tokens: new.completion_tokens,
            cost_usd: new.cost_usd,
            created_at: from_millis(to_millis(at)),
        };
        self.run_mutation(
            "?[id, user_id, feature, model, prompt_tokens, completion_tokens, cost_usd, created_at] <- \
             [[$id, $user_id, $feature, $model, $prompt_tokens, $completion_tokens, $cost_usd, $created_at]] \
             :put llm_usage {id => user_id, feature, model, prompt_tokens, completion_tokens, cost_usd, created_at}",
            params([
                ("id", DataValue::from(usage.id)),
                ("user_id", DataValue::from(usage.user_id)),
                ("feature", DataValue::from(usage.feature.as_str())),
                ("model", DataValue::from(usage.model.as_str())),
                ("prompt_tokens", DataValue::from(usage.prompt_tokens as i64)),
                ("completion_tokens", DataValue::from(usage.completion_tokens as i64)),
                ("cost_usd", DataValue::from(usage.cost_usd)),
                ("created_at", time(usage.created_at)),
            ]),
        )
        .await?;
        Ok(usage)
    }

    /// Usage records of a user, oldest first
    pub async fn usage_for_user(&self, user_id: Id) -> Result<Vec<LlmUsage>> {
        let rows = self
            .run_query(
                "?[id, feature, model, prompt_tokens, completion_tokens, cost_usd, created_at] := \
                 *llm_usage{id, user_id, feature, model, prompt_tokens, completion_tokens, cost_usd, created_at}, \
                 user_id = $user_id",
                params([("user_id", DataValue::from(user_id))]),
            )
            .await?;
        let mut records = rows
            .rows
            .iter()
            .map(|row| {
                Ok(LlmUsage {
                    id: get_int(row, 0, "usage id")?,
                    user_id,
                    feature: get_string(row, 1, "feature")?,
                    model: get_string(row, 2, "model")?,
                    prompt_tokens: get_int(row, 3, "prompt_tokens")?.max(0) as u64,
                    completion_tokens: get_int(row, 4, "completion_tokens")?.max(0) as u64,
                    cost_usd: get_float(row, 5, "cost_usd")?,
                    created_at: get_time(row, 6, "created_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    /// Totals over a user's usage records
    pub async fn usage_summary(&self, user_id: Id) -> Result<UsageSummary> {
        Ok(self
            .usage_for_user(user_id)
            .await?
            .iter()
            .fold(UsageSummary::default(), |mut sum, u| {
                sum.calls += 1;
                sum.prompt_tokens += u.prompt_tokens;
                sum.completion_tokens += u.completion_tokens;
                sum.cost_usd += u.cost_usd;
                sum
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label(domain: &str, area: &str, skill: &str) -> TaxonomyLabel {
        TaxonomyLabel {
            domain: domain.into(),
            area: area.into(),
            skill: skill.into(),
        }
    }

    #[tokio::test]
    async fn test_feedback_roundtrip() {
        let store = CozoStore::open_mem().await.unwrap();
        let saved = store
            .insert_feedback(
                NewFeedback {
                    user_id: Some(1),
                    input_text: "apprendre le japonais".into(),
                    predicted: Some(label("languages", "european", "spanish")),
                    final_label: label("languages", "asian", "japanese"),
                    is_correct: false,
                    notes: None,
                    metadata: json!({}),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let all = store.list_feedback().await.unwrap();
        assert_eq!(all, vec![saved]);
    }

    #[tokio::test]
    async fn test_golden_plans_by_domain_area() {
        let store = CozoStore::open_mem().await.unwrap();
        let plan = LearningPlan::from_value(json!({
            "overview": "o",
            "levels": [{"level_title": "L", "chapters": []}]
        }))
        .unwrap();
        for skill in ["japanese", "korean", "chinese", "thai"] {
            store.save_golden_plan("languages", "asian", skill, &plan).await.unwrap();
        }
        store.save_golden_plan("science", "math", "algebra", &plan).await.unwrap();

        let plans = store.golden_plans("languages", "asian", 3).await.unwrap();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].main_skill, "japanese");
        assert!(store.golden_plans("arts", "music", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_usage_summary() {
        let store = CozoStore::open_mem().await.unwrap();
        for (p, c) in [(100, 50), (10, 5)] {
            store
                .insert_usage(
                    NewUsage {
                        user_id: 7,
                        feature: "atom.quiz".into(),
                        model: "gpt-4o-mini".into(),
                        prompt_tokens: p,
                        completion_tokens: c,
                        cost_usd: 0.5,
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
        }
        let summary = store.usage_summary(7).await.unwrap();
        assert_eq!(summary.calls, 2);
        assert_eq!(summary.prompt_tokens, 110);
        assert_eq!(summary.completion_tokens, 55);
        assert!((summary.cost_usd - 1.0).abs() < 1e-9);
        assert_eq!(store.usage_summary(8).await.unwrap(), UsageSummary::default());
    }
}
