//! Users and enrollments.

use chrono::{DateTime, Utc};
use cozo::DataValue;

use super::cozo::*;
use crate::types::{Enrollment, Id, User, from_millis, to_millis};
use crate::{EngineError, Result};

const USER_COLUMNS: &str = "id, email, tier, is_superuser, xp, created_at, last_login_at";

impl CozoStore {
    /// Insert or replace a user row
    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        let query = format!(
            "?[{USER_COLUMNS}] <- [[$id, $email, $tier, $is_superuser, $xp, $created_at, $last_login_at]] \
             :put users {{id => email, tier, is_superuser, xp, created_at, last_login_at}}"
        );
        self.run_mutation(
            &query,
            params([
                ("id", DataValue::from(user.id)),
                ("email", DataValue::from(user.email.as_str())),
                ("tier", DataValue::from(user.tier.as_str())),
                ("is_superuser", DataValue::from(user.is_superuser)),
                ("xp", DataValue::from(user.xp as i64)),
                ("created_at", time(user.created_at)),
                ("last_login_at", opt_time(user.last_login_at)),
            ]),
        )
        .await?;
        Ok(())
    }

    pub async fn get_user(&self, id: Id) -> Result<Option<User>> {
        let query = format!("?[{USER_COLUMNS}] := *users{{{USER_COLUMNS}}}, id = $id");
        let rows = self.run_query(&query, params([("id", DataValue::from(id))])).await?;
        rows.rows.first().map(|row| parse_user_row(row)).transpose()
    }

    /// Like [`get_user`](Self::get_user), but a missing user is an error
    pub async fn require_user(&self, id: Id) -> Result<User> {
        self.get_user(id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", id))
    }

    /// Add to the user's global XP counter
    pub async fn add_user_xp(&self, id: Id, amount: u64) -> Result<()> {
        let mut user = self.require_user(id).await?;
        user.xp = user.xp.saturating_add(amount);
        self.upsert_user(&user).await
    }

    pub async fn touch_login(&self, id: Id, at: DateTime<Utc>) -> Result<()> {
        let mut user = self.require_user(id).await?;
        user.last_login_at = Some(at);
        self.upsert_user(&user).await
    }

    /// Link a user to a capsule; enrolling twice keeps the first date
    pub async fn enroll(&self, user_id: Id, capsule_id: Id, at: DateTime<Utc>) -> Result<Enrollment> {
        if let Some(existing) = self.get_enrollment(user_id, capsule_id).await? {
            return Ok(existing);
        }
        self.run_mutation(
            "?[user_id, capsule_id, enrolled_at] <- [[$user_id, $capsule_id, $enrolled_at]] \
             :put enrollments {user_id, capsule_id => enrolled_at}",
            params([
                ("user_id", DataValue::from(user_id)),
                ("capsule_id", DataValue::from(capsule_id)),
                ("enrolled_at", time(at)),
            ]),
        )
        .await?;
        Ok(Enrollment {
            user_id,
            capsule_id,
            enrolled_at: from_millis(to_millis(at)),
        })
    }

    pub async fn get_enrollment(&self, user_id: Id, capsule_id: Id) -> Result<Option<Enrollment>> {
        let rows = self
            .run_query(
                "?[enrolled_at] := *enrollments{user_id, capsule_id, enrolled_at}, \
                 user_id = $user_id, capsule_id = $capsule_id",
                params([
                    ("user_id", DataValue::from(user_id)),
                    ("capsule_id", DataValue::from(capsule_id)),
                ]),
            )
            .await?;
        match rows.rows.first() {
            Some(row) => Ok(Some(Enrollment {
                user_id,
                capsule_id,
                enrolled_at: get_time(row, 0, "enrolled_at")?,
            })),
            None => Ok(None),
        }
    }

    /// Capsule ids the user is enrolled in
    pub async fn enrolled_capsules(&self, user_id: Id) -> Result<Vec<Id>> {
        let rows = self
            .run_query(
                "?[capsule_id] := *enrollments{user_id, capsule_id}, user_id = $user_id",
                params([("user_id", DataValue::from(user_id))]),
            )
            .await?;
        rows.rows
            .iter()
            .map(|row| get_int(row, 0, "capsule_id"))
            .collect()
    }

    /// Delete a user, the capsules they created and every row they own.
    ///
    /// Classification feedback is kept for training with the author cleared.
    pub async fn delete_user(&self, id: Id) -> Result<()> {
        self.require_user(id).await?;
        for capsule_id in self.capsules_created_by(id).await? {
            self.delete_capsule(capsule_id).await?;
        }
        let script = r#"
        {
            ?[user_id, capsule_id] := *enrollments{user_id, capsule_id}, user_id = $user_id
            :rm enrollments {user_id, capsule_id}
        }
        {
            ?[user_id, capsule_id] := *capsule_progress{user_id, capsule_id}, user_id = $user_id
            :rm capsule_progress {user_id, capsule_id}
        }
        {
            ?[user_id, atom_id] := *atom_progress{user_id, atom_id}, user_id = $user_id
            :rm atom_progress {user_id, atom_id}
        }
        {
            ?[user_id, molecule_id] := *molecule_reviews{user_id, molecule_id}, user_id = $user_id
            :rm molecule_reviews {user_id, molecule_id}
        }
        {
            ?[id] := *answer_logs{id, user_id}, user_id = $user_id
            :rm answer_logs {id}
        }
        {
            ?[id] := *activity_logs{id, user_id}, user_id = $user_id
            :rm activity_logs {id}
        }
        {
            ?[id] := *coach_threads{id: t, user_id}, user_id = $user_id, *coach_messages{id, thread_id: t}
            :rm coach_messages {id}
        }
        {
            ?[id] := *coach_threads{id, user_id}, user_id = $user_id
            :rm coach_threads {id}
        }
        {
            ?[user_id] <- [[$user_id]]
            :rm coach_energy {user_id}
        }
        {
            ?[id] := *llm_usage{id, user_id}, user_id = $user_id
            :rm llm_usage {id}
        }
        {
            ?[id, user_id] := *classification_feedback{id, user_id: author}, author == $user_id,
                              user_id = null
            :update classification_feedback {id => user_id}
        }
        {
            ?[id] <- [[$user_id]]
            :rm users {id}
        }
        "#;
        self.run_mutation(script, params([("user_id", DataValue::from(id))]))
            .await?;
        Ok(())
    }
}

fn parse_user_row(row: &[DataValue]) -> Result<User> {
    Ok(User {
        id: get_int(row, 0, "user id")?,
        email: get_string(row, 1, "email")?,
        tier: get_string(row, 2, "tier")?.parse()?,
        is_superuser: get_bool(row, 3, "is_superuser")?,
        xp: get_int(row, 4, "xp")?.max(0) as u64,
        created_at: get_time(row, 5, "created_at")?,
        last_login_at: get_opt_time(row, 6),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionTier;

    #[tokio::test]
    async fn test_user_roundtrip_and_xp() {
        let store = CozoStore::open_mem().await.unwrap();
        let user = User::new(1, "a@example.com").with_tier(SubscriptionTier::Premium);
        store.upsert_user(&user).await.unwrap();

        store.add_user_xp(1, 40).await.unwrap();
        let loaded = store.get_user(1).await.unwrap().unwrap();
        assert_eq!(loaded.xp, 40);
        assert!(loaded.is_premium());
        assert!(store.get_user(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enroll_is_idempotent() {
        let store = CozoStore::open_mem().await.unwrap();
        let first = store.enroll(1, 10, Utc::now()).await.unwrap();
        let second = store.enroll(1, 10, Utc::now()).await.unwrap();
        assert_eq!(first.enrolled_at, second.enrolled_at);
        assert_eq!(store.enrolled_capsules(1).await.unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_delete_user_removes_owned_rows() {
        let store = CozoStore::open_mem().await.unwrap();
        store.upsert_user(&User::new(1, "gone@example.com")).await.unwrap();
        store.upsert_user(&User::new(2, "stays@example.com")).await.unwrap();
        store.enroll(1, 10, Utc::now()).await.unwrap();
        store.enroll(2, 10, Utc::now()).await.unwrap();
        store
            .insert_answer(1, 100, true, &serde_json::json!({}), Utc::now())
            .await
            .unwrap();
        store.insert_activity(1, Some(10), Utc::now(), None).await.unwrap();

        store.delete_user(1).await.unwrap();
        assert!(store.get_user(1).await.unwrap().is_none());
        assert!(store.enrolled_capsules(1).await.unwrap().is_empty());
        assert!(store.answers_for_user(1).await.unwrap().is_empty());
        assert!(store.activities_for_user(1).await.unwrap().is_empty());
        assert_eq!(store.enrolled_capsules(2).await.unwrap(), vec![10]);

        let err = store.delete_user(1).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "user", .. }));
    }

    #[tokio::test]
    async fn test_require_missing_user() {
        let store = CozoStore::open_mem().await.unwrap();
        let err = store.require_user(9).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "user", .. }));
    }
}
