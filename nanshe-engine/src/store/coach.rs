//! Coach threads, messages and energy wallets.

use chrono::{DateTime, Utc};
use cozo::DataValue;

use super::cozo::*;
use crate::types::{
    CoachContext, CoachMessage, CoachRole, CoachThread, EnergyWallet, Id, from_millis, to_millis,
};
use crate::Result;

impl CozoStore {
    /// The thread for `(user, context.location_key())`, if any
    pub async fn find_thread(&self, user_id: Id, context: &CoachContext) -> Result<Option<CoachThread>> {
        let rows = self
            .run_query(
                "?[id, context_json, created_at, updated_at] := \
                 *coach_threads{id, user_id, location_key, context_json, created_at, updated_at}, \
                 user_id = $user_id, location_key = $location_key",
                params([
                    ("user_id", DataValue::from(user_id)),
                    ("location_key", DataValue::from(context.location_key())),
                ]),
            )
            .await?;
        // (user, location_key) is unique, but keep the oldest if it ever is not
        let mut threads = rows
            .rows
            .iter()
            .map(|row| {
                Ok(CoachThread {
                    id: get_int(row, 0, "thread id")?,
                    user_id,
                    context: get_json(row, 1, "context_json")?,
                    location_key: context.location_key(),
                    created_at: get_time(row, 2, "created_at")?,
                    updated_at: get_time(row, 3, "updated_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        threads.sort_by_key(|t| t.id);
        Ok(threads.into_iter().next())
    }

    /// Resolve or create the thread for a location
    pub async fn get_or_create_thread(
        &self,
        user_id: Id,
        context: &CoachContext,
        at: DateTime<Utc>,
    ) -> Result<CoachThread> {
        if let Some(thread) = self.find_thread(user_id, context).await? {
            return Ok(thread);
        }
        let at = from_millis(to_millis(at));
        let thread = CoachThread {
            id: self.next_id().await?,
            user_id,
            context: *context,
            location_key: context.location_key(),
            created_at: at,
            updated_at: at,
        };
        self.put_thread(&thread).await?;
        Ok(thread)
    }

    pub async fn put_thread(&self, thread: &CoachThread) -> Result<()> {
        self.run_mutation(
            "?[id, user_id, location_key, context_json, created_at, updated_at] <- \
             [[$id, $user_id, $location_key, $context_json, $created_at, $updated_at]] \
             :put coach_threads {id => user_id, location_key, context_json, created_at, updated_at}",
            params([
                ("id", DataValue::from(thread.id)),
                ("user_id", DataValue::from(thread.user_id)),
                ("location_key", DataValue::from(thread.location_key.as_str())),
                ("context_json", DataValue::from(to_json(&thread.context)?)),
                ("created_at", time(thread.created_at)),
                ("updated_at", time(thread.updated_at)),
            ]),
        )
        .await?;
        Ok(())
    }

    pub async fn insert_coach_message(
        &self,
        thread_id: Id,
        role: CoachRole,
        content: &str,
        payload: Option<&serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Result<CoachMessage> {
        let payload_json = payload.map(to_json).transpose()?;
        let message = CoachMessage {
            id: self.next_id().await?,
            thread_id,
            role,
            content: content.to_string(),
            payload: payload.cloned(),
            created_at: from_millis(to_millis(at)),
        };
        self.run_mutation(
            "?[id, thread_id, role, content, payload_json, created_at] <- \
             [[$id, $thread_id, $role, $content, $payload_json, $created_at]] \
             :put coach_messages {id => thread_id, role, content, payload_json, created_at}",
            params([
                ("id", DataValue::from(message.id)),
                ("thread_id", DataValue::from(thread_id)),
                ("role", DataValue::from(role.as_str())),
                ("content", DataValue::from(content)),
                ("payload_json", opt_str(payload_json.as_deref())),
                ("created_at", time(message.created_at)),
            ]),
        )
        .await?;
        Ok(message)
    }

    /// Messages of a thread in conversation order
    pub async fn coach_messages(&self, thread_id: Id) -> Result<Vec<CoachMessage>> {
        let rows = self
            .run_query(
                "?[id, role, content, payload_json, created_at] := \
                 *coach_messages{id, thread_id, role, content, payload_json, created_at}, \
                 thread_id = $thread_id",
                params([("thread_id", DataValue::from(thread_id))]),
            )
            .await?;
        let mut messages = rows
            .rows
            .iter()
            .map(|row| {
                let payload = get_opt_string(row, 3)
                    .map(|text| serde_json::from_str(&text))
                    .transpose()?;
                Ok(CoachMessage {
                    id: get_int(row, 0, "message id")?,
                    thread_id,
                    role: get_string(row, 1, "role")?.parse()?,
                    content: get_string(row, 2, "content")?,
                    payload,
                    created_at: get_time(row, 4, "created_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }

    pub async fn get_energy(&self, user_id: Id) -> Result<Option<EnergyWallet>> {
        let rows = self
            .run_query(
                "?[current_energy, updated_at] := *coach_energy{user_id, current_energy, updated_at}, \
                 user_id = $user_id",
                params([("user_id", DataValue::from(user_id))]),
            )
            .await?;
        match rows.rows.first() {
            Some(row) => Ok(Some(EnergyWallet {
                user_id,
                current_energy: get_float(row, 0, "current_energy")?,
                updated_at: get_time(row, 1, "updated_at")?,
            })),
            None => Ok(None),
        }
    }

    pub async fn put_energy(&self, wallet: &EnergyWallet) -> Result<()> {
        self.run_mutation(
            "?[user_id, current_energy, updated_at] <- [[$user_id, $current_energy, $updated_at]] \
             :put coach_energy {user_id => current_energy, updated_at}",
            params([
                ("user_id", DataValue::from(wallet.user_id)),
                ("current_energy", DataValue::from(wallet.current_energy)),
                ("updated_at", time(wallet.updated_at)),
            ]),
        )
        .await?;
        Ok(())
    }
}
