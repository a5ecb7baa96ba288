//! Fire-and-forget kill records

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::supabase::SupabaseClient;

/// Table the kill rows are inserted into
pub const KILLS_TABLE: &str = "kills";

/// Postgres function adding kill/death deltas to `player_stats`, inserting the row if missing
pub const STATS_FUNCTION: &str = "record_player_stats";

/// One player knocking out another
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KillRecord {
    pub id: Uuid,
    pub attacker_id: String,
    pub attacker_name: String,
    pub victim_id: String,
    pub victim_name: String,
    pub shot_id: String,
    pub created_at: DateTime<Utc>,
}

impl KillRecord {
    pub fn new(
        attacker_id: impl Into<String>,
        attacker_name: impl Into<String>,
        victim_id: impl Into<String>,
        victim_name: impl Into<String>,
        shot_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            attacker_id: attacker_id.into(),
            attacker_name: attacker_name.into(),
            victim_id: victim_id.into(),
            victim_name: victim_name.into(),
            shot_id: shot_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Counter bumps for the attacker and the victim
    pub fn stat_deltas(&self) -> [StatsDelta; 2] {
        [
            StatsDelta {
                player_id: self.attacker_id.clone(),
                player_name: self.attacker_name.clone(),
                kills: 1,
                deaths: 0,
                last_seen: self.created_at,
            },
            StatsDelta {
                player_id: self.victim_id.clone(),
                player_name: self.victim_name.clone(),
                kills: 0,
                deaths: 1,
                last_seen: self.created_at,
            },
        ]
    }
}

/// Arguments of `record_player_stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsDelta {
    pub player_id: String,
    pub player_name: String,
    pub kills: u32,
    pub deaths: u32,
    pub last_seen: DateTime<Utc>,
}

/// Receiver of kill records. Implementations must not block the caller.
pub trait KillSink: Send + Sync {
    fn record(&self, record: KillRecord);
}

/// Writes kill records to Supabase from a detached task
#[derive(Clone)]
pub struct KillStore {
    client: SupabaseClient,
}

impl KillStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

impl KillSink for KillStore {
    fn record(&self, record: KillRecord) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.insert(KILLS_TABLE, &record).await {
                warn!(
                    shot_id = %record.shot_id,
                    attacker_id = %record.attacker_id,
                    error = %e,
                    "Failed to store kill record"
                );
                return;
            }
            for delta in record.stat_deltas() {
                if let Err(e) = client.rpc(STATS_FUNCTION, &delta).await {
                    warn!(player_id = %delta.player_id, error = %e, "Failed to update player stats");
                }
            }
        });
    }
}

/// Used when no database is configured; kills only show up in the log
pub struct LoggedKills;

impl KillSink for LoggedKills {
    fn record(&self, record: KillRecord) {
        info!(
            attacker = %record.attacker_name,
            victim = %record.victim_name,
            shot_id = %record.shot_id,
            "Kill"
        );
    }
}
