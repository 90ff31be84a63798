//! Killmail wire format
//!
//! Serde types for the feed's JSON documents. A killmail is treated as an
//! immutable value once fetched; the poller, the filter pipeline, and the
//! repository all borrow it read-only.

use serde::{Deserialize, Serialize};

/// One combat-event record as delivered by the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Killmail {
    pub killmail_id: u64,
    pub hash: String,
    #[serde(default)]
    pub sequence_id: u64,
    /// Upload time as unix seconds
    #[serde(default)]
    pub uploaded_at: i64,
    pub esi: Esi,
    pub zkb: Zkb,
}

/// ESI portion: the canonical killmail body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Esi {
    /// RFC3339 kill timestamp
    pub killmail_time: String,
    pub solar_system_id: i64,
    pub war_id: Option<i64>,
    pub moon_id: Option<i64>,
    pub victim: Victim,
    #[serde(default)]
    pub attackers: Vec<Attacker>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Victim {
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub faction_id: Option<i64>,
    pub ship_type_id: i64,
    #[serde(default)]
    pub damage_taken: i64,
    pub position: Option<Position>,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Dropped/destroyed item; containers carry nested items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub item_type_id: i64,
    #[serde(default)]
    pub flag: i64,
    #[serde(default)]
    pub quantity_destroyed: i64,
    #[serde(default)]
    pub quantity_dropped: i64,
    #[serde(default)]
    pub singleton: i64,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attacker {
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub faction_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub weapon_type_id: Option<i64>,
    #[serde(default)]
    pub damage_done: i64,
    #[serde(default)]
    pub final_blow: bool,
    #[serde(default)]
    pub security_status: f64,
}

/// zkillboard metadata block: derived flags, values, and labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zkb {
    #[serde(rename = "locationID")]
    pub location_id: Option<i64>,
    #[serde(rename = "fittedValue", default)]
    pub fitted_value: f64,
    #[serde(rename = "droppedValue", default)]
    pub dropped_value: f64,
    #[serde(rename = "destroyedValue", default)]
    pub destroyed_value: f64,
    #[serde(rename = "totalValue", default)]
    pub total_value: f64,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub npc: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub awox: bool,
    #[serde(default)]
    pub labels: Vec<String>,
    pub href: Option<String>,
}

impl Killmail {
    pub fn total_value(&self) -> f64 {
        self.zkb.total_value
    }

    pub fn labels(&self) -> &[String] {
        &self.zkb.labels
    }
}
