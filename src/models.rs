//! Response models for the read API
//!
//! Flat row shapes the repository maps SQLite rows into, serialized as-is
//! by the API handlers.

use serde::{Deserialize, Serialize};

/// One row of the kill listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillmailSummary {
    pub killmail_id: i64,
    pub killmail_time: String,
    pub solar_system_id: i64,
    pub victim_ship_type_id: i64,
    pub victim_character_id: Option<i64>,
    pub victim_corporation_id: Option<i64>,
    pub victim_alliance_id: Option<i64>,
    pub zkb_total_value: f64,
    pub zkb_is_npc: bool,
    pub zkb_is_solo: bool,
    pub zkb_is_awox: bool,
    pub zkb_attacker_count: i64,
}

/// Full killmail row with nested attackers and item tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillmailDetail {
    #[serde(flatten)]
    pub summary: KillmailSummary,
    pub hash: String,
    pub sequence_id: i64,
    pub war_id: Option<i64>,
    pub moon_id: Option<i64>,
    pub victim_faction_id: Option<i64>,
    pub victim_damage_taken: i64,
    pub victim_pos_x: Option<f64>,
    pub victim_pos_y: Option<f64>,
    pub victim_pos_z: Option<f64>,
    pub zkb_location_id: Option<i64>,
    pub zkb_fitted_value: f64,
    pub zkb_dropped_value: f64,
    pub zkb_destroyed_value: f64,
    pub zkb_points: i64,
    pub zkb_labels: Vec<String>,
    pub zkb_href: Option<String>,
    pub uploaded_at: String,
    pub created_at: String,
    pub attackers: Vec<AttackerResponse>,
    pub items: Vec<ItemResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackerResponse {
    pub id: i64,
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub faction_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub weapon_type_id: Option<i64>,
    pub damage_done: i64,
    pub final_blow: bool,
    pub security_status: f64,
}

/// Item row reassembled into its container tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse {
    pub id: i64,
    pub item_type_id: i64,
    pub flag: i64,
    pub quantity_destroyed: i64,
    pub quantity_dropped: i64,
    pub singleton: i64,
    #[serde(default)]
    pub items: Vec<ItemResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillmailListResponse {
    pub total: i64,
    pub kills: Vec<KillmailSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipCount {
    pub ship_type_id: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCount {
    pub solar_system_id: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_kills: i64,
    pub total_value: f64,
    pub kills_npc: i64,
    pub kills_solo: i64,
    pub kills_awox: i64,
    pub top_ships: Vec<ShipCount>,
    pub top_solar_systems: Vec<SystemCount>,
}
