//! Level-2 value and entity filters
//!
//! Threshold checks on the declared ISK value and id-set membership checks
//! against the victim, the attackers, or the label set. Costlier than level
//! 1, so the pipeline only reaches these once every level-1 filter passed.

use super::{FilterMode, KillmailFilter};
use crate::killmail::Killmail;
use std::collections::HashSet;

/// Accepts killmails with total value >= threshold (boundary inclusive)
pub struct MinValueFilter {
    min_value: f64,
}

impl MinValueFilter {
    pub fn new(min_value: f64) -> Self {
        Self { min_value }
    }
}

impl KillmailFilter for MinValueFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        killmail.total_value() >= self.min_value
    }
}

/// Accepts killmails with total value <= threshold (boundary inclusive)
pub struct MaxValueFilter {
    max_value: f64,
}

impl MaxValueFilter {
    pub fn new(max_value: f64) -> Self {
        Self { max_value }
    }
}

impl KillmailFilter for MaxValueFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        killmail.total_value() <= self.max_value
    }
}

/// Matches the victim's ship type against a set of type ids
pub struct ShipTypeFilter {
    type_ids: HashSet<i64>,
    mode: FilterMode,
}

impl ShipTypeFilter {
    pub fn new(type_ids: &[i64], mode: FilterMode) -> Self {
        Self {
            type_ids: type_ids.iter().copied().collect(),
            mode,
        }
    }
}

impl KillmailFilter for ShipTypeFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        let matched = self.type_ids.contains(&killmail.esi.victim.ship_type_id);
        self.mode.apply(matched)
    }
}

/// Matches victim or any attacker character id
pub struct CharacterFilter {
    character_ids: HashSet<i64>,
    mode: FilterMode,
}

impl CharacterFilter {
    pub fn new(character_ids: &[i64], mode: FilterMode) -> Self {
        Self {
            character_ids: character_ids.iter().copied().collect(),
            mode,
        }
    }

    fn matches_any(&self, killmail: &Killmail) -> bool {
        let esi = &killmail.esi;
        if esi
            .victim
            .character_id
            .is_some_and(|id| self.character_ids.contains(&id))
        {
            return true;
        }
        esi.attackers
            .iter()
            .any(|a| a.character_id.is_some_and(|id| self.character_ids.contains(&id)))
    }
}

impl KillmailFilter for CharacterFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        self.mode.apply(self.matches_any(killmail))
    }
}

/// Matches victim or any attacker corporation id
pub struct CorporationFilter {
    corporation_ids: HashSet<i64>,
    mode: FilterMode,
}

impl CorporationFilter {
    pub fn new(corporation_ids: &[i64], mode: FilterMode) -> Self {
        Self {
            corporation_ids: corporation_ids.iter().copied().collect(),
            mode,
        }
    }

    fn matches_any(&self, killmail: &Killmail) -> bool {
        let esi = &killmail.esi;
        if esi
            .victim
            .corporation_id
            .is_some_and(|id| self.corporation_ids.contains(&id))
        {
            return true;
        }
        esi.attackers
            .iter()
            .any(|a| a.corporation_id.is_some_and(|id| self.corporation_ids.contains(&id)))
    }
}

impl KillmailFilter for CorporationFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        self.mode.apply(self.matches_any(killmail))
    }
}

/// Matches victim or any attacker alliance id
pub struct AllianceFilter {
    alliance_ids: HashSet<i64>,
    mode: FilterMode,
}

impl AllianceFilter {
    pub fn new(alliance_ids: &[i64], mode: FilterMode) -> Self {
        Self {
            alliance_ids: alliance_ids.iter().copied().collect(),
            mode,
        }
    }

    fn matches_any(&self, killmail: &Killmail) -> bool {
        let esi = &killmail.esi;
        if esi
            .victim
            .alliance_id
            .is_some_and(|id| self.alliance_ids.contains(&id))
        {
            return true;
        }
        esi.attackers
            .iter()
            .any(|a| a.alliance_id.is_some_and(|id| self.alliance_ids.contains(&id)))
    }
}

impl KillmailFilter for AllianceFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        self.mode.apply(self.matches_any(killmail))
    }
}

/// Matches the solar system the kill happened in
pub struct SolarSystemFilter {
    system_ids: HashSet<i64>,
    mode: FilterMode,
}

impl SolarSystemFilter {
    pub fn new(system_ids: &[i64], mode: FilterMode) -> Self {
        Self {
            system_ids: system_ids.iter().copied().collect(),
            mode,
        }
    }
}

impl KillmailFilter for SolarSystemFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        let matched = self.system_ids.contains(&killmail.esi.solar_system_id);
        self.mode.apply(matched)
    }
}

/// Matches the region via `reg:<id>` labels.
///
/// The feed does not carry a region id field; zkillboard encodes it in the
/// label set instead.
pub struct RegionFilter {
    region_labels: HashSet<String>,
    mode: FilterMode,
}

impl RegionFilter {
    pub fn new(region_ids: &[i64], mode: FilterMode) -> Self {
        Self {
            region_labels: region_ids.iter().map(|id| format!("reg:{}", id)).collect(),
            mode,
        }
    }
}

impl KillmailFilter for RegionFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        let matched = killmail
            .labels()
            .iter()
            .any(|label| self.region_labels.contains(label));
        self.mode.apply(matched)
    }
}
