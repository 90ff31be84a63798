//! Level-1 classification filters
//!
//! Cheap checks against the zkb metadata block: boolean flags and the label
//! set. These run before any level-2 filter.

use super::KillmailFilter;
use crate::killmail::Killmail;

/// Filter on the `npc` flag (non-player-caused kill)
///
/// With `exclude = true` accepts only non-NPC kills; otherwise accepts only
/// NPC kills. Absent flag counts as false.
pub struct NpcFilter {
    exclude: bool,
}

impl NpcFilter {
    pub fn new(exclude: bool) -> Self {
        Self { exclude }
    }
}

impl KillmailFilter for NpcFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        let is_npc = killmail.zkb.npc;
        if self.exclude {
            !is_npc
        } else {
            is_npc
        }
    }
}

/// Filter on the `solo` flag (single-attacker kill)
pub struct SoloFilter {
    exclude: bool,
}

impl SoloFilter {
    pub fn new(exclude: bool) -> Self {
        Self { exclude }
    }
}

impl KillmailFilter for SoloFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        let is_solo = killmail.zkb.solo;
        if self.exclude {
            !is_solo
        } else {
            is_solo
        }
    }
}

/// Filter on the `awox` flag (friendly-fire kill)
pub struct AwoxFilter {
    exclude: bool,
}

impl AwoxFilter {
    pub fn new(exclude: bool) -> Self {
        Self { exclude }
    }
}

impl KillmailFilter for AwoxFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        let is_awox = killmail.zkb.awox;
        if self.exclude {
            !is_awox
        } else {
            is_awox
        }
    }
}

/// Security-zone allow list matched against `loc:` labels
///
/// Zone names are normalized at construction: an optional `loc:` prefix is
/// stripped and re-applied, so "lowsec" and "loc:lowsec" configure the same
/// zone. Accepts a killmail iff its label set intersects the allow list.
pub struct SecurityFilter {
    allow: Vec<String>,
}

impl SecurityFilter {
    pub fn new<S: AsRef<str>>(zones: &[S]) -> Self {
        let allow = zones
            .iter()
            .map(|z| {
                let zone = z.as_ref();
                format!("loc:{}", zone.strip_prefix("loc:").unwrap_or(zone))
            })
            .collect();
        Self { allow }
    }
}

impl KillmailFilter for SecurityFilter {
    fn accept(&self, killmail: &Killmail) -> bool {
        killmail
            .labels()
            .iter()
            .any(|label| self.allow.contains(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::killmail::Killmail;

    fn killmail_with_zkb(zkb: &str) -> Killmail {
        let json = format!(
            r#"{{
                "killmail_id": 1,
                "hash": "h",
                "esi": {{
                    "killmail_time": "2026-08-25T10:00:00Z",
                    "solar_system_id": 30000142,
                    "victim": {{"ship_type_id": 587}}
                }},
                "zkb": {}
            }}"#,
            zkb
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_npc_filter_exclude_mode() {
        let filter = NpcFilter::new(true);
        assert!(!filter.accept(&killmail_with_zkb(r#"{"npc": true}"#)));
        assert!(filter.accept(&killmail_with_zkb(r#"{"npc": false}"#)));
        // Absent flag counts as false
        assert!(filter.accept(&killmail_with_zkb("{}")));
    }

    #[test]
    fn test_npc_filter_include_mode() {
        let filter = NpcFilter::new(false);
        assert!(filter.accept(&killmail_with_zkb(r#"{"npc": true}"#)));
        assert!(!filter.accept(&killmail_with_zkb("{}")));
    }

    #[test]
    fn test_solo_filter() {
        assert!(SoloFilter::new(false).accept(&killmail_with_zkb(r#"{"solo": true}"#)));
        assert!(!SoloFilter::new(true).accept(&killmail_with_zkb(r#"{"solo": true}"#)));
    }

    #[test]
    fn test_awox_filter() {
        assert!(AwoxFilter::new(false).accept(&killmail_with_zkb(r#"{"awox": true}"#)));
        assert!(!AwoxFilter::new(true).accept(&killmail_with_zkb(r#"{"awox": true}"#)));
    }

    #[test]
    fn test_security_filter_zone_intersection() {
        let filter = SecurityFilter::new(&["nullsec", "lowsec"]);
        assert!(filter.accept(&killmail_with_zkb(r#"{"labels": ["cat:6", "loc:lowsec"]}"#)));
        assert!(!filter.accept(&killmail_with_zkb(r#"{"labels": ["loc:highsec"]}"#)));
        assert!(!filter.accept(&killmail_with_zkb(r#"{"labels": []}"#)));
    }

    #[test]
    fn test_security_filter_prefix_normalization() {
        // "loc:lowsec" and "lowsec" configure the same zone
        let filter = SecurityFilter::new(&["loc:lowsec"]);
        assert!(filter.accept(&killmail_with_zkb(r#"{"labels": ["loc:lowsec"]}"#)));
        assert!(!filter.accept(&killmail_with_zkb(r#"{"labels": ["lowsec"]}"#)));
    }
}
