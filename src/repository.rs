//! Killmail record store and query service over SQLite
//!
//! Write path (poller): idempotent insert-or-skip of the denormalized
//! killmail row plus attacker and item child rows. The `INSERT OR IGNORE`
//! on the primary key is the concurrency boundary; replaying a sequence is
//! harmless.
//!
//! Read path (API): filtered/paginated listing, single-kill lookup with the
//! item tree reassembled from flat parent_id rows, and aggregate stats.

use crate::killmail::{Item, Killmail};
use crate::models::{
    AttackerResponse, ItemResponse, KillmailDetail, KillmailSummary, ShipCount, StatsResponse,
    SystemCount,
};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum RepositoryError {
    Database(rusqlite::Error),
    Serialization(serde_json::Error),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        RepositoryError::Database(err)
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err)
    }
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::Database(e) => write!(f, "Database error: {}", e),
            RepositoryError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Idempotent schema bootstrap; every statement is IF NOT EXISTS
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS killmails (
    killmail_id            INTEGER PRIMARY KEY,
    hash                   TEXT NOT NULL,
    killmail_time          TEXT NOT NULL,
    solar_system_id        INTEGER NOT NULL,
    sequence_id            INTEGER NOT NULL,
    war_id                 INTEGER,
    moon_id                INTEGER,
    victim_character_id    INTEGER,
    victim_corporation_id  INTEGER,
    victim_alliance_id     INTEGER,
    victim_faction_id      INTEGER,
    victim_ship_type_id    INTEGER NOT NULL,
    victim_damage_taken    INTEGER NOT NULL DEFAULT 0,
    victim_pos_x           REAL,
    victim_pos_y           REAL,
    victim_pos_z           REAL,
    zkb_location_id        INTEGER,
    zkb_fitted_value       REAL NOT NULL DEFAULT 0,
    zkb_dropped_value      REAL NOT NULL DEFAULT 0,
    zkb_destroyed_value    REAL NOT NULL DEFAULT 0,
    zkb_total_value        REAL NOT NULL DEFAULT 0,
    zkb_points             INTEGER NOT NULL DEFAULT 0,
    zkb_is_npc             INTEGER NOT NULL DEFAULT 0,
    zkb_is_solo            INTEGER NOT NULL DEFAULT 0,
    zkb_is_awox            INTEGER NOT NULL DEFAULT 0,
    zkb_labels             TEXT NOT NULL DEFAULT '[]',
    zkb_href               TEXT,
    zkb_attacker_count     INTEGER NOT NULL DEFAULT 0,
    uploaded_at            TEXT NOT NULL,
    created_at             TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_killmails_time ON killmails (killmail_time DESC);
CREATE INDEX IF NOT EXISTS idx_killmails_system ON killmails (solar_system_id);

CREATE TABLE IF NOT EXISTS killmail_attackers (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    killmail_id      INTEGER NOT NULL REFERENCES killmails (killmail_id),
    character_id     INTEGER,
    corporation_id   INTEGER,
    alliance_id      INTEGER,
    faction_id       INTEGER,
    ship_type_id     INTEGER,
    weapon_type_id   INTEGER,
    damage_done      INTEGER NOT NULL DEFAULT 0,
    final_blow       INTEGER NOT NULL DEFAULT 0,
    security_status  REAL NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_attackers_killmail ON killmail_attackers (killmail_id);

CREATE TABLE IF NOT EXISTS killmail_items (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    killmail_id         INTEGER NOT NULL REFERENCES killmails (killmail_id),
    parent_id           INTEGER,
    item_type_id        INTEGER NOT NULL,
    flag                INTEGER NOT NULL DEFAULT 0,
    quantity_destroyed  INTEGER NOT NULL DEFAULT 0,
    quantity_dropped    INTEGER NOT NULL DEFAULT 0,
    singleton           INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_items_killmail ON killmail_items (killmail_id);
"#;

/// Optional filters for the kill listing
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub solar_system_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub npc: Option<bool>,
    pub solo: Option<bool>,
    pub awox: Option<bool>,
}

/// Record store + query service over one shared SQLite connection
pub struct KillmailRepository {
    conn: Arc<Mutex<Connection>>,
}

impl KillmailRepository {
    /// Open (or create) the database and bootstrap the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Liveness probe for the health endpoint
    pub fn health(&self) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ── Write (poller) ──────────────────────────────────────────────

    /// Insert-or-skip one killmail with its child rows.
    ///
    /// Returns false without touching child tables when the killmail_id is
    /// already stored.
    pub fn save(&self, killmail: &Killmail, sequence_id: u64) -> Result<bool, RepositoryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let victim = &killmail.esi.victim;
        let zkb = &killmail.zkb;
        let position = victim.position.as_ref();
        let labels = serde_json::to_string(&zkb.labels)?;
        let uploaded_at = chrono::DateTime::from_timestamp(killmail.uploaded_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO killmails (
                killmail_id, hash, killmail_time, solar_system_id, sequence_id,
                war_id, moon_id,
                victim_character_id, victim_corporation_id, victim_alliance_id,
                victim_faction_id, victim_ship_type_id, victim_damage_taken,
                victim_pos_x, victim_pos_y, victim_pos_z,
                zkb_location_id, zkb_fitted_value, zkb_dropped_value,
                zkb_destroyed_value, zkb_total_value, zkb_points,
                zkb_is_npc, zkb_is_solo, zkb_is_awox,
                zkb_labels, zkb_href, zkb_attacker_count, uploaded_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                ?27, ?28, ?29
            )
            "#,
            params![
                killmail.killmail_id as i64,
                killmail.hash,
                killmail.esi.killmail_time,
                killmail.esi.solar_system_id,
                sequence_id as i64,
                killmail.esi.war_id,
                killmail.esi.moon_id,
                victim.character_id,
                victim.corporation_id,
                victim.alliance_id,
                victim.faction_id,
                victim.ship_type_id,
                victim.damage_taken,
                position.map(|p| p.x),
                position.map(|p| p.y),
                position.map(|p| p.z),
                zkb.location_id,
                zkb.fitted_value,
                zkb.dropped_value,
                zkb.destroyed_value,
                zkb.total_value,
                zkb.points,
                zkb.npc,
                zkb.solo,
                zkb.awox,
                labels,
                zkb.href,
                killmail.esi.attackers.len() as i64,
                uploaded_at,
            ],
        )?;

        if inserted == 0 {
            // Duplicate: child rows were written by the first save
            return Ok(false);
        }

        let killmail_id = killmail.killmail_id as i64;
        for attacker in &killmail.esi.attackers {
            tx.execute(
                r#"
                INSERT INTO killmail_attackers (
                    killmail_id, character_id, corporation_id, alliance_id, faction_id,
                    ship_type_id, weapon_type_id, damage_done, final_blow, security_status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    killmail_id,
                    attacker.character_id,
                    attacker.corporation_id,
                    attacker.alliance_id,
                    attacker.faction_id,
                    attacker.ship_type_id,
                    attacker.weapon_type_id,
                    attacker.damage_done,
                    attacker.final_blow,
                    attacker.security_status,
                ],
            )?;
        }

        insert_items(&tx, killmail_id, &victim.items, None)?;

        tx.commit()?;
        Ok(true)
    }

    // ── Read (API) ──────────────────────────────────────────────────

    /// Filtered, paginated listing plus the total matching count
    pub fn list_kills(
        &self,
        params: &ListParams,
    ) -> Result<(Vec<KillmailSummary>, i64), RepositoryError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(min_value) = params.min_value {
            clauses.push("k.zkb_total_value >= ?".to_string());
            values.push(Value::Real(min_value));
        }
        if let Some(max_value) = params.max_value {
            clauses.push("k.zkb_total_value <= ?".to_string());
            values.push(Value::Real(max_value));
        }
        if let Some(solar_system_id) = params.solar_system_id {
            clauses.push("k.solar_system_id = ?".to_string());
            values.push(Value::Integer(solar_system_id));
        }
        if let Some(ship_type_id) = params.ship_type_id {
            clauses.push("k.victim_ship_type_id = ?".to_string());
            values.push(Value::Integer(ship_type_id));
        }
        if let Some(character_id) = params.character_id {
            clauses.push(
                "(k.victim_character_id = ? OR EXISTS (SELECT 1 FROM killmail_attackers a \
                 WHERE a.killmail_id = k.killmail_id AND a.character_id = ?))"
                    .to_string(),
            );
            values.push(Value::Integer(character_id));
            values.push(Value::Integer(character_id));
        }
        if let Some(corporation_id) = params.corporation_id {
            clauses.push(
                "(k.victim_corporation_id = ? OR EXISTS (SELECT 1 FROM killmail_attackers a \
                 WHERE a.killmail_id = k.killmail_id AND a.corporation_id = ?))"
                    .to_string(),
            );
            values.push(Value::Integer(corporation_id));
            values.push(Value::Integer(corporation_id));
        }
        if let Some(alliance_id) = params.alliance_id {
            clauses.push(
                "(k.victim_alliance_id = ? OR EXISTS (SELECT 1 FROM killmail_attackers a \
                 WHERE a.killmail_id = k.killmail_id AND a.alliance_id = ?))"
                    .to_string(),
            );
            values.push(Value::Integer(alliance_id));
            values.push(Value::Integer(alliance_id));
        }
        if let Some(npc) = params.npc {
            clauses.push("k.zkb_is_npc = ?".to_string());
            values.push(Value::Integer(npc.into()));
        }
        if let Some(solo) = params.solo {
            clauses.push("k.zkb_is_solo = ?".to_string());
            values.push(Value::Integer(solo.into()));
        }
        if let Some(awox) = params.awox {
            clauses.push("k.zkb_is_awox = ?".to_string());
            values.push(Value::Integer(awox.into()));
        }

        let where_clause = if clauses.is_empty() {
            "1=1".to_string()
        } else {
            clauses.join(" AND ")
        };

        let conn = self.conn.lock().unwrap();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM killmails k WHERE {}", where_clause),
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT k.killmail_id, k.killmail_time, k.solar_system_id, k.victim_ship_type_id,
                    k.victim_character_id, k.victim_corporation_id, k.victim_alliance_id,
                    k.zkb_total_value, k.zkb_is_npc, k.zkb_is_solo, k.zkb_is_awox,
                    k.zkb_attacker_count
             FROM killmails k WHERE {}
             ORDER BY k.killmail_time DESC LIMIT ? OFFSET ?",
            where_clause
        ))?;

        values.push(Value::Integer(params.limit));
        values.push(Value::Integer(params.offset));

        let kills = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                Ok(KillmailSummary {
                    killmail_id: row.get(0)?,
                    killmail_time: row.get(1)?,
                    solar_system_id: row.get(2)?,
                    victim_ship_type_id: row.get(3)?,
                    victim_character_id: row.get(4)?,
                    victim_corporation_id: row.get(5)?,
                    victim_alliance_id: row.get(6)?,
                    zkb_total_value: row.get(7)?,
                    zkb_is_npc: row.get(8)?,
                    zkb_is_solo: row.get(9)?,
                    zkb_is_awox: row.get(10)?,
                    zkb_attacker_count: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((kills, total))
    }

    /// Single killmail with attackers and the reassembled item tree
    pub fn get_kill(&self, killmail_id: i64) -> Result<Option<KillmailDetail>, RepositoryError> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT killmail_id, killmail_time, solar_system_id, victim_ship_type_id,
                        victim_character_id, victim_corporation_id, victim_alliance_id,
                        zkb_total_value, zkb_is_npc, zkb_is_solo, zkb_is_awox,
                        zkb_attacker_count,
                        hash, sequence_id, war_id, moon_id, victim_faction_id,
                        victim_damage_taken, victim_pos_x, victim_pos_y, victim_pos_z,
                        zkb_location_id, zkb_fitted_value, zkb_dropped_value,
                        zkb_destroyed_value, zkb_points, zkb_labels, zkb_href,
                        uploaded_at, created_at
                 FROM killmails WHERE killmail_id = ?1",
                [killmail_id],
                |row| {
                    let labels_json: String = row.get(26)?;
                    Ok((
                        KillmailDetail {
                            summary: KillmailSummary {
                                killmail_id: row.get(0)?,
                                killmail_time: row.get(1)?,
                                solar_system_id: row.get(2)?,
                                victim_ship_type_id: row.get(3)?,
                                victim_character_id: row.get(4)?,
                                victim_corporation_id: row.get(5)?,
                                victim_alliance_id: row.get(6)?,
                                zkb_total_value: row.get(7)?,
                                zkb_is_npc: row.get(8)?,
                                zkb_is_solo: row.get(9)?,
                                zkb_is_awox: row.get(10)?,
                                zkb_attacker_count: row.get(11)?,
                            },
                            hash: row.get(12)?,
                            sequence_id: row.get(13)?,
                            war_id: row.get(14)?,
                            moon_id: row.get(15)?,
                            victim_faction_id: row.get(16)?,
                            victim_damage_taken: row.get(17)?,
                            victim_pos_x: row.get(18)?,
                            victim_pos_y: row.get(19)?,
                            victim_pos_z: row.get(20)?,
                            zkb_location_id: row.get(21)?,
                            zkb_fitted_value: row.get(22)?,
                            zkb_dropped_value: row.get(23)?,
                            zkb_destroyed_value: row.get(24)?,
                            zkb_points: row.get(25)?,
                            zkb_labels: Vec::new(),
                            zkb_href: row.get(27)?,
                            uploaded_at: row.get(28)?,
                            created_at: row.get(29)?,
                            attackers: Vec::new(),
                            items: Vec::new(),
                        },
                        labels_json,
                    ))
                },
            )
            .optional()?;

        let Some((mut detail, labels_json)) = row else {
            return Ok(None);
        };
        detail.zkb_labels = serde_json::from_str(&labels_json)?;

        let mut stmt = conn.prepare(
            "SELECT id, character_id, corporation_id, alliance_id, faction_id,
                    ship_type_id, weapon_type_id, damage_done, final_blow, security_status
             FROM killmail_attackers WHERE killmail_id = ?1 ORDER BY damage_done DESC",
        )?;
        detail.attackers = stmt
            .query_map([killmail_id], |row| {
                Ok(AttackerResponse {
                    id: row.get(0)?,
                    character_id: row.get(1)?,
                    corporation_id: row.get(2)?,
                    alliance_id: row.get(3)?,
                    faction_id: row.get(4)?,
                    ship_type_id: row.get(5)?,
                    weapon_type_id: row.get(6)?,
                    damage_done: row.get(7)?,
                    final_blow: row.get(8)?,
                    security_status: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, parent_id, item_type_id, flag, quantity_destroyed,
                    quantity_dropped, singleton
             FROM killmail_items WHERE killmail_id = ?1 ORDER BY id ASC",
        )?;
        let flat_items = stmt
            .query_map([killmail_id], |row| {
                Ok(FlatItem {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    item: ItemResponse {
                        id: row.get(0)?,
                        item_type_id: row.get(2)?,
                        flag: row.get(3)?,
                        quantity_destroyed: row.get(4)?,
                        quantity_dropped: row.get(5)?,
                        singleton: row.get(6)?,
                        items: Vec::new(),
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        detail.items = build_item_tree(flat_items);

        Ok(Some(detail))
    }

    /// Aggregate statistics over the whole store
    pub fn stats(&self) -> Result<StatsResponse, RepositoryError> {
        let conn = self.conn.lock().unwrap();

        let (total_kills, total_value, kills_npc, kills_solo, kills_awox) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(zkb_total_value), 0),
                    COALESCE(SUM(zkb_is_npc), 0), COALESCE(SUM(zkb_is_solo), 0),
                    COALESCE(SUM(zkb_is_awox), 0)
             FROM killmails",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )?;

        let mut stmt = conn.prepare(
            "SELECT victim_ship_type_id, COUNT(*) AS count
             FROM killmails GROUP BY victim_ship_type_id ORDER BY count DESC LIMIT 10",
        )?;
        let top_ships = stmt
            .query_map([], |row| {
                Ok(ShipCount {
                    ship_type_id: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT solar_system_id, COUNT(*) AS count
             FROM killmails GROUP BY solar_system_id ORDER BY count DESC LIMIT 10",
        )?;
        let top_solar_systems = stmt
            .query_map([], |row| {
                Ok(SystemCount {
                    solar_system_id: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StatsResponse {
            total_kills,
            total_value,
            kills_npc,
            kills_solo,
            kills_awox,
            top_ships,
            top_solar_systems,
        })
    }
}

/// Recursive insert-then-link: each container row is inserted before its
/// children so the fresh rowid can serve as their parent_id.
fn insert_items(
    tx: &Transaction,
    killmail_id: i64,
    items: &[Item],
    parent_id: Option<i64>,
) -> Result<(), rusqlite::Error> {
    for item in items {
        tx.execute(
            "INSERT INTO killmail_items (
                killmail_id, parent_id, item_type_id, flag,
                quantity_destroyed, quantity_dropped, singleton
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                killmail_id,
                parent_id,
                item.item_type_id,
                item.flag,
                item.quantity_destroyed,
                item.quantity_dropped,
                item.singleton,
            ],
        )?;
        if !item.items.is_empty() {
            let inserted_id = tx.last_insert_rowid();
            insert_items(tx, killmail_id, &item.items, Some(inserted_id))?;
        }
    }
    Ok(())
}

struct FlatItem {
    id: i64,
    parent_id: Option<i64>,
    item: ItemResponse,
}

/// Reassemble the item tree from flat rows.
///
/// Rows whose parent is missing from the result set become roots, matching
/// the write path where only true containers are referenced as parents.
fn build_item_tree(flat_items: Vec<FlatItem>) -> Vec<ItemResponse> {
    let known_ids: std::collections::HashSet<i64> = flat_items.iter().map(|f| f.id).collect();

    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<FlatItem>> = HashMap::new();

    for flat in flat_items {
        match flat.parent_id {
            Some(parent) if known_ids.contains(&parent) => {
                children.entry(parent).or_default().push(flat);
            }
            _ => roots.push(flat),
        }
    }

    roots
        .into_iter()
        .map(|flat| attach_children(flat, &mut children))
        .collect()
}

fn attach_children(flat: FlatItem, children: &mut HashMap<i64, Vec<FlatItem>>) -> ItemResponse {
    let mut item = flat.item;
    if let Some(kids) = children.remove(&flat.id) {
        item.items = kids
            .into_iter()
            .map(|kid| attach_children(kid, children))
            .collect();
    }
    item
}
