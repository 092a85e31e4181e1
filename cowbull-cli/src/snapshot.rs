use std::path::Path;

use anyhow::Result;

use cowbull_db::db::{fetch_last_rounds, migrate, open_db};
use cowbull_db::models::{BoxKey, Round};
use cowbull_db::rusqlite::Connection;
use cowbull_db::store::{BoxHistory, RoundStore, SlotHistoryStore};

/// Opens the database and brings the schema up to date.
pub fn open_store(path: &Path) -> Result<Connection> {
    let conn = open_db(path)?;
    migrate(&conn)?;
    Ok(conn)
}

/// Read side of the store. A store that cannot be opened or read behaves as
/// an empty one.
pub struct Snapshot {
    conn: Option<Connection>,
}

impl Snapshot {
    pub fn new(opened: Result<Connection>) -> Self {
        let conn = match opened {
            Ok(conn) => Some(conn),
            Err(e) => {
                log::warn!("store unavailable, reading an empty history: {e:#}");
                None
            }
        };
        Self { conn }
    }

    pub fn rounds(&self) -> Vec<Round> {
        let Some(conn) = &self.conn else {
            return Vec::new();
        };
        conn.list_rounds().unwrap_or_else(|e| {
            log::warn!("cannot read rounds, using an empty history: {e:#}");
            Vec::new()
        })
    }

    pub fn last_rounds(&self, limit: u32) -> Vec<Round> {
        let Some(conn) = &self.conn else {
            return Vec::new();
        };
        fetch_last_rounds(conn, limit).unwrap_or_else(|e| {
            log::warn!("cannot read rounds: {e:#}");
            Vec::new()
        })
    }

    pub fn slot_box(&self, key: BoxKey) -> BoxHistory {
        let Some(conn) = &self.conn else {
            return BoxHistory::new();
        };
        conn.get_box(key).unwrap_or_else(|e| {
            log::warn!("cannot read {key} history, using an empty one: {e:#}");
            BoxHistory::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::card_statistics;
    use anyhow::anyhow;
    use cowbull_db::models::Card;

    fn card(s: &str) -> Card {
        s.parse().unwrap()
    }

    #[test]
    fn test_unavailable_store_reads_empty() {
        let snapshot = Snapshot::new(Err(anyhow!("disk gone")));
        assert!(snapshot.rounds().is_empty());
        assert!(snapshot.last_rounds(10).is_empty());
        assert!(snapshot.slot_box(BoxKey::Aa).is_empty());
        assert_eq!(card_statistics(&snapshot.rounds(), None).total, 0);
    }

    #[test]
    fn test_unopenable_path_reads_empty() {
        let file = std::env::temp_dir().join(format!("cowbull-not-a-dir-{}", uuid::Uuid::new_v4()));
        std::fs::write(&file, b"").unwrap();

        let opened = open_store(&file.join("cowbull.db"));
        assert!(opened.is_err());
        let snapshot = Snapshot::new(opened);
        assert!(snapshot.rounds().is_empty());
        assert!(snapshot.slot_box(BoxKey::FourKind).is_empty());

        std::fs::remove_file(&file).unwrap();
    }

    #[test]
    fn test_snapshot_reads_store() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.append_round(&Round {
            round_id: "r1".into(),
            first_card: card("As"),
            selected_boxes: vec![BoxKey::Draw, BoxKey::Aa, BoxKey::Trips],
            recorded_at: None,
        })
        .unwrap();
        conn.append_card(BoxKey::Aa, "10:00", card("As")).unwrap();

        let snapshot = Snapshot::new(Ok(conn));
        assert_eq!(snapshot.rounds().len(), 1);
        assert_eq!(snapshot.last_rounds(5)[0].round_id, "r1");
        assert_eq!(snapshot.slot_box(BoxKey::Aa).total_cards(), 1);
        assert!(snapshot.slot_box(BoxKey::FourKind).is_empty());
    }
}
