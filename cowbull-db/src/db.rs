use anyhow::{Context, Result};
use chrono::DateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::models::{BoxKey, Card, Round};
use crate::store::{BoxHistory, RoundStore, SlotHistoryStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rounds (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    round_id        TEXT NOT NULL UNIQUE,
    first_card      TEXT NOT NULL,
    selected_boxes  TEXT NOT NULL,
    recorded_at     TEXT
);

CREATE TABLE IF NOT EXISTS slot_history (
    seq   INTEGER PRIMARY KEY AUTOINCREMENT,
    box   TEXT NOT NULL,
    slot  TEXT NOT NULL,
    card  TEXT
);

CREATE INDEX IF NOT EXISTS slot_history_box ON slot_history (box, seq);
";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("cowbull.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Cannot open database {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Schema migration failed")?;
    Ok(())
}

/// Inserts a round unless its id is already stored. Returns whether a row was added.
pub fn insert_round(conn: &Connection, round: &Round) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO rounds (round_id, first_card, selected_boxes, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                round.round_id,
                round.first_card.to_string(),
                join_boxes(&round.selected_boxes),
                round.recorded_at.map(|t| t.to_rfc3339()),
            ],
        )
        .with_context(|| format!("Failed to insert round {}", round.round_id))?;
    Ok(changed > 0)
}

pub fn fetch_last_rounds(conn: &Connection, limit: u32) -> Result<Vec<Round>> {
    let mut stmt = conn.prepare(
        "SELECT round_id, first_card, selected_boxes, recorded_at
         FROM rounds ORDER BY seq DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().filter_map(row_to_round).collect())
}

pub fn count_rounds(conn: &Connection) -> Result<u32> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM rounds", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_slots(conn: &Connection, key: BoxKey) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(DISTINCT slot) FROM slot_history WHERE box = ?1",
        [key.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Empties the round history and every slot history.
pub fn clear_all(conn: &Connection) -> Result<()> {
    conn.execute_batch("DELETE FROM rounds; DELETE FROM slot_history;")
        .context("Failed to clear data")?;
    Ok(())
}

type RawRound = (String, String, String, Option<String>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRound> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Rows that no longer parse are skipped with a warning.
fn row_to_round((round_id, first_card, boxes, recorded_at): RawRound) -> Option<Round> {
    let first_card: Card = match first_card.parse() {
        Ok(card) => card,
        Err(e) => {
            log::warn!("skipping round {round_id}: {e}");
            return None;
        }
    };
    let selected_boxes = boxes
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<BoxKey>() {
            Ok(key) => Some(key),
            Err(e) => {
                log::warn!("round {round_id}: {e}");
                None
            }
        })
        .collect();
    let recorded_at = recorded_at.and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
        Ok(t) => Some(t),
        Err(e) => {
            log::warn!("round {round_id}: bad timestamp '{raw}': {e}");
            None
        }
    });
    Some(Round {
        round_id,
        first_card,
        selected_boxes,
        recorded_at,
    })
}

fn join_boxes(boxes: &[BoxKey]) -> String {
    boxes.iter().map(|b| b.as_str()).collect::<Vec<_>>().join(",")
}

impl RoundStore for Connection {
    fn append_round(&self, round: &Round) -> Result<()> {
        self.execute(
            "INSERT INTO rounds (round_id, first_card, selected_boxes, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                round.round_id,
                round.first_card.to_string(),
                join_boxes(&round.selected_boxes),
                round.recorded_at.map(|t| t.to_rfc3339()),
            ],
        )
        .with_context(|| format!("Failed to save round {}", round.round_id))?;
        Ok(())
    }

    fn list_rounds(&self) -> Result<Vec<Round>> {
        let mut stmt = self.prepare(
            "SELECT round_id, first_card, selected_boxes, recorded_at
             FROM rounds ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read rounds")?;
        Ok(rows.into_iter().filter_map(row_to_round).collect())
    }

    fn delete_round(&self, round_id: &str) -> Result<bool> {
        let changed = self
            .execute("DELETE FROM rounds WHERE round_id = ?1", [round_id])
            .with_context(|| format!("Failed to delete round {round_id}"))?;
        Ok(changed > 0)
    }

    fn replace_rounds(&self, rounds: &[Round]) -> Result<()> {
        self.execute("DELETE FROM rounds", [])
            .context("Failed to clear rounds")?;
        for round in rounds {
            self.append_round(round)?;
        }
        Ok(())
    }
}

impl SlotHistoryStore for Connection {
    fn append_card(&self, key: BoxKey, slot: &str, card: Card) -> Result<()> {
        self.execute(
            "INSERT INTO slot_history (box, slot, card) VALUES (?1, ?2, ?3)",
            params![key.as_str(), slot, card.to_string()],
        )
        .with_context(|| format!("Failed to record {card} at {slot} for {key}"))?;
        Ok(())
    }

    fn get_box(&self, key: BoxKey) -> Result<BoxHistory> {
        let mut stmt = self.prepare(
            "SELECT slot, card FROM slot_history WHERE box = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([key.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read slot history for {key}"))?;

        let mut history = BoxHistory::new();
        for (slot, card) in rows {
            match card.map(|c| c.parse::<Card>()) {
                Some(Ok(card)) => history.push(&slot, card),
                Some(Err(e)) => {
                    log::warn!("{key} slot {slot}: {e}");
                    history.insert_empty(&slot);
                }
                None => history.insert_empty(&slot),
            }
        }
        Ok(history)
    }

    fn delete_slot(&self, key: BoxKey, slot: &str) -> Result<bool> {
        let changed = self
            .execute(
                "DELETE FROM slot_history WHERE box = ?1 AND slot = ?2",
                params![key.as_str(), slot],
            )
            .with_context(|| format!("Failed to delete slot {slot} from {key}"))?;
        Ok(changed > 0)
    }

    fn replace_box(&self, key: BoxKey, history: &BoxHistory) -> Result<()> {
        self.execute("DELETE FROM slot_history WHERE box = ?1", [key.as_str()])
            .with_context(|| format!("Failed to clear slot history for {key}"))?;
        for (slot, cards) in history.iter() {
            if cards.is_empty() {
                self.execute(
                    "INSERT INTO slot_history (box, slot, card) VALUES (?1, ?2, NULL)",
                    params![key.as_str(), slot],
                )?;
            }
            for card in cards {
                self.append_card(key, slot, *card)?;
            }
        }
        Ok(())
    }
}

/// Looks up a single round by id.
pub fn find_round(conn: &Connection, round_id: &str) -> Result<Option<Round>> {
    let row = conn
        .query_row(
            "SELECT round_id, first_card, selected_boxes, recorded_at
             FROM rounds WHERE round_id = ?1",
            [round_id],
            read_row,
        )
        .optional()?;
    Ok(row.and_then(row_to_round))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validate_round;
    use crate::slot::{Clock, FixedClock};
    use crate::store::record_round;

    fn test_round(id: &str, card: &str, boxes: &[BoxKey]) -> Round {
        Round {
            round_id: id.to_string(),
            first_card: card.parse().unwrap(),
            selected_boxes: boxes.to_vec(),
            recorded_at: None,
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_append_and_list_keep_order() {
        let conn = test_conn();
        conn.append_round(&test_round("b", "As", &[BoxKey::Draw, BoxKey::Trips])).unwrap();
        conn.append_round(&test_round("a", "Kh", &[BoxKey::BullWin, BoxKey::TwoPair])).unwrap();

        let rounds = conn.list_rounds().unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].round_id, "b");
        assert_eq!(rounds[0].selected_boxes, vec![BoxKey::Draw, BoxKey::Trips]);
        assert_eq!(rounds[1].round_id, "a");
        assert_eq!(count_rounds(&conn).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_round_rejected_by_append_ignored_by_insert() {
        let conn = test_conn();
        let round = test_round("001", "As", &[BoxKey::Draw, BoxKey::Trips]);
        conn.append_round(&round).unwrap();
        assert!(conn.append_round(&round).is_err());
        assert!(!insert_round(&conn, &round).unwrap());
        assert_eq!(count_rounds(&conn).unwrap(), 1);
    }

    #[test]
    fn test_delete_and_replace() {
        let conn = test_conn();
        conn.append_round(&test_round("001", "As", &[BoxKey::Draw])).unwrap();
        conn.append_round(&test_round("002", "2c", &[BoxKey::Draw])).unwrap();
        assert!(conn.delete_round("001").unwrap());
        assert!(!conn.delete_round("001").unwrap());
        assert!(find_round(&conn, "001").unwrap().is_none());
        assert!(find_round(&conn, "002").unwrap().is_some());

        conn.replace_rounds(&[test_round("003", "Qd", &[BoxKey::CowboyWin])]).unwrap();
        let rounds = conn.list_rounds().unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].round_id, "003");
    }

    #[test]
    fn test_fetch_last_rounds_newest_first() {
        let conn = test_conn();
        for id in ["001", "002", "003"] {
            conn.append_round(&test_round(id, "As", &[BoxKey::Draw])).unwrap();
        }
        let last = fetch_last_rounds(&conn, 2).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].round_id, "003");
        assert_eq!(last[1].round_id, "002");
    }

    #[test]
    fn test_malformed_round_rows_are_skipped() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO rounds (round_id, first_card, selected_boxes) VALUES ('bad', 'Zz', 'draw')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO rounds (round_id, first_card, selected_boxes) VALUES ('ok', 'As', 'draw,bogus,trips')",
            [],
        )
        .unwrap();
        let rounds = conn.list_rounds().unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].selected_boxes, vec![BoxKey::Draw, BoxKey::Trips]);
    }

    #[test]
    fn test_slot_history_roundtrip() {
        let conn = test_conn();
        conn.append_card(BoxKey::Aa, "10:00", "As".parse().unwrap()).unwrap();
        conn.append_card(BoxKey::Aa, "09:00", "Kh".parse().unwrap()).unwrap();
        conn.append_card(BoxKey::Aa, "10:00", "As".parse().unwrap()).unwrap();
        conn.append_card(BoxKey::FourKind, "10:00", "2c".parse().unwrap()).unwrap();

        let aa = conn.get_box(BoxKey::Aa).unwrap();
        assert_eq!(aa.slot_keys().collect::<Vec<_>>(), vec!["10:00", "09:00"]);
        assert_eq!(aa.get("10:00").unwrap().len(), 2);
        assert_eq!(conn.get_box(BoxKey::FourKind).unwrap().total_cards(), 1);
        assert_eq!(count_slots(&conn, BoxKey::Aa).unwrap(), 2);

        assert!(conn.delete_slot(BoxKey::Aa, "10:00").unwrap());
        assert!(!conn.delete_slot(BoxKey::Aa, "10:00").unwrap());
        assert_eq!(conn.get_box(BoxKey::Aa).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_box_keeps_empty_slots() {
        let conn = test_conn();
        let mut history = BoxHistory::new();
        history.insert_empty("08:15");
        history.push("21:40", "Jd".parse().unwrap());
        conn.replace_box(BoxKey::FourKind, &history).unwrap();

        let stored = conn.get_box(BoxKey::FourKind).unwrap();
        assert_eq!(stored, history);
    }

    #[test]
    fn test_record_round_in_transaction() {
        let conn = test_conn();
        let clock = FixedClock::at(14, 5);
        let submission = validate_round("As", &["cowboy_win", "four_kind", "trips", "aa"]).unwrap();

        let tx = conn.unchecked_transaction().unwrap();
        let round = record_round(&*tx, submission, "r-1".to_string(), clock.now_local()).unwrap();
        tx.commit().unwrap();

        assert_eq!(round.recorded_at, Some(clock.now_local()));
        let stored = conn.list_rounds().unwrap();
        assert_eq!(stored, vec![round]);
        assert_eq!(conn.get_box(BoxKey::Aa).unwrap().get("14:05").unwrap().len(), 1);
        assert_eq!(conn.get_box(BoxKey::FourKind).unwrap().get("14:05").unwrap().len(), 1);
    }

    #[test]
    fn test_record_round_rolls_back_on_duplicate() {
        let conn = test_conn();
        let clock = FixedClock::at(9, 0);
        conn.append_round(&test_round("dup", "As", &[BoxKey::Draw, BoxKey::Trips])).unwrap();
        let submission = validate_round("As", &["draw", "four_kind"]).unwrap();

        {
            let tx = conn.unchecked_transaction().unwrap();
            assert!(record_round(&*tx, submission, "dup".to_string(), clock.now_local()).is_err());
        }

        assert_eq!(count_rounds(&conn).unwrap(), 1);
        assert!(conn.get_box(BoxKey::FourKind).unwrap().is_empty());
    }

    #[test]
    fn test_clear_all() {
        let conn = test_conn();
        conn.append_round(&test_round("001", "As", &[BoxKey::Draw])).unwrap();
        conn.append_card(BoxKey::Aa, "10:00", "As".parse().unwrap()).unwrap();
        clear_all(&conn).unwrap();
        assert_eq!(count_rounds(&conn).unwrap(), 0);
        assert!(conn.get_box(BoxKey::Aa).unwrap().is_empty());
    }
}
