//! Legacy JSON files (`data.json`, `hour.json`): one-time migration into the
//! database, and export back to the same shapes.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cowbull_db::db::insert_round;
use cowbull_db::models::{normalize_boxes, BoxKey, Card, Round};
use cowbull_db::rusqlite::Connection;
use cowbull_db::slot::{minutes_to_slot, slot_key_minutes, slot_of};
use cowbull_db::store::{BoxHistory, SlotHistoryStore};

/// A `data.json` entry in either of its historical shapes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LegacyRecord {
    /// One record per round.
    Current {
        round_id: Option<String>,
        first_card: Option<String>,
        selected_boxes: Vec<String>,
        timestamp: Option<String>,
    },
    /// One record per selected box; rows of a round sit next to each other.
    PerBox {
        round_id: Option<String>,
        first_card: Option<String>,
        selected_box: Option<String>,
        timestamp: Option<String>,
    },
}

impl LegacyRecord {
    fn round_id(&self) -> Option<&str> {
        let id = match self {
            LegacyRecord::Current { round_id, .. } | LegacyRecord::PerBox { round_id, .. } => round_id,
        };
        id.as_deref().filter(|s| !s.is_empty())
    }

    fn first_card(&self) -> Option<&str> {
        match self {
            LegacyRecord::Current { first_card, .. } | LegacyRecord::PerBox { first_card, .. } => {
                first_card.as_deref()
            }
        }
    }

    fn selected_box(&self) -> Option<&str> {
        match self {
            LegacyRecord::PerBox { selected_box, .. } => selected_box.as_deref().filter(|s| !s.is_empty()),
            LegacyRecord::Current { .. } => None,
        }
    }

    fn timestamp(&self) -> Option<&str> {
        match self {
            LegacyRecord::Current { timestamp, .. } | LegacyRecord::PerBox { timestamp, .. } => {
                timestamp.as_deref().filter(|s| !s.is_empty())
            }
        }
    }
}

/// A round after merging legacy rows, before its card and boxes are checked.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRound {
    pub round_id: String,
    pub first_card: Option<String>,
    pub boxes: Vec<String>,
    pub timestamp: Option<String>,
}

/// Parses `data.json`. Entries that match neither shape are counted and skipped.
pub fn parse_legacy_rounds(json: &str) -> Result<(Vec<LegacyRecord>, usize)> {
    let raw: Vec<serde_json::Value> =
        serde_json::from_str(json).context("data file is not a JSON array")?;
    let mut records = Vec::with_capacity(raw.len());
    let mut malformed = 0;
    for (i, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<LegacyRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::warn!("skipping record {}: {e}", i + 1);
                malformed += 1;
            }
        }
    }
    Ok((records, malformed))
}

/// Merges per-box rows into rounds: rows sharing a round id, or failing that
/// a first card, are grouped while they stay contiguous.
pub fn normalize_records(records: &[LegacyRecord]) -> Vec<LegacyRound> {
    let mut rounds = Vec::new();
    let mut i = 0;
    while i < records.len() {
        let record = &records[i];
        if let LegacyRecord::Current { selected_boxes, .. } = record {
            rounds.push(LegacyRound {
                round_id: record
                    .round_id()
                    .map(str::to_string)
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                first_card: record.first_card().map(str::to_string),
                boxes: selected_boxes.clone(),
                timestamp: record.timestamp().map(str::to_string),
            });
            i += 1;
            continue;
        }

        let same_run = |other: &LegacyRecord| match record.round_id() {
            Some(id) => other.round_id() == Some(id),
            None => other.first_card() == record.first_card(),
        };
        let mut boxes: Vec<String> = Vec::new();
        let mut timestamp: Option<String> = None;
        let mut j = i;
        while j < records.len() && same_run(&records[j]) {
            if let Some(b) = records[j].selected_box() {
                if !boxes.iter().any(|seen| seen == b) {
                    boxes.push(b.to_string());
                }
            }
            if timestamp.is_none() {
                timestamp = records[j].timestamp().map(str::to_string);
            }
            j += 1;
        }
        rounds.push(LegacyRound {
            round_id: record
                .round_id()
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            first_card: record.first_card().map(str::to_string),
            boxes,
            timestamp,
        });
        i = j;
    }
    rounds
}

/// Slot key for a legacy timestamp: either already `HH:MM`, or an RFC 3339
/// datetime read in `offset`.
pub fn timestamp_slot(raw: &str, offset: &FixedOffset) -> Option<String> {
    if let Some(minutes) = slot_key_minutes(raw) {
        return Some(minutes_to_slot(minutes as i64));
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| slot_of(&t.with_timezone(offset)))
}

/// Converts a merged legacy round, returning it with the slot its timestamp
/// maps to. Rounds without a usable card are dropped.
pub fn into_round(legacy: LegacyRound, offset: &FixedOffset) -> Option<(Round, Option<String>)> {
    let card = legacy.first_card.as_deref().unwrap_or_default();
    let first_card: Card = match card.parse() {
        Ok(card) => card,
        Err(e) => {
            log::warn!("skipping legacy round {}: {e}", legacy.round_id);
            return None;
        }
    };
    let selected_boxes = normalize_boxes(&legacy.boxes);
    if selected_boxes.len() < legacy.boxes.len() {
        log::warn!(
            "legacy round {}: dropped unknown boxes from {:?}",
            legacy.round_id,
            legacy.boxes
        );
    }
    let recorded_at = legacy
        .timestamp
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok());
    let slot = legacy
        .timestamp
        .as_deref()
        .and_then(|raw| timestamp_slot(raw, offset));
    Some((
        Round {
            round_id: legacy.round_id,
            first_card,
            selected_boxes,
            recorded_at,
        },
        slot,
    ))
}

/// Slot histories for every slot-tracked box, derived from rounds and the slot
/// each one was played at.
pub fn build_slot_histories<'a, I>(entries: I) -> Vec<(BoxKey, BoxHistory)>
where
    I: IntoIterator<Item = (&'a Round, String)>,
{
    let mut histories: Vec<(BoxKey, BoxHistory)> = BoxKey::SLOT_TRACKED
        .iter()
        .map(|&key| (key, BoxHistory::new()))
        .collect();
    for (round, slot) in entries {
        for (key, history) in histories.iter_mut() {
            if round.contains(*key) {
                history.push(&slot, round.first_card);
            }
        }
    }
    histories
}

/// Map that keeps document order, unlike `serde_json::Map`.
#[derive(Debug)]
struct OrderedMap<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of slot keys")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, V>()? {
                    entries.push(entry);
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyBox {
    Slots(OrderedMap<serde_json::Value>),
    List(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct LegacyHour {
    #[serde(default)]
    aa: Option<LegacyBox>,
    #[serde(default)]
    four_kind: Option<LegacyBox>,
}

fn legacy_box_history(key: BoxKey, raw: Option<LegacyBox>, malformed: &mut usize) -> BoxHistory {
    let mut history = BoxHistory::new();
    match raw {
        None => {}
        Some(LegacyBox::List(slots)) => {
            for slot in slots {
                match slot.as_str() {
                    Some(slot) => history.insert_empty(slot),
                    None => *malformed += 1,
                }
            }
        }
        Some(LegacyBox::Slots(OrderedMap(slots))) => {
            for (slot, cards) in slots {
                if cards.is_u64() {
                    log::warn!("{key} slot {slot}: count {cards} has no cards, keeping the slot empty");
                    history.insert_empty(&slot);
                    continue;
                }
                let Some(cards) = cards.as_array() else {
                    log::warn!("{key} slot {slot}: expected a list of cards");
                    *malformed += 1;
                    continue;
                };
                history.insert_empty(&slot);
                for card in cards {
                    match card.as_str().map(str::parse::<Card>) {
                        Some(Ok(card)) => history.push(&slot, card),
                        _ => {
                            log::warn!("{key} slot {slot}: skipping card {card}");
                            *malformed += 1;
                        }
                    }
                }
            }
        }
    }
    history
}

/// Parses `hour.json`, accepting the older list-of-slots shape per box.
pub fn parse_legacy_hour(json: &str) -> Result<(Vec<(BoxKey, BoxHistory)>, usize)> {
    let hour: LegacyHour = serde_json::from_str(json).context("hour file is not a JSON object")?;
    let mut malformed = 0;
    let histories = vec![
        (BoxKey::Aa, legacy_box_history(BoxKey::Aa, hour.aa, &mut malformed)),
        (BoxKey::FourKind, legacy_box_history(BoxKey::FourKind, hour.four_kind, &mut malformed)),
    ];
    Ok((histories, malformed))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResult {
    pub total_records: usize,
    pub rounds: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub malformed: usize,
    pub slot_cards: usize,
}

pub enum SlotSource<'a> {
    Keep,
    HourFile(&'a Path),
    Rebuild,
}

pub fn import_legacy(
    conn: &Connection,
    data_path: &Path,
    slots: SlotSource<'_>,
    offset: &FixedOffset,
) -> Result<ImportResult> {
    let json = std::fs::read_to_string(data_path)
        .with_context(|| format!("Cannot open {:?}", data_path))?;
    let (records, mut malformed) = parse_legacy_rounds(&json)?;
    let total_records = records.len() + malformed;

    let legacy_rounds = normalize_records(&records);
    let merged = legacy_rounds.len();
    let converted: Vec<(Round, Option<String>)> = legacy_rounds
        .into_iter()
        .filter_map(|r| into_round(r, offset))
        .collect();
    malformed += merged - converted.len();

    let histories = match slots {
        SlotSource::Keep => None,
        SlotSource::HourFile(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot open {:?}", path))?;
            let (histories, bad) = parse_legacy_hour(&json)?;
            malformed += bad;
            Some(histories)
        }
        SlotSource::Rebuild => Some(build_slot_histories(
            converted
                .iter()
                .filter_map(|(round, slot)| slot.clone().map(|s| (round, s))),
        )),
    };

    let tx = conn
        .unchecked_transaction()
        .context("Cannot start transaction")?;

    let mut result = ImportResult {
        total_records,
        rounds: converted.len(),
        malformed,
        ..Default::default()
    };

    for (round, _) in &converted {
        if insert_round(&tx, round)? {
            result.inserted += 1;
        } else {
            result.skipped += 1;
        }
    }

    if let Some(histories) = histories {
        for (key, history) in &histories {
            tx.replace_box(*key, history)?;
            result.slot_cards += history.total_cards();
        }
    }

    tx.commit().context("Import commit failed")?;
    log::info!(
        "imported {} of {} rounds from {}",
        result.inserted,
        result.rounds,
        data_path.display()
    );
    Ok(result)
}

#[derive(Debug, Serialize)]
pub struct HourExport<'a> {
    pub aa: &'a BoxHistory,
    pub four_kind: &'a BoxHistory,
}

pub fn export_rounds_json(rounds: &[Round]) -> Result<String> {
    serde_json::to_string_pretty(rounds).context("Cannot serialize rounds")
}

pub fn export_slots_json(aa: &BoxHistory, four_kind: &BoxHistory) -> Result<String> {
    serde_json::to_string_pretty(&HourExport { aa, four_kind }).context("Cannot serialize slot history")
}

/// Checks that an export target is not the database itself.
pub fn check_export_target(output: &Path, db: &Path) -> Result<()> {
    if output == db {
        bail!("Refusing to overwrite the database with an export");
    }
    Ok(())
}
