use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::models::{BoxKey, Card, Round, Submission};
use crate::slot::slot_of;

/// Time-of-day history for one box: slot key -> cards seen at that slot.
///
/// Slots keep the order in which they were first recorded and each slot's
/// cards keep their chronological order. Keys are stored as recorded, so a
/// malformed key survives here and is skipped by the analyses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoxHistory {
    slots: Vec<(String, Vec<Card>)>,
}

impl BoxHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, slot: &str, card: Card) {
        match self.slots.iter_mut().find(|(key, _)| key == slot) {
            Some((_, cards)) => cards.push(card),
            None => self.slots.push((slot.to_string(), vec![card])),
        }
    }

    /// Registers a slot with no cards yet.
    pub fn insert_empty(&mut self, slot: &str) {
        if self.get(slot).is_none() {
            self.slots.push((slot.to_string(), Vec::new()));
        }
    }

    pub fn get(&self, slot: &str) -> Option<&[Card]> {
        self.slots
            .iter()
            .find(|(key, _)| key == slot)
            .map(|(_, cards)| cards.as_slice())
    }

    pub fn remove(&mut self, slot: &str) -> bool {
        let before = self.slots.len();
        self.slots.retain(|(key, _)| key != slot);
        self.slots.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Card])> {
        self.slots
            .iter()
            .map(|(key, cards)| (key.as_str(), cards.as_slice()))
    }

    pub fn slot_keys(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_cards(&self) -> usize {
        self.slots.iter().map(|(_, cards)| cards.len()).sum()
    }
}

impl Serialize for BoxHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.slots.len()))?;
        for (slot, cards) in &self.slots {
            map.serialize_entry(slot, cards)?;
        }
        map.end()
    }
}

pub trait RoundStore {
    fn append_round(&self, round: &Round) -> Result<()>;
    /// All rounds in insertion order.
    fn list_rounds(&self) -> Result<Vec<Round>>;
    fn delete_round(&self, round_id: &str) -> Result<bool>;
    fn replace_rounds(&self, rounds: &[Round]) -> Result<()>;
}

pub trait SlotHistoryStore {
    fn append_card(&self, key: BoxKey, slot: &str, card: Card) -> Result<()>;
    fn get_box(&self, key: BoxKey) -> Result<BoxHistory>;
    fn delete_slot(&self, key: BoxKey, slot: &str) -> Result<bool>;
    fn replace_box(&self, key: BoxKey, history: &BoxHistory) -> Result<()>;
}

/// Persists a validated submission: the round itself, then its card under the
/// current slot for every slot-tracked box it selects.
pub fn record_round<S>(
    store: &S,
    submission: Submission,
    round_id: String,
    now: DateTime<FixedOffset>,
) -> Result<Round>
where
    S: RoundStore + SlotHistoryStore,
{
    let round = Round {
        round_id,
        first_card: submission.first_card,
        selected_boxes: submission.selected_boxes,
        recorded_at: Some(now),
    };
    store.append_round(&round)?;

    let slot = slot_of(&now);
    for key in BoxKey::SLOT_TRACKED {
        if round.contains(key) {
            store.append_card(key, &slot, round.first_card)?;
        }
    }
    log::info!(
        "recorded round {} ({}: {})",
        round.round_id,
        round.first_card,
        round
            .selected_boxes
            .iter()
            .map(|b| b.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(round)
}
