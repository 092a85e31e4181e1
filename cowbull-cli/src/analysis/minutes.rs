use serde::Serialize;

use cowbull_db::models::{BoxKey, Card};
use cowbull_db::slot::{minutes_to_slot, slot_key_minutes, Clock, MINUTES_PER_DAY};
use cowbull_db::store::BoxHistory;

use super::cycle::predict_next_slots;
use super::{percent_of, rank_by_count};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardRate {
    pub card: Card,
    pub count: u32,
    pub total: u32,
    pub rate: f64,
}

/// Histogram labelled by the start of each bucket.
#[derive(Debug, Clone, Serialize)]
pub struct MinuteSeries {
    pub labels: Vec<String>,
    pub counts: Vec<u32>,
    pub agg: usize,
}

/// Card occurrences per minute of day (1440 entries). Keys that do not parse
/// as a slot are skipped.
pub fn minute_histogram(history: &BoxHistory) -> Vec<u32> {
    let mut counts = vec![0u32; MINUTES_PER_DAY as usize];
    for (slot, cards) in history.iter() {
        match slot_key_minutes(slot) {
            Some(minute) => counts[minute as usize] += cards.len() as u32,
            None => log::warn!("ignoring malformed slot key '{slot}'"),
        }
    }
    counts
}

/// Sums contiguous windows of `agg` minutes. A window that does not divide the
/// day leaves a shorter final bucket; `agg == 0` is treated as 1.
pub fn bucket_histogram(counts: &[u32], agg: usize) -> MinuteSeries {
    let agg = agg.max(1);
    let (labels, counts) = counts
        .chunks(agg)
        .enumerate()
        .map(|(i, chunk)| (minutes_to_slot((i * agg) as i64), chunk.iter().sum::<u32>()))
        .unzip();
    MinuteSeries { labels, counts, agg }
}

/// Most frequent cards for a box across every slot. Rates are shares of the
/// box's own occurrence count.
pub fn top_n_cards(history: &BoxHistory, limit: usize) -> Vec<CardRate> {
    let all_cards = history.iter().flat_map(|(_, cards)| cards.iter().copied());
    let total = history.total_cards() as u32;
    rank_by_count(all_cards)
        .into_iter()
        .take(limit)
        .map(|(card, count)| CardRate {
            card,
            count,
            total,
            rate: percent_of(count, total),
        })
        .collect()
}

/// Most frequent card recorded at exactly `slot`, if it was seen at least
/// `min_samples` times.
pub fn best_card_for_slot(history: &BoxHistory, slot: &str, min_samples: u32) -> Option<CardRate> {
    let cards = history.get(slot).filter(|cards| !cards.is_empty())?;
    let total = cards.len() as u32;
    let (card, count) = rank_by_count(cards.iter().copied()).into_iter().next()?;
    if count < min_samples {
        return None;
    }
    Some(CardRate {
        card,
        count,
        total,
        rate: percent_of(count, total),
    })
}

/// The last `n` slot keys recorded for a box, newest first.
pub fn recent_slots(history: &BoxHistory, n: usize) -> Vec<String> {
    let keys: Vec<&str> = history.slot_keys().collect();
    keys.iter().rev().take(n).map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct OutlookLimits {
    pub recent: usize,
    pub predict: usize,
    pub top: usize,
    pub min_samples: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotPrediction {
    pub slot: String,
    pub best: Option<CardRate>,
}

/// Everything the dashboard shows for one slot-tracked box.
#[derive(Debug, Clone, Serialize)]
pub struct BoxOutlook {
    pub key: BoxKey,
    pub recent: Vec<String>,
    pub upcoming: Option<Vec<SlotPrediction>>,
    pub top: Vec<CardRate>,
}

pub fn box_outlook<C: Clock>(key: BoxKey, history: &BoxHistory, clock: &C, limits: OutlookLimits) -> BoxOutlook {
    let upcoming = predict_next_slots(history, clock, limits.predict).map(|slots| {
        slots
            .into_iter()
            .map(|slot| {
                let best = best_card_for_slot(history, &slot, limits.min_samples);
                SlotPrediction { slot, best }
            })
            .collect()
    });
    BoxOutlook {
        key,
        recent: recent_slots(history, limits.recent),
        upcoming,
        top: top_n_cards(history, limits.top),
    }
}
