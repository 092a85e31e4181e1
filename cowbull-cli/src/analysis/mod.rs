pub mod audit;
pub mod cycle;
pub mod minutes;

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde::Serialize;

use cowbull_db::models::{BoxKey, Card, Round};

/// Boxes reported as a plain share of all matching rounds.
const TOTAL_NORMALIZED: [BoxKey; 4] = [BoxKey::PairAny, BoxKey::Aa, BoxKey::SuitedCombo, BoxKey::FourKind];

#[derive(Debug, Clone, Serialize)]
pub struct CardStats {
    pub total: u32,
    pub counts: BTreeMap<BoxKey, u32>,
    pub percent: BTreeMap<BoxKey, f64>,
    pub percent_by_section: BTreeMap<BoxKey, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardCount {
    pub card: Card,
    pub count: u32,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn percent_of(count: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(count as f64 / total as f64 * 100.0)
    }
}

/// Counts occurrences and sorts by count, descending. Ties keep the order in
/// which each value was first seen.
pub fn rank_by_count<T, I>(items: I) -> Vec<(T, u32)>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut index: HashMap<T, usize> = HashMap::new();
    let mut counts: Vec<(T, u32)> = Vec::new();
    for item in items {
        match index.get(&item) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(item.clone(), counts.len());
                counts.push((item, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Box frequencies over the rounds whose first card matches `filter`, or all
/// rounds when there is no filter.
pub fn card_statistics(rounds: &[Round], filter: Option<Card>) -> CardStats {
    let matching: Vec<&Round> = rounds
        .iter()
        .filter(|r| filter.map_or(true, |card| r.first_card == card))
        .collect();
    let total = matching.len() as u32;

    let mut counts: BTreeMap<BoxKey, u32> = BoxKey::ALL.iter().map(|&k| (k, 0)).collect();
    for round in &matching {
        for key in &round.selected_boxes {
            *counts.entry(*key).or_insert(0) += 1;
        }
    }

    let percent: BTreeMap<BoxKey, f64> = counts
        .iter()
        .map(|(&key, &count)| (key, percent_of(count, total)))
        .collect();

    let mut percent_by_section = BTreeMap::new();

    let top_total: u32 = BoxKey::TOP.iter().map(|k| counts[k]).sum();
    for key in BoxKey::TOP {
        percent_by_section.insert(key, percent_of(counts[&key], top_total));
    }

    let right_total: u32 = BoxKey::RIGHT_EXCLUSIVE.iter().map(|k| counts[k]).sum();
    for key in BoxKey::RIGHT_EXCLUSIVE {
        percent_by_section.insert(key, percent_of(counts[&key], right_total));
    }

    for key in TOTAL_NORMALIZED {
        percent_by_section.insert(key, percent_of(counts[&key], total));
    }

    CardStats {
        total,
        counts,
        percent,
        percent_by_section,
    }
}

/// Most frequent first cards across every round.
pub fn global_top_cards(rounds: &[Round], limit: usize) -> Vec<CardCount> {
    rank_by_count(rounds.iter().map(|r| r.first_card))
        .into_iter()
        .take(limit)
        .map(|(card, count)| CardCount { card, count })
        .collect()
}

#[cfg(test)]
pub(crate) fn make_round(card: &str, boxes: &[BoxKey]) -> Round {
    Round {
        round_id: format!("{card}-{}", boxes.len()),
        first_card: card.parse().unwrap(),
        selected_boxes: boxes.to_vec(),
        recorded_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn card(s: &str) -> Card {
        s.parse().unwrap()
    }

    #[test]
    fn test_rank_by_count_ties_keep_first_seen() {
        let ranked = rank_by_count(vec!["b", "a", "a", "c", "b", "d"]);
        assert_eq!(ranked, vec![("b", 2), ("a", 2), ("c", 1), ("d", 1)]);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(30.0), 30.0);
        assert_eq!(percent_of(1, 3), 33.33);
        assert_eq!(percent_of(5, 0), 0.0);
    }

    #[test]
    fn test_empty_history() {
        let stats = card_statistics(&[], None);
        assert_eq!(stats.total, 0);
        assert!(stats.counts.values().all(|&c| c == 0));
        assert!(stats.percent.values().all(|&p| p == 0.0));
        assert!(stats.percent_by_section.values().all(|&p| p == 0.0));
        assert_eq!(stats.percent_by_section.len(), BoxKey::ALL.len());
    }

    #[test]
    fn test_four_kind_share_of_total() {
        let mut rounds = Vec::new();
        for i in 0..10 {
            let mut boxes = vec![BoxKey::CowboyWin, BoxKey::FullHouse];
            if i < 3 {
                boxes.push(BoxKey::FourKind);
            }
            rounds.push(make_round("As", &boxes));
        }
        rounds.push(make_round("Kh", &[BoxKey::Draw, BoxKey::FourKind]));

        let stats = card_statistics(&rounds, Some(card("As")));
        assert_eq!(stats.total, 10);
        assert_eq!(stats.counts[&BoxKey::FourKind], 3);
        assert_eq!(stats.percent[&BoxKey::FourKind], 30.0);
        assert_eq!(stats.percent_by_section[&BoxKey::FourKind], 30.0);
        assert_eq!(stats.percent_by_section[&BoxKey::FullHouse], 100.0);
        assert_eq!(stats.percent_by_section[&BoxKey::CowboyWin], 100.0);
    }

    #[test]
    fn test_section_normalization() {
        let rounds = vec![
            make_round("2c", &[BoxKey::CowboyWin, BoxKey::TwoPair, BoxKey::Aa]),
            make_round("2c", &[BoxKey::BullWin, BoxKey::Trips]),
            make_round("2c", &[BoxKey::BullWin, BoxKey::Trips, BoxKey::FourKind]),
            make_round("2c", &[BoxKey::Draw, BoxKey::FourKind, BoxKey::SuitedCombo]),
        ];
        let stats = card_statistics(&rounds, None);

        assert_eq!(stats.percent_by_section[&BoxKey::BullWin], 50.0);
        assert_eq!(stats.percent_by_section[&BoxKey::Draw], 25.0);
        // three exclusive RIGHT picks: two_pair once, trips twice
        assert_eq!(stats.percent_by_section[&BoxKey::Trips], 66.67);
        assert_eq!(stats.percent_by_section[&BoxKey::TwoPair], 33.33);
        assert_eq!(stats.percent_by_section[&BoxKey::FourKind], 50.0);
        assert_eq!(stats.percent_by_section[&BoxKey::Aa], 25.0);
        assert_eq!(stats.percent_by_section[&BoxKey::SuitedCombo], 25.0);
        assert_eq!(stats.percent[&BoxKey::Trips], 50.0);
    }

    #[test]
    fn test_filter_without_matches() {
        let rounds = vec![make_round("2c", &[BoxKey::Draw, BoxKey::Trips])];
        let stats = card_statistics(&rounds, Some(card("As")));
        assert_eq!(stats.total, 0);
        assert_eq!(stats.percent[&BoxKey::Draw], 0.0);
    }

    #[test]
    fn test_global_top_cards() {
        let rounds = vec![
            make_round("Kh", &[BoxKey::Draw]),
            make_round("As", &[BoxKey::Draw]),
            make_round("As", &[BoxKey::Draw]),
            make_round("2c", &[BoxKey::Draw]),
            make_round("Kh", &[BoxKey::Draw]),
            make_round("Qd", &[BoxKey::Draw]),
        ];
        let top = global_top_cards(&rounds, 3);
        assert_eq!(
            top,
            vec![
                CardCount { card: card("Kh"), count: 2 },
                CardCount { card: card("As"), count: 2 },
                CardCount { card: card("2c"), count: 1 },
            ]
        );
    }

    #[test]
    fn test_stats_json_shape() {
        let rounds = vec![make_round("As", &[BoxKey::CowboyWin, BoxKey::Trips])];
        let json = serde_json::to_value(card_statistics(&rounds, None)).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["counts"]["cowboy_win"], 1);
        assert_eq!(json["percent_by_section"]["trips"], 100.0);
    }

    proptest! {
        #[test]
        fn prop_top_sections_sum_to_hundred(tops in proptest::collection::vec(0usize..3, 1..60)) {
            let rounds: Vec<Round> = tops
                .iter()
                .map(|&i| make_round("9s", &[BoxKey::TOP[i], BoxKey::TwoPair]))
                .collect();
            let stats = card_statistics(&rounds, None);
            let sum: f64 = BoxKey::TOP.iter().map(|k| stats.percent_by_section[k]).sum();
            prop_assert!((sum - 100.0).abs() < 0.05, "sum = {}", sum);
        }
    }
}
