use std::collections::HashSet;

use cowbull_db::slot::{minute_of_day, slot_key_minutes, Clock};
use cowbull_db::store::BoxHistory;

/// Next `count` slots of a daily cycle built from historical slot keys,
/// starting with the first slot strictly after `now_minutes` and wrapping past
/// midnight. Entries repeat when `count` exceeds the number of distinct slots.
/// Keys come back exactly as stored so they can be looked up again.
///
/// Returns `None` when no key parses: there is nothing to predict from.
pub fn next_cycle_slots<I, S>(history: I, now_minutes: u16, count: usize) -> Option<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut day: Vec<(u16, String)> = Vec::new();
    for key in history {
        let key = key.as_ref();
        if let Some(minute) = slot_key_minutes(key) {
            if seen.insert(key.to_string()) {
                day.push((minute, key.to_string()));
            }
        }
    }
    day.sort_by_key(|(minute, _)| *minute);

    if day.is_empty() {
        return None;
    }

    let start = day.iter().position(|(m, _)| *m > now_minutes).unwrap_or(0);
    Some(
        (0..count)
            .map(|k| day[(start + k) % day.len()].1.clone())
            .collect(),
    )
}

/// Upcoming slots for a box, relative to the clock's current minute.
pub fn predict_next_slots<C: Clock>(history: &BoxHistory, clock: &C, count: usize) -> Option<Vec<String>> {
    let now = minute_of_day(&clock.now_local());
    next_cycle_slots(history.slot_keys(), now, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cowbull_db::slot::FixedClock;
    use proptest::prelude::*;

    #[test]
    fn test_wraps_after_last_slot() {
        let history = ["09:00", "09:00", "23:50"];
        let next = next_cycle_slots(history, 600, 3);
        assert_eq!(next, Some(vec!["23:50".to_string(), "09:00".to_string(), "23:50".to_string()]));
    }

    #[test]
    fn test_now_equal_to_slot_moves_on() {
        let history = ["08:00", "12:00", "18:00"];
        assert_eq!(next_cycle_slots(history, 720, 1), Some(vec!["18:00".to_string()]));
        assert_eq!(next_cycle_slots(history, 1080, 2), Some(vec!["08:00".to_string(), "12:00".to_string()]));
    }

    #[test]
    fn test_unordered_and_invalid_input() {
        let history = vec!["21:15", "garbage", "25:00", "07:05", "21:15"];
        assert_eq!(
            next_cycle_slots(&history, 0, 3),
            Some(vec!["07:05".to_string(), "21:15".to_string(), "07:05".to_string()])
        );
    }

    #[test]
    fn test_returns_stored_keys() {
        assert_eq!(next_cycle_slots(["7:05"], 360, 2), Some(vec!["7:05".to_string(), "7:05".to_string()]));

        let history = ["21:15", "7:5", "07:05"];
        assert_eq!(
            next_cycle_slots(history, 0, 3),
            Some(vec!["7:5".to_string(), "07:05".to_string(), "21:15".to_string()])
        );
    }

    #[test]
    fn test_no_history() {
        assert_eq!(next_cycle_slots(Vec::<String>::new(), 600, 3), None);
        assert_eq!(next_cycle_slots(["bad", "99:99"], 600, 3), None);
    }

    #[test]
    fn test_zero_count() {
        assert_eq!(next_cycle_slots(["10:00"], 0, 0), Some(Vec::new()));
    }

    #[test]
    fn test_predict_with_clock() {
        let mut history = BoxHistory::new();
        for slot in ["23:50", "09:00", "09:00", "bad"] {
            history.insert_empty(slot);
        }
        let clock = FixedClock::at(10, 0);
        assert_eq!(
            predict_next_slots(&history, &clock, 3),
            Some(vec!["23:50".to_string(), "09:00".to_string(), "23:50".to_string()])
        );
        assert_eq!(predict_next_slots(&BoxHistory::new(), &clock, 3), None);
    }

    proptest! {
        #[test]
        fn prop_prediction_len_and_membership(
            slots in proptest::collection::vec((0u8..24, 0u8..60), 1..20),
            now in 0u16..1440,
            count in 0usize..10,
        ) {
            let keys: Vec<String> = slots.iter().map(|(h, m)| format!("{:02}:{:02}", h, m)).collect();
            let next = next_cycle_slots(&keys, now, count).unwrap();
            prop_assert_eq!(next.len(), count);
            for slot in &next {
                prop_assert!(keys.contains(slot));
            }
        }
    }
}
