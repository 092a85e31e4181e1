use std::collections::HashSet;

use cowbull_db::models::{BoxGroup, BoxKey, Round};

/// A round flagged by the audit: its 1-based position in the history and its id.
pub type Flagged = (usize, String);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupAudit {
    pub none: usize,
    pub exactly_one: usize,
    pub more_than_one: usize,
    pub missing: Vec<Flagged>,
    pub multiple: Vec<Flagged>,
}

impl GroupAudit {
    pub fn at_least_one(&self) -> usize {
        self.exactly_one + self.more_than_one
    }

    fn record(&mut self, selected: usize, flagged: Flagged) {
        match selected {
            0 => {
                self.none += 1;
                self.missing.push(flagged);
            }
            1 => self.exactly_one += 1,
            _ => {
                self.more_than_one += 1;
                self.multiple.push(flagged);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditReport {
    pub total: usize,
    pub top: GroupAudit,
    pub right: GroupAudit,
    pub four_kind: Vec<Flagged>,
    pub neither: Vec<Flagged>,
}

/// Integrity check over stored rounds, mostly useful after importing legacy
/// data that never went through validation.
pub fn audit_rounds(rounds: &[Round]) -> AuditReport {
    let mut report = AuditReport {
        total: rounds.len(),
        ..Default::default()
    };

    for (i, round) in rounds.iter().enumerate() {
        let distinct: HashSet<BoxKey> = round.selected_boxes.iter().copied().collect();
        let top = distinct.iter().filter(|b| b.group() == BoxGroup::Top).count();
        let right = distinct.iter().filter(|b| b.group() == BoxGroup::Right).count();
        let flagged = (i + 1, round.round_id.clone());

        report.top.record(top, flagged.clone());
        report.right.record(right, flagged.clone());
        if distinct.contains(&BoxKey::FourKind) {
            report.four_kind.push(flagged.clone());
        }
        if top == 0 && right == 0 {
            report.neither.push(flagged);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::make_round;

    #[test]
    fn test_audit_counts() {
        let mut rounds = vec![
            make_round("As", &[BoxKey::Draw, BoxKey::Trips]),
            make_round("Kh", &[BoxKey::Draw, BoxKey::BullWin, BoxKey::FullHouse, BoxKey::FourKind]),
            make_round("2c", &[BoxKey::Aa]),
            make_round("Qd", &[BoxKey::CowboyWin]),
        ];
        for (i, round) in rounds.iter_mut().enumerate() {
            round.round_id = format!("r{}", i + 1);
        }

        let report = audit_rounds(&rounds);
        assert_eq!(report.total, 4);

        assert_eq!(report.top.exactly_one, 2);
        assert_eq!(report.top.more_than_one, 1);
        assert_eq!(report.top.none, 1);
        assert_eq!(report.top.at_least_one(), 3);
        assert_eq!(report.top.missing, vec![(3, "r3".to_string())]);
        assert_eq!(report.top.multiple, vec![(2, "r2".to_string())]);

        assert_eq!(report.right.exactly_one, 1);
        assert_eq!(report.right.more_than_one, 1);
        assert_eq!(report.right.none, 2);
        assert_eq!(report.right.missing, vec![(3, "r3".to_string()), (4, "r4".to_string())]);

        assert_eq!(report.four_kind, vec![(2, "r2".to_string())]);
        assert_eq!(report.neither, vec![(3, "r3".to_string())]);
    }

    #[test]
    fn test_audit_empty() {
        assert_eq!(audit_rounds(&[]), AuditReport::default());
    }
}
