use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RANKS: &str = "23456789TJQKA";
pub const SUITS: [char; 4] = ['h', 'd', 'c', 's'];

/// A first-revealed card, stored as its two-character code (`As`, `Th`, `2c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Card {
    rank: char,
    suit: char,
}

impl Card {
    pub fn rank(&self) -> char {
        self.rank
    }

    pub fn suit(&self) -> char {
        self.suit
    }

    pub fn is_red(&self) -> bool {
        matches!(self.suit, 'h' | 'd')
    }

    pub fn rank_label(&self) -> String {
        match self.rank {
            'T' => "10".to_string(),
            r => r.to_string(),
        }
    }

    pub fn suit_symbol(&self) -> char {
        match self.suit {
            'h' => '♥',
            'd' => '♦',
            'c' => '♣',
            _ => '♠',
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

impl FromStr for Card {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let (Some(rank), Some(suit), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(ValidationError::UnknownCard(s.to_string()));
        };
        let rank = rank.to_ascii_uppercase();
        let suit = suit.to_ascii_lowercase();
        if !RANKS.contains(rank) || !SUITS.contains(&suit) {
            return Err(ValidationError::UnknownCard(s.to_string()));
        }
        Ok(Card { rank, suit })
    }
}

impl TryFrom<String> for Card {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Card> for String {
    fn from(card: Card) -> Self {
        card.to_string()
    }
}

/// All 52 cards, rank-major then suit-minor.
pub fn all_cards() -> Vec<Card> {
    RANKS
        .chars()
        .flat_map(|rank| SUITS.iter().map(move |&suit| Card { rank, suit }))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxGroup {
    Top,
    Right,
    Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxColor {
    Default,
    Orange,
    Red,
}

/// Outcome categories, declared in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxKey {
    CowboyWin,
    Draw,
    BullWin,
    SuitedCombo,
    PairAny,
    Aa,
    HighOnepair,
    TwoPair,
    Trips,
    FullHouse,
    FourKind,
}

impl BoxKey {
    pub const ALL: [BoxKey; 11] = [
        BoxKey::CowboyWin,
        BoxKey::Draw,
        BoxKey::BullWin,
        BoxKey::SuitedCombo,
        BoxKey::PairAny,
        BoxKey::Aa,
        BoxKey::HighOnepair,
        BoxKey::TwoPair,
        BoxKey::Trips,
        BoxKey::FullHouse,
        BoxKey::FourKind,
    ];

    pub const TOP: [BoxKey; 3] = [BoxKey::CowboyWin, BoxKey::Draw, BoxKey::BullWin];

    /// RIGHT members that exclude each other; `FourKind` overlays them.
    pub const RIGHT_EXCLUSIVE: [BoxKey; 4] = [
        BoxKey::HighOnepair,
        BoxKey::TwoPair,
        BoxKey::Trips,
        BoxKey::FullHouse,
    ];

    /// Boxes whose cards are also bucketed by time-of-day.
    pub const SLOT_TRACKED: [BoxKey; 2] = [BoxKey::Aa, BoxKey::FourKind];

    pub fn as_str(&self) -> &'static str {
        match self {
            BoxKey::CowboyWin => "cowboy_win",
            BoxKey::Draw => "draw",
            BoxKey::BullWin => "bull_win",
            BoxKey::SuitedCombo => "suited_combo",
            BoxKey::PairAny => "pair_any",
            BoxKey::Aa => "aa",
            BoxKey::HighOnepair => "high_onepair",
            BoxKey::TwoPair => "two_pair",
            BoxKey::Trips => "trips",
            BoxKey::FullHouse => "full_house",
            BoxKey::FourKind => "four_kind",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BoxKey::CowboyWin => "Cowboy",
            BoxKey::Draw => "Draw",
            BoxKey::BullWin => "Bull",
            BoxKey::SuitedCombo => "Straight / Flush / Straight flush",
            BoxKey::PairAny => "Pair",
            BoxKey::Aa => "AA",
            BoxKey::HighOnepair => "High card / One pair",
            BoxKey::TwoPair => "Two pair",
            BoxKey::Trips => "Three of a kind",
            BoxKey::FullHouse => "Full house",
            BoxKey::FourKind => "Four of a kind",
        }
    }

    pub fn payout(&self) -> &'static str {
        match self {
            BoxKey::CowboyWin | BoxKey::BullWin => "x2",
            BoxKey::Draw | BoxKey::FullHouse => "x20",
            BoxKey::SuitedCombo => "x1.66",
            BoxKey::PairAny => "x8.5",
            BoxKey::Aa => "x100",
            BoxKey::HighOnepair => "x2.2",
            BoxKey::TwoPair => "x3.1",
            BoxKey::Trips => "x4.7",
            BoxKey::FourKind => "x248",
        }
    }

    pub fn color(&self) -> BoxColor {
        match self {
            BoxKey::Draw | BoxKey::FullHouse => BoxColor::Orange,
            BoxKey::FourKind => BoxColor::Red,
            _ => BoxColor::Default,
        }
    }

    pub fn group(&self) -> BoxGroup {
        match self {
            BoxKey::CowboyWin | BoxKey::Draw | BoxKey::BullWin => BoxGroup::Top,
            BoxKey::HighOnepair
            | BoxKey::TwoPair
            | BoxKey::Trips
            | BoxKey::FullHouse
            | BoxKey::FourKind => BoxGroup::Right,
            BoxKey::SuitedCombo | BoxKey::PairAny | BoxKey::Aa => BoxGroup::Side,
        }
    }

    pub fn is_slot_tracked(&self) -> bool {
        Self::SLOT_TRACKED.contains(self)
    }
}

impl fmt::Display for BoxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoxKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown box key '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Round {
    pub round_id: String,
    pub first_card: Card,
    pub selected_boxes: Vec<BoxKey>,
    #[serde(rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<FixedOffset>>,
}

impl Round {
    pub fn contains(&self, key: BoxKey) -> bool {
        self.selected_boxes.contains(&key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing card: pick the first revealed card")]
    MissingCard,

    #[error("unknown card '{0}'")]
    UnknownCard(String),

    #[error("no top category selected (cowboy_win, draw, bull_win)")]
    NoTop,

    #[error("more than one top category selected")]
    MultipleTop,

    #[error("no right category selected (high_onepair, two_pair, trips, full_house, four_kind)")]
    NoRight,

    #[error("more than one non-four-kind right category selected")]
    MultipleRight,
}

/// A submission that passed validation, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub first_card: Card,
    pub selected_boxes: Vec<BoxKey>,
}

/// Deduplicates in first-seen order and drops keys outside the catalog.
pub fn normalize_boxes<S: AsRef<str>>(raw: &[S]) -> Vec<BoxKey> {
    let mut boxes = Vec::with_capacity(raw.len());
    for key in raw.iter().filter_map(|s| s.as_ref().parse::<BoxKey>().ok()) {
        if !boxes.contains(&key) {
            boxes.push(key);
        }
    }
    boxes
}

pub fn validate_round<S: AsRef<str>>(first_card: &str, raw_boxes: &[S]) -> Result<Submission, ValidationError> {
    if first_card.trim().is_empty() {
        return Err(ValidationError::MissingCard);
    }
    let first_card: Card = first_card.parse()?;

    let selected_boxes = normalize_boxes(raw_boxes);

    let top = selected_boxes.iter().filter(|b| b.group() == BoxGroup::Top).count();
    let right = selected_boxes.iter().filter(|b| b.group() == BoxGroup::Right).count();
    let right_exclusive = selected_boxes
        .iter()
        .filter(|b| BoxKey::RIGHT_EXCLUSIVE.contains(b))
        .count();

    if top == 0 {
        return Err(ValidationError::NoTop);
    }
    if top > 1 {
        return Err(ValidationError::MultipleTop);
    }
    if right == 0 {
        return Err(ValidationError::NoRight);
    }
    if right_exclusive > 1 {
        return Err(ValidationError::MultipleRight);
    }

    Ok(Submission {
        first_card,
        selected_boxes,
    })
}
