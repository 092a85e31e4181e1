use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use textplots::{Chart, Plot, Shape};

use crate::analysis::audit::{AuditReport, Flagged, GroupAudit};
use crate::analysis::minutes::{BoxOutlook, CardRate, MinuteSeries};
use crate::analysis::{CardCount, CardStats};
use crate::import::ImportResult;
use cowbull_db::models::{BoxColor, BoxKey, Card, Round};

fn new_table<H: Into<comfy_table::Row>>(header: H) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn card_label(card: &Card) -> String {
    format!("{}{}", card.rank_label(), card.suit_symbol())
}

fn card_cell(card: &Card) -> Cell {
    let cell = Cell::new(card_label(card));
    if card.is_red() {
        cell.fg(Color::Red)
    } else {
        cell
    }
}

fn box_cell(key: BoxKey) -> Cell {
    let cell = Cell::new(key.label());
    match key.color() {
        BoxColor::Default => cell,
        BoxColor::Orange => cell.fg(Color::DarkYellow),
        BoxColor::Red => cell.fg(Color::Red),
    }
}

pub fn display_boxes(keys: &[BoxKey]) {
    let mut table = new_table(vec!["Key", "Label", "Payout", "Group"]);
    for &key in keys {
        table.add_row(vec![
            Cell::new(key.as_str()),
            box_cell(key),
            Cell::new(key.payout()),
            Cell::new(format!("{:?}", key.group())),
        ]);
    }
    println!("{table}");
}

pub fn display_saved(round: &Round) {
    println!("Round saved: {}", round.round_id);
    display_rounds(std::slice::from_ref(round));
}

pub fn display_rounds(rounds: &[Round]) {
    if rounds.is_empty() {
        println!("No rounds to show.");
        return;
    }

    let mut table = new_table(vec!["Round", "Card", "Boxes", "Recorded"]);
    for round in rounds {
        let boxes = round
            .selected_boxes
            .iter()
            .map(|b| b.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let recorded = round
            .recorded_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "—".to_string());
        table.add_row(vec![
            Cell::new(&round.round_id),
            card_cell(&round.first_card),
            Cell::new(boxes),
            Cell::new(recorded),
        ]);
    }
    println!("{table}");
}

pub fn display_stats(stats: &CardStats, filter: Option<Card>) {
    match filter {
        Some(card) => println!("\nStatistics for {} ({} rounds)\n", card_label(&card), stats.total),
        None => println!("\nStatistics over all rounds ({})\n", stats.total),
    }

    let mut table = new_table(vec!["Box", "Count", "% rounds", "% section"]);
    for key in BoxKey::ALL {
        table.add_row(vec![
            box_cell(key),
            Cell::new(stats.counts.get(&key).copied().unwrap_or(0)),
            Cell::new(format!("{:.2}", stats.percent.get(&key).copied().unwrap_or(0.0))),
            Cell::new(format!("{:.2}", stats.percent_by_section.get(&key).copied().unwrap_or(0.0))),
        ]);
    }
    println!("{table}");
}

pub fn display_top_cards(cards: &[CardCount]) {
    if cards.is_empty() {
        println!("No rounds recorded yet.");
        return;
    }

    let mut table = new_table(vec!["#", "Card", "Rounds"]);
    for (i, entry) in cards.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            card_cell(&entry.card),
            Cell::new(entry.count),
        ]);
    }
    println!("{table}");
}

pub fn display_card_rates(key: BoxKey, rates: &[CardRate]) {
    println!("\n── {} ──", key.label());
    if rates.is_empty() {
        println!("  (no history)");
        return;
    }

    let mut table = new_table(vec!["#", "Card", "Count", "Rate"]);
    for (i, rate) in rates.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            card_cell(&rate.card),
            Cell::new(format!("{}/{}", rate.count, rate.total)),
            Cell::new(format!("{:.2} %", rate.rate)),
        ]);
    }
    println!("{table}");
}

pub fn display_best(key: BoxKey, slot: &str, best: Option<&CardRate>) {
    match best {
        Some(rate) => println!(
            "{} @ {}: {} ({}/{}, {:.2} %)",
            key.label(),
            slot,
            card_label(&rate.card),
            rate.count,
            rate.total,
            rate.rate
        ),
        None => println!("{} @ {}: not enough samples", key.label(), slot),
    }
}

pub fn display_prediction(key: BoxKey, slots: Option<&[String]>) {
    match slots {
        Some(slots) => println!("{} next slots: {}", key.label(), slots.join(", ")),
        None => println!("{}: no history", key.label()),
    }
}

pub fn display_minutes(key: BoxKey, series: &MinuteSeries, chart: bool) {
    let total: u32 = series.counts.iter().sum();
    println!("\n{} per {} min ({} cards)\n", key.label(), series.agg, total);
    if total == 0 {
        println!("  (no history)");
        return;
    }

    if chart {
        let points: Vec<(f32, f32)> = series
            .counts
            .iter()
            .enumerate()
            .map(|(i, &count)| ((i * series.agg) as f32, count as f32))
            .collect();
        let y_max = series.counts.iter().copied().max().unwrap_or(1) as f32 + 0.5;
        let mut chart = Chart::new_with_y_range(120, 40, 0.0, 1440.0, 0.0, y_max);
        println!("{}", chart.lineplot(&Shape::Lines(&points)));
        return;
    }

    let mut table = new_table(vec!["From", "Cards", ""]);
    for (label, &count) in series.labels.iter().zip(&series.counts) {
        if count == 0 {
            continue;
        }
        table.add_row(vec![
            Cell::new(label),
            Cell::new(count),
            Cell::new("█".repeat(count.min(40) as usize)),
        ]);
    }
    println!("{table}");
}

pub fn display_dashboard(stats: &CardStats, top_cards: &[CardCount], outlooks: &[BoxOutlook]) {
    display_stats(stats, None);

    println!("\n── Top first cards ──");
    display_top_cards(top_cards);

    for outlook in outlooks {
        println!("\n══ {} ══", outlook.key.label());
        if outlook.recent.is_empty() {
            println!("  Recent slots: —");
        } else {
            println!("  Recent slots: {}", outlook.recent.join(", "));
        }

        match &outlook.upcoming {
            None => println!("  Next slots: no history"),
            Some(upcoming) => {
                let mut table = new_table(vec!["Next slot", "Best card", "Count", "Rate"]);
                for prediction in upcoming {
                    match &prediction.best {
                        Some(best) => table.add_row(vec![
                            Cell::new(&prediction.slot),
                            card_cell(&best.card),
                            Cell::new(format!("{}/{}", best.count, best.total)),
                            Cell::new(format!("{:.2} %", best.rate)),
                        ]),
                        None => table.add_row(vec![
                            Cell::new(&prediction.slot),
                            Cell::new("—"),
                            Cell::new("—"),
                            Cell::new("—"),
                        ]),
                    };
                }
                println!("{table}");
            }
        }

        display_card_rates(outlook.key, &outlook.top);
    }
}

pub fn display_summary(rounds: u32, slots: &[(BoxKey, u32)]) {
    println!("Rounds : {rounds}");
    for (key, count) in slots {
        println!("{:<7}: {count} slots", key.as_str());
    }
}

fn flagged_list(flagged: &[Flagged]) -> String {
    if flagged.is_empty() {
        return "—".to_string();
    }
    flagged
        .iter()
        .map(|(pos, id)| format!("#{pos} {id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn audit_rows(table: &mut Table, name: &str, group: &GroupAudit) {
    table.add_row(vec![
        Cell::new(name),
        Cell::new(group.none),
        Cell::new(group.exactly_one),
        Cell::new(group.more_than_one),
        Cell::new(group.at_least_one()),
    ]);
}

pub fn display_audit(report: &AuditReport) {
    println!("\nAudit over {} rounds\n", report.total);

    let mut table = new_table(vec!["Group", "None", "Exactly one", "More than one", "At least one"]);
    audit_rows(&mut table, "TOP", &report.top);
    audit_rows(&mut table, "RIGHT", &report.right);
    println!("{table}");

    println!("TOP missing        : {}", flagged_list(&report.top.missing));
    println!("TOP multiple       : {}", flagged_list(&report.top.multiple));
    println!("RIGHT missing      : {}", flagged_list(&report.right.missing));
    println!("RIGHT multiple     : {}", flagged_list(&report.right.multiple));
    println!("With four_kind     : {}", flagged_list(&report.four_kind));
    println!("Neither TOP/RIGHT  : {}", flagged_list(&report.neither));
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import finished:");
    println!("  Records read       : {}", result.total_records);
    println!("  Rounds             : {}", result.rounds);
    println!("  Inserted           : {}", result.inserted);
    println!("  Duplicates skipped : {}", result.skipped);
    if result.malformed > 0 {
        println!("  Malformed skipped  : {}", result.malformed);
    }
    if result.slot_cards > 0 {
        println!("  Slot cards written : {}", result.slot_cards);
    }
}
