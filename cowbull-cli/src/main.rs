mod analysis;
mod config;
mod display;
mod import;
mod snapshot;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::audit::audit_rounds;
use crate::analysis::cycle::predict_next_slots;
use crate::analysis::minutes::{
    best_card_for_slot, box_outlook, bucket_histogram, minute_histogram, top_n_cards, OutlookLimits,
};
use crate::analysis::{card_statistics, global_top_cards};
use crate::config::{AppConfig, DEFAULT_CONFIG_FILE};
use crate::display::{
    display_audit, display_best, display_boxes, display_card_rates, display_dashboard,
    display_import_summary, display_minutes, display_prediction, display_rounds, display_saved,
    display_stats, display_summary, display_top_cards,
};
use crate::import::{
    build_slot_histories, check_export_target, export_rounds_json, export_slots_json, import_legacy,
    SlotSource,
};
use crate::snapshot::{open_store, Snapshot};
use cowbull_db::db::{clear_all, count_rounds, count_slots, find_round};
use cowbull_db::models::{validate_round, BoxColor, BoxKey, Card};
use cowbull_db::rusqlite::Connection;
use cowbull_db::slot::{parse_slot, slot_of, Clock, SystemClock};
use cowbull_db::store::{record_round, RoundStore, SlotHistoryStore};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SlotBox {
    Aa,
    FourKind,
}

impl From<SlotBox> for BoxKey {
    fn from(b: SlotBox) -> Self {
        match b {
            SlotBox::Aa => BoxKey::Aa,
            SlotBox::FourKind => BoxKey::FourKind,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportKind {
    Rounds,
    Slots,
}

#[derive(Parser)]
#[command(name = "cowbull", about = "Cowboy vs Bull round recorder and slot predictor")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Database path (overrides the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the box catalog
    Boxes {
        #[arg(long)]
        json: bool,
    },

    /// Record a round
    Save {
        /// First revealed card (e.g. As, Th)
        #[arg(short, long)]
        card: String,

        /// Selected boxes (e.g. draw trips four_kind)
        boxes: Vec<String>,
    },

    /// Box frequencies, for one first card or all rounds
    Stats {
        #[arg(short, long)]
        card: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Most frequent first cards
    TopCards {
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Occurrences per minute of day for a slot box
    Minutes {
        #[arg(short, long = "box")]
        key: SlotBox,

        /// Bucket size in minutes
        #[arg(short, long, default_value = "1", allow_hyphen_values = true)]
        agg: i64,

        /// Draw a line chart instead of a table
        #[arg(long)]
        chart: bool,

        #[arg(long)]
        json: bool,
    },

    /// Most frequent cards for a slot box
    TopBox {
        #[arg(short, long = "box")]
        key: SlotBox,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Best card at one slot
    Best {
        #[arg(short, long = "box")]
        key: SlotBox,

        /// Slot key (HH:MM)
        #[arg(short, long)]
        slot: String,

        #[arg(short, long)]
        min_samples: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Next slots in the daily cycle
    Predict {
        #[arg(short, long = "box")]
        key: SlotBox,

        #[arg(short, long)]
        count: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Overview of statistics and predictions
    Dashboard,

    /// List the latest rounds
    List {
        #[arg(short, long, default_value = "50")]
        last: u32,
    },

    /// Delete a round
    Delete { round_id: String },

    /// Delete every round and both slot histories
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete one slot key from a slot box
    SlotDelete {
        #[arg(short, long = "box")]
        key: SlotBox,

        #[arg(short, long)]
        slot: String,
    },

    /// Round and slot counts
    Summary,

    /// Write rounds or slot histories as legacy JSON
    Export {
        #[arg(short, long, default_value = "rounds")]
        what: ExportKind,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import legacy data.json / hour.json
    Import {
        #[arg(short, long, default_value = "data.json")]
        data: PathBuf,

        #[arg(long)]
        hour: Option<PathBuf>,

        /// Derive slot histories from round timestamps
        #[arg(long, conflicts_with = "hour")]
        rebuild_slots: bool,
    },

    /// Recompute slot histories from stored round timestamps
    RebuildSlots,

    /// Integrity report over stored rounds
    Audit,

    /// Print the database path
    DbPath,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    let path = cli.db.clone().unwrap_or_else(|| config.resolved_db_path());
    let clock = SystemClock::new(config.utc_offset_hours)?;

    let read = || Snapshot::new(open_store(&path));

    match cli.command {
        Command::Boxes { json } => cmd_boxes(json),
        Command::Save { card, boxes } => cmd_save(&open_store(&path)?, &clock, &card, &boxes),
        Command::Stats { card, json } => cmd_stats(&read(), card.as_deref(), json),
        Command::TopCards { limit, json } => {
            cmd_top_cards(&read(), limit.unwrap_or(config.top_cards_limit), json)
        }
        Command::Minutes { key, agg, chart, json } => cmd_minutes(&read(), key.into(), agg, chart, json),
        Command::TopBox { key, limit, json } => {
            cmd_top_box(&read(), key.into(), limit.unwrap_or(config.top_box_limit), json)
        }
        Command::Best {
            key,
            slot,
            min_samples,
            json,
        } => cmd_best(
            &read(),
            key.into(),
            &slot,
            min_samples.unwrap_or(config.min_samples),
            json,
        ),
        Command::Predict { key, count, json } => cmd_predict(
            &read(),
            &clock,
            key.into(),
            count.unwrap_or(config.predict_count),
            json,
        ),
        Command::Dashboard => cmd_dashboard(&read(), &clock, &config),
        Command::List { last } => cmd_list(&read(), last),
        Command::Delete { round_id } => cmd_delete(&open_store(&path)?, &round_id),
        Command::Clear { yes } => cmd_clear(&open_store(&path)?, yes),
        Command::SlotDelete { key, slot } => cmd_slot_delete(&open_store(&path)?, key.into(), &slot),
        Command::Summary => cmd_summary(&open_store(&path)?),
        Command::Export { what, output } => {
            cmd_export(&open_store(&path)?, what, output.as_deref(), &path)
        }
        Command::Import {
            data,
            hour,
            rebuild_slots,
        } => {
            let slots = match (&hour, rebuild_slots) {
                (_, true) => SlotSource::Rebuild,
                (Some(hour), false) => SlotSource::HourFile(hour.as_path()),
                (None, false) => SlotSource::Keep,
            };
            let result = import_legacy(&open_store(&path)?, &data, slots, &clock.offset())?;
            display_import_summary(&result);
            Ok(())
        }
        Command::RebuildSlots => cmd_rebuild_slots(&open_store(&path)?, &clock),
        Command::Audit => {
            display_audit(&audit_rounds(&read().rounds()));
            Ok(())
        }
        Command::DbPath => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Cannot serialize output")?);
    Ok(())
}

#[derive(Serialize)]
struct BoxInfo {
    key: BoxKey,
    label: &'static str,
    payout: &'static str,
    color: BoxColor,
}

fn cmd_boxes(json: bool) -> Result<()> {
    if json {
        let catalog: Vec<BoxInfo> = BoxKey::ALL
            .iter()
            .map(|&key| BoxInfo {
                key,
                label: key.label(),
                payout: key.payout(),
                color: key.color(),
            })
            .collect();
        return print_json(&catalog);
    }
    display_boxes(&BoxKey::ALL);
    Ok(())
}

fn cmd_save(conn: &Connection, clock: &SystemClock, card: &str, boxes: &[String]) -> Result<()> {
    let submission = match validate_round(card, boxes) {
        Ok(submission) => submission,
        Err(e) => bail!("Round rejected: {e}"),
    };

    let tx = conn
        .unchecked_transaction()
        .context("Cannot start transaction")?;
    let round = record_round(&*tx, submission, Uuid::new_v4().to_string(), clock.now_local())?;
    tx.commit().context("Failed to save round")?;

    display_saved(&round);
    Ok(())
}

fn cmd_stats(store: &Snapshot, card: Option<&str>, json: bool) -> Result<()> {
    let filter: Option<Card> = card.map(str::parse::<Card>).transpose()?;
    let stats = card_statistics(&store.rounds(), filter);
    if json {
        return print_json(&stats);
    }
    display_stats(&stats, filter);
    Ok(())
}

fn cmd_top_cards(store: &Snapshot, limit: usize, json: bool) -> Result<()> {
    let top = global_top_cards(&store.rounds(), limit);
    if json {
        return print_json(&top);
    }
    display_top_cards(&top);
    Ok(())
}

fn cmd_minutes(store: &Snapshot, key: BoxKey, agg: i64, chart: bool, json: bool) -> Result<()> {
    let agg = usize::try_from(agg).unwrap_or(1);
    let series = bucket_histogram(&minute_histogram(&store.slot_box(key)), agg);
    if json {
        return print_json(&series);
    }
    display_minutes(key, &series, chart);
    Ok(())
}

fn cmd_top_box(store: &Snapshot, key: BoxKey, limit: usize, json: bool) -> Result<()> {
    let top = top_n_cards(&store.slot_box(key), limit);
    if json {
        return print_json(&top);
    }
    display_card_rates(key, &top);
    Ok(())
}

fn cmd_best(store: &Snapshot, key: BoxKey, slot: &str, min_samples: u32, json: bool) -> Result<()> {
    if parse_slot(slot).is_none() {
        bail!("Invalid slot '{slot}', expected HH:MM");
    }
    let best = best_card_for_slot(&store.slot_box(key), slot, min_samples);
    if json {
        return print_json(&best);
    }
    display_best(key, slot, best.as_ref());
    Ok(())
}

fn cmd_predict(store: &Snapshot, clock: &SystemClock, key: BoxKey, count: usize, json: bool) -> Result<()> {
    let next = predict_next_slots(&store.slot_box(key), clock, count);
    if json {
        return print_json(&next);
    }
    display_prediction(key, next.as_deref());
    Ok(())
}

fn cmd_dashboard(store: &Snapshot, clock: &SystemClock, config: &AppConfig) -> Result<()> {
    let rounds = store.rounds();
    let stats = card_statistics(&rounds, None);
    let top = global_top_cards(&rounds, config.top_cards_limit);

    let limits = OutlookLimits {
        recent: config.recent_slots,
        predict: config.predict_count,
        top: config.top_box_limit,
        min_samples: config.min_samples,
    };
    let outlooks: Vec<_> = BoxKey::SLOT_TRACKED
        .iter()
        .map(|&key| box_outlook(key, &store.slot_box(key), clock, limits))
        .collect();

    display_dashboard(&stats, &top, &outlooks);
    Ok(())
}

fn cmd_list(store: &Snapshot, last: u32) -> Result<()> {
    let rounds = store.last_rounds(last);
    if rounds.is_empty() {
        println!("No rounds yet. Record one with: cowbull save --card <card> <boxes>...");
        return Ok(());
    }
    display_rounds(&rounds);
    Ok(())
}

fn cmd_delete(conn: &Connection, round_id: &str) -> Result<()> {
    let Some(round) = find_round(conn, round_id)? else {
        println!("No round with id {round_id}.");
        return Ok(());
    };
    conn.delete_round(round_id)?;
    display_rounds(std::slice::from_ref(&round));
    println!("Round {round_id} deleted.");
    Ok(())
}

fn cmd_clear(conn: &Connection, yes: bool) -> Result<()> {
    if !yes {
        let confirm = prompt("Delete every round and slot history? (y/n) : ")?;
        if confirm.to_lowercase() != "y" {
            println!("Cancelled.");
            return Ok(());
        }
    }
    clear_all(conn)?;
    println!("All data cleared.");
    Ok(())
}

fn cmd_slot_delete(conn: &Connection, key: BoxKey, slot: &str) -> Result<()> {
    if conn.delete_slot(key, slot)? {
        println!("Slot {slot} removed from {key}.");
    } else {
        println!("{key} has no slot {slot}.");
    }
    Ok(())
}

fn cmd_summary(conn: &Connection) -> Result<()> {
    let rounds = count_rounds(conn).context("Cannot read rounds")?;
    let slots = BoxKey::SLOT_TRACKED
        .iter()
        .map(|&key| -> Result<(BoxKey, u32)> { Ok((key, count_slots(conn, key)?)) })
        .collect::<Result<Vec<_>>>()
        .context("Cannot read slot histories")?;
    display_summary(rounds, &slots);
    Ok(())
}

fn cmd_export(conn: &Connection, what: ExportKind, output: Option<&Path>, db: &Path) -> Result<()> {
    let json = match what {
        ExportKind::Rounds => export_rounds_json(&conn.list_rounds()?)?,
        ExportKind::Slots => export_slots_json(
            &conn.get_box(BoxKey::Aa)?,
            &conn.get_box(BoxKey::FourKind)?,
        )?,
    };

    match output {
        Some(path) => {
            check_export_target(path, db)?;
            std::fs::write(path, json).with_context(|| format!("Cannot write {:?}", path))?;
            log::info!("exported {:?} to {}", what, path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_rebuild_slots(conn: &Connection, clock: &SystemClock) -> Result<()> {
    let rounds = conn.list_rounds()?;
    let offset = clock.offset();
    let histories = build_slot_histories(rounds.iter().filter_map(|round| {
        round
            .recorded_at
            .map(|t| (round, slot_of(&t.with_timezone(&offset))))
    }));

    let tx = conn
        .unchecked_transaction()
        .context("Cannot start transaction")?;
    for (key, history) in &histories {
        tx.replace_box(*key, history)?;
        println!("{key}: {} slots, {} cards", history.len(), history.total_cards());
    }
    tx.commit().context("Failed to rebuild slot histories")?;
    Ok(())
}

fn prompt(msg: &str) -> Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Cannot read input")?;
    Ok(input.trim().to_string())
}
