//! Subcommand execution: channel assembly from config + stored record, and output.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{WrapErr, eyre};
use loadcell_config::{ChannelCfg, Config, MAX_CHANNELS, MAX_WINDOW};
use loadcell_core::store::ENTRY_COUNT;
use loadcell_core::{
    Channel, ChannelSettings, ConfigStore, Phase, ScaleEntry, ScaleError, StoreError,
};
use loadcell_hardware::FileFlash;

use crate::backend::Rig;
use crate::cli::Commands;

const _: () = assert!(MAX_CHANNELS == ENTRY_COUNT);

type Entries = [ScaleEntry; ENTRY_COUNT];

pub struct Ctx<'a> {
    pub cfg: &'a Config,
    pub json: bool,
    pub shutdown: Arc<AtomicBool>,
}

impl Ctx<'_> {
    fn stopped(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn emit(&self, value: serde_json::Value, text: impl FnOnce() -> String) {
        if self.json {
            println!("{value}");
        } else {
            println!("{}", text());
        }
    }
}

fn open_store(cfg: &Config) -> eyre::Result<ConfigStore<FileFlash>> {
    let s = &cfg.storage;
    let flash = FileFlash::open(&s.path, s.capacity, s.sector_size)
        .map_err(|e| StoreError::Storage(e.to_string()))
        .wrap_err_with(|| format!("open storage image {}", s.path))?;
    Ok(ConfigStore::new(flash)?)
}

/// Stored entries, or `None` when the sector holds no valid record.
fn load_entries(store: &mut ConfigStore<FileFlash>) -> eyre::Result<Option<Entries>> {
    Ok(store.load().wrap_err("load calibration record")?)
}

/// A valid stored record wins; otherwise the channel's `calibration` table, if any.
fn initial_entry(stored: Option<&Entries>, idx: usize, ch: &ChannelCfg) -> Option<ScaleEntry> {
    match stored {
        Some(entries) => Some(entries[idx]),
        None => ch.calibration.as_ref().map(ScaleEntry::from),
    }
}

fn open_channel(
    cfg: &Config,
    key: &str,
    stored: Option<&Entries>,
) -> eyre::Result<(usize, Channel<Rig, MAX_WINDOW>)> {
    let (idx, ch_cfg) = cfg
        .channel(key)
        .ok_or_else(|| eyre!("unknown channel '{key}'"))?;
    let rig = Rig::open(ch_cfg)?;
    let mut builder = Channel::builder()
        .name(ch_cfg.name.clone())
        .settings(ChannelSettings::from(ch_cfg));
    if let Some(entry) = initial_entry(stored, idx, ch_cfg) {
        builder = builder.calibration(entry);
    }
    let ch = builder.source(rig).build::<MAX_WINDOW>()?;
    tracing::debug!(channel = %ch.name(), ?ch, "channel ready");
    Ok((idx, ch))
}

pub fn run(ctx: &Ctx<'_>, cmd: &Commands) -> eyre::Result<()> {
    match cmd {
        Commands::Raw { channel, count } => raw(ctx, channel, *count),
        Commands::Tare { channel, samples } => tare(ctx, channel, *samples),
        Commands::Calibrate {
            channel,
            grams,
            samples,
            place_ms,
        } => calibrate(ctx, channel, *grams, *samples, *place_ms),
        Commands::Weigh {
            channel,
            count,
            batch,
        } => weigh(ctx, channel, *count, *batch),
        Commands::Show => show(ctx),
        Commands::EraseConfig => erase_config(ctx),
    }
}

fn raw(ctx: &Ctx<'_>, key: &str, count: u32) -> eyre::Result<()> {
    let (_, mut ch) = open_channel(ctx.cfg, key, None)?;
    for i in 0..count {
        if ctx.stopped() {
            break;
        }
        let counts = ch
            .read_raw()
            .wrap_err_with(|| format!("read channel '{}'", ch.name()))?;
        ctx.emit(
            serde_json::json!({ "channel": ch.name(), "index": i, "counts": counts }),
            || counts.to_string(),
        );
    }
    Ok(())
}

fn tare(ctx: &Ctx<'_>, key: &str, samples: Option<i32>) -> eyre::Result<()> {
    let mut store = open_store(ctx.cfg)?;
    let stored = load_entries(&mut store)?;
    let (idx, mut ch) = open_channel(ctx.cfg, key, stored.as_ref())?;
    let samples = samples.unwrap_or(ch.settings().tare_samples);

    let offset = ch
        .tare(samples)
        .wrap_err_with(|| format!("tare channel '{}'", ch.name()))?;

    let mut entries = stored.unwrap_or_default();
    entries[idx] = ch.to_entry();
    store.save(&entries).wrap_err("save calibration record")?;

    ctx.emit(
        serde_json::json!({ "channel": ch.name(), "offset_counts": offset }),
        || format!("{}: tared, offset {offset} counts", ch.name()),
    );
    Ok(())
}

fn calibrate(
    ctx: &Ctx<'_>,
    key: &str,
    grams: f32,
    samples: Option<i32>,
    place_ms: u64,
) -> eyre::Result<()> {
    // reject before taring so a typo does not cost a tare cycle
    if !(grams.is_finite() && grams > 0.0) {
        return Err(ScaleError::InvalidInput("known weight must be positive"))
            .wrap_err("calibrate");
    }

    let mut store = open_store(ctx.cfg)?;
    let stored = load_entries(&mut store)?;
    let (idx, mut ch) = open_channel(ctx.cfg, key, stored.as_ref())?;
    let name = ch.name().to_string();

    let offset = ch
        .tare(ch.settings().tare_samples)
        .wrap_err_with(|| format!("tare channel '{name}'"))?;

    if place_ms > 0 {
        if !ctx.json {
            println!("Place {grams} g on '{name}'...");
        }
        std::thread::sleep(Duration::from_millis(place_ms));
    }
    ch.source_mut().weight_placed();

    let samples = samples.unwrap_or(ch.settings().calibrate_samples);
    let scale = ch
        .calibrate(grams, samples)
        .wrap_err_with(|| format!("calibrate channel '{name}'"))?;

    let mut entries = stored.unwrap_or_default();
    entries[idx] = ch.to_entry();
    store.save(&entries).wrap_err("save calibration record")?;

    ctx.emit(
        serde_json::json!({
            "channel": name,
            "offset_counts": offset,
            "counts_per_gram": scale,
            "known_grams": grams,
        }),
        || format!("{name}: calibrated, offset {offset} counts, {scale:.4} counts/g"),
    );
    Ok(())
}

fn weigh(ctx: &Ctx<'_>, key: &str, count: u32, batch: bool) -> eyre::Result<()> {
    let mut store = open_store(ctx.cfg)?;
    let stored = load_entries(&mut store)?;
    let (_, mut ch) = open_channel(ctx.cfg, key, stored.as_ref())?;
    let phase = ch.calibration().phase();
    if phase != Phase::Calibrated {
        tracing::warn!(channel = %ch.name(), ?phase, "channel not calibrated; grams assume 1 count/g");
    }

    let mut i: u32 = 0;
    while count == 0 || i < count {
        if ctx.stopped() {
            tracing::info!(channel = %ch.name(), readings = i, "interrupted");
            break;
        }
        let grams = if batch {
            ch.read_weight_filtered()
        } else {
            ch.read_weight_trimmed_mavg()
        }
        .wrap_err_with(|| format!("weigh channel '{}'", ch.name()))?;
        ctx.emit(
            serde_json::json!({
                "channel": ch.name(),
                "index": i,
                "grams": grams,
                "phase": format!("{phase:?}"),
            }),
            || format!("{grams:.2} g"),
        );
        i = i.saturating_add(1);
    }
    Ok(())
}

fn show(ctx: &Ctx<'_>) -> eyre::Result<()> {
    let mut store = open_store(ctx.cfg)?;
    let Some(entries) = load_entries(&mut store)? else {
        ctx.emit(serde_json::json!({ "record": null }), || {
            "no calibration record stored".to_string()
        });
        return Ok(());
    };
    for (i, e) in entries.iter().enumerate() {
        let name = ctx
            .cfg
            .channels
            .get(i)
            .map_or_else(|| format!("#{i}"), |c| c.name.clone());
        ctx.emit(
            serde_json::json!({
                "slot": i,
                "channel": name,
                "offset_counts": e.offset_counts,
                "counts_per_gram": e.counts_per_gram,
                "calibrated": e.has_valid_scale(),
            }),
            || {
                format!(
                    "{i} {name}: offset {} counts, {} counts/g",
                    e.offset_counts, e.counts_per_gram
                )
            },
        );
    }
    Ok(())
}

fn erase_config(ctx: &Ctx<'_>) -> eyre::Result<()> {
    let mut store = open_store(ctx.cfg)?;
    store.erase().wrap_err("erase calibration record")?;
    ctx.emit(serde_json::json!({ "erased": true }), || {
        "calibration record erased".to_string()
    });
    Ok(())
}
