use anyhow::Result;

use crate::commands::CommandReport;
use crate::commands::retire::run_selection_with;
use crate::tier::config::load_config;
use crate::tier::interrupt::Interrupt;
use crate::tier::paths::resolve_paths;
use crate::tier::policy::Selection;
use crate::tier::util::now_epoch_secs_f64;

const SECS_PER_DAY: f64 = 86_400.0;

pub fn cutoff_for(now: f64, max_days: u64) -> f64 {
    now - max_days as f64 * SECS_PER_DAY
}

pub fn run(max_days: Option<u64>, dry_run: bool, interrupt: Interrupt) -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let days = max_days.unwrap_or(cfg.sweep.max_cache_days);
    if days == 0 {
        anyhow::bail!("--max-days must be at least 1");
    }
    let cutoff = cutoff_for(now_epoch_secs_f64()?, days);

    let mut report = run_selection_with(
        &cfg,
        &paths,
        "retire-aged",
        Selection::AgedBefore { cutoff },
        dry_run,
        interrupt,
    )?;
    report.details.insert(0, format!("max_days={days}"));
    Ok(report)
}
