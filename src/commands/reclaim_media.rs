use anyhow::Result;

use crate::commands::CommandReport;
use crate::commands::retire::run_selection;
use crate::tier::interrupt::Interrupt;
use crate::tier::policy::Selection;

pub fn run(dry_run: bool, interrupt: Interrupt) -> Result<CommandReport> {
    run_selection("reclaim-media", Selection::MediaOnly, dry_run, interrupt)
}
