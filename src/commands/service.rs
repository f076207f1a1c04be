use anyhow::Result;

use crate::commands::CommandReport;
use crate::tier::audit;
use crate::tier::config::load_config;
use crate::tier::paths::resolve_paths;
use crate::tier::service::{self, ServiceCommand};

pub fn run(command: ServiceCommand) -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let mut report = CommandReport::new(format!("service-{}", command.verb()));

    match service::control(&cfg.service, &paths.pid_file, command) {
        Ok(outcome) => {
            if !outcome.output.is_empty() {
                report.detail(format!("output={}", outcome.output));
            }
            report.detail(format!("service={}", outcome.probe.status.as_str()));
            if let Some(pid) = outcome.probe.pid {
                report.detail(format!("service.pid={pid}"));
            }
            audit::record(
                &paths.logs_dir,
                "service",
                command.verb(),
                &format!("status={}", outcome.probe.status.as_str()),
            );
            report.attach(&outcome);
        }
        Err(err) => {
            audit::record(&paths.logs_dir, "service", "error", &format!("{err:#}"));
            report.issue(format!("service {} failed: {err:#}", command.verb()));
        }
    }
    Ok(report)
}
