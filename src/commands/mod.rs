pub mod ledger;
pub mod reclaim_media;
pub mod retire;
pub mod retire_aged;
pub mod service;
pub mod status;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            data: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    /// Attaches the machine-readable payload printed under `--json`.
    pub fn attach<T: Serialize>(&mut self, data: &T) {
        match serde_json::to_value(data) {
            Ok(value) => self.data = Some(value),
            Err(err) => self.issue(format!("failed to serialise report data: {err}")),
        }
    }
}
