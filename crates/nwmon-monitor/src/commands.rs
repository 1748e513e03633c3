//! Line-oriented control commands for the daemon.

use crate::dispatch::ServiceDispatcher;
use crate::error::{MonitorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Scan,
    Forget { device_id: String },
    Watch { device_id: String, watched: bool },
    Name { device_id: String, nickname: Option<String> },
    Status,
}

impl ControlCommand {
    /// Parse one input line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let device_id = words.next().map(String::from);
        let rest: Vec<&str> = words.collect();

        let require_id = |device_id: Option<String>| {
            device_id.ok_or_else(|| MonitorError::InvalidCommand(format!("{verb} needs a device id")))
        };

        let command = match verb.as_str() {
            "scan" => Self::Scan,
            "status" => Self::Status,
            "forget" => Self::Forget {
                device_id: require_id(device_id)?,
            },
            "watch" => {
                let watched = match rest.first().map(|w| w.to_ascii_lowercase()).as_deref() {
                    None | Some("on") | Some("true") | Some("yes") => true,
                    Some("off") | Some("false") | Some("no") => false,
                    Some(other) => {
                        return Err(MonitorError::InvalidCommand(format!(
                            "watch expects on or off, got {other:?}"
                        )))
                    }
                };
                Self::Watch {
                    device_id: require_id(device_id)?,
                    watched,
                }
            }
            "name" => Self::Name {
                device_id: require_id(device_id)?,
                nickname: Some(rest.join(" ")).filter(|n| !n.is_empty()),
            },
            other => {
                return Err(MonitorError::InvalidCommand(format!("unknown command {other:?}")))
            }
        };
        Ok(Some(command))
    }

    /// Run the command and describe the result.
    pub async fn execute(&self, dispatcher: &ServiceDispatcher) -> Result<String> {
        match self {
            Self::Scan => {
                dispatcher.full_scan().await;
                Ok("full scan complete".to_string())
            }
            Self::Forget { device_id } => {
                let record = dispatcher.forget_device(device_id).await?;
                Ok(format!("forgot {}", record.display_name()))
            }
            Self::Watch { device_id, watched } => {
                let record = dispatcher.watch_device(device_id, *watched).await?;
                let state = if record.watched { "watched" } else { "unwatched" };
                Ok(format!("{} is now {state}", record.display_name()))
            }
            Self::Name { device_id, nickname } => {
                let record = dispatcher.name_device(device_id, nickname.clone()).await?;
                Ok(format!("{} renamed", record.display_name()))
            }
            Self::Status => Ok(serde_json::to_string_pretty(&dispatcher.snapshots())?),
        }
    }
}
