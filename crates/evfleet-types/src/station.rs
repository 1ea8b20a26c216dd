//! Station status and operator command vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a charge point as reported in StatusNotification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationStatus {
    Available,
    Charging,
    #[serde(rename = "SuspendedEV")]
    SuspendedEV,
    #[serde(rename = "SuspendedEVSE")]
    SuspendedEVSE,
    /// Anything not in the modeled set
    #[serde(other)]
    Unknown,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationStatus::Available => "Available",
            StationStatus::Charging => "Charging",
            StationStatus::SuspendedEV => "SuspendedEV",
            StationStatus::SuspendedEVSE => "SuspendedEVSE",
            StationStatus::Unknown => "Unknown",
        }
    }

    /// Busy holds exactly while charging
    pub fn is_busy(&self) -> bool {
        matches!(self, StationStatus::Charging)
    }

    /// Lenient parse; unrecognised names map to [`StationStatus::Unknown`]
    pub fn parse(name: &str) -> Self {
        match name {
            "Available" => StationStatus::Available,
            "Charging" => StationStatus::Charging,
            "SuspendedEV" => StationStatus::SuspendedEV,
            "SuspendedEVSE" => StationStatus::SuspendedEVSE,
            _ => StationStatus::Unknown,
        }
    }
}

impl Default for StationStatus {
    fn default() -> Self {
        StationStatus::Available
    }
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator command delivered to a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StationCommand {
    Start,
    Suspend,
    Finish,
}

impl StationCommand {
    /// Case-insensitive, whitespace-trimmed parse. Unrecognised commands
    /// yield `None` and must be ignored by the caller.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" => Some(StationCommand::Start),
            "suspend" => Some(StationCommand::Suspend),
            "finish" => Some(StationCommand::Finish),
            _ => None,
        }
    }

    /// Status a station moves to when applying this command
    pub fn target_status(&self) -> StationStatus {
        match self {
            StationCommand::Start => StationStatus::Charging,
            StationCommand::Suspend => StationStatus::SuspendedEV,
            StationCommand::Finish => StationStatus::Available,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StationCommand::Start => "start",
            StationCommand::Suspend => "suspend",
            StationCommand::Finish => "finish",
        }
    }
}

impl fmt::Display for StationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_mapping() {
        let start = StationCommand::parse("start").unwrap();
        assert_eq!(start.target_status(), StationStatus::Charging);
        assert!(start.target_status().is_busy());

        let suspend = StationCommand::parse("suspend").unwrap();
        assert_eq!(suspend.target_status(), StationStatus::SuspendedEV);
        assert!(!suspend.target_status().is_busy());

        let finish = StationCommand::parse("finish").unwrap();
        assert_eq!(finish.target_status(), StationStatus::Available);
        assert!(!finish.target_status().is_busy());
    }

    #[test]
    fn test_command_parse_is_lenient_about_case_and_whitespace() {
        assert_eq!(StationCommand::parse("  START\n"), Some(StationCommand::Start));
        assert_eq!(StationCommand::parse("Finish"), Some(StationCommand::Finish));
        assert_eq!(StationCommand::parse("reboot"), None);
        assert_eq!(StationCommand::parse(""), None);
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&StationStatus::SuspendedEV).unwrap(),
            "\"SuspendedEV\""
        );
        let parsed: StationStatus = serde_json::from_str("\"Faulted\"").unwrap();
        assert_eq!(parsed, StationStatus::Unknown);
        assert_eq!(StationStatus::parse("SuspendedEVSE"), StationStatus::SuspendedEVSE);
        assert_eq!(StationStatus::parse("Preparing"), StationStatus::Unknown);
    }
}
