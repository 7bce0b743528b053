use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    RequestingAccess,
    Watching,
    Translating,
    Errored,
}

/// How a status is shown in the indicator badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusStyle {
    pub label: &'static str,
    pub color: &'static str,
    /// Busy states animate their indicator.
    pub pulse: bool,
}

impl Status {
    pub fn style(self) -> StatusStyle {
        match self {
            Status::Idle => StatusStyle {
                label: "Ready",
                color: "gray",
                pulse: false,
            },
            Status::RequestingAccess => StatusStyle {
                label: "Requesting...",
                color: "blue",
                pulse: true,
            },
            Status::Watching => StatusStyle {
                label: "Watching",
                color: "green",
                pulse: true,
            },
            Status::Translating => StatusStyle {
                label: "Translating...",
                color: "yellow",
                pulse: true,
            },
            Status::Errored => StatusStyle {
                label: "Error",
                color: "red",
                pulse: false,
            },
        }
    }
}
