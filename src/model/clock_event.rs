use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::scan_event::{CardHolder, ScanEvent};
use super::shift::ShiftWindow;

pub const SYSTEM_GENERATED_STATUS: &str = "System Generated";

/// Semantic label assigned to a scan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
pub enum ClockLabel {
    #[strum(serialize = "Clock In")]
    #[serde(rename = "Clock In")]
    ClockIn,
    #[strum(serialize = "Clock Out")]
    #[serde(rename = "Clock Out")]
    ClockOut,
    #[strum(serialize = "Mid Scan")]
    #[serde(rename = "Mid Scan")]
    MidScan,
    #[strum(serialize = "Outside Range")]
    #[serde(rename = "Outside Range")]
    OutsideRange,
    #[strum(serialize = "No Shift Data")]
    #[serde(rename = "No Shift Data")]
    NoShiftData,
    #[strum(serialize = "Missing Clock Out")]
    #[serde(rename = "Missing Clock Out")]
    MissingClockOut,
}

impl ClockLabel {
    /// Clock In / Clock Out are the only labels forwarded downstream.
    pub fn is_attendance(self) -> bool {
        matches!(self, ClockLabel::ClockIn | ClockLabel::ClockOut)
    }

    /// Function key used by the downstream clocking table.
    pub fn function_key(self) -> Option<u8> {
        match self {
            ClockLabel::ClockIn => Some(0),
            ClockLabel::ClockOut => Some(1),
            _ => None,
        }
    }
}

/// How a batch is labelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Tolerance windows around the resolved schedule.
    #[default]
    Windowed,
    /// First scan in, last scan out, per employee and date.
    Bracket,
}

/// A scan (or a synthesized event) with its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClassifiedEvent {
    pub employee_id: String,
    #[schema(format = "date-time", value_type = String)]
    pub timestamp: NaiveDateTime,
    pub controller: String,
    pub unit_no: String,
    pub status: String,
    pub holder: CardHolder,
    pub label: ClockLabel,
    pub window: Option<ShiftWindow>,
}

impl ClassifiedEvent {
    pub fn from_scan(event: &ScanEvent, label: ClockLabel, window: Option<ShiftWindow>) -> Self {
        Self {
            employee_id: event.employee_id.clone(),
            timestamp: event.timestamp,
            controller: event.controller.clone(),
            unit_no: event.unit_no.clone(),
            status: event.status.clone(),
            holder: event.holder.clone(),
            label,
            window,
        }
    }

    /// A Missing Clock Out placed at the end of `window`, copying the
    /// directory fields of the Clock In it pairs with.
    pub fn missing_clock_out(clock_in: &ClassifiedEvent, window: ShiftWindow) -> Self {
        Self {
            employee_id: clock_in.employee_id.clone(),
            timestamp: window.end,
            controller: clock_in.controller.clone(),
            unit_no: clock_in.unit_no.clone(),
            status: SYSTEM_GENERATED_STATUS.to_string(),
            holder: clock_in.holder.clone(),
            label: ClockLabel::MissingClockOut,
            window: Some(window),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.label == ClockLabel::MissingClockOut && self.status == SYSTEM_GENERATED_STATUS
    }
}
