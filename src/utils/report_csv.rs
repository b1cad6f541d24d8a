use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use super::notifier::ChatNotifier;
use crate::config::Config;
use crate::engine::run::ReportRange;
use crate::model::clock_event::ClassifiedEvent;

/// One line of the attendance report, in the column order operators expect.
#[derive(Serialize)]
struct ReportRow<'a> {
    #[serde(rename = "CardNo")]
    card_no: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Position")]
    position: &'a str,
    #[serde(rename = "Department")]
    department: &'a str,
    #[serde(rename = "CardType")]
    card_type: &'a str,
    #[serde(rename = "Company")]
    company: &'a str,
    #[serde(rename = "StaffNo")]
    staff_no: &'a str,
    #[serde(rename = "Transaction Date Time")]
    date_time: String,
    #[serde(rename = "Transaction Date")]
    date: String,
    #[serde(rename = "Transaction Status")]
    status: &'a str,
    #[serde(rename = "TrController")]
    controller: &'a str,
    #[serde(rename = "ClockEvent")]
    label: &'a str,
    #[serde(rename = "UnitNo")]
    unit_no: &'a str,
    #[serde(rename = "ScheduledClockIn")]
    scheduled_in: String,
    #[serde(rename = "ScheduledClockOut")]
    scheduled_out: String,
}

impl<'a> From<&'a ClassifiedEvent> for ReportRow<'a> {
    fn from(e: &'a ClassifiedEvent) -> Self {
        let (scheduled_in, scheduled_out) = e
            .window
            .as_ref()
            .map(|w| {
                (
                    w.start.format("%H:%M:%S").to_string(),
                    w.end.format("%H:%M:%S").to_string(),
                )
            })
            .unwrap_or_default();
        Self {
            card_no: &e.holder.card_no,
            name: &e.holder.name,
            title: &e.holder.title,
            position: &e.holder.position,
            department: &e.holder.department,
            card_type: &e.holder.card_type,
            company: &e.holder.company,
            staff_no: &e.employee_id,
            date_time: e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            date: e.timestamp.format("%Y-%m-%d").to_string(),
            status: &e.status,
            controller: &e.controller,
            label: e.label.as_ref(),
            unit_no: &e.unit_no,
            scheduled_in,
            scheduled_out,
        }
    }
}

/// Column names of [`ReportRow`], for batches with no rows to serialize.
const HEADER: [&str; 16] = [
    "CardNo",
    "Name",
    "Title",
    "Position",
    "Department",
    "CardType",
    "Company",
    "StaffNo",
    "Transaction Date Time",
    "Transaction Date",
    "Transaction Status",
    "TrController",
    "ClockEvent",
    "UnitNo",
    "ScheduledClockIn",
    "ScheduledClockOut",
];

/// Always starts with the header line, even when `events` is empty.
pub fn write_report<W: Write>(writer: W, events: &[ClassifiedEvent]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    if events.is_empty() {
        csv.write_record(HEADER)?;
    }
    for event in events {
        csv.serialize(ReportRow::from(event))?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes `<dir>/<file_name>` and returns its path.
pub fn export(dir: &Path, file_name: &str, events: &[ClassifiedEvent]) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    write_report(file, events)?;
    info!(path = %path.display(), rows = events.len(), "Report exported");
    Ok(path)
}

/// Exports the report and, when a chat id is given and a gateway is
/// configured, sends it (the file is removed after sending).
pub async fn publish(
    config: &Config,
    range: &ReportRange,
    staff_no: Option<&str>,
    events: &[ClassifiedEvent],
    chat_id: Option<&str>,
) -> Result<PathBuf> {
    let path = export(
        Path::new(&config.report_dir),
        &range.file_name(staff_no),
        events,
    )?;

    match (chat_id, config.whatsapp_api_url.as_deref()) {
        (Some(chat_id), Some(url)) => {
            ChatNotifier::new(url.to_string())
                .deliver(chat_id, &range.message(staff_no), &path)
                .await
        }
        (Some(_), None) => info!("WHATSAPP_API_URL not set, report kept on disk"),
        (None, _) => info!("No chat id provided, skipping report delivery"),
    }
    Ok(path)
}
