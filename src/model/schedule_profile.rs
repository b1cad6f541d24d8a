use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::shift::{TimeOfDay, parse_next_day};

/// One employee's profile plus current shift pattern, as held by the
/// source-of-truth system and mirrored into the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleProfileRecord {
    pub employee_id: String,
    pub employee_name: Option<String>,
    pub gender: Option<String>,
    pub division: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
    pub supervisor_id: Option<String>,
    pub supervisor_name: Option<String>,
    pub position_title: Option<String>,
    pub grade_interval: Option<String>,
    pub phone: Option<String>,
    pub day_type: Option<String>,
    pub description: Option<String>,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    pub next_day: Option<String>,
}

/// Mirrored columns, in fingerprint order.
pub const MIRRORED_COLUMNS: [&str; 15] = [
    "employee_name",
    "gender",
    "division",
    "department",
    "section",
    "supervisor_id",
    "supervisor_name",
    "position_title",
    "grade_interval",
    "phone",
    "day_type",
    "description",
    "time_in",
    "time_out",
    "next_day",
];

impl ScheduleProfileRecord {
    /// Field values paired with their column names, in [`MIRRORED_COLUMNS`] order.
    pub fn mirrored_fields(&self) -> [(&'static str, Option<&str>); 15] {
        [
            ("employee_name", self.employee_name.as_deref()),
            ("gender", self.gender.as_deref()),
            ("division", self.division.as_deref()),
            ("department", self.department.as_deref()),
            ("section", self.section.as_deref()),
            ("supervisor_id", self.supervisor_id.as_deref()),
            ("supervisor_name", self.supervisor_name.as_deref()),
            ("position_title", self.position_title.as_deref()),
            ("grade_interval", self.grade_interval.as_deref()),
            ("phone", self.phone.as_deref()),
            ("day_type", self.day_type.as_deref()),
            ("description", self.description.as_deref()),
            ("time_in", self.time_in.as_deref()),
            ("time_out", self.time_out.as_deref()),
            ("next_day", self.next_day.as_deref()),
        ]
    }

    pub fn field_mut(&mut self, column: &str) -> Option<&mut Option<String>> {
        let slot = match column {
            "employee_name" => &mut self.employee_name,
            "gender" => &mut self.gender,
            "division" => &mut self.division,
            "department" => &mut self.department,
            "section" => &mut self.section,
            "supervisor_id" => &mut self.supervisor_id,
            "supervisor_name" => &mut self.supervisor_name,
            "position_title" => &mut self.position_title,
            "grade_interval" => &mut self.grade_interval,
            "phone" => &mut self.phone,
            "day_type" => &mut self.day_type,
            "description" => &mut self.description,
            "time_in" => &mut self.time_in,
            "time_out" => &mut self.time_out,
            "next_day" => &mut self.next_day,
            _ => return None,
        };
        Some(slot)
    }

    /// `id | name | day type | in-out | next day`, as printed in sync summaries.
    pub fn change_summary(&self) -> String {
        format!(
            "{} | {} | {} | {}-{} | {}",
            self.employee_id,
            self.employee_name.as_deref().unwrap_or_default(),
            self.day_type.as_deref().unwrap_or_default(),
            self.time_in.as_deref().unwrap_or_default(),
            self.time_out.as_deref().unwrap_or_default(),
            self.next_day.as_deref().unwrap_or_default(),
        )
    }
}

/// Cached, per-date resolved schedule (the schedule lock table).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ScheduleLockRow {
    pub employee_id: String,
    pub shift_date: NaiveDate,
    pub scheduled_in: Option<String>,
    pub scheduled_out: Option<String>,
    pub next_day: Option<String>,
}

/// Shift fields of the mirrored profile, used when no lock row exists yet.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProfileShiftRow {
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    pub next_day: Option<String>,
}

/// Cached profile as served to the scheduling screen.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingEmployee {
    #[schema(example = "MTI250034")]
    pub employee_id: String,
    pub name: String,
    pub gender: String,
    pub division: String,
    pub department: String,
    pub section: String,
    pub supervisor_id: String,
    pub supervisor_name: String,
    pub position_title: String,
    pub grade_interval: String,
    pub phone: String,
    pub day_type: String,
    pub description: String,
    #[schema(example = "07:00")]
    pub time_in: String,
    #[schema(example = "17:00")]
    pub time_out: String,
    pub next_day: bool,
}

fn hh_mm(value: Option<&str>) -> String {
    match TimeOfDay::from_column(value).time() {
        Some(t) => t.format("%H:%M").to_string(),
        None => value.unwrap_or_default().to_string(),
    }
}

impl From<ScheduleProfileRecord> for SchedulingEmployee {
    fn from(r: ScheduleProfileRecord) -> Self {
        let time_in = hh_mm(r.time_in.as_deref());
        let time_out = hh_mm(r.time_out.as_deref());
        let next_day = parse_next_day(r.next_day.as_deref());
        Self {
            employee_id: r.employee_id,
            name: r.employee_name.unwrap_or_default(),
            gender: r.gender.unwrap_or_default(),
            division: r.division.unwrap_or_default(),
            department: r.department.unwrap_or_default(),
            section: r.section.unwrap_or_default(),
            supervisor_id: r.supervisor_id.unwrap_or_default(),
            supervisor_name: r.supervisor_name.unwrap_or_default(),
            position_title: r.position_title.unwrap_or_default(),
            grade_interval: r.grade_interval.unwrap_or_default(),
            phone: r.phone.unwrap_or_default(),
            day_type: r.day_type.unwrap_or_default(),
            description: r.description.unwrap_or_default(),
            time_in,
            time_out,
            next_day,
        }
    }
}

/// Number of cached profiles sharing one shift pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleCombo {
    #[schema(example = "Day Shift")]
    pub label: String,
    pub day_type: String,
    #[schema(example = "07:00")]
    pub time_in: String,
    #[schema(example = "17:00")]
    pub time_out: String,
    pub next_day: bool,
    pub count: u64,
}

/// Groups profiles by (description, day type, in, out, next day), sorted by
/// label then times. Profiles with neither time are left out.
pub fn schedule_combos(rows: Vec<ScheduleProfileRecord>) -> Vec<ScheduleCombo> {
    let mut groups: BTreeMap<(String, String, String, String, bool), u64> = BTreeMap::new();
    for view in rows.into_iter().map(SchedulingEmployee::from) {
        if view.time_in.trim().is_empty() && view.time_out.trim().is_empty() {
            continue;
        }
        let key = (
            view.description,
            view.time_in,
            view.time_out,
            view.day_type,
            view.next_day,
        );
        *groups.entry(key).or_default() += 1;
    }

    groups
        .into_iter()
        .map(|((label, time_in, time_out, day_type, next_day), count)| ScheduleCombo {
            label,
            day_type,
            time_in,
            time_out,
            next_day,
            count,
        })
        .collect()
}
