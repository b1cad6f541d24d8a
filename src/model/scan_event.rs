use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Card-directory fields joined onto every scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CardHolder {
    pub card_no: String,
    pub name: String,
    pub title: String,
    pub position: String,
    pub department: String,
    pub card_type: String,
    pub company: String,
}

/// One badge read, as retrieved from the transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScanEvent {
    #[schema(example = "MTI250034")]
    pub employee_id: String,
    #[schema(example = "2025-03-10T07:55:12", format = "date-time", value_type = String)]
    pub timestamp: NaiveDateTime,
    #[schema(example = "FR-Pyrite Office-5635")]
    pub controller: String,
    #[schema(example = "12")]
    pub unit_no: String,
    #[schema(example = "Valid Entry Access")]
    pub status: String,
    pub holder: CardHolder,
}

impl ScanEvent {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Raw transaction-log row; converted into [`ScanEvent`] at the store boundary.
#[derive(Debug, sqlx::FromRow)]
pub struct ScanEventRow {
    pub card_no: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub card_type: Option<String>,
    pub company: Option<String>,
    pub staff_no: String,
    pub tr_date_time: NaiveDateTime,
    pub tr_transaction: Option<String>,
    pub tr_controller: Option<String>,
    pub unit_no: Option<String>,
}

impl From<ScanEventRow> for ScanEvent {
    fn from(row: ScanEventRow) -> Self {
        Self {
            employee_id: row.staff_no,
            timestamp: row.tr_date_time,
            controller: row.tr_controller.unwrap_or_default(),
            unit_no: row.unit_no.unwrap_or_default(),
            status: row.tr_transaction.unwrap_or_default(),
            holder: CardHolder {
                card_no: row.card_no.unwrap_or_default(),
                name: row.name.unwrap_or_default(),
                title: row.title.unwrap_or_default(),
                position: row.position.unwrap_or_default(),
                department: row.department.unwrap_or_default(),
                card_type: row.card_type.unwrap_or_default(),
                company: row.company.unwrap_or_default(),
            },
        }
    }
}
