pub mod notifier;
pub mod report_csv;
pub mod sync_state;
