use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};

mod api;
mod config;
mod db;
mod docs;
mod engine;
mod error;
mod model;
mod routes;
mod store;
mod utils;

use config::Config;
use db::Pools;
use engine::run::{ReportRange, RunRequest, run_attendance};
use model::clock_event::Strategy;
use store::mysql::MySqlStores;
use model::sync_log::SyncSettings;
use store::SyncSettingsStore;
use utils::report_csv;
use utils::sync_state::{RetryPolicy, SyncState, run_periodic};

use crate::docs::ApiDoc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Parser)]
#[command(name = "shiftclock", version, about = "Shift attendance classification")]
struct Cli {
    /// Defaults to `serve`.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// HTTP API plus the periodic schedule sync
    Serve,
    /// Classify one date range and export the report
    Attendance(AttendanceArgs),
    /// Reconcile the schedule cache once
    Sync,
}

#[derive(Args)]
struct AttendanceArgs {
    /// Specific date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,
    /// End date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<NaiveDate>,
    /// Only this staff number, e.g. MTI250034
    #[arg(long)]
    staff_no: Option<String>,
    /// Chat id the report is sent to
    #[arg(long = "waid")]
    chat_id: Option<String>,
    /// Store classified events in the attendance report table
    #[arg(long)]
    insert_att: bool,
    /// Forward unprocessed clock events to the clocking table
    #[arg(long)]
    insert_mcg: bool,
    /// Replace records that already exist
    #[arg(long)]
    force_replace: bool,
    /// First scan in, last scan out, instead of schedule windows
    #[arg(long)]
    use_filo: bool,
}

fn init_tracing(log_dir: &str) -> WorkerGuard {
    // Rolling daily log
    let file_appender = rolling::daily(log_dir, "shiftclock.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    guard
}

async fn attendance_once(config: Config, stores: MySqlStores, args: AttendanceArgs) -> Result<()> {
    let now = Local::now().naive_local();
    let request = RunRequest {
        range: ReportRange::from_args(args.date, args.start_date, args.end_date, now),
        staff_no: args.staff_no,
        strategy: if args.use_filo {
            Strategy::Bracket
        } else {
            Strategy::Windowed
        },
        manual: None,
        persist: args.insert_att,
        propagate: args.insert_mcg,
        replace_existing: args.force_replace,
    };

    let report = run_attendance(
        &stores.scans,
        &stores.schedules,
        &stores.attendance,
        &stores.clocking,
        &config.engine,
        &request,
        now,
    )
    .await?;

    let stats = &report.stats;
    println!("Date/time range: {} to {}", report.start, report.end);
    println!("Total transactions retrieved: {}", stats.total);
    println!("Total transactions processed (excluding 'No Shift Data'): {}", stats.processed);
    println!("Valid transactions (Clock In/Out): {}", stats.valid);
    println!("Invalid transactions (Outside Range/Mid Scans, etc.): {}", stats.invalid);
    println!("Missing clock outs: {}", stats.synthesized);
    if let Some(p) = &report.persisted {
        println!("Attendance records: {} new, {} skipped, {} failed", p.inserted, p.skipped, p.failed);
    }
    if let Some(p) = &report.propagated {
        println!("Clock events forwarded: {} of {} ({} failed)", p.forwarded, p.pending, p.failed);
    }

    let path = report_csv::publish(
        &config,
        &request.range,
        request.staff_no.as_deref(),
        &report.events,
        args.chat_id.as_deref(),
    )
    .await?;
    println!("Report: {}", path.display());
    Ok(())
}

async fn sync_once(stores: MySqlStores) -> Result<()> {
    let state = SyncState::default();
    let Some(summary) = state
        .run_guarded(&stores.profiles, &stores.profile_cache, &stores.sync_log)
        .await
    else {
        bail!("schedule sync already running");
    };

    println!(
        "Sync {}: total={} updated={} inserted={} unchanged={} failed={}",
        summary.run_id,
        summary.total,
        summary.updated,
        summary.inserted,
        summary.unchanged,
        summary.failed
    );
    if let Some(error) = summary.error {
        bail!("schedule sync failed: {error}");
    }
    Ok(())
}

async fn serve(config: Config, stores: MySqlStores) -> Result<()> {
    info!("Server starting...");

    let mut settings = SyncSettings {
        enabled: config.sync_enabled,
        interval_minutes: config.sync_interval_minutes,
    };
    match stores.sync_log.load_settings().await {
        Ok(Some(saved)) => settings = saved,
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to load saved sync settings, using environment"),
    }
    let retry = RetryPolicy {
        base: Duration::from_millis(config.sync_retry_base_ms),
        max: Duration::from_millis(config.sync_retry_max_ms),
    };
    let sync_state = Data::new(SyncState::new(settings, retry));
    // Always running: the schedule can be enabled later through the API.
    actix_web::rt::spawn(run_periodic(stores.clone(), sync_state.clone()));

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(stores.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(sync_state.clone())
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _guard = init_tracing(&config.log_dir);

    let pools = Pools::connect(&config).await?;
    let stores = MySqlStores::new(&pools, &config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, stores).await,
        Command::Attendance(args) => attendance_once(config, stores, args).await,
        Command::Sync => sync_once(stores).await,
    }
}
