use crate::{
    api::{attendance, health, schedule},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond((60_000 / requests_per_min as u64).max(1))
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap_or_default();
        Governor::new(&cfg)
    }

    // batch runs and syncs hit three databases; reads are cheap
    let run_limiter = Arc::new(build_limiter(config.rate_run_per_min));
    let read_limiter = Arc::new(build_limiter(config.rate_read_per_min));

    cfg.service(
        web::scope(&config.api_prefix)
            .service(
                web::resource("/health")
                    .wrap(read_limiter.clone())
                    .route(web::get().to(health::health)),
            )
            .service(
                web::scope("/v1")
                    // /v1/attendance/run
                    .service(
                        web::resource("/attendance/run")
                            .wrap(run_limiter.clone())
                            .route(web::post().to(attendance::run_attendance_batch)),
                    )
                    .service(
                        web::resource("/attendance/report")
                            .wrap(read_limiter.clone())
                            .route(web::get().to(attendance::attendance_report)),
                    )
                    .service(
                        web::scope("/schedule")
                            .service(
                                web::resource("/sync")
                                    .wrap(run_limiter.clone())
                                    .route(web::post().to(schedule::sync_now)),
                            )
                            .service(
                                web::resource("/sync/last")
                                    .wrap(read_limiter.clone())
                                    .route(web::get().to(schedule::last_sync)),
                            )
                            .service(
                                web::resource("/sync/logs")
                                    .wrap(read_limiter.clone())
                                    .route(web::get().to(schedule::sync_logs)),
                            )
                            .service(
                                web::resource("/sync/status")
                                    .wrap(read_limiter.clone())
                                    .route(web::get().to(schedule::sync_status)),
                            )
                            .service(
                                web::resource("/sync/config")
                                    .wrap(run_limiter)
                                    .route(web::put().to(schedule::update_sync_config)),
                            )
                            .service(
                                web::resource("/combos")
                                    .wrap(read_limiter.clone())
                                    .route(web::get().to(schedule::list_combos)),
                            )
                            .service(
                                web::resource("/employees")
                                    .wrap(read_limiter)
                                    .route(web::get().to(schedule::list_employees)),
                            ),
                    ),
            ),
    );
}
