use crate::cli::ServeArgs;
use crate::infra::{load_store, AppState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use slot_allocator::allocation::{allocation_router, SlotAllocationService};
use slot_allocator::config::AppConfig;
use slot_allocator::error::AppError;
use slot_allocator::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = load_store(args.fixture.as_deref())?;
    let cache_ttl = config.engine.cache_ttl();
    let allocation_service = Arc::new(SlotAllocationService::new(
        store.clone(),
        store,
        config.engine.clone(),
    ));
    spawn_cache_janitor(allocation_service.clone(), cache_ttl);

    let app = with_service_routes(allocation_router(allocation_service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        fixture = ?args.fixture,
        "slot allocation service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drops expired availability and balance entries so idle people do not pin memory.
fn spawn_cache_janitor<R, W>(service: Arc<SlotAllocationService<R, W>>, ttl: Duration)
where
    R: slot_allocator::allocation::ScheduleReader + 'static,
    W: slot_allocator::allocation::ScheduleWriter + 'static,
{
    if ttl.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl);
        loop {
            ticker.tick().await;
            let purged = service.purge_expired_caches();
            if purged > 0 {
                debug!(purged, "expired cache entries dropped");
            }
        }
    });
}
