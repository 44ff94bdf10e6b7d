mod filters;
mod handlers;
mod routes;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use warp::Filter;

use crate::processor::MeasurementHandler;

/// Serves the push endpoint until `shutdown` is cancelled.
pub fn start_api(
    bind: SocketAddr,
    processor: Arc<MeasurementHandler>,
    invocation_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, warp::Error> {
    let routes = routes::push_route(processor, invocation_timeout, shutdown.clone())
        .or(routes::health_route())
        .with(warp::log("measurement_processor::api"));

    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(bind, async move { shutdown.cancelled().await })?;

    log::info!("Starting API on {}...", addr);

    Ok(tokio::spawn(server))
}
