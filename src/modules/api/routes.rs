use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use warp::Filter;

use crate::{
    modules::api::{
        filters::{with_deadline, with_processor, with_push_body},
        handlers::{health_handler, push_handler},
    },
    processor::MeasurementHandler,
};

/// POST /push
pub fn push_route(
    processor: Arc<MeasurementHandler>,
    invocation_timeout: Duration,
    shutdown: CancellationToken,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("push")
        .and(warp::post())
        .and(with_push_body())
        .and(with_processor(processor))
        .and(with_deadline(invocation_timeout, shutdown))
        .and_then(push_handler)
}

/// GET /healthz
pub fn health_route() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("healthz")
        .and(warp::get())
        .and_then(health_handler)
}
