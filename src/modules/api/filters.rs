use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use warp::Filter;

use crate::processor::{Deadline, MeasurementHandler};

/// Push bodies carry a single base64 encoded measurement.
const MAX_PUSH_BODY: u64 = 1024 * 256;

pub fn with_processor(
    processor: Arc<MeasurementHandler>,
) -> impl Filter<Extract = (Arc<MeasurementHandler>,), Error = Infallible> + Clone {
    warp::any().map(move || processor.clone())
}

/// A fresh deadline per request, cancelled along with the server.
pub fn with_deadline(
    invocation_timeout: Duration,
    shutdown: CancellationToken,
) -> impl Filter<Extract = (Deadline,), Error = Infallible> + Clone {
    warp::any().map(move || {
        Deadline::after(invocation_timeout).with_cancellation(shutdown.child_token())
    })
}

pub fn with_push_body() -> impl Filter<Extract = (bytes::Bytes,), Error = warp::Rejection> + Clone
{
    warp::body::content_length_limit(MAX_PUSH_BODY).and(warp::body::bytes())
}
