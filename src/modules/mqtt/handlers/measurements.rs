use log::{error, info, warn};
use rumqttc::Publish;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    modules::mqtt::mqtt_client::MqttClient,
    processor::{Deadline, Disposition, MeasurementHandler},
};

const RETRY_BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Runs one handler invocation per delivery and acks it once the handler
/// accepts it. Retryable deliveries are re-run here; the broker keeps them
/// in flight meanwhile.
pub async fn handler(
    client: MqttClient,
    mut inbound: mpsc::Receiver<Publish>,
    processor: Arc<MeasurementHandler>,
    invocation_timeout: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let publish = tokio::select! {
            _ = shutdown.cancelled() => break,
            publish = inbound.recv() => match publish {
                Some(publish) => publish,
                None => break,
            },
        };

        let client = client.clone();
        let processor = Arc::clone(&processor);
        let cancel = shutdown.child_token();

        tokio::spawn(async move {
            if !process_until_acked(&processor, &publish.payload, invocation_timeout, &cancel).await {
                warn!(topic = publish.topic.as_str(), pkid = publish.pkid; "Delivery left unacknowledged at shutdown");
                return;
            }

            if let Err(e) = client.ack(&publish).await {
                error!(topic = publish.topic.as_str(), pkid = publish.pkid; "Failed to ack delivery: {}", e);
            }
        });
    }

    info!("Measurement subscription stopped");
}

/// Runs the handler until it acks, backing off between attempts. Returns
/// false when `shutdown` fires first.
async fn process_until_acked(
    processor: &MeasurementHandler,
    payload: &[u8],
    invocation_timeout: Duration,
    shutdown: &CancellationToken,
) -> bool {
    let mut backoff = RETRY_BACKOFF_INITIAL;
    let mut attempt: u32 = 1;

    loop {
        let deadline = Deadline::after(invocation_timeout).with_cancellation(shutdown.child_token());

        if processor.handle(payload, &deadline).await.disposition() == Disposition::Ack {
            return true;
        }

        info!(attempt = attempt, backoff_ms = backoff.as_millis() as u64; "Re-running delivery after backoff");

        tokio::select! {
            _ = shutdown.cancelled() => return false,
            _ = sleep(backoff) => (),
        }

        backoff = (backoff * 2).min(RETRY_BACKOFF_MAX);
        attempt += 1;
    }
}
