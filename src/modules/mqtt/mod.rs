mod handlers;
pub mod mqtt_client;

use log::info;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{config::MqttConfig, processor::MeasurementHandler};
use mqtt_client::MqttClient;

/// Starts the MQTT event loop and the measurement subscription on their own
/// tasks.
pub fn start_mqtt(
    client: MqttClient,
    eventloop: rumqttc::EventLoop,
    config: &MqttConfig,
    processor: Arc<MeasurementHandler>,
    invocation_timeout: Duration,
    shutdown: CancellationToken,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let (inbound_tx, inbound_rx) = mpsc::channel(256);

    let event_task = tokio::spawn(client.clone().run(
        eventloop,
        vec![config.ingress_topic.clone()],
        inbound_tx,
        shutdown.clone(),
    ));

    let handler_task = tokio::spawn(handlers::measurements::handler(
        client,
        inbound_rx,
        processor,
        invocation_timeout,
        shutdown,
    ));

    info!("Mqtt started...");

    (event_task, handler_task)
}
