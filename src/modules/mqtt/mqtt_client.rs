use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS,
    TlsConfiguration, Transport,
};
use std::{
    collections::{HashMap, VecDeque},
    fs::File,
    io::{self, Read},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    time::sleep,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::MqttConfig,
    processor::emitter::{CommandPublisher, PublishError},
};

type AckSender = oneshot::Sender<Result<(), PublishError>>;

/// Matches QoS 1 publishes to their PUBACK.
///
/// rumqttc hands out packet ids only when the event loop sends the packet,
/// in request order, so waiters queue up until `Outgoing::Publish(pkid)`
/// names their id.
#[derive(Default)]
struct AckTracker {
    queued: Mutex<VecDeque<AckSender>>,
    inflight: Mutex<HashMap<u16, AckSender>>,
}

impl AckTracker {
    async fn assign(&self, pkid: u16) {
        let mut inflight = self.inflight.lock().await;
        // a retransmission after reconnect reuses the id it already has
        if inflight.contains_key(&pkid) {
            return;
        }
        if let Some(waiter) = self.queued.lock().await.pop_front() {
            inflight.insert(pkid, waiter);
        }
    }

    async fn acknowledge(&self, pkid: u16) {
        if let Some(waiter) = self.inflight.lock().await.remove(&pkid) {
            let _ = waiter.send(Ok(()));
        }
    }

    /// The broker dropped the session, nothing in flight will be acknowledged.
    async fn fail_inflight(&self, reason: &str) {
        for (_, waiter) in self.inflight.lock().await.drain() {
            let _ = waiter
                .send(Err(PublishError::NotAcknowledged(reason.to_string())));
        }
    }
}

#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    acks: Arc<AckTracker>,
}

impl MqttClient {
    /// Builds the client and its event loop. Nothing touches the network
    /// until [`MqttClient::run`] polls the loop.
    pub fn new(config: &MqttConfig) -> io::Result<(Self, EventLoop)> {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive.into()));
        // keep the session so unacknowledged deliveries come back after reconnect
        options.set_clean_session(false);
        options.set_manual_acks(true);

        // Set username and password if provided
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        // TLS configuration if SSL certificates are provided
        if let (Some(ca_cert), Some(client_cert), Some(client_key)) =
            (&config.ca_cert, &config.client_cert, &config.client_key)
        {
            let tls_config = TlsConfiguration::Simple {
                ca: load_certificate(ca_cert)?,
                alpn: None,
                client_auth: Some((load_certificate(client_cert)?, load_certificate(client_key)?)),
            };

            options.set_transport(Transport::tls_with_config(tls_config));
        }

        let (client, eventloop) = AsyncClient::new(options, 250);

        Ok((
            MqttClient {
                client,
                acks: Arc::new(AckTracker::default()),
            },
            eventloop,
        ))
    }

    /// Polls the event loop until `shutdown` or until DISCONNECT is sent.
    /// Forwards incoming publishes to `inbound`, resolves publish
    /// acknowledgements and resubscribes to `topics` on every (re)connect.
    pub async fn run(
        self,
        mut eventloop: EventLoop,
        topics: Vec<String>,
        inbound: mpsc::Sender<Publish>,
        shutdown: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = publish.topic.as_str(), pkid = publish.pkid; "Received message");
                    if inbound.send(publish).await.is_err() {
                        warn!("Inbound channel closed, stopping MQTT loop");
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    info!("Connection established with broker.");
                    if !connack.session_present {
                        self.acks.fail_inflight("broker session was reset").await;
                    }

                    for topic in &topics {
                        let client = self.client.clone();
                        let topic = topic.clone();
                        tokio::spawn(async move {
                            info!("Subscribing to topic: {}", topic);
                            if let Err(e) = client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                                error!("Failed to subscribe to topic '{}': {}", topic, e);
                            }
                        });
                    }
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => self.acks.acknowledge(ack.pkid).await,
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => self.acks.assign(pkid).await,
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("Disconnected from broker");
                    break;
                }
                Ok(_) => (),
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("MQTT loop stopped");
    }

    /// Acknowledges an incoming delivery; unacknowledged ones are redelivered
    /// by the broker.
    pub async fn ack(&self, publish: &Publish) -> Result<(), rumqttc::ClientError> {
        self.client.ack(publish).await
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        self.client.disconnect().await
    }
}

#[async_trait]
impl CommandPublisher for MqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if !is_publish_topic(topic) {
            return Err(PublishError::TopicNotFound(topic.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        {
            // queue order must follow request order, so enqueue under the lock
            let mut queued = self.acks.queued.lock().await;
            self.client
                .try_publish(topic, QoS::AtLeastOnce, false, payload)
                .map_err(|e| PublishError::NotAcknowledged(e.to_string()))?;
            queued.push_back(tx);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(PublishError::NotAcknowledged(
                "client dropped before acknowledgement".to_string(),
            )),
        }
    }
}

/// Topic names a publish can target: non-empty, no wildcards, no NUL.
fn is_publish_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains(['+', '#', '\0'])
}

fn load_certificate(path: &str) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}
