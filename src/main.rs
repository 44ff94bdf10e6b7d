use log::{error, info, warn};
use std::{env, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use measurement_processor::{
    config::Configs,
    logger,
    modules::{api::start_api, mqtt::{mqtt_client::MqttClient, start_mqtt}},
    processor::{Clients, MeasurementHandler},
    shared::{
        db::{get_db, MongoStore},
        log_join,
    },
};

const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logger::start_log();

    let config_path = env::var("PROCESSOR_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mut configs = match Configs::load_from_file(&config_path) {
        Ok(configs) => configs,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Ok(uri) = env::var("MONGODB_URI") {
        configs.mongo.uri = uri;
    }
    info!("Loaded configuration from {}", configs.config_path().display());

    let db = get_db(&configs.mongo.uri, &configs.processor.project_id).await?;
    let (mqtt_client, eventloop) = MqttClient::new(&configs.mqtt)?;

    let clients = Clients {
        store: Arc::new(MongoStore::new(db)),
        publisher: Arc::new(mqtt_client.clone()),
    };
    let processor = Arc::new(MeasurementHandler::new(&clients, &configs.processor));
    let invocation_timeout = configs.processor.invocation_timeout();
    let shutdown = CancellationToken::new();

    let (mut mqtt_task, handler_task) = start_mqtt(
        mqtt_client.clone(),
        eventloop,
        &configs.mqtt,
        processor.clone(),
        invocation_timeout,
        shutdown.clone(),
    );

    let api_task = match &configs.http {
        Some(http) => Some(start_api(http.bind, processor, invocation_timeout, shutdown.clone())?),
        None => None,
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    // the event loop has to stay up to put DISCONNECT on the wire
    let mqtt_result = match mqtt_client.disconnect().await {
        Ok(()) => tokio::time::timeout(DISCONNECT_GRACE, &mut mqtt_task).await.ok(),
        Err(e) => {
            warn!("Failed to disconnect from broker: {}", e);
            None
        }
    };
    shutdown.cancel();

    let mqtt_result = match mqtt_result {
        Some(result) => result,
        None => mqtt_task.await,
    };
    log_join("mqtt event loop", mqtt_result);
    log_join("mqtt subscription", handler_task.await);
    if let Some(api_task) = api_task {
        log_join("push api", api_task.await);
    }

    Ok(())
}
