//! Integration tests for Kafka consumer and emitter functionality

use chrono::Utc;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;

use fleetstream::config::BatchConfig;
use fleetstream::kafka::{KafkaConfig, PositionConsumer, PositionEmitter};
use fleetstream::models::RawPosition;
use fleetstream::pipeline::{Pipeline, PipelineMetrics};
use fleetstream::shutdown::ShutdownCoordinator;
use fleetstream::state::VehicleStateTable;
use fleetstream::test_utils::MockPositionRepository;
use fleetstream::warehouse::WarehouseWriter;

/// Test Kafka broker address
const TEST_KAFKA_BROKER: &str = "localhost:9092";

/// Create a test topic for integration testing
async fn create_test_topic(topic: &str) -> Result<(), Box<dyn std::error::Error>> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", TEST_KAFKA_BROKER)
        .create()?;

    let topics = vec![NewTopic::new(topic, 1, TopicReplication::Fixed(1))];
    let results = admin.create_topics(&topics, &AdminOptions::new()).await?;

    for result in results {
        match result {
            Ok(topic) => println!("Created topic: {}", topic),
            Err((topic, err)) => {
                // Ignore if topic already exists
                if !err.to_string().contains("already exists") {
                    return Err(format!("Failed to create topic {}: {}", topic, err).into());
                }
            },
        }
    }

    Ok(())
}

/// Send a test position to Kafka keyed by vehicle id
async fn send_test_position(
    topic: &str,
    position: &RawPosition,
) -> Result<(), Box<dyn std::error::Error>> {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", TEST_KAFKA_BROKER)
        .set("message.timeout.ms", "5000")
        .create()?;

    let payload = serde_json::to_string(position)?;
    let record = FutureRecord::to(topic)
        .payload(&payload)
        .key(&position.vehicle_id);

    producer
        .send(record, Timeout::After(Duration::from_secs(5)))
        .await
        .map_err(|(err, _)| err)?;

    Ok(())
}

/// Build a pipeline over a mock repository for consumer tests
fn test_pipeline(
    repository: Arc<MockPositionRepository>,
) -> (Pipeline, VehicleStateTable, Arc<PipelineMetrics>) {
    let writer = WarehouseWriter::new(repository);
    let state = VehicleStateTable::new();
    let metrics = Arc::new(PipelineMetrics::new());
    let config = BatchConfig {
        max_batch_size: 10,
        max_batch_wait_ms: 500,
    };
    let pipeline = Pipeline::new(writer, state.clone(), &config, metrics.clone());
    (pipeline, state, metrics)
}

#[tokio::test]
#[ignore] // Requires Kafka to be running
async fn test_consumer_lands_position_end_to_end() {
    let topic = "test-vehicle-positions";
    create_test_topic(topic).await.expect("Failed to create topic");

    let position = RawPosition::new(
        "VEH-0001".to_string(),
        Utc::now().timestamp(),
        37.7749,
        -122.4194,
    );
    let event_id = position.event_id.clone();

    send_test_position(topic, &position)
        .await
        .expect("Failed to send position");

    let kafka_config = KafkaConfig {
        brokers: TEST_KAFKA_BROKER.to_string(),
        consumer_group: "test-vehicle-consumer-group".to_string(),
        topic: topic.to_string(),
        session_timeout_ms: 6000,
        max_poll_interval_ms: 10000,
        ..KafkaConfig::default()
    };

    let repository = Arc::new(MockPositionRepository::new());
    let (pipeline, state, _metrics) = test_pipeline(repository.clone());

    let coordinator = ShutdownCoordinator::new();
    let consumer = PositionConsumer::new(kafka_config, pipeline, coordinator.subscribe())
        .expect("Failed to create consumer");

    let consumer_handle = tokio::spawn(consumer.run());

    // Give the consumer time to join the group and land the batch
    tokio::time::sleep(Duration::from_secs(10)).await;
    coordinator.begin_drain();

    let result = tokio::time::timeout(Duration::from_secs(10), consumer_handle)
        .await
        .expect("Consumer should stop after drain")
        .expect("Consumer task should not panic");
    assert!(result.is_ok(), "Consumer should drain cleanly");

    // The position reached both the state table and the warehouse
    assert!(state.get("VEH-0001").await.is_some());
    let stored = repository.all_positions();
    assert!(stored.iter().any(|p| p.event_id.to_string() == event_id));
}

#[tokio::test]
#[ignore] // Requires Kafka to be running
async fn test_emitter_delivers_position() {
    let topic = "test-emitter-positions";
    create_test_topic(topic).await.expect("Failed to create topic");

    let config = KafkaConfig {
        brokers: TEST_KAFKA_BROKER.to_string(),
        topic: topic.to_string(),
        ..KafkaConfig::default()
    };

    let emitter = PositionEmitter::new(&config).expect("Failed to create emitter");
    let position = RawPosition::new(
        "VEH-0002".to_string(),
        Utc::now().timestamp(),
        37.78,
        -122.41,
    );

    emitter.emit(&position).await.expect("Emit should succeed");
    assert_eq!(emitter.emitted(), 1);
    assert_eq!(emitter.failed(), 0);

    emitter.close().expect("Flush should succeed");
}

#[test]
fn test_kafka_config_defaults() {
    let config = KafkaConfig::default();

    assert_eq!(config.brokers, "localhost:9092");
    assert_eq!(config.consumer_group, "vehicle-tracking-consumer-group");
    assert_eq!(config.topic, "vehicle_positions");
    assert_eq!(config.auto_offset_reset, "earliest");
    assert_eq!(config.session_timeout_ms, 30000);
    assert_eq!(config.max_records_per_poll, 500);
    assert!(config.idempotent_producer);
}

#[test]
fn test_kafka_config_from_env() {
    // Set environment variables
    std::env::set_var("KAFKA_BROKERS", "broker1:9092,broker2:9092");
    std::env::set_var("KAFKA_CONSUMER_GROUP", "test-group");
    std::env::set_var("KAFKA_TOPIC", "test-positions");
    std::env::set_var("KAFKA_AUTO_OFFSET_RESET", "latest");
    std::env::set_var("KAFKA_MAX_RECORDS_PER_POLL", "50");

    let config = KafkaConfig::from_env().expect("Failed to load config from env");

    assert_eq!(config.brokers, "broker1:9092,broker2:9092");
    assert_eq!(config.consumer_group, "test-group");
    assert_eq!(config.topic, "test-positions");
    assert_eq!(config.auto_offset_reset, "latest");
    assert_eq!(config.max_records_per_poll, 50);

    // Cleanup
    std::env::remove_var("KAFKA_BROKERS");
    std::env::remove_var("KAFKA_CONSUMER_GROUP");
    std::env::remove_var("KAFKA_TOPIC");
    std::env::remove_var("KAFKA_AUTO_OFFSET_RESET");
    std::env::remove_var("KAFKA_MAX_RECORDS_PER_POLL");
}
