#![cfg(feature = "client")]
use rdkafka::ClientConfig;
use strangler_core::broker::{Consumer, Producer, ProducerRecord};
use testcontainers::{clients::Cli, core::WaitFor, images::generic::GenericImage, Container};

use strangler_kafka::{KafkaConsumer, KafkaProducer};

fn start_redpanda() -> (Cli, Container<'static, GenericImage>, String) {
    let docker = Cli::default();
    let image = GenericImage::new("docker.redpanda.com/redpanda/redpanda", "v23.3.8")
        .with_wait_for(WaitFor::message("Started Kafka API"));
    let container = docker.run(image);
    let port = container.get_host_port_ipv4(9092);
    let brokers = format!("127.0.0.1:{}", port);
    (docker, container, brokers)
}

#[tokio::test]
#[ignore]
async fn round_trips_an_order_created_event_through_a_real_broker() {
    let (_cli, _node, brokers) = start_redpanda();
    let topic = "order.created";

    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &brokers);

    let producer = KafkaProducer::new(&client_config).expect("producer");
    producer
        .send(
            ProducerRecord::new(topic, b"O1".to_vec(), br#"{"order_id":"O1","total_amount":20.0}"#.to_vec())
                .with_header("retry_count", "0"),
        )
        .await
        .unwrap();

    let mut consumer_config = ClientConfig::new();
    consumer_config.set("group.id", "strangler-kafka-integration-test").set("bootstrap.servers", &brokers).set(
        "auto.offset.reset",
        "earliest",
    );
    let mut consumer = KafkaConsumer::new(&consumer_config, &[topic]).expect("consumer");

    let message = consumer.poll().await.expect("message delivered");
    assert_eq!(message.key, b"O1");
    assert_eq!(message.header("retry_count"), Some("0"));

    consumer.commit(&message).await.unwrap();
}
