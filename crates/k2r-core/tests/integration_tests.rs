//! Integration tests for k2r-core.
//!
//! Pipeline tests drive the consumer loop with scripted sources and the
//! in-memory list store. Tests that need Kafka or Redis require Docker to
//! be running and are marked with #[ignore] to avoid running them in
//! normal test runs.
//!
//! Run with: cargo test --test integration_tests -- --ignored

use async_trait::async_trait;
use k2r_core::cache::{CacheHealth, MemoryListStore, RecentWindow, StoreOutcome};
use k2r_core::config::CacheConfig;
use k2r_core::engine::{ConsumerLoop, ConsumerState, LoopObserver, LoopSettings};
use k2r_core::health::{ComponentStatus, HealthCheck, CACHE_COMPONENT, KAFKA_COMPONENT};
use k2r_core::kafka::{PollOutcome, Record, StreamSource};
use k2r_core::metrics::PipelineMetrics;
use k2r_core::{KafkaError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// What the loop reported, in order.
#[derive(Debug, Clone, PartialEq)]
enum Event {
    Record { payload: String, recent: Vec<String> },
    PartitionEnd(i32),
    PollError(String),
    Shutdown,
}

#[derive(Clone, Default)]
struct RecordingObserver {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl LoopObserver for RecordingObserver {
    fn on_record(&mut self, record: &Record, recent: &[Vec<u8>]) {
        self.events.lock().push(Event::Record {
            payload: record.payload_str().into_owned(),
            recent: recent
                .iter()
                .map(|r| String::from_utf8_lossy(r).into_owned())
                .collect(),
        });
    }

    fn on_partition_end(&mut self, partition: i32) {
        self.events.lock().push(Event::PartitionEnd(partition));
    }

    fn on_poll_error(&mut self, detail: &str) {
        self.events.lock().push(Event::PollError(detail.to_string()));
    }

    fn on_shutdown(&mut self) {
        self.events.lock().push(Event::Shutdown);
    }
}

/// Replays outcomes, then cancels the token and reports timeouts.
struct ScriptedSource {
    outcomes: VecDeque<PollOutcome>,
    token: CancellationToken,
    subscribe_error: Option<String>,
    polls_after_close: Arc<Mutex<u32>>,
    closed: Arc<Mutex<bool>>,
}

impl ScriptedSource {
    fn new(outcomes: Vec<PollOutcome>, token: CancellationToken) -> Self {
        Self {
            outcomes: outcomes.into(),
            token,
            subscribe_error: None,
            polls_after_close: Arc::new(Mutex::new(0)),
            closed: Arc::new(Mutex::new(false)),
        }
    }
}

#[async_trait]
impl StreamSource for ScriptedSource {
    fn subscribe(&mut self, topics: &[String]) -> Result<()> {
        assert_eq!(topics, ["tweets".to_string()]);
        match &self.subscribe_error {
            Some(message) => Err(KafkaError::Subscription(message.clone()).into()),
            None => Ok(()),
        }
    }

    async fn poll(&mut self, _timeout: Duration) -> PollOutcome {
        if *self.closed.lock() {
            *self.polls_after_close.lock() += 1;
        }
        match self.outcomes.pop_front() {
            Some(outcome) => outcome,
            None => {
                self.token.cancel();
                PollOutcome::Timeout
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Waits out each poll timeout without ever delivering anything.
struct IdleSource;

#[async_trait]
impl StreamSource for IdleSource {
    fn subscribe(&mut self, _topics: &[String]) -> Result<()> {
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> PollOutcome {
        tokio::time::sleep(timeout).await;
        PollOutcome::Timeout
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn cache_config(capacity: usize) -> CacheConfig {
    CacheConfig {
        capacity,
        failure_threshold: 3,
        reset_timeout_ms: 50,
        ..CacheConfig::default()
    }
}

fn settings(display_count: usize) -> LoopSettings {
    LoopSettings {
        topics: vec!["tweets".to_string()],
        poll_timeout: Duration::from_millis(20),
        display_count,
    }
}

fn record(payload: &str) -> PollOutcome {
    PollOutcome::Record(Record::from_payload("tweets", payload))
}

fn texts(items: Vec<Vec<u8>>) -> Vec<String> {
    items
        .into_iter()
        .map(|v| String::from_utf8(v).unwrap())
        .collect()
}

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn test_mixed_outcomes_until_interrupt() {
        let token = CancellationToken::new();
        let source = ScriptedSource::new(
            vec![
                PollOutcome::Timeout,
                record("hello"),
                PollOutcome::PartitionEnd { partition: 0 },
                PollOutcome::Error("boom".into()),
            ],
            token.clone(),
        );
        let closed = Arc::clone(&source.closed);
        let window = Arc::new(RecentWindow::with_store(
            MemoryListStore::new(),
            &cache_config(100),
        ));
        let observer = RecordingObserver::default();

        let mut consumer = ConsumerLoop::new(source, Arc::clone(&window), settings(5))
            .unwrap()
            .with_shutdown(token)
            .with_observer(observer.clone());
        let summary = consumer.run().await.unwrap();

        assert_eq!(
            observer.events(),
            vec![
                Event::Record {
                    payload: "hello".into(),
                    recent: vec!["hello".into()],
                },
                Event::PartitionEnd(0),
                Event::PollError("boom".into()),
                Event::Shutdown,
            ]
        );
        assert_eq!(summary.records, 1);
        assert_eq!(summary.partition_ends, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(consumer.state(), ConsumerState::Closed);
        assert!(*closed.lock());
        assert_eq!(texts(window.store_ref().snapshot("tweets")), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_window_keeps_newest_capacity_records() {
        let token = CancellationToken::new();
        let outcomes = (0..150).map(|i| record(&format!("tweet-{}", i))).collect();
        let window = Arc::new(RecentWindow::with_store(
            MemoryListStore::new(),
            &cache_config(100),
        ));

        let mut consumer = ConsumerLoop::new(
            ScriptedSource::new(outcomes, token.clone()),
            Arc::clone(&window),
            settings(5),
        )
        .unwrap()
        .with_shutdown(token);
        let summary = consumer.run().await.unwrap();

        assert_eq!(summary.records, 150);
        assert_eq!(window.store_ref().len("tweets"), 100);

        let recent = texts(window.recent(100).await);
        assert_eq!(recent.first().map(String::as_str), Some("tweet-149"));
        assert_eq!(recent.last().map(String::as_str), Some("tweet-50"));
        assert_eq!(consumer.metrics().window_length(), 100);
    }

    #[tokio::test]
    async fn test_display_count_limits_each_read() {
        let token = CancellationToken::new();
        let observer = RecordingObserver::default();
        let window = Arc::new(RecentWindow::with_store(
            MemoryListStore::new(),
            &cache_config(3),
        ));

        let mut consumer = ConsumerLoop::new(
            ScriptedSource::new(
                vec![record("t1"), record("t2"), record("t3"), record("t4")],
                token.clone(),
            ),
            window,
            settings(5),
        )
        .unwrap()
        .with_shutdown(token)
        .with_observer(observer.clone());
        consumer.run().await.unwrap();

        let reads: Vec<Vec<String>> = observer
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Record { recent, .. } => Some(recent),
                _ => None,
            })
            .collect();

        assert_eq!(reads[0], vec!["t1"]);
        assert_eq!(reads[2], vec!["t3", "t2", "t1"]);
        // Capacity caps the read even though display_count is larger.
        assert_eq!(reads[3], vec!["t4", "t3", "t2"]);
    }

    #[tokio::test]
    async fn test_unusable_store_does_not_stop_consumption() {
        let token = CancellationToken::new();
        let observer = RecordingObserver::default();
        let store = MemoryListStore::new();
        store.set_available(false);
        let window = Arc::new(RecentWindow::with_store(store, &cache_config(100)));
        let outcomes = (0..10).map(|i| record(&format!("r{}", i))).collect();

        let mut consumer = ConsumerLoop::new(
            ScriptedSource::new(outcomes, token.clone()),
            Arc::clone(&window),
            settings(5),
        )
        .unwrap()
        .with_shutdown(token)
        .with_observer(observer.clone());
        let summary = consumer.run().await.unwrap();

        assert_eq!(summary.records, 10);
        for event in observer.events() {
            if let Event::Record { recent, .. } = event {
                assert!(recent.is_empty());
            }
        }

        assert!(matches!(window.health(), CacheHealth::Degraded(_)));
        assert!(matches!(
            consumer.health().get_component_status(CACHE_COMPONENT),
            Some(ComponentStatus::Degraded(_))
        ));
        assert_eq!(consumer.metrics().cache_writes(), 0);
        assert_eq!(consumer.metrics().cache_write_failures(), 10);
        assert_eq!(consumer.state(), ConsumerState::Closed);
    }

    #[tokio::test]
    async fn test_store_outage_mid_stream_recovers() {
        let token = CancellationToken::new();
        let store = MemoryListStore::new();
        let window = Arc::new(RecentWindow::with_store(store, &cache_config(100)));

        window.store(b"before").await;
        window.store_ref().set_available(false);
        window.store(b"lost").await;
        assert!(!window.health().is_healthy());

        window.store_ref().set_available(true);
        let mut consumer = ConsumerLoop::new(
            ScriptedSource::new(vec![record("after")], token.clone()),
            Arc::clone(&window),
            settings(5),
        )
        .unwrap()
        .with_shutdown(token);
        consumer.run().await.unwrap();

        assert!(window.health().is_healthy());
        assert_eq!(texts(window.recent(5).await), vec!["after", "before"]);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_fatal() {
        let token = CancellationToken::new();
        let mut source = ScriptedSource::new(vec![record("never")], token.clone());
        source.subscribe_error = Some("topic authorization failed".into());
        let closed = Arc::clone(&source.closed);
        let window = Arc::new(RecentWindow::with_store(
            MemoryListStore::new(),
            &cache_config(100),
        ));

        let mut consumer = ConsumerLoop::new(source, Arc::clone(&window), settings(5))
            .unwrap()
            .with_shutdown(token);
        let err = consumer.run().await.unwrap_err();

        assert!(matches!(err, k2r_core::Error::Kafka(KafkaError::Subscription(_))));
        assert_eq!(consumer.state(), ConsumerState::Closed);
        assert!(*closed.lock());
        assert!(matches!(
            consumer.health().get_component_status(KAFKA_COMPONENT),
            Some(ComponentStatus::Unhealthy(_))
        ));
        assert!(window.store_ref().is_empty("tweets"));
    }

    #[tokio::test]
    async fn test_no_poll_after_close() {
        let token = CancellationToken::new();
        let source = ScriptedSource::new(vec![record("a"), record("b")], token.clone());
        let polls_after_close = Arc::clone(&source.polls_after_close);
        let window = Arc::new(RecentWindow::with_store(
            MemoryListStore::new(),
            &cache_config(10),
        ));

        let mut consumer = ConsumerLoop::new(source, window, settings(5))
            .unwrap()
            .with_shutdown(token);
        consumer.run().await.unwrap();

        assert_eq!(*polls_after_close.lock(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_within_one_poll_timeout() {
        let poll_timeout = Duration::from_millis(200);
        let token = CancellationToken::new();
        let window = Arc::new(RecentWindow::with_store(
            MemoryListStore::new(),
            &cache_config(10),
        ));

        let mut consumer = ConsumerLoop::new(
            IdleSource,
            window,
            LoopSettings {
                topics: vec!["tweets".into()],
                poll_timeout,
                display_count: 5,
            },
        )
        .unwrap()
        .with_shutdown(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let requested = Instant::now();
            token.cancel();
            requested
        });

        let summary = consumer.run().await.unwrap();
        let stopped = Instant::now();
        let requested = canceller.await.unwrap();

        assert_eq!(consumer.state(), ConsumerState::Closed);
        assert_eq!(summary.records, 0);
        assert!(stopped.duration_since(requested) <= poll_timeout + Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_shared_health_and_metrics() {
        let token = CancellationToken::new();
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let health = Arc::new(HealthCheck::for_pipeline());
        let window = Arc::new(RecentWindow::with_store(
            MemoryListStore::new(),
            &cache_config(10),
        ));

        let mut consumer = ConsumerLoop::new(
            ScriptedSource::new(
                vec![record("a"), PollOutcome::Timeout, PollOutcome::Error("x".into())],
                token.clone(),
            ),
            window,
            settings(5),
        )
        .unwrap()
        .with_shutdown(token)
        .with_metrics(Arc::clone(&metrics))
        .with_health(Arc::clone(&health));
        consumer.run().await.unwrap();

        assert_eq!(metrics.records_consumed(), 1);
        assert_eq!(metrics.poll_timeouts(), 2);
        assert_eq!(metrics.poll_errors(), 1);
        assert_eq!(metrics.cache_reads(), 1);
        assert!(!health.is_loop_running());
        assert_eq!(
            health.get_component_status(CACHE_COMPONENT),
            Some(ComponentStatus::Healthy)
        );

        let text = metrics.export_prometheus_text().unwrap();
        assert!(text.contains("k2r_records_consumed_total 1"));
    }
}

mod concurrent_writers {
    use super::*;

    #[tokio::test]
    async fn test_length_bound_with_failing_trims() {
        // Two windows over one store stand in for two writers sharing a key.
        let store = Arc::new(MemoryListStore::new());
        let config = cache_config(5);
        let first = RecentWindow::with_store(Arc::clone(&store), &config);
        let second = RecentWindow::with_store(Arc::clone(&store), &config);

        for i in 0..5 {
            first.store(format!("seed-{}", i).as_bytes()).await;
        }

        store.fail_next_trims(2);
        first.store(b"a").await;
        second.store(b"b").await;
        assert!(store.len("tweets") <= 5 + 2);

        first.store(b"c").await;
        second.store(b"d").await;
        assert_eq!(store.len("tweets"), 5);
        assert_eq!(texts(first.recent(2).await), vec!["d", "c"]);
    }
}

mod redis_integration {
    use super::*;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::redis::{Redis, REDIS_PORT};

    /// Window semantics against a real Redis list.
    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_window_against_redis() {
        let redis = Redis::default()
            .start()
            .await
            .expect("Failed to start Redis container");
        let port = redis
            .get_host_port_ipv4(REDIS_PORT)
            .await
            .expect("Failed to get Redis port");

        let config = CacheConfig {
            url: format!("redis://127.0.0.1:{}", port),
            capacity: 3,
            ..CacheConfig::default()
        };
        let window = RecentWindow::connect(&config)
            .await
            .expect("Failed to connect to Redis");

        assert!(window.recent(5).await.is_empty());
        for tweet in ["t1", "t2", "t3", "t4"] {
            window.store(tweet.as_bytes()).await;
        }

        assert_eq!(texts(window.recent(10).await), vec!["t4", "t3", "t2"]);
        assert_eq!(texts(window.recent(1).await), vec!["t4"]);
        assert!(window.health().is_healthy());
    }

    /// Connecting to a port nobody listens on fails at setup.
    #[tokio::test]
    async fn test_connect_refused_is_cache_error() {
        let config = CacheConfig {
            url: "redis://127.0.0.1:1".into(),
            connect_timeout_ms: 500,
            ..CacheConfig::default()
        };

        let result = RecentWindow::connect(&config).await;
        assert!(matches!(result, Err(k2r_core::Error::Cache(_))));
    }

    /// Reads one RESP command (an array of bulk strings).
    async fn read_command<R>(reader: &mut R) -> Option<Vec<Vec<u8>>>
    where
        R: tokio::io::AsyncBufRead + Unpin,
    {
        use tokio::io::{AsyncBufReadExt, AsyncReadExt};

        let mut header = String::new();
        if reader.read_line(&mut header).await.ok()? == 0 {
            return None;
        }
        let count: usize = header.trim_end().strip_prefix('*')?.parse().ok()?;

        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let mut len_line = String::new();
            reader.read_line(&mut len_line).await.ok()?;
            let len: usize = len_line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut arg = vec![0u8; len + 2];
            reader.read_exact(&mut arg).await.ok()?;
            arg.truncate(len);
            args.push(arg);
        }
        Some(args)
    }

    /// A server that answers the connect handshake but never replies to
    /// LPUSH. Returns its URL.
    async fn stalling_server() -> String {
        use tokio::io::{AsyncWriteExt, BufReader};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);
                    while let Some(args) = read_command(&mut reader).await {
                        let name = args
                            .first()
                            .map(|a| a.to_ascii_uppercase())
                            .unwrap_or_default();
                        let reply: &[u8] = match name.as_slice() {
                            b"LPUSH" => continue,
                            b"LLEN" => b":0\r\n",
                            b"LRANGE" => b"*0\r\n",
                            _ => b"+OK\r\n",
                        };
                        if write.write_all(reply).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        format!("redis://{}", addr)
    }

    fn stalling_config(url: String) -> CacheConfig {
        CacheConfig {
            url,
            connect_timeout_ms: 1000,
            command_timeout_ms: 100,
            ..CacheConfig::default()
        }
    }

    /// A write that never gets a reply is abandoned and degrades the window.
    #[tokio::test]
    async fn test_unanswered_write_is_skipped() {
        let config = stalling_config(stalling_server().await);
        let window = RecentWindow::connect(&config).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), window.store(b"x"))
            .await
            .expect("store must not wait for a reply forever");

        assert_eq!(outcome, StoreOutcome::Skipped);
        assert!(window.trim_pending());
        match window.health() {
            CacheHealth::Degraded(reason) => assert!(reason.contains("LPUSH"), "{}", reason),
            CacheHealth::Healthy => panic!("expected degraded cache"),
        }

        // Later commands on the stalled connection are bounded as well.
        let outcome = tokio::time::timeout(Duration::from_secs(5), window.store(b"y"))
            .await
            .expect("heal must not wait for a reply forever");
        assert_eq!(outcome, StoreOutcome::Skipped);
    }

    /// The loop keeps consuming while the store stops answering.
    #[tokio::test]
    async fn test_loop_survives_unanswered_store() {
        let config = stalling_config(stalling_server().await);
        let window = Arc::new(RecentWindow::connect(&config).await.unwrap());

        let token = CancellationToken::new();
        let source = ScriptedSource::new(
            vec![record("one"), record("two"), record("three")],
            token.clone(),
        );
        let observer = RecordingObserver::default();
        let health = Arc::new(HealthCheck::for_pipeline());

        let mut consumer = ConsumerLoop::new(source, Arc::clone(&window), settings(5))
            .unwrap()
            .with_shutdown(token)
            .with_observer(observer.clone())
            .with_health(Arc::clone(&health));

        let summary = tokio::time::timeout(Duration::from_secs(10), consumer.run())
            .await
            .expect("loop must not stall on the store")
            .unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(consumer.state(), ConsumerState::Closed);
        assert!(!window.health().is_healthy());
        assert!(matches!(
            health.get_component_status(CACHE_COMPONENT),
            Some(ComponentStatus::Degraded(_))
        ));
        assert_eq!(observer.events().last(), Some(&Event::Shutdown));
    }
}

mod kafka_integration {
    use super::*;
    use k2r_core::config::Config;
    use k2r_core::kafka::{KafkaConsumerBuilder, RecordProducer};
    use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
    use rdkafka::client::DefaultClientContext;
    use rdkafka::config::ClientConfig;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::kafka::Kafka;

    /// Stops the loop once the expected number of records was seen.
    struct StopAfter {
        remaining: usize,
        token: CancellationToken,
        recorder: RecordingObserver,
    }

    impl LoopObserver for StopAfter {
        fn on_record(&mut self, record: &Record, recent: &[Vec<u8>]) {
            self.recorder.on_record(record, recent);
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.token.cancel();
            }
        }
    }

    /// Produce with the record producer, consume with the stream source.
    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_produce_then_consume_into_window() {
        let kafka = Kafka::default()
            .start()
            .await
            .expect("Failed to start Kafka container");
        let bootstrap_servers = format!(
            "127.0.0.1:{}",
            kafka
                .get_host_port_ipv4(9093)
                .await
                .expect("Failed to get Kafka port")
        );

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &bootstrap_servers)
            .create()
            .expect("Failed to create admin client");
        admin
            .create_topics(
                &[NewTopic::new("tweets", 1, TopicReplication::Fixed(1))],
                &AdminOptions::new(),
            )
            .await
            .expect("Failed to create topic");

        let mut config = Config::default_local();
        config.kafka.bootstrap_servers = vec![bootstrap_servers];
        config.cache.capacity = 3;

        let mut producer = RecordProducer::new(&config.kafka, &config.producer).unwrap();
        for tweet in ["t1", "t2", "t3", "t4"] {
            producer.produce("tweets", None, tweet.as_bytes()).unwrap();
        }
        let report = producer.flush(Duration::from_secs(10));
        assert!(report.all_delivered());

        let token = CancellationToken::new();
        let recorder = RecordingObserver::default();
        let window = Arc::new(RecentWindow::with_store(
            MemoryListStore::new(),
            &config.cache,
        ));
        let source = KafkaConsumerBuilder::new(config.kafka.clone())
            .build()
            .unwrap();

        let mut consumer = ConsumerLoop::new(source, Arc::clone(&window), LoopSettings::from_config(&config))
            .unwrap()
            .with_shutdown(token.clone())
            .with_observer(StopAfter {
                remaining: 4,
                token: token.clone(),
                recorder: recorder.clone(),
            });

        let summary = tokio::time::timeout(Duration::from_secs(60), consumer.run())
            .await
            .expect("Consumer did not see all records")
            .unwrap();

        assert_eq!(summary.records, 4);
        assert_eq!(consumer.state(), ConsumerState::Closed);
        assert_eq!(texts(window.recent(5).await), vec!["t4", "t3", "t2"]);
    }
}
