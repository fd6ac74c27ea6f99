//! End-to-end tests for the decode → store → query pipeline

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tephra::*;

fn random_packet(rng: &mut StdRng, revision: ProtocolRevision) -> Packet {
    let environment = Environment {
        latitude: rng.gen_range(-90.0..90.0),
        longitude: rng.gen_range(-180.0..180.0),
        altitude: rng.gen_range(10.0..100.0),
        co2: rng.gen_range(400.0..2000.0),
        so2: rng.gen_range(0.0..500.0),
    };
    Packet::standard(
        revision,
        rng.gen_range(1..=u16::MAX),
        rng.gen_range(0..=100),
        [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ],
        [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ],
        rng.gen_range(0.0..5.0),
        rng.gen_range(15.0..35.0),
        rng.gen_range(980.0..1020.0),
        Some(environment),
    )
}

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600 + secs, 0).unwrap()
}

// ============================================================================
// Codec
// ============================================================================

#[test]
fn test_codec_roundtrip_random_packets() {
    let mut rng = StdRng::seed_from_u64(42);

    for revision in [ProtocolRevision::V1, ProtocolRevision::V2] {
        let encoder = Encoder::new(revision);
        let decoder = Decoder::new(revision);

        for _ in 0..200 {
            let packet = random_packet(&mut rng, revision);
            let bytes = encoder.encode(&packet).unwrap();
            assert_eq!(bytes.len(), revision.min_len());

            let decoded = decoder.decode_packet(&bytes).unwrap();
            assert_eq!(decoded.device_id, packet.device_id);
            assert_eq!(decoded.blocks.len(), packet.blocks.len());

            for (got, want) in decoded.blocks.iter().zip(&packet.blocks) {
                match (got, want) {
                    (SensorBlock::Acceleration(g), SensorBlock::Acceleration(w))
                        if revision == ProtocolRevision::V1 =>
                    {
                        // milli-g quantization
                        for (a, b) in g.iter().zip(w) {
                            assert!((a - b).abs() <= 0.0005 + f32::EPSILON);
                        }
                    }
                    (SensorBlock::Position(g), SensorBlock::Position(w)) => {
                        for (a, b) in g.iter().zip(w) {
                            assert_relative_eq!(*a, *b, max_relative = 1e-5);
                        }
                    }
                    _ => assert_eq!(got, want),
                }
            }
        }
    }
}

#[test]
fn test_reference_packet_values() {
    let packet = Packet::standard(
        ProtocolRevision::V1,
        1234,
        85,
        [1.0, 2.0, 3.0, 4.0],
        [0.1, 0.2, 0.3],
        0.5,
        25.5,
        1013.25,
        None,
    );
    let bytes = Encoder::new(ProtocolRevision::V1).encode(&packet).unwrap();
    let set = Decoder::new(ProtocolRevision::V1)
        .decode_at(&bytes, ts(0))
        .unwrap();

    assert_eq!(set.device_id, 1234);
    assert_eq!(set.get(Channel::Battery).unwrap().value, Value::Scalar(85.0));
    assert_eq!(
        set.get(Channel::Pressure).unwrap().value,
        Value::Scalar(1013.25)
    );
    assert_relative_eq!(
        set.get(Channel::AccelerationZ).unwrap().value.as_scalar().unwrap(),
        0.3,
        max_relative = 1e-5
    );
    assert!(set.readings.iter().all(|r| r.timestamp == ts(0)));
}

#[test]
fn test_malformed_input_never_panics() {
    let mut rng = StdRng::seed_from_u64(7);

    for revision in [ProtocolRevision::V1, ProtocolRevision::V2] {
        let decoder = Decoder::new(revision);
        for _ in 0..2000 {
            let len = rng.gen_range(0..120);
            let mut bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            if !bytes.is_empty() && rng.gen_bool(0.5) {
                bytes[0] = len as u8;
            }
            let _ = decoder.decode(&bytes);
        }
    }
}

#[test]
fn test_store_untouched_by_rejected_packets() {
    let store = ChannelStore::new(10);
    let decoder = Decoder::new(ProtocolRevision::V2);

    for bytes in [vec![], vec![0u8; 10], vec![77u8; 77]] {
        if let Ok(set) = decoder.decode(&bytes) {
            store.ingest(&set);
        }
    }
    assert!(store.is_empty());
}

// ============================================================================
// Store
// ============================================================================

#[test]
fn test_eviction_invariant() {
    let mut rng = StdRng::seed_from_u64(3);

    for capacity in [1usize, 2, 5, 50] {
        let store = ChannelStore::new(capacity);
        let total = rng.gen_range(capacity..capacity * 4 + 1);

        for i in 0..total {
            store.write(1, ts(i as i64), [(Channel::Vibration, Value::Scalar(i as f64))]);
            assert!(store.len(Channel::Vibration) <= capacity);
        }

        let kept: Vec<f64> = store
            .read_all(Channel::Vibration)
            .iter()
            .filter_map(|r| r.value.as_scalar())
            .collect();
        let expected: Vec<f64> = (total - capacity.min(total)..total).map(|i| i as f64).collect();
        assert_eq!(kept, expected);
    }
}

#[test]
fn test_ingest_full_set_is_visible_together() {
    let packet = Packet::standard(
        ProtocolRevision::V2,
        9,
        60,
        [0.0, 0.0, 0.0, 1.0],
        [0.0, 0.0, 1.0],
        0.3,
        22.0,
        1001.0,
        None,
    );
    let bytes = Encoder::new(ProtocolRevision::V2).encode(&packet).unwrap();
    let set = Decoder::new(ProtocolRevision::V2).decode(&bytes).unwrap();

    let store = ChannelStore::new(100);
    store.ingest(&set);

    let latest = QueryEngine::new(&store).latest_all(Some(9));
    for channel in Channel::ALL {
        assert!(latest[&channel].is_some(), "missing {}", channel);
    }
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_filter_correctness() {
    let store = ChannelStore::new(1000);
    for i in 0..100 {
        store.write(
            (i % 4 + 1) as u16,
            ts(i * 30),
            [(Channel::Temperature, Value::Scalar(i as f64))],
        );
    }

    let start = ts(600);
    let end = ts(1500);
    let query = SeriesQuery::parse(
        "temperature",
        Some("2"),
        Some(&start.to_rfc3339()),
        Some(&end.to_rfc3339()),
        TimeRangePolicy::RequireBoth,
    )
    .unwrap();

    let result = QueryEngine::new(&store).query(&query);
    assert!(!result.is_empty());
    for reading in &result {
        assert_eq!(reading.device_id, 2);
        assert!(reading.timestamp >= start && reading.timestamp <= end);
    }

    let expected = store
        .read_all(Channel::Temperature)
        .into_iter()
        .filter(|r| r.device_id == 2 && r.timestamp >= start && r.timestamp <= end)
        .count();
    assert_eq!(result.len(), expected);
}

#[test]
fn test_history_ordering() {
    let store = ChannelStore::new(1000);
    let base = Utc::now();
    for i in 0..20 {
        store.write(
            1,
            base + Duration::seconds(i),
            [(Channel::Pressure, Value::Scalar(1000.0 + i as f64))],
        );
    }

    let query = HistoryQuery::parse("pressure", Some("5"), None).unwrap();
    let history = QueryEngine::new(&store).history(&query);
    assert_eq!(history.len(), 5);
    assert!(history.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    assert_eq!(history[0].value, Value::Scalar(1019.0));
}

// ============================================================================
// Aggregation and rules
// ============================================================================

#[test]
fn test_aggregation_correctness() {
    let store = ChannelStore::new(1000);
    let values = [2.0, -4.0, 6.0];
    for (i, v) in values.iter().enumerate() {
        store.write(1, ts(i as i64), [(Channel::Co2, Value::Scalar(*v))]);
    }

    let result = aggregate(&store, &["co2", "so2"], 100, &MetricSet::all());

    let co2 = &result[&Channel::Co2];
    assert_relative_eq!(co2.metrics[&Metric::Average].unwrap(), 4.0 / 3.0);
    assert_relative_eq!(co2.metrics[&Metric::Peak].unwrap(), 6.0);
    assert_relative_eq!(
        co2.metrics[&Metric::Rms].unwrap(),
        (56.0f64 / 3.0).sqrt(),
        max_relative = 1e-12
    );
    assert_eq!(co2.reading_count, 3);
    assert_eq!(co2.device_count, 1);

    let so2 = &result[&Channel::So2];
    assert!(so2.metrics.values().all(Option::is_none));
    assert_eq!(so2.reading_count, 0);
}

#[test]
fn test_rule_fires_on_ingested_packet() {
    let packet = Packet::standard(
        ProtocolRevision::V2,
        5,
        80,
        [0.0, 0.0, 0.0, 1.0],
        [0.0, 0.0, 1.0],
        0.1,
        60.0,
        1000.0,
        None,
    );
    let bytes = Encoder::new(ProtocolRevision::V2).encode(&packet).unwrap();
    let store = ChannelStore::new(100);
    store.ingest(&Decoder::new(ProtocolRevision::V2).decode(&bytes).unwrap());

    let book = RuleBook::new();
    book.upsert(
        AutomatedRule::new("heat", Channel::Temperature, 50.0, Comparison::Higher, "Too hot")
            .with_target(NotificationChannel::Sms)
            .with_target(NotificationChannel::Telegram),
    );

    let evaluation = book.evaluate(&store);
    assert_eq!(evaluation.alerts.len(), 1);
    let alert = &evaluation.alerts[0];
    assert_eq!(alert.targets.len(), 2);
    assert!(alert.message.contains("60"));
    assert!(alert.message.contains("50"));
    assert_eq!(alert.device_id, 5);
}
