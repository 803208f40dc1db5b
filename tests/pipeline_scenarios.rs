//! End-to-end pipeline runs with simulated devices

mod common;

use common::builders::{constant_source, ConfigBuilder};
use common::mock_helpers::{
    CountingTransformer, FailingChannel, PanickingConsumer, StubbornConsumer, TickingHandler,
};
use common::{test_timeout, wait_until};
use signal_fusion::components::{
    CollectingConsumer, EventLog, SignalPattern, SignalSource, ThresholdDetector,
};
use signal_fusion::{ComponentState, EventState, Pipeline, PipelineError};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

fn state_of(pipeline: &Pipeline, name: &str) -> ComponentState {
    let id = pipeline.component_id(name).expect("component exists");
    pipeline.component_state(id).expect("state exists")
}

#[test]
fn test_transformer_frames_follow_source_rate() {
    let config = ConfigBuilder::new().buffer_seconds(4.0).build();
    let mut pipeline = Pipeline::new(config).unwrap();

    let (sensor, channel) = SignalSource::new("imu", 40.0)
        .with_pattern(SignalPattern::Constant(1.0))
        .with_pattern(SignalPattern::Constant(2.0))
        .with_pattern(SignalPattern::Constant(3.0))
        .build();
    let (_, imu) = pipeline.add_sensor(sensor, channel).unwrap();
    let (transformer, calls) = CountingTransformer::new("counter");
    let out = pipeline.add_transformer(transformer, &[imu], 2.0, 0.0).unwrap();
    assert_eq!(pipeline.buffer(out).unwrap().sample_rate(), 0.5);

    pipeline.start().unwrap();
    std::thread::sleep(Duration::from_secs(11));
    pipeline.stop().unwrap();

    let calls = calls.lock().clone();
    assert_eq!(calls.len(), 5, "calls: {:?}", calls);
    for (k, call) in calls.iter().enumerate() {
        assert_eq!(call.samples, 80);
        common::assert_float_eq(call.time, 2.0 * k as f64, 1e-9);
    }
    assert_eq!(pipeline.buffer(out).unwrap().written_samples(), 5);
}

#[test]
fn test_stalled_channel_is_zero_filled() {
    let config = ConfigBuilder::new().watch_interval_ms(200).build();
    let mut pipeline = Pipeline::new(config).unwrap();

    let (sensor, channel) = SignalSource::new("flaky", 10.0)
        .with_pattern(SignalPattern::Constant(1.0))
        .with_stall(0.95, Duration::from_secs(3))
        .build();
    let (_, flaky) = pipeline.add_sensor(sensor, channel).unwrap();
    let collector = CollectingConsumer::new("collector");
    let records = collector.records();
    pipeline.add_consumer(collector, &[flaky], 1.0, 0.0).unwrap();

    pipeline.start().unwrap();
    std::thread::sleep(Duration::from_millis(5500));
    pipeline.stop().unwrap();

    let windows = records.windows();
    assert!(windows.len() >= 4, "only {} windows", windows.len());
    assert!(windows.iter().all(|w| w.samples == vec![10]));
    assert!(windows[0].values[0].iter().all(|v| *v == 1.0));
    assert!(windows[1].is_all_zero(), "window 1: {:?}", windows[1].values);
    assert!(windows[2].is_all_zero(), "window 2: {:?}", windows[2].values);

    let report = pipeline
        .stats()
        .into_iter()
        .find(|r| r.name == "flaky")
        .unwrap();
    assert!(report.zero_filled_samples >= 20);
}

#[test]
fn test_stop_releases_blocked_consumers() {
    let config = ConfigBuilder::new().close_timeout_ms(2000).build();
    let mut pipeline = Pipeline::new(config).unwrap();

    // The device never connects, so every reader blocks on an empty buffer.
    let (sensor, channel) = SignalSource::new("absent", 10.0)
        .with_connect_failures(u32::MAX)
        .build();
    let (_, absent) = pipeline.add_sensor(sensor, channel).unwrap();
    let mut all_records = Vec::new();
    for i in 0..3 {
        let consumer = CollectingConsumer::new(format!("reader-{}", i));
        all_records.push(consumer.records());
        pipeline.add_consumer(consumer, &[absent], 0.5, 0.0).unwrap();
    }

    pipeline.start().unwrap();
    std::thread::sleep(Duration::from_millis(500));

    let started = Instant::now();
    pipeline.stop().unwrap();
    assert!(started.elapsed() < pipeline.config().close_timeout());

    for report in pipeline.stats() {
        assert_eq!(report.state, ComponentState::Terminated, "{}", report.name);
    }
    for records in &all_records {
        assert!(records.is_empty());
        assert_eq!(records.entered(), 1);
        assert_eq!(records.flushed(), 1);
    }
}

#[test]
fn test_unresponsive_component_is_detached() {
    let config = ConfigBuilder::new().close_timeout_ms(300).build();
    let mut pipeline = Pipeline::new(config).unwrap();

    let (sensor, channel) = constant_source("steady", 10.0, 1, 0.5);
    let (_, steady) = pipeline.add_sensor(sensor, channel).unwrap();
    pipeline
        .add_consumer(
            StubbornConsumer {
                block_for: Duration::from_secs(3),
            },
            &[steady],
            0.1,
            0.0,
        )
        .unwrap();

    pipeline.start().unwrap();
    std::thread::sleep(Duration::from_millis(600));
    pipeline.stop().unwrap();

    assert_eq!(state_of(&pipeline, "stubborn"), ComponentState::Forced);
    assert_eq!(state_of(&pipeline, "steady"), ComponentState::Terminated);
    assert_eq!(
        pipeline.start(),
        Err(PipelineError::ComponentLost("stubborn".to_string()))
    );
    assert!(!pipeline.is_running());
}

#[test]
fn test_fatal_error_requests_stop() {
    let config = ConfigBuilder::new().stop_on_fatal().build();
    let mut pipeline = Pipeline::new(config).unwrap();

    let (sensor, _) = SignalSource::new("broken", 50.0).build();
    pipeline
        .add_sensor(sensor, FailingChannel::new("broken-stream", 5))
        .unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.wait_for_stop_request(test_timeout()));
    assert!(wait_until(test_timeout(), || {
        state_of(&pipeline, "broken-stream") == ComponentState::Dead
    }));
    pipeline.stop().unwrap();

    assert_eq!(state_of(&pipeline, "broken-stream"), ComponentState::Dead);
    assert_eq!(state_of(&pipeline, "broken-device"), ComponentState::Terminated);
    let failures = pipeline.failures();
    let fatal: Vec<_> = failures.iter().filter(|f| f.fatal).collect();
    assert_eq!(fatal.len(), 1);
    assert_eq!(fatal[0].component, "broken-stream");
    assert!(fatal[0].message.contains("garbage"));
}

#[test]
fn test_panicking_consumer_is_isolated() {
    let mut pipeline = Pipeline::new(ConfigBuilder::new().build()).unwrap();

    let (sensor, channel) = constant_source("steady", 10.0, 2, 1.0);
    let (_, steady) = pipeline.add_sensor(sensor, channel).unwrap();
    pipeline
        .add_consumer(PanickingConsumer, &[steady], 0.2, 0.0)
        .unwrap();
    let collector = CollectingConsumer::new("collector");
    let records = collector.records();
    pipeline.add_consumer(collector, &[steady], 0.2, 0.0).unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(test_timeout(), || {
        state_of(&pipeline, "panicking") == ComponentState::Dead
    }));
    let seen = records.len();
    assert!(wait_until(test_timeout(), || records.len() > seen + 2));
    assert!(pipeline.is_running());
    assert!(!pipeline.wait_for_stop_request(Duration::from_millis(10)));
    pipeline.stop().unwrap();

    let failures = pipeline.failures();
    assert!(failures
        .iter()
        .any(|f| f.component == "panicking" && f.fatal && f.message.contains("consumer bug")));
    assert_eq!(state_of(&pipeline, "collector"), ComponentState::Terminated);
}

#[test]
fn test_pipeline_restarts_from_scratch() {
    let mut pipeline = Pipeline::new(ConfigBuilder::new().build()).unwrap();

    let (sensor, channel) = constant_source("steady", 20.0, 1, 2.0);
    let (_, steady) = pipeline.add_sensor(sensor, channel).unwrap();
    let collector = CollectingConsumer::new("collector");
    let records = collector.records();
    pipeline.add_consumer(collector, &[steady], 0.25, 0.0).unwrap();

    for run in 1..=2 {
        pipeline.start().unwrap();
        assert!(wait_until(test_timeout(), || records.len() >= 3));
        pipeline.stop().unwrap();

        assert_eq!(records.entered(), run);
        assert_eq!(records.flushed(), run);
        let windows = records.windows();
        common::assert_float_eq(windows[0].time, 0.0, 1e-9);
        common::assert_float_eq(windows[1].time, 0.25, 1e-9);
        assert!(windows.iter().all(|w| w.values[0].iter().all(|v| *v == 2.0)));
        records.clear();
    }
    assert!(pipeline.stats().iter().all(|r| r.state == ComponentState::Terminated));
}

#[test]
fn test_events_trigger_span_consumer() {
    let mut pipeline = Pipeline::new(ConfigBuilder::new().buffer_seconds(4.0).build()).unwrap();

    let (sensor, channel) = SignalSource::new("pulse", 20.0)
        .with_pattern(SignalPattern::Square {
            period: 1.0,
            amplitude: 1.0,
        })
        .build();
    let (_, pulse) = pipeline.add_sensor(sensor, channel).unwrap();

    let detector = pipeline
        .add_consumer(ThresholdDetector::new("detector", 0, 0.5), &[pulse], 0.5, 0.0)
        .unwrap();
    let events = pipeline.register_event_provider(detector).unwrap();

    let spans = CollectingConsumer::new("spans");
    let span_records = spans.records();
    pipeline.add_event_consumer(spans, &[pulse], &events).unwrap();

    let log = EventLog::new("log");
    let log_records = log.records();
    let log_id = pipeline.add_event_handler(log).unwrap();
    pipeline.register_event_listener(log_id, &events).unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || span_records.len() >= 2));
    pipeline.stop().unwrap();

    for window in span_records.windows() {
        let event = window.event.as_ref().expect("triggering event");
        assert_eq!(event.state, EventState::Complete);
        assert_eq!(event.duration_ms, 500);
        assert_eq!(event.time_ms % 1000, 0);
        assert_eq!(window.samples, vec![10]);
        assert!(window.values[0].iter().all(|v| *v == 1.0));
    }

    let logged = log_records.events();
    assert!(logged.iter().any(|e| e.state == EventState::Start));
    assert!(logged
        .iter()
        .any(|e| e.state == EventState::Complete && e.duration_ms == 500));
}

fn report_of(pipeline: &Pipeline, name: &str) -> signal_fusion::ComponentReport {
    pipeline
        .stats()
        .into_iter()
        .find(|r| r.name == name)
        .expect("component report")
}

#[test]
fn test_sensor_reconnects_after_dropout() {
    let mut pipeline = Pipeline::new(ConfigBuilder::new().build()).unwrap();

    let (sensor, channel) = SignalSource::new("dropout", 10.0)
        .with_pattern(SignalPattern::Constant(1.0))
        .with_dropout(4)
        .build();
    let device = sensor.monitor();
    let (_, dropout) = pipeline.add_sensor(sensor, channel).unwrap();
    let buffer = pipeline.buffer(dropout).unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(test_timeout(), || device.connection_losses() == 1));
    assert!(wait_until(test_timeout(), || device.is_connected()));
    let resumed_at = buffer.position_samples();
    assert!(wait_until(test_timeout(), || buffer.position_samples() >= resumed_at + 5));
    pipeline.stop().unwrap();

    assert_eq!(device.connect_attempts(), 2);
    assert_eq!(device.connection_losses(), 1);
    assert_eq!(state_of(&pipeline, "dropout-device"), ComponentState::Terminated);
    assert_eq!(state_of(&pipeline, "dropout"), ComponentState::Terminated);
}

#[test]
fn test_overlapping_windows_share_samples() {
    let mut pipeline = Pipeline::new(ConfigBuilder::new().build()).unwrap();

    let (sensor, channel) = SignalSource::new("counter", 10.0)
        .with_pattern(SignalPattern::Counter {
            step: 1.0,
            min: 0.0,
            max: 10_000.0,
        })
        .build();
    let (_, counter) = pipeline.add_sensor(sensor, channel).unwrap();
    let collector = CollectingConsumer::new("overlap");
    let records = collector.records();
    // 5-sample frames, each window reaching 3 samples further
    pipeline.add_consumer(collector, &[counter], 0.5, 0.3).unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || records.len() >= 3));
    pipeline.stop().unwrap();

    for (k, window) in records.windows().iter().take(3).enumerate() {
        let first = 5 * k;
        let expected: Vec<f64> = (first..first + 8).map(|v| v as f64).collect();
        assert_eq!(window.samples, vec![8]);
        assert_eq!(window.values[0], expected, "window {}", k);
        common::assert_float_eq(window.time, 0.5 * k as f64, 1e-9);
    }
}

#[test]
fn test_cancelled_countdown_fails_start() {
    let mut config = ConfigBuilder::new().build();
    config.countdown_seconds = 2;
    let mut pipeline = Pipeline::new(config).unwrap();

    let (sensor, channel) = constant_source("steady", 10.0, 1, 1.0);
    let (_, steady) = pipeline.add_sensor(sensor, channel).unwrap();
    let collector = CollectingConsumer::new("collector");
    let records = collector.records();
    pipeline.add_consumer(collector, &[steady], 0.2, 0.0).unwrap();

    let cancel = pipeline.start_cancel_token();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        cancel.cancel();
    });
    let started = Instant::now();
    let result = pipeline.start();
    canceller.join().unwrap();

    assert!(matches!(result, Err(PipelineError::StartBarrier(_))), "{:?}", result);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!pipeline.is_running());
    for report in pipeline.stats() {
        assert_eq!(report.state, ComponentState::Terminated, "{}", report.name);
    }
    assert!(records.is_empty());
}

#[test]
fn test_free_running_handler_ends_its_loop() {
    let mut pipeline = Pipeline::new(ConfigBuilder::new().build()).unwrap();

    let summary = pipeline
        .add_event_handler(EventLog::new("summary").with_summary_interval(Duration::from_millis(50)))
        .unwrap();
    let (ticking, ticks) = TickingHandler::new(Duration::from_millis(20), 5);
    pipeline.add_event_handler(ticking).unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(test_timeout(), || {
        state_of(&pipeline, "ticking") == ComponentState::Terminated
    }));
    assert!(pipeline.is_running());
    assert!(wait_until(test_timeout(), || report_of(&pipeline, "summary").iterations >= 3));
    assert_eq!(pipeline.component_state(summary), Some(ComponentState::Running));
    pipeline.stop().unwrap();

    assert_eq!(ticks.load(Ordering::SeqCst), 5);
    // The step that returned false is not an iteration.
    assert_eq!(report_of(&pipeline, "ticking").iterations, 4);
    assert_eq!(state_of(&pipeline, "summary"), ComponentState::Terminated);
}
