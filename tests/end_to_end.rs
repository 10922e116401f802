use chrono::{DateTime, Duration, TimeZone, Utc};
use cogload_flux::dispatch::{SubscriberRegistry, WRISTBAND_STREAMS};
use cogload_flux::measurement_log::{read_values, MeasurementLog};
use cogload_flux::window::ChannelWindows;
use cogload_flux::{
    channels, forecast_series, ComputeError, CoreConfig, ForecastConfig, HandlerConfig, Measurement, Phase,
    Predictor, Sample, WindowedHandler, WristbandMeasure,
};
use pretty_assertions::assert_eq;

/// Mean 5, population standard deviation 1
const CALIBRATION: [f64; 10] = [3.5, 5.5, 6.0, 4.0, 5.5, 6.5, 4.0, 6.0, 4.0, 5.0];

fn window_mean(windows: &ChannelWindows) -> Result<Measurement, ComputeError> {
    let values = windows.primary();
    Ok(Measurement::Scalar(values.iter().sum::<f64>() / values.len() as f64))
}

fn make_start() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn make_forecast_config() -> ForecastConfig {
    ForecastConfig {
        order_max: 3,
        ..Default::default()
    }
}

#[test]
fn test_handler_baseline_scenario() {
    let config = HandlerConfig {
        window_length: 3,
        window_step: 3,
        baseline_length: 2,
        ..Default::default()
    };
    let mut handler = WindowedHandler::new("mean", ["x"], window_mean, &config).unwrap();
    let start = make_start();

    let mut rows = Vec::new();
    for (i, value) in [1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0].iter().enumerate() {
        let sample = Sample::scalar("x", *value, start + Duration::seconds(i as i64));
        if let Some(row) = handler.add_data_point(&sample).unwrap() {
            rows.push(row);
        }
        if i == 5 {
            assert_eq!(handler.phase(), Phase::SteadyState);
            assert_eq!(handler.baseline().unwrap().values(), &[1.5]);
        }
    }

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, 2.0);
    assert_eq!(rows[0].timestamp, start + Duration::seconds(8));
}

#[test]
fn test_predictor_scenario() {
    let mut predictor = Predictor::new(&CALIBRATION, &make_forecast_config()).unwrap();
    assert_eq!(predictor.mean_initial(), 5.0);
    assert_eq!(predictor.std_initial(), 1.0);

    let tick = predictor.update_and_predict(5.0).unwrap();
    assert_eq!(tick.standardized_observation, 0.0);

    let tick = predictor.update_and_predict(7.0).unwrap();
    assert_eq!(tick.standardized_observation, 2.0);
    assert!(tick.is_outlier);
}

#[test]
fn test_forecast_series_over_measurement_log() {
    let path = std::env::temp_dir().join(format!("cogflux-{}.csv", uuid::Uuid::new_v4()));
    let config = HandlerConfig {
        window_length: 1,
        window_step: 1,
        calculate_baseline: false,
        ..Default::default()
    };
    let mut handler = WindowedHandler::new("mean", ["x"], window_mean, &config)
        .unwrap()
        .with_sink(MeasurementLog::new(&path, Vec::new()));

    let start = make_start();
    let mut values = CALIBRATION.to_vec();
    values.extend([5.0, 5.5, 7.0]);
    for (i, value) in values.iter().enumerate() {
        let sample = Sample::scalar("x", *value, start + Duration::seconds(i as i64));
        handler.add_data_point(&sample).unwrap();
    }

    let logged = read_values(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(logged, values);

    let records = forecast_series(&logged, &make_forecast_config()).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].standardized_observation, 0.0);
    assert_eq!(records[2].standardized_observation, 2.0);
    assert!(records[2].is_outlier);
    assert_eq!(records[2].tick, 3);
}

#[test]
fn test_wristband_dispatch() {
    let config = HandlerConfig {
        window_length: 8,
        window_step: 4,
        baseline_length: 1,
        ..Default::default()
    };
    let mut registry = SubscriberRegistry::new(WRISTBAND_STREAMS.iter().copied());
    for measure in [WristbandMeasure::Arousal, WristbandMeasure::Entertainment] {
        let handler = WindowedHandler::new(measure.name(), [measure.channel()], measure, &config).unwrap();
        registry.subscribe(measure.channel(), handler).unwrap();
    }
    assert_eq!(registry.subscriber_count(channels::EDA), 1);
    assert_eq!(registry.subscriber_count(channels::HEART_RATE), 1);

    let start = make_start();
    let mut eda_rows = Vec::new();
    let mut hr_rows = Vec::new();
    for i in 0..16 {
        let timestamp = start + Duration::milliseconds(i * 250);
        let eda = 1.0 + 0.1 * (i % 3) as f64;
        let hr = 70.0 + (i % 5) as f64;

        let dispatched = registry.dispatch(channels::EDA, &Sample::scalar(channels::EDA, eda, timestamp));
        assert!(dispatched.errors.is_empty());
        eda_rows.extend(dispatched.rows);

        let dispatched = registry.dispatch(channels::HEART_RATE, &Sample::scalar(channels::HEART_RATE, hr, timestamp));
        assert!(dispatched.errors.is_empty());
        hr_rows.extend(dispatched.rows);
    }

    // Measurements after samples 8, 12 and 16; the first fixes the baseline
    assert_eq!(eda_rows.len(), 2);
    assert_eq!(hr_rows.len(), 2);
    assert!(eda_rows.iter().all(|(name, _)| name == "arousal"));
    assert_eq!(hr_rows[0].1.features.len(), WristbandMeasure::Entertainment.headers().len());

    assert!(registry
        .dispatch("gaze", &Sample::scalar(channels::LEFT_PUPIL, 3.0, start))
        .rows
        .is_empty());
}

#[test]
fn test_config_round_trip_drives_pipeline() {
    let json = r#"{
        "handler": { "window_length": 124, "window_step": 62, "baseline_length": 3 },
        "forecasting": { "calibration_length": 12, "order_min": 1, "order_max": 2 },
        "log": { "level": "debug", "format": "json" }
    }"#;
    let config = CoreConfig::from_json(json).unwrap();
    assert_eq!(config.handler.sampling_rate_hz, 120.0);
    assert_eq!(config.forecasting.reestimate_every, 41);

    let parsed = CoreConfig::from_json(&config.to_json().unwrap()).unwrap();
    assert_eq!(parsed, config);

    let pipeline = cogload_flux::LoadPipeline::new(&config).unwrap();
    assert_eq!(pipeline.phase(), Phase::Uninitialized);
    assert!(pipeline.predictor().is_none());
}
