//! End-to-end control cycles against the mock driver.

use std::sync::Arc;
use std::time::Duration;

use airtouch_core::{MockDriver, MockOp, MockZone};
use airtouch_service::{AppState, Config, CycleOutcome, FaultReason, Orchestrator, ZoneConfig};
use airtouch_store::Lookup;
use airtouch_types::{ManualClock, TargetMode, ZoneId};
use time::{Date, Month, OffsetDateTime};

struct Harness {
    orchestrator: Arc<Orchestrator>,
    state: Arc<AppState>,
    driver: Arc<MockDriver>,
    clock: Arc<ManualClock>,
}

fn noon() -> OffsetDateTime {
    Date::from_calendar_date(2026, Month::March, 2)
        .unwrap()
        .with_hms(12, 0, 0)
        .unwrap()
        .assume_utc()
}

fn zone(id: &str) -> ZoneId {
    ZoneId::new(id).unwrap()
}

fn zone_config(id: &str) -> ZoneConfig {
    ZoneConfig {
        id: id.to_string(),
        alias: None,
        target: None,
        mode: None,
    }
}

fn config_for(ids: &[&str]) -> Config {
    let mut config = Config::default();
    config.zones = ids.iter().map(|id| zone_config(id)).collect();
    config
}

fn harness(config: Config, driver: MockDriver) -> Harness {
    let clock = Arc::new(ManualClock::new(noon()));
    let state = AppState::new(config, clock.clone()).unwrap();
    let driver = Arc::new(driver);
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&state), driver.clone()).unwrap());
    Harness {
        orchestrator,
        state,
        driver,
        clock,
    }
}

fn hot_zone(id: &str) -> MockZone {
    MockZone::new(zone(id)).temperature(25.0).airflow(0.2).setpoint(22.0)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn test_fault_is_isolated_to_its_zone() {
    let h = harness(
        config_for(&["a", "b"]),
        MockDriver::builder()
            .zone(hot_zone("a"))
            .zone(hot_zone("b"))
            .build(),
    );
    h.driver.fail(&zone("a"), MockOp::Write, "bus error").await;

    let records = h.orchestrator.run_cycle().await;
    assert_eq!(records.len(), 2);

    let a = &records[0];
    assert_eq!(a.zone, zone("a"));
    assert!(a.faulted);
    assert!(matches!(
        a.fault(),
        Some(FaultReason::Command { message }) if message.contains("bus error")
    ));

    let b = &records[1];
    assert!(!b.faulted);
    let command = b.command().unwrap();
    assert_close(command.new_airflow_fraction, 0.3);
    assert_eq!(command.new_set_temperature, 22.0);

    // The healthy zone is cached optimistically and recorded.
    let cached = h.state.cache.get(&zone("b")).fresh().unwrap();
    assert_close(cached.airflow_fraction, 0.3);
    let sample = h.state.samples.latest(&zone("b")).unwrap();
    assert_eq!(sample.measured_temperature, 25.0);
    assert_close(sample.airflow_fraction, 0.3);
    assert!(sample.power_on);

    // The failed zone is invalidated and records nothing.
    assert!(matches!(
        h.state.cache.get(&zone("a")),
        Lookup::Stale {
            last_known: Some(_)
        }
    ));
    assert!(h.state.samples.is_empty(&zone("a")));
    assert_close(
        h.driver.zone_state(&zone("a")).await.unwrap().airflow_fraction,
        0.2,
    );

    let stats = h.state.control.stats().await;
    assert_eq!(stats[0].zone, zone("a"));
    assert!(stats[0].is_faulted());
    assert_eq!(stats[1].commanded_count, 1);

    // Next tick: the invalidated zone is read again, the healthy one is not.
    h.driver.clear_failures().await;
    h.clock.advance(time::Duration::minutes(1));
    let reads_before = h.driver.read_count();
    let records = h.orchestrator.run_cycle().await;
    assert!(records.iter().all(|r| r.command().is_some()));
    assert_eq!(h.driver.read_count(), reads_before + 1);
}

#[tokio::test]
async fn test_ramp_limited_cooling_over_cycles() {
    let h = harness(
        config_for(&["den"]),
        MockDriver::builder()
            .zone(hot_zone("den").airflow(0.25))
            .build(),
    );

    let mut airflow = Vec::new();
    let mut setpoints = Vec::new();
    for _ in 0..5 {
        let records = h.orchestrator.run_cycle().await;
        let command = records[0].command().unwrap().clone();
        airflow.push(command.new_airflow_fraction);
        setpoints.push(command.new_set_temperature);
        h.clock.advance(time::Duration::minutes(1));
    }

    for (actual, expected) in airflow.iter().zip([0.35, 0.45, 0.55, 0.65, 0.75]) {
        assert_close(*actual, expected);
    }
    // The setpoint is pushed only once airflow exceeds one half.
    assert_eq!(setpoints, [22.0, 22.0, 22.0, 21.0, 20.0]);

    // Every cycle after the first used the optimistic cache entry.
    assert_eq!(h.driver.read_count(), 1);
    assert_eq!(h.driver.write_count(), 5);
    assert_eq!(h.state.samples.len(&zone("den")), 5);
}

#[tokio::test]
async fn test_dead_band_holds_airflow_and_setpoint() {
    let h = harness(
        config_for(&["den"]),
        MockDriver::builder()
            .zone(MockZone::new(zone("den")).temperature(22.2).airflow(0.4))
            .build(),
    );

    let records = h.orchestrator.run_cycle().await;
    let command = records[0].command().unwrap();
    assert_eq!(command.new_airflow_fraction, 0.4);
    assert_eq!(command.new_set_temperature, 22.0);
}

#[tokio::test]
async fn test_off_mode_and_unit_off_close_the_damper() {
    let mut config = config_for(&["pinned", "unit"]);
    config.zones[0].mode = Some(TargetMode::Off);
    let h = harness(
        config,
        MockDriver::builder()
            .zone(hot_zone("pinned").setpoint(23.0))
            .zone(hot_zone("unit").power_on(false))
            .build(),
    );

    let records = h.orchestrator.run_cycle().await;
    let pinned = records[0].command().unwrap();
    assert_eq!(pinned.new_airflow_fraction, 0.0);
    assert_eq!(pinned.new_set_temperature, 23.0);
    assert!(!pinned.power_on());

    let unit = records[1].command().unwrap();
    assert_eq!(unit.new_airflow_fraction, 0.0);

    let sample = h.state.samples.latest(&zone("pinned")).unwrap();
    assert!(!sample.power_on);
    assert_eq!(sample.airflow_fraction, 0.0);
}

#[tokio::test]
async fn test_sleep_window_uses_sleep_target() {
    let mut config = config_for(&["bed", "office"]);
    config.targets.sleep_start = "11:00".to_string();
    config.targets.sleep_end = "13:00".to_string();
    config.targets.t_target_sleep = 24.0;
    config.zones[1].mode = Some(TargetMode::Awake);

    let h = harness(
        config,
        MockDriver::builder()
            .zone(MockZone::new(zone("bed")).temperature(24.2))
            .zone(MockZone::new(zone("office")).temperature(24.2))
            .build(),
    );

    let records = h.orchestrator.run_cycle().await;
    // Asleep: 0.2 above the sleep target is inside the dead band.
    assert_close(records[0].command().unwrap().new_airflow_fraction, 0.2);
    // Pinned awake: 2.2 above the day target, so cooling ramps up.
    assert_close(records[1].command().unwrap().new_airflow_fraction, 0.3);
}

#[tokio::test]
async fn test_stale_cache_is_refreshed_after_ttl() {
    let h = harness(
        config_for(&["den"]),
        MockDriver::builder().zone(hot_zone("den")).build(),
    );

    h.orchestrator.run_cycle().await;
    assert_eq!(h.driver.read_count(), 1);

    h.clock.advance(time::Duration::minutes(1));
    h.orchestrator.run_cycle().await;
    assert_eq!(h.driver.read_count(), 1);

    h.clock.advance(time::Duration::minutes(5));
    h.orchestrator.run_cycle().await;
    assert_eq!(h.driver.read_count(), 2);
}

#[tokio::test]
async fn test_refresh_failure_faults_without_writing() {
    let h = harness(
        config_for(&["den"]),
        MockDriver::builder().zone(hot_zone("den")).build(),
    );
    h.driver.fail(&zone("den"), MockOp::Read, "no route").await;

    let records = h.orchestrator.run_cycle().await;
    assert!(matches!(records[0].fault(), Some(FaultReason::Refresh { .. })));
    assert_eq!(h.driver.write_count(), 0);
    assert!(h.state.samples.is_empty(&zone("den")));
}

#[tokio::test]
async fn test_transient_fault_recovers_next_tick() {
    let h = harness(
        config_for(&["den"]),
        MockDriver::builder().zone(hot_zone("den")).build(),
    );
    h.driver.fail_transient(&zone("den"), MockOp::Sense, 1).await;

    let first = h.orchestrator.run_cycle().await;
    assert!(matches!(first[0].fault(), Some(FaultReason::Sense { .. })));

    h.clock.advance(time::Duration::minutes(1));
    let second = h.orchestrator.run_cycle().await;
    assert!(matches!(second[0].outcome, CycleOutcome::Commanded { .. }));
    assert!(!second[0].faulted);
}

#[tokio::test]
async fn test_out_of_order_telemetry_faults() {
    let h = harness(
        config_for(&["den"]),
        MockDriver::builder().zone(hot_zone("den")).build(),
    );
    h.clock.advance(time::Duration::minutes(5));
    h.orchestrator.run_cycle().await;

    h.clock.set(noon());
    let records = h.orchestrator.run_cycle().await;
    assert!(matches!(records[0].fault(), Some(FaultReason::OutOfOrder { .. })));
    assert_eq!(h.driver.write_count(), 1);
}

#[tokio::test]
async fn test_target_outside_unit_range_faults() {
    let mut config = config_for(&["den"]);
    config.zones[0].target = Some(34.0);
    let h = harness(
        config,
        MockDriver::builder().zone(hot_zone("den")).build(),
    );

    let records = h.orchestrator.run_cycle().await;
    assert_eq!(
        records[0].fault(),
        Some(&FaultReason::InvalidTarget {
            target: 34.0,
            min: 16.0,
            max: 30.0
        })
    );
    assert_eq!(h.driver.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_busy_zone_is_skipped() {
    let h = harness(
        config_for(&["den"]),
        MockDriver::builder()
            .zone(hot_zone("den"))
            .latency(Duration::from_secs(2))
            .build(),
    );

    let slow = tokio::spawn({
        let orchestrator = Arc::clone(&h.orchestrator);
        async move { orchestrator.run_cycle().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let overlapping = h.orchestrator.run_cycle().await;
    assert_eq!(overlapping[0].outcome, CycleOutcome::Skipped);
    assert!(!overlapping[0].faulted);

    let finished = slow.await.unwrap();
    assert!(finished[0].command().is_some());

    let stats = h.state.control.stats().await;
    assert_eq!(stats[0].skipped_count, 1);
    assert_eq!(stats[0].commanded_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_driver_times_out() {
    let h = harness(
        config_for(&["den"]),
        MockDriver::builder()
            .zone(hot_zone("den"))
            .latency(Duration::from_secs(30))
            .build(),
    );

    let records = h.orchestrator.run_cycle().await;
    assert!(matches!(
        records[0].fault(),
        Some(FaultReason::Sense { message }) if message.contains("timed out")
    ));
}

#[tokio::test(start_paused = true)]
async fn test_loop_publishes_records_until_stopped() {
    let h = harness(
        config_for(&["a", "b"]),
        MockDriver::builder()
            .zone(hot_zone("a"))
            .zone(hot_zone("b"))
            .build(),
    );
    let mut rx = h.state.records_tx.subscribe();

    let handle = Arc::clone(&h.orchestrator).start();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(rx.recv().await.unwrap());
    }
    assert!(seen.iter().all(|r| r.command().is_some()));
    assert!(h.state.control.is_running());
    assert_eq!(h.state.control.started_at(), Some(noon()));
    assert!(h.state.control.cycles() >= 2);

    h.state.control.signal_stop();
    handle.await.unwrap();
    assert!(!h.state.control.is_running());
    assert_eq!(h.state.control.started_at(), Some(noon()));
}

#[tokio::test]
async fn test_loop_without_zones_returns_immediately() {
    let h = harness(Config::default(), MockDriver::new("empty"));
    Arc::clone(&h.orchestrator).start().await.unwrap();
    assert_eq!(h.state.control.cycles(), 0);
    assert!(h.state.control.started_at().is_none());
}
