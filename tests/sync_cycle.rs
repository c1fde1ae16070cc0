/// Integration tests for full sync cycle behavior against a mock portal.
///
/// These tests stand up a mockito server in place of the municipality's
/// Itron portal and drive complete cycles through the public engine API:
/// 1. Login handshake and account resolution
/// 2. Incremental + backfill window fetching and merging
/// 3. Partial-cycle resilience when a window fails
/// 4. Bounded authorization recovery (exactly one re-login per cycle)
/// 5. History-floor confirmation on empty backfill chunks
///
/// Cycles are pinned to a fixed "today" via `run_cycle_as_of`, so every
/// requested date is known and mocked explicitly.
///
/// Run with: cargo test --test sync_cycle

use chrono::NaiveDate;
use mockito::{Matcher, Mock, Server};

use itron_sync::config::parse_config;
use itron_sync::model::ErrorKind;
use itron_sync::sync::SyncEngine;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const TODAY: (i32, u32, u32) = (2024, 5, 10);

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    day(TODAY.0, TODAY.1, TODAY.2)
}

/// Engine wired to the mock server. `tuning` appends extra TOML lines.
fn engine_for(server: &Server, tuning: &str) -> SyncEngine {
    let toml = format!(
        r#"
        municipality = "lcpw"
        username = "pat.larsen"
        password = "hunter2"
        meter_id = "SP-1001"
        transport_retries = 0
        retry_backoff_ms = 1
        {tuning}
        portal_override = "{url}"
        "#,
        tuning = tuning,
        url = server.url(),
    );
    SyncEngine::from_config(&parse_config(&toml))
}

fn accounts_json() -> &'static str {
    r#"[
      {
        "AccountKey": 4711,
        "AccountID": "ACCT-1",
        "Customer": { "CustomerFirstName": "Pat", "CustomerLastName": "Larsen" },
        "ServicePointAccountLinks": [
          {
            "StartDate": "2021-06-15T00:00:00",
            "ServicePoint": {
              "ServicePointID": "SP-1001",
              "TimeZoneID": "Central Standard Time",
              "CommodityType": "Water",
              "CommodityType1": { "UsageUnitID": "GAL", "DemandUnitID": "GPH" },
              "ServicePointMeterLinks": [
                { "Meter": { "MeterNumber": "74-123456" } }
              ]
            }
          }
        ]
      }
    ]"#
}

fn bundle_json() -> &'static str {
    r#"[
      {
        "ServicePointID": "SP-1001",
        "DailyData": {
          "RecentRegisterRead": {
            "DialReadingValue": "1234567",
            "NumberOfBlackDials": 2,
            "ReadingTime": "2024-05-10T06:12:00"
          }
        }
      }
    ]"#
}

/// A committed day of 24 hourly slots, each carrying `usage` gallons.
fn full_day_json(date: NaiveDate, usage: f64) -> String {
    let entries: Vec<String> = (0..24)
        .map(|h| format!(r#"{{ "Date": "{}T{:02}:00:00", "Usage": {} }}"#, date, h, usage))
        .collect();
    format!("[{}]", entries.join(","))
}

fn mock_login(server: &mut Server, hits: usize) -> Mock {
    server
        .mock("POST", "/PortalServices/api/User/Login")
        .with_status(200)
        .with_body("{}")
        .expect(hits)
        .create()
}

fn mock_accounts(server: &mut Server, hits: usize) -> Mock {
    server
        .mock("GET", "/PortalServices/api/Account/UserAccounts")
        .with_status(200)
        .with_body(accounts_json())
        .expect(hits)
        .create()
}

fn mock_interval(server: &mut Server, date: NaiveDate, body: &str, hits: usize) -> Mock {
    server
        .mock("GET", "/PortalServices/api/UsageData/Interval")
        .match_query(Matcher::UrlEncoded("endDate".to_string(), date.to_string()))
        .with_status(200)
        .with_body(body)
        .expect(hits)
        .create()
}

fn mock_interval_status(server: &mut Server, date: NaiveDate, status: usize, hits: usize) -> Mock {
    server
        .mock("GET", "/PortalServices/api/UsageData/Interval")
        .match_query(Matcher::UrlEncoded("endDate".to_string(), date.to_string()))
        .with_status(status)
        .expect(hits)
        .create()
}

fn mock_bundle(server: &mut Server, status: usize, body: &str) -> Mock {
    server
        .mock("GET", "/PortalServices/api/UsageData/Bundle/")
        .match_query(Matcher::Any)
        .with_status(status)
        .with_body(body)
        .create()
}

// ---------------------------------------------------------------------------
// 1. Full Cycle: Fetch, Merge, Statistics
// ---------------------------------------------------------------------------

#[test]
fn test_full_cycle_merges_all_windows_and_derives_statistics() {
    let mut server = Server::new();
    let login = mock_login(&mut server, 1);
    let accounts = mock_accounts(&mut server, 1);
    let _bundle = mock_bundle(&mut server, 200, bundle_json());

    // Plan for an empty series, chunk 3, one backfill chunk:
    //   incremental 2024-05-08..10, backfill 2024-05-05..07.
    let _intervals: Vec<Mock> = [(5, 1.0), (6, 1.0), (7, 1.0), (8, 2.0), (9, 4.0), (10, 0.5)]
        .into_iter()
        .map(|(d, usage)| {
            mock_interval(&mut server, day(2024, 5, d), &full_day_json(day(2024, 5, d), usage), 1)
        })
        .collect();

    let engine = engine_for(
        &server,
        "backfill_chunk_days = 3\nmax_backfill_windows_per_cycle = 1",
    );
    let result = engine.run_cycle_as_of(today()).expect("cycle should succeed");

    assert!(result.errors.is_empty(), "no window should fail: {:?}", result.errors);
    assert_eq!(result.series.len(), 144, "six full days of hourly readings");
    assert_eq!(
        result.series.complete_ranges(),
        &[itron_sync::model::ReadingWindow::new(day(2024, 5, 5), day(2024, 5, 10))],
        "contiguous full days form one confirmed-complete range"
    );
    assert!(result.series.backfill_floor().is_none(), "no empty chunk seen yet");

    // Ordering invariant: materialized sequence ascends.
    let timestamps: Vec<_> = result.series.readings().map(|r| r.timestamp).collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);

    // Statistics: 05-09 carries 4.0 gal/hour, the clear peak.
    let stats = &result.statistics;
    assert_eq!(stats.observed_days, 6);
    let peak = stats.peak.expect("peak must exist");
    assert_eq!(peak.date, day(2024, 5, 9));
    assert!((peak.total - 96.0).abs() < 1e-9, "24h x 4.0 gal, got {}", peak.total);

    // Register-read snapshot came from the bundle endpoint.
    let meter = result.meter.expect("bundle mock should produce a snapshot");
    assert_eq!(meter.meter_number, "74-123456");
    assert!((meter.register_value - 12_345.67).abs() < 1e-9);

    login.assert();
    accounts.assert();
}

#[test]
fn test_second_cycle_is_idempotent_and_confirms_floor() {
    let mut server = Server::new();
    // One login serves both cycles: the session TTL outlives the test.
    let login = mock_login(&mut server, 1);
    let _accounts = mock_accounts(&mut server, 1);
    let _bundle = mock_bundle(&mut server, 200, bundle_json());

    // Cycle 1 (empty series): incremental 05-08..10, backfill 05-05..07.
    // Cycle 2 (complete through 05-10): incremental 05-09..10 (overlap),
    // backfill 05-02..04 — which the portal answers empty, twice, because
    // the engine re-fetches an empty chunk before trusting it as the floor.
    // Cycle 3 (floor confirmed): incremental 05-09..10 only.
    let _refetched: Vec<Mock> = [9, 10]
        .into_iter()
        .map(|d| mock_interval(&mut server, day(2024, 5, d), &full_day_json(day(2024, 5, d), 1.0), 3))
        .collect();
    let _first_pass: Vec<Mock> = [5, 6, 7, 8]
        .into_iter()
        .map(|d| mock_interval(&mut server, day(2024, 5, d), &full_day_json(day(2024, 5, d), 1.0), 1))
        .collect();
    let empty_chunk_mocks: Vec<Mock> = [2, 3, 4]
        .into_iter()
        .map(|d| mock_interval(&mut server, day(2024, 5, d), "[]", 2))
        .collect();

    let engine = engine_for(
        &server,
        "backfill_chunk_days = 3\nmax_backfill_windows_per_cycle = 1",
    );

    let first = engine.run_cycle_as_of(today()).expect("first cycle should succeed");
    assert_eq!(first.series.len(), 144);
    assert!(first.series.backfill_floor().is_none());

    let second = engine.run_cycle_as_of(today()).expect("second cycle should succeed");
    assert!(second.errors.is_empty(), "{:?}", second.errors);
    assert_eq!(
        second.series.len(),
        144,
        "re-merging overlap and empty chunks must not grow the series"
    );
    assert_eq!(
        second.series.backfill_floor(),
        Some(day(2024, 5, 5)),
        "a confirmed-empty chunk ending 05-04 sets the floor to 05-05"
    );

    // Cycle 3: with the floor confirmed, no window before it is requested —
    // the 05-02..04 mocks must still sit at their two confirmation hits.
    let third = engine.run_cycle_as_of(today()).expect("third cycle should succeed");
    assert!(third.errors.is_empty());

    for mock in &empty_chunk_mocks {
        mock.assert();
    }
    login.assert();
}

// ---------------------------------------------------------------------------
// 2. Partial-Cycle Resilience
// ---------------------------------------------------------------------------

#[test]
fn test_failed_window_does_not_abort_the_others() {
    let mut server = Server::new();
    let _login = mock_login(&mut server, 1);
    let _accounts = mock_accounts(&mut server, 1);
    let _bundle = mock_bundle(&mut server, 500, "");

    // Three windows: incremental 05-09..10, backfill 05-07..08, 05-05..06.
    // The middle window dies on 05-08 with a transport failure.
    let _good_days: Vec<Mock> = [5, 6, 7, 9, 10]
        .into_iter()
        .map(|d| mock_interval(&mut server, day(2024, 5, d), &full_day_json(day(2024, 5, d), 1.0), 1))
        .collect();
    let _broken_day = mock_interval_status(&mut server, day(2024, 5, 8), 500, 1);

    let engine = engine_for(
        &server,
        "backfill_chunk_days = 2\nmax_backfill_windows_per_cycle = 2",
    );
    let result = engine.run_cycle_as_of(today()).expect("cycle should still succeed");

    assert_eq!(result.errors.len(), 1, "exactly the broken window is reported");
    let failure = &result.errors[0];
    assert_eq!(failure.kind, ErrorKind::Transport);
    assert_eq!(failure.window.start, day(2024, 5, 7));
    assert_eq!(failure.window.end, day(2024, 5, 8));

    // The other two windows were merged in full; the failed window
    // contributed nothing (merge is per completed fetch).
    assert_eq!(result.series.len(), 96);
    assert!(result.series.get(day(2024, 5, 7).and_hms_opt(0, 0, 0).unwrap()).is_none());

    // Bundle returned 500, so the snapshot is absent but the cycle stands.
    assert!(result.meter.is_none());
}

// ---------------------------------------------------------------------------
// 3. Authorization Recovery
// ---------------------------------------------------------------------------

#[test]
fn test_session_rejection_triggers_exactly_one_relogin_per_cycle() {
    let mut server = Server::new();
    // Initial login + the single recovery re-login, and no third.
    let login = mock_login(&mut server, 2);
    let accounts = mock_accounts(&mut server, 2);
    let _bundle = mock_bundle(&mut server, 401, "");

    // Every interval request is met with 401:
    //   1. incremental, first day (05-09)   -> triggers invalidate+re-login
    //   2. incremental retry, first day     -> surfaced, no further re-auth
    //   3. backfill, first day (05-07)      -> surfaced immediately
    let interval = server
        .mock("GET", "/PortalServices/api/UsageData/Interval")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(3)
        .create();

    let engine = engine_for(
        &server,
        "backfill_chunk_days = 2\nmax_backfill_windows_per_cycle = 1",
    );
    let result = engine.run_cycle_as_of(today()).expect("cycle returns partial result");

    assert_eq!(result.errors.len(), 2, "both windows surface their failures");
    assert!(result.errors.iter().all(|f| f.kind == ErrorKind::Authorization));
    assert!(result.series.is_empty());
    assert!(!result.statistics.has_data());

    login.assert();
    accounts.assert();
    interval.assert();
}

#[test]
fn test_rejected_credentials_abort_the_cycle_before_planning() {
    let mut server = Server::new();
    let login = server
        .mock("POST", "/PortalServices/api/User/Login")
        .with_status(403)
        .expect(1)
        .create();

    let engine = engine_for(&server, "");
    let err = engine
        .run_cycle_as_of(today())
        .expect_err("bad credentials must fail the cycle outright");

    match err {
        itron_sync::model::SyncError::Authentication(cause) => {
            assert_eq!(cause.kind(), ErrorKind::Authentication);
        }
        other => panic!("expected Authentication, got {:?}", other),
    }
    login.assert();
}
