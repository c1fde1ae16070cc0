/// Itron portal API client: URL construction and JSON response parsing.
///
/// The portals expose no published contract; endpoints and payload shapes
/// below are reverse engineered from the customer portal's own traffic:
///   POST {root}/PortalServices/api/User/Login
///   GET  {root}/PortalServices/api/Account/UserAccounts
///   GET  {root}/PortalServices/api/UsageData/Bundle/?accountId=…
///   GET  {root}/PortalServices/api/UsageData/Interval?servicePointId=…
///
/// All schema brittleness is isolated here (and reached through the
/// municipality profile), so a portal format change is a one-module fix.
/// See `fixtures.rs` for annotated examples of the response structures.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use std::thread;
use std::time::Duration;

use crate::model::{MeterReading, MeterSnapshot, PortalError, ReadingWindow, UsageUnit};
use crate::municipalities::MunicipalityProfile;
use crate::session::Session;

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

const API_PATH: &str = "PortalServices/api";

/// Login endpoint; takes a JSON body `{"username": …, "password": …}` and
/// establishes the session cookie on success.
pub fn build_login_url(root: &str) -> String {
    format!("{}/{}/User/Login", root, API_PATH)
}

/// Accounts endpoint; lists the accounts and service points the signed-in
/// user can see.
pub fn build_accounts_url(root: &str) -> String {
    format!("{}/{}/Account/UserAccounts", root, API_PATH)
}

/// Bundle endpoint; returns per-service-point daily data including the most
/// recent register read. The portal expects a 12-hour-clock local timestamp
/// as `endDate`.
pub fn build_bundle_url(
    root: &str,
    account_id: &str,
    servicepoint_id: &str,
    now: NaiveDateTime,
) -> String {
    let end_date = now.format("%m/%d/%y %I:%M:%S %p").to_string();
    format!(
        "{}/{}/UsageData/Bundle/?accountId={}&servicepointid={}&endDate={}",
        root,
        API_PATH,
        urlencoding::encode(account_id),
        urlencoding::encode(servicepoint_id),
        urlencoding::encode(&end_date)
    )
}

/// Interval endpoint; returns up to 24 hourly usage slots for the calendar
/// day `end_date`. There is no multi-day form — window fetches issue one
/// request per day.
pub fn build_interval_url(
    root: &str,
    servicepoint_id: &str,
    account_id: &str,
    end_date: NaiveDate,
) -> String {
    format!(
        "{}/{}/UsageData/Interval?servicePointId={}&accountId={}&skipHours=0&takeHours=24&endDate={}",
        root,
        API_PATH,
        urlencoding::encode(servicepoint_id),
        urlencoding::encode(account_id),
        end_date.format("%Y-%m-%d")
    )
}

// ---------------------------------------------------------------------------
// Serde structures for portal JSON
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawIntervalEntry {
    #[serde(rename = "Date")]
    date: String,
    /// Null for slots the portal has published but not committed yet
    /// (it returns day-ahead rows with empty usage).
    #[serde(rename = "Usage")]
    usage: Option<f64>,
}

#[derive(Deserialize)]
struct RawUserAccount {
    #[serde(rename = "AccountID")]
    account_id: String,
    #[serde(rename = "AccountKey")]
    account_key: i64,
    #[serde(rename = "ServicePointAccountLinks", default)]
    links: Vec<RawServicePointLink>,
}

#[derive(Deserialize)]
struct RawServicePointLink {
    #[serde(rename = "StartDate")]
    start_date: Option<String>,
    #[serde(rename = "ServicePoint")]
    service_point: RawServicePoint,
}

#[derive(Deserialize)]
struct RawServicePoint {
    #[serde(rename = "ServicePointID")]
    id: String,
    #[serde(rename = "CommodityType")]
    commodity: Option<String>,
    #[serde(rename = "CommodityType1")]
    commodity_detail: Option<RawCommodityDetail>,
    #[serde(rename = "ServicePointMeterLinks", default)]
    meter_links: Vec<RawMeterLink>,
}

#[derive(Deserialize)]
struct RawCommodityDetail {
    #[serde(rename = "UsageUnitID")]
    usage_unit: Option<String>,
}

#[derive(Deserialize)]
struct RawMeterLink {
    #[serde(rename = "Meter")]
    meter: RawMeter,
}

#[derive(Deserialize)]
struct RawMeter {
    #[serde(rename = "MeterNumber")]
    meter_number: String,
}

#[derive(Deserialize)]
struct RawBundle {
    #[serde(rename = "ServicePointID")]
    servicepoint_id: String,
    #[serde(rename = "DailyData")]
    daily: Option<RawDailyData>,
}

#[derive(Deserialize)]
struct RawDailyData {
    #[serde(rename = "RecentRegisterRead")]
    register_read: Option<RawRegisterRead>,
}

#[derive(Deserialize)]
struct RawRegisterRead {
    /// The portal has been observed sending this as both a number and a
    /// numeric string, so it is coerced after deserialization.
    #[serde(rename = "DialReadingValue")]
    dial_value: Value,
    #[serde(rename = "NumberOfBlackDials")]
    black_dials: Value,
    #[serde(rename = "ReadingTime")]
    reading_time: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsed account structures
// ---------------------------------------------------------------------------

/// One account visible to the signed-in portal user.
#[derive(Debug, Clone)]
pub struct PortalAccount {
    pub account_id: String,
    pub account_key: i64,
    pub service_points: Vec<ServicePointInfo>,
}

/// One metered service point under an account.
#[derive(Debug, Clone)]
pub struct ServicePointInfo {
    pub id: String,
    pub commodity: Option<String>,
    pub unit: UsageUnit,
    pub meter_number: Option<String>,
    /// Service start date; the portal holds no data before it.
    pub start_date: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses an interval response body into hourly readings, ascending.
///
/// Slots with null usage are skipped — they are placeholders for hours the
/// portal has not committed yet, and recording them as zero would fabricate
/// data. A well-formed empty array parses to an empty vec (how the portal
/// answers for days before its history starts).
///
/// # Errors
/// `PortalError::Schema` on malformed JSON or an unparseable timestamp.
pub fn parse_interval_response(
    json: &str,
    unit: UsageUnit,
) -> Result<Vec<MeterReading>, PortalError> {
    let entries: Vec<RawIntervalEntry> = serde_json::from_str(json)
        .map_err(|e| PortalError::Schema(format!("interval response: {}", e)))?;

    let mut readings = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(usage) = entry.usage else {
            continue;
        };
        let timestamp = parse_portal_datetime(&entry.date)?;
        readings.push(MeterReading { timestamp, usage, unit });
    }

    readings.sort_by_key(|r| r.timestamp);
    Ok(readings)
}

/// Parses a user-accounts response body.
///
/// # Errors
/// - `PortalError::Schema` — malformed JSON or no accounts at all (a signed
///   in user with zero accounts means the response shape drifted, since the
///   portal does not grant logins without one).
pub fn parse_accounts_response(json: &str) -> Result<Vec<PortalAccount>, PortalError> {
    let raw: Vec<RawUserAccount> = serde_json::from_str(json)
        .map_err(|e| PortalError::Schema(format!("accounts response: {}", e)))?;

    if raw.is_empty() {
        return Err(PortalError::Schema(
            "accounts response contained no accounts".to_string(),
        ));
    }

    let mut accounts = Vec::with_capacity(raw.len());
    for account in raw {
        let mut service_points = Vec::with_capacity(account.links.len());
        for link in account.links {
            let point = link.service_point;
            let unit = match point
                .commodity_detail
                .as_ref()
                .and_then(|d| d.usage_unit.as_deref())
            {
                Some("GAL") => UsageUnit::Gallon,
                _ => UsageUnit::Unsupported,
            };
            service_points.push(ServicePointInfo {
                id: point.id,
                commodity: point.commodity,
                unit,
                meter_number: point.meter_links.first().map(|l| l.meter.meter_number.clone()),
                start_date: link
                    .start_date
                    .as_deref()
                    .and_then(|s| parse_portal_datetime(s).ok())
                    .map(|dt| dt.date()),
            });
        }
        accounts.push(PortalAccount {
            account_id: account.account_id,
            account_key: account.account_key,
            service_points,
        });
    }

    Ok(accounts)
}

/// Parses a bundle response and extracts the register read for one service
/// point. The dial value is scaled down by the number of black dials, the
/// same correction the portal's own frontend applies.
///
/// Returns `Ok(None)` when the bundle carries no register read for the
/// service point (observed on freshly provisioned meters).
pub fn parse_bundle_response(
    json: &str,
    servicepoint_id: &str,
    meter_number: &str,
) -> Result<Option<MeterSnapshot>, PortalError> {
    let bundles: Vec<RawBundle> = serde_json::from_str(json)
        .map_err(|e| PortalError::Schema(format!("bundle response: {}", e)))?;

    let Some(read) = bundles
        .into_iter()
        .find(|b| b.servicepoint_id == servicepoint_id)
        .and_then(|b| b.daily)
        .and_then(|d| d.register_read)
    else {
        return Ok(None);
    };

    let dial_value = coerce_number(&read.dial_value)
        .ok_or_else(|| PortalError::Schema("DialReadingValue is not numeric".to_string()))?;
    let black_dials = coerce_number(&read.black_dials)
        .ok_or_else(|| PortalError::Schema("NumberOfBlackDials is not numeric".to_string()))?;

    Ok(Some(MeterSnapshot {
        meter_number: meter_number.to_string(),
        register_value: dial_value / 10f64.powf(black_dials),
        register_read_at: read
            .reading_time
            .as_deref()
            .and_then(|s| parse_portal_datetime(s).ok()),
    }))
}

/// ISO-ish local timestamps, with or without fractional seconds.
fn parse_portal_datetime(s: &str) -> Result<NaiveDateTime, PortalError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| PortalError::Schema(format!("bad timestamp '{}': {}", s, e)))
}

/// The portal sends some numeric fields as strings.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Retry bounds for transport failures. The portals are rate-sensitive and
/// unofficial, so the defaults stay conservative.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub transport_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            transport_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Issues windowed interval requests and parses them through the
/// municipality profile. Holds no session state of its own; the session
/// rides in the shared client's cookie store and the account identity is
/// passed in per call.
pub struct ReadingFetcher {
    client: reqwest::blocking::Client,
    root: String,
    profile: &'static dyn MunicipalityProfile,
    settings: FetchSettings,
}

impl ReadingFetcher {
    pub fn new(
        client: reqwest::blocking::Client,
        root: String,
        profile: &'static dyn MunicipalityProfile,
        settings: FetchSettings,
    ) -> Self {
        Self { client, root, profile, settings }
    }

    /// Fetches every day of `window` for the given service point, returning
    /// readings in ascending timestamp order. A day with no committed data
    /// contributes nothing; the window as a whole may therefore come back
    /// shorter than `window.num_days() * 24` readings, or empty.
    pub fn fetch(
        &self,
        window: &ReadingWindow,
        session: &Session,
        servicepoint_id: &str,
    ) -> Result<Vec<MeterReading>, PortalError> {
        let mut readings = Vec::new();
        for day in window.days() {
            let url = build_interval_url(&self.root, servicepoint_id, session.account_id(), day);
            let body = self.get_with_retries(&url)?;
            readings.extend(self.profile.parse_interval(&body)?);
        }
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }

    /// Fetches the bundle and extracts the register-read snapshot for the
    /// service point.
    pub fn fetch_snapshot(
        &self,
        session: &Session,
        servicepoint_id: &str,
        meter_number: &str,
        now: NaiveDateTime,
    ) -> Result<Option<MeterSnapshot>, PortalError> {
        let url = build_bundle_url(&self.root, session.account_id(), servicepoint_id, now);
        let body = self.get_with_retries(&url)?;
        parse_bundle_response(&body, servicepoint_id, meter_number)
    }

    /// GET with bounded backoff on transport failures. Authorization and
    /// schema failures are never retried here: the former goes through the
    /// orchestrator's single re-authentication path, the latter will not
    /// improve by asking again.
    fn get_with_retries(&self, url: &str) -> Result<String, PortalError> {
        let mut attempt = 0;
        loop {
            match self.get_text(url) {
                Err(PortalError::Transport(reason)) if attempt < self.settings.transport_retries => {
                    attempt += 1;
                    log::warn!(
                        "transport failure ({}), retry {}/{}",
                        reason,
                        attempt,
                        self.settings.transport_retries
                    );
                    thread::sleep(self.settings.retry_backoff * attempt);
                }
                other => return other,
            }
        }
    }

    fn get_text(&self, url: &str) -> Result<String, PortalError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()?;

        let status = response.status().as_u16();
        match status {
            401 | 403 => Err(PortalError::Authorization { status }),
            s if !(200..300).contains(&s) => {
                Err(PortalError::Transport(format!("portal returned HTTP {}", s)))
            }
            _ => Ok(response.text()?),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
