/// Test fixtures: representative JSON payloads from the Itron portals.
///
/// These fixtures are structurally complete but truncated to the minimum
/// needed to exercise the parsers. They reflect the real payloads returned
/// by the reverse-engineered endpoints under
///   {root}/PortalServices/api/…
///
/// Interval response shape (array, one entry per hourly slot):
///   [ { "Date": "2024-05-01T00:00:00", "Usage": 3.2 }, … ]
/// `Usage` is null for slots the portal has published but not committed —
/// it routinely returns a day-ahead page of nothing but null slots.
///
/// UserAccounts response shape:
///   [ { "AccountKey": …, "AccountID": …, "Customer": {…},
///       "ServicePointAccountLinks": [ { "StartDate": …, "ServicePoint":
///         { "ServicePointID": …, "CommodityType": "Water",
///           "CommodityType1": { "UsageUnitID": "GAL", … },
///           "ServicePointMeterLinks": [ { "Meter": { "MeterNumber": … } } ],
///           … } } ] } ]
///
/// Bundle response shape (array, one entry per service point):
///   [ { "ServicePointID": …, "DailyData": { "RecentRegisterRead":
///       { "DialReadingValue": …, "NumberOfBlackDials": …,
///         "ReadingTime": … }, "Statistics": {…} } } ]
/// Note: the portal sends some numeric fields as strings.

/// A fully committed day: 24 hourly slots for 2024-05-01, a typical
/// residential usage curve (overnight trickle, morning and evening peaks).
#[cfg(test)]
pub(crate) fn fixture_interval_full_day() -> &'static str {
    r#"[
      { "Date": "2024-05-01T00:00:00", "Usage": 3.2 },
      { "Date": "2024-05-01T01:00:00", "Usage": 0.0 },
      { "Date": "2024-05-01T02:00:00", "Usage": 0.0 },
      { "Date": "2024-05-01T03:00:00", "Usage": 0.4 },
      { "Date": "2024-05-01T04:00:00", "Usage": 0.0 },
      { "Date": "2024-05-01T05:00:00", "Usage": 1.1 },
      { "Date": "2024-05-01T06:00:00", "Usage": 14.7 },
      { "Date": "2024-05-01T07:00:00", "Usage": 22.3 },
      { "Date": "2024-05-01T08:00:00", "Usage": 9.8 },
      { "Date": "2024-05-01T09:00:00", "Usage": 4.1 },
      { "Date": "2024-05-01T10:00:00", "Usage": 2.5 },
      { "Date": "2024-05-01T11:00:00", "Usage": 3.0 },
      { "Date": "2024-05-01T12:00:00", "Usage": 5.6 },
      { "Date": "2024-05-01T13:00:00", "Usage": 2.2 },
      { "Date": "2024-05-01T14:00:00", "Usage": 1.8 },
      { "Date": "2024-05-01T15:00:00", "Usage": 2.9 },
      { "Date": "2024-05-01T16:00:00", "Usage": 6.4 },
      { "Date": "2024-05-01T17:00:00", "Usage": 11.2 },
      { "Date": "2024-05-01T18:00:00", "Usage": 18.5 },
      { "Date": "2024-05-01T19:00:00", "Usage": 13.3 },
      { "Date": "2024-05-01T20:00:00", "Usage": 8.7 },
      { "Date": "2024-05-01T21:00:00", "Usage": 6.1 },
      { "Date": "2024-05-01T22:00:00", "Usage": 3.4 },
      { "Date": "2024-05-01T23:00:00", "Usage": 1.9 }
    ]"#
}

/// The day-ahead shape: the portal has published the page for 2024-05-02
/// but only committed the first two hours. The null slots must be skipped,
/// not recorded as zero usage.
#[cfg(test)]
pub(crate) fn fixture_interval_day_ahead() -> &'static str {
    r#"[
      { "Date": "2024-05-02T00:00:00", "Usage": 2.8 },
      { "Date": "2024-05-02T01:00:00", "Usage": 0.3 },
      { "Date": "2024-05-02T02:00:00", "Usage": null },
      { "Date": "2024-05-02T03:00:00", "Usage": null },
      { "Date": "2024-05-02T04:00:00", "Usage": null }
    ]"#
}

/// One account with one water service point, the common residential case.
#[cfg(test)]
pub(crate) fn fixture_user_accounts() -> &'static str {
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
              "Location": {
                "AddressLine1": "812 Maplewood Ct",
                "AddressLine2": "",
                "City": "Libertyville",
                "PostalCode": "60048"
              },
              "ServicePointMeterLinks": [
                { "Meter": { "MeterNumber": "74-123456" } }
              ]
            }
          }
        ]
      }
    ]"#
}

/// A gas service point (CCF) — present on some combined-utility accounts.
/// The engine must mark it unsupported rather than mislabel the series.
#[cfg(test)]
pub(crate) fn fixture_user_accounts_gas() -> &'static str {
    r#"[
      {
        "AccountKey": 4712,
        "AccountID": "ACCT-2",
        "Customer": { "CustomerFirstName": "Pat", "CustomerLastName": "Larsen" },
        "ServicePointAccountLinks": [
          {
            "StartDate": "2021-06-15T00:00:00",
            "ServicePoint": {
              "ServicePointID": "SP-2001",
              "TimeZoneID": "Central Standard Time",
              "CommodityType": "Gas",
              "CommodityType1": { "UsageUnitID": "CCF", "DemandUnitID": "CFH" },
              "Location": {
                "AddressLine1": "812 Maplewood Ct",
                "AddressLine2": "",
                "City": "Libertyville",
                "PostalCode": "60048"
              },
              "ServicePointMeterLinks": [
                { "Meter": { "MeterNumber": "88-654321" } }
              ]
            }
          }
        ]
      }
    ]"#
}

/// Bundle for SP-1001 with a recent register read. `DialReadingValue`
/// arrives as a string here on purpose — the portal mixes representations.
#[cfg(test)]
pub(crate) fn fixture_bundle() -> &'static str {
    r#"[
      {
        "ServicePointID": "SP-1001",
        "DailyData": {
          "RecentRegisterRead": {
            "DialReadingValue": "1234567",
            "NumberOfBlackDials": 2,
            "ReadingTime": "2024-05-01T06:12:00"
          },
          "Statistics": {
            "HighestUsage": {
              "AlldayStatistic": { "Value": 412.0, "Date": "2024-04-28T00:00:00" },
              "WeekdayStatistic": { "Value": 301.0, "Date": "2024-04-26T00:00:00" },
              "WeekendStatistic": { "Value": 412.0, "Date": "2024-04-28T00:00:00" }
            }
          }
        }
      }
    ]"#
}
