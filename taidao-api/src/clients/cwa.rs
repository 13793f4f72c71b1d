/// Central Weather Administration open data
///
/// Two datasets are used:
///
/// - `F-D0047-091`: one-week township forecast, rendered as CSV or plain
///   text with one row per location per forecast period
/// - `F-C0032-001`: 36-hour county forecast, rendered as a short Chinese
///   summary that also serves as context for the weather chat
///
/// Upstream documents are deserialized leniently (every field defaults), and
/// rendering reports a [`CwaError::Malformed`] instead of indexing into
/// missing data.

use async_trait::async_trait;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use thiserror::Error;

/// Default CWA datastore endpoint
pub const CWA_DATASTORE_URL: &str = "https://opendata.cwa.gov.tw/api/v1/rest/datastore";

/// Week forecast dataset id
pub const WEEK_DATASET: &str = "F-D0047-091";

/// 36-hour forecast dataset id
pub const FORECAST_36H_DATASET: &str = "F-C0032-001";

/// Placeholder for values the forecast does not carry
const NOT_AVAILABLE: &str = "n/a";

/// CSV header for the week forecast
pub const WEEK_CSV_HEADER: &str =
    "地點,時間,12小時降雨機率,平均溫度,平均相對濕度,最大風速,天氣現象,最低溫度,紫外線指數,最高溫度";

/// Quotes a CSV field when it holds a comma, quote or line break
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Region legend that opens every 36-hour summary
const REGION_LEGEND: &str = "台灣分區\n\
北部:[臺北市,新北市,基隆市,桃園市,新竹市,新竹縣,宜蘭縣]\n\
中部:[苗栗縣,臺中市,彰化縣,南投縣,雲林縣]\n\
南部:[嘉義市,嘉義縣,臺南市,高雄市,屏東縣,澎湖縣]\n\
東部:[花蓮縣,臺東縣]\n\
外島:[金門縣,連江縣]\n";

/// Weather lookup or rendering failure
#[derive(Debug, Error)]
pub enum CwaError {
    #[error("No locations requested")]
    NoLocations,

    #[error("CWA request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CWA returned status {0}")]
    Status(u16),

    #[error("Malformed CWA document: {0}")]
    Malformed(&'static str),
}

// ---------------------------------------------------------------------------
// F-D0047-091
// ---------------------------------------------------------------------------

/// One-week forecast document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeekForecast {
    #[serde(default)]
    pub records: WeekRecords,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeekRecords {
    #[serde(default)]
    pub locations: Vec<WeekLocationGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeekLocationGroup {
    #[serde(default)]
    pub location: Vec<WeekLocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekLocation {
    #[serde(default)]
    pub location_name: String,

    #[serde(default)]
    pub weather_element: Vec<WeekElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekElement {
    #[serde(default)]
    pub element_name: String,

    #[serde(default)]
    pub time: Vec<WeekPeriod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPeriod {
    #[serde(default)]
    pub start_time: String,

    #[serde(default)]
    pub element_value: Vec<ElementValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementValue {
    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub measures: String,
}

/// Formatted values for one location and forecast period
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct WeekRow {
    pop12h: String,
    t: String,
    rh: String,
    ws: String,
    wx: String,
    min_t: String,
    uvi: String,
    max_t: String,
}

impl WeekRow {
    fn uvi_or_na(&self) -> &str {
        if self.uvi.is_empty() {
            NOT_AVAILABLE
        } else {
            &self.uvi
        }
    }

    fn apply(&mut self, element: &str, values: &[ElementValue]) {
        let value = |i: usize| values.get(i).map(|v| v.value.as_str()).unwrap_or("");
        let measures = |i: usize| values.get(i).map(|v| v.measures.as_str()).unwrap_or("");

        match element {
            "PoP12h" => {
                self.pop12h = if value(0).trim().is_empty() {
                    NOT_AVAILABLE.to_string()
                } else {
                    format!("{}%", value(0))
                };
            }
            "T" => self.t = format!("{}C", value(0)),
            "RH" => self.rh = format!("{}%", value(0)),
            "WS" => self.ws = format!("{} {}", value(1), measures(1)),
            "Wx" => self.wx = value(0).to_string(),
            "MinT" => self.min_t = format!("{}C", value(0)),
            "UVI" => self.uvi = format!("{} {}", value(0), value(1)),
            "MaxT" => self.max_t = format!("{}C", value(0)),
            _ => {}
        }
    }
}

impl WeekLocation {
    fn rows(&self) -> HashMap<&str, WeekRow> {
        let mut rows: HashMap<&str, WeekRow> = HashMap::new();
        for element in &self.weather_element {
            for period in &element.time {
                rows.entry(period.start_time.as_str())
                    .or_default()
                    .apply(&element.element_name, &period.element_value);
            }
        }
        rows
    }
}

impl WeekForecast {
    fn locations(&self) -> Result<&[WeekLocation], CwaError> {
        let locations = self
            .records
            .locations
            .first()
            .map(|group| group.location.as_slice())
            .unwrap_or_default();

        if locations.is_empty() {
            return Err(CwaError::Malformed("no locations"));
        }
        Ok(locations)
    }

    /// Forecast period start times, taken from the first element of the
    /// first location
    fn periods(&self) -> Result<Vec<&str>, CwaError> {
        let first = self.locations()?[0]
            .weather_element
            .first()
            .ok_or(CwaError::Malformed("no weather elements"))?;

        Ok(first.time.iter().map(|t| t.start_time.as_str()).collect())
    }

    /// Renders one CSV row per location per forecast period
    pub fn to_csv(&self) -> Result<String, CwaError> {
        let periods = self.periods()?;
        let mut csv = format!("{}\n", WEEK_CSV_HEADER);

        for location in self.locations()? {
            let rows = location.rows();
            for period in &periods {
                let row = rows.get(period).cloned().unwrap_or_default();
                let uvi = row.uvi_or_na();
                let fields: [&str; 10] = [
                    location.location_name.as_str(),
                    *period,
                    &row.pop12h,
                    &row.t,
                    &row.rh,
                    &row.ws,
                    &row.wx,
                    &row.min_t,
                    uvi,
                    &row.max_t,
                ];
                let line: Vec<Cow<'_, str>> = fields.iter().map(|f| csv_field(f)).collect();
                let _ = writeln!(csv, "{}", line.join(","));
            }
        }

        Ok(csv)
    }

    /// Renders a labelled block per location per forecast period
    pub fn to_text(&self) -> Result<String, CwaError> {
        let periods = self.periods()?;
        let mut text = String::new();

        for location in self.locations()? {
            let _ = writeln!(text, "{}", location.location_name);
            let rows = location.rows();
            for period in &periods {
                let row = rows.get(period).cloned().unwrap_or_default();
                let _ = write!(
                    text,
                    "時間:{}\n\
                     12小時降雨機率: {}\n\
                     平均溫度: {}\n\
                     平均相對濕度: {}\n\
                     最大風速: {}\n\
                     天氣現象: {}\n\
                     最低溫度: {}\n\
                     紫外線指數: {}\n\
                     最高溫度: {}\n\n",
                    period,
                    row.pop12h,
                    row.t,
                    row.rh,
                    row.ws,
                    row.wx,
                    row.min_t,
                    row.uvi_or_na(),
                    row.max_t
                );
            }
        }

        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// F-C0032-001
// ---------------------------------------------------------------------------

/// 36-hour forecast document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Forecast36h {
    #[serde(default)]
    pub records: Forecast36hRecords,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Forecast36hRecords {
    #[serde(default)]
    pub location: Vec<CountyForecast>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyForecast {
    #[serde(default)]
    pub location_name: String,

    #[serde(default)]
    pub weather_element: Vec<CountyElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyElement {
    #[serde(default)]
    pub element_name: String,

    #[serde(default)]
    pub time: Vec<CountyPeriod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyPeriod {
    #[serde(default)]
    pub start_time: String,

    #[serde(default)]
    pub end_time: String,

    #[serde(default)]
    pub parameter: Parameter,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    #[serde(default)]
    pub parameter_name: String,

    #[serde(default)]
    pub parameter_unit: String,
}

impl Forecast36h {
    /// Summarizes the first forecast period for every county
    pub fn summary(&self) -> Result<String, CwaError> {
        let first_period = self
            .records
            .location
            .first()
            .ok_or(CwaError::Malformed("no locations"))?
            .weather_element
            .first()
            .and_then(|element| element.time.first())
            .ok_or(CwaError::Malformed("no forecast periods"))?;

        let mut summary = String::from(REGION_LEGEND);
        let _ = writeln!(
            summary,
            "{}至{}天氣預報",
            first_period.start_time, first_period.end_time
        );

        for county in &self.records.location {
            let _ = write!(summary, "{}: ", county.location_name);

            for element in &county.weather_element {
                let Some(period) = element.time.first() else {
                    continue;
                };
                let value = &period.parameter.parameter_name;

                match element.element_name.as_str() {
                    "Wx" | "CI" => {
                        let _ = write!(summary, "{}, ", value);
                    }
                    "PoP" => {
                        let _ = write!(summary, "降雨機率{}%, ", value);
                    }
                    "MinT" => {
                        let _ = write!(summary, "最低溫{}°C, ", value);
                    }
                    "MaxT" => {
                        let _ = write!(summary, "最高溫{}°C, ", value);
                    }
                    _ => {}
                }
            }

            summary.push('\n');
        }

        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Source of forecast documents
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Week forecast for the named townships or counties
    async fn week(&self, locations: &[String]) -> Result<WeekForecast, CwaError>;

    /// 36-hour forecast for every county
    async fn forecast_36h(&self) -> Result<Forecast36h, CwaError>;
}

/// CWA open data REST client
#[derive(Clone)]
pub struct CwaClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl CwaClient {
    pub fn new(client: reqwest::Client, token: String) -> Self {
        Self {
            client,
            base_url: CWA_DATASTORE_URL.to_string(),
            token,
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        dataset: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CwaError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, dataset))
            .query(query)
            .query(&[("Authorization", self.token.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CwaError::Status(response.status().as_u16()));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl WeatherSource for CwaClient {
    async fn week(&self, locations: &[String]) -> Result<WeekForecast, CwaError> {
        if locations.is_empty() {
            return Err(CwaError::NoLocations);
        }

        let names = locations.join(",");
        self.fetch(WEEK_DATASET, &[("locationName", names.as_str())])
            .await
    }

    async fn forecast_36h(&self) -> Result<Forecast36h, CwaError> {
        self.fetch(FORECAST_36H_DATASET, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn week_fixture() -> WeekForecast {
        serde_json::from_str(
            r#"{
              "records": {
                "locations": [{
                  "location": [{
                    "locationName": "臺北市",
                    "weatherElement": [
                      {"elementName": "PoP12h", "time": [
                        {"startTime": "2025-05-20 06:00:00", "elementValue": [{"value": "20", "measures": "百分比"}]},
                        {"startTime": "2025-05-20 18:00:00", "elementValue": [{"value": " ", "measures": "百分比"}]}
                      ]},
                      {"elementName": "T", "time": [
                        {"startTime": "2025-05-20 06:00:00", "elementValue": [{"value": "28", "measures": "攝氏度"}]},
                        {"startTime": "2025-05-20 18:00:00", "elementValue": [{"value": "25", "measures": "攝氏度"}]}
                      ]},
                      {"elementName": "WS", "time": [
                        {"startTime": "2025-05-20 06:00:00", "elementValue": [
                          {"value": "3", "measures": "公尺/秒"},
                          {"value": "≤ 3", "measures": "蒲福風級"}
                        ]}
                      ]},
                      {"elementName": "UVI", "time": [
                        {"startTime": "2025-05-20 06:00:00", "elementValue": [
                          {"value": "8", "measures": "紫外線指數"},
                          {"value": "過量級", "measures": "曝曬級數"}
                        ]}
                      ]}
                    ]
                  }]
                }]
              }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_week_csv() {
        let csv = week_fixture().to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], WEEK_CSV_HEADER);
        assert_eq!(
            lines[1],
            "臺北市,2025-05-20 06:00:00,20%,28C,,≤ 3 蒲福風級,,,8 過量級,"
        );
        assert_eq!(lines[2], "臺北市,2025-05-20 18:00:00,n/a,25C,,,,,n/a,");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("臺北市"), "臺北市");
        assert_eq!(csv_field("多雲, 午後雷陣雨"), "\"多雲, 午後雷陣雨\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_week_text() {
        let text = week_fixture().to_text().unwrap();
        assert!(text.starts_with("臺北市\n時間:2025-05-20 06:00:00\n12小時降雨機率: 20%\n"));
        assert!(text.contains("紫外線指數: 8 過量級\n"));
        assert!(text.contains("時間:2025-05-20 18:00:00\n12小時降雨機率: n/a\n"));
        assert!(text.ends_with("最高溫度: \n\n"));
    }

    #[test]
    fn test_week_without_locations_is_malformed() {
        let empty: WeekForecast = serde_json::from_str(r#"{"records":{"locations":[]}}"#).unwrap();
        assert!(matches!(empty.to_csv(), Err(CwaError::Malformed(_))));

        let nothing: WeekForecast = serde_json::from_str("{}").unwrap();
        assert!(matches!(nothing.to_text(), Err(CwaError::Malformed(_))));
    }

    #[test]
    fn test_36h_summary() {
        let forecast: Forecast36h = serde_json::from_str(
            r#"{
              "records": {
                "location": [{
                  "locationName": "臺北市",
                  "weatherElement": [
                    {"elementName": "Wx", "time": [{"startTime": "2025-05-20 06:00:00", "endTime": "2025-05-20 18:00:00", "parameter": {"parameterName": "多雲"}}]},
                    {"elementName": "PoP", "time": [{"startTime": "2025-05-20 06:00:00", "endTime": "2025-05-20 18:00:00", "parameter": {"parameterName": "20", "parameterUnit": "百分比"}}]},
                    {"elementName": "MinT", "time": [{"startTime": "2025-05-20 06:00:00", "endTime": "2025-05-20 18:00:00", "parameter": {"parameterName": "24", "parameterUnit": "C"}}]},
                    {"elementName": "CI", "time": [{"startTime": "2025-05-20 06:00:00", "endTime": "2025-05-20 18:00:00", "parameter": {"parameterName": "舒適至悶熱"}}]},
                    {"elementName": "MaxT", "time": [{"startTime": "2025-05-20 06:00:00", "endTime": "2025-05-20 18:00:00", "parameter": {"parameterName": "31", "parameterUnit": "C"}}]}
                  ]
                }]
              }
            }"#,
        )
        .unwrap();

        let summary = forecast.summary().unwrap();
        assert!(summary.starts_with("台灣分區\n北部:"));
        assert!(summary.contains("2025-05-20 06:00:00至2025-05-20 18:00:00天氣預報\n"));
        assert!(summary.ends_with("臺北市: 多雲, 降雨機率20%, 最低溫24°C, 舒適至悶熱, 最高溫31°C, \n"));
    }

    #[test]
    fn test_36h_without_locations_is_malformed() {
        let forecast = Forecast36h::default();
        assert!(matches!(forecast.summary(), Err(CwaError::Malformed(_))));
    }
}
