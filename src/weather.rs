use chrono::{DateTime, FixedOffset, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::app_config::WeatherConfig;

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Current conditions plus today's range, the record handed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeatherDesc {
    pub name: String,
    pub desc: String,
    pub low: i32,
    pub high: i32,
    pub current_temp: i32,
    pub feels_like: i32,
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    name: String,
    weather: Vec<WeatherCondition>,
    main: MainReadings,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
}

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    city: ForecastCity,
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastCity {
    /// UTC offset in seconds
    timezone: i32,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    dt: i64,
    main: ForecastMain,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp: f64,
}

/// Low and high over the forecast entries that fall on today's date in the
/// city's local timezone
fn daily_low_high(forecast: &ForecastResponse, now_utc: DateTime<Utc>) -> Option<(i32, i32)> {
    let local_tz = FixedOffset::east_opt(forecast.city.timezone)?;
    let today = now_utc.with_timezone(&local_tz).date_naive();

    let mut low = f64::MAX;
    let mut high = f64::MIN;
    let mut found = false;

    for entry in &forecast.list {
        let entry_time = DateTime::<Utc>::from_timestamp(entry.dt, 0)?;
        if entry_time.with_timezone(&local_tz).date_naive() == today {
            low = low.min(entry.main.temp);
            high = high.max(entry.main.temp);
            found = true;
        }
    }

    found.then_some((low as i32, high as i32))
}

pub struct WeatherClient {
    http_client: reqwest::Client,
    api_key: String,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn get_weather_info(&self, city: &str) -> anyhow::Result<WeatherDesc> {
        let current: CurrentWeatherResponse = self
            .http_client
            .get(format!("{}/weather", BASE_URL))
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "imperial")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let forecast: ForecastResponse = self
            .http_client
            .get(format!("{}/forecast", BASE_URL))
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "imperial")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let (low, high) = daily_low_high(&forecast, Utc::now())
            .ok_or_else(|| anyhow::anyhow!("No forecast entries for today in {}", city))?;

        let desc = current
            .weather
            .first()
            .map(|condition| condition.description.clone())
            .unwrap_or_default();

        Ok(WeatherDesc {
            name: current.name,
            desc,
            low,
            high,
            current_temp: current.main.temp as i32,
            feels_like: current.main.feels_like as i32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn forecast(timezone: i32, entries: &[(i64, f64)]) -> ForecastResponse {
        ForecastResponse {
            city: ForecastCity { timezone },
            list: entries
                .iter()
                .map(|(dt, temp)| ForecastEntry {
                    dt: *dt,
                    main: ForecastMain { temp: *temp },
                })
                .collect(),
        }
    }

    #[test]
    fn picks_entries_on_todays_local_date() {
        // now: 2024-06-01 12:00:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let entries = [
            // 2024-06-01 00:00 UTC
            (1717200000, 70.4),
            // 2024-06-01 15:00 UTC
            (1717254000, 82.9),
            // 2024-06-02 03:00 UTC
            (1717297200, 60.0),
        ];
        let (low, high) = daily_low_high(&forecast(0, &entries), now).unwrap();
        assert_eq!((low, high), (70, 82));
    }

    #[test]
    fn local_offset_moves_the_date_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        // UTC+9: the 2024-06-01 15:00 UTC entry is already 2024-06-02 local
        let entries = [(1717200000, 70.4), (1717254000, 82.9)];
        let (low, high) = daily_low_high(&forecast(9 * 3600, &entries), now).unwrap();
        assert_eq!((low, high), (70, 70));
    }

    #[test]
    fn no_entries_for_today_yields_none() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let entries = [(1717200000, 70.4)];
        assert!(daily_low_high(&forecast(0, &entries), now).is_none());
    }
}
