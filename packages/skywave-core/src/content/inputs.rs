//! External inputs for break generation: weather and news headlines.
//!
//! Feed bytes are always fetched through the bounded HTTP client first and
//! only then handed to the XML parser; the parser never sees a socket, so
//! an unbounded library wait cannot happen.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::config::{ContentConfig, WeatherConfig};
use crate::constants::INPUT_FETCH_TIMEOUT;
use crate::error::{RadioError, RadioResult};

/// Headlines kept per feed.
const ITEMS_PER_FEED: usize = 3;

/// Headlines kept overall.
const ITEMS_TOTAL: usize = 8;

/// Current conditions, already phrased for the prompt.
#[derive(Debug, Clone)]
pub struct WeatherReport {
    pub temperature_c: f64,
    pub wind_kph: f64,
    pub condition: String,
}

/// One feed headline.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub summary: Option<String>,
    pub source: String,
}

/// Everything the script prompt gets to work with.
#[derive(Debug, Clone)]
pub struct GatheredInputs {
    pub weather: Option<WeatherReport>,
    pub news: Vec<NewsItem>,
}

/// Fetches weather and news in parallel.
///
/// Either side may fail (the script degrades to the other); only both
/// failing is `NoInput`.
pub async fn gather(client: &reqwest::Client, config: &ContentConfig) -> RadioResult<GatheredInputs> {
    let (weather, news) = tokio::join!(
        fetch_weather(client, &config.weather),
        fetch_news(client, &config.feeds),
    );

    let weather = match weather {
        Ok(report) => Some(report),
        Err(e) => {
            log::warn!("[Content] weather fetch failed: {e}");
            None
        }
    };

    if weather.is_none() && news.is_empty() {
        return Err(RadioError::NoInput);
    }
    Ok(GatheredInputs { weather, news })
}

// ─────────────────────────────────────────────────────────────────────────────
// Weather
// ─────────────────────────────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct WeatherEnvelope {
    current_weather: CurrentWeather,
}

#[derive(serde::Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: i64,
}

async fn fetch_weather(
    client: &reqwest::Client,
    config: &WeatherConfig,
) -> Result<WeatherReport, RadioError> {
    let request = client
        .get(&config.endpoint)
        .query(&[
            ("latitude", config.latitude.to_string()),
            ("longitude", config.longitude.to_string()),
            ("current_weather", "true".to_string()),
        ])
        .timeout(INPUT_FETCH_TIMEOUT)
        .send();

    let response = request
        .await
        .map_err(|e| RadioError::Unavailable(format!("weather: {e}")))?
        .error_for_status()
        .map_err(|e| RadioError::Unavailable(format!("weather: {e}")))?;

    let envelope: WeatherEnvelope = response
        .json()
        .await
        .map_err(|e| RadioError::InvalidInput(format!("weather body: {e}")))?;

    Ok(WeatherReport {
        temperature_c: envelope.current_weather.temperature,
        wind_kph: envelope.current_weather.windspeed,
        condition: describe_weather_code(envelope.current_weather.weathercode).to_string(),
    })
}

/// Maps WMO weather codes to prompt-friendly phrases.
fn describe_weather_code(code: i64) -> &'static str {
    match code {
        0 => "clear skies",
        1..=3 => "partly cloudy",
        45 | 48 => "fog",
        51..=57 => "drizzle",
        61..=67 => "rain",
        71..=77 => "snow",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95..=99 => "thunderstorms",
        _ => "unsettled weather",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// News Feeds
// ─────────────────────────────────────────────────────────────────────────────

async fn fetch_news(client: &reqwest::Client, feeds: &[String]) -> Vec<NewsItem> {
    let mut items = Vec::new();
    for url in feeds {
        if items.len() >= ITEMS_TOTAL {
            break;
        }
        match fetch_feed_bytes(client, url).await {
            Ok(bytes) => {
                let source = feed_source_name(url);
                let mut parsed = parse_feed(&bytes, &source);
                parsed.truncate(ITEMS_PER_FEED);
                items.extend(parsed);
            }
            Err(e) => log::warn!("[Content] feed {url} failed: {e}"),
        }
    }
    items.truncate(ITEMS_TOTAL);
    items
}

async fn fetch_feed_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, RadioError> {
    let response = client
        .get(url)
        .timeout(INPUT_FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| RadioError::Unavailable(e.to_string()))?
        .error_for_status()
        .map_err(|e| RadioError::Unavailable(e.to_string()))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RadioError::Unavailable(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// A short label for attribution in the script ("according to …").
fn feed_source_name(url: &str) -> String {
    url.split("//")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or(url)
        .trim_start_matches("www.")
        .to_string()
}

/// Parses RSS `<item>` or Atom `<entry>` elements out of a fetched buffer.
///
/// Only titles and summaries are kept; everything else in the feed is
/// noise for our purposes.
pub fn parse_feed(bytes: &[u8], source: &str) -> Vec<NewsItem> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    let mut items = Vec::new();
    let mut in_item = false;
    // Which of the fields we are currently collecting text for.
    let mut field: Option<Field> = None;
    let mut title = String::new();
    let mut summary = String::new();

    #[derive(PartialEq, Clone, Copy)]
    enum Field {
        Title,
        Summary,
    }

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"item" | b"entry" => {
                    in_item = true;
                    title.clear();
                    summary.clear();
                }
                b"title" if in_item => field = Some(Field::Title),
                b"description" | b"summary" if in_item => field = Some(Field::Summary),
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if let Some(active) = field {
                    let raw = String::from_utf8_lossy(e);
                    let decoded = html_escape::decode_html_entities(raw.as_ref()).to_string();
                    match active {
                        Field::Title => title.push_str(&decoded),
                        Field::Summary => summary.push_str(&decoded),
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(active) = field {
                    let raw = String::from_utf8_lossy(e).to_string();
                    match active {
                        Field::Title => title.push_str(&raw),
                        Field::Summary => summary.push_str(&raw),
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"item" | b"entry" => {
                    in_item = false;
                    let trimmed = title.trim();
                    if !trimmed.is_empty() {
                        let summary = summary.trim();
                        items.push(NewsItem {
                            title: trimmed.to_string(),
                            summary: (!summary.is_empty()).then(|| summary.to_string()),
                            source: source.to_string(),
                        });
                    }
                }
                b"title" | b"description" | b"summary" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[Content] feed parse error from {source}: {e}");
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    items
}
