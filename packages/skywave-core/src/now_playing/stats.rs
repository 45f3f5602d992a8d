//! Listener stats from the streaming server's JSON status endpoint.
//!
//! Failures degrade to default (zeroed) stats; the snapshot is never held
//! up by the streaming server.

use serde_json::Value;

use super::StreamStats;
use crate::config::StreamConfig;
use crate::constants::NOTIFY_TIMEOUT;

/// Fetches current stream stats, or `None` when the server is unreachable
/// or the document does not mention our mount.
pub async fn fetch_stream_stats(
    client: &reqwest::Client,
    config: &StreamConfig,
) -> Option<StreamStats> {
    let url = config.status_url.as_ref()?;

    let response = client
        .get(url)
        .timeout(NOTIFY_TIMEOUT)
        .send()
        .await
        .map_err(|e| log::debug!("[Stats] status fetch failed: {e}"))
        .ok()?;
    let body: Value = response
        .json()
        .await
        .map_err(|e| log::debug!("[Stats] status body unparsable: {e}"))
        .ok()?;

    parse_status(&body, &config.mount_path)
}

/// Pulls our source out of an icestats document.
///
/// `source` is an object for a single mount and an array for several;
/// both shapes occur in the wild.
pub fn parse_status(body: &Value, mount_path: &str) -> Option<StreamStats> {
    let source = body.get("icestats")?.get("source")?;
    let chosen = match source {
        Value::Array(sources) => sources
            .iter()
            .find(|s| {
                s.get("listenurl")
                    .and_then(Value::as_str)
                    .is_some_and(|u| u.ends_with(mount_path))
            })
            .or_else(|| sources.first())?,
        other => other,
    };

    Some(StreamStats {
        listeners: chosen.get("listeners").and_then(Value::as_u64).unwrap_or(0) as u32,
        bitrate: chosen.get("bitrate").and_then(Value::as_u64).unwrap_or(0) as u32,
        samplerate: chosen.get("samplerate").and_then(Value::as_u64).unwrap_or(0) as u32,
        stream_start_iso8601: chosen
            .get("stream_start_iso8601")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_source_object_parses() {
        let body = json!({
            "icestats": {
                "source": {
                    "listenurl": "http://radio.example:8000/stream",
                    "listeners": 7,
                    "bitrate": 192,
                    "samplerate": 44100,
                    "stream_start_iso8601": "2025-05-28T02:00:00Z"
                }
            }
        });
        let stats = parse_status(&body, "/stream").unwrap();
        assert_eq!(stats.listeners, 7);
        assert_eq!(stats.bitrate, 192);
        assert_eq!(stats.samplerate, 44100);
    }

    #[test]
    fn array_of_sources_matches_mount() {
        let body = json!({
            "icestats": {
                "source": [
                    {"listenurl": "http://radio.example:8000/low", "listeners": 2, "bitrate": 64},
                    {"listenurl": "http://radio.example:8000/stream", "listeners": 31, "bitrate": 192}
                ]
            }
        });
        let stats = parse_status(&body, "/stream").unwrap();
        assert_eq!(stats.listeners, 31);
        assert_eq!(stats.bitrate, 192);
    }

    #[test]
    fn missing_source_is_none() {
        let body = json!({"icestats": {}});
        assert!(parse_status(&body, "/stream").is_none());
    }

    #[test]
    fn unmatched_mount_falls_back_to_first_source() {
        let body = json!({
            "icestats": {
                "source": [
                    {"listenurl": "http://radio.example:8000/other", "listeners": 4}
                ]
            }
        });
        let stats = parse_status(&body, "/stream").unwrap();
        assert_eq!(stats.listeners, 4);
    }
}
