//! Prompt assembly for script synthesis.
//!
//! The system prompt carries the station's fixed identity; the user prompt
//! carries this hour's inputs plus the negative context of recently used
//! phrases. Everything here is deterministic string work so it stays
//! testable without a provider.

use std::fmt::Write as _;

use crate::config::{AnnouncerConfig, StationConfig, WordRange};
use crate::content::inputs::GatheredInputs;
use crate::providers::PromptBundle;

/// Builds the full prompt for one break.
pub fn build_prompt(
    station: &StationConfig,
    announcer: &AnnouncerConfig,
    words: WordRange,
    inputs: &GatheredInputs,
    recent_phrases: &[String],
) -> PromptBundle {
    PromptBundle {
        system: system_prompt(station, announcer, words),
        user: user_prompt(inputs, recent_phrases),
    }
}

fn system_prompt(station: &StationConfig, announcer: &AnnouncerConfig, words: WordRange) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "You write on-air copy for {}.", station.name);
    if !station.tagline.is_empty() {
        let _ = writeln!(p, "Station tagline: {}", station.tagline);
    }
    let _ = writeln!(p, "Announcer: {}", announcer.persona);
    if !announcer.world_setting.is_empty() {
        let _ = writeln!(p, "The world outside the studio: {}", announcer.world_setting);
    }
    let _ = writeln!(
        p,
        "Weirdness budget: {} out of 100. Spend it sparingly.",
        announcer.chaos_budget
    );
    if !announcer.humor_policy.is_empty() {
        let _ = writeln!(p, "Humor policy: {}", announcer.humor_policy);
    }
    for rule in &announcer.tone_rules {
        let _ = writeln!(p, "- {rule}");
    }
    if !announcer.banned_phrases.is_empty() {
        let _ = writeln!(
            p,
            "Never use these phrases: {}.",
            announcer.banned_phrases.join("; ")
        );
    }
    let _ = writeln!(
        p,
        "Write a single spoken segment of {}-{} words: weather, a few headlines, \
         and a station identification. Speech only, no stage directions, no markup.",
        words.min, words.max
    );
    p
}

fn user_prompt(inputs: &GatheredInputs, recent_phrases: &[String]) -> String {
    let mut p = String::new();

    match &inputs.weather {
        Some(w) => {
            let _ = writeln!(
                p,
                "Current weather: {}, {:.0}°C, wind {:.0} km/h.",
                w.condition, w.temperature_c, w.wind_kph
            );
        }
        None => {
            let _ = writeln!(p, "No weather data this hour; skip the forecast gracefully.");
        }
    }

    if inputs.news.is_empty() {
        let _ = writeln!(p, "No headlines this hour; fill with station color instead.");
    } else {
        let _ = writeln!(p, "Headlines:");
        for item in &inputs.news {
            match &item.summary {
                Some(summary) => {
                    let _ = writeln!(p, "- {} ({}): {}", item.title, item.source, summary);
                }
                None => {
                    let _ = writeln!(p, "- {} ({})", item.title, item.source);
                }
            }
        }
    }

    if !recent_phrases.is_empty() {
        let _ = writeln!(
            p,
            "You have said the following on recent breaks; do not repeat any of it:"
        );
        for phrase in recent_phrases {
            let _ = writeln!(p, "- {phrase}");
        }
    }
    p
}

/// Appends a stricter length instruction for a retry round.
pub fn tighten_for_retry(bundle: &PromptBundle, words: WordRange, attempt: usize) -> PromptBundle {
    let mut user = bundle.user.clone();
    let _ = writeln!(
        user,
        "\nYour previous draft missed the length target. This is attempt {}: \
         the segment MUST be between {} and {} words. Count before answering.",
        attempt + 1,
        words.min,
        words.max
    );
    PromptBundle {
        system: bundle.system.clone(),
        user,
    }
}

/// Counts words the way the length validator does.
#[must_use]
pub fn word_count(script: &str) -> usize {
    script.split_whitespace().count()
}

/// Templated script used when every script provider fails.
///
/// Flat but serviceable: it reads the gathered inputs straight, so the
/// break still carries real information.
pub fn fallback_script(station: &StationConfig, inputs: &GatheredInputs) -> String {
    let mut s = String::new();
    let _ = write!(s, "You're listening to {}. ", station.name);

    if let Some(w) = &inputs.weather {
        let _ = write!(
            s,
            "Right now we've got {} at {:.0} degrees, wind around {:.0} kilometers an hour. ",
            w.condition, w.temperature_c, w.wind_kph
        );
    }

    if !inputs.news.is_empty() {
        let _ = write!(s, "In the news: ");
        for (i, item) in inputs.news.iter().take(3).enumerate() {
            if i > 0 {
                let _ = write!(s, " Also: ");
            }
            let _ = write!(s, "{}.", item.title.trim_end_matches('.'));
        }
        let _ = write!(s, " ");
    }

    if station.tagline.is_empty() {
        let _ = write!(s, "Stay with us.");
    } else {
        let _ = write!(s, "{}.", station.tagline.trim_end_matches('.'));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::inputs::{NewsItem, WeatherReport};

    fn station() -> StationConfig {
        StationConfig {
            name: "Skywave FM".into(),
            tagline: "All night, every night".into(),
            crossfade: Default::default(),
        }
    }

    fn announcer() -> AnnouncerConfig {
        AnnouncerConfig {
            persona: "A tired but warm overnight host".into(),
            world_setting: "a coastal city that never quite sleeps".into(),
            chaos_budget: 25,
            humor_policy: "dry, never mean".into(),
            banned_phrases: vec!["at the end of the day".into()],
            tone_rules: vec!["Short sentences.".into()],
            director_prefix: String::new(),
        }
    }

    fn inputs() -> GatheredInputs {
        GatheredInputs {
            weather: Some(WeatherReport {
                temperature_c: 11.0,
                wind_kph: 19.0,
                condition: "rain".into(),
            }),
            news: vec![NewsItem {
                title: "Ferry schedule changes announced".into(),
                summary: None,
                source: "example.com".into(),
            }],
        }
    }

    #[test]
    fn prompt_carries_identity_inputs_and_negative_context() {
        let bundle = build_prompt(
            &station(),
            &announcer(),
            WordRange { min: 80, max: 220 },
            &inputs(),
            &["the rain keeps falling".to_string()],
        );

        assert!(bundle.system.contains("Skywave FM"));
        assert!(bundle.system.contains("at the end of the day"));
        assert!(bundle.system.contains("80-220 words"));
        assert!(bundle.user.contains("rain, 11°C"));
        assert!(bundle.user.contains("Ferry schedule changes"));
        assert!(bundle.user.contains("the rain keeps falling"));
    }

    #[test]
    fn missing_weather_is_acknowledged_not_invented() {
        let mut gathered = inputs();
        gathered.weather = None;
        let bundle = build_prompt(
            &station(),
            &announcer(),
            WordRange { min: 80, max: 220 },
            &gathered,
            &[],
        );
        assert!(bundle.user.contains("No weather data"));
    }

    #[test]
    fn retry_prompt_gets_stricter() {
        let bundle = build_prompt(
            &station(),
            &announcer(),
            WordRange { min: 80, max: 220 },
            &inputs(),
            &[],
        );
        let tightened = tighten_for_retry(&bundle, WordRange { min: 80, max: 220 }, 1);
        assert!(tightened.user.contains("attempt 2"));
        assert!(tightened.user.len() > bundle.user.len());
        assert_eq!(tightened.system, bundle.system);
    }

    #[test]
    fn fallback_reads_the_inputs_straight() {
        let script = fallback_script(&station(), &inputs());
        assert!(script.contains("Skywave FM"));
        assert!(script.contains("11 degrees"));
        assert!(script.contains("Ferry schedule changes announced"));
        assert!(script.ends_with("All night, every night."));
    }

    #[test]
    fn word_count_matches_whitespace_splitting() {
        assert_eq!(word_count("three little words"), 3);
        assert_eq!(word_count("  padded   out  "), 2);
        assert_eq!(word_count(""), 0);
    }
}
