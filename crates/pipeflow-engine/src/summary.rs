//! Result summaries and final-output extraction.
//!
//! Two concerns live here: the short per-node labels attached to progress
//! events, and the extraction of a user-facing final answer from the last
//! node's output — including the structured rendering of search-style
//! results and weather queries.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::resolver::NodeOutput;

// ---------------------------------------------------------------------------
// Per-node result labels
// ---------------------------------------------------------------------------

/// A short label describing a tool's return value for progress events.
pub fn result_summary(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            if let Some(results) = map.get("results").and_then(Value::as_array) {
                format!("{} results", results.len())
            } else if let Some(text) = map.get("formatted_text").and_then(Value::as_str) {
                format!("formatted text, len={}", text.chars().count())
            } else if let Some(text) = map.get("report_content").and_then(Value::as_str) {
                format!("report, len={}", text.chars().count())
            } else if let Some(status) = map.get("status") {
                format!("status={}", render_scalar(status))
            } else {
                format!("mapping, {} fields", map.len())
            }
        }
        Value::Array(items) => format!("sequence, {} items", items.len()),
        Value::String(s) => format!("string, len={}", s.chars().count()),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Null => "null".to_string(),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Generic-message detection
// ---------------------------------------------------------------------------

fn generic_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)search succeeded.*found.*results?",
            r"(?i)搜索成功.*找到.*结果",
            r"(?i)task\s+.*complete",
            r"(?i)complete[d.!]?\s*$",
            r"(?i)^\s*success(ful|fully)?[.!]?\s*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("generic pattern is valid"))
        .collect()
    })
}

/// Whether a message is a generic status line (not worth surfacing as the
/// final answer).
pub fn is_generic_message(message: &str) -> bool {
    generic_patterns().iter().any(|p| p.is_match(message))
}

// ---------------------------------------------------------------------------
// Text normalization
// ---------------------------------------------------------------------------

fn html_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"))
}

/// Normalize scraped text: strip HTML tags and control characters, drop
/// everything outside word characters, whitespace, CJK, and basic
/// punctuation, then collapse whitespace runs.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let without_tags = html_tag_pattern().replace_all(text, "");

    let filtered: String = without_tags
        .chars()
        .filter(|c| {
            !c.is_control()
                && (c.is_alphanumeric()
                    || c.is_whitespace()
                    || matches!(
                        c,
                        ',' | '.' | '!' | '?' | ';' | ':' | '(' | ')' | '-' | '_'
                            | '、' | '。' | '，' | '！' | '？' | '；' | '：' | '（' | '）'
                            | '°' | '℃' | '~' | '至'
                    ))
        })
        .collect();

    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Final-output extraction
// ---------------------------------------------------------------------------

/// Extract the user-facing final answer from the last node's output.
///
/// Precedence: a search-style `data.primary` sequence gets a structured
/// summary; then the first non-generic string among `result`, `content`,
/// `text`, `answer`; then a non-generic `message`; then the declared output
/// key; finally the raw value.
pub fn extract_final_output(output: &NodeOutput) -> Value {
    let value = &output.value;
    let Some(map) = value.as_object() else {
        return value.clone();
    };

    if let Some(primary) = map
        .get("data")
        .and_then(Value::as_object)
        .and_then(|d| d.get("primary"))
        .and_then(Value::as_array)
    {
        if !primary.is_empty() {
            return Value::String(summarize_primary(primary, value));
        }
    }

    for key in ["result", "content", "text", "answer"] {
        if let Some(s) = map.get(key).and_then(Value::as_str) {
            if !s.is_empty() && !is_generic_message(s) {
                return Value::String(s.to_string());
            }
        }
    }

    if let Some(message) = map.get("message").and_then(Value::as_str) {
        if !message.is_empty() && !is_generic_message(message) {
            return Value::String(message.to_string());
        }
    }

    if let Some(field) = map.get(&output.output_key) {
        return field.clone();
    }

    value.clone()
}

/// Keywords marking a weather-intent query.
const WEATHER_KEYWORDS: [&str; 6] = ["weather", "temperature", "forecast", "天气", "气温", "温度"];

/// Render a search-style `data.primary` sequence into a structured summary.
pub fn summarize_primary(primary: &[Value], context: &Value) -> String {
    let query = context
        .get("metadata")
        .and_then(|m| m.get("parameters"))
        .and_then(|p| p.get("query"))
        .and_then(Value::as_str)
        .unwrap_or("");

    if let Some(first) = primary.first().and_then(Value::as_object) {
        let title = clean_text(first.get("title").and_then(Value::as_str).unwrap_or(""));
        let snippet = clean_text(
            first
                .get("snippet")
                .or_else(|| first.get("description"))
                .and_then(Value::as_str)
                .unwrap_or(""),
        );

        let lower_query = query.to_lowercase();
        if WEATHER_KEYWORDS.iter().any(|k| lower_query.contains(k)) {
            if let Some(weather) = extract_weather_info(&format!("{title} {snippet}"), query) {
                return weather;
            }
        }
    }

    format_search_summary(primary, context)
}

fn weather_keyword_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)weather|temperature|forecast|天气|气温|温度").expect("pattern is valid")
    })
}

fn temperature_range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{1,2})\s*(?:°|℃)?\s*(?:~|-|至)\s*(\d{1,2})\s*(?:°|℃)?\s*[Cc]?")
            .expect("pattern is valid")
    })
}

fn temperature_single_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{1,2})\s*(?:°|℃)?\s*[Cc]?").expect("pattern is valid"))
}

fn wind_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(northeast|northwest|southeast|southwest|north|south|east|west)\s*wind(?:\s*(\d+)\s*level)?|(东南风|西南风|东北风|西北风|东风|西风|南风|北风)(\d+级)?",
        )
        .expect("pattern is valid")
    })
}

/// Sky conditions, compound phrases first so they win the scan.
const SKY_CONDITIONS: [&str; 24] = [
    "light rain",
    "moderate rain",
    "heavy rain",
    "rainstorm",
    "thunderstorm",
    "partly cloudy",
    "sunny",
    "overcast",
    "cloudy",
    "snow",
    "foggy",
    "haze",
    "fog",
    "小雨",
    "中雨",
    "大雨",
    "暴雨",
    "雷雨",
    "晴",
    "阴",
    "多云",
    "雪",
    "雾霾",
    "雾",
];

/// Air-quality grades, most specific first.
const AIR_QUALITIES: [&str; 12] = [
    "lightly polluted",
    "moderately polluted",
    "heavily polluted",
    "severely polluted",
    "excellent",
    "good",
    "轻度污染",
    "中度污染",
    "重度污染",
    "严重污染",
    "优",
    "良",
];

/// Extract structured weather lines from free text.
///
/// Returns `None` when nothing weather-shaped is found.
pub fn extract_weather_info(text: &str, query: &str) -> Option<String> {
    let mut lines = Vec::new();
    let lower = text.to_lowercase();

    let location = weather_keyword_pattern().replace_all(query, "");
    let location = location.trim();
    if !location.is_empty() {
        lines.push(format!("📍 {location}"));
    }

    if let Some(captures) = temperature_range_pattern().captures(text) {
        lines.push(format!("🌡️ {}°C~{}°C", &captures[1], &captures[2]));
    } else if let Some(captures) = temperature_single_pattern().captures(text) {
        lines.push(format!("🌡️ {}°C", &captures[1]));
    }

    for condition in SKY_CONDITIONS {
        if lower.contains(condition) {
            lines.push(format!("☁️ {condition}"));
            break;
        }
    }

    if let Some(captures) = wind_pattern().captures(text) {
        if let Some(direction) = captures.get(1) {
            let mut wind = format!("{} wind", direction.as_str().to_lowercase());
            if let Some(level) = captures.get(2) {
                wind.push_str(&format!(" {} level", level.as_str()));
            }
            lines.push(format!("💨 {wind}"));
        } else if let Some(direction) = captures.get(3) {
            let level = captures.get(4).map(|m| m.as_str()).unwrap_or("");
            lines.push(format!("💨 {}{level}", direction.as_str()));
        }
    }

    for quality in AIR_QUALITIES {
        if lower.contains(quality) {
            lines.push(format!("🌬️ air quality {quality}"));
            break;
        }
    }

    // Location alone is not weather information.
    if lines.len() <= 1 && !lines.iter().any(|l| l.starts_with("🌡")) {
        return None;
    }

    Some(lines.join("\n"))
}

/// Format up to three search items with truncated snippets and an optional
/// total count.
pub fn format_search_summary(primary: &[Value], context: &Value) -> String {
    if primary.is_empty() {
        return "No results found.".to_string();
    }

    let mut formatted = Vec::new();
    for (i, item) in primary.iter().take(3).enumerate() {
        let Some(map) = item.as_object() else {
            continue;
        };
        let title = clean_text(map.get("title").and_then(Value::as_str).unwrap_or(""));
        if title.is_empty() {
            continue;
        }

        let description = clean_text(
            map.get("snippet")
                .or_else(|| map.get("description"))
                .or_else(|| map.get("content"))
                .and_then(Value::as_str)
                .unwrap_or(""),
        );

        let description = if description.chars().count() > 150 {
            let truncated: String = description.chars().take(150).collect();
            format!("{truncated}...")
        } else {
            description
        };

        if description.is_empty() {
            formatted.push(format!("{}. {title}", i + 1));
        } else {
            formatted.push(format!("{}. {title}\n   {description}", i + 1));
        }
    }

    if formatted.is_empty() {
        return "Results found, but their content is empty.".to_string();
    }

    let mut text = format!("📋 Results:\n\n{}", formatted.join("\n\n"));

    if let Some(total) = context
        .get("data")
        .and_then(|d| d.get("counts"))
        .and_then(|c| c.get("total"))
        .and_then(Value::as_u64)
    {
        text.push_str(&format!("\n\n📊 {total} results total"));
    }

    text
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::OutputDescriptor;
    use serde_json::json;

    fn node_output(output_key: &str, value: Value) -> NodeOutput {
        NodeOutput {
            node_id: "n".to_string(),
            output_key: output_key.to_string(),
            value,
            descriptor: OutputDescriptor::default(),
        }
    }

    #[test]
    fn summary_labels_follow_shape() {
        assert_eq!(result_summary(&json!({"results": [1, 2]})), "2 results");
        assert_eq!(
            result_summary(&json!({"formatted_text": "abcd"})),
            "formatted text, len=4"
        );
        assert_eq!(
            result_summary(&json!({"report_content": "abc"})),
            "report, len=3"
        );
        assert_eq!(result_summary(&json!({"status": "ok"})), "status=ok");
        assert_eq!(result_summary(&json!({"a": 1, "b": 2})), "mapping, 2 fields");
        assert_eq!(result_summary(&json!([1, 2, 3])), "sequence, 3 items");
        assert_eq!(result_summary(&json!("hello")), "string, len=5");
        assert_eq!(result_summary(&json!(7)), "number");
        assert_eq!(result_summary(&Value::Null), "null");
    }

    #[test]
    fn generic_messages_are_detected() {
        assert!(is_generic_message("search succeeded, found 3 results"));
        assert!(is_generic_message("task complete"));
        assert!(is_generic_message("success"));
        assert!(is_generic_message("web_search complete"));
        assert!(!is_generic_message("Beijing will be sunny tomorrow"));
    }

    #[test]
    fn clean_text_strips_tags_and_controls() {
        let cleaned = clean_text("<b>hello</b>\x07  world\n\n  18~25°C");
        assert_eq!(cleaned, "hello world 18~25°C");
    }

    #[test]
    fn clean_text_keeps_cjk() {
        assert_eq!(clean_text("北京 天气 <i>晴</i>"), "北京 天气 晴");
    }

    #[test]
    fn final_output_prefers_non_generic_strings() {
        let output = node_output(
            "results",
            json!({"message": "search succeeded, found 2 results", "content": "real answer"}),
        );
        assert_eq!(extract_final_output(&output), json!("real answer"));
    }

    #[test]
    fn final_output_falls_back_to_output_key() {
        let output = node_output(
            "report_content",
            json!({"report_content": "the report", "status": "success"}),
        );
        assert_eq!(extract_final_output(&output), json!("the report"));
    }

    #[test]
    fn final_output_raw_value_when_nothing_matches() {
        let output = node_output("missing", json!({"k": 1}));
        assert_eq!(extract_final_output(&output), json!({"k": 1}));
    }

    #[test]
    fn final_output_non_mapping_passes_through() {
        let output = node_output("out", json!([1, 2]));
        assert_eq!(extract_final_output(&output), json!([1, 2]));
    }

    #[test]
    fn weather_summary_extracts_all_fields() {
        let output = node_output(
            "results",
            json!({
                "data": {"primary": [
                    {"title": "Beijing 18~25°C sunny, north wind 3 level, air quality good"}
                ]},
                "metadata": {"parameters": {"query": "Beijing weather"}},
            }),
        );

        let final_output = extract_final_output(&output);
        let text = final_output.as_str().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "📍 Beijing",
                "🌡️ 18°C~25°C",
                "☁️ sunny",
                "💨 north wind 3 level",
                "🌬️ air quality good",
            ]
        );
    }

    #[test]
    fn weather_single_temperature() {
        let info = extract_weather_info("Shanghai 22°C cloudy", "Shanghai weather").unwrap();
        assert!(info.contains("🌡️ 22°C"));
        assert!(info.contains("☁️ cloudy"));
    }

    #[test]
    fn weather_temperature_without_degree_marker() {
        let info = extract_weather_info("current temp 25C, overcast", "town weather").unwrap();
        assert!(info.contains("🌡️ 25°C"));
    }

    #[test]
    fn chinese_haze_condition_detected() {
        let info = extract_weather_info("北京 雾霾 空气质量 轻度污染", "北京天气").unwrap();
        assert!(info.contains("☁️ 雾霾"));
        assert!(info.contains("🌬️ air quality 轻度污染"));
    }

    #[test]
    fn non_weather_query_formats_search_summary() {
        let output = node_output(
            "results",
            json!({
                "data": {
                    "primary": [
                        {"title": "Rust book", "snippet": "The Rust programming language"},
                        {"title": "Rustlings", "description": "Small exercises"},
                        {"title": "Crates.io", "snippet": "Package registry"},
                        {"title": "Fourth", "snippet": "Should not appear"},
                    ],
                    "counts": {"total": 42},
                },
                "metadata": {"parameters": {"query": "rust learning"}},
            }),
        );

        let text = extract_final_output(&output);
        let text = text.as_str().unwrap();
        assert!(text.starts_with("📋 Results:"));
        assert!(text.contains("1. Rust book"));
        assert!(text.contains("3. Crates.io"));
        assert!(!text.contains("Fourth"));
        assert!(text.contains("📊 42 results total"));
    }

    #[test]
    fn long_snippets_truncate_at_150_chars() {
        let long = "x".repeat(200);
        let primary = vec![json!({"title": "t", "snippet": long})];
        let summary = format_search_summary(&primary, &json!({}));
        assert!(summary.contains(&format!("{}...", "x".repeat(150))));
    }
}
