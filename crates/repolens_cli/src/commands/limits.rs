use chrono::{DateTime, Utc};
use clap::ValueEnum;
use repolens::RateLimitInfo;
use serde::Serialize;
use tabled::Tabled;

use crate::commands::shared::build_client;
use crate::config::Config;
use crate::error::CliError;
use crate::output;

/// Output format for rate limit display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum LimitsFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

pub(crate) async fn handle_limits(format: LimitsFormat, config: &Config) -> Result<(), CliError> {
    let client = build_client(config)?;
    let limits = client.rate_limit().await?;

    let now = Utc::now();
    let items: Vec<RateLimitDisplay> = limits
        .iter()
        .map(|info| RateLimitDisplay::from_info(info, now))
        .collect();

    if !client.is_authenticated() && format == LimitsFormat::Table {
        output::print("Unauthenticated: set GITHUB_TOKEN or use --token for higher limits.")?;
    }
    output::print(&RateLimitDisplay::render(&items, format)?)?;
    Ok(())
}

/// Rate limit information for display.
#[derive(Debug, Clone, Serialize, Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Limit")]
    pub limit: String,
    #[tabled(rename = "Used")]
    pub used: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Usage %")]
    pub usage_percent: String,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
}

impl RateLimitDisplay {
    pub(crate) fn from_info(info: &RateLimitInfo, now: DateTime<Utc>) -> Self {
        let usage_percent = if info.limit > 0 {
            (info.used as f64 / info.limit as f64) * 100.0
        } else {
            0.0
        };
        let reset_duration = info.reset_at.signed_duration_since(now);
        let reset_in = if reset_duration.num_seconds() > 0 {
            format_duration(reset_duration)
        } else {
            "now".to_string()
        };

        Self {
            resource: info.resource.clone(),
            limit: info.limit.to_string(),
            used: info.used.to_string(),
            remaining: info.remaining.to_string(),
            usage_percent: format!("{:.1}%", usage_percent),
            reset_at: info.reset_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            reset_in,
        }
    }

    pub(crate) fn render(items: &[Self], format: LimitsFormat) -> Result<String, CliError> {
        match format {
            LimitsFormat::Table => {
                let mut table = tabled::Table::new(items);
                table.with(tabled::settings::Style::rounded());
                Ok(table.to_string())
            }
            LimitsFormat::Json => Ok(serde_json::to_string_pretty(items)?),
        }
    }
}

/// Format a duration in a human-readable way.
fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds();
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(resource: &str, limit: u64, used: u64, reset_in_secs: i64, now: DateTime<Utc>) -> RateLimitInfo {
        RateLimitInfo {
            resource: resource.to_string(),
            limit,
            remaining: limit - used,
            used,
            reset_at: now + chrono::Duration::seconds(reset_in_secs),
        }
    }

    #[test]
    fn output_format_default_is_table() {
        assert!(matches!(LimitsFormat::default(), LimitsFormat::Table));
    }

    #[test]
    fn format_duration_handles_seconds_minutes_and_hours() {
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::seconds(120)), "2m");
        assert_eq!(format_duration(chrono::Duration::seconds(125)), "2m 5s");
        assert_eq!(format_duration(chrono::Duration::seconds(3600)), "1h");
        assert_eq!(format_duration(chrono::Duration::seconds(3900)), "1h 5m");
    }

    #[test]
    fn rate_limit_display_formats_percent_and_reset() {
        let now = Utc::now();
        let display = RateLimitDisplay::from_info(&sample("core", 100, 25, 125, now), now);

        assert_eq!(display.resource, "core");
        assert_eq!(display.limit, "100");
        assert_eq!(display.used, "25");
        assert_eq!(display.remaining, "75");
        assert_eq!(display.usage_percent, "25.0%");
        assert_eq!(display.reset_in, "2m 5s");
        assert!(display.reset_at.contains("UTC"));
    }

    #[test]
    fn past_reset_shows_now_and_zero_limit_shows_zero_usage() {
        let now = Utc::now();
        let display = RateLimitDisplay::from_info(&sample("search", 0, 0, -10, now), now);

        assert_eq!(display.reset_in, "now");
        assert_eq!(display.usage_percent, "0.0%");
    }

    #[test]
    fn render_supports_json_and_table() {
        let now = Utc::now();
        let items = vec![RateLimitDisplay::from_info(&sample("core", 5000, 10, 600, now), now)];

        let json = RateLimitDisplay::render(&items, LimitsFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["resource"], "core");
        assert_eq!(parsed[0]["remaining"], "4990");

        let table = RateLimitDisplay::render(&items, LimitsFormat::Table).unwrap();
        assert!(table.contains("Resource"));
        assert!(table.contains("core"));
    }
}
