//! Application configuration from CLI flags and environment.

use std::time::Duration;

use clap::Parser;

use calcflow_cli::OutputFormat;
use calcflow_orchestration::SubmitConfiguration;

/// calcflow: run form calculations against a CalcEngine service.
#[derive(Parser, Debug)]
#[command(name = "calcflow", version, about)]
#[allow(clippy::struct_excessive_bools)]
pub struct AppConfig {
    /// Calculation service URL.
    #[arg(long, env = "CALCFLOW_ENDPOINT")]
    pub endpoint: Option<String>,

    /// API base URL for follow-up commands (defaults to the endpoint).
    #[arg(long, env = "CALCFLOW_API_ENDPOINT")]
    pub api_endpoint: Option<String>,

    /// JSON array of CalcEngine definitions.
    #[arg(long, value_name = "FILE")]
    pub engines: Option<String>,

    /// JSON object of inputs; an `InputTables` key holds input tables.
    #[arg(long, value_name = "FILE")]
    pub inputs: Option<String>,

    /// Input override, repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// JSON array of result tabs to merge without calling the service.
    #[arg(long, value_name = "FILE")]
    pub manual_results: Option<String>,

    /// Use the test versions of the engines.
    #[arg(long)]
    pub test_ce: bool,

    /// Ask the service to trace the calculation.
    #[arg(long)]
    pub trace: bool,

    /// Save the engine workbook under this name after calculating.
    #[arg(long, value_name = "NAME")]
    pub save_ce: Option<String>,

    /// Force the service to reload engine workbooks.
    #[arg(long)]
    pub refresh_ce: bool,

    /// Authenticated user id.
    #[arg(long)]
    pub auth_id: Option<String>,

    /// Client name.
    #[arg(long)]
    pub client: Option<String>,

    /// UI culture sent to the engines.
    #[arg(long, default_value = "en-US")]
    pub culture: String,

    /// Environment name.
    #[arg(long)]
    pub environment: Option<String>,

    /// Bearer token for the service.
    #[arg(long, env = "CALCFLOW_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Request timeout (e.g., "30s", "2m", "500ms").
    #[arg(long, default_value = "30s")]
    pub timeout: String,

    /// Directory generated documents are saved to.
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<String>,

    /// Output file path.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Quiet mode (results only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Generate shell completion.
    #[arg(long, value_enum)]
    pub completion: Option<clap_complete::Shell>,
}

impl AppConfig {
    /// Parse CLI arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse timeout string into Duration.
    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }

    #[must_use]
    pub fn api_endpoint(&self) -> Option<&str> {
        self.api_endpoint.as_deref().or(self.endpoint.as_deref())
    }

    /// Service-wide fields of the request `Configuration` block.
    #[must_use]
    pub fn submit_configuration(&self) -> SubmitConfiguration {
        SubmitConfiguration {
            trace_enabled: self.trace,
            save_ce: self.save_ce.clone(),
            refresh_calc_engine: self.refresh_ce,
            auth_id: self.auth_id.clone(),
            client: self.client.clone(),
            test_ce: self.test_ce,
            current_ui_culture: self.culture.clone(),
            environment: self.environment.clone(),
            framework: crate::version::framework(),
            token: self.token.clone(),
            ..SubmitConfiguration::default()
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse a duration string like "5m", "1h", "30s".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let n: u64 = ms.parse().ok()?;
        Some(Duration::from_millis(n))
    } else if let Some(mins) = s.strip_suffix('m') {
        let n: u64 = mins.parse().ok()?;
        Some(Duration::from_secs(n * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        let n: u64 = hours.parse().ok()?;
        Some(Duration::from_secs(n * 3600))
    } else if let Some(secs) = s.strip_suffix('s') {
        let n: u64 = secs.parse().ok()?;
        Some(Duration::from_secs(n))
    } else {
        let n: u64 = s.parse().ok()?;
        Some(Duration::from_secs(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_formats() {
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("12"), Some(Duration::from_secs(12)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn key_value_pairs() {
        assert_eq!(parse_key_value("iAge=40"), Ok(("iAge".into(), "40".into())));
        assert_eq!(parse_key_value("iNote=a=b"), Ok(("iNote".into(), "a=b".into())));
        assert!(parse_key_value("iAge").is_err());
        assert!(parse_key_value("=1").is_err());
    }

    #[test]
    fn flags_map_to_submit_configuration() {
        let config = AppConfig::try_parse_from([
            "calcflow",
            "--endpoint",
            "http://calc.test/run",
            "--test-ce",
            "--trace",
            "--client",
            "Acme",
            "--set",
            "iAge=40",
            "--timeout",
            "2m",
        ])
        .unwrap();
        let submit = config.submit_configuration();
        assert!(submit.test_ce);
        assert!(submit.trace_enabled);
        assert_eq!(submit.client.as_deref(), Some("Acme"));
        assert_eq!(submit.current_ui_culture, "en-US");
        assert_eq!(config.overrides, [("iAge".to_string(), "40".to_string())]);
        assert_eq!(config.timeout_duration(), Duration::from_secs(120));
        assert_eq!(config.api_endpoint(), Some("http://calc.test/run"));
    }
}
