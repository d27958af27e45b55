use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ReportError, ReportResult};

pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";
pub const DEFAULT_API_VERSION: &str = "7.1-preview.3";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_OUTPUT: &str = "epics.xlsx";

/// What happens to the generated workbook once the run is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionPolicy {
    /// Remove the file on every exit path.
    AlwaysDelete,
    /// Remove the file only after it was delivered.
    #[default]
    KeepOnFailure,
    /// Never remove the file.
    KeepAlways,
}

impl RetentionPolicy {
    fn parse(value: &str) -> ReportResult<Self> {
        <Self as clap::ValueEnum>::from_str(value.trim(), false).map_err(|_| {
            ReportError::Config(format!(
                "unknown retention policy '{}' (expected always-delete, keep-on-failure or keep-always)",
                value.trim()
            ))
        })
    }
}

/// Raw `config.toml` contents. Every field is optional; gaps are filled from
/// the environment and defaults by [`resolve`].
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub azure: AzureSection,
    #[serde(default)]
    pub mail: MailSection,
    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct AzureSection {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub api_version: Option<String>,
    pub personal_access_token: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MailSection {
    pub sender: Option<String>,
    pub recipients: Option<Vec<String>>,
    pub password: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReportSection {
    pub output: Option<PathBuf>,
    pub retention: Option<RetentionPolicy>,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub base_url: String,
    pub organization: String,
    pub project: String,
    pub api_version: String,
    pub personal_access_token: String,
    pub timeout: Duration,
    pub concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub sender: String,
    pub recipients: Vec<String>,
    pub password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub output: PathBuf,
    pub retention: RetentionPolicy,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub tracker: TrackerSettings,
    /// `None` when email delivery is switched off.
    pub mail: Option<MailSettings>,
    pub report: ReportSettings,
}

pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".epic-report")
        .join("config.toml")
}

/// Read the TOML config. A missing file at the default location is not an
/// error; a missing file the user named explicitly is.
pub fn load_file(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let path = config_path();
            if !path.exists() {
                return Ok(FileConfig::default());
            }
            path
        }
    };
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: FileConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Load `.env` (if any), the config file, and overlay the process environment.
pub fn load(explicit: Option<&Path>, email_enabled: bool) -> Result<Settings> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    let file = load_file(explicit).map_err(|e| ReportError::Config(format!("{e:#}")))?;
    let settings = resolve(file, |key| std::env::var(key).ok(), email_enabled)?;
    Ok(settings)
}

/// Merge file values with environment lookups. Environment wins.
pub fn resolve(
    file: FileConfig,
    env: impl Fn(&str) -> Option<String>,
    email_enabled: bool,
) -> ReportResult<Settings> {
    let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let azure = file.azure;
    let timeout_secs = match lookup("AZURE_DEVOPS_TIMEOUT_SECS") {
        Some(v) => parse_number(&v, "AZURE_DEVOPS_TIMEOUT_SECS")?,
        None => azure.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
    };
    let concurrency = match lookup("EPIC_REPORT_CONCURRENCY") {
        Some(v) => parse_number(&v, "EPIC_REPORT_CONCURRENCY")?,
        None => azure.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
    };

    let tracker = TrackerSettings {
        base_url: lookup("AZURE_DEVOPS_BASE_URL")
            .or(azure.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        organization: required(lookup("AZURE_DEVOPS_ORG").or(azure.organization), "AZURE_DEVOPS_ORG")?,
        project: required(lookup("AZURE_DEVOPS_PROJECT").or(azure.project), "AZURE_DEVOPS_PROJECT")?,
        api_version: lookup("AZURE_DEVOPS_API_VERSION")
            .or(azure.api_version)
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        personal_access_token: required(
            lookup("AZURE_DEVOPS_PAT").or(azure.personal_access_token),
            "AZURE_DEVOPS_PAT",
        )?,
        timeout: Duration::from_secs(timeout_secs),
        concurrency: concurrency.max(1),
    };

    let mail = if email_enabled {
        let mail = file.mail;
        let recipients = match lookup("EPIC_REPORT_RECIPIENTS") {
            Some(list) => split_recipients(&list),
            None => mail.recipients.unwrap_or_default(),
        };
        if recipients.is_empty() {
            return Err(missing("EPIC_REPORT_RECIPIENTS"));
        }
        let smtp_port = match lookup("EPIC_REPORT_SMTP_PORT") {
            Some(v) => parse_number(&v, "EPIC_REPORT_SMTP_PORT")?,
            None => mail.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
        };
        Some(MailSettings {
            sender: required(lookup("EPIC_REPORT_SENDER").or(mail.sender), "EPIC_REPORT_SENDER")?,
            recipients,
            password: required(
                lookup("EPIC_REPORT_MAIL_PASSWORD").or(mail.password),
                "EPIC_REPORT_MAIL_PASSWORD",
            )?,
            smtp_host: lookup("EPIC_REPORT_SMTP_HOST")
                .or(mail.smtp_host)
                .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            smtp_port,
            timeout: Duration::from_secs(timeout_secs),
        })
    } else {
        None
    };

    let report = ReportSettings {
        output: lookup("EPIC_REPORT_OUTPUT")
            .map(PathBuf::from)
            .or(file.report.output)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        retention: match lookup("EPIC_REPORT_RETENTION") {
            Some(v) => RetentionPolicy::parse(&v)?,
            None => file.report.retention.unwrap_or_default(),
        },
    };

    Ok(Settings {
        tracker,
        mail,
        report,
    })
}

pub fn split_recipients(list: &str) -> Vec<String> {
    list.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn required(value: Option<String>, key: &str) -> ReportResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| missing(key))
}

fn missing(key: &str) -> ReportError {
    ReportError::Config(format!("{key} is not set (environment or config.toml)"))
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> ReportResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ReportError::Config(format!("{key} must be a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn tracker_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("AZURE_DEVOPS_ORG", "contoso"),
            ("AZURE_DEVOPS_PROJECT", "Platform"),
            ("AZURE_DEVOPS_PAT", "secret-pat"),
        ]
    }

    #[test]
    fn resolve_applies_defaults() {
        let settings = resolve(FileConfig::default(), env_from(&tracker_env()), false).unwrap();
        assert_eq!(settings.tracker.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.tracker.api_version, DEFAULT_API_VERSION);
        assert_eq!(settings.tracker.timeout, Duration::from_secs(30));
        assert_eq!(settings.tracker.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.report.output, PathBuf::from("epics.xlsx"));
        assert_eq!(settings.report.retention, RetentionPolicy::KeepOnFailure);
        assert!(settings.mail.is_none());
    }

    #[test]
    fn resolve_missing_token_names_the_key() {
        let env = env_from(&[("AZURE_DEVOPS_ORG", "contoso"), ("AZURE_DEVOPS_PROJECT", "Platform")]);
        let err = resolve(FileConfig::default(), env, false).unwrap_err();
        assert!(matches!(err, ReportError::Config(_)));
        assert!(err.to_string().contains("AZURE_DEVOPS_PAT"));
    }

    #[test]
    fn resolve_blank_values_count_as_missing() {
        let env = env_from(&[
            ("AZURE_DEVOPS_ORG", "contoso"),
            ("AZURE_DEVOPS_PROJECT", "  "),
            ("AZURE_DEVOPS_PAT", "secret-pat"),
        ]);
        let err = resolve(FileConfig::default(), env, false).unwrap_err();
        assert!(err.to_string().contains("AZURE_DEVOPS_PROJECT"));
    }

    #[test]
    fn resolve_requires_mail_settings_when_email_enabled() {
        let err = resolve(FileConfig::default(), env_from(&tracker_env()), true).unwrap_err();
        assert!(err.to_string().contains("EPIC_REPORT_RECIPIENTS"));
    }

    #[test]
    fn resolve_mail_from_environment() {
        let mut pairs = tracker_env();
        pairs.extend([
            ("EPIC_REPORT_SENDER", "reports@contoso.com"),
            ("EPIC_REPORT_RECIPIENTS", "a@contoso.com, b@contoso.com;"),
            ("EPIC_REPORT_MAIL_PASSWORD", "hunter2"),
            ("EPIC_REPORT_SMTP_PORT", "2525"),
        ]);
        let settings = resolve(FileConfig::default(), env_from(&pairs), true).unwrap();
        let mail = settings.mail.unwrap();
        assert_eq!(mail.recipients, vec!["a@contoso.com", "b@contoso.com"]);
        assert_eq!(mail.smtp_host, DEFAULT_SMTP_HOST);
        assert_eq!(mail.smtp_port, 2525);
    }

    #[test]
    fn resolve_rejects_non_numeric_port() {
        let mut pairs = tracker_env();
        pairs.extend([
            ("EPIC_REPORT_SENDER", "reports@contoso.com"),
            ("EPIC_REPORT_RECIPIENTS", "a@contoso.com"),
            ("EPIC_REPORT_MAIL_PASSWORD", "hunter2"),
            ("EPIC_REPORT_SMTP_PORT", "smtp"),
        ]);
        let err = resolve(FileConfig::default(), env_from(&pairs), true).unwrap_err();
        assert!(err.to_string().contains("EPIC_REPORT_SMTP_PORT"));
    }

    #[test]
    fn environment_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [azure]
            organization = "from-file"
            project = "Platform"
            personal_access_token = "file-pat"
            concurrency = 0

            [report]
            output = "out/epics.xlsx"
            retention = "keep-on-failure"
            "#,
        )
        .unwrap();
        let env = env_from(&[("AZURE_DEVOPS_ORG", "from-env")]);
        let settings = resolve(file, env, false).unwrap();
        assert_eq!(settings.tracker.organization, "from-env");
        assert_eq!(settings.tracker.personal_access_token, "file-pat");
        assert_eq!(settings.tracker.concurrency, 1);
        assert_eq!(settings.report.output, PathBuf::from("out/epics.xlsx"));
        assert_eq!(settings.report.retention, RetentionPolicy::KeepOnFailure);
    }

    #[test]
    fn retention_from_environment() {
        let mut pairs = tracker_env();
        pairs.push(("EPIC_REPORT_RETENTION", "keep-always"));
        let settings = resolve(FileConfig::default(), env_from(&pairs), false).unwrap();
        assert_eq!(settings.report.retention, RetentionPolicy::KeepAlways);

        let mut pairs = tracker_env();
        pairs.push(("EPIC_REPORT_RETENTION", " always-delete "));
        let settings = resolve(FileConfig::default(), env_from(&pairs), false).unwrap();
        assert_eq!(settings.report.retention, RetentionPolicy::AlwaysDelete);

        let mut pairs = tracker_env();
        pairs.push(("EPIC_REPORT_RETENTION", "sometimes"));
        let err = resolve(FileConfig::default(), env_from(&pairs), false).unwrap_err();
        assert!(matches!(err, ReportError::Config(_)));
        assert!(err.to_string().contains("'sometimes'"));
    }

    #[test]
    fn load_file_reads_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[mail]\nsender = \"reports@contoso.com\"\nrecipients = [\"pm@contoso.com\"]"
        )
        .unwrap();
        let config = load_file(Some(file.path())).unwrap();
        assert_eq!(config.mail.sender.as_deref(), Some("reports@contoso.com"));
        assert_eq!(config.mail.recipients.unwrap(), vec!["pm@contoso.com"]);
    }

    #[test]
    fn load_file_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let result = load_file(Some(missing.as_path()));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to read config"));
    }

    #[test]
    fn load_file_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[azure\norganization = ").unwrap();
        assert!(load_file(Some(file.path())).is_err());
    }
}
