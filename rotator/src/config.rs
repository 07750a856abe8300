//! Command line and environment configuration.
//!
//! Every flag can also be set through the environment, which is how the
//! container deployment configures the rotator.

use crate::restreamer::RestreamerConfig;
use crate::retry::RetryPolicy;
use crate::rotation::RotationConfig;
use crate::youtube_api::{BroadcastPrivacyStatus, BroadcastScope, DEFAULT_API_BASE};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use jiff::tz::TimeZone;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "broadcast-rotator", version)]
#[command(about = "Rotates a 24/7 YouTube live broadcast before it hits the 12 hour limit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Complete the current broadcast and bind the stream to a fresh one
    Rotate(RotateArgs),
    /// Run the browser consent flow once and cache the resulting token
    Authorize(AuthArgs),
}

#[derive(Debug, Clone, Args)]
pub struct AuthArgs {
    /// Directory holding `token.json` and `client_secrets.json`
    #[arg(long, env = "AUTH_TOKEN_PATH")]
    pub auth_token_path: PathBuf,
}

impl AuthArgs {
    pub fn token_path(&self) -> PathBuf {
        self.auth_token_path.join("token.json")
    }

    pub fn client_secrets_path(&self) -> PathBuf {
        self.auth_token_path.join("client_secrets.json")
    }
}

#[derive(Debug, Clone, Args)]
pub struct RotateArgs {
    #[command(flatten)]
    pub auth: AuthArgs,

    /// Ingestion key of the stream whose broadcast is rotated
    #[arg(long, env = "STREAM_KEY", hide_env_values = true)]
    pub stream_key: String,

    /// IANA time zone used in broadcast titles
    #[arg(long, env = "TZ", default_value = "UTC", value_parser = parse_time_zone)]
    pub timezone: TimeZone,

    /// Base title; the scheduled start and end are appended
    #[arg(long, env = "STREAM_TITLE")]
    pub stream_title: String,

    #[arg(long, env = "STREAM_DESCRIPTION", default_value = "")]
    pub stream_description: String,

    #[arg(long, env = "PRIVACY_STATUS", value_enum, default_value_t = BroadcastPrivacyStatus::Public)]
    pub privacy: BroadcastPrivacyStatus,

    /// Let YouTube end a broadcast when the feed drops
    #[arg(long, env = "AUTO_STOP", value_parser = BoolishValueParser::new())]
    pub auto_stop: bool,

    /// Which broadcasts to search for the one bound to the stream
    #[arg(long, env = "BROADCAST_SCOPE", value_enum, default_value_t = BroadcastScope::Active)]
    pub broadcast_scope: BroadcastScope,

    /// Log intended changes without making them
    #[arg(long, env = "DRY_RUN", value_parser = BoolishValueParser::new())]
    pub dry_run: bool,

    #[arg(long, env = "YOUTUBE_API_BASE", default_value = DEFAULT_API_BASE)]
    pub youtube_api_base: String,

    #[command(flatten)]
    pub retry: RetryArgs,

    #[command(flatten)]
    pub restreamer: RestreamerArgs,
}

impl RotateArgs {
    pub fn rotation_config(&self) -> RotationConfig {
        RotationConfig {
            stream_key: self.stream_key.clone(),
            title: self.stream_title.clone(),
            description: self.stream_description.clone(),
            time_zone: self.timezone.clone(),
            privacy: self.privacy,
            auto_stop: self.auto_stop,
            scope: self.broadcast_scope,
            dry_run: self.dry_run,
        }
    }
}

fn parse_time_zone(name: &str) -> Result<TimeZone, jiff::Error> {
    TimeZone::get(name)
}

#[derive(Debug, Clone, Args)]
pub struct RetryArgs {
    /// Attempts per API call, including the first
    #[arg(long, env = "MAX_RETRIES", default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: u32,

    /// Seconds to wait before the first retry
    #[arg(long, env = "INITIAL_DELAY", default_value_t = 10)]
    pub initial_delay: u64,

    /// Multiplier applied to the delay after every failed attempt
    #[arg(long, env = "BACKOFF_FACTOR", default_value_t = 2.0, value_parser = parse_backoff_factor)]
    pub backoff_factor: f64,
}

/// Delays have to grow, so only finite factors above 1 are accepted.
fn parse_backoff_factor(value: &str) -> Result<f64, String> {
    let factor: f64 = value
        .parse()
        .map_err(|e| format!("not a number: {e}"))?;
    if factor.is_finite() && factor > 1.0 {
        Ok(factor)
    } else {
        Err(format!("must be a finite number greater than 1, got {value}"))
    }
}

impl RetryArgs {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            initial_delay: Duration::from_secs(self.initial_delay),
            backoff_factor: self.backoff_factor,
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RestreamerArgs {
    /// Restreamer host; egress control is skipped when unset
    #[arg(long, env = "RESTREAMER_IP", requires = "restreamer_command_path")]
    pub restreamer_ip: Option<String>,

    #[arg(long, env = "RESTREAMER_PORT", default_value_t = 8080)]
    pub restreamer_port: u16,

    #[arg(long, env = "RESTREAMER_USER", default_value = "")]
    pub restreamer_user: String,

    #[arg(long, env = "RESTREAMER_PASSWORD", default_value = "", hide_env_values = true)]
    pub restreamer_password: String,

    /// Command endpoint of the YouTube egress process
    #[arg(long, env = "RESTREAMER_API_COMMAND_PATH")]
    pub restreamer_command_path: Option<String>,
}

impl RestreamerArgs {
    pub fn config(&self) -> Option<RestreamerConfig> {
        let (Some(host), Some(command_path)) = (&self.restreamer_ip, &self.restreamer_command_path)
        else {
            return None;
        };
        Some(RestreamerConfig {
            host: host.clone(),
            port: self.restreamer_port,
            username: self.restreamer_user.clone(),
            password: self.restreamer_password.clone(),
            command_path: command_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use std::sync::{Mutex, MutexGuard};

    /// Held by every test that parses `rotate`, so the environment can be
    /// changed without other parses observing it.
    static ENV: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    const BASE: &[&str] = &[
        "broadcast-rotator",
        "rotate",
        "--auth-token-path",
        "/auth",
        "--stream-key",
        "abc123",
        "--stream-title",
        "Harbour Cam",
        "--timezone",
        "Europe/Oslo",
    ];

    fn rotate(extra: &[&str]) -> Result<RotateArgs, clap::Error> {
        let _env = env_lock();
        parse_rotate(extra)
    }

    fn parse_rotate(extra: &[&str]) -> Result<RotateArgs, clap::Error> {
        let args = BASE.iter().chain(extra).copied();
        match Cli::try_parse_from(args)?.command {
            Command::Rotate(args) => Ok(args),
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rotate_defaults() {
        let args = rotate(&[]).unwrap();
        assert_eq!(args.auth.token_path(), PathBuf::from("/auth/token.json"));
        assert_eq!(
            args.auth.client_secrets_path(),
            PathBuf::from("/auth/client_secrets.json")
        );
        assert_eq!(args.youtube_api_base, DEFAULT_API_BASE);
        assert_eq!(args.retry.policy(), RetryPolicy::default());
        assert_eq!(args.restreamer.config(), None);

        let config = args.rotation_config();
        assert_eq!(config.stream_key, "abc123");
        assert_eq!(config.title, "Harbour Cam");
        assert_eq!(config.description, "");
        assert_eq!(config.time_zone.iana_name(), Some("Europe/Oslo"));
        assert_eq!(config.privacy, BroadcastPrivacyStatus::Public);
        assert_eq!(config.scope, BroadcastScope::Active);
        assert!(!config.auto_stop);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_rotate_overrides() {
        let args = rotate(&[
            "--privacy",
            "unlisted",
            "--broadcast-scope",
            "all",
            "--auto-stop",
            "--dry-run",
            "--max-retries",
            "3",
            "--initial-delay",
            "1",
            "--backoff-factor",
            "1.5",
        ])
        .unwrap();

        let config = args.rotation_config();
        assert_eq!(config.privacy, BroadcastPrivacyStatus::Unlisted);
        assert_eq!(config.scope, BroadcastScope::All);
        assert!(config.auto_stop);
        assert!(config.dry_run);

        let policy = args.retry.policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.backoff_factor, 1.5);
    }

    #[test]
    fn test_rejects_zero_retries() {
        assert!(rotate(&["--max-retries", "0"]).is_err());
    }

    #[test]
    fn test_rejects_bad_backoff_factor() {
        for factor in ["1", "0.5", "0", "NaN", "inf", "fast"] {
            assert!(
                rotate(&["--backoff-factor", factor]).is_err(),
                "backoff factor {factor} was accepted"
            );
        }
        let policy = rotate(&["--backoff-factor", "1.1"]).unwrap().retry.policy();
        assert!(policy.base_delay(2) > policy.base_delay(1));
    }

    #[test]
    fn test_boolean_flags_from_environment() {
        let _env = env_lock();
        for (value, expected) in [
            ("False", false),
            ("false", false),
            ("0", false),
            ("no", false),
            ("True", true),
            ("1", true),
            ("yes", true),
        ] {
            // SAFETY: all other parses of these variables hold `ENV`.
            unsafe {
                std::env::set_var("DRY_RUN", value);
                std::env::set_var("AUTO_STOP", value);
            }
            let parsed = parse_rotate(&[]);
            unsafe {
                std::env::remove_var("DRY_RUN");
                std::env::remove_var("AUTO_STOP");
            }

            let config = parsed
                .unwrap_or_else(|e| panic!("{value} rejected: {e}"))
                .rotation_config();
            assert_eq!(config.dry_run, expected, "DRY_RUN={value}");
            assert_eq!(config.auto_stop, expected, "AUTO_STOP={value}");
        }
    }

    #[test]
    fn test_rejects_unknown_time_zone() {
        assert!(rotate(&["--timezone", "Mars/Olympus_Mons"]).is_err());
    }

    #[test]
    fn test_restreamer_needs_command_path() {
        assert!(rotate(&["--restreamer-ip", "10.0.0.5"]).is_err());

        let args = rotate(&[
            "--restreamer-ip",
            "10.0.0.5",
            "--restreamer-user",
            "admin",
            "--restreamer-command-path",
            "/api/v3/process/egress/command",
        ])
        .unwrap();
        assert_eq!(
            args.restreamer.config(),
            Some(RestreamerConfig {
                host: "10.0.0.5".into(),
                port: 8080,
                username: "admin".into(),
                password: String::new(),
                command_path: "/api/v3/process/egress/command".into(),
            })
        );
    }

    #[test]
    fn test_authorize_only_needs_token_dir() {
        let cli =
            Cli::try_parse_from(["broadcast-rotator", "authorize", "--auth-token-path", "/auth"])
                .unwrap();
        let Command::Authorize(auth) = cli.command else {
            panic!("expected authorize");
        };
        assert_eq!(auth.token_path(), PathBuf::from("/auth/token.json"));
    }
}
