mod file_config;

pub use file_config::{
    BackgroundJobsConfig, FileConfig, MailConfig, ModMailJobConfig, SpamSweepJobConfig,
    SteamConfig,
};

use crate::steam::STEAM_API_BASE;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub steam_api_key: Option<String>,
    pub mail_relay_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub background_jobs: BackgroundJobsSettings,
    pub steam: SteamSettings,
    pub mail: MailSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let bg_jobs_file = file.background_jobs.unwrap_or_default();

        let mm_file = bg_jobs_file.daily_mod_mail.unwrap_or_default();
        let mm_defaults = ModMailJobSettings::default();
        let daily_mod_mail = ModMailJobSettings {
            interval_hours: mm_file.interval_hours.unwrap_or(mm_defaults.interval_hours),
        };

        let ss_file = bg_jobs_file.spam_sweep.unwrap_or_default();
        let ss_defaults = SpamSweepJobSettings::default();
        let spam_sweep = SpamSweepJobSettings {
            interval_hours: ss_file.interval_hours.unwrap_or(ss_defaults.interval_hours),
            spam_avatar_hashes: ss_file
                .spam_avatar_hashes
                .unwrap_or(ss_defaults.spam_avatar_hashes),
        };

        let request_poll_secs = bg_jobs_file
            .request_poll_secs
            .unwrap_or(BackgroundJobsSettings::default().request_poll_secs);
        if request_poll_secs == 0 {
            bail!("background_jobs.request_poll_secs must be greater than 0");
        }
        if daily_mod_mail.interval_hours == 0 {
            bail!("background_jobs.daily_mod_mail.interval_hours must be greater than 0");
        }
        if spam_sweep.interval_hours == 0 {
            bail!("background_jobs.spam_sweep.interval_hours must be greater than 0");
        }

        let steam_file = file.steam.unwrap_or_default();
        let steam_defaults = SteamSettings::default();
        let steam = SteamSettings {
            api_key: steam_file.api_key.or_else(|| cli.steam_api_key.clone()),
            base_url: steam_file.base_url.unwrap_or(steam_defaults.base_url),
            timeout_secs: steam_file
                .timeout_secs
                .unwrap_or(steam_defaults.timeout_secs),
        };

        let mail_file = file.mail.unwrap_or_default();
        let mail = MailSettings {
            relay_url: mail_file.relay_url.or_else(|| cli.mail_relay_url.clone()),
            timeout_secs: mail_file
                .timeout_secs
                .unwrap_or(MailSettings::default().timeout_secs),
        };

        Ok(Self {
            db_dir,
            background_jobs: BackgroundJobsSettings {
                request_poll_secs,
                daily_mod_mail,
                spam_sweep,
            },
            steam,
            mail,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("user.db")
    }

    pub fn server_db_path(&self) -> PathBuf {
        self.db_dir.join("server.db")
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundJobsSettings {
    pub request_poll_secs: u64,
    pub daily_mod_mail: ModMailJobSettings,
    pub spam_sweep: SpamSweepJobSettings,
}

impl Default for BackgroundJobsSettings {
    fn default() -> Self {
        Self {
            request_poll_secs: 5,
            daily_mod_mail: ModMailJobSettings::default(),
            spam_sweep: SpamSweepJobSettings::default(),
        }
    }
}

/// Settings for the daily moderator mail job
#[derive(Debug, Clone)]
pub struct ModMailJobSettings {
    pub interval_hours: u64,
}

impl Default for ModMailJobSettings {
    fn default() -> Self {
        Self { interval_hours: 24 }
    }
}

/// Settings for the spam sweep job
#[derive(Debug, Clone)]
pub struct SpamSweepJobSettings {
    pub interval_hours: u64,
    pub spam_avatar_hashes: Vec<String>,
}

impl Default for SpamSweepJobSettings {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            spam_avatar_hashes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SteamSettings {
    /// Library sync is unavailable without a key.
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SteamSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: STEAM_API_BASE.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    /// The daily mod mail job is not registered when unset.
    pub relay_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            relay_url: None,
            timeout_secs: 30,
        }
    }
}
