use crate::{
    identity::DEFAULT_IDENTITY_PROVIDER_URL,
    wager::DEFAULT_BET,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    io::ErrorKind,
    path::{
        Path,
        PathBuf,
    },
};
use tracing::info;

const CONFIG_DIR_NAME: &str = ".coin-flip";
const SETTINGS_FILE: &str = "settings.json";
const LOG_DIR_NAME: &str = "logs";

/// Values remembered between runs. Every field is optional so a partial file
/// still loads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ledger_url: Option<String>,
    pub identity_provider_url: Option<String>,
    pub default_bet: Option<u64>,
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(Settings::default());
            }
            Err(err) => {
                return Err(err).wrap_err_with(|| {
                    format!("Failed to read settings at {}", self.path.display())
                });
            }
        };
        serde_json::from_slice(&data).wrap_err_with(|| {
            format!("Failed to parse settings at {}", self.path.display())
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let data = serde_json::to_vec_pretty(settings)
            .wrap_err("Failed to serialize settings")?;
        fs::write(&self.path, data).wrap_err_with(|| {
            format!("Failed to write settings to {}", self.path.display())
        })
    }
}

pub fn default_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(CONFIG_DIR_NAME))
}

pub fn resolve_config_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_config_dir(),
    }
}

/// Flags given on the command line. `None` means "not given".
#[derive(Clone, Debug, Default)]
pub struct CliArgs {
    pub ledger_url: Option<String>,
    pub identity_url: Option<String>,
    pub config_dir: Option<String>,
    pub bet: Option<u64>,
    pub log_dir: Option<String>,
    pub no_log: bool,
    pub save: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub ledger_url: String,
    pub identity_provider_url: String,
    pub initial_bet: u64,
    pub config_dir: PathBuf,
    /// `None` disables file logging.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Merges the command line over `settings.json` in the config directory.
    /// With `--save` the merged values are written back.
    pub fn resolve(args: CliArgs) -> Result<Self> {
        let config_dir = resolve_config_dir(args.config_dir.as_deref())?;
        let store = SettingsStore::new(&config_dir);
        let saved = store.load()?;
        let merged = merge(saved, &args);

        let ledger_url = merged.ledger_url.clone().ok_or_else(|| {
            eyre!("Specify --ledger-url <url> (add --save to remember it)")
        })?;

        if args.save {
            store.save(&merged)?;
            info!(path = %store.path().display(), "saved settings");
        }

        let log_dir = if args.no_log {
            None
        } else {
            Some(match args.log_dir.as_deref() {
                Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
                None => config_dir.join(LOG_DIR_NAME),
            })
        };

        Ok(Self {
            ledger_url,
            identity_provider_url: merged
                .identity_provider_url
                .unwrap_or_else(|| DEFAULT_IDENTITY_PROVIDER_URL.to_string()),
            initial_bet: merged.default_bet.unwrap_or(DEFAULT_BET),
            config_dir,
            log_dir,
        })
    }
}

fn merge(saved: Settings, args: &CliArgs) -> Settings {
    Settings {
        ledger_url: args.ledger_url.clone().or(saved.ledger_url),
        identity_provider_url: args.identity_url.clone().or(saved.identity_provider_url),
        default_bet: args.bet.or(saved.default_bet),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempfile::tempdir;

    fn args_in(dir: &Path) -> CliArgs {
        CliArgs {
            config_dir: Some(dir.display().to_string()),
            ..CliArgs::default()
        }
    }

    #[test]
    fn load__missing_file__returns_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path());

        assert_eq!(Settings::default(), store.load().unwrap());
    }

    #[test]
    fn load__partial_file__fills_missing_fields() {
        // given
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "ledger_url": "http://localhost:4943" }"#,
        )
        .unwrap();

        // when
        let settings = SettingsStore::new(dir.path()).load().unwrap();

        // then
        assert_eq!(Some("http://localhost:4943".to_string()), settings.ledger_url);
        assert_eq!(None, settings.default_bet);
    }

    #[test]
    fn load__malformed_file__reports_path() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "not json").unwrap();

        let err = SettingsStore::new(dir.path()).load().unwrap_err();

        assert!(err.to_string().contains(SETTINGS_FILE));
    }

    #[test]
    fn resolve__no_ledger_url_anywhere__fails() {
        let dir = tempdir().unwrap();

        let result = AppConfig::resolve(args_in(dir.path()));

        assert!(result.is_err());
    }

    #[test]
    fn resolve__only_ledger_url__uses_defaults() {
        // given
        let dir = tempdir().unwrap();
        let args = CliArgs {
            ledger_url: Some("http://localhost:4943".to_string()),
            ..args_in(dir.path())
        };

        // when
        let config = AppConfig::resolve(args).unwrap();

        // then
        assert_eq!(DEFAULT_IDENTITY_PROVIDER_URL, config.identity_provider_url);
        assert_eq!(DEFAULT_BET, config.initial_bet);
        assert_eq!(Some(dir.path().join(LOG_DIR_NAME)), config.log_dir);
    }

    #[test]
    fn resolve__flags_override_saved_settings() {
        // given
        let dir = tempdir().unwrap();
        SettingsStore::new(dir.path())
            .save(&Settings {
                ledger_url: Some("http://saved".to_string()),
                identity_provider_url: Some("http://saved-idp".to_string()),
                default_bet: Some(25),
            })
            .unwrap();
        let args = CliArgs {
            ledger_url: Some("http://flag".to_string()),
            ..args_in(dir.path())
        };

        // when
        let config = AppConfig::resolve(args).unwrap();

        // then
        assert_eq!("http://flag", config.ledger_url);
        assert_eq!("http://saved-idp", config.identity_provider_url);
        assert_eq!(25, config.initial_bet);
    }

    #[test]
    fn resolve__save_flag__persists_merged_settings() {
        // given
        let dir = tempdir().unwrap();
        let args = CliArgs {
            ledger_url: Some("http://flag".to_string()),
            bet: Some(5),
            save: true,
            ..args_in(dir.path())
        };

        // when
        AppConfig::resolve(args).unwrap();

        // then
        let saved = SettingsStore::new(dir.path()).load().unwrap();
        assert_eq!(
            Settings {
                ledger_url: Some("http://flag".to_string()),
                identity_provider_url: None,
                default_bet: Some(5),
            },
            saved
        );
    }

    #[test]
    fn resolve__without_save_flag__leaves_disk_alone() {
        let dir = tempdir().unwrap();
        let args = CliArgs {
            ledger_url: Some("http://flag".to_string()),
            ..args_in(dir.path())
        };

        AppConfig::resolve(args).unwrap();

        assert!(!dir.path().join(SETTINGS_FILE).exists());
    }

    #[test]
    fn resolve__no_log__disables_log_dir() {
        let dir = tempdir().unwrap();
        let args = CliArgs {
            ledger_url: Some("http://flag".to_string()),
            no_log: true,
            ..args_in(dir.path())
        };

        let config = AppConfig::resolve(args).unwrap();

        assert_eq!(None, config.log_dir);
    }

    #[test]
    fn resolve_config_dir__explicit_path__is_used_verbatim() {
        let dir = resolve_config_dir(Some("/tmp/coin-flip-test")).unwrap();

        assert_eq!(PathBuf::from("/tmp/coin-flip-test"), dir);
    }
}
