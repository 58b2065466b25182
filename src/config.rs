// System
use std::{env, path::PathBuf};

// Third Party
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client,
};
use serde::Deserialize;
use tracing::info;
use url::Url;

// Local
use crate::error::Error;

/// Names the optional settings file read before the environment.
pub const CONFIG_FILE_ENV: &str = "NOTIFIER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "notifier.toml";

/// Settings exactly as they come out of the file and environment layers, before validation.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    kubeconfig: Option<String>,
    slack_webhook: Option<String>,
}

/// Process-wide configuration. Built once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub kubeconfig: Option<PathBuf>,
    pub webhook_url: Url,
}

impl Settings {
    /// Reads `KUBECONFIG` and `SLACK_WEBHOOK`, with the environment taking precedence over
    /// the optional TOML file named by `NOTIFIER_CONFIG`.
    pub fn from_env() -> Result<Self, Error> {
        let file = env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let raw: RawSettings = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;
        Self::try_from(raw)
    }

    /// The kubeconfig to load: the explicit one if given, else `$HOME/.kube/config`.
    pub fn kubeconfig_path(&self) -> Result<PathBuf, Error> {
        match &self.kubeconfig {
            Some(path) => Ok(path.clone()),
            None => home::home_dir()
                .map(|home| home.join(".kube").join("config"))
                .ok_or(Error::NoHomeDirectory),
        }
    }

    /// Builds the cluster client from the resolved kubeconfig. There is no in-cluster fallback.
    pub async fn kube_client(&self) -> Result<Client, Error> {
        let path = self.kubeconfig_path()?;
        let kubeconfig = Kubeconfig::read_from(&path)?;
        let config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        info!("Using kubeconfig: {}", path.display());
        Ok(Client::try_from(config)?)
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = Error;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let webhook = raw
            .slack_webhook
            .filter(|url| !url.trim().is_empty())
            .ok_or(Error::MissingWebhookUrl)?;
        let webhook_url = Url::parse(webhook.trim())?;
        let kubeconfig = raw
            .kubeconfig
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        Ok(Settings {
            kubeconfig,
            webhook_url,
        })
    }
}

#[cfg(test)]
mod tests {
    // System
    use std::{env, fs, path::PathBuf};

    // Third Party
    use serial_test::serial;

    // Local
    use super::{RawSettings, Settings, CONFIG_FILE_ENV};
    use crate::error::Error;

    const MISSING_FILE: &str = "/nonexistent/namespace-notifier/settings";

    fn clear_env() {
        env::remove_var("KUBECONFIG");
        env::remove_var("SLACK_WEBHOOK");
        env::set_var(CONFIG_FILE_ENV, MISSING_FILE);
    }

    #[test]
    #[serial]
    fn missing_webhook_is_rejected() {
        clear_env();
        let result = Settings::from_env();
        assert!(matches!(result, Err(Error::MissingWebhookUrl)));
    }

    #[test]
    #[serial]
    fn empty_webhook_is_rejected() {
        clear_env();
        env::set_var("SLACK_WEBHOOK", "");
        let result = Settings::from_env();
        assert!(matches!(result, Err(Error::MissingWebhookUrl)));
        env::remove_var("SLACK_WEBHOOK");
    }

    #[test]
    #[serial]
    fn malformed_webhook_is_rejected() {
        clear_env();
        env::set_var("SLACK_WEBHOOK", "not a url");
        let result = Settings::from_env();
        assert!(matches!(result, Err(Error::InvalidWebhookUrl(_))));
        env::remove_var("SLACK_WEBHOOK");
    }

    #[test]
    #[serial]
    fn reads_webhook_and_kubeconfig_from_env() {
        clear_env();
        env::set_var("SLACK_WEBHOOK", "https://hooks.example.com/services/T0/B0/x");
        env::set_var("KUBECONFIG", "/etc/notifier/kubeconfig");
        let settings = Settings::from_env().unwrap();
        assert_eq!(
            settings.webhook_url.as_str(),
            "https://hooks.example.com/services/T0/B0/x"
        );
        assert_eq!(
            settings.kubeconfig_path().unwrap(),
            PathBuf::from("/etc/notifier/kubeconfig")
        );
        env::remove_var("SLACK_WEBHOOK");
        env::remove_var("KUBECONFIG");
    }

    #[test]
    #[serial]
    fn env_overrides_settings_file() {
        clear_env();
        let dir = env::temp_dir().join("namespace-notifier-config-test");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("notifier.toml");
        fs::write(
            &file,
            "slack_webhook = \"https://file.example.com/hook\"\nkubeconfig = \"/from/file\"\n",
        )
        .unwrap();
        env::set_var(CONFIG_FILE_ENV, file.to_str().unwrap());

        let from_file = Settings::from_env().unwrap();
        assert_eq!(from_file.webhook_url.as_str(), "https://file.example.com/hook");
        assert_eq!(from_file.kubeconfig, Some(PathBuf::from("/from/file")));

        env::set_var("SLACK_WEBHOOK", "https://env.example.com/hook");
        let from_env = Settings::from_env().unwrap();
        assert_eq!(from_env.webhook_url.as_str(), "https://env.example.com/hook");

        env::remove_var("SLACK_WEBHOOK");
        fs::remove_dir_all(&dir).unwrap();
        clear_env();
    }

    #[test]
    fn empty_kubeconfig_falls_back_to_home() {
        let settings = Settings::try_from(RawSettings {
            kubeconfig: Some(String::new()),
            slack_webhook: Some("http://localhost:8080/hook".to_string()),
        })
        .unwrap();
        assert_eq!(settings.kubeconfig, None);
        if let Some(home) = home::home_dir() {
            assert_eq!(
                settings.kubeconfig_path().unwrap(),
                home.join(".kube").join("config")
            );
        }
    }

    #[tokio::test]
    async fn unreadable_kubeconfig_is_fatal() {
        let settings = Settings {
            kubeconfig: Some(PathBuf::from(MISSING_FILE)),
            webhook_url: "http://localhost:8080/hook".parse().unwrap(),
        };
        let result = settings.kube_client().await;
        assert!(matches!(result, Err(Error::Kubeconfig(_))));
    }
}
