// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::heartbeat::deserialize_heartbeat_interval;
use crate::errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};
use tracing::warn;

/// Overall configuration for dutest.
///
/// Most settings are managed through profiles, obtained through the [`profile`](Self::profile)
/// method.
#[derive(Clone, Debug)]
pub struct DutestConfig {
    workspace_root: Utf8PathBuf,
    inner: DutestConfigImpl,
}

impl DutestConfig {
    /// The default location of the config within the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/dutest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Workspace-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the given file, or if not specified from `.config/dutest.toml` in the
    /// workspace root.
    ///
    /// If no config file is specified and the workspace doesn't have `.config/dutest.toml`, uses
    /// the default config options. Unknown keys are reported as warnings.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(workspace_root, config_file, |config_file, unknown| {
            let mut unknown_str = String::new();
            for ignored_key in unknown {
                unknown_str.push_str("\n  - ");
                unknown_str.push_str(ignored_key);
            }
            warn!("ignoring unknown configuration keys in config file {config_file}:{unknown_str}");
        })
    }

    // A custom unknown_callback can be passed in while testing.
    fn from_sources_impl(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        Ok(Self {
            workspace_root,
            inner: deserialized.into_config_impl(),
        })
    }

    /// Returns the default config.
    pub fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");
        let deserialized: DutestConfigDeserialize =
            config.try_deserialize().expect("default config is always valid");

        Self {
            workspace_root: workspace_root.into(),
            inner: deserialized.into_config_impl(),
        }
    }

    /// Returns the profile with the given name, or an error if it isn't defined.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<DutestProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = if name == Self::DEFAULT_PROFILE {
            None
        } else {
            let profile = self.inner.other_profiles.get(name).ok_or_else(|| {
                ProfileNotFound::new(name, self.inner.all_profile_names())
            })?;
            Some(profile)
        };

        Ok(DutestProfile {
            name: name.to_owned(),
            workspace_root: &self.workspace_root,
            default_profile: &self.inner.default_profile,
            custom_profile,
        })
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(DutestConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: DutestConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate reports the key as well; keep only the path from
                // serde_path_to_error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

/// A dutest profile, with defaults filled in from the default profile.
#[derive(Clone, Debug)]
pub struct DutestProfile<'cfg> {
    name: String,
    workspace_root: &'cfg Utf8Path,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl DutestProfile<'_> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns how long to wait for each control message, on top of any per-test budget.
    pub fn message_timeout(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.message_timeout)
            .unwrap_or(self.default_profile.message_timeout)
    }

    /// Returns how often runners are asked to send heartbeats, or `None` to not ask for any.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.custom_profile
            .and_then(|profile| profile.heartbeat_interval)
            .unwrap_or(self.default_profile.heartbeat_interval)
    }

    /// Returns the absolute directory results for this profile are written to.
    pub fn results_dir(&self) -> Utf8PathBuf {
        let results_dir = self
            .custom_profile
            .and_then(|profile| profile.results_dir.as_deref())
            .unwrap_or(&self.default_profile.results_dir);
        self.workspace_root.join(results_dir).join(&self.name)
    }
}

#[derive(Clone, Debug)]
struct DutestConfigImpl {
    default_profile: DefaultProfileImpl,
    other_profiles: HashMap<String, CustomProfileImpl>,
}

impl DutestConfigImpl {
    fn all_profile_names(&self) -> impl Iterator<Item = &str> {
        self.other_profiles
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(DutestConfig::DEFAULT_PROFILE))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DutestConfigDeserialize {
    #[serde(rename = "profile")]
    profiles: HashMap<String, CustomProfileImpl>,
}

impl DutestConfigDeserialize {
    fn into_config_impl(mut self) -> DutestConfigImpl {
        let default_profile = DefaultProfileImpl::new(
            self.profiles
                .remove(DutestConfig::DEFAULT_PROFILE)
                .expect("default profile should exist"),
        );

        DutestConfigImpl {
            default_profile,
            other_profiles: self.profiles,
        }
    }
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    message_timeout: Duration,
    heartbeat_interval: Option<Duration>,
    results_dir: Utf8PathBuf,
}

impl DefaultProfileImpl {
    fn new(profile: CustomProfileImpl) -> Self {
        Self {
            message_timeout: profile
                .message_timeout
                .expect("message-timeout present in default profile"),
            heartbeat_interval: profile
                .heartbeat_interval
                .expect("heartbeat-interval present in default profile"),
            results_dir: profile
                .results_dir
                .expect("results-dir present in default profile"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default, with = "humantime_serde")]
    message_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_heartbeat_interval")]
    heartbeat_interval: Option<Option<Duration>>,
    #[serde(default)]
    results_dir: Option<Utf8PathBuf>,
}
