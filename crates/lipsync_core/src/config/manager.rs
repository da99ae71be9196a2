//! Config manager for loading, saving, and atomic updates.
//!
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only the modified table is rewritten)
//! - Defaults filled in and unknown sections dropped on load

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};
use crate::command::default_executable_path;

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Loads, holds and persists the application [`Settings`].
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for the given file. Call `load()` or
    /// `load_or_create()` before reading settings.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable settings. Changes stay in memory until `save()` or
    /// `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file. Errors if the file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        Ok(())
    }

    /// Load config from file, creating it with defaults if missing.
    ///
    /// An existing file missing keys or carrying unknown sections is
    /// rewritten in canonical form.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = parse_and_clean(&content)?;
            self.settings = settings;

            if was_modified {
                tracing::debug!("Normalizing config file {}", self.config_path.display());
                self.save()?;
            }
        } else {
            tracing::info!("Creating default config at {}", self.config_path.display());
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Create the logs folder if it is configured and missing.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        if let Some(dir) = self.logs_folder() {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    /// Logs folder, if run logs are enabled.
    pub fn logs_folder(&self) -> Option<PathBuf> {
        let folder = &self.settings.paths.logs_folder;
        (!folder.is_empty()).then(|| PathBuf::from(folder))
    }

    /// Configured tool executable, or the bundled path under `base_dir`.
    pub fn executable_path(&self, base_dir: impl AsRef<Path>) -> PathBuf {
        let configured = &self.settings.paths.rhubarb_path;
        if configured.is_empty() {
            default_executable_path(base_dir)
        } else {
            PathBuf::from(configured)
        }
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Rewrite one section atomically.
    ///
    /// Re-reads the file from disk so other sections keep their on-disk
    /// content (including comments).
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = self.section_toml(section)?.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let content = match section {
            ConfigSection::Paths => toml::to_string_pretty(&self.settings.paths)?,
            ConfigSection::Analysis => toml::to_string_pretty(&self.settings.analysis)?,
            ConfigSection::Supervisor => toml::to_string_pretty(&self.settings.supervisor)?,
            ConfigSection::Preview => toml::to_string_pretty(&self.settings.preview)?,
            ConfigSection::Logging => toml::to_string_pretty(&self.settings.logging)?,
        };
        Ok(content)
    }

    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();

        output.push_str("# Lip-sync preview configuration\n");
        output.push_str(
            "# This file is auto-generated. Comments may be preserved on section updates.\n",
        );

        for section in ConfigSection::ALL {
            output.push('\n');
            output.push_str(&format!("# {}\n", section.description()));
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in self.section_toml(section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
        }

        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Temp file in the same directory so the rename stays on one filesystem
        let temp_path = self.config_path.with_extension("toml.tmp");

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }
}

/// Parse settings and report whether the file differs from canonical form.
fn parse_and_clean(content: &str) -> ConfigResult<(Settings, bool)> {
    let doc: DocumentMut = content.parse()?;
    let settings: Settings = toml::from_str(content)?;

    let has_unknown = doc
        .iter()
        .any(|(key, _)| !ConfigSection::ALL.iter().any(|s| s.table_name() == key));

    let missing_keys = ConfigSection::ALL.iter().any(|section| {
        let expected = match section_keys(&settings, *section) {
            Some(keys) => keys,
            None => return false,
        };
        match doc.get(section.table_name()).and_then(Item::as_table) {
            Some(table) => expected.iter().any(|k| !table.contains_key(k)),
            None => true,
        }
    });

    Ok((settings, has_unknown || missing_keys))
}

/// Keys a fully written section would contain.
fn section_keys(settings: &Settings, section: ConfigSection) -> Option<Vec<String>> {
    let value = match section {
        ConfigSection::Paths => toml::Value::try_from(&settings.paths),
        ConfigSection::Analysis => toml::Value::try_from(&settings.analysis),
        ConfigSection::Supervisor => toml::Value::try_from(&settings.supervisor),
        ConfigSection::Preview => toml::Value::try_from(&settings.preview),
        ConfigSection::Logging => toml::Value::try_from(&settings.logging),
    }
    .ok()?;

    value
        .as_table()
        .map(|table| table.keys().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Recognizer;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(".config").join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[paths]"));
        assert!(content.contains("[supervisor]"));
        assert!(content.contains("[logging]"));

        // Generated file loads back cleanly
        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.settings().preview.tick_interval_ms, 16);
    }

    #[test]
    fn load_or_create_preserves_existing_and_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        fs::write(
            &config_path,
            "[paths]\nrhubarb_path = \"/opt/rhubarb/rhubarb\"\n\n[obsolete]\nkey = 1\n",
        )
        .unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(
            manager.executable_path("/unused"),
            PathBuf::from("/opt/rhubarb/rhubarb")
        );

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(!content.contains("[obsolete]"));
        assert!(content.contains("logs_folder"));
        assert!(content.contains("rhubarb_path = \"/opt/rhubarb/rhubarb\""));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("absent.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn update_section_only_changes_target() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        manager.settings_mut().analysis.recognizer = Recognizer::Phonetic;
        manager.settings_mut().logging.compact = false;
        manager.update_section(ConfigSection::Analysis).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("recognizer = \"phonetic\""));
        // Logging was changed in memory only
        assert!(content.contains("compact = true"));
        assert!(content.contains("# Tool location"));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(!config_path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn empty_logs_folder_disables_run_logs() {
        let mut manager = ConfigManager::new("unused.toml");
        assert_eq!(manager.logs_folder(), Some(PathBuf::from(".logs")));
        manager.settings_mut().paths.logs_folder.clear();
        assert!(manager.logs_folder().is_none());
    }
}
