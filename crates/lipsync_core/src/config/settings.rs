//! Settings struct with TOML-based sections.
//!
//! Each section maps to a TOML table and can be updated independently.
//! Settings are only read at the edges: the values a run needs are copied
//! into [`AnalysisOptions`] and [`SupervisorConfig`] before it starts.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{AnalysisOptions, Recognizer, ToolLogLevel, DEFAULT_DAT_FRAME_RATE};
use crate::logging::{LogConfig, LogLevel};
use crate::supervisor::{RecordStream, SupervisorConfig};
use crate::timeline::ExtendedShapes;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub analysis: AnalysisSettings,

    #[serde(default)]
    pub supervisor: SupervisorSettings,

    #[serde(default)]
    pub preview: PreviewSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Analysis options for one input/output pair using the configured defaults.
    pub fn analysis_options(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> AnalysisOptions {
        let mut options = AnalysisOptions::new(input, output);
        self.analysis.apply_to(&mut options);
        options
    }

    /// Supervisor configuration, with run logs written under the logs folder.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let log_dir = if self.paths.logs_folder.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.paths.logs_folder))
        };

        SupervisorConfig {
            record_stream: self.supervisor.record_stream,
            progress_interval: Duration::from_millis(self.supervisor.progress_interval_ms),
            log_dir,
            log_config: self.logging.to_log_config(),
        }
    }
}

/// Tool location, log folder and recently used files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Rhubarb executable. Empty selects the bundled per-platform path.
    #[serde(default)]
    pub rhubarb_path: String,

    /// Folder for per-run log files. Empty disables run log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    #[serde(default)]
    pub last_input_path: String,

    #[serde(default)]
    pub last_output_path: String,
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            rhubarb_path: String::new(),
            logs_folder: default_logs_folder(),
            last_input_path: String::new(),
            last_output_path: String::new(),
        }
    }
}

/// Default analysis options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default)]
    pub recognizer: Recognizer,

    /// Extended mouth shapes to use, e.g. "GHX".
    #[serde(default)]
    pub extended_shapes: ExtendedShapes,

    #[serde(default = "default_dat_frame_rate")]
    pub dat_frame_rate: u32,

    #[serde(default)]
    pub dat_preston_blair: bool,

    #[serde(default = "default_console_level")]
    pub console_level: ToolLogLevel,

    #[serde(default = "default_tool_log_level")]
    pub log_level: ToolLogLevel,

    /// Tool worker threads (0 = auto-detect).
    #[serde(default)]
    pub threads: u32,
}

fn default_dat_frame_rate() -> u32 {
    DEFAULT_DAT_FRAME_RATE
}

fn default_console_level() -> ToolLogLevel {
    ToolLogLevel::Error
}

fn default_tool_log_level() -> ToolLogLevel {
    ToolLogLevel::Debug
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            recognizer: Recognizer::default(),
            extended_shapes: ExtendedShapes::default(),
            dat_frame_rate: default_dat_frame_rate(),
            dat_preston_blair: false,
            console_level: default_console_level(),
            log_level: default_tool_log_level(),
            threads: 0,
        }
    }
}

impl AnalysisSettings {
    /// Copy these defaults into `options`, leaving the file paths untouched.
    pub fn apply_to(&self, options: &mut AnalysisOptions) {
        options.recognizer = self.recognizer;
        options.extended_shapes = self.extended_shapes.clone();
        options.dat_frame_rate = self.dat_frame_rate;
        options.dat_preston_blair = self.dat_preston_blair;
        options.console_level = self.console_level;
        options.log_level = self.log_level;
        options.threads = self.threads;
    }
}

/// Process supervision settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Stream carrying the machine-readable records.
    #[serde(default)]
    pub record_stream: RecordStream,

    /// Minimum interval between progress notifications.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_progress_interval_ms() -> u64 {
    50
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            record_stream: RecordStream::default(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

/// Preview playback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSettings {
    /// How often the player position is polled.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    16
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl PreviewSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Number of tool output lines kept for failure reports.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,
}

fn default_true() -> bool {
    true
}

fn default_progress_step() -> u32 {
    20
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            progress_step: default_progress_step(),
            error_tail: default_error_tail(),
        }
    }
}

impl LoggingSettings {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            progress_step: self.progress_step,
            tail_lines: self.error_tail as usize,
            ..LogConfig::default()
        }
    }
}

/// Configuration sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Analysis,
    Supervisor,
    Preview,
    Logging,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::Paths,
        ConfigSection::Analysis,
        ConfigSection::Supervisor,
        ConfigSection::Preview,
        ConfigSection::Logging,
    ];

    /// TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Analysis => "analysis",
            ConfigSection::Supervisor => "supervisor",
            ConfigSection::Preview => "preview",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the table in a generated file.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Tool location, log folder and recent files",
            ConfigSection::Analysis => "Default analysis options",
            ConfigSection::Supervisor => "Process supervision",
            ConfigSection::Preview => "Preview playback",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}
