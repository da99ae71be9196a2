//! Analysis options and argument building.
//!
//! Mirrors the tool's command line: options are only emitted when they
//! differ from the tool's own defaults, `--machineReadable` is always
//! present, and the input file comes last.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::invocation::Invocation;
use crate::parsers::{DatNaming, ExportFormat, ParseOptions};
use crate::supervisor::LaunchError;
use crate::timeline::ExtendedShapes;

/// Default DAT frame rate used by the tool.
pub const DEFAULT_DAT_FRAME_RATE: u32 = 24;
/// Allowed DAT frame rates.
pub const DAT_FRAME_RATE_RANGE: std::ops::RangeInclusive<u32> = 1..=60;
/// Maximum thread count (0 = auto-detect).
pub const MAX_THREADS: u32 = 64;

/// Speech recognizer selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Recognizer {
    /// English-only recognizer (tool default).
    #[default]
    #[serde(rename = "pocketSphinx")]
    PocketSphinx,
    /// Language-independent recognizer.
    #[serde(rename = "phonetic")]
    Phonetic,
}

impl Recognizer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recognizer::PocketSphinx => "pocketSphinx",
            Recognizer::Phonetic => "phonetic",
        }
    }
}

impl fmt::Display for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log level understood by the tool's `--consoleLevel` and `--logLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolLogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl ToolLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolLogLevel::Trace => "trace",
            ToolLogLevel::Debug => "debug",
            ToolLogLevel::Info => "info",
            ToolLogLevel::Warning => "warning",
            ToolLogLevel::Error => "error",
            ToolLogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ToolLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to invoke the analysis tool for one audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    /// Input audio file (WAV or OGG).
    pub input_path: PathBuf,
    /// Output cue file; its extension selects the export format.
    pub output_path: PathBuf,
    pub recognizer: Recognizer,
    pub extended_shapes: ExtendedShapes,
    /// Optional dialog text to guide recognition.
    pub dialog_path: Option<PathBuf>,
    pub dat_frame_rate: u32,
    pub dat_preston_blair: bool,
    /// Suppress the tool's console output.
    pub quiet: bool,
    pub console_level: ToolLogLevel,
    /// Optional diagnostic log written by the tool itself.
    pub log_file: Option<PathBuf>,
    pub log_level: ToolLogLevel,
    /// Worker threads for the tool (0 = auto-detect).
    pub threads: u32,
}

impl AnalysisOptions {
    /// Options with the tool's defaults for the given files.
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            recognizer: Recognizer::default(),
            extended_shapes: ExtendedShapes::default(),
            dialog_path: None,
            dat_frame_rate: DEFAULT_DAT_FRAME_RATE,
            dat_preston_blair: false,
            quiet: false,
            console_level: ToolLogLevel::Error,
            log_file: None,
            log_level: ToolLogLevel::Debug,
            threads: 0,
        }
    }

    /// Export format, derived from the output extension.
    pub fn export_format(&self) -> ExportFormat {
        ExportFormat::from_extension(&self.output_path)
    }

    /// Parse hints matching what the tool will write.
    pub fn parse_options(&self) -> ParseOptions {
        let naming = if self.dat_preston_blair {
            DatNaming::PrestonBlair
        } else {
            DatNaming::Numeric
        };
        ParseOptions::dat(self.dat_frame_rate, naming)
    }

    /// Check option ranges.
    pub fn validate(&self) -> Result<(), LaunchError> {
        if !DAT_FRAME_RATE_RANGE.contains(&self.dat_frame_rate) {
            return Err(LaunchError::invalid_option(
                "datFrameRate",
                format!(
                    "{} is outside {}..={}",
                    self.dat_frame_rate,
                    DAT_FRAME_RATE_RANGE.start(),
                    DAT_FRAME_RATE_RANGE.end()
                ),
            ));
        }
        if self.threads > MAX_THREADS {
            return Err(LaunchError::invalid_option(
                "threads",
                format!("{} exceeds {}", self.threads, MAX_THREADS),
            ));
        }
        if self.input_path.as_os_str().is_empty() {
            return Err(LaunchError::invalid_option("input", "no input audio file"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(LaunchError::invalid_option("output", "no output file"));
        }
        Ok(())
    }

    /// Build the argument list (without the executable).
    pub fn build_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let format = self.export_format();

        if self.recognizer != Recognizer::PocketSphinx {
            args.push("-r".into());
            args.push(self.recognizer.as_str().into());
        }

        if format != ExportFormat::Tsv {
            args.push("-f".into());
            args.push(format.as_str().into());
        }

        if !self.extended_shapes.is_all() {
            args.push("--extendedShapes".into());
            args.push(self.extended_shapes.to_string().into());
        }

        if let Some(ref dialog) = self.dialog_path {
            args.push("-d".into());
            args.push(dialog.into());
        }

        if format == ExportFormat::Dat {
            if self.dat_frame_rate != DEFAULT_DAT_FRAME_RATE {
                args.push("--datFrameRate".into());
                args.push(self.dat_frame_rate.to_string().into());
            }
            if self.dat_preston_blair {
                args.push("--datUsePrestonBlair".into());
            }
        }

        args.push("-o".into());
        args.push(self.output_path.clone().into());

        if self.quiet {
            args.push("--quiet".into());
        }

        args.push("--machineReadable".into());

        if self.console_level != ToolLogLevel::Error {
            args.push("--consoleLevel".into());
            args.push(self.console_level.as_str().into());
        }

        if let Some(ref log_file) = self.log_file {
            args.push("--logFile".into());
            args.push(log_file.into());
        }

        if self.log_level != ToolLogLevel::Debug {
            args.push("--logLevel".into());
            args.push(self.log_level.as_str().into());
        }

        if self.threads > 0 {
            args.push("--threads".into());
            args.push(self.threads.to_string().into());
        }

        // Input must be last
        args.push(self.input_path.clone().into());

        args
    }

    /// Validate and build a complete invocation.
    pub fn to_invocation(&self, executable: impl Into<PathBuf>) -> Result<Invocation, LaunchError> {
        self.validate()?;

        let mut invocation = Invocation::new(executable, self.build_args(), &self.output_path)
            .with_required_input(&self.input_path)
            .with_format(self.export_format())
            .with_parse_options(self.parse_options());

        if let Some(ref dialog) = self.dialog_path {
            invocation = invocation.with_required_input(dialog);
        }

        Ok(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_as_strings(options: &AnalysisOptions) -> Vec<String> {
        options
            .build_args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn defaults_emit_minimal_arguments() {
        let options = AnalysisOptions::new("in.wav", "out.tsv");
        assert_eq!(
            args_as_strings(&options),
            vec!["-o", "out.tsv", "--machineReadable", "in.wav"]
        );
    }

    #[test]
    fn non_default_options_are_emitted_in_order() {
        let mut options = AnalysisOptions::new("in.wav", "out.dat");
        options.recognizer = Recognizer::Phonetic;
        options.extended_shapes = ExtendedShapes::parse("X").unwrap();
        options.dialog_path = Some("dialog.txt".into());
        options.dat_frame_rate = 30;
        options.dat_preston_blair = true;
        options.quiet = true;
        options.console_level = ToolLogLevel::Info;
        options.log_file = Some("tool.log".into());
        options.log_level = ToolLogLevel::Warning;
        options.threads = 4;

        assert_eq!(
            args_as_strings(&options),
            vec![
                "-r",
                "phonetic",
                "-f",
                "dat",
                "--extendedShapes",
                "X",
                "-d",
                "dialog.txt",
                "--datFrameRate",
                "30",
                "--datUsePrestonBlair",
                "-o",
                "out.dat",
                "--quiet",
                "--machineReadable",
                "--consoleLevel",
                "info",
                "--logFile",
                "tool.log",
                "--logLevel",
                "warning",
                "--threads",
                "4",
                "in.wav",
            ]
        );
    }

    #[test]
    fn dat_options_ignored_for_other_formats() {
        let mut options = AnalysisOptions::new("in.wav", "out.json");
        options.dat_frame_rate = 30;
        options.dat_preston_blair = true;
        let args = args_as_strings(&options);
        assert!(args.contains(&"json".to_string()));
        assert!(!args.contains(&"--datFrameRate".to_string()));
        assert!(!args.contains(&"--datUsePrestonBlair".to_string()));
    }

    #[test]
    fn empty_extended_shapes_are_passed_explicitly() {
        let mut options = AnalysisOptions::new("in.wav", "out.txt");
        options.extended_shapes = ExtendedShapes::none();
        let args = args_as_strings(&options);
        let idx = args.iter().position(|a| a == "--extendedShapes").unwrap();
        assert_eq!(args[idx + 1], "");
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut options = AnalysisOptions::new("in.wav", "out.dat");
        options.dat_frame_rate = 0;
        assert!(matches!(
            options.validate(),
            Err(LaunchError::InvalidOption { .. })
        ));

        let mut options = AnalysisOptions::new("in.wav", "out.dat");
        options.threads = 65;
        assert!(options.validate().is_err());
    }

    #[test]
    fn invocation_carries_parse_hints() {
        let mut options = AnalysisOptions::new("in.wav", "out.dat");
        options.dat_frame_rate = 12;
        options.dat_preston_blair = true;

        let invocation = options.to_invocation("/opt/rhubarb/rhubarb").unwrap();
        assert_eq!(invocation.format(), ExportFormat::Dat);
        assert_eq!(invocation.parse_options().dat_frame_rate, Some(12.0));
        assert_eq!(invocation.parse_options().dat_naming, DatNaming::PrestonBlair);
        assert_eq!(invocation.required_inputs(), &[PathBuf::from("in.wav")]);
    }
}
