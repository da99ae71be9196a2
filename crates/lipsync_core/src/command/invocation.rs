//! A fully specified tool invocation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::parsers::{ExportFormat, ParseOptions};

/// Executable, arguments and the files the run depends on.
///
/// Self-contained: everything the supervisor and the parser need is
/// carried here rather than read from shared settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    executable: PathBuf,
    args: Vec<OsString>,
    output_path: PathBuf,
    required_inputs: Vec<PathBuf>,
    format: ExportFormat,
    parse_options: ParseOptions,
}

impl Invocation {
    /// Create an invocation for an arbitrary argument list.
    ///
    /// The export format defaults to the one implied by the output
    /// extension.
    pub fn new(
        executable: impl Into<PathBuf>,
        args: Vec<OsString>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        let output_path = output_path.into();
        Self {
            executable: executable.into(),
            args,
            format: ExportFormat::from_extension(&output_path),
            output_path,
            required_inputs: Vec::new(),
            parse_options: ParseOptions::default(),
        }
    }

    /// Add a file that must exist before the tool is started.
    pub fn with_required_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.required_inputs.push(path.into());
        self
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn required_inputs(&self) -> &[PathBuf] {
        &self.required_inputs
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    pub fn parse_options(&self) -> &ParseOptions {
        &self.parse_options
    }

    /// One-line command preview using the executable's file name.
    pub fn preview(&self) -> String {
        let program = self
            .executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.executable.display().to_string());

        std::iter::once(program)
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Full command line for logs, with the complete executable path.
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.display().to_string())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Platform-specific location of the bundled tool under `base_dir`.
pub fn default_executable_path(base_dir: impl AsRef<Path>) -> PathBuf {
    let base_dir = base_dir.as_ref();
    if cfg!(target_os = "windows") {
        base_dir.join("rhubarb_win").join("rhubarb.exe")
    } else if cfg!(target_os = "macos") {
        base_dir.join("rhubarb_mac").join("rhubarb")
    } else if cfg!(target_os = "linux") {
        base_dir.join("rhubarb_linux").join("rhubarb")
    } else {
        base_dir.join("rhubarb_win").join("rhubarb.exe")
    }
}
