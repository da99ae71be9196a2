//! Lip-sync previewer - terminal entry point
//!
//! Handles:
//! - Configuration loading
//! - Application-level logging initialization
//! - Running the analysis tool and previewing the resulting cues

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use lipsync_core::command::{AnalysisOptions, Recognizer};
use lipsync_core::config::{ConfigManager, ConfigSection};
use lipsync_core::logging::{init_tracing_with_file, LogLevel};
use lipsync_core::parsers::{DatNaming, ParseOptions};
use lipsync_core::playback::{AudioPlayer, ClockPlayer, PlaybackState};
use lipsync_core::session::{Session, SessionEvent};
use lipsync_core::supervisor::{Supervisor, ToolLog};
use lipsync_core::timeline::{ExtendedShapes, Timeline};

/// Default config path: .config/settings.toml (relative to current working directory)
fn default_config_path() -> PathBuf {
    PathBuf::from(".config").join("settings.toml")
}

#[derive(Parser, Debug)]
#[command(name = "lipsync-preview", version, about = "Run lip-sync analysis and preview mouth cues")]
struct Cli {
    /// Settings file [default: .config/settings.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show tool log lines and debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an audio file and optionally preview the result
    Run {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Play back the cues once the analysis succeeds
        #[arg(long)]
        preview: bool,

        /// Preview speed multiplier
        #[arg(long, default_value_t = 1.0)]
        rate: f64,
    },
    /// Preview an existing cue file
    Preview {
        /// Cue file (tsv, xml, json or dat)
        cue_file: PathBuf,

        /// Preview speed multiplier
        #[arg(long, default_value_t = 1.0)]
        rate: f64,

        /// Frame rate for DAT files that do not declare one
        #[arg(long)]
        dat_frame_rate: Option<u32>,

        /// DAT file uses Preston-Blair shape names
        #[arg(long)]
        preston_blair: bool,
    },
    /// Print the tool command line without running it
    Command {
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

#[derive(Args, Debug)]
struct AnalysisArgs {
    /// Input audio file (WAV or OGG)
    input: PathBuf,

    /// Output cue file; the extension selects the format
    output: PathBuf,

    #[arg(short, long, value_enum)]
    recognizer: Option<RecognizerArg>,

    /// Extended shapes to use, e.g. "GHX" (empty for none)
    #[arg(long)]
    extended_shapes: Option<String>,

    /// Dialog text file to guide recognition
    #[arg(short, long)]
    dialog: Option<PathBuf>,

    #[arg(long)]
    dat_frame_rate: Option<u32>,

    /// Use Preston-Blair shape names in DAT output
    #[arg(long)]
    preston_blair: bool,

    /// Tool worker threads (0 = auto-detect)
    #[arg(long)]
    threads: Option<u32>,

    /// Let the tool write its own diagnostic log here
    #[arg(long)]
    tool_log: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RecognizerArg {
    PocketSphinx,
    Phonetic,
}

impl From<RecognizerArg> for Recognizer {
    fn from(arg: RecognizerArg) -> Self {
        match arg {
            RecognizerArg::PocketSphinx => Recognizer::PocketSphinx,
            RecognizerArg::Phonetic => Recognizer::Phonetic,
        }
    }
}

impl AnalysisArgs {
    /// Configured defaults overridden by whatever was given on the command line.
    fn to_options(&self, config: &ConfigManager) -> Result<AnalysisOptions> {
        let mut options = config
            .settings()
            .analysis_options(&self.input, &self.output);

        if let Some(recognizer) = self.recognizer {
            options.recognizer = recognizer.into();
        }
        if let Some(shapes) = &self.extended_shapes {
            options.extended_shapes = ExtendedShapes::parse(shapes)
                .with_context(|| format!("Invalid --extended-shapes '{}'", shapes))?;
        }
        if let Some(rate) = self.dat_frame_rate {
            options.dat_frame_rate = rate;
        }
        if self.preston_blair {
            options.dat_preston_blair = true;
        }
        if let Some(threads) = self.threads {
            options.threads = threads;
        }
        options.dialog_path = self.dialog.clone();
        options.log_file = self.tool_log.clone();

        Ok(options)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for the log level and logs folder)
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config_manager = ConfigManager::new(&config_path);
    if let Err(e) = config_manager.load_or_create() {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
    }

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        config_manager.settings().logging.level
    };
    let logs_dir = config_manager.logs_folder();
    if let Some(dir) = &logs_dir {
        // The file appender needs the folder before the subscriber starts
        let _ = std::fs::create_dir_all(dir);
    }
    let _log_guard = init_tracing_with_file(level, logs_dir.as_deref());

    tracing::info!("Lip-sync previewer starting");
    tracing::info!("Config: {}", config_path.display());
    tracing::info!("Core version: {}", lipsync_core::version());

    if let Err(e) = config_manager.ensure_dirs_exist() {
        tracing::error!("Failed to create directories: {}", e);
        eprintln!("Warning: Failed to create directories: {}", e);
    }

    match &cli.command {
        Command::Run {
            analysis,
            preview,
            rate,
        } => run(&mut config_manager, analysis, *preview, *rate, cli.verbose),
        Command::Preview {
            cue_file,
            rate,
            dat_frame_rate,
            preston_blair,
        } => {
            let naming = if *preston_blair {
                DatNaming::PrestonBlair
            } else {
                DatNaming::Numeric
            };
            let options = match dat_frame_rate {
                Some(rate) => ParseOptions::dat(*rate, naming),
                None => ParseOptions {
                    dat_naming: naming,
                    ..ParseOptions::default()
                },
            };
            preview_file(&config_manager, cue_file, &options, *rate)
        }
        Command::Command { analysis } => {
            let options = analysis.to_options(&config_manager)?;
            let invocation = options.to_invocation(tool_path(&config_manager))?;
            println!("{}", invocation.preview());
            Ok(())
        }
    }
}

/// Bundled tool location is resolved next to the running binary.
fn tool_path(config: &ConfigManager) -> PathBuf {
    let base_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    config.executable_path(base_dir)
}

fn run(
    config: &mut ConfigManager,
    analysis: &AnalysisArgs,
    preview: bool,
    rate: f64,
    verbose: bool,
) -> Result<()> {
    let options = analysis.to_options(config)?;
    let invocation = options.to_invocation(tool_path(config))?;
    tracing::debug!("Command: {}", invocation.command_line());

    let supervisor = Supervisor::new(config.settings().supervisor_config());
    let session = Session::new(supervisor, ClockPlayer::new(None).with_rate(rate));
    session.subscribe(Arc::new(move |event: &SessionEvent| {
        report_analysis(event, verbose)
    }));

    let handle = session.analyze(invocation)?;
    let outcome = session.wait_for_timeline(&handle);
    eprintln!();

    if let Some(log_path) = handle.log_path() {
        eprintln!("Run log: {}", log_path.display());
    }
    let timeline = outcome?;
    println!(
        "{} cues, {:.2}s -> {}",
        timeline.len(),
        timeline.duration(),
        options.output_path.display()
    );

    remember_paths(config, &options);

    if preview {
        play_through(&session, config.settings().preview.tick_interval())?;
    }
    Ok(())
}

fn preview_file(
    config: &ConfigManager,
    cue_file: &Path,
    options: &ParseOptions,
    rate: f64,
) -> Result<()> {
    let supervisor = Supervisor::new(config.settings().supervisor_config());
    let session = Session::new(supervisor, ClockPlayer::new(None).with_rate(rate));

    let timeline = session
        .open_cue_file(cue_file, options)
        .with_context(|| format!("Failed to open {}", cue_file.display()))?;
    print_summary(&timeline);

    play_through(&session, config.settings().preview.tick_interval())
}

fn report_analysis(event: &SessionEvent, verbose: bool) {
    match event {
        SessionEvent::ProgressChanged(value) => {
            eprint!("\rAnalyzing... {:>3.0}%", value * 100.0);
            let _ = std::io::stderr().flush();
        }
        SessionEvent::ToolLog(log) if verbose => {
            eprintln!("\r{}", tool_log_line(log));
        }
        SessionEvent::ExecutionTerminal { state, exit_code, .. } => {
            tracing::info!("Analysis {} (exit code {:?})", state, exit_code);
        }
        SessionEvent::ParseFailed { message, .. } => {
            tracing::error!("{}", message);
        }
        _ => {}
    }
}

/// Tool log message as shown in verbose mode, e.g. `[Info] Application startup.`
fn tool_log_line(log: &ToolLog) -> String {
    match &log.level {
        Some(level) => format!("[{}] {}", level, log.message),
        None => log.message.clone(),
    }
}

fn print_summary(timeline: &Timeline) {
    println!("{} cues, {:.2}s", timeline.len(), timeline.duration());
}

/// Play the loaded timeline from the start, printing each shape change.
fn play_through<P: AudioPlayer + 'static>(session: &Session<P>, tick: Duration) -> Result<()> {
    if session.timeline().map_or(true, |t| t.is_empty()) {
        bail!("Nothing to preview");
    }

    if let Some(cue) = session.active_cue() {
        println!("{:>8.2}s  {}", 0.0, cue.shape);
    }
    session.play()?;

    while session.playback_state() == PlaybackState::Playing {
        thread::sleep(tick);
        if let Some(change) = session.tick() {
            match change.cue {
                Some(cue) => println!("{:>8.2}s  {}", change.position, cue.shape),
                None => println!("{:>8.2}s  -", change.position),
            }
        }
    }
    Ok(())
}

fn remember_paths(config: &mut ConfigManager, options: &AnalysisOptions) {
    let paths = &mut config.settings_mut().paths;
    paths.last_input_path = options.input_path.display().to_string();
    paths.last_output_path = options.output_path.display().to_string();

    if let Err(e) = config.update_section(ConfigSection::Paths) {
        tracing::warn!("Failed to save recent paths: {}", e);
    }
}
