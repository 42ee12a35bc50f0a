use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use voice_recorder_core::{
    AudioLevels, ContainerKind, PipelineConfig, PipelineController, PipelineDelegate, PipelineError,
    PipelineState, RecordingResult,
};
use voice_recorder_native::{CaptureInput, NativeComponents, WavFileSource};

/// Slack added to a WAV file's length so its tail is captured before the auto-stop.
const WAV_TAIL: Duration = Duration::from_millis(200);

/// Record speech into an AAC (.m4a) or Opus (.opus) file.
#[derive(Parser, Debug)]
#[command(name = "voice-record", version)]
struct Args {
    /// Output file.
    #[arg(short, long)]
    output: PathBuf,

    /// Output codec; inferred from the output extension when omitted.
    #[arg(long, value_enum)]
    container: Option<ContainerArg>,

    #[arg(long, default_value_t = 16000)]
    sample_rate: u32,

    /// Target bitrate in bits/s.
    #[arg(long, default_value_t = 64000)]
    bitrate: u32,

    /// Stop after this many seconds instead of waiting for Enter.
    #[arg(long)]
    duration: Option<f64>,

    /// Encode a WAV file in real time instead of recording the microphone.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write `<output>.metadata.json` next to the recording.
    #[arg(long)]
    metadata: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ContainerArg {
    Aac,
    Opus,
}

impl From<ContainerArg> for ContainerKind {
    fn from(arg: ContainerArg) -> Self {
        match arg {
            ContainerArg::Aac => ContainerKind::AacInMp4,
            ContainerArg::Opus => ContainerKind::OpusInOgg,
        }
    }
}

/// Mirrors pipeline events into the log.
struct LoggingDelegate;

impl PipelineDelegate for LoggingDelegate {
    fn on_state_changed(&self, state: PipelineState) {
        log::info!("Pipeline {}", state);
    }

    fn on_levels_updated(&self, levels: &AudioLevels) {
        log::debug!("Level rms={:.3} peak={:.3}", levels.rms, levels.peak);
    }

    fn on_error(&self, error: &PipelineError) {
        log::error!("Recording failed: {}", error);
    }

    fn on_recording_finished(&self, result: &RecordingResult) {
        log::info!(
            "Saved {} ({:.1}s)",
            result.file_path.display(),
            result.duration_secs
        );
    }
}

fn container_for(args: &Args) -> Result<ContainerKind, PipelineError> {
    if let Some(arg) = args.container {
        return Ok(arg.into());
    }
    args.output
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ContainerKind::from_extension)
        .ok_or_else(|| {
            PipelineError::UnsupportedConfiguration(format!(
                "cannot infer the container from {}; pass --container",
                args.output.display()
            ))
        })
}

fn capture_input(args: &Args) -> Result<CaptureInput, PipelineError> {
    match &args.input {
        Some(path) => Ok(CaptureInput::WavFile(path.clone())),
        #[cfg(feature = "cpal")]
        None => Ok(CaptureInput::DefaultMicrophone),
        #[cfg(not(feature = "cpal"))]
        None => Err(PipelineError::DeviceUnavailable(
            "built without microphone support; pass --input <wav>".into(),
        )),
    }
}

fn record(args: &Args) -> Result<RecordingResult, PipelineError> {
    let input = capture_input(args)?;
    let max_duration = match (args.duration, &input) {
        (Some(secs), _) if secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        (Some(secs), _) => {
            return Err(PipelineError::UnsupportedConfiguration(format!(
                "duration must be positive, got {}",
                secs
            )))
        }
        (None, CaptureInput::WavFile(path)) => Some(WavFileSource::duration_of(path)? + WAV_TAIL),
        #[cfg(feature = "cpal")]
        (None, CaptureInput::DefaultMicrophone) => None,
    };

    let config = PipelineConfig {
        sample_rate: args.sample_rate,
        target_bitrate: args.bitrate,
        max_duration,
        write_metadata: args.metadata,
        ..PipelineConfig::new(container_for(args)?, &args.output)
    };

    let mut controller = PipelineController::new(NativeComponents::new(input));
    controller.set_delegate(Arc::new(LoggingDelegate));
    controller.start(config)?;

    if max_duration.is_some() {
        while matches!(controller.state(), PipelineState::Starting | PipelineState::Running) {
            thread::sleep(Duration::from_millis(50));
        }
    } else {
        eprintln!("Recording to {}, press Enter to stop", args.output.display());
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| PipelineError::Internal(format!("stdin: {}", e)))?;
    }

    controller
        .stop()?
        .ok_or_else(|| PipelineError::Internal("session ended without a result".into()))
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match record(&args) {
        Ok(result) => {
            let summary = serde_json::json!({
                "file": result.file_path,
                "duration_secs": result.duration_secs,
                "checksum": result.checksum,
                "units_written": result.stats.units_written,
                "bytes_muxed": result.stats.bytes_muxed,
                "frames_dropped_busy": result.stats.frames_dropped_busy,
                "metadata": result.metadata,
            });
            println!("{:#}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("voice-record: {}", e);
            ExitCode::FAILURE
        }
    }
}
