#![deny(clippy::all)]

use anyhow::{bail, Context};
use clap::Parser;
use scribe::config::Config;
use scribe::storage;
use scribe::transcription::{
    progress_percent, ArtifactFormat, HttpSubmitter, Job, JobOptions, PushChannel,
    RenderedSegment, SessionController, SessionObserver, SessionState,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, Level};

#[derive(Parser, Debug)]
#[command(name = "scribe", version, about = "Scribe - remote transcription client")]
struct CliArgs {
    /// Local audio or video file to transcribe
    #[arg(required_unless_present = "url", conflicts_with = "url")]
    file: Option<PathBuf>,

    /// YouTube link to transcribe instead of a local file
    #[arg(long)]
    url: Option<String>,

    /// Attribute segments to speakers
    #[arg(long)]
    diarize: bool,

    /// Language code hint, e.g. "en" (detected when omitted)
    #[arg(long)]
    language: Option<String>,

    /// Transcription server base URL, overriding configuration
    #[arg(long)]
    server: Option<String>,

    /// Save the transcript in this format: text or subtitle
    #[arg(long)]
    export: Option<ArtifactFormat>,

    /// Directory for exports, overriding configuration
    #[arg(long, requires = "export")]
    out: Option<PathBuf>,

    /// Enable debug mode with verbose logging
    #[arg(long)]
    debug: bool,
}

/// Prints session updates to the terminal
#[derive(Debug, Default)]
struct TerminalObserver {
    progress_visible: bool,
}

impl TerminalObserver {
    fn clear_progress(&mut self) {
        if self.progress_visible {
            eprintln!();
            self.progress_visible = false;
        }
    }
}

impl SessionObserver for TerminalObserver {
    fn on_progress(&mut self, fraction: f64) {
        eprint!("\rTranscribing... {:>3}%", progress_percent(fraction));
        let _ = std::io::stderr().flush();
        self.progress_visible = true;
    }

    fn on_segment_rendered(&mut self, segment: &RenderedSegment) {
        self.clear_progress();
        match &segment.speaker_label {
            Some(speaker) => println!("[{}] {}: {}", segment.time_range(), speaker, segment.text.trim()),
            None => println!("[{}] {}", segment.time_range(), segment.text.trim()),
        }
    }

    fn on_full_text_rendered(&mut self, text: &str) {
        self.clear_progress();
        println!("{}", text);
    }

    fn on_complete(&mut self) {
        self.clear_progress();
        eprintln!("Transcription complete");
    }

    fn on_failed(&mut self, message: &str) {
        self.clear_progress();
        eprintln!("Error: {}", message);
    }

    fn on_reset(&mut self) {
        self.clear_progress();
        eprintln!("Cancelled");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env before configuration reads the environment
    let dotenv = dotenvy::dotenv();

    let args = CliArgs::parse();

    // Initialize tracing for structured logging; stdout carries the transcript
    tracing_subscriber::fmt()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Ok(path) => debug!("Loaded environment from {:?}", path),
        Err(e) => debug!(".env not loaded: {}", e),
    }

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(server) = &args.server {
        config
            .set_server_url(server)
            .context("Invalid --server value")?;
    }
    let base_url = config.server_url()?;

    let submitter = HttpSubmitter::new(&base_url, config.request_timeout(), config.connect_timeout())?;
    let mut controller = SessionController::new(submitter, TerminalObserver::default());
    controller
        .attach_channel(PushChannel::new(&base_url, config.channel_config()))
        .context("Failed to open push channel")?;
    info!(client_id = %controller.identity(), server = %base_url, "Session ready");

    let options = JobOptions {
        diarization_enabled: args.diarize,
        language_hint: args.language.clone(),
    };
    let job = match (&args.url, &args.file) {
        (Some(url), _) => Job::remote(url.as_str(), options),
        (None, Some(path)) => Job::local_file(path, options),
        (None, None) => bail!("Provide a file or --url"),
    };

    if controller.start_transcription(job).is_err() {
        // Already reported through the observer
        return Ok(ExitCode::FAILURE);
    }

    let interrupted = tokio::select! {
        _ = controller.run_until_settled() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        controller.reset();
        controller.shutdown();
        return Ok(ExitCode::from(130));
    }

    if controller.state() != SessionState::Complete {
        controller.shutdown();
        return Ok(ExitCode::FAILURE);
    }

    if let Some(format) = args.export {
        let content = controller
            .export(format)
            .context("Transcript is empty, nothing to export")?;
        let dir = match args.out.clone() {
            Some(dir) => dir,
            None => config.export_dir()?,
        };
        let path = storage::save_export(&dir, format, &content)?;
        eprintln!("Saved {} export to {}", format, path.display());
    }

    controller.shutdown();
    Ok(ExitCode::SUCCESS)
}
