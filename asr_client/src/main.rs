use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use asr_client::{
    Credentials, FileAudioSource, LanguageModelList, LoggingListener, RecognitionConfig,
    RecognitionListener, RecognizerSettings, ServerProtocol, SpeechRecognizer,
};

/// Recognize an audio file with an ASR server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// WAV or raw 16-bit PCM file to recognize
    audio: PathBuf,

    /// Server endpoint (ws:// or wss://); falls back to ASR_URL
    #[arg(long)]
    url: Option<String>,

    /// User for Basic authentication; falls back to ASR_USER
    #[arg(long)]
    user: Option<String>,

    /// Password for Basic authentication; falls back to ASR_PASSWORD
    #[arg(long)]
    password: Option<String>,

    /// Language model URI
    #[arg(long, default_value = "builtin:slm/general")]
    model: String,

    /// SRGS grammar file, used instead of --model
    #[arg(long)]
    grammar: Option<PathBuf>,

    /// Seconds to wait for the result
    #[arg(long, default_value_t = 30)]
    max_wait: u64,

    /// Send recognition parameters read from the environment
    #[arg(long)]
    config_from_env: bool,

    /// Server does not send final_result/last_segment in result bodies
    #[arg(long)]
    legacy: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

fn settings(args: &Args) -> Result<RecognizerSettings> {
    let mut settings = match &args.url {
        Some(url) => RecognizerSettings {
            url: url.clone(),
            ..Default::default()
        },
        None => RecognizerSettings::from_env().context("No --url given and ASR_URL is unusable")?,
    };

    if let Some(user) = &args.user {
        let password = args
            .password
            .clone()
            .or_else(|| std::env::var("ASR_PASSWORD").ok())
            .unwrap_or_default();
        settings.credentials = Some(Credentials::new(user.clone(), password));
    }

    settings.max_wait = Duration::from_secs(args.max_wait);
    if args.legacy {
        settings.server_protocol = ServerProtocol::Legacy;
    }
    if args.config_from_env {
        settings.config = Some(RecognitionConfig::from_env());
    }
    Ok(settings)
}

fn language_model(args: &Args) -> Result<LanguageModelList> {
    match &args.grammar {
        Some(path) => {
            let grammar = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read grammar {}", path.display()))?;
            Ok(LanguageModelList::from_grammar(grammar))
        }
        None if args.model.trim().is_empty() => bail!("Empty language model URI"),
        None => Ok(LanguageModelList::from_uri(args.model.clone())),
    }
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let args = Args::parse();
    log::info!("🚀 Recognizing {}", args.audio.display());

    let settings = settings(&args)?;
    let language_model = language_model(&args)?;
    let audio = FileAudioSource::open(&args.audio)
        .with_context(|| format!("Failed to open {}", args.audio.display()))?;

    let listeners: Vec<Arc<dyn RecognitionListener>> = vec![Arc::new(LoggingListener)];
    let recognizer =
        SpeechRecognizer::connect(settings, listeners).context("Failed to connect to ASR server")?;

    recognizer
        .recognize(Arc::new(audio), language_model)
        .context("Failed to start recognition")?;
    let results = recognizer.wait_result().context("Recognition failed")?;
    recognizer.close();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for (segment, result) in results.iter().enumerate() {
        println!("[{}] {}", segment, result.code());
        for alternative in result.alternatives() {
            println!("    {} ({})", alternative.text, alternative.confidence);
        }
    }
    Ok(())
}
