use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_turns::playback::PlayerCommand;
use voice_turns::{
    create_router, AppState, AudioPlayer, CaptureBackendFactory, CommandPlayer, Config,
    EncodedClip, HttpBatchTransport, Notice, PlayableAudio, Session, SessionParts, SessionState,
    SpeechServices, Transport, TransportMode, WebSocketTransport,
};

#[derive(Parser)]
#[command(name = "voice-turns", version, about = "Turn-based voice conversations with a remote agent")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/voice-turns")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converse on the terminal: Enter starts or stops a turn, q quits
    Talk,
    /// Run the conversation behind the local HTTP control API
    Serve,
    /// Synthesize text with the agent's voice and play it
    Speak { text: String },
    /// Transcribe a WAV file without involving the agent
    Transcribe { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Voice Turns v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Agent: {} ({} transport)", cfg.agent.base_url, cfg.agent.transport);

    match cli.command {
        Commands::Talk => talk(cfg).await,
        Commands::Serve => serve(cfg).await,
        Commands::Speak { text } => speak(cfg, &text).await,
        Commands::Transcribe { file } => transcribe(cfg, file).await,
    }
}

async fn build_player(cfg: &Config) -> Result<Arc<dyn AudioPlayer>> {
    let player = match cfg.playback.player.as_deref() {
        Some(name) => {
            let command = PlayerCommand::from_name(name)
                .with_context(|| format!("Unknown audio player: {}", name))?;
            CommandPlayer::new(command)
        }
        None => CommandPlayer::auto_detect()
            .await
            .context("No audio player found (install afplay, sox or aplay)")?,
    };
    info!("Audio playback via {}", player.name());
    Ok(Arc::new(player))
}

async fn build_parts(cfg: &Config) -> Result<SessionParts> {
    let capture = CaptureBackendFactory::create(cfg.capture_source()?, cfg.capture_config())
        .await
        .context("Failed to set up audio capture")?;

    let transport = match cfg.agent.transport {
        TransportMode::Batch => Transport::Batch(Arc::new(HttpBatchTransport::new(
            &cfg.agent.base_url,
            cfg.request_timeout(),
        )?)),
        TransportMode::Streaming => {
            let url = cfg
                .agent
                .streaming_url
                .as_deref()
                .context("agent.streaming_url is required for the streaming transport")?;
            Transport::Streaming(Arc::new(WebSocketTransport::new(url)))
        }
    };

    Ok(SessionParts {
        capture,
        transport,
        player: build_player(cfg).await?,
    })
}

fn print_notice(notice: Notice) {
    match notice {
        Notice::StateChanged(state) => println!("[{}]", state),
        Notice::Partial(text) => println!("  ... {}", text),
        Notice::TurnAppended(turn) => println!("{}: {}", turn.speaker, turn.text),
        Notice::Error(message) => eprintln!("! {}", message),
        Notice::ConversationStopped => println!("Conversation ended."),
    }
}

async fn talk(cfg: Config) -> Result<()> {
    let (handle, session) = Session::spawn(cfg.session_config(), build_parts(&cfg).await?);

    let mut notices = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => print_notice(notice),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("Press Enter to start or stop a turn, q to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if matches!(line.trim(), "q" | "quit") {
            break;
        }

        match handle.state() {
            SessionState::Idle => handle.start_turn()?,
            SessionState::Recording => handle.stop_turn()?,
            other => println!("(busy: {})", other),
        }
    }

    handle.stop_conversation()?;
    handle.shutdown()?;
    session.await??;
    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    let (handle, session) = Session::spawn(cfg.session_config(), build_parts(&cfg).await?);
    let app = create_router(AppState::new(handle.clone()));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    handle.shutdown()?;
    session.await??;
    Ok(())
}

async fn speak(cfg: Config, text: &str) -> Result<()> {
    let services = SpeechServices::new(&cfg.agent.base_url, cfg.request_timeout())?;
    let audio_url = services.synthesize(text).await?;
    info!("Speech ready: {}", audio_url);

    let player = build_player(&cfg).await?;
    player.play(PlayableAudio::Url(audio_url)).await?;
    Ok(())
}

async fn transcribe(cfg: Config, file: PathBuf) -> Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let clip = EncodedClip {
        bytes,
        mime_type: "audio/wav",
        file_name: "agent_chat_audio.wav",
    };

    let services = SpeechServices::new(&cfg.agent.base_url, cfg.request_timeout())?;
    let transcript = services.transcribe(&clip).await?;
    println!("{}", transcript);
    Ok(())
}
