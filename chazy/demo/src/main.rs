//! Chazy Demo - Scripted Terminal Driver for the Text Engine
//!
//! Renders the animated line on the current terminal row and replays a
//! script of timed UI events through the router, so interrupts, queueing and
//! rate limiting can be watched live.
//!
//! # Usage
//!
//! ```bash
//! # Welcome line and ambient chatter until Ctrl-C
//! chazy-demo
//!
//! # Replay a script in an excited mood
//! chazy-demo --script demo.events --emotion excited --intensity 0.8
//!
//! # Reproducible run with debug logs on stderr
//! RUST_LOG=chazy_core=debug chazy-demo --seed 7 --script demo.events 2>chazy.log
//! ```

mod script;
mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use chazy_core::calibration::{self, CalibrationHistory};
use chazy_core::{
    default_config_path, load_config_from_path, ConfigOverrides, Content, Emotion, EventBus,
    EventRouter, FixedMind, MachineState, Orchestrator, StaticContentSelector, TextStateMachine,
    Theme, Tone,
};

use script::ScriptEvent;
use terminal::TerminalSurface;

/// Chazy Demo - watch the text engine react to scripted UI events
#[derive(Parser, Debug)]
#[command(name = "chazy-demo")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHAZY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emotion the lines are typed in
    #[arg(short = 'e', long, default_value = "neutral")]
    emotion: String,

    /// Emotion intensity (0.0 to 1.0)
    #[arg(short = 'i', long, default_value_t = 0.5)]
    intensity: f64,

    /// Script of timed UI events to replay
    #[arg(short = 's', long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Seed for reproducible animation
    #[arg(long)]
    seed: Option<u64>,

    /// Skip the pause before the first line
    #[arg(long)]
    no_lead_in: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHAZY_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging on stderr; stdout belongs to the animated line
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chazy_demo={level},chazy_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn demo_content() -> StaticContentSelector {
    StaticContentSelector::new()
        .with_welcome(Content::lines([
            "Oh.\\pause{400} Hello there.",
            "I'll keep an eye on the controls.",
        ]))
        .with_reaction("button_click", Content::line("You pressed {target}."))
        .with_reaction(
            "button_click",
            Content::line("{target}, again? Bold.").with_tone(Tone::Wry),
        )
        .with_reaction("slider_changed", Content::line("{target}: {old} to {new}."))
        .with_reaction("select_changed", Content::line("{new}.\\pause{300} Good choice."))
        .with_reaction(
            "reset_clicked",
            Content::line("Starting over!").with_tone(Tone::Urgent),
        )
        .with_reaction("dialog_opened", Content::line("A dialog. How formal."))
        .with_fallback_reaction(Content::line("Noted."))
        .with_ambient(
            Content::lines(["Still here.", "Just thinking about \u{3c0} r\u{b2}."])
                .with_themes(vec![Theme::Math]),
        )
        .with_ambient(
            Content::line("Why do keyboards have a key for every letter but no key for sighing?")
                .with_themes(vec![Theme::Humor])
                .with_tone(Tone::Playful),
        )
        .with_ambient(
            Content::line("Some evenings the cursor blinks slower.")
                .with_themes(vec![Theme::Memory])
                .with_tone(Tone::Wistful)
                .with_reflect_pull(0.6),
        )
}

/// Replay `events` on their schedule, then let the last line play out
async fn replay(router: &EventRouter, events: Vec<ScriptEvent>) {
    let start = Instant::now();
    for event in events {
        tokio::time::sleep_until(start + event.at).await;
        let result = router.route(&event.event_type, event.data).await;
        info!(
            event_type = %event.event_type,
            at_ms = event.at.as_millis() as u64,
            responded = result.responded,
            reason = result.reason.name(),
            "Scripted event routed"
        );
    }

    let orchestrator = router.orchestrator();
    let mut states = orchestrator.machine().subscribe();
    loop {
        if states.wait_for(|s| *s == MachineState::Idle).await.is_err() {
            return;
        }
        if !orchestrator.is_sequence_active() {
            return;
        }
        if states.changed().await.is_err() {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Chazy demo starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config_from_path(args.config.clone().or_else(default_config_path))
        .context("Failed to load configuration")?;
    let mut overrides = ConfigOverrides::new();
    if let Some(seed) = args.seed {
        overrides = overrides.with_seed(seed);
    }
    if args.no_lead_in {
        overrides = overrides.without_lead_in();
    }
    overrides.apply(&mut config);
    info!(source = %config.source(), "Configuration resolved");

    let events = match &args.script {
        Some(path) => Some(script::load(path)?),
        None => None,
    };

    let emotion = Emotion::parse(&args.emotion);
    let mind = FixedMind::new(emotion, args.intensity.clamp(0.0, 1.0));

    let calibration_path = calibration::default_path();
    let history = match &calibration_path {
        Some(path) => CalibrationHistory::load(path).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable calibration history");
            CalibrationHistory::new()
        }),
        None => CalibrationHistory::new(),
    };
    if let Some(clear_ms) = history.suggested_clear_ms(emotion) {
        info!(emotion = emotion.label(), clear_ms, "Calibrated clear time");
    }
    let history = Arc::new(Mutex::new(history));

    let surface = Arc::new(TerminalSurface::new().context("Failed to prepare terminal")?);
    let machine = TextStateMachine::new(surface.clone(), config.machine.clone());
    let orchestrator = Orchestrator::new(
        machine,
        Arc::new(demo_content()),
        Arc::new(mind),
        EventBus::default(),
        config.typing.clone(),
    );
    let router = EventRouter::new(orchestrator.clone(), config.router.clone());
    router.attach_calibration(Arc::clone(&history));
    let tasks = router.start();

    orchestrator.show_welcome();

    tokio::select! {
        () = async {
            match events {
                Some(events) => replay(&router, events).await,
                None => std::future::pending::<()>().await,
            }
        } => info!("Script finished"),
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted");
        }
    }

    drop(tasks);
    router.cancel_ambient();
    surface.finish().context("Failed to restore terminal")?;

    if let Some(path) = &calibration_path {
        if let Err(e) = history.lock().save(path) {
            warn!(error = %e, path = %path.display(), "Failed to save calibration history");
        }
    }

    eprintln!("{}", serde_json::to_string_pretty(&router.stats())?);
    Ok(())
}
