//! Chazy Core - Interrupt-Safe Text Animation for a Single Line
//!
//! This crate drives one animated line of text: it types a line with a
//! human-like cadence (typos, hesitations, a scramble reveal), holds it,
//! deletes it with a strategy that fits the mood, and decides which UI
//! events may cut in while that happens. It knows nothing about how the
//! text is drawn; a [`TextSurface`] does the drawing.
//!
//! # Architecture
//!
//! ```text
//!        UI events                         engine events
//!  (button_click, hover...)     (text_complete, ambient_cycle_ready...)
//!            │                                  ▲
//!            ▼                                  │
//!  ┌───────────────────┐   loopback   ┌─────────┴─────────┐
//!  │    EventRouter    │◀─────────────│      EventBus     │
//!  │ cooldown · lock · │              └─────────▲─────────┘
//!  │ budget · suppress │                        │
//!  │ · can_interrupt   │                        │
//!  └─────────┬─────────┘                        │
//!            │ respond(content, strategy)       │
//!            ▼                                  │
//!  ┌───────────────────┐   session tokens       │
//!  │    Orchestrator   │────────────────────────┘
//!  └─────────┬─────────┘
//!            │ process_line
//!            ▼
//!  ┌───────────────────┐   one active run    ┌──────────────────┐
//!  │ TextStateMachine  │────────────────────▶│ typing / delete  │
//!  │ IDLE → TYPING →   │  AnimationScheduler │   animation run  │
//!  │ DISPLAY → DELETING│                     └────────┬─────────┘
//!  └───────────────────┘                              ▼
//!                                               TextSurface
//! ```
//!
//! # Key Types
//!
//! - [`EventRouter`]: rate limits UI events and dispatches responses
//! - [`Orchestrator`]: sequences multi-line content onto the machine
//! - [`TextStateMachine`]: line lifecycle and interrupt policy
//! - [`AnimationScheduler`] and [`RunHandle`]: one cancellable run at a time
//! - [`TextSurface`]: what the animation draws on
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use chazy_core::{
//!     Content, EventBus, EventData, EventRouter, FixedMind, MachineConfig, MemorySurface,
//!     Orchestrator, RouterConfig, StaticContentSelector, TextStateMachine, TypingConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let surface = Arc::new(MemorySurface::new());
//!     let machine = TextStateMachine::new(surface.clone(), MachineConfig::default());
//!     let selector = StaticContentSelector::new()
//!         .with_fallback_reaction(Content::line("Oh, you clicked {target}."));
//!     let orchestrator = Orchestrator::new(
//!         machine,
//!         Arc::new(selector),
//!         Arc::new(FixedMind::default()),
//!         EventBus::default(),
//!         TypingConfig::default(),
//!     );
//!     let router = EventRouter::new(orchestrator, RouterConfig::default());
//!     let _tasks = router.start();
//!
//!     router.route("button_click", EventData::target("save")).await;
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`animation`]: runs, scheduler, typing and deletion engines
//! - [`calibration`]: persisted interrupt timing samples
//! - [`config`]: TOML, environment and CLI configuration
//! - [`emotion`]: emotion, tone and theme vocabulary
//! - [`error`]: line validation errors
//! - [`events`]: event bus and route results
//! - [`orchestrator`]: content sequencing and collaborator traits
//! - [`router`]: layered event routing
//! - [`state_machine`]: line lifecycle and interrupt decisions
//! - [`surface`]: the text surface abstraction
//! - [`urgency`]: event urgency classification
//!
//! # No Terminal Dependencies
//!
//! This crate has no dependency on crossterm or any other UI framework.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod animation;
pub mod calibration;
pub mod config;
pub mod emotion;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod router;
pub mod state_machine;
pub mod surface;
pub mod urgency;

// Re-exports for convenience
pub use animation::{
    start_deleting, start_typing, AnimationScheduler, AnimationStyle, CancelMode,
    DeletionStrategy, RunHandle, RunId, RunKind, RunOutcome, TypingConfig,
};
pub use emotion::{Emotion, Theme, Tone};
pub use error::LineError;
pub use events::{ChazyEvent, EventBus, EventData, RouteKind, RouteReason, RouteResult};
pub use orchestrator::{
    Content, ContentSelector, FixedMind, InterruptStyle, MindModel, Orchestrator,
    SelectionContext, SelectionKind, StaticContentSelector,
};
pub use state_machine::{
    ClearStrategy, DecisionReason, InterruptContext, InterruptDecision, LineConfig, LineOutcome,
    MachineConfig, MachineState, TextStateMachine,
};
pub use surface::{MemorySurface, SurfaceError, SurfaceOp, SurfaceRecord, TextSurface};
pub use urgency::{event_priority, event_urgency, Urgency};

// Router exports
pub use router::{EventRouter, RouterConfig, RouterStats, RouterTasks};

// Calibration exports
pub use calibration::{CalibrationError, CalibrationHistory, CalibrationSample};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ChazyConfig, ChazyToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
