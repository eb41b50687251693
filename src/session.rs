use std::sync::Arc;
use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::Rng as _;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use crate::config::WorldConfig;
use crate::constants::TICK_MS;
use crate::engine::{now_ms, EngineOptions, WorldEngine};
use crate::server_utils::clamp_to_map;
use crate::store::DocumentStore;
use crate::sync::WorldSynchronizer;
use crate::types::{PlayMode, WorldView};

const SESSION_KEY_LEN: usize = 20;

/// Input delivered to a running session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    Pointer { x: f64, y: f64 },
    Focus(bool),
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub config: WorldConfig,
    pub mode: PlayMode,
    pub session_key: String,
    pub seed: u32,
}

pub fn generate_session_key() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SESSION_KEY_LEN)
        .map(char::from)
        .collect()
}

pub fn random_seed() -> u32 {
    rand::rng().random()
}

/// One local player: an engine plus the synchronizer feeding it.
pub struct Session {
    engine: WorldEngine,
    sync: WorldSynchronizer,
    session_key: String,
    closed: bool,
}

impl Session {
    /// Connects to `store` (or runs local-only without one) and bootstraps
    /// the world.
    pub fn start(options: SessionOptions, store: Option<Arc<dyn DocumentStore>>, now_ms: u64) -> Self {
        let world_id = options.config.world_id.clone();
        let mut engine = WorldEngine::new(
            options.config,
            &options.session_key,
            EngineOptions {
                mode: options.mode,
                seed: options.seed,
            },
        );
        let mut sync = match store {
            Some(store) => WorldSynchronizer::connect(store, &world_id, &options.session_key),
            None => WorldSynchronizer::local(&world_id, &options.session_key),
        };
        sync.bootstrap(&mut engine, now_ms);
        info!(
            session = %options.session_key,
            mode = ?options.mode,
            local = sync.is_local(),
            "session_started"
        );
        Self {
            engine,
            sync,
            session_key: options.session_key,
            closed: false,
        }
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn engine(&self) -> &WorldEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut WorldEngine {
        &mut self.engine
    }

    pub fn sync(&self) -> &WorldSynchronizer {
        &self.sync
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns false once the session should stop.
    pub fn handle(&mut self, command: SessionCommand, now_ms: u64) -> bool {
        match command {
            SessionCommand::Pointer { x, y } => {
                let target = clamp_to_map(x, y, self.engine.config.map_half_size());
                self.engine.set_destination(target, now_ms);
                true
            }
            SessionCommand::Focus(active) => {
                self.engine.set_focus(active, now_ms);
                true
            }
            SessionCommand::Shutdown => false,
        }
    }

    /// Remote deliveries, then local timers, then pushes.
    pub fn tick(&mut self, now_ms: u64) -> WorldView {
        self.sync.pump(&mut self.engine, now_ms);
        self.engine.step(now_ms);
        self.sync.flush(&mut self.engine, now_ms);
        self.engine.build_view(now_ms, true)
    }

    pub fn close(&mut self, now_ms: u64) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.sync.shutdown(&mut self.engine, now_ms);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            self.close(now_ms());
        }
    }
}

/// Drives `session` on the wall clock until the command channel closes, a
/// `Shutdown` arrives or the view receiver goes away. Views that do not fit
/// into the outbound queue are dropped.
pub async fn run(
    mut session: Session,
    mut commands: mpsc::Receiver<SessionCommand>,
    views: mpsc::Sender<WorldView>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let view = session.tick(now_ms());
                match views.try_send(view) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        debug!(session = %session.session_key(), "view_dropped_queue_full");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                if !session.handle(command, now_ms()) {
                    break;
                }
            }
        }
    }
    session.close(now_ms());
}
