use std::collections::BTreeSet;

use tracing::debug;

use crate::config::WorldConfig;
use crate::constants::{
    ALL_HUGGED_LABEL, BLUR_WHISPER, BLUR_WHISPER_CHANCE, BLUR_WHISPER_DELAY_MS, HEARTBEAT_MS,
    LONELY_WHISPER, LONELY_WHISPER_CHANCE, MAX_TASK_CATCH_UP, PLAYER_RADIUS, RADAR_SLOTS,
    STEER_INTERVAL_MS,
};
use crate::documents::{PlayerDoc, WorldDoc};
use crate::entity::{Player, WorldState};
use crate::notifications::NotificationQueue;
use crate::rng::Rng;
use crate::types::{
    BunnyView, EngineEvent, HugState, ItemView, ObstacleView, PeerView, PlayMode, PlayerView,
    RadarEntry, Vec2, WorldView,
};

mod behavior;
mod hug;
mod movement;
mod population;
mod reconcile;
mod utils;

pub use self::behavior::{BehaviorScheduler, TaskHandle};
pub use self::hug::HugMachine;
pub use self::movement::{huggable_bunny, is_blocked};
pub use self::utils::{bearing_deg, distance_between, now_ms};

use self::utils::random_position;

/// The actor a movement request refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActorRef {
    Player,
    Bunny(String),
}

#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub mode: PlayMode,
    pub seed: u32,
}

/// Documents waiting to be pushed to the remote store.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    pub player: Option<PlayerDoc>,
    pub world: Option<WorldDoc>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.player.is_none() && self.world.is_none()
    }
}

/// Local simulation of one session: owns the world state and every timer
/// that mutates it. All time is passed in explicitly as `now_ms`.
#[derive(Clone, Debug)]
pub struct WorldEngine {
    pub config: WorldConfig,
    mode: PlayMode,
    world: WorldState,
    rng: Rng,
    scheduler: BehaviorScheduler,
    hug: HugMachine,
    notifications: NotificationQueue,
    events: Vec<EngineEvent>,
    focused: bool,
    destination: Option<Vec2>,
    next_steer_ms: u64,
    next_heartbeat_ms: Option<u64>,
    whispers: Vec<(u64, String)>,
    consumed_items: BTreeSet<String>,
    player_dirty: bool,
    world_dirty: bool,
}

impl WorldEngine {
    pub fn new(config: WorldConfig, session_key: &str, options: EngineOptions) -> Self {
        let mut rng = Rng::new(options.seed);
        let spawn = random_position(&mut rng, config.map_half_size());
        let username = default_username(session_key);
        let player = Player::new(session_key, username, spawn, PLAYER_RADIUS);
        Self {
            config,
            mode: options.mode,
            world: WorldState::new(player),
            rng,
            scheduler: BehaviorScheduler::default(),
            hug: HugMachine::default(),
            notifications: NotificationQueue::default(),
            events: Vec::new(),
            focused: true,
            destination: None,
            next_steer_ms: 0,
            next_heartbeat_ms: None,
            whispers: Vec::new(),
            consumed_items: BTreeSet::new(),
            player_dirty: false,
            world_dirty: false,
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn player(&self) -> &Player {
        &self.world.player
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn scheduler(&self) -> &BehaviorScheduler {
        &self.scheduler
    }

    pub fn hug(&self) -> &HugMachine {
        &self.hug
    }

    pub fn hug_state(&self) -> HugState {
        self.hug.state()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn destination(&self) -> Option<Vec2> {
        self.destination
    }

    pub fn notifications(&mut self) -> &mut NotificationQueue {
        &mut self.notifications
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Focus loss suspends every `walk`; hug and overload timers keep running.
    pub fn set_focus(&mut self, active: bool, now_ms: u64) {
        self.focused = active;
        if !active && self.mode == PlayMode::Solo && self.rng.bool(BLUR_WHISPER_CHANCE) {
            self.whispers
                .push((now_ms + BLUR_WHISPER_DELAY_MS, BLUR_WHISPER.to_string()));
        }
    }

    pub fn notify(&mut self, message: &str, now_ms: u64) {
        self.notifications.push(message, now_ms);
    }

    /// Fires every timer due at `now_ms`.
    pub fn step(&mut self, now_ms: u64) {
        self.advance_hug(now_ms);
        self.fire_whispers(now_ms);
        self.run_heartbeat(now_ms);

        let mut runs = 0;
        while self.destination.is_some() && self.next_steer_ms <= now_ms {
            let at = self.next_steer_ms;
            self.next_steer_ms += STEER_INTERVAL_MS;
            runs += 1;
            if runs > MAX_TASK_CATCH_UP {
                self.next_steer_ms = now_ms + STEER_INTERVAL_MS;
                break;
            }
            self.steer(at);
        }

        self.run_behaviors(now_ms);
        self.notifications.prune(now_ms);
    }

    /// Pending document pushes. Clears the dirty flags.
    pub fn take_outbox(&mut self, now_ms: u64) -> Outbox {
        let player = if self.player_dirty {
            self.world.player.last_active_ms = now_ms;
            Some(self.player_doc())
        } else {
            None
        };
        let world = if self.world_dirty {
            self.world.last_updated_ms = now_ms;
            Some(self.world_doc())
        } else {
            None
        };
        self.player_dirty = false;
        self.world_dirty = false;
        Outbox { player, world }
    }

    /// Cancels every running behavior task and the steering loop.
    pub fn teardown(&mut self) {
        let ids: Vec<String> = self.world.bunnies.keys().cloned().collect();
        for id in ids {
            self.cancel_behavior(&id);
        }
        self.destination = None;
        debug!(remaining = self.scheduler.active_tasks(), "engine_teardown");
    }

    pub fn sad_indicator(&self) -> String {
        match self.world.sad_bunny_count() {
            0 => ALL_HUGGED_LABEL.to_string(),
            count => format!("x {count}"),
        }
    }

    /// The nearest sad bunnies, closest first.
    pub fn radar(&self) -> Vec<RadarEntry> {
        let origin = self.world.player.actor.position();
        let mut entries: Vec<RadarEntry> = self
            .world
            .bunnies()
            .filter(|bunny| bunny.is_sad())
            .map(|bunny| RadarEntry {
                bunny_id: bunny.id().to_string(),
                distance: distance_between(bunny.actor.position(), origin) as i64,
                angle_deg: bearing_deg(origin, bunny.actor.position()),
            })
            .collect();
        entries.sort_by(|a, b| {
            a.distance
                .cmp(&b.distance)
                .then_with(|| a.bunny_id.cmp(&b.bunny_id))
        });
        entries.truncate(RADAR_SLOTS);
        entries
    }

    pub fn build_view(&mut self, now_ms: u64, include_events: bool) -> WorldView {
        let player = &self.world.player;
        WorldView {
            now_ms,
            player: PlayerView {
                id: player.id().to_string(),
                username: player.username.clone(),
                x: player.actor.position().x,
                y: player.actor.position().y,
                z_order: player.actor.body.z_order(),
                facing: player.actor.facing,
                frame: player.actor.frame,
                paused: player.actor.paused,
                hidden: player.is_hidden(),
                hugs: player.hug_count(),
                progress: player.progress(),
                time_played_ms: player.play_time_ms,
            },
            bunnies: self
                .world
                .bunnies()
                .map(|bunny| BunnyView {
                    id: bunny.id().to_string(),
                    name: bunny.name.clone(),
                    x: bunny.actor.position().x,
                    y: bunny.actor.position().y,
                    z_order: bunny.actor.body.z_order(),
                    facing: bunny.actor.facing,
                    frame: bunny.actor.frame,
                    sad: bunny.is_sad(),
                    hugging: bunny.in_hug,
                    owner: bunny.owner().map(str::to_string),
                    behavior: bunny.behavior,
                })
                .collect(),
            obstacles: self
                .world
                .obstacles()
                .map(|obstacle| ObstacleView {
                    id: obstacle.body.id.clone(),
                    kind: obstacle.kind,
                    x: obstacle.body.position().x,
                    y: obstacle.body.position().y,
                })
                .collect(),
            items: self
                .world
                .items()
                .map(|item| ItemView {
                    id: item.body.id.clone(),
                    x: item.body.position().x,
                    y: item.body.position().y,
                })
                .collect(),
            peers: self
                .world
                .peers()
                .map(|peer| PeerView {
                    id: peer.actor.id().to_string(),
                    label: peer.label(),
                    x: peer.actor.position().x,
                    y: peer.actor.position().y,
                    progress: peer.progress,
                    time_played_ms: peer.play_time_ms,
                })
                .collect(),
            hug_state: self.hug.state(),
            sad_indicator: self.sad_indicator(),
            online_players: self.world.peers.len() + 1,
            radar: self.radar(),
            notifications: self.notifications.snapshot(now_ms),
            events: if include_events {
                self.drain_events()
            } else {
                Vec::new()
            },
        }
    }

    fn fire_whispers(&mut self, now_ms: u64) {
        if self.whispers.is_empty() {
            return;
        }
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.whispers)
            .into_iter()
            .partition(|(at, _)| *at <= now_ms);
        self.whispers = pending;
        for (at, message) in due {
            self.notifications.push(message, at);
        }
    }

    fn run_heartbeat(&mut self, now_ms: u64) {
        let next = *self
            .next_heartbeat_ms
            .get_or_insert(now_ms + HEARTBEAT_MS);
        if now_ms < next {
            return;
        }
        let missed = (now_ms - next) / HEARTBEAT_MS + 1;
        self.next_heartbeat_ms = Some(next + missed * HEARTBEAT_MS);
        self.world.player.play_time_ms += missed * HEARTBEAT_MS;
        self.world.player.last_active_ms = now_ms;
        self.player_dirty = true;
        if self.mode == PlayMode::Solo && self.rng.bool(LONELY_WHISPER_CHANCE) {
            self.notifications.push(LONELY_WHISPER, now_ms);
        }
    }
}

pub fn default_username(session_key: &str) -> String {
    let prefix: String = session_key.chars().take(5).collect();
    format!("Subject_{prefix}")
}
