use tracing::{debug, info};

use super::WorldEngine;
use crate::constants::{
    HORROR_MESSAGE, HUG_COOLDOWN_MS, HUG_LOCK_MS, HUG_PROGRESS, HUG_SIDE_OFFSET, OVERLOAD_DIM_MS,
    OVERLOAD_OVERLAY_MS, OVERLOAD_PHRASES, REACTION_MESSAGES,
};
use crate::types::{Direction, EngineEvent, HugSide, HugState, PlayMode, Vec2};

#[derive(Clone, Debug, PartialEq)]
enum HugPhase {
    Idle,
    Locked {
        bunny_id: String,
        release_at_ms: u64,
    },
    Cooldown {
        bunny_id: String,
        until_ms: u64,
    },
}

#[derive(Clone, Debug, PartialEq)]
enum OverloadPhase {
    Inactive,
    Dimming { until_ms: u64 },
    Revealed { until_ms: u64 },
}

/// At most one hug is in flight per session. The overload sequence waits for
/// the hug that caused it to finish its cooldown.
#[derive(Clone, Debug)]
pub struct HugMachine {
    phase: HugPhase,
    overload: OverloadPhase,
    overload_pending: bool,
    hugs_started: u64,
    overloads: u64,
}

impl Default for HugMachine {
    fn default() -> Self {
        Self {
            phase: HugPhase::Idle,
            overload: OverloadPhase::Inactive,
            overload_pending: false,
            hugs_started: 0,
            overloads: 0,
        }
    }
}

impl HugMachine {
    /// `Triggered` and `Resolving` are instantaneous and never observed here.
    pub fn state(&self) -> HugState {
        match self.phase {
            HugPhase::Idle => HugState::Idle,
            HugPhase::Locked { .. } => HugState::Locked,
            HugPhase::Cooldown { .. } => HugState::Cooldown,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == HugPhase::Idle
    }

    pub fn hugged_bunny(&self) -> Option<&str> {
        match &self.phase {
            HugPhase::Idle => None,
            HugPhase::Locked { bunny_id, .. } | HugPhase::Cooldown { bunny_id, .. } => {
                Some(bunny_id)
            }
        }
    }

    pub fn overload_active(&self) -> bool {
        self.overload != OverloadPhase::Inactive
    }

    pub fn overload_pending(&self) -> bool {
        self.overload_pending
    }

    pub fn hugs_started(&self) -> u64 {
        self.hugs_started
    }

    pub fn overloads_fired(&self) -> u64 {
        self.overloads
    }
}

impl WorldEngine {
    /// Idle -> Triggered -> Locked. Refused while another hug is in flight,
    /// while the player is paused, or when the bunny is not sad.
    pub(crate) fn trigger_hug(&mut self, bunny_id: &str, now_ms: u64) -> bool {
        if !self.hug.is_idle() || self.world.player.actor.paused {
            return false;
        }
        let player_id = self.world.player.id().to_string();
        let player_pos = self.world.player.actor.position();
        let Some(bunny) = self.world.bunny_mut(bunny_id) else {
            return false;
        };
        if !bunny.is_sad() {
            return false;
        }

        let bunny_pos = bunny.actor.position();
        let (side, player_x, player_facing, bunny_facing) = if bunny_pos.x > player_pos.x {
            (
                HugSide::PlayerLeft,
                bunny_pos.x - HUG_SIDE_OFFSET,
                Direction::Right,
                Direction::Left,
            )
        } else {
            (
                HugSide::PlayerRight,
                bunny_pos.x + HUG_SIDE_OFFSET,
                Direction::Left,
                Direction::Right,
            )
        };
        bunny.mark_hugged(&player_id);
        bunny.in_hug = true;
        bunny.actor.facing = bunny_facing;

        self.cancel_behavior(bunny_id);
        self.destination = None;

        let player = &mut self.world.player;
        player.actor.paused = true;
        player.hidden = true;
        player.actor.velocity = Vec2::ZERO;
        player.actor.facing = player_facing;
        player.actor.body.set_position(Vec2::new(player_x, bunny_pos.y));
        player.record_hug();
        let crossed = player.add_progress(HUG_PROGRESS);
        if crossed {
            self.hug.overload_pending = true;
        }

        self.hug.phase = HugPhase::Locked {
            bunny_id: bunny_id.to_string(),
            release_at_ms: now_ms + HUG_LOCK_MS,
        };
        self.hug.hugs_started += 1;
        self.events.push(EngineEvent::HugStarted {
            bunny_id: bunny_id.to_string(),
            side,
        });
        self.world_dirty = true;
        self.player_dirty = true;
        debug!(bunny = %bunny_id, ?side, "hug_started");
        true
    }

    pub(super) fn advance_hug(&mut self, now_ms: u64) {
        loop {
            match self.hug.phase.clone() {
                HugPhase::Locked {
                    bunny_id,
                    release_at_ms,
                } if release_at_ms <= now_ms => {
                    self.resolve_hug(&bunny_id, release_at_ms);
                    self.hug.phase = HugPhase::Cooldown {
                        bunny_id,
                        until_ms: release_at_ms + HUG_COOLDOWN_MS,
                    };
                }
                HugPhase::Cooldown { bunny_id, until_ms } if until_ms <= now_ms => {
                    self.hug.phase = HugPhase::Idle;
                    self.events.push(EngineEvent::ReactionCleared { bunny_id });
                    if self.hug.overload_pending {
                        self.start_overload(until_ms);
                    }
                }
                _ => break,
            }
        }
        self.advance_overload(now_ms);
    }

    /// Locked -> Resolving. Re-applies the hugged state in case a snapshot
    /// replaced the bunny while the hug was locked.
    fn resolve_hug(&mut self, bunny_id: &str, now_ms: u64) {
        let player_id = self.world.player.id().to_string();
        self.world.player.actor.paused = false;
        self.world.player.hidden = false;

        let restart = match self.world.bunny_mut(bunny_id) {
            Some(bunny) => {
                if bunny.is_sad() {
                    bunny.mark_hugged(&player_id);
                }
                bunny.in_hug = false;
                bunny.actor.stop();
                true
            }
            None => false,
        };
        if restart {
            self.start_behavior(bunny_id, now_ms);
        }

        let message = self.rng.pick(&REACTION_MESSAGES).to_string();
        self.notifications.push(message.clone(), now_ms);
        self.events.push(EngineEvent::HugResolved {
            bunny_id: bunny_id.to_string(),
            message,
        });
        self.world_dirty = true;
        self.player_dirty = true;

        let player = &self.world.player;
        if self.mode == PlayMode::Solo && player.hug_count() >= self.config.hug_goal {
            info!(hugs = player.hug_count(), "horror_triggered");
            let username = player.username.clone();
            self.notifications.push(HORROR_MESSAGE, now_ms);
            self.events.push(EngineEvent::HorrorTriggered { username });
        }
    }

    /// Starts the overload sequence now, or once the hug in flight has
    /// finished its cooldown.
    pub(super) fn request_overload(&mut self, now_ms: u64) {
        if self.hug.overload_active() {
            return;
        }
        if self.hug.is_idle() {
            self.start_overload(now_ms);
        } else {
            self.hug.overload_pending = true;
        }
    }

    fn start_overload(&mut self, now_ms: u64) {
        self.hug.overload_pending = false;
        self.hug.overload = OverloadPhase::Dimming {
            until_ms: now_ms + OVERLOAD_DIM_MS,
        };
        self.hug.overloads += 1;
        self.events.push(EngineEvent::OverloadDimmed);
        info!(progress = self.world.player.progress(), "overload_started");
    }

    fn advance_overload(&mut self, now_ms: u64) {
        loop {
            match self.hug.overload {
                OverloadPhase::Dimming { until_ms } if until_ms <= now_ms => {
                    let phrase = self.rng.pick(&OVERLOAD_PHRASES).to_string();
                    self.hug.overload = OverloadPhase::Revealed {
                        until_ms: until_ms + OVERLOAD_OVERLAY_MS,
                    };
                    self.events.push(EngineEvent::OverloadRevealed { phrase });
                }
                OverloadPhase::Revealed { until_ms } if until_ms <= now_ms => {
                    self.hug.overload = OverloadPhase::Inactive;
                    self.world.player.reset_progress();
                    self.player_dirty = true;
                    self.events.push(EngineEvent::OverloadCleared);
                }
                _ => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BUNNY_RADIUS;
    use crate::engine::tests::{add_bunny, add_item, engine_at};
    use crate::engine::ActorRef;
    use crate::types::BehaviorKind;

    fn hug_ready(x: f64) -> WorldEngine {
        let mut engine = engine_at(Vec2::ZERO);
        add_bunny(&mut engine, "bunny-1", Vec2::new(x, 0.0), BUNNY_RADIUS, None);
        engine
    }

    #[test]
    fn side_follows_relative_position() {
        let mut engine = hug_ready(-30.0);
        assert!(engine.trigger_hug("bunny-1", 0));
        assert_eq!(engine.player().actor.position(), Vec2::new(10.0, 0.0));
        assert_eq!(engine.player().actor.facing, Direction::Left);
        assert!(engine.drain_events().contains(&EngineEvent::HugStarted {
            bunny_id: "bunny-1".to_string(),
            side: HugSide::PlayerRight,
        }));
    }

    #[test]
    fn hug_runs_lock_then_cooldown_then_idle() {
        let mut engine = hug_ready(30.0);
        assert!(engine.trigger_hug("bunny-1", 1_000));
        assert_eq!(engine.player().hug_count(), 1);
        assert_eq!(engine.player().progress(), 5);

        engine.step(2_799);
        assert_eq!(engine.hug_state(), HugState::Locked);
        assert!(engine.player().actor.paused);

        engine.step(2_800);
        assert_eq!(engine.hug_state(), HugState::Cooldown);
        assert!(!engine.player().actor.paused);
        assert!(!engine.player().is_hidden());
        assert!(engine.notifications().primary().is_some());

        engine.step(3_600);
        assert_eq!(engine.hug_state(), HugState::Idle);
        assert!(engine.drain_events().contains(&EngineEvent::ReactionCleared {
            bunny_id: "bunny-1".to_string(),
        }));
    }

    #[test]
    fn only_one_hug_in_flight() {
        let mut engine = hug_ready(30.0);
        add_bunny(&mut engine, "bunny-2", Vec2::new(-30.0, 0.0), BUNNY_RADIUS, None);

        assert!(engine.trigger_hug("bunny-1", 0));
        assert!(!engine.trigger_hug("bunny-2", 10));
        engine.step(1_800);
        assert_eq!(engine.hug_state(), HugState::Cooldown);
        assert!(!engine.trigger_hug("bunny-2", 1_900));

        engine.step(2_600);
        assert!(engine.trigger_hug("bunny-2", 2_600));
        assert_eq!(engine.hug().hugs_started(), 2);
        assert_eq!(engine.player().hug_count(), 2);
    }

    #[test]
    fn hugged_bunny_task_is_replaced_not_duplicated() {
        let mut engine = engine_at(Vec2::ZERO);
        add_bunny(&mut engine, "bunny-1", Vec2::new(30.0, 0.0), BUNNY_RADIUS, None);
        if let Some(bunny) = engine.world.bunny_mut("bunny-1") {
            bunny.behavior = BehaviorKind::Flee;
        }
        engine.start_behavior("bunny-1", 0);
        assert_eq!(engine.scheduler().active_tasks(), 1);

        engine.trigger_hug("bunny-1", 0);
        assert_eq!(engine.scheduler().active_tasks(), 0);
        engine.step(1_800);
        assert_eq!(engine.scheduler().active_tasks(), 1);
        let handle = engine
            .world()
            .bunny("bunny-1")
            .and_then(|bunny| bunny.behavior_handle())
            .expect("task restarted");
        assert!(engine.scheduler().is_active(handle));
    }

    #[test]
    fn reaching_full_progress_runs_the_overload_sequence() {
        let mut engine = hug_ready(30.0);
        add_bunny(
            &mut engine,
            "bunny-9",
            Vec2::new(900.0, 900.0),
            BUNNY_RADIUS,
            Some("p1".to_string()),
        );
        engine.world.player.restore_counters(4, 95);

        assert!(engine.trigger_hug("bunny-1", 0));
        assert_eq!(engine.player().progress(), 100);
        assert!(engine.hug().overload_pending());

        engine.step(1_800);
        assert!(!engine.hug().overload_active());
        engine.step(2_600);
        assert!(engine.hug().overload_active());
        engine.step(3_600);
        assert!(engine
            .drain_events()
            .iter()
            .any(|event| matches!(event, EngineEvent::OverloadRevealed { .. })));
        assert_eq!(engine.player().progress(), 100);

        engine.step(7_600);
        assert!(!engine.hug().overload_active());
        assert_eq!(engine.player().progress(), 0);
        assert_eq!(engine.player().hug_count(), 0);
        assert!(engine.world().bunnies().all(|bunny| !bunny.is_sad()));
        assert_eq!(engine.hug().overloads_fired(), 1);
    }

    #[test]
    fn item_crossing_with_no_hug_in_flight_starts_overload_immediately() {
        let mut engine = engine_at(Vec2::ZERO);
        add_item(&mut engine, "item-1", Vec2::new(10.0, 0.0));
        engine.world.player.restore_counters(0, 90);
        engine.world.player.actor.velocity = Vec2::new(20.0, 0.0);

        assert!(engine.walk(ActorRef::Player, Direction::Right, 500));
        assert!(engine.hug().overload_active());
        engine.step(5_500);
        assert_eq!(engine.player().progress(), 0);
    }

    #[test]
    fn horror_fires_in_solo_once_goal_is_reached() {
        let mut engine = hug_ready(30.0);
        engine.world.player.restore_counters(14, 0);
        engine.trigger_hug("bunny-1", 0);
        engine.step(1_800);
        assert_eq!(engine.notifications().primary(), Some(HORROR_MESSAGE));
        assert!(engine
            .drain_events()
            .iter()
            .any(|event| matches!(event, EngineEvent::HorrorTriggered { .. })));
    }
}
