use tracing::debug;

use super::utils::distance_between;
use super::{ActorRef, WorldEngine};
use crate::constants::{ITEM_PROGRESS, STEER_DEAD_ZONE, STEER_INTERVAL_MS};
use crate::entity::{Actor, WorldState};
use crate::types::{Direction, EngineEvent, Vec2};

/// A mover is blocked when the candidate position falls inside some other
/// body's radius while its current position is outside it. Bodies that
/// already overlap the mover never hold it in place.
pub fn is_blocked(world: &WorldState, mover_id: &str, from: Vec2, candidate: Vec2) -> bool {
    world.blockers().any(|body| {
        body.id != mover_id
            && distance_between(body.position(), candidate) <= body.radius()
            && distance_between(body.position(), from) > body.radius()
    })
}

/// First sad bunny whose radius covers `candidate`.
pub fn huggable_bunny(world: &WorldState, candidate: Vec2) -> Option<String> {
    world
        .bunnies()
        .find(|bunny| {
            bunny.is_sad()
                && distance_between(bunny.actor.position(), candidate)
                    <= bunny.actor.body.radius()
        })
        .map(|bunny| bunny.id().to_string())
}

impl WorldEngine {
    fn actor(&self, actor: &ActorRef) -> Option<&Actor> {
        match actor {
            ActorRef::Player => Some(&self.world.player.actor),
            ActorRef::Bunny(id) => self.world.bunny(id).map(|bunny| &bunny.actor),
        }
    }

    fn actor_mut(&mut self, actor: &ActorRef) -> Option<&mut Actor> {
        match actor {
            ActorRef::Player => Some(&mut self.world.player.actor),
            ActorRef::Bunny(id) => self.world.bunny_mut(id).map(|bunny| &mut bunny.actor),
        }
    }

    /// Whether the actor may advance by its current velocity. For an unpaused
    /// local player a sad bunny at the candidate position starts a hug
    /// instead, and the move is refused. A refused hug falls back to the
    /// blocking rule.
    pub fn try_move(&mut self, actor: &ActorRef, now_ms: u64) -> bool {
        let Some(mover) = self.actor(actor) else {
            return false;
        };
        let from = mover.position();
        let candidate = from.offset(mover.velocity);
        let blocked = is_blocked(&self.world, mover.id(), from, candidate);

        if *actor == ActorRef::Player && !self.world.player.actor.paused {
            if let Some(bunny_id) = huggable_bunny(&self.world, candidate) {
                if self.trigger_hug(&bunny_id, now_ms) {
                    return false;
                }
            }
        }
        !blocked
    }

    /// One discrete step. Returns true when the actor actually moved.
    pub fn walk(&mut self, actor: ActorRef, direction: Direction, now_ms: u64) -> bool {
        if direction == Direction::None || !self.focused {
            return false;
        }
        match self.actor(&actor) {
            Some(mover) if !mover.paused => {}
            _ => return false,
        }

        let allowed = self.try_move(&actor, now_ms);
        let Some(mover) = self.actor_mut(&actor) else {
            return false;
        };
        let id = mover.id().to_string();
        if !allowed {
            mover.stop();
            self.events.push(EngineEvent::ActorStopped { id });
            return false;
        }

        let next = mover.position().offset(mover.velocity);
        mover.body.set_position(next);
        mover.face(direction);
        let event = EngineEvent::ActorMoved {
            id,
            x: next.x,
            y: next.y,
            facing: mover.facing,
            frame: mover.frame,
        };
        self.events.push(event);

        // bunny steps stay local; only hugs, spawns and pickups rewrite the world doc
        if actor == ActorRef::Player {
            self.player_dirty = true;
            self.collect_item(now_ms);
        }
        true
    }

    /// Replaces any running steering loop with one heading for `target`.
    pub fn set_destination(&mut self, target: Vec2, now_ms: u64) {
        self.world.player.actor.stop();
        self.destination = Some(target);
        self.next_steer_ms = now_ms + STEER_INTERVAL_MS;
    }

    pub(super) fn steer(&mut self, now_ms: u64) {
        let Some(target) = self.destination else {
            return;
        };
        let speed = self.config.player_speed;
        let position = self.world.player.actor.position();
        let dx = target.x - position.x;
        let dy = target.y - position.y;
        let axis_speed = |delta: f64| {
            if delta.abs() <= STEER_DEAD_ZONE {
                0.0
            } else if delta < 0.0 {
                -speed
            } else {
                speed
            }
        };
        let velocity = Vec2::new(axis_speed(dx), axis_speed(dy));
        self.world.player.actor.velocity = velocity;

        if velocity.is_zero() {
            self.destination = None;
            self.world.player.actor.stop();
            self.events.push(EngineEvent::Arrived);
            self.player_dirty = true;
            return;
        }

        let direction = if velocity.x != 0.0 && (velocity.y == 0.0 || dx.abs() >= dy.abs()) {
            if velocity.x < 0.0 {
                Direction::Left
            } else {
                Direction::Right
            }
        } else if velocity.y < 0.0 {
            Direction::Up
        } else {
            Direction::Down
        };
        self.walk(ActorRef::Player, direction, now_ms);
    }

    fn collect_item(&mut self, now_ms: u64) {
        let position = self.world.player.actor.position();
        let Some(item_id) = self
            .world
            .items()
            .find(|item| distance_between(item.body.position(), position) <= item.body.radius())
            .map(|item| item.body.id.clone())
        else {
            return;
        };
        let Some(item) = self.world.take_item(&item_id) else {
            return;
        };
        debug!(item = %item_id, "item_collected");
        self.consumed_items.insert(item_id.clone());
        let crossed = self.world.player.add_progress(ITEM_PROGRESS);
        self.notifications.push(item.message.clone(), now_ms);
        self.events.push(EngineEvent::ItemCollected {
            item_id,
            message: item.message,
        });
        self.world_dirty = true;
        self.player_dirty = true;
        if crossed {
            self.request_overload(now_ms);
        }
    }
}
