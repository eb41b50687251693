use std::collections::BTreeMap;

use tracing::trace;

use super::utils::{away_from, random_direction};
use super::{ActorRef, WorldEngine};
use crate::constants::{FLEE_INTERVAL_MS, MAX_TASK_CATCH_UP, WANDER_INTERVAL_MS};
use crate::types::BehaviorKind;

/// Opaque handle of one periodic behavior task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

#[derive(Clone, Debug)]
struct PeriodicTask {
    bunny_id: String,
    kind: BehaviorKind,
    period_ms: u64,
    next_due_ms: u64,
}

/// Periodic tasks multiplexed on the engine clock.
#[derive(Clone, Debug, Default)]
pub struct BehaviorScheduler {
    next_handle: u64,
    tasks: BTreeMap<TaskHandle, PeriodicTask>,
}

impl BehaviorScheduler {
    pub fn period_of(kind: BehaviorKind) -> Option<u64> {
        match kind {
            BehaviorKind::Wander => Some(WANDER_INTERVAL_MS),
            BehaviorKind::Flee => Some(FLEE_INTERVAL_MS),
            BehaviorKind::Still => None,
        }
    }

    /// `still` bunnies get no task.
    pub fn spawn(&mut self, bunny_id: &str, kind: BehaviorKind, now_ms: u64) -> Option<TaskHandle> {
        let period_ms = Self::period_of(kind)?;
        self.next_handle += 1;
        let handle = TaskHandle(self.next_handle);
        self.tasks.insert(
            handle,
            PeriodicTask {
                bunny_id: bunny_id.to_string(),
                kind,
                period_ms,
                next_due_ms: now_ms + period_ms,
            },
        );
        Some(handle)
    }

    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        self.tasks.remove(&handle).is_some()
    }

    pub fn active_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_active(&self, handle: TaskHandle) -> bool {
        self.tasks.contains_key(&handle)
    }

    /// Tasks due at `now_ms`, earliest first. Each returned run advances the
    /// task's schedule by one period.
    fn take_due(&mut self, now_ms: u64) -> Vec<(TaskHandle, String, BehaviorKind)> {
        let mut due: Vec<(u64, TaskHandle, String, BehaviorKind)> = Vec::new();
        for (handle, task) in self.tasks.iter_mut() {
            let mut runs = 0;
            while task.next_due_ms <= now_ms {
                if runs < MAX_TASK_CATCH_UP {
                    due.push((task.next_due_ms, *handle, task.bunny_id.clone(), task.kind));
                    runs += 1;
                }
                task.next_due_ms += task.period_ms;
            }
        }
        due.sort_by_key(|(at, handle, _, _)| (*at, *handle));
        due.into_iter()
            .map(|(_, handle, bunny_id, kind)| (handle, bunny_id, kind))
            .collect()
    }
}

impl WorldEngine {
    /// Replaces whatever task the bunny had with a fresh one for its kind.
    pub(crate) fn start_behavior(&mut self, bunny_id: &str, now_ms: u64) {
        self.cancel_behavior(bunny_id);
        let Some(bunny) = self.world.bunny_mut(bunny_id) else {
            return;
        };
        bunny.behavior_handle = self.scheduler.spawn(bunny_id, bunny.behavior, now_ms);
    }

    pub(crate) fn cancel_behavior(&mut self, bunny_id: &str) {
        let Some(bunny) = self.world.bunny_mut(bunny_id) else {
            return;
        };
        if let Some(handle) = bunny.behavior_handle.take() {
            self.scheduler.cancel(handle);
        }
    }

    pub(super) fn run_behaviors(&mut self, now_ms: u64) {
        for (handle, bunny_id, kind) in self.scheduler.take_due(now_ms) {
            if !self.scheduler.is_active(handle) {
                continue;
            }
            let Some(bunny) = self.world.bunny(&bunny_id) else {
                continue;
            };
            let direction = match kind {
                BehaviorKind::Wander => random_direction(&mut self.rng),
                BehaviorKind::Flee => {
                    away_from(bunny.actor.position(), self.world.player.actor.position())
                }
                BehaviorKind::Still => continue,
            };
            trace!(bunny = %bunny_id, ?direction, "behavior_step");
            let speed = self.config.player_speed;
            if let Some(bunny) = self.world.bunny_mut(&bunny_id) {
                bunny.actor.velocity = direction.step(speed);
            }
            self.walk(ActorRef::Bunny(bunny_id), direction, now_ms);
        }
    }
}
