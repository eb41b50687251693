use tracing::info;

use super::utils::random_position;
use super::WorldEngine;
use crate::constants::{
    BUNNY_NAMES, BUNNY_RADIUS, BUSH_RADIUS, ITEM_MESSAGES, ITEM_RADIUS, TREE_RADIUS,
};
use crate::entity::{Body, Bunny, Item, Obstacle};
use crate::types::{BehaviorKind, ObstacleKind, PlayMode};

impl WorldEngine {
    /// Fills an empty world from the session's seeded generator. Positions
    /// are uniform over the map and may overlap.
    pub fn populate(&mut self, now_ms: u64) {
        for _ in 0..self.config.bunny_count {
            self.spawn_bunny(now_ms);
        }
        for _ in 0..self.config.tree_count {
            self.spawn_obstacle(ObstacleKind::Tree);
        }
        for _ in 0..self.config.bush_count {
            self.spawn_obstacle(ObstacleKind::Bush);
        }
        for _ in 0..self.config.item_count {
            self.spawn_item();
        }
        self.world_dirty = true;
        info!(
            bunnies = self.world.bunnies.len(),
            obstacles = self.world.obstacles.len(),
            items = self.world.items.len(),
            "world_populated"
        );
    }

    /// Sad, unowned bunny with a random name and behavior. In solo play its
    /// behavior task starts right away.
    pub(super) fn spawn_bunny(&mut self, now_ms: u64) -> String {
        let id = next_free_id("bunny", self.world.bunnies.len(), |id| {
            self.world.bunny(id).is_some()
        });
        let position = random_position(&mut self.rng, self.config.map_half_size());
        let name = self.rng.pick(&BUNNY_NAMES).to_string();
        let behavior = BehaviorKind::ALL[self.rng.pick_index(BehaviorKind::ALL.len())];
        self.world.insert_bunny(Bunny::new(
            id.clone(),
            name,
            position,
            BUNNY_RADIUS,
            behavior,
            None,
        ));
        if self.mode == PlayMode::Solo {
            self.start_behavior(&id, now_ms);
        }
        id
    }

    pub(super) fn spawn_obstacle(&mut self, kind: ObstacleKind) -> String {
        let id = next_free_id(kind.id_prefix(), self.world.obstacles.len(), |id| {
            self.world.obstacles.contains_key(id)
        });
        let position = random_position(&mut self.rng, self.config.map_half_size());
        let radius = match kind {
            ObstacleKind::Tree => TREE_RADIUS,
            ObstacleKind::Bush => BUSH_RADIUS,
        };
        self.world.insert_obstacle(Obstacle {
            body: Body::new(id.clone(), position, radius),
            kind,
        });
        id
    }

    pub(super) fn spawn_item(&mut self) -> String {
        let id = next_free_id("item", self.world.items.len(), |id| {
            self.world.item(id).is_some() || self.consumed_items.contains(id)
        });
        let position = random_position(&mut self.rng, self.config.map_half_size());
        let message = self.rng.pick(&ITEM_MESSAGES).to_string();
        self.world.insert_item(Item {
            body: Body::new(id.clone(), position, ITEM_RADIUS),
            message,
        });
        id
    }
}

/// `{prefix}-{count + 1}`, bumped past ids that are already taken.
fn next_free_id(prefix: &str, count: usize, taken: impl Fn(&str) -> bool) -> String {
    let mut n = count + 1;
    loop {
        let id = format!("{prefix}-{n}");
        if !taken(&id) {
            return id;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::engine::{EngineOptions, WorldEngine};

    fn small_config() -> WorldConfig {
        WorldConfig {
            bunny_count: 6,
            tree_count: 4,
            bush_count: 3,
            item_count: 2,
            ..WorldConfig::default()
        }
    }

    fn engine(mode: PlayMode, seed: u32) -> WorldEngine {
        WorldEngine::new(small_config(), "abcde12345", EngineOptions { mode, seed })
    }

    #[test]
    fn populate_creates_configured_counts() {
        let mut engine = engine(PlayMode::Solo, 7);
        engine.populate(0);
        let world = engine.world();
        assert_eq!(world.bunnies().count(), 6);
        assert_eq!(world.obstacles().count(), 7);
        assert_eq!(world.items().count(), 2);
        assert_eq!(world.sad_bunny_count(), 6);

        let trees = world
            .obstacles()
            .filter(|obstacle| obstacle.kind == ObstacleKind::Tree)
            .count();
        assert_eq!(trees, 4);
        assert!(world.obstacles().any(|obstacle| obstacle.body.id == "bush-5"));
    }

    #[test]
    fn positions_stay_on_the_map() {
        let mut engine = engine(PlayMode::Solo, 99);
        engine.populate(0);
        let half = engine.config.map_half_size() as f64;
        for body in engine.world().blockers() {
            assert!(body.position().x > -half && body.position().x <= half);
            assert!(body.position().y > -half && body.position().y <= half);
        }
    }

    #[test]
    fn same_seed_builds_the_same_world() {
        let mut a = engine(PlayMode::Solo, 31);
        let mut b = engine(PlayMode::Solo, 31);
        a.populate(0);
        b.populate(0);
        assert_eq!(a.world_doc(), b.world_doc());
    }

    #[test]
    fn only_solo_sessions_start_tasks_on_spawn() {
        let mut solo = engine(PlayMode::Solo, 3);
        solo.populate(0);
        let moving = solo
            .world()
            .bunnies()
            .filter(|bunny| bunny.behavior != BehaviorKind::Still)
            .count();
        assert_eq!(solo.scheduler().active_tasks(), moving);

        let mut coop = engine(PlayMode::Coop, 3);
        coop.populate(0);
        assert_eq!(coop.scheduler().active_tasks(), 0);
    }

    #[test]
    fn ids_skip_over_taken_slots() {
        let id = next_free_id("bunny", 1, |id| id == "bunny-2" || id == "bunny-3");
        assert_eq!(id, "bunny-4");
    }
}
