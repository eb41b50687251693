use std::collections::BTreeMap;

use crate::constants::PROGRESS_MAX;
use crate::engine::TaskHandle;
use crate::types::{AnimationFrame, BehaviorKind, Direction, ObstacleKind, Vec2};

/// Attributes shared by every placeable object.
///
/// The collision radius is fixed at construction and `z_order` always tracks
/// `position.y`.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub id: String,
    position: Vec2,
    radius: f64,
    z_order: f64,
}

impl Body {
    pub fn new(id: impl Into<String>, position: Vec2, radius: f64) -> Self {
        Self {
            id: id.into(),
            position,
            radius,
            z_order: position.y,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn z_order(&self) -> f64 {
        self.z_order
    }

    pub(crate) fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.z_order = position.y;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Actor {
    pub body: Body,
    pub velocity: Vec2,
    pub facing: Direction,
    pub paused: bool,
    pub frame: AnimationFrame,
}

impl Actor {
    pub fn new(id: impl Into<String>, position: Vec2, radius: f64) -> Self {
        Self {
            body: Body::new(id, position, radius),
            velocity: Vec2::ZERO,
            facing: Direction::Down,
            paused: false,
            frame: AnimationFrame::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.body.id
    }

    pub fn position(&self) -> Vec2 {
        self.body.position()
    }

    pub(crate) fn face(&mut self, facing: Direction) {
        self.facing = facing;
        self.frame = self.frame.toggled();
    }

    pub(crate) fn stop(&mut self) {
        self.frame = AnimationFrame::Idle;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bunny {
    pub actor: Actor,
    pub name: String,
    pub behavior: BehaviorKind,
    sad: bool,
    owner: Option<String>,
    pub(crate) behavior_handle: Option<TaskHandle>,
    pub(crate) in_hug: bool,
}

impl Bunny {
    /// A bunny without an owner is sad; one with an owner has been hugged.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        position: Vec2,
        radius: f64,
        behavior: BehaviorKind,
        owner: Option<String>,
    ) -> Self {
        Self {
            actor: Actor::new(id, position, radius),
            name: name.into(),
            behavior,
            sad: owner.is_none(),
            owner,
            behavior_handle: None,
            in_hug: false,
        }
    }

    pub fn id(&self) -> &str {
        self.actor.id()
    }

    pub fn is_sad(&self) -> bool {
        self.sad
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn behavior_handle(&self) -> Option<TaskHandle> {
        self.behavior_handle
    }

    pub(crate) fn mark_hugged(&mut self, owner: &str) {
        self.sad = false;
        self.owner = Some(owner.to_string());
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Player {
    pub actor: Actor,
    pub username: String,
    hug_count: u32,
    progress: u8,
    pub play_time_ms: u64,
    pub last_active_ms: u64,
    pub(crate) hidden: bool,
}

impl Player {
    pub fn new(id: impl Into<String>, username: impl Into<String>, position: Vec2, radius: f64) -> Self {
        Self {
            actor: Actor::new(id, position, radius),
            username: username.into(),
            hug_count: 0,
            progress: 0,
            play_time_ms: 0,
            last_active_ms: 0,
            hidden: false,
        }
    }

    pub fn id(&self) -> &str {
        self.actor.id()
    }

    pub fn hug_count(&self) -> u32 {
        self.hug_count
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Saturating add; returns true only when this call crossed into the cap.
    pub(crate) fn add_progress(&mut self, amount: u8) -> bool {
        let before = self.progress;
        self.progress = before.saturating_add(amount).min(PROGRESS_MAX);
        before < PROGRESS_MAX && self.progress >= PROGRESS_MAX
    }

    pub(crate) fn record_hug(&mut self) {
        self.hug_count = self.hug_count.saturating_add(1);
    }

    pub(crate) fn reset_progress(&mut self) {
        self.progress = 0;
        self.hug_count = 0;
    }

    pub(crate) fn restore_counters(&mut self, hug_count: u32, progress: i64) {
        self.hug_count = hug_count;
        self.progress = progress.clamp(0, PROGRESS_MAX as i64) as u8;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PeerPlayer {
    pub actor: Actor,
    pub username: String,
    pub hug_count: u32,
    pub progress: u8,
    pub play_time_ms: u64,
}

impl PeerPlayer {
    pub fn label(&self) -> String {
        format!("{} ({} hugs)", self.username, self.hug_count)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Obstacle {
    pub body: Body,
    pub kind: ObstacleKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub body: Body,
    pub message: String,
}

/// Everything one session knows about the world. Shared categories are keyed
/// by id, which keeps ids unique within each category.
#[derive(Clone, Debug)]
pub struct WorldState {
    pub player: Player,
    pub(crate) bunnies: BTreeMap<String, Bunny>,
    pub(crate) obstacles: BTreeMap<String, Obstacle>,
    pub(crate) items: BTreeMap<String, Item>,
    pub(crate) peers: BTreeMap<String, PeerPlayer>,
    pub last_updated_ms: u64,
}

impl WorldState {
    pub fn new(player: Player) -> Self {
        Self {
            player,
            bunnies: BTreeMap::new(),
            obstacles: BTreeMap::new(),
            items: BTreeMap::new(),
            peers: BTreeMap::new(),
            last_updated_ms: 0,
        }
    }

    pub fn bunnies(&self) -> impl Iterator<Item = &Bunny> {
        self.bunnies.values()
    }

    pub fn bunny(&self, id: &str) -> Option<&Bunny> {
        self.bunnies.get(id)
    }

    pub fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerPlayer> {
        self.peers.values()
    }

    pub fn sad_bunny_count(&self) -> usize {
        self.bunnies.values().filter(|bunny| bunny.is_sad()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.bunnies.is_empty() && self.obstacles.is_empty() && self.items.is_empty()
    }

    /// Bodies that can block a mover: bunnies, obstacles, items and peers.
    /// The local player is not part of this set.
    pub fn blockers(&self) -> impl Iterator<Item = &Body> {
        self.bunnies
            .values()
            .map(|bunny| &bunny.actor.body)
            .chain(self.obstacles.values().map(|obstacle| &obstacle.body))
            .chain(self.items.values().map(|item| &item.body))
            .chain(self.peers.values().map(|peer| &peer.actor.body))
    }

    pub(crate) fn insert_bunny(&mut self, bunny: Bunny) {
        self.bunnies.insert(bunny.id().to_string(), bunny);
    }

    pub(crate) fn insert_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.insert(obstacle.body.id.clone(), obstacle);
    }

    pub(crate) fn insert_item(&mut self, item: Item) {
        self.items.insert(item.body.id.clone(), item);
    }

    pub(crate) fn bunny_mut(&mut self, id: &str) -> Option<&mut Bunny> {
        self.bunnies.get_mut(id)
    }

    pub(crate) fn take_item(&mut self, id: &str) -> Option<Item> {
        self.items.remove(id)
    }

    pub(crate) fn clear_shared(&mut self) {
        self.bunnies.clear();
        self.obstacles.clear();
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_a_body_recomputes_z_order() {
        let mut body = Body::new("tree-1", Vec2::new(3.0, 9.0), 40.0);
        assert_eq!(body.z_order(), 9.0);
        body.set_position(Vec2::new(3.0, -12.0));
        assert_eq!(body.z_order(), -12.0);
        assert_eq!(body.radius(), 40.0);
    }

    #[test]
    fn bunny_sadness_follows_owner() {
        let mut bunny = Bunny::new("bunny-1", "Lost One", Vec2::ZERO, 30.0, BehaviorKind::Wander, None);
        assert!(bunny.is_sad());
        assert_eq!(bunny.owner(), None);

        bunny.mark_hugged("p1");
        assert!(!bunny.is_sad());
        assert_eq!(bunny.owner(), Some("p1"));

        let hugged = Bunny::new(
            "bunny-2",
            "Echo Bunny",
            Vec2::ZERO,
            30.0,
            BehaviorKind::Still,
            Some("p2".to_string()),
        );
        assert!(!hugged.is_sad());
    }

    #[test]
    fn progress_saturates_and_reports_crossing_once() {
        let mut player = Player::new("p1", "Subject_p1", Vec2::ZERO, 20.0);
        player.restore_counters(3, 95);
        assert!(player.add_progress(5));
        assert_eq!(player.progress(), 100);
        assert!(!player.add_progress(20));
        assert_eq!(player.progress(), 100);

        player.reset_progress();
        assert_eq!(player.progress(), 0);
        assert_eq!(player.hug_count(), 0);
        assert!(!player.add_progress(20));
    }

    #[test]
    fn restored_progress_is_clamped() {
        let mut player = Player::new("p1", "Subject_p1", Vec2::ZERO, 20.0);
        player.restore_counters(2, 250);
        assert_eq!(player.progress(), 100);
        player.restore_counters(2, -5);
        assert_eq!(player.progress(), 0);
    }

    #[test]
    fn blockers_cover_every_shared_category_but_not_the_player() {
        let mut world = WorldState::new(Player::new("p1", "Subject_p1", Vec2::ZERO, 20.0));
        world.insert_bunny(Bunny::new("bunny-1", "Lost One", Vec2::ZERO, 30.0, BehaviorKind::Still, None));
        world.insert_obstacle(Obstacle {
            body: Body::new("tree-1", Vec2::ZERO, 40.0),
            kind: ObstacleKind::Tree,
        });
        world.insert_item(Item {
            body: Body::new("item-1", Vec2::ZERO, 20.0),
            message: "They see you.".to_string(),
        });
        world.peers.insert(
            "p2".to_string(),
            PeerPlayer {
                actor: Actor::new("p2", Vec2::ZERO, 20.0),
                username: "Subject_p2".to_string(),
                hug_count: 0,
                progress: 0,
                play_time_ms: 0,
            },
        );

        let ids: Vec<&str> = world.blockers().map(|body| body.id.as_str()).collect();
        assert_eq!(ids, vec!["bunny-1", "tree-1", "item-1", "p2"]);
    }
}
