use std::collections::BTreeMap;

use tracing::{debug, info};

use super::WorldEngine;
use crate::constants::{BUNNY_RADIUS, BUSH_RADIUS, ITEM_RADIUS, PLAYER_RADIUS, TREE_RADIUS};
use crate::documents::{BunnyDoc, ItemDoc, ObstacleDoc, PlayerDoc, TopPlayer, WorldDoc};
use crate::entity::{Actor, Body, Bunny, Item, Obstacle, PeerPlayer};
use crate::types::{EngineEvent, HugState, ObstacleKind, Vec2};

impl WorldEngine {
    /// Destructive replace: every shared entity is rebuilt from `doc`. Behavior
    /// tasks of the old bunnies are cancelled before the rebuild and restarted
    /// for the new sad ones. Items this session already collected stay gone
    /// while the snapshot still lists them.
    pub fn reconcile_world(&mut self, doc: &WorldDoc, now_ms: u64) {
        let old_ids: Vec<String> = self.world.bunnies.keys().cloned().collect();
        for id in &old_ids {
            self.cancel_behavior(id);
        }
        self.world.clear_shared();

        self.consumed_items
            .retain(|id| doc.items.iter().any(|item| &item.id == id));

        for entry in &doc.bunnies {
            let bunny = Bunny::new(
                entry.id.clone(),
                entry.name.clone(),
                Vec2::new(entry.x, entry.y),
                BUNNY_RADIUS,
                entry.behavior,
                entry.owner.clone(),
            );
            if bunny.is_sad() != entry.sad {
                debug!(bunny = %entry.id, "bunny_sad_flag_disagrees_with_owner");
            }
            self.world.insert_bunny(bunny);
        }
        for (entries, kind, radius) in [
            (&doc.trees, ObstacleKind::Tree, TREE_RADIUS),
            (&doc.bushes, ObstacleKind::Bush, BUSH_RADIUS),
        ] {
            for entry in entries {
                self.world.insert_obstacle(Obstacle {
                    body: Body::new(entry.id.clone(), Vec2::new(entry.x, entry.y), radius),
                    kind,
                });
            }
        }
        for entry in &doc.items {
            if self.consumed_items.contains(&entry.id) {
                continue;
            }
            self.world.insert_item(Item {
                body: Body::new(entry.id.clone(), Vec2::new(entry.x, entry.y), ITEM_RADIUS),
                message: entry.message.clone(),
            });
        }

        // a hug in flight keeps its bunny still until it resolves
        let hugged = self.hug.hugged_bunny().map(str::to_string);
        if let Some(bunny) = hugged.as_deref().and_then(|id| self.world.bunny_mut(id)) {
            bunny.in_hug = self.hug.state() == HugState::Locked;
        }
        let sad: Vec<String> = self
            .world
            .bunnies()
            .filter(|bunny| bunny.is_sad() && !bunny.in_hug)
            .map(|bunny| bunny.id().to_string())
            .collect();
        for id in &sad {
            self.start_behavior(id, now_ms);
        }

        self.world.last_updated_ms = doc.last_updated;
        self.events.push(EngineEvent::WorldRebuilt {
            bunnies: self.world.bunnies.len(),
            obstacles: self.world.obstacles.len(),
            items: self.world.items.len(),
        });
        debug!(
            bunnies = self.world.bunnies.len(),
            sad = sad.len(),
            "world_reconciled"
        );
    }

    /// Replaces the peer set with the online players in `docs`, skipping the
    /// local player.
    pub fn reconcile_peers(&mut self, docs: &[PlayerDoc]) {
        let local_id = self.world.player.id().to_string();
        let incoming: BTreeMap<&str, &PlayerDoc> = docs
            .iter()
            .filter(|doc| doc.online && doc.id != local_id)
            .map(|doc| (doc.id.as_str(), doc))
            .collect();

        let departed: Vec<String> = self
            .world
            .peers
            .keys()
            .filter(|id| !incoming.contains_key(id.as_str()))
            .cloned()
            .collect();
        for id in departed {
            self.world.peers.remove(&id);
            self.events.push(EngineEvent::PeerLeft { id });
        }

        for (id, doc) in incoming {
            let position = Vec2::new(doc.x.unwrap_or(0.0), doc.y.unwrap_or(0.0));
            let progress = doc.progress.clamp(0, 100) as u8;
            match self.world.peers.get_mut(id) {
                Some(peer) => {
                    peer.actor.body.set_position(position);
                    peer.username = doc.username.clone();
                    peer.hug_count = doc.hugs;
                    peer.progress = progress;
                    peer.play_time_ms = doc.time_played;
                }
                None => {
                    self.world.peers.insert(
                        id.to_string(),
                        PeerPlayer {
                            actor: Actor::new(id, position, PLAYER_RADIUS),
                            username: doc.username.clone(),
                            hug_count: doc.hugs,
                            progress,
                            play_time_ms: doc.time_played,
                        },
                    );
                    self.events.push(EngineEvent::PeerJoined { id: id.to_string() });
                }
            }
        }
    }

    /// Seeds the local player from its stored document. Zero or missing
    /// coordinates keep the spawn rolled at construction.
    pub fn restore_player(&mut self, doc: &PlayerDoc) {
        let player = &mut self.world.player;
        if !doc.username.is_empty() {
            player.username = doc.username.clone();
        }
        let current = player.actor.position();
        let position = Vec2::new(doc.x.unwrap_or(current.x), doc.y.unwrap_or(current.y));
        player.actor.body.set_position(position);
        player.restore_counters(doc.hugs, doc.progress);
        player.play_time_ms = doc.time_played;
        info!(
            player = %doc.id,
            hugs = doc.hugs,
            progress = player.progress(),
            "player_restored"
        );
    }

    pub fn world_doc(&self) -> WorldDoc {
        let obstacles_of = |kind: ObstacleKind| -> Vec<ObstacleDoc> {
            self.world
                .obstacles()
                .filter(|obstacle| obstacle.kind == kind)
                .map(|obstacle| ObstacleDoc {
                    id: obstacle.body.id.clone(),
                    x: obstacle.body.position().x,
                    y: obstacle.body.position().y,
                })
                .collect()
        };
        WorldDoc {
            bunnies: self
                .world
                .bunnies()
                .map(|bunny| BunnyDoc {
                    id: bunny.id().to_string(),
                    x: bunny.actor.position().x,
                    y: bunny.actor.position().y,
                    sad: bunny.is_sad(),
                    owner: bunny.owner().map(str::to_string),
                    name: bunny.name.clone(),
                    behavior: bunny.behavior,
                })
                .collect(),
            trees: obstacles_of(ObstacleKind::Tree),
            bushes: obstacles_of(ObstacleKind::Bush),
            items: self
                .world
                .items()
                .map(|item| ItemDoc {
                    id: item.body.id.clone(),
                    x: item.body.position().x,
                    y: item.body.position().y,
                    message: item.message.clone(),
                })
                .collect(),
            last_updated: self.world.last_updated_ms,
        }
    }

    pub fn player_doc(&self) -> PlayerDoc {
        let player = &self.world.player;
        PlayerDoc {
            id: player.id().to_string(),
            x: Some(player.actor.position().x),
            y: Some(player.actor.position().y),
            username: player.username.clone(),
            hugs: player.hug_count(),
            progress: player.progress() as i64,
            time_played: player.play_time_ms,
            online: true,
            last_active: player.last_active_ms,
        }
    }

    pub fn top_player(&self) -> TopPlayer {
        TopPlayer {
            username: self.world.player.username.clone(),
            time_played: self.world.player.play_time_ms,
        }
    }

    pub fn consumed_items(&self) -> impl Iterator<Item = &str> {
        self.consumed_items.iter().map(String::as_str)
    }
}
