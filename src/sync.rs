use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::constants::{PLAYERS_COLLECTION, STATS_COLLECTION, STATS_DOC_ID, WORLDS_COLLECTION};
use crate::documents::{Fields, PlayerDoc, TopPlayer, WorldDoc};
use crate::engine::WorldEngine;
use crate::store::{
    CollectionSubscription, DocKey, DocSubscription, Document, DocumentStore, StoreError,
};

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct SyncStats {
    pub writes: u64,
    #[serde(rename = "writeFailures")]
    pub write_failures: u64,
    #[serde(rename = "snapshotsApplied")]
    pub snapshots_applied: u64,
    #[serde(rename = "peerUpdates")]
    pub peer_updates: u64,
}

/// Bridges one session's engine and the shared document store.
///
/// Local mutations leave the engine through its outbox and are merged into
/// the store. Remote world snapshots come back through a subscription and
/// are applied as a destructive replace; the players collection is diffed
/// into the peer set. With no reachable store at connect time the session
/// runs local-only for its whole lifetime.
pub struct WorldSynchronizer {
    store: Option<Arc<dyn DocumentStore>>,
    world_key: DocKey,
    player_key: DocKey,
    stats_key: DocKey,
    world_rx: Option<DocSubscription>,
    players_rx: Option<CollectionSubscription>,
    last_top: Option<TopPlayer>,
    stats: SyncStats,
}

impl WorldSynchronizer {
    /// Probes `store` once. Failure pins the synchronizer into local mode.
    pub fn connect(store: Arc<dyn DocumentStore>, world_id: &str, session_key: &str) -> Self {
        match store.probe() {
            Ok(()) => Self::with_store(Some(store), world_id, session_key),
            Err(error) => {
                warn!(error = %error, "store_unavailable_running_local");
                Self::local(world_id, session_key)
            }
        }
    }

    pub fn local(world_id: &str, session_key: &str) -> Self {
        Self::with_store(None, world_id, session_key)
    }

    fn with_store(
        store: Option<Arc<dyn DocumentStore>>,
        world_id: &str,
        session_key: &str,
    ) -> Self {
        Self {
            store,
            world_key: DocKey::new(WORLDS_COLLECTION, world_id),
            player_key: DocKey::new(PLAYERS_COLLECTION, session_key),
            stats_key: DocKey::new(STATS_COLLECTION, STATS_DOC_ID),
            world_rx: None,
            players_rx: None,
            last_top: None,
            stats: SyncStats::default(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.store.is_none()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Loads or creates the world and player documents, subscribes to both
    /// channels and populates an empty world.
    pub fn bootstrap(&mut self, engine: &mut WorldEngine, now_ms: u64) {
        let Some(store) = self.store.clone() else {
            engine.populate(now_ms);
            // nothing to push to; drop the dirty flags
            engine.take_outbox(now_ms);
            info!("world_bootstrapped_local");
            return;
        };

        let world = match store.get(&self.world_key) {
            Ok(Some(document)) => WorldDoc::from_fields(&document.fields),
            Ok(None) => {
                let empty = WorldDoc::default();
                self.write(&self.world_key.clone(), empty.to_fields());
                empty
            }
            Err(error) => {
                warn!(key = %self.world_key, error = %error, "world_load_failed");
                WorldDoc::default()
            }
        };

        match store.get(&self.player_key) {
            Ok(Some(document)) => {
                engine.restore_player(&PlayerDoc::from_fields(&self.player_key.id, &document.fields));
            }
            Ok(None) => debug!(key = %self.player_key, "player_doc_missing_creating"),
            Err(error) => warn!(key = %self.player_key, error = %error, "player_load_failed"),
        }
        let mut player = engine.player_doc();
        player.last_active = now_ms;
        self.write(&self.player_key.clone(), player.to_fields());

        self.world_rx = subscribe(store.subscribe_doc(&self.world_key), &self.world_key);
        self.players_rx = subscribe(
            store.subscribe_collection(PLAYERS_COLLECTION),
            &self.player_key,
        );

        if world.is_unpopulated() {
            engine.populate(now_ms);
            self.flush(engine, now_ms);
        }
        self.pump(engine, now_ms);
        info!(
            world = %self.world_key,
            player = %self.player_key,
            bunnies = engine.world().bunnies().count(),
            "world_bootstrapped"
        );
    }

    /// Applies whatever the subscriptions delivered since the last call.
    /// Only the newest world snapshot is rebuilt from; earlier ones would be
    /// replaced by it anyway. Returns the number of deliveries drained.
    pub fn pump(&mut self, engine: &mut WorldEngine, now_ms: u64) -> usize {
        let mut drained = 0;

        let mut latest_world: Option<Document> = None;
        if let Some(rx) = self.world_rx.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(Some(document)) => {
                        drained += 1;
                        latest_world = Some(document);
                    }
                    Ok(None) => {
                        drained += 1;
                        debug!(key = %self.world_key, "world_doc_deleted_remotely");
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        warn!(key = %self.world_key, "world_subscription_closed");
                        self.world_rx = None;
                        break;
                    }
                }
            }
        }
        if let Some(document) = latest_world {
            engine.reconcile_world(&WorldDoc::from_fields(&document.fields), now_ms);
            self.stats.snapshots_applied += 1;
        }

        let mut latest_players: Option<Vec<Document>> = None;
        if let Some(rx) = self.players_rx.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(documents) => {
                        drained += 1;
                        latest_players = Some(documents);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        warn!("players_subscription_closed");
                        self.players_rx = None;
                        break;
                    }
                }
            }
        }
        if let Some(documents) = latest_players {
            let players: Vec<PlayerDoc> = documents
                .iter()
                .map(|document| PlayerDoc::from_fields(&document.key.id, &document.fields))
                .collect();
            engine.reconcile_peers(&players);
            self.stats.peer_updates += 1;
            self.update_top_player(engine, &players);
        }

        drained
    }

    /// Pushes the engine's pending documents. A no-op in local mode.
    pub fn flush(&mut self, engine: &mut WorldEngine, now_ms: u64) {
        let outbox = engine.take_outbox(now_ms);
        if self.store.is_none() {
            return;
        }
        if let Some(world) = outbox.world {
            self.write(&self.world_key.clone(), world.to_fields());
        }
        if let Some(player) = outbox.player {
            self.write(&self.player_key.clone(), player.to_fields());
        }
    }

    /// Marks the player offline and cancels every task the engine runs.
    pub fn shutdown(&mut self, engine: &mut WorldEngine, now_ms: u64) {
        engine.teardown();
        self.flush(engine, now_ms);
        let mut fields = Fields::new();
        fields.insert("online".to_string(), Value::Bool(false));
        fields.insert("lastActive".to_string(), json!(now_ms));
        self.write(&self.player_key.clone(), fields);
        self.world_rx = None;
        self.players_rx = None;
        info!(player = %self.player_key, "session_closed");
    }

    fn update_top_player(&mut self, engine: &WorldEngine, players: &[PlayerDoc]) {
        let local = engine.top_player();
        let local_id = engine.player().id();
        let mut top = local;
        for player in players.iter().filter(|player| player.id != local_id) {
            if player.time_played > top.time_played {
                top = TopPlayer {
                    username: player.username.clone(),
                    time_played: player.time_played,
                };
            }
        }
        if self.last_top.as_ref() == Some(&top) {
            return;
        }
        self.write(&self.stats_key.clone(), top.to_fields());
        self.last_top = Some(top);
    }

    fn write(&mut self, key: &DocKey, fields: Fields) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match store.set_merge(key, fields) {
            Ok(()) => self.stats.writes += 1,
            Err(error) => {
                self.stats.write_failures += 1;
                warn!(key = %key, error = %error, "store_write_failed");
            }
        }
    }
}

fn subscribe<T>(result: Result<T, StoreError>, key: &DocKey) -> Option<T> {
    match result {
        Ok(rx) => Some(rx),
        Err(error) => {
            warn!(key = %key, error = %error, "store_subscribe_failed");
            None
        }
    }
}

/// Deletes player documents whose `lastActive` is older than `max_idle_ms`.
pub fn expire_inactive_players(
    store: &dyn DocumentStore,
    now_ms: u64,
    max_idle_ms: u64,
) -> Result<usize, StoreError> {
    let mut removed = 0;
    for document in store.list(PLAYERS_COLLECTION)? {
        let player = PlayerDoc::from_fields(&document.key.id, &document.fields);
        if player.last_active.saturating_add(max_idle_ms) < now_ms {
            store.delete(&document.key)?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, "inactive_players_expired");
    }
    Ok(removed)
}
