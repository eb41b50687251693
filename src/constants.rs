pub const TICK_MS: u64 = 50;

pub const MAP_SIZE: i32 = 8_000;
pub const PLAYER_SPEED: f64 = 20.0;

pub const BUNNY_COUNT: usize = 60;
pub const TREE_COUNT: usize = 150;
pub const BUSH_COUNT: usize = 80;
pub const ITEM_COUNT: usize = 5;
pub const HUG_GOAL: u32 = 15;

pub const PLAYER_RADIUS: f64 = 20.0;
pub const BUNNY_RADIUS: f64 = 30.0;
pub const TREE_RADIUS: f64 = 40.0;
pub const BUSH_RADIUS: f64 = 30.0;
pub const ITEM_RADIUS: f64 = 20.0;

pub const STEER_INTERVAL_MS: u64 = 150;
pub const STEER_DEAD_ZONE: f64 = 20.0;
pub const WANDER_INTERVAL_MS: u64 = 2_000;
pub const FLEE_INTERVAL_MS: u64 = 1_000;
pub const MAX_TASK_CATCH_UP: usize = 4;

pub const HUG_LOCK_MS: u64 = 1_800;
pub const HUG_COOLDOWN_MS: u64 = 800;
pub const HUG_SIDE_OFFSET: f64 = 40.0;
pub const HUG_PROGRESS: u8 = 5;
pub const ITEM_PROGRESS: u8 = 20;
pub const PROGRESS_MAX: u8 = 100;
pub const OVERLOAD_DIM_MS: u64 = 1_000;
pub const OVERLOAD_OVERLAY_MS: u64 = 4_000;

pub const HEARTBEAT_MS: u64 = 1_000;
pub const LONELY_WHISPER_CHANCE: f64 = 0.05;
pub const BLUR_WHISPER_CHANCE: f64 = 0.3;
pub const BLUR_WHISPER_DELAY_MS: u64 = 5_000;

pub const NOTIFICATION_TTL_MS: u64 = 5_000;
pub const NOTIFICATION_EXIT_MS: u64 = 500;

pub const RADAR_SLOTS: usize = 5;

pub const PLAYER_IDLE_EXPIRY_MS: u64 = 30 * 60 * 1_000;
pub const PLAYER_SWEEP_INTERVAL_MS: u64 = 60_000;

pub const DEFAULT_WORLD_ID: &str = "default_world";
pub const WORLDS_COLLECTION: &str = "worlds";
pub const PLAYERS_COLLECTION: &str = "players";
pub const STATS_COLLECTION: &str = "stats";
pub const STATS_DOC_ID: &str = "global";

pub const BUNNY_NAMES: [&str; 10] = [
    "Lost One",
    "Silent Hop",
    "Broken Tail",
    "Echo Bunny",
    "Shadow Paws",
    "Faded Hope",
    "Whisper Fur",
    "Lonely Ears",
    "Crimson Eyes",
    "Void Hopper",
];

pub const ITEM_MESSAGES: [&str; 8] = [
    "Why are you here?",
    "You can’t escape.",
    "They see you.",
    "The key is a lie.",
    "Subject failed.",
    "Run while you can.",
    "It’s too late.",
    "We’re watching.",
];

pub const REACTION_MESSAGES: [&str; 8] = [
    "Thanks...?",
    "I+U...? 💕",
    "So cute...",
    "Why are you here?",
    "You can’t leave.",
    "They’re watching.",
    "All is recorded.",
    "Find the key.",
];

pub const OVERLOAD_PHRASES: [&str; 5] = [
    "The bunnies scream in the dark...",
    "Blood stains the fluffy fur...",
    "You can’t escape the circle...",
    "Death whispers your name...",
    "The hugs were a lie...",
];

pub const HORROR_MESSAGE: &str = "You thought this was a game?";
pub const LONELY_WHISPER: &str = "Are you alone? Something’s watching...";
pub const BLUR_WHISPER: &str = "_where did you go?_";
pub const ALL_HUGGED_LABEL: &str = "All hugged...?";
