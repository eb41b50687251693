use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, step: Vec2) -> Self {
        Self {
            x: self.x + step.x,
            y: self.y + step.y,
        }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
    None,
}

impl Direction {
    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Velocity of one discrete step in this direction.
    pub fn step(self, speed: f64) -> Vec2 {
        match self {
            Self::Up => Vec2::new(0.0, -speed),
            Self::Down => Vec2::new(0.0, speed),
            Self::Left => Vec2::new(-speed, 0.0),
            Self::Right => Vec2::new(speed, 0.0),
            Self::None => Vec2::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    Wander,
    Flee,
    #[default]
    Still,
}

impl BehaviorKind {
    pub const ALL: [BehaviorKind; 3] = [Self::Wander, Self::Flee, Self::Still];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wander" => Some(Self::Wander),
            "flee" => Some(Self::Flee),
            "still" => Some(Self::Still),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    Tree,
    Bush,
}

impl ObstacleKind {
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::Tree => "tree",
            Self::Bush => "bush",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    #[default]
    Solo,
    Coop,
}

impl PlayMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "solo" => Some(Self::Solo),
            "coop" => Some(Self::Coop),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationFrame {
    #[default]
    Idle,
    StepA,
    StepB,
}

impl AnimationFrame {
    pub fn toggled(self) -> Self {
        match self {
            Self::StepA => Self::StepB,
            Self::Idle | Self::StepB => Self::StepA,
        }
    }
}

/// Which side of the bunny the player ends up on during a hug.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HugSide {
    PlayerLeft,
    PlayerRight,
}

/// Phases of the local hug. `Triggered` and `Resolving` are passed through
/// within a single step, so the engine only ever reports `Idle`, `Locked`
/// and `Cooldown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HugState {
    Idle,
    Triggered,
    Locked,
    Resolving,
    Cooldown,
}

/// Fire-and-forget notifications for the rendering and audio collaborators.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ActorMoved {
        id: String,
        x: f64,
        y: f64,
        facing: Direction,
        frame: AnimationFrame,
    },
    ActorStopped {
        id: String,
    },
    Arrived,
    HugStarted {
        #[serde(rename = "bunnyId")]
        bunny_id: String,
        side: HugSide,
    },
    HugResolved {
        #[serde(rename = "bunnyId")]
        bunny_id: String,
        message: String,
    },
    ReactionCleared {
        #[serde(rename = "bunnyId")]
        bunny_id: String,
    },
    ItemCollected {
        #[serde(rename = "itemId")]
        item_id: String,
        message: String,
    },
    OverloadDimmed,
    OverloadRevealed {
        phrase: String,
    },
    OverloadCleared,
    HorrorTriggered {
        username: String,
    },
    WorldRebuilt {
        bunnies: usize,
        obstacles: usize,
        items: usize,
    },
    PeerJoined {
        id: String,
    },
    PeerLeft {
        id: String,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub id: String,
    pub username: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "zOrder")]
    pub z_order: f64,
    pub facing: Direction,
    pub frame: AnimationFrame,
    pub paused: bool,
    pub hidden: bool,
    pub hugs: u32,
    pub progress: u8,
    #[serde(rename = "timePlayed")]
    pub time_played_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct BunnyView {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "zOrder")]
    pub z_order: f64,
    pub facing: Direction,
    pub frame: AnimationFrame,
    pub sad: bool,
    pub hugging: bool,
    pub owner: Option<String>,
    pub behavior: BehaviorKind,
}

#[derive(Clone, Debug, Serialize)]
pub struct ObstacleView {
    pub id: String,
    pub kind: ObstacleKind,
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ItemView {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PeerView {
    pub id: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub progress: u8,
    #[serde(rename = "timePlayed")]
    pub time_played_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSlot {
    Primary,
    Secondary,
}

#[derive(Clone, Debug, Serialize)]
pub struct NotificationView {
    pub id: u64,
    pub message: String,
    pub slot: NotificationSlot,
    /// Position within the secondary stack; zero for the primary slot.
    pub depth: usize,
    pub leaving: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RadarEntry {
    #[serde(rename = "bunnyId")]
    pub bunny_id: String,
    pub distance: i64,
    #[serde(rename = "angleDeg")]
    pub angle_deg: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorldView {
    #[serde(rename = "nowMs")]
    pub now_ms: u64,
    pub player: PlayerView,
    pub bunnies: Vec<BunnyView>,
    pub obstacles: Vec<ObstacleView>,
    pub items: Vec<ItemView>,
    pub peers: Vec<PeerView>,
    #[serde(rename = "hugState")]
    pub hug_state: HugState,
    #[serde(rename = "sadIndicator")]
    pub sad_indicator: String,
    #[serde(rename = "onlinePlayers")]
    pub online_players: usize,
    pub radar: Vec<RadarEntry>,
    pub notifications: Vec<NotificationView>,
    pub events: Vec<EngineEvent>,
}
