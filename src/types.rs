use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u32,
    pub name: String,
    pub image: String,
    pub category: String,
    #[serde(rename = "tabooWords", default)]
    pub taboo_words: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub gradient: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub groups: Vec<GroupConfig>,
    #[serde(rename = "timerSeconds")]
    pub timer_seconds: u32,
}

/// One row of the results document, in the groups' input order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupScore {
    pub name: String,
    pub color: String,
    pub gradient: String,
    pub members: Vec<String>,
    pub correct: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Correct,
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEndReason {
    TimeUp,
    OutOfItems,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    Ready {
        group: usize,
    },
    Playing {
        group: usize,
    },
    Summary {
        group: usize,
        correct: u32,
        reason: TurnEndReason,
    },
    TiebreakAnnounce {
        round: u32,
    },
    TiebreakReady {
        slot: usize,
        group: usize,
    },
    TiebreakPlaying {
        slot: usize,
        group: usize,
    },
    TiebreakSummary {
        slot: usize,
        group: usize,
        correct: u32,
        reason: TurnEndReason,
    },
    GameOver,
}

impl Phase {
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing { .. } | Self::TiebreakPlaying { .. })
    }

    pub fn is_tiebreak(&self) -> bool {
        matches!(
            self,
            Self::TiebreakAnnounce { .. }
                | Self::TiebreakReady { .. }
                | Self::TiebreakPlaying { .. }
                | Self::TiebreakSummary { .. }
        )
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FlashView {
    pub kind: FlashKind,
    pub item: Item,
    pub generation: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnView {
    pub group: usize,
    #[serde(rename = "remainingSeconds")]
    pub remaining_seconds: u32,
    #[serde(rename = "totalSeconds")]
    pub total_seconds: u32,
    pub correct: u32,
    /// `mm:ss` rendering of `remaining_seconds`.
    pub clock: String,
    pub paused: bool,
    #[serde(rename = "lowTime")]
    pub low_time: bool,
    #[serde(rename = "itemsLeft")]
    pub items_left: usize,
    /// Hidden while paused or while a guess flash is still showing the previous item.
    pub item: Option<Item>,
    pub flash: Option<FlashView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TiebreakView {
    pub round: u32,
    pub tied: Vec<usize>,
    pub position: usize,
    pub extra: Vec<(usize, u32)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScoreView {
    pub index: usize,
    pub name: String,
    pub color: String,
    pub correct: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    TurnStarted {
        group: usize,
        #[serde(rename = "totalSeconds")]
        total_seconds: u32,
        tiebreak: bool,
    },
    Guessed {
        group: usize,
        #[serde(rename = "itemId")]
        item_id: u32,
        kind: FlashKind,
    },
    /// An item became the current one.
    ItemServed {
        group: usize,
        #[serde(rename = "itemId")]
        item_id: u32,
    },
    Paused {
        group: usize,
    },
    Resumed {
        group: usize,
    },
    TurnEnded {
        group: usize,
        correct: u32,
        reason: TurnEndReason,
    },
    TiebreakStarted {
        round: u32,
        tied: Vec<usize>,
    },
    SessionComplete {
        results: Vec<GroupScore>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    #[serde(rename = "groupCount")]
    pub group_count: usize,
    pub scores: Vec<ScoreView>,
    pub turn: Option<TurnView>,
    pub tiebreak: Option<TiebreakView>,
    #[serde(rename = "answeredCount")]
    pub answered_count: usize,
    #[serde(rename = "catalogSize")]
    pub catalog_size: usize,
    pub events: Vec<RuntimeEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub rank: usize,
    pub index: usize,
    pub name: String,
    pub color: String,
    pub members: Vec<String>,
    pub correct: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResultsResponse {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub standings: Vec<Standing>,
    pub winners: Vec<String>,
    #[serde(rename = "totalCorrect")]
    pub total_correct: u32,
}
