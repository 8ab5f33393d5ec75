pub const TICK_MS: u64 = 100;
pub const MS_PER_SECOND: u64 = 1_000;

pub const TIEBREAK_TURN_SECONDS: u32 = 30;
pub const MAX_TIEBREAK_ROUNDS: u32 = 3;
pub const REVEAL_DELAY_MS: u64 = 300;
pub const LOW_TIME_SECONDS: u32 = 10;

pub const MIN_TIMER_SECONDS: u32 = 60;
pub const MAX_TIMER_SECONDS: u32 = 300;
pub const TIMER_STEP_SECONDS: u32 = 30;
pub const DEFAULT_TIMER_SECONDS: u32 = 60;

pub const DEFAULT_PARTICIPANT_COUNT: usize = 27;
pub const MAX_GROUP_NAME_LEN: usize = 24;

pub struct GroupPreset {
    pub name: &'static str,
    pub color: &'static str,
    pub gradient: &'static str,
}

pub const GROUP_PRESETS: [GroupPreset; 4] = [
    GroupPreset {
        name: "Tim 1",
        color: "#ef4444",
        gradient: "linear-gradient(135deg, #ef4444, #dc2626)",
    },
    GroupPreset {
        name: "Tim 2",
        color: "#3b82f6",
        gradient: "linear-gradient(135deg, #3b82f6, #2563eb)",
    },
    GroupPreset {
        name: "Tim 3",
        color: "#10b981",
        gradient: "linear-gradient(135deg, #10b981, #059669)",
    },
    GroupPreset {
        name: "Tim 4",
        color: "#8b5cf6",
        gradient: "linear-gradient(135deg, #8b5cf6, #7c3aed)",
    },
];
