use crate::catalog::shuffled;
use crate::constants::{DEFAULT_PARTICIPANT_COUNT, DEFAULT_TIMER_SECONDS, GROUP_PRESETS};
use crate::error::ConfigError;
use crate::rng::Rng;
use crate::server_utils::{normalize_timer_seconds, sanitize_group_name};
use crate::types::{GameConfig, GroupConfig};

pub fn validate_config(config: &GameConfig) -> Result<(), ConfigError> {
    if config.groups.is_empty() {
        return Err(ConfigError::NoGroups);
    }
    if config.timer_seconds == 0 {
        return Err(ConfigError::InvalidTimer(config.timer_seconds));
    }
    Ok(())
}

pub fn parse_config(raw: serde_json::Value) -> Result<GameConfig, ConfigError> {
    let config: GameConfig =
        serde_json::from_value(raw).map_err(|error| ConfigError::Malformed(error.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn default_participants() -> Vec<String> {
    (1..=DEFAULT_PARTICIPANT_COUNT)
        .map(|idx| format!("Peserta {idx}"))
        .collect()
}

/// Shuffles participants and deals them round-robin into the preset groups.
pub fn divide_into_groups(participants: &[String], rng: &mut Rng) -> Vec<GroupConfig> {
    let mut groups: Vec<GroupConfig> = GROUP_PRESETS
        .iter()
        .map(|preset| GroupConfig {
            name: preset.name.to_string(),
            color: preset.color.to_string(),
            gradient: preset.gradient.to_string(),
            members: Vec::new(),
        })
        .collect();
    let count = groups.len();
    for (index, name) in shuffled(participants, rng).into_iter().enumerate() {
        groups[index % count].members.push(name);
    }
    groups
}

pub fn build_config(
    participants: &[String],
    timer_seconds: Option<i64>,
    rng: &mut Rng,
) -> GameConfig {
    let participants: Vec<String> = participants
        .iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    let participants = if participants.is_empty() {
        default_participants()
    } else {
        participants
    };
    GameConfig {
        groups: divide_into_groups(&participants, rng),
        timer_seconds: normalize_timer_seconds(timer_seconds).unwrap_or(DEFAULT_TIMER_SECONDS),
    }
}

/// Trims group names and drops blank member names before a config is saved.
pub fn sanitize_config(config: GameConfig) -> GameConfig {
    GameConfig {
        groups: config
            .groups
            .into_iter()
            .enumerate()
            .map(|(index, group)| GroupConfig {
                name: sanitize_group_name(&group.name, index),
                color: group.color.trim().to_string(),
                gradient: group.gradient,
                members: group
                    .members
                    .into_iter()
                    .map(|member| member.trim().to_string())
                    .filter(|member| !member.is_empty())
                    .collect(),
            })
            .collect(),
        timer_seconds: config.timer_seconds,
    }
}
