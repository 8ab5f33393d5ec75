use std::collections::BTreeMap;

use crate::types::{GroupConfig, GroupScore, Standing};

#[derive(Clone, Debug)]
pub struct Group {
    pub name: String,
    pub color: String,
    pub gradient: String,
    pub members: Vec<String>,
    pub correct: u32,
}

#[derive(Clone, Debug)]
pub struct Scoreboard {
    groups: Vec<Group>,
}

impl Scoreboard {
    pub fn new(configs: &[GroupConfig]) -> Self {
        Self {
            groups: configs
                .iter()
                .map(|config| Group {
                    name: config.name.clone(),
                    color: config.color.clone(),
                    gradient: config.gradient.clone(),
                    members: config.members.clone(),
                    correct: 0,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn record_correct(&mut self, index: usize) {
        if let Some(group) = self.groups.get_mut(index) {
            group.correct = group.correct.saturating_add(1);
        }
    }

    pub fn scores(&self) -> Vec<u32> {
        self.groups.iter().map(|group| group.correct).collect()
    }

    /// Group indices by descending score; equal scores keep input order.
    pub fn rankings(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.groups.len()).collect();
        order.sort_by(|&a, &b| self.groups[b].correct.cmp(&self.groups[a].correct));
        order
    }

    /// Tied groups add their tiebreak extra; everyone else keeps the main score.
    pub fn finalize(&self, extras: &BTreeMap<usize, u32>) -> Vec<GroupScore> {
        self.groups
            .iter()
            .enumerate()
            .map(|(index, group)| GroupScore {
                name: group.name.clone(),
                color: group.color.clone(),
                gradient: group.gradient.clone(),
                members: group.members.clone(),
                correct: group
                    .correct
                    .saturating_add(extras.get(&index).copied().unwrap_or(0)),
            })
            .collect()
    }
}

/// Indices sharing the top score. A lone leader (or no groups) yields an empty set.
pub fn detect_ties(scores: &[u32]) -> Vec<usize> {
    let Some(max) = scores.iter().copied().max() else {
        return Vec::new();
    };
    let leaders: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score == max)
        .map(|(index, _)| index)
        .collect();
    if leaders.len() < 2 {
        return Vec::new();
    }
    leaders
}

/// Final standings with shared competition ranks (1, 1, 3, ...).
pub fn standings(results: &[GroupScore]) -> Vec<Standing> {
    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by(|&a, &b| results[b].correct.cmp(&results[a].correct));

    let mut out: Vec<Standing> = Vec::with_capacity(results.len());
    for (position, index) in order.into_iter().enumerate() {
        let entry = &results[index];
        let rank = match out.last() {
            Some(prev) if prev.correct == entry.correct => prev.rank,
            _ => position + 1,
        };
        out.push(Standing {
            rank,
            index,
            name: entry.name.clone(),
            color: entry.color.clone(),
            members: entry.members.clone(),
            correct: entry.correct,
        });
    }
    out
}
