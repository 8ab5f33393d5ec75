use std::collections::BTreeMap;

use crate::constants::MAX_TIEBREAK_ROUNDS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Leaders are still tied and another round is allowed.
    Again,
    Resolved,
}

/// Sudden-death state among tied groups. Extras are keyed by original scoreboard index.
#[derive(Clone, Debug)]
pub struct TiebreakContext {
    tied: Vec<usize>,
    position: usize,
    extra: BTreeMap<usize, u32>,
    round: u32,
    /// Extra from the last round each group played. Only this is merged into final scores.
    settled: BTreeMap<usize, u32>,
}

impl TiebreakContext {
    pub fn start(tied: Vec<usize>) -> Option<Self> {
        if tied.len() < 2 {
            return None;
        }
        Some(Self {
            tied,
            position: 0,
            extra: BTreeMap::new(),
            round: 1,
            settled: BTreeMap::new(),
        })
    }

    pub fn tied(&self) -> &[usize] {
        &self.tied
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current_group(&self) -> Option<usize> {
        self.tied.get(self.position).copied()
    }

    pub fn extra(&self) -> &BTreeMap<usize, u32> {
        &self.extra
    }

    pub fn extra_for(&self, group: usize) -> u32 {
        self.extra.get(&group).copied().unwrap_or(0)
    }

    pub fn record_correct(&mut self, group: usize) {
        if !self.tied.contains(&group) {
            return;
        }
        *self.extra.entry(group).or_insert(0) += 1;
    }

    /// Moves to the next tied group. False once every tied group has played this round.
    pub fn next_slot(&mut self) -> bool {
        if self.position + 1 < self.tied.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    pub fn close_round(&mut self) -> RoundOutcome {
        for group in &self.tied {
            self.extra.entry(*group).or_insert(0);
        }
        let max = self
            .tied
            .iter()
            .map(|group| self.extra_for(*group))
            .max()
            .unwrap_or(0);
        let leaders: Vec<usize> = self
            .tied
            .iter()
            .copied()
            .filter(|group| self.extra_for(*group) == max)
            .collect();

        for (group, extra) in &self.extra {
            self.settled.insert(*group, *extra);
        }

        if leaders.len() > 1 && self.round < MAX_TIEBREAK_ROUNDS {
            self.tied = leaders;
            self.extra.clear();
            self.position = 0;
            self.round += 1;
            return RoundOutcome::Again;
        }
        RoundOutcome::Resolved
    }

    pub fn final_extras(&self) -> &BTreeMap<usize, u32> {
        &self.settled
    }
}
