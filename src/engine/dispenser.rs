use std::collections::HashSet;

use crate::rng::Rng;
use crate::types::Item;

#[derive(Clone, Debug)]
pub struct Draw {
    pub items: Vec<Item>,
    /// Every unanswered item had already been served, so skipped items came back.
    pub recycled: bool,
}

/// Builds the pool for one turn. Pure in (catalog, answered, served, rng state).
pub fn draw_pool(
    catalog: &[Item],
    answered: &HashSet<u32>,
    served: &HashSet<u32>,
    rng: &mut Rng,
) -> Draw {
    let unanswered: Vec<&Item> = catalog
        .iter()
        .filter(|item| !answered.contains(&item.id))
        .collect();
    let fresh: Vec<Item> = unanswered
        .iter()
        .filter(|item| !served.contains(&item.id))
        .map(|item| (*item).clone())
        .collect();

    let (mut items, recycled) = if fresh.is_empty() && !unanswered.is_empty() {
        (unanswered.into_iter().cloned().collect::<Vec<_>>(), true)
    } else {
        (fresh, false)
    };
    rng.shuffle(&mut items);
    Draw { items, recycled }
}

#[derive(Clone, Debug)]
pub struct DrawPool {
    items: Vec<Item>,
    position: usize,
}

impl DrawPool {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items, position: 0 }
    }

    pub fn current(&self) -> Option<&Item> {
        self.items.get(self.position)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items not yet reached, the current one included.
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.position)
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.items.len()
    }

    /// Moves past the current item. No-op once exhausted.
    pub fn advance(&mut self) -> Option<&Item> {
        if self.is_exhausted() {
            return None;
        }
        self.position += 1;
        self.current()
    }
}
