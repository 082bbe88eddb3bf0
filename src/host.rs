//! Character resources owned by the game rather than by climbing.

use crate::prelude::*;

/// The character's stamina pool. Climbing only ever spends it; regeneration is up to the game.
///
/// Characters without this component climb for free.
#[derive(Component, Clone, Copy, Reflect, Debug, PartialEq)]
#[reflect(Component)]
pub struct Stamina {
    pub current: f32,
    pub max: f32,
}

impl Default for Stamina {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl Stamina {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn with_current(mut self, current: f32) -> Self {
        self.current = current.clamp(0.0, self.max);
        self
    }

    /// Spend up to `amount`, never dropping below zero.
    pub fn use_stamina(&mut self, amount: f32) {
        self.current = (self.current - amount.max(0.0)).max(0.0);
    }

    pub fn exceeds(&self, threshold: f32) -> bool {
        self.current > threshold
    }
}
