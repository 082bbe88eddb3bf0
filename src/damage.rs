//! How climbing reacts to incoming hits.
//!
//! Trigger [`IncomingDamage`] instead of applying damage directly, then apply whatever arrives
//! in [`DamageResolved`]. Falls can't hurt a character that's holding on to a wall, and a
//! strong enough push knocks it off.

use crate::{
    animation::ClimbAnimator,
    climb::{Transition, apply_transition, stop_climbing},
    prelude::*,
    remote::ReplicatedClimb,
};

pub(super) fn plugin(app: &mut App) {
    app.add_observer(intercept_damage);
}

#[derive(Clone, Copy, Reflect, Debug, Default, PartialEq, Eq)]
pub enum DamageKind {
    Fall,
    #[default]
    Other,
}

#[derive(Clone, Copy, Reflect, Debug, Default, PartialEq)]
pub struct DamageHit {
    pub kind: DamageKind,
    pub damage: f32,
    pub push_force: f32,
}

/// A hit that is about to be applied to `entity`.
#[derive(EntityEvent, Clone, Copy, Debug)]
pub struct IncomingDamage {
    pub entity: Entity,
    pub hit: DamageHit,
}

/// The hit after climbing had its say. This is what the game should apply.
#[derive(EntityEvent, Clone, Copy, Debug)]
pub struct DamageResolved {
    pub entity: Entity,
    pub hit: DamageHit,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageVerdict {
    pub hit: DamageHit,
    /// The character must let go of the surface right away.
    pub knock_off: bool,
}

pub fn filter_damage(state: &ClimbState, cfg: &SurfaceClimber, hit: DamageHit) -> DamageVerdict {
    if !state.climbing {
        return DamageVerdict {
            hit,
            knock_off: false,
        };
    }
    match hit.kind {
        DamageKind::Fall => DamageVerdict {
            hit: DamageHit {
                damage: 0.0,
                push_force: 0.0,
                ..hit
            },
            knock_off: false,
        },
        DamageKind::Other => DamageVerdict {
            hit,
            knock_off: hit.push_force > cfg.knockback_push_force,
        },
    }
}

fn intercept_damage(
    incoming: On<IncomingDamage>,
    mut climbers: Query<(
        &SurfaceClimber,
        &mut ClimbState,
        &mut GravityScale,
        &mut ReplicatedClimb,
    )>,
    mut animator: ClimbAnimator,
    mut commands: Commands,
) {
    let entity = incoming.entity;
    let mut hit = incoming.hit;
    if let Ok((cfg, mut state, mut gravity, mut replicated)) = climbers.get_mut(entity) {
        let verdict = filter_damage(&state, cfg, hit);
        hit = verdict.hit;
        if verdict.knock_off {
            stop_climbing(&mut state, &mut gravity, &mut replicated);
            apply_transition(entity, Transition::Stopped, None, &mut animator, &mut commands);
        }
    }
    commands.trigger(DamageResolved { entity, hit });
}
