#![doc = include_str!("../readme.md")]

/// Everything you need to get started with `bevy_cling`
pub mod prelude {
    pub(crate) use {
        avian3d::prelude::*,
        bevy_app::prelude::*,
        bevy_derive::{Deref, DerefMut},
        bevy_ecs::prelude::*,
        bevy_enhanced_input::prelude::*,
        bevy_math::prelude::*,
        bevy_reflect::prelude::*,
        bevy_time::prelude::*,
        bevy_transform::prelude::*,
        bevy_utils::prelude::*,
    };

    pub use crate::{
        ClimbInputMode, ClimbPlugin, ClimbState, ClimbSystems, Climbing, SurfaceClimber,
        animation::{
            ClimbAnimation, ClimbAnimationClips, ClimbAnimationTarget, ClimbAnimationTargetOf,
            ClimbAnimator, ClimbClip,
        },
        damage::{DamageHit, DamageKind, DamageResolved, IncomingDamage},
        host::Stamina,
        input::{Climb, ClimbInput, ClimbMovement, ClimbPaused, InputSuppressed},
        probe::{SurfaceCaster, SurfaceHit},
        remote::{RemoteActor, ReplicatedClimb},
    };
}

use crate::{input::ClimbInput, prelude::*, remote::ReplicatedClimb};
use bevy_ecs::{
    intern::Interned, lifecycle::HookContext,
    relationship::RelationshipSourceCollection as _, schedule::ScheduleLabel, world::DeferredWorld,
};

pub mod animation;
mod climb;
pub mod damage;
mod fixed_update_utils;
pub mod host;
pub mod input;
pub mod probe;
pub mod remote;

/// Also requires you to add [`PhysicsPlugins`] and [`EnhancedInputPlugin`] to work properly.
/// For the custom climbing animations, the `bevy_animation` plugin and a [`ClimbAnimationClips`]
/// resource are needed as well.
pub struct ClimbPlugin {
    schedule: Interned<dyn ScheduleLabel>,
}

impl ClimbPlugin {
    /// Create a new plugin in the given schedule. The default is [`FixedPostUpdate`].
    pub fn new(schedule: impl ScheduleLabel) -> Self {
        Self {
            schedule: schedule.intern(),
        }
    }
}

impl Default for ClimbPlugin {
    fn default() -> Self {
        Self {
            schedule: FixedPostUpdate.intern(),
        }
    }
}

impl Plugin for ClimbPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            self.schedule,
            (ClimbSystems::UpdateState, ClimbSystems::Animate)
                .chain()
                .in_set(PhysicsSystems::First),
        )
        .add_plugins((
            input::plugin,
            climb::plugin(self.schedule),
            damage::plugin,
            animation::plugin(self.schedule),
            remote::plugin(self.schedule),
            fixed_update_utils::plugin,
        ));
    }
}

/// System sets used by all systems of `bevy_cling`.
#[derive(SystemSet, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ClimbSystems {
    /// Climb state machine, surface probing and movement of locally controlled climbers,
    /// plus the replicated-state mirror of remote ones.
    UpdateState,
    /// Advances climb animation sessions and writes them into the animation players.
    Animate,
}

/// How the [`Climb`] action turns into a climb request.
#[derive(Clone, Copy, Reflect, Debug, Default, PartialEq, Eq)]
pub enum ClimbInputMode {
    /// Climbing is requested exactly while the action is held.
    #[default]
    Hold,
    /// Every press flips a latch that keeps the request alive.
    Toggle,
}

/// Lets a character cling to and move along nearby walls, overhangs and ceilings.
///
/// The character is expected to be a dynamic rigid body: while climbing, its gravity is
/// switched off through [`GravityScale`] and its [`LinearVelocity`] is driven by the
/// climbing logic. All angles are in degrees, measured between world up and the surface normal.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(
    ClimbState,
    ClimbInput,
    ReplicatedClimb,
    GravityScale,
    LinearVelocity,
    AngularVelocity,
    Transform
)]
#[component(on_add = SurfaceClimber::on_add)]
pub struct SurfaceClimber {
    pub input_mode: ClimbInputMode,
    pub filter: SpatialQueryFilter,
    pub speed_up: f32,
    /// Used for climbing down and for lateral movement.
    pub speed_down: f32,
    pub detection_distance: f32,
    /// Extra sweep length on top of [`Self::detection_distance`] and [`Self::surface_target_distance`].
    pub probe_reach: f32,
    pub probe_radius: f32,
    /// Heights above the feet that probes start from, in priority order.
    pub probe_heights: Vec<f32>,
    pub min_surface_angle: f32,
    pub max_surface_angle: f32,
    pub stick_force: f32,
    pub surface_target_distance: f32,
    pub surface_repel_force: f32,
    pub repel_origin_height: f32,
    pub repel_disable_angle: f32,
    pub repel_full_strength_angle: f32,
    pub face_surface_turn_speed: f32,
    pub steep_surface_angle: f32,
    pub shallow_surface_angle: f32,
    pub steep_speed_factor: f32,
    pub shallow_speed_factor: f32,
    pub min_slope_factor: f32,
    pub max_slope_factor: f32,
    pub stamina_drain_per_second: f32,
    /// Stamina at or below this value can neither start nor sustain a climb.
    pub min_stamina: f32,
    /// Non-fall hits pushing harder than this knock the character off the surface.
    pub knockback_push_force: f32,
    pub movement_deadzone: f32,
}

impl Default for SurfaceClimber {
    fn default() -> Self {
        Self {
            input_mode: ClimbInputMode::Hold,
            filter: SpatialQueryFilter::default(),
            speed_up: 1.0,
            speed_down: 1.0,
            detection_distance: 0.6,
            probe_reach: 0.75,
            probe_radius: 0.4,
            probe_heights: vec![1.2, 0.7, 0.2],
            min_surface_angle: 10.0,
            max_surface_angle: 240.0,
            stick_force: 0.5,
            surface_target_distance: 0.18,
            surface_repel_force: 0.15,
            repel_origin_height: 1.0,
            repel_disable_angle: 25.0,
            repel_full_strength_angle: 60.0,
            face_surface_turn_speed: 10.0,
            steep_surface_angle: 90.0,
            shallow_surface_angle: 10.0,
            steep_speed_factor: 1.0,
            shallow_speed_factor: 1.4,
            min_slope_factor: 0.1,
            max_slope_factor: 3.0,
            stamina_drain_per_second: 2.0,
            min_stamina: 0.25,
            knockback_push_force: 5.0,
            movement_deadzone: 0.1,
        }
    }
}

impl SurfaceClimber {
    /// Only probe colliders on the given layers. Leave actor and trigger layers out of the mask.
    pub fn with_surface_layers(mut self, layers: impl Into<LayerMask>) -> Self {
        self.filter.mask = layers.into();
        self
    }

    pub fn with_input_mode(mut self, input_mode: ClimbInputMode) -> Self {
        self.input_mode = input_mode;
        self
    }

    /// Maximum distance a surface probe sweeps.
    pub fn probe_distance(&self) -> f32 {
        self.detection_distance + self.probe_reach
    }

    pub fn on_add(mut world: DeferredWorld, ctx: HookContext) {
        let Some(mut climber) = world.get_mut::<Self>(ctx.entity) else {
            return;
        };
        climber.filter.excluded_entities.add(ctx.entity);
    }
}

/// Per-character climbing state. Only mutated by the climbing systems.
#[derive(Component, Clone, Copy, Reflect, Debug, PartialEq)]
#[reflect(Component)]
pub struct ClimbState {
    pub climbing: bool,
    /// Outward normal of the surface being climbed. Zero until a surface was detected.
    pub surface_normal: Vec3,
    pub was_gravity_enabled: bool,
    pub saved_gravity_scale: f32,
    pub toggle_latched: bool,
}

impl Default for ClimbState {
    fn default() -> Self {
        Self {
            climbing: false,
            surface_normal: Vec3::ZERO,
            was_gravity_enabled: true,
            saved_gravity_scale: 1.0,
            toggle_latched: false,
        }
    }
}

impl ClimbState {
    pub fn is_climbing(&self) -> bool {
        self.climbing
    }

    /// Whether the character's own motion update should run this tick.
    pub fn overrides_motion(&self) -> bool {
        self.climbing
    }

    pub fn can_attack(&self) -> bool {
        !self.climbing
    }

    pub fn can_slide(&self) -> bool {
        !self.climbing
    }
}

/// Present exactly while a character is attached to a surface.
///
/// Use `Without<Climbing>` in your own movement, attack and slide systems to let climbing take over.
#[derive(Component, Clone, Copy, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct Climbing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_climbing_flag() {
        let mut state = ClimbState::default();
        assert!(state.can_attack());
        assert!(state.can_slide());
        assert!(!state.overrides_motion());

        state.climbing = true;
        assert!(!state.can_attack());
        assert!(!state.can_slide());
        assert!(state.overrides_motion());
    }

    #[test]
    fn climber_excludes_itself_from_probes() {
        let mut world = World::new();
        let entity = world.spawn(SurfaceClimber::default()).id();
        let climber = world.get::<SurfaceClimber>(entity).unwrap();
        assert!(climber.filter.excluded_entities.contains(&entity));
        assert!(world.get::<ClimbState>(entity).is_some());
    }

    #[test]
    fn probe_distance_adds_reach() {
        let climber = SurfaceClimber::default();
        assert!((climber.probe_distance() - 1.35).abs() < 1e-5);
    }
}
