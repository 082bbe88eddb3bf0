use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};
use tracing::{debug, trace, warn};

use crate::{
    animation::ClimbAnimator,
    host::Stamina,
    input::{ClimbInput, ClimbPaused, InputSuppressed},
    prelude::*,
    probe::{SurfaceCaster, SurfaceCasters, detect_surface, surface_angle},
    remote::{RemoteActor, ReplicatedClimb},
};

/// Below this squared length a surface-plane direction counts as degenerate.
const MIN_DIRECTION_LENGTH_SQUARED: f32 = 0.01;
/// Forward input above this plays the up/down clip; below it, lateral input takes over.
const ANIMATION_FORWARD_DEADZONE: f32 = 0.05;
const IDLE_STAMINA_FACTOR: f32 = 0.1;

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(schedule, run_climbers.in_set(ClimbSystems::UpdateState))
            .add_observer(cleanup_climber);
    }
}

/// The parts of a character the climbing logic writes to.
pub(crate) struct ClimberBody<'a> {
    pub(crate) transform: &'a mut Transform,
    pub(crate) gravity: &'a mut GravityScale,
    pub(crate) linear_velocity: &'a mut LinearVelocity,
    pub(crate) angular_velocity: &'a mut AngularVelocity,
    pub(crate) replicated: &'a mut ReplicatedClimb,
    pub(crate) stamina: Option<&'a mut Stamina>,
}

#[derive(Debug)]
struct Ctx<'a> {
    cfg: &'a SurfaceClimber,
    wants_climb: bool,
    /// Lateral (`x`) and forward (`y`) input.
    movement: Vec2,
    dt: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Transition {
    Started,
    Stopped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct TickOutcome {
    transition: Option<Transition>,
    /// Signed animation input and speed multiplier, present while climbing.
    animation: Option<(f32, f32)>,
}

type ClimberData = (
    Entity,
    &'static SurfaceClimber,
    &'static mut ClimbState,
    &'static mut ClimbInput,
    &'static mut Transform,
    &'static mut GravityScale,
    &'static mut LinearVelocity,
    &'static mut AngularVelocity,
    &'static mut ReplicatedClimb,
    Option<&'static mut Stamina>,
    Has<RigidBody>,
    Has<InputSuppressed>,
);

/// Climbers simulated on this peer.
type LocalClimbers = (Without<RemoteActor>, Without<ClimbPaused>);

fn run_climbers(
    mut climbers: Query<ClimberData, LocalClimbers>,
    spatial_query: SpatialQuery,
    time: Res<Time>,
    mut animator: ClimbAnimator,
    mut commands: Commands,
) {
    step_climbers(
        &mut climbers,
        &spatial_query,
        time.delta_secs(),
        &mut animator,
        &mut commands,
    );
}

fn step_climbers(
    climbers: &mut Query<ClimberData, LocalClimbers>,
    casters: &impl SurfaceCasters,
    dt: f32,
    animator: &mut ClimbAnimator,
    commands: &mut Commands,
) {
    for (
        entity,
        cfg,
        mut state,
        mut input,
        mut transform,
        mut gravity,
        mut linear_velocity,
        mut angular_velocity,
        mut replicated,
        mut stamina,
        has_body,
        input_suppressed,
    ) in climbers.iter_mut()
    {
        let ctx = Ctx {
            cfg,
            wants_climb: wants_to_climb(cfg, &mut state, &mut input, !input_suppressed),
            movement: input.axes(),
            dt,
        };
        let caster = casters.for_climber(cfg);
        let mut body = ClimberBody {
            transform: &mut transform,
            gravity: &mut gravity,
            linear_velocity: &mut linear_velocity,
            angular_velocity: &mut angular_velocity,
            replicated: &mut replicated,
            stamina: stamina.as_deref_mut(),
        };

        let outcome = tick_climber(&mut state, &mut body, &caster, &ctx);

        if outcome.transition == Some(Transition::Started) && !has_body {
            warn!("{entity} started climbing without a RigidBody, velocity and gravity changes have no effect");
        }
        match outcome.transition {
            Some(transition) => {
                apply_transition(entity, transition, outcome.animation, animator, commands);
            }
            None => {
                if let Some((animation_input, speed_multiplier)) = outcome.animation {
                    animator.update(entity, animation_input, speed_multiplier);
                }
            }
        }
    }
}

/// Turn this tick's input into a climb request, maintaining the toggle latch.
///
/// A press is consumed by the first tick that sees it, so a frame running several fixed
/// ticks flips the latch only once.
pub(crate) fn wants_to_climb(
    cfg: &SurfaceClimber,
    state: &mut ClimbState,
    input: &mut ClimbInput,
    takes_input: bool,
) -> bool {
    if !takes_input {
        return state.toggle_latched;
    }
    match cfg.input_mode {
        ClimbInputMode::Toggle => {
            if input.climb_pressed {
                state.toggle_latched = !state.toggle_latched;
                input.climb_pressed = false;
            }
            state.toggle_latched
        }
        ClimbInputMode::Hold => {
            if !input.climb_held {
                state.toggle_latched = false;
            }
            input.climb_held
        }
    }
}

fn tick_climber(
    state: &mut ClimbState,
    body: &mut ClimberBody,
    caster: &impl SurfaceCaster,
    ctx: &Ctx,
) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    let position = body.transform.translation;
    let rotation = body.transform.rotation;

    if !state.climbing {
        if ctx.wants_climb
            && has_climb_stamina(body, ctx.cfg)
            && let Some(hit) = detect_surface(caster, position, rotation, Vec3::ZERO, ctx.cfg)
        {
            start_climbing(state, hit.normal, body);
            outcome.transition = Some(Transition::Started);
        }
    } else if !ctx.wants_climb || !has_climb_stamina(body, ctx.cfg) {
        stop_climbing(state, body.gravity, body.replicated);
        outcome.transition = Some(Transition::Stopped);
    } else if let Some(hit) =
        detect_surface(caster, position, rotation, state.surface_normal, ctx.cfg)
    {
        state.surface_normal = hit.normal;
        body.replicated.surface_normal = hit.normal;
    } else {
        trace!("lost the climbing surface");
        stop_climbing(state, body.gravity, body.replicated);
        outcome.transition = Some(Transition::Stopped);
    }

    if state.climbing {
        outcome.animation = Some(climb_move(state, body, caster, ctx));
    }
    outcome
}

fn has_climb_stamina(body: &ClimberBody, cfg: &SurfaceClimber) -> bool {
    body.stamina
        .as_deref()
        .is_none_or(|stamina| stamina.exceeds(cfg.min_stamina))
}

pub(crate) fn start_climbing(state: &mut ClimbState, normal: Vec3, body: &mut ClimberBody) {
    state.climbing = true;
    state.surface_normal = normal;
    state.was_gravity_enabled = body.gravity.0 != 0.0;
    state.saved_gravity_scale = body.gravity.0;

    body.replicated.climbing = true;
    body.replicated.surface_normal = normal;
    body.gravity.0 = 0.0;
    body.linear_velocity.0 = Vec3::ZERO;
    body.angular_velocity.0 = Vec3::ZERO;
}

/// Let go of the surface. Also clears the toggle latch, so a forced stop never leaves a
/// toggled climb waiting to re-trigger.
pub(crate) fn stop_climbing(
    state: &mut ClimbState,
    gravity: &mut GravityScale,
    replicated: &mut ReplicatedClimb,
) {
    state.climbing = false;
    state.toggle_latched = false;
    gravity.0 = if state.was_gravity_enabled {
        state.saved_gravity_scale
    } else {
        0.0
    };
    replicated.climbing = false;
}

/// ECS side of a state change: the [`Climbing`] marker and the animation session.
///
/// `animation` is the first tick's animation input and speed multiplier, if any.
pub(crate) fn apply_transition(
    entity: Entity,
    transition: Transition,
    animation: Option<(f32, f32)>,
    animator: &mut ClimbAnimator,
    commands: &mut Commands,
) {
    match transition {
        Transition::Started => {
            debug!("{entity} started climbing");
            commands.entity(entity).insert(Climbing);
            let (input, speed_multiplier) = animation.unwrap_or((0.0, 1.0));
            animator.begin_with(entity, input, speed_multiplier);
        }
        Transition::Stopped => {
            debug!("{entity} stopped climbing");
            commands.entity(entity).try_remove::<Climbing>();
            animator.end(entity);
        }
    }
}

/// Move along the surface for one tick. Returns the animation input and speed multiplier.
fn climb_move(
    state: &ClimbState,
    body: &mut ClimberBody,
    caster: &impl SurfaceCaster,
    ctx: &Ctx,
) -> (f32, f32) {
    let normal = if state.surface_normal != Vec3::ZERO {
        state.surface_normal
    } else {
        -*body.transform.forward()
    };
    let slope_factor = slope_speed_factor(normal, ctx.cfg);

    let mut velocity = surface_velocity(normal, slope_factor, body.transform, ctx);
    velocity += surface_repulsion(normal, body.transform.translation, caster, ctx.cfg);
    validate_velocity(&mut velocity);
    body.linear_velocity.0 = velocity;

    align_with_surface(
        body.transform,
        normal,
        ctx.dt * ctx.cfg.face_surface_turn_speed,
    );

    if let Some(stamina) = body.stamina.as_deref_mut() {
        let drain = ctx.cfg.stamina_drain_per_second;
        if drain > 0.0 {
            stamina.use_stamina(stamina_drain_factor(ctx.movement) * drain * ctx.dt);
        }
    }

    (animation_input(ctx.movement), slope_factor)
}

/// Input velocity along the surface plus the inward stick force.
fn surface_velocity(normal: Vec3, slope_factor: f32, transform: &Transform, ctx: &Ctx) -> Vec3 {
    let Vec2 {
        x: lateral_input,
        y: forward_input,
    } = ctx.movement;
    let climb_direction = resolve_climb_direction(normal, transform);
    let lateral_direction = resolve_lateral_direction(normal, climb_direction);

    let mut velocity = Vec3::ZERO;
    if forward_input.abs() > ctx.cfg.movement_deadzone
        && climb_direction.length_squared() > MIN_DIRECTION_LENGTH_SQUARED
    {
        let speed = if forward_input > 0.0 {
            ctx.cfg.speed_up
        } else {
            ctx.cfg.speed_down
        };
        velocity += climb_direction * speed * forward_input * slope_factor;
    }
    if lateral_input.abs() > ctx.cfg.movement_deadzone
        && lateral_direction.length_squared() > MIN_DIRECTION_LENGTH_SQUARED
    {
        velocity += lateral_direction * ctx.cfg.speed_down * lateral_input;
    }

    velocity + -normal.normalize_or_zero() * ctx.cfg.stick_force
}

/// "Up" along the surface. Never zero, even on ceilings and floors.
pub(crate) fn resolve_climb_direction(normal: Vec3, transform: &Transform) -> Vec3 {
    let mut direction = Vec3::Y.reject_from(normal);
    if direction.length_squared() < MIN_DIRECTION_LENGTH_SQUARED {
        direction = transform.forward().reject_from(normal);
    }
    if direction.length_squared() < MIN_DIRECTION_LENGTH_SQUARED {
        direction = normal.cross(*transform.right());
    }
    if direction.length_squared() > MIN_DIRECTION_LENGTH_SQUARED {
        direction.normalize()
    } else {
        Vec3::NEG_Z
    }
}

/// "Right" along the surface, as seen by a character facing into it.
pub(crate) fn resolve_lateral_direction(normal: Vec3, climb_direction: Vec3) -> Vec3 {
    let mut lateral = climb_direction.cross(normal);
    if lateral.length_squared() < MIN_DIRECTION_LENGTH_SQUARED {
        lateral = Vec3::Y.cross(normal);
    }
    if lateral.length_squared() > MIN_DIRECTION_LENGTH_SQUARED {
        lateral.normalize()
    } else {
        Vec3::ZERO
    }
}

/// Steep walls climb at the steep factor, gentle slopes approach the shallow factor.
pub(crate) fn slope_speed_factor(normal: Vec3, cfg: &SurfaceClimber) -> f32 {
    let t = unlerp(
        cfg.steep_surface_angle,
        cfg.shallow_surface_angle,
        surface_angle(normal),
    );
    lerp(cfg.steep_speed_factor, cfg.shallow_speed_factor, t)
        .clamp(cfg.min_slope_factor, cfg.max_slope_factor)
}

/// How strongly the character is pushed out of a surface, from 0 on gentle slopes to 1 on
/// near-vertical and overhanging ones.
pub(crate) fn repel_scale(normal: Vec3, cfg: &SurfaceClimber) -> f32 {
    unlerp(
        cfg.repel_disable_angle,
        cfg.repel_full_strength_angle,
        surface_angle(normal),
    )
}

/// Outward push when the character is closer to the surface than the target distance.
pub(crate) fn surface_repulsion(
    normal: Vec3,
    position: Vec3,
    caster: &impl SurfaceCaster,
    cfg: &SurfaceClimber,
) -> Vec3 {
    let scale = repel_scale(normal, cfg);
    if scale <= 0.001 {
        return Vec3::ZERO;
    }
    let Ok(into_surface) = Dir3::new(-normal) else {
        return Vec3::ZERO;
    };
    let origin = position + Vec3::Y * cfg.repel_origin_height;
    let max_distance = cfg.surface_target_distance + cfg.probe_reach;
    let Some(hit) = caster.cast_ray(origin, into_surface, max_distance) else {
        return Vec3::ZERO;
    };
    let penetration = cfg.surface_target_distance - hit.distance;
    if penetration <= 0.0 {
        return Vec3::ZERO;
    }
    -*into_surface * (cfg.surface_repel_force * penetration * scale)
}

/// Rotation that faces into the surface.
pub(crate) fn surface_facing_rotation(normal: Vec3) -> Option<Quat> {
    let forward = (-normal).try_normalize()?;
    // Looking straight up or down, world up can't serve as the up reference.
    let reference_up = if forward.dot(Vec3::Y).abs() > 0.95 {
        Vec3::NEG_Z
    } else {
        Vec3::Y
    };
    let mut right = forward.cross(reference_up);
    if right.length_squared() < 1e-4 {
        right = forward.cross(Vec3::X);
    }
    let right = right.normalize();
    let up = right.cross(forward).normalize();
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, -forward)))
}

fn align_with_surface(transform: &mut Transform, normal: Vec3, t: f32) {
    let Some(target) = surface_facing_rotation(normal) else {
        return;
    };
    transform.rotation = transform.rotation.slerp(target, t.clamp(0.0, 1.0));
}

/// Fraction of the full stamina drain: a trickle while hanging still, ramping up with movement.
pub(crate) fn stamina_drain_factor(movement: Vec2) -> f32 {
    let amount = movement.x.abs().max(movement.y.abs()).clamp(0.0, 1.0);
    if amount <= 0.05 {
        IDLE_STAMINA_FACTOR
    } else {
        lerp(0.5, 1.0, amount)
    }
}

/// Sideways crawling keeps the climb animation running.
pub(crate) fn animation_input(movement: Vec2) -> f32 {
    if movement.y.abs() > ANIMATION_FORWARD_DEADZONE {
        movement.y
    } else if movement.x.abs() > 0.1 {
        movement.x.abs()
    } else {
        0.0
    }
}

fn validate_velocity(velocity: &mut Vec3) {
    for i in 0..3 {
        if !velocity[i].is_finite() {
            warn!("climb velocity[{i}] is not finite: {}, setting to 0", velocity[i]);
            velocity[i] = 0.0;
        }
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Where `value` lies between `a` and `b`, clamped to `[0, 1]`.
fn unlerp(a: f32, b: f32, value: f32) -> f32 {
    if a == b {
        return 0.0;
    }
    ((value - a) / (b - a)).clamp(0.0, 1.0)
}

fn cleanup_climber(
    remove: On<Remove, SurfaceClimber>,
    mut climbers: Query<(&mut ClimbState, &mut GravityScale, &mut ReplicatedClimb)>,
    mut animator: ClimbAnimator,
    mut commands: Commands,
) {
    if let Ok((mut state, mut gravity, mut replicated)) = climbers.get_mut(remove.entity)
        && state.climbing
    {
        stop_climbing(&mut state, &mut gravity, &mut replicated);
    }
    animator.end(remove.entity);
    if let Ok(mut entity) = commands.get_entity(remove.entity) {
        entity.try_remove::<(ClimbState, Climbing)>();
    }
}
