//! Two-clip climbing animation.
//!
//! An "up" and a "down" clip are mounted under a blend node on the character's
//! [`AnimationPlayer`]. Only one of them ever has weight: switching direction is a hard
//! cross-fade that restarts the new clip from its first frame, and playback speed follows
//! how hard the character is climbing.

use bevy_animation::{
    AnimationClip, AnimationPlayer,
    graph::{AnimationGraph, AnimationGraphHandle, AnimationNodeIndex},
};
use bevy_asset::{Assets, Handle};
use bevy_ecs::{intern::Interned, schedule::ScheduleLabel, system::SystemParam};
use tracing::{debug, warn};

use crate::prelude::*;

/// Inputs at or below this magnitude pause the animation.
const PAUSE_DEADZONE: f32 = 0.05;
const MIN_SPEED_MULTIPLIER: f32 = 0.01;
const MIN_PLAYBACK_SPEED: f32 = 0.25;

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(PostStartup, report_missing_clips)
            .add_systems(schedule, animate_climbers.in_set(ClimbSystems::Animate))
            .add_observer(unmount_climb_animation);
    }
}

/// The clips used while climbing, provided by whatever loads your assets.
///
/// If either clip is missing, climbing still works, just without the custom animation.
#[derive(Resource, Clone, Debug, Default)]
pub struct ClimbAnimationClips {
    pub up: Option<Handle<AnimationClip>>,
    pub down: Option<Handle<AnimationClip>>,
}

impl ClimbAnimationClips {
    pub fn new(up: Handle<AnimationClip>, down: Handle<AnimationClip>) -> Self {
        Self {
            up: Some(up),
            down: Some(down),
        }
    }

    pub fn clips(&self) -> Option<(&Handle<AnimationClip>, &Handle<AnimationClip>)> {
        self.up.as_ref().zip(self.down.as_ref())
    }

    pub fn is_available(&self) -> bool {
        self.clips().is_some()
    }
}

/// Put this on the entity holding the [`AnimationPlayer`] that animates a climber.
#[derive(Component, Clone, Copy, Debug)]
#[relationship(relationship_target = ClimbAnimationTarget)]
pub struct ClimbAnimationTargetOf(pub Entity);

#[derive(Component, Clone, Copy, Debug)]
#[relationship_target(relationship = ClimbAnimationTargetOf)]
pub struct ClimbAnimationTarget(Entity);

impl ClimbAnimationTarget {
    pub fn get(self) -> Entity {
        self.0
    }
}

#[derive(Clone, Copy, Reflect, Debug, Default, PartialEq, Eq)]
pub enum ClimbClip {
    #[default]
    Up,
    Down,
}

/// Playback state of one clip in the blend.
#[derive(Clone, Copy, Reflect, Debug, Default, PartialEq)]
pub struct ClipTrack {
    pub weight: f32,
    pub speed: f32,
    /// Local play position in seconds.
    pub time: f32,
    #[reflect(ignore)]
    restarted: bool,
}

/// The blend between the up and down clips.
#[derive(Clone, Copy, Reflect, Debug, PartialEq)]
pub struct ClimbBlend {
    pub direction: ClimbClip,
    pub up: ClipTrack,
    pub down: ClipTrack,
}

impl Default for ClimbBlend {
    fn default() -> Self {
        Self {
            direction: ClimbClip::Up,
            up: ClipTrack {
                weight: 1.0,
                ..default()
            },
            down: ClipTrack::default(),
        }
    }
}

impl ClimbBlend {
    /// Drive the blend with a signed climb input. Positive plays the up clip.
    pub fn update(&mut self, input: f32, speed_multiplier: f32) {
        if input.abs() <= PAUSE_DEADZONE {
            self.up.speed = 0.0;
            self.down.speed = 0.0;
            return;
        }

        let direction = if input > 0.0 {
            ClimbClip::Up
        } else {
            ClimbClip::Down
        };
        let speed =
            (input.abs() * speed_multiplier.max(MIN_SPEED_MULTIPLIER)).max(MIN_PLAYBACK_SPEED);
        let switched = direction != self.direction;

        let (active, idle) = match direction {
            ClimbClip::Up => (&mut self.up, &mut self.down),
            ClimbClip::Down => (&mut self.down, &mut self.up),
        };
        if switched {
            active.time = 0.0;
            active.restarted = true;
        }
        active.weight = 1.0;
        active.speed = speed;
        idle.weight = 0.0;
        idle.speed = 0.0;
        self.direction = direction;
    }

    pub fn advance(&mut self, dt: f32) {
        self.up.time += self.up.speed * dt;
        self.down.time += self.down.speed * dt;
    }

    pub fn track(&self, clip: ClimbClip) -> &ClipTrack {
        match clip {
            ClimbClip::Up => &self.up,
            ClimbClip::Down => &self.down,
        }
    }

    /// Playback speed of the active clip. Zero while paused.
    pub fn speed(&self) -> f32 {
        self.track(self.direction).speed
    }
}

/// A mounted climb animation. Exists from [`ClimbAnimator::begin`] until [`ClimbAnimator::end`].
///
/// Removing it, or despawning the actor, hands the target its previous graph and playback back.
#[derive(Component, Clone)]
pub struct ClimbAnimation {
    pub blend: ClimbBlend,
    target: Entity,
    graph: Handle<AnimationGraph>,
    previous_graph: Option<Handle<AnimationGraph>>,
    previous_player: AnimationPlayer,
    up_node: AnimationNodeIndex,
    down_node: AnimationNodeIndex,
}

impl ClimbAnimation {
    /// The entity whose [`AnimationPlayer`] plays this animation.
    pub fn target(&self) -> Entity {
        self.target
    }

    pub fn graph(&self) -> &Handle<AnimationGraph> {
        &self.graph
    }
}

/// Mounts, drives and unmounts climb animations.
#[derive(SystemParam)]
pub struct ClimbAnimator<'w, 's> {
    clips: Option<Res<'w, ClimbAnimationClips>>,
    graphs: Option<ResMut<'w, Assets<AnimationGraph>>>,
    sessions: Query<'w, 's, &'static mut ClimbAnimation>,
    targets: Query<'w, 's, &'static ClimbAnimationTarget>,
    players: Query<'w, 's, (&'static mut AnimationPlayer, Option<&'static AnimationGraphHandle>)>,
    commands: Commands<'w, 's>,
}

impl ClimbAnimator<'_, '_> {
    /// Whether the custom animation can play at all.
    pub fn is_enabled(&self) -> bool {
        self.graphs.is_some() && self.clips.as_ref().is_some_and(|clips| clips.is_available())
    }

    pub fn is_active(&self, actor: Entity) -> bool {
        self.sessions.contains(actor)
    }

    /// Mount the climb animation on the actor's animation target. Does nothing if it is
    /// already mounted or the animation is unavailable.
    pub fn begin(&mut self, actor: Entity) {
        self.begin_with(actor, 0.0, 1.0);
    }

    /// Like [`Self::begin`], with the blend already driven by the first tick's input.
    pub fn begin_with(&mut self, actor: Entity, input: f32, speed_multiplier: f32) {
        let Some((up, down)) = self.clips.as_deref().and_then(ClimbAnimationClips::clips) else {
            return;
        };
        let Some(graphs) = self.graphs.as_mut() else {
            return;
        };
        if self.sessions.contains(actor) {
            return;
        }
        let Ok(target) = self.targets.get(actor) else {
            debug!("{actor} has no climb animation target, skipping climb animation");
            return;
        };
        let target = target.get();
        let Ok((mut player, previous_graph)) = self.players.get_mut(target) else {
            warn!("Climb animation target {target} of {actor} has no AnimationPlayer");
            return;
        };

        let mut graph = AnimationGraph::new();
        let blend_node = graph.add_blend(1.0, graph.root);
        let up_node = graph.add_clip(up.clone(), 1.0, blend_node);
        let down_node = graph.add_clip(down.clone(), 1.0, blend_node);
        let graph = graphs.add(graph);

        let mut blend = ClimbBlend::default();
        blend.update(input, speed_multiplier);

        // Active animations are keyed by node index, so the old graph's entries must go.
        let previous_player = player.clone();
        player.stop_all();
        for (node, track) in [(up_node, &blend.up), (down_node, &blend.down)] {
            player
                .play(node)
                .repeat()
                .set_weight(track.weight)
                .set_speed(track.speed);
        }

        self.commands
            .entity(target)
            .insert(AnimationGraphHandle(graph.clone()));
        self.commands.entity(actor).insert(ClimbAnimation {
            blend,
            target,
            graph,
            previous_graph: previous_graph.map(|handle| handle.0.clone()),
            previous_player,
            up_node,
            down_node,
        });
    }

    pub fn update(&mut self, actor: Entity, input: f32, speed_multiplier: f32) {
        if let Ok(mut session) = self.sessions.get_mut(actor) {
            session.blend.update(input, speed_multiplier);
        }
    }

    /// Unmount the climb animation. Does nothing if none is mounted.
    pub fn end(&mut self, actor: Entity) {
        if self.sessions.contains(actor) {
            self.commands.entity(actor).try_remove::<ClimbAnimation>();
        }
    }
}

fn unmount_climb_animation(
    remove: On<Remove, ClimbAnimation>,
    sessions: Query<&ClimbAnimation>,
    mut players: Query<&mut AnimationPlayer>,
    mut commands: Commands,
) {
    let Ok(session) = sessions.get(remove.entity) else {
        return;
    };
    if let Ok(mut player) = players.get_mut(session.target) {
        *player = session.previous_player.clone();
    }
    let Ok(mut target) = commands.get_entity(session.target) else {
        return;
    };
    match &session.previous_graph {
        Some(previous) => {
            target.try_insert(AnimationGraphHandle(previous.clone()));
        }
        None => {
            target.try_remove::<AnimationGraphHandle>();
        }
    }
}

fn report_missing_clips(clips: Option<Res<ClimbAnimationClips>>) {
    if !clips.is_some_and(|clips| clips.is_available()) {
        warn!("Climbing animation clips were not loaded. Default animations will be used instead.");
    }
}

fn animate_climbers(
    time: Res<Time>,
    mut sessions: Query<&mut ClimbAnimation>,
    mut players: Query<&mut AnimationPlayer>,
) {
    for mut session in &mut sessions {
        let session = &mut *session;
        session.blend.advance(time.delta_secs());
        let Ok(mut player) = players.get_mut(session.target) else {
            continue;
        };

        for (node, track) in [
            (session.up_node, &mut session.blend.up),
            (session.down_node, &mut session.blend.down),
        ] {
            if !player.is_playing_animation(node) {
                player.play(node).repeat();
            }
            let Some(animation) = player.animation_mut(node) else {
                continue;
            };
            animation.set_weight(track.weight).set_speed(track.speed);
            if track.restarted {
                animation.seek_to(0.0);
                track.restarted = false;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A world with both clips loaded, an empty actor and its animation target.
    pub(crate) fn animated_world() -> (World, Entity, Entity) {
        let mut world = World::new();
        world.add_observer(unmount_climb_animation);
        world.init_resource::<Assets<AnimationGraph>>();
        world.init_resource::<Assets<AnimationClip>>();
        let (up, down) = {
            let mut clips = world.resource_mut::<Assets<AnimationClip>>();
            (
                clips.add(AnimationClip::default()),
                clips.add(AnimationClip::default()),
            )
        };
        world.insert_resource(ClimbAnimationClips::new(up, down));
        let actor = world.spawn_empty().id();
        let target = world
            .spawn((AnimationPlayer::default(), ClimbAnimationTargetOf(actor)))
            .id();
        (world, actor, target)
    }
}

#[cfg(test)]
mod tests {
    use super::{test_support::animated_world, *};
    use bevy_animation::RepeatAnimation;
    use bevy_ecs::system::RunSystemOnce;

    #[test]
    fn starts_on_up_clip_at_time_zero() {
        let blend = ClimbBlend::default();
        assert_eq!(blend.direction, ClimbClip::Up);
        assert_eq!(blend.up.weight, 1.0);
        assert_eq!(blend.down.weight, 0.0);
        assert_eq!(blend.up.time, 0.0);
        assert_eq!(blend.speed(), 0.0);
    }

    #[test]
    fn direction_switch_restarts_new_clip() {
        let mut blend = ClimbBlend::default();
        blend.update(1.0, 1.0);
        blend.advance(0.5);
        blend.update(1.0, 1.0);
        blend.advance(0.5);
        assert!(blend.up.time > 0.0);

        blend.update(-0.8, 1.0);
        assert_eq!(blend.direction, ClimbClip::Down);
        assert_eq!(blend.down.time, 0.0);
        assert!(blend.down.restarted);
        assert_eq!(blend.down.weight, 1.0);
        assert!((blend.down.speed - 0.8).abs() < 1e-6);
        assert_eq!(blend.up.weight, 0.0);
        assert_eq!(blend.up.speed, 0.0);
    }

    #[test]
    fn same_direction_keeps_play_position() {
        let mut blend = ClimbBlend::default();
        blend.update(1.0, 1.0);
        blend.advance(0.25);
        blend.update(0.5, 1.0);
        assert!((blend.up.time - 0.25).abs() < 1e-6);
        assert!(!blend.up.restarted);
    }

    #[test]
    fn deadzone_pauses_without_unmounting() {
        let mut blend = ClimbBlend::default();
        blend.update(-1.0, 1.0);
        blend.update(0.05, 1.0);
        assert_eq!(blend.direction, ClimbClip::Down);
        assert_eq!(blend.down.weight, 1.0);
        assert_eq!(blend.down.speed, 0.0);
        assert_eq!(blend.up.speed, 0.0);
    }

    #[test]
    fn playback_speed_never_stalls() {
        let mut blend = ClimbBlend::default();
        blend.update(0.06, 0.0);
        assert!((blend.speed() - MIN_PLAYBACK_SPEED).abs() < 1e-6);

        blend.update(1.0, -3.0);
        assert!((blend.speed() - MIN_PLAYBACK_SPEED).abs() < 1e-6);

        blend.update(1.0, 1.4);
        assert!((blend.speed() - 1.4).abs() < 1e-6);
    }

    fn begin(world: &mut World, actor: Entity) {
        world
            .run_system_once(move |mut animator: ClimbAnimator| animator.begin(actor))
            .unwrap();
    }

    fn end(world: &mut World, actor: Entity) {
        world
            .run_system_once(move |mut animator: ClimbAnimator| animator.end(actor))
            .unwrap();
    }

    #[test]
    fn begin_is_idempotent() {
        let (mut world, actor, target) = animated_world();
        begin(&mut world, actor);
        let graph = world.get::<ClimbAnimation>(actor).unwrap().graph().clone();
        begin(&mut world, actor);

        let sessions = world.query::<&ClimbAnimation>().iter(&world).count();
        assert_eq!(sessions, 1);
        assert_eq!(world.get::<ClimbAnimation>(actor).unwrap().graph(), &graph);
        assert_eq!(world.get::<AnimationGraphHandle>(target).unwrap().0, graph);
    }

    #[test]
    fn end_without_session_is_noop() {
        let (mut world, actor, target) = animated_world();
        end(&mut world, actor);
        end(&mut world, actor);
        assert!(world.get::<ClimbAnimation>(actor).is_none());
        assert!(world.get::<AnimationPlayer>(target).is_some());
    }

    #[test]
    fn end_then_begin_starts_fresh() {
        let (mut world, actor, target) = animated_world();
        begin(&mut world, actor);
        {
            let mut session = world.get_mut::<ClimbAnimation>(actor).unwrap();
            session.blend.update(-1.0, 1.0);
            session.blend.advance(0.3);
        }
        end(&mut world, actor);
        assert!(world.get::<ClimbAnimation>(actor).is_none());
        assert!(world.get::<AnimationGraphHandle>(target).is_none());

        begin(&mut world, actor);
        let session = world.get::<ClimbAnimation>(actor).unwrap();
        assert_eq!(session.blend, ClimbBlend::default());
        assert_eq!(session.target(), target);
    }

    #[test]
    fn end_restores_previous_graph() {
        let (mut world, actor, target) = animated_world();
        let previous = world
            .resource_mut::<Assets<AnimationGraph>>()
            .add(AnimationGraph::new());
        world
            .entity_mut(target)
            .insert(AnimationGraphHandle(previous.clone()));

        begin(&mut world, actor);
        assert_ne!(world.get::<AnimationGraphHandle>(target).unwrap().0, previous);
        end(&mut world, actor);
        assert_eq!(world.get::<AnimationGraphHandle>(target).unwrap().0, previous);
    }

    #[test]
    fn missing_clips_disable_animation() {
        let (mut world, actor, _) = animated_world();
        let clips = ClimbAnimationClips {
            down: None,
            ..world.resource::<ClimbAnimationClips>().clone()
        };
        world.insert_resource(clips);
        begin(&mut world, actor);
        assert!(world.get::<ClimbAnimation>(actor).is_none());
        let enabled = world
            .run_system_once(|animator: ClimbAnimator| animator.is_enabled())
            .unwrap();
        assert!(!enabled);
    }

    #[test]
    fn actor_without_target_gets_no_session() {
        let (mut world, _, _) = animated_world();
        let lonely = world.spawn_empty().id();
        begin(&mut world, lonely);
        assert!(world.get::<ClimbAnimation>(lonely).is_none());
    }

    #[test]
    fn mounting_takes_over_host_playback() {
        let (mut world, actor, target) = animated_world();
        let host_node = AnimationNodeIndex::new(2);
        world
            .get_mut::<AnimationPlayer>(target)
            .unwrap()
            .play(host_node)
            .seek_to(1.5);

        begin(&mut world, actor);
        let session = world.get::<ClimbAnimation>(actor).unwrap();
        let (up_node, down_node) = (session.up_node, session.down_node);
        assert_eq!(up_node, host_node);
        let player = world.get::<AnimationPlayer>(target).unwrap();
        let up = player.animation(up_node).unwrap();
        assert_eq!(up.seek_time(), 0.0);
        assert_eq!(up.repeat_mode(), RepeatAnimation::Forever);
        assert_eq!(up.weight(), 1.0);
        let down = player.animation(down_node).unwrap();
        assert_eq!(down.repeat_mode(), RepeatAnimation::Forever);
        assert_eq!(down.weight(), 0.0);

        end(&mut world, actor);
        let player = world.get::<AnimationPlayer>(target).unwrap();
        let restored = player.animation(host_node).unwrap();
        assert_eq!(restored.seek_time(), 1.5);
        assert_eq!(restored.repeat_mode(), RepeatAnimation::Never);
        assert!(player.animation(down_node).is_none());
    }

    #[test]
    fn first_input_drives_the_fresh_session() {
        let (mut world, actor, target) = animated_world();
        world
            .run_system_once(move |mut animator: ClimbAnimator| {
                animator.begin_with(actor, -1.0, 1.0);
            })
            .unwrap();

        let session = world.get::<ClimbAnimation>(actor).unwrap();
        assert_eq!(session.blend.direction, ClimbClip::Down);
        assert!((session.blend.speed() - 1.0).abs() < 1e-6);
        let down_node = session.down_node;
        let player = world.get::<AnimationPlayer>(target).unwrap();
        assert_eq!(player.animation(down_node).unwrap().weight(), 1.0);
        assert!((player.animation(down_node).unwrap().speed() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn despawning_the_actor_unmounts() {
        let (mut world, actor, target) = animated_world();
        begin(&mut world, actor);
        assert!(world.get::<AnimationGraphHandle>(target).is_some());

        world.despawn(actor);
        world.flush();
        assert!(world.get::<AnimationGraphHandle>(target).is_none());
        assert!(world.get::<AnimationPlayer>(target).is_some());
    }
}
