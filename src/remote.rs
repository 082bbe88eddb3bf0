//! Climbing as seen by other players.
//!
//! Remote characters never run the climbing physics. The owning client writes
//! [`ReplicatedClimb`], your networking layer carries it, and this module mirrors it
//! into the climb animation so observers see the character clinging to the wall.

use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};

use crate::{animation::ClimbAnimator, prelude::*};

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(
            schedule,
            sync_remote_climbers.in_set(ClimbSystems::UpdateState),
        );
    }
}

/// The replicated part of a character's climbing state.
#[derive(Component, Clone, Copy, Reflect, Default, Debug, PartialEq)]
#[reflect(Component)]
pub struct ReplicatedClimb {
    pub climbing: bool,
    pub surface_normal: Vec3,
}

/// Marks a character that is controlled by another peer.
#[derive(Component, Clone, Copy, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct RemoteActor;

fn sync_remote_climbers(
    remotes: Query<(Entity, &ReplicatedClimb), With<RemoteActor>>,
    mut animator: ClimbAnimator,
) {
    for (entity, replicated) in &remotes {
        let animating = animator.is_active(entity);
        if replicated.climbing && !animating {
            animator.begin(entity);
        } else if !replicated.climbing && animating {
            animator.end(entity);
        }

        if replicated.climbing {
            // Input is not replicated, so hold the pose.
            animator.update(entity, 0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{ClimbAnimation, test_support::animated_world};
    use bevy_animation::graph::AnimationGraphHandle;
    use bevy_ecs::system::RunSystemOnce;

    fn sync(world: &mut World) {
        world.run_system_once(sync_remote_climbers).unwrap();
    }

    fn remote_climber(world: &mut World, actor: Entity) {
        world.entity_mut(actor).insert((
            RemoteActor,
            ReplicatedClimb {
                climbing: true,
                surface_normal: Vec3::NEG_X,
            },
        ));
    }

    #[test]
    fn mirrors_replicated_flag_into_animation() {
        let (mut world, actor, target) = animated_world();
        remote_climber(&mut world, actor);

        sync(&mut world);
        assert!(world.get::<ClimbAnimation>(actor).is_some());
        assert!(world.get::<AnimationGraphHandle>(target).is_some());

        sync(&mut world);
        let session = world.get::<ClimbAnimation>(actor).unwrap();
        assert_eq!(session.blend.speed(), 0.0);

        world.get_mut::<ReplicatedClimb>(actor).unwrap().climbing = false;
        sync(&mut world);
        assert!(world.get::<ClimbAnimation>(actor).is_none());
        assert!(world.get::<AnimationGraphHandle>(target).is_none());
    }

    #[test]
    fn local_characters_are_left_alone() {
        let (mut world, actor, _) = animated_world();
        world.entity_mut(actor).insert(ReplicatedClimb {
            climbing: true,
            ..default()
        });
        sync(&mut world);
        assert!(world.get::<ClimbAnimation>(actor).is_none());
    }

    #[test]
    fn despawned_remote_climber_releases_its_target() {
        let (mut world, actor, target) = animated_world();
        remote_climber(&mut world, actor);
        sync(&mut world);
        assert!(world.get::<AnimationGraphHandle>(target).is_some());

        world.despawn(actor);
        world.flush();
        assert!(world.get::<AnimationGraphHandle>(target).is_none());
    }
}
