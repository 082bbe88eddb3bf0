use avian3d::prelude::*;
use bevy::prelude::*;
use bevy_cling::prelude::*;
use bevy_enhanced_input::prelude::*;

fn main() -> AppExit {
    App::new()
        .add_plugins((
            DefaultPlugins,
            PhysicsPlugins::default(),
            EnhancedInputPlugin,
            ClimbPlugin::default(),
        ))
        .add_input_context::<PlayerInput>()
        .add_systems(Startup, setup)
        .add_systems(Update, regenerate_stamina)
        .add_observer(apply_damage)
        .run()
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Spawn the player. Climbing drives a dynamic body through its velocity and gravity scale.
    commands.spawn((
        SurfaceClimber::default(),
        Stamina::new(20.0),
        RigidBody::Dynamic,
        Collider::capsule(0.4, 1.0),
        LockedAxes::ROTATION_LOCKED,
        Mesh3d(meshes.add(Capsule3d::new(0.4, 1.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.8, 0.5, 0.3))),
        Transform::from_xyz(0.0, 1.0, 1.5),
        PlayerInput,
        actions!(PlayerInput[
            (
                Action::<ClimbMovement>::new(),
                DeadZone::default(),
                Bindings::spawn((
                    Cardinal::wasd_keys(),
                    Axial::left_stick()
                ))
            ),
            (
                Action::<Climb>::new(),
                bindings![KeyCode::Space, GamepadButton::South],
            ),
        ]),
    ));

    // The wall to climb
    commands.spawn((
        RigidBody::Static,
        Collider::cuboid(8.0, 6.0, 0.5),
        Mesh3d(meshes.add(Cuboid::new(8.0, 6.0, 0.5))),
        MeshMaterial3d(materials.add(Color::srgb(0.6, 0.6, 0.65))),
        Transform::from_xyz(0.0, 3.0, 0.0),
    ));

    // Ground
    commands.spawn((
        RigidBody::Static,
        Collider::half_space(Vec3::Y),
        Mesh3d(meshes.add(Plane3d::default().mesh().size(30.0, 30.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.3, 0.5, 0.3))),
    ));

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(4.0, 4.0, 9.0).looking_at(vec3(0.0, 2.0, 0.0), Vec3::Y),
    ));

    commands.spawn((
        Transform::from_xyz(0.0, 1.0, 0.0).looking_at(vec3(1.0, -2.0, -2.0), Vec3::Y),
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
    ));
}

fn regenerate_stamina(mut players: Query<&mut Stamina, Without<Climbing>>, time: Res<Time>) {
    for mut stamina in &mut players {
        stamina.current = (stamina.current + 4.0 * time.delta_secs()).min(stamina.max);
    }
}

fn apply_damage(resolved: On<DamageResolved>) {
    info!("{} takes {} damage", resolved.entity, resolved.hit.damage);
}

#[derive(Component, Default)]
pub(crate) struct PlayerInput;
