use crate::{fixed_update_utils::did_fixed_timestep_run_this_frame, prelude::*};

pub(super) fn plugin(app: &mut App) {
    app.add_observer(apply_movement)
        .add_observer(apply_climb)
        .add_observer(apply_climb_press)
        .add_systems(
            RunFixedMainLoop,
            clear_climb_input
                .run_if(did_fixed_timestep_run_this_frame)
                .in_set(RunFixedMainLoopSystems::AfterFixedMainLoop),
        );
}

/// Movement along the surface: `x` is lateral, `y` is up/down the climb direction.
#[derive(Debug, InputAction)]
#[action_output(Vec2)]
pub struct ClimbMovement;

#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Climb;

/// Input accumulated since the last fixed update loop. Is cleared after every fixed update loop.
#[derive(Component, Clone, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct ClimbInput {
    // The last non-zero move that was input since the last fixed update loop
    pub movement: Option<Vec2>,
    // Whether any frame since the last fixed update loop held the climb action
    pub climb_held: bool,
    // Whether the climb action started being pressed since the last fixed update loop
    pub climb_pressed: bool,
}

impl ClimbInput {
    pub fn record_movement(&mut self, movement: Vec2) {
        if movement != Vec2::ZERO {
            self.movement = Some(movement);
        }
    }

    pub fn record_climb_held(&mut self) {
        self.climb_held = true;
    }

    /// Stays set until a fixed tick consumes it or the accumulator is cleared.
    pub fn record_climb_press(&mut self) {
        self.climb_pressed = true;
    }

    /// Lateral (`x`) and forward (`y`) axis values, each clamped to `[-1, 1]`.
    pub fn axes(&self) -> Vec2 {
        self.movement
            .unwrap_or_default()
            .clamp(Vec2::NEG_ONE, Vec2::ONE)
    }
}

/// The character can't take input right now, e.g. during a cutscene or while a menu is open.
///
/// Climb keys are ignored, but a toggled climb stays latched.
#[derive(Component, Clone, Copy, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct InputSuppressed;

/// The climbing state machine does not advance at all, e.g. while dead or teleporting.
#[derive(Component, Clone, Copy, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct ClimbPaused;

fn apply_movement(movement: On<Fire<ClimbMovement>>, mut inputs: Query<&mut ClimbInput>) {
    if let Ok(mut input) = inputs.get_mut(movement.context) {
        input.record_movement(movement.value);
    }
}

fn apply_climb(climb: On<Fire<Climb>>, mut inputs: Query<&mut ClimbInput>) {
    if let Ok(mut input) = inputs.get_mut(climb.context) {
        input.record_climb_held();
    }
}

fn apply_climb_press(climb: On<Start<Climb>>, mut inputs: Query<&mut ClimbInput>) {
    if let Ok(mut input) = inputs.get_mut(climb.context) {
        input.record_climb_press();
    }
}

fn clear_climb_input(mut inputs: Query<&mut ClimbInput>) {
    for mut input in &mut inputs {
        *input = ClimbInput::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_update_utils::FixedTickRanThisFrame;

    #[test]
    fn axes_are_clamped() {
        let input = ClimbInput {
            movement: Some(vec2(2.0, -3.0)),
            ..default()
        };
        assert_eq!(input.axes(), vec2(1.0, -1.0));
        assert_eq!(ClimbInput::default().axes(), Vec2::ZERO);
    }

    #[test]
    fn recording_keeps_last_nonzero_move() {
        let mut input = ClimbInput::default();
        input.record_movement(vec2(0.0, 1.0));
        input.record_movement(Vec2::ZERO);
        assert_eq!(input.movement, Some(vec2(0.0, 1.0)));

        input.record_climb_press();
        input.record_climb_held();
        assert!(input.climb_pressed);
        assert!(input.climb_held);
    }

    #[test]
    fn accumulator_clears_only_after_a_fixed_tick() {
        let mut world = World::new();
        world.init_resource::<FixedTickRanThisFrame>();
        let entity = world
            .spawn(ClimbInput {
                movement: Some(Vec2::Y),
                climb_held: true,
                climb_pressed: true,
            })
            .id();
        let mut schedule = Schedule::default();
        schedule.add_systems(clear_climb_input.run_if(did_fixed_timestep_run_this_frame));

        schedule.run(&mut world);
        assert!(world.get::<ClimbInput>(entity).unwrap().climb_pressed);

        **world.resource_mut::<FixedTickRanThisFrame>() = true;
        schedule.run(&mut world);
        let input = world.get::<ClimbInput>(entity).unwrap();
        assert_eq!(input.movement, None);
        assert!(!input.climb_held);
        assert!(!input.climb_pressed);
    }
}
