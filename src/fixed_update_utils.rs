use crate::prelude::*;

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<FixedTickRanThisFrame>()
        .add_systems(PreUpdate, |mut ran: ResMut<FixedTickRanThisFrame>| **ran = false)
        .add_systems(FixedPreUpdate, |mut ran: ResMut<FixedTickRanThisFrame>| **ran = true);
}

/// Whether at least one fixed timestep ran during the current frame.
///
/// Input gathered in [`PreUpdate`] has to survive frames where no fixed step ran,
/// otherwise short key presses get lost between ticks.
#[derive(Resource, Debug, Deref, DerefMut, Default)]
pub(crate) struct FixedTickRanThisFrame(bool);

pub(crate) fn did_fixed_timestep_run_this_frame(ran: Res<FixedTickRanThisFrame>) -> bool {
    **ran
}
