//! Surface detection around a climber.
//!
//! Spheres are swept from a few heights above the feet in a fixed priority order of
//! directions. The first hit whose normal lies inside the climbable angle band wins, so
//! a character keeps clinging to the wall it is already on instead of snapping to a
//! perpendicular one nearby.

use crate::prelude::*;

/// World axes swept after the character's own axes, for awkward orientations like ceilings.
const WORLD_PROBE_DIRECTIONS: [Dir3; 6] = [
    Dir3::Y,
    Dir3::NEG_Y,
    Dir3::X,
    Dir3::NEG_X,
    Dir3::Z,
    Dir3::NEG_Z,
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    /// Outward unit normal of the hit surface.
    pub normal: Vec3,
    pub distance: f32,
}

/// The world geometry climbers can probe.
///
/// Implemented for Avian's [`SpatialQuery`] through [`SpatialCaster`]. Implementations must
/// only report solid terrain and structures, never other actors or triggers.
pub trait SurfaceCaster {
    /// Sweep a sphere of `radius` from `origin` along `direction`. Surfaces the sphere
    /// already overlaps at `origin` are not reported.
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Dir3,
        max_distance: f32,
    ) -> Option<SurfaceHit>;

    fn cast_ray(&self, origin: Vec3, direction: Dir3, max_distance: f32) -> Option<SurfaceHit>;
}

impl<C: SurfaceCaster + ?Sized> SurfaceCaster for &C {
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Dir3,
        max_distance: f32,
    ) -> Option<SurfaceHit> {
        (**self).cast_sphere(origin, radius, direction, max_distance)
    }

    fn cast_ray(&self, origin: Vec3, direction: Dir3, max_distance: f32) -> Option<SurfaceHit> {
        (**self).cast_ray(origin, direction, max_distance)
    }
}

/// Hands out a [`SurfaceCaster`] that sees the world the way one climber does.
pub trait SurfaceCasters {
    type Caster<'a>: SurfaceCaster
    where
        Self: 'a;

    fn for_climber<'a>(&'a self, cfg: &'a SurfaceClimber) -> Self::Caster<'a>;
}

impl<'w, 's> SurfaceCasters for SpatialQuery<'w, 's> {
    type Caster<'a>
        = SpatialCaster<'a, 'w, 's>
    where
        Self: 'a;

    fn for_climber<'a>(&'a self, cfg: &'a SurfaceClimber) -> Self::Caster<'a> {
        SpatialCaster::new(self, &cfg.filter).with_radius(cfg.probe_radius)
    }
}

/// [`SurfaceCaster`] backed by the physics world, restricted by a climber's filter.
pub struct SpatialCaster<'a, 'w, 's> {
    query: &'a SpatialQuery<'w, 's>,
    filter: &'a SpatialQueryFilter,
    sphere: Collider,
    sphere_radius: f32,
}

impl<'a, 'w, 's> SpatialCaster<'a, 'w, 's> {
    pub fn new(query: &'a SpatialQuery<'w, 's>, filter: &'a SpatialQueryFilter) -> Self {
        Self {
            query,
            filter,
            sphere: Collider::sphere(0.0),
            sphere_radius: 0.0,
        }
    }

    /// Pre-build the probe sphere so repeated sweeps don't allocate a new shape each time.
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.sphere = Collider::sphere(radius);
        self.sphere_radius = radius;
        self
    }
}

impl SurfaceCaster for SpatialCaster<'_, '_, '_> {
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Dir3,
        max_distance: f32,
    ) -> Option<SurfaceHit> {
        let config = ShapeCastConfig {
            ignore_origin_penetration: true,
            ..ShapeCastConfig::from_max_distance(max_distance)
        };
        let rebuilt;
        let sphere = if radius == self.sphere_radius {
            &self.sphere
        } else {
            rebuilt = Collider::sphere(radius);
            &rebuilt
        };
        self.query
            .cast_shape(sphere, origin, Quat::IDENTITY, direction, &config, self.filter)
            .map(|hit| SurfaceHit {
                normal: hit.normal1,
                distance: hit.distance,
            })
    }

    fn cast_ray(&self, origin: Vec3, direction: Dir3, max_distance: f32) -> Option<SurfaceHit> {
        self.query
            .cast_ray(origin, direction, max_distance, true, self.filter)
            .map(|hit| SurfaceHit {
                normal: hit.normal,
                distance: hit.distance,
            })
    }
}

/// Angle between world up and `normal`, in degrees, within `[0, 180]`.
pub fn surface_angle(normal: Vec3) -> f32 {
    Vec3::Y.angle_between(normal).to_degrees()
}

/// Closed-interval check of a surface angle against the climber's band.
pub fn is_climbable_angle(angle: f32, cfg: &SurfaceClimber) -> bool {
    angle >= cfg.min_surface_angle && angle <= cfg.max_surface_angle
}

/// Probe directions in priority order: into the preferred surface, then the character's own
/// axes, then the world axes.
pub fn probe_directions(rotation: Quat, preferred_normal: Vec3) -> impl Iterator<Item = Dir3> {
    let into_preferred = (preferred_normal != Vec3::ZERO)
        .then(|| Dir3::new(-preferred_normal).ok())
        .flatten();
    let forward = rotation * Dir3::NEG_Z;
    let up = rotation * Dir3::Y;
    let right = rotation * Dir3::X;

    into_preferred
        .into_iter()
        .chain([forward, -forward, up, -up, right, -right])
        .chain(WORLD_PROBE_DIRECTIONS)
}

/// Find a climbable surface around a character standing at `position` (its feet).
///
/// Pass the last known normal as `preferred_normal` to keep clinging to the same surface,
/// or [`Vec3::ZERO`] when there is none.
pub fn detect_surface(
    caster: &impl SurfaceCaster,
    position: Vec3,
    rotation: Quat,
    preferred_normal: Vec3,
    cfg: &SurfaceClimber,
) -> Option<SurfaceHit> {
    let max_distance = cfg.probe_distance();
    for height in &cfg.probe_heights {
        let origin = position + Vec3::Y * *height;
        for direction in probe_directions(rotation, preferred_normal) {
            let Some(hit) = caster.cast_sphere(origin, cfg.probe_radius, direction, max_distance)
            else {
                continue;
            };
            if is_climbable_angle(surface_angle(hit.normal), cfg) {
                return Some(hit);
            }
        }
    }
    None
}
