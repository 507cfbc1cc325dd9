use glam::Vec2;

/// How a surface interacts with the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Blocks from every direction.
    Solid,
    /// Supports from above only; never blocks sideways or from below.
    OneWay,
}

/// A line segment of level geometry.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub a: Vec2,
    pub b: Vec2,
    pub kind: SurfaceKind,
}

impl Segment {
    pub fn solid(a: Vec2, b: Vec2) -> Self {
        Self {
            a,
            b,
            kind: SurfaceKind::Solid,
        }
    }

    pub fn one_way(a: Vec2, b: Vec2) -> Self {
        Self {
            a,
            b,
            kind: SurfaceKind::OneWay,
        }
    }
}

/// Result of the nearest ray/segment intersection.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec2,
    /// Unit normal facing back along the ray.
    pub normal: Vec2,
    pub kind: SurfaceKind,
}

/// Static level geometry queried by raycast.
#[derive(Debug, Clone, Default)]
pub struct CollisionWorld {
    segments: Vec<Segment>,
}

impl CollisionWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Axis-aligned solid box, counter-clockwise winding.
    pub fn add_box(&mut self, min: Vec2, max: Vec2) {
        self.add(Segment::solid(min, Vec2::new(max.x, min.y)));
        self.add(Segment::solid(Vec2::new(max.x, min.y), max));
        self.add(Segment::solid(max, Vec2::new(min.x, max.y)));
        self.add(Segment::solid(Vec2::new(min.x, max.y), min));
    }

    /// Horizontal one-way platform from `x0` to `x1` at height `y`.
    pub fn add_platform(&mut self, x0: f32, x1: f32, y: f32) {
        self.add(Segment::one_way(Vec2::new(x0, y), Vec2::new(x1, y)));
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Nearest hit along `dir` (unit length) within `max_distance`.
    /// `include_one_way` gates platforms; they are only ever candidates
    /// when the caller is sweeping downward onto them.
    pub fn raycast(
        &self,
        origin: Vec2,
        dir: Vec2,
        max_distance: f32,
        include_one_way: bool,
    ) -> Option<RayHit> {
        let mut nearest: Option<RayHit> = None;
        for segment in &self.segments {
            if segment.kind == SurfaceKind::OneWay && !include_one_way {
                continue;
            }
            let Some(hit) = intersect(origin, dir, max_distance, segment) else {
                continue;
            };
            if segment.kind == SurfaceKind::OneWay && hit.normal.y <= 0.0 {
                // Approached from below or the side; permeable.
                continue;
            }
            if nearest.as_ref().is_none_or(|n| hit.distance < n.distance) {
                nearest = Some(hit);
            }
        }
        nearest
    }
}

fn intersect(origin: Vec2, dir: Vec2, max_distance: f32, segment: &Segment) -> Option<RayHit> {
    let edge = segment.b - segment.a;
    let denom = dir.perp_dot(edge);
    if denom.abs() < 1e-9 {
        return None;
    }

    let to_a = segment.a - origin;
    let t = to_a.perp_dot(edge) / denom;
    let s = to_a.perp_dot(dir) / denom;
    if t < 0.0 || t > max_distance || !(0.0..=1.0).contains(&s) {
        return None;
    }

    let mut normal = Vec2::new(-edge.y, edge.x).normalize_or_zero();
    if normal.dot(dir) > 0.0 {
        normal = -normal;
    }

    Some(RayHit {
        distance: t,
        point: origin + dir * t,
        normal,
        kind: segment.kind,
    })
}
