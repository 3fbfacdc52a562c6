//! Seam removal between neighbouring placed models.

use glam::Vec3;
use log::trace;

use crate::world::model::{Bounds, Model, RenderType};

/// Fewest coincident vertices that count as a shared seam.
pub const MIN_SHARED_VERTICES: usize = 3;

/// Finds the vertices `first` and `second` have in common once `second` is
/// moved by `offset` (its origin minus the origin of `first`, in model space).
/// When enough of them coincide, faces lying entirely on the shared seam are
/// marked `Merged` in both models.
///
/// Returns the number of coincident vertex pairs.
pub fn merge_normals(first: &mut Model, second: &mut Model, offset: Vec3) -> usize {
    let bounds = second.bounds();
    let bounds = Bounds { min: snap(bounds.min), max: snap(bounds.max), ..bounds };
    let targets: Vec<Vec3> = second.vertices.iter().map(|v| snap(v.position)).collect();
    let mut first_shared = vec![false; first.vertices.len()];
    let mut second_shared = vec![false; second.vertices.len()];
    let mut count = 0;

    for (i, v) in first.vertices.iter().enumerate() {
        let p = snap(v.position - offset);
        // inside the other model's box on all three axes, the seam may lie at its lowest point
        if !bounds.contains(p) {
            continue;
        }
        for (j, &other) in targets.iter().enumerate() {
            if other == p {
                first_shared[i] = true;
                second_shared[j] = true;
                count += 1;
            }
        }
    }

    if count < MIN_SHARED_VERTICES {
        return count;
    }

    let merged = mark_seam(first, &first_shared) + mark_seam(second, &second_shared);
    trace!("merge_normals {} {}: {count} shared vertices, {merged} faces merged", first.id, second.id);
    count
}

/// Positions compare on the whole unit grid, rotated and contoured copies drift below it.
#[inline]
fn snap(p: Vec3) -> Vec3 {
    p.round()
}

fn mark_seam(model: &mut Model, shared: &[bool]) -> usize {
    let mut merged = 0;
    for face in &mut model.faces {
        if face.indices().iter().all(|&i| shared[i]) {
            face.render = RenderType::Merged;
            merged += 1;
        }
    }
    merged
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::model::{Face, Vertex};

    /// One tile wide box, faces on the east side (x = 64) and west side (x = -64)
    /// plus a roof that never touches a neighbour.
    fn tile_box(id: u32) -> Model {
        let mut model = Model::new(id);
        let corners = [
            (64.0, 0.0, -64.0), (64.0, -128.0, -64.0), (64.0, -128.0, 64.0), (64.0, 0.0, 64.0),
            (-64.0, 0.0, -64.0), (-64.0, -128.0, -64.0), (-64.0, -128.0, 64.0), (-64.0, 0.0, 64.0),
        ];
        model.vertices = corners.iter().map(|&(x, y, z)| Vertex::new(Vec3::new(x, y, z), None)).collect();
        model.faces = vec![
            Face::new(0, 1, 2, 0),
            Face::new(0, 2, 3, 0),
            Face::new(4, 6, 5, 0),
            Face::new(4, 7, 6, 0),
            Face::new(1, 5, 6, 0),
            Face::new(1, 6, 2, 0),
        ];
        model
    }

    fn merged(model: &Model) -> Vec<usize> {
        model.faces.iter().enumerate().filter(|(_, f)| f.render == RenderType::Merged).map(|(i, _)| i).collect()
    }

    #[test]
    fn neighbours_one_tile_apart_share_a_seam() {
        let mut west = tile_box(1);
        let mut east = tile_box(2);
        let shared = merge_normals(&mut west, &mut east, Vec3::new(128.0, 0.0, 0.0));

        assert_eq!(shared, 4);
        assert_eq!(merged(&west), vec![0, 1]);
        assert_eq!(merged(&east), vec![2, 3]);
    }

    #[test]
    fn half_tile_gap_merges_nothing() {
        let mut west = tile_box(1);
        let mut east = tile_box(2);
        let shared = merge_normals(&mut west, &mut east, Vec3::new(192.0, 0.0, 0.0));

        assert_eq!(shared, 0);
        assert!(merged(&west).is_empty());
        assert!(merged(&east).is_empty());
    }

    #[test]
    fn height_difference_breaks_the_seam() {
        let mut west = tile_box(1);
        let mut east = tile_box(2);
        // the east box stands 8 units higher
        let shared = merge_normals(&mut west, &mut east, Vec3::new(128.0, -8.0, 0.0));
        assert_eq!(shared, 0);
        assert!(merged(&west).is_empty());
    }

    #[test]
    fn sub_unit_drift_still_shares_a_seam() {
        let mut west = tile_box(1);
        let mut east = tile_box(2);
        east.translate(Vec3::new(0.3, -0.2, 0.4));
        let shared = merge_normals(&mut west, &mut east, Vec3::new(128.0, 0.0, 0.0));
        assert_eq!(shared, 4);
        assert_eq!(merged(&west), vec![0, 1]);
        assert_eq!(merged(&east), vec![2, 3]);

        // more than half a unit lands on another grid point
        let mut west = tile_box(1);
        let mut east = tile_box(2);
        east.translate(Vec3::new(0.6, 0.0, 0.0));
        assert_eq!(merge_normals(&mut west, &mut east, Vec3::new(128.0, 0.0, 0.0)), 0);
    }

    #[test]
    fn rotated_neighbours_share_a_seam() {
        let mut west = tile_box(1);
        let mut east = tile_box(2);
        for model in [&mut west, &mut east] {
            model.rotate_yaw(std::f32::consts::FRAC_PI_4);
            model.rotate_yaw(-std::f32::consts::FRAC_PI_4);
        }
        let shared = merge_normals(&mut west, &mut east, Vec3::new(128.0, 0.0, 0.0));
        assert_eq!(shared, 4);
        assert_eq!(merged(&west), vec![0, 1]);
    }

    #[test]
    fn seam_on_the_ground_line_counts() {
        let mut west = tile_box(1);
        let mut east = tile_box(2);
        merge_normals(&mut west, &mut east, Vec3::new(128.0, 0.0, 0.0));
        // y = 0 is the lowest point of a y-down model, both ground corners match
        let ground: Vec<usize> = west
            .vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.position.x == 64.0 && v.position.y == 0.0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(ground.len(), 2);
        assert!(west.faces[0].indices().contains(&ground[0]));
        assert_eq!(west.faces[0].render, RenderType::Merged);
    }

    #[test]
    fn two_shared_vertices_are_not_enough() {
        let mut west = tile_box(1);
        let mut east = tile_box(2);
        // diagonal neighbour: only one edge coincides
        let shared = merge_normals(&mut west, &mut east, Vec3::new(128.0, 0.0, 128.0));
        assert_eq!(shared, 2);
        assert!(merged(&west).is_empty());
        assert!(merged(&east).is_empty());
    }
}
