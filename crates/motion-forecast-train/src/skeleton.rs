//! Kinematic tree and rest bone-length table.
//!
//! A [`Skeleton`] lists, for every joint, its parent and the rest offset of
//! the joint expressed in the parent's frame. Joint 0 is the single root and
//! every other joint's parent has a smaller index, so iterating joints in
//! index order is a valid forward-kinematics traversal.
//!
//! The [`BoneLengthTable`] is derived once from the skeleton and shared
//! read-only (behind an `Arc`) by the composite loss and the evaluator for
//! the lifetime of a run.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DatasetError;

/// Kinematic tree with per-joint rest offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    /// Parent joint of each joint; `None` only for the root (joint 0).
    parents: Vec<Option<usize>>,
    /// Rest offset of each joint relative to its parent, in the parent frame.
    offsets: Vec<[f32; 3]>,
}

impl Skeleton {
    /// Build a skeleton, checking that it forms a topologically ordered tree
    /// rooted at joint 0.
    pub fn new(parents: Vec<Option<usize>>, offsets: Vec<[f32; 3]>) -> Result<Self, DatasetError> {
        if parents.is_empty() {
            return Err(DatasetError::invalid_skeleton("skeleton has no joints"));
        }
        if parents.len() != offsets.len() {
            return Err(DatasetError::invalid_skeleton(format!(
                "{} parents but {} offsets",
                parents.len(),
                offsets.len()
            )));
        }
        if parents[0].is_some() {
            return Err(DatasetError::invalid_skeleton("joint 0 must be the root"));
        }
        for (j, parent) in parents.iter().enumerate().skip(1) {
            match parent {
                Some(p) if *p < j => {}
                Some(p) => {
                    return Err(DatasetError::invalid_skeleton(format!(
                        "joint {j} has parent {p}; parents must precede their children"
                    )))
                }
                None => {
                    return Err(DatasetError::invalid_skeleton(format!(
                        "joint {j} has no parent; only joint 0 may be a root"
                    )))
                }
            }
        }
        Ok(Skeleton { parents, offsets })
    }

    /// A straight chain of `num_joints` joints along +x, each bone `bone_length`
    /// long.
    pub fn chain(num_joints: usize, bone_length: f32) -> Result<Self, DatasetError> {
        let parents = (0..num_joints).map(|j| j.checked_sub(1)).collect();
        let offsets = (0..num_joints)
            .map(|j| if j == 0 { [0.0; 3] } else { [bone_length, 0.0, 0.0] })
            .collect();
        Skeleton::new(parents, offsets)
    }

    /// A 12-joint stick figure (hips, spine, neck, head, arms, legs) used by
    /// the synthetic corpus.
    pub fn stick_figure() -> Self {
        let parents = vec![
            None,    // 0  hips
            Some(0), // 1  spine
            Some(1), // 2  neck
            Some(2), // 3  head
            Some(2), // 4  left shoulder
            Some(4), // 5  left hand
            Some(2), // 6  right shoulder
            Some(6), // 7  right hand
            Some(0), // 8  left knee
            Some(8), // 9  left foot
            Some(0), // 10 right knee
            Some(10), // 11 right foot
        ];
        let offsets = vec![
            [0.0, 0.0, 0.0],
            [0.0, 0.25, 0.0],
            [0.0, 0.25, 0.0],
            [0.0, 0.1, 0.0],
            [0.15, 0.0, 0.0],
            [0.5, 0.0, 0.0],
            [-0.15, 0.0, 0.0],
            [-0.5, 0.0, 0.0],
            [0.1, -0.45, 0.0],
            [0.0, -0.45, 0.0],
            [-0.1, -0.45, 0.0],
            [0.0, -0.45, 0.0],
        ];
        Skeleton { parents, offsets }
    }

    /// Load a skeleton from a JSON file of the form
    /// `{"parents": [null, 0, 1, ...], "offsets": [[x, y, z], ...]}`.
    pub fn from_json(path: &Path) -> Result<Self, DatasetError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| DatasetError::io_error(path, e))?;
        let raw: Skeleton = serde_json::from_str(&contents)
            .map_err(|e| DatasetError::invalid_format(path, e.to_string()))?;
        Skeleton::new(raw.parents, raw.offsets)
    }

    /// Number of joints, root included.
    pub fn num_joints(&self) -> usize {
        self.parents.len()
    }

    /// Parent of `joint`, `None` for the root.
    pub fn parent(&self, joint: usize) -> Option<usize> {
        self.parents[joint]
    }

    /// All parents, indexed by joint.
    pub fn parents(&self) -> &[Option<usize>] {
        &self.parents
    }

    /// Rest offset of `joint` in its parent's frame.
    pub fn offset(&self, joint: usize) -> [f32; 3] {
        self.offsets[joint]
    }

    /// Rest bone-length table derived from the offsets.
    pub fn bone_lengths(&self) -> BoneLengthTable {
        let bones = self
            .parents
            .iter()
            .enumerate()
            .filter_map(|(child, parent)| {
                parent.map(|parent| {
                    let [x, y, z] = self.offsets[child];
                    Bone { child, parent, rest_length: (x * x + y * y + z * z).sqrt() }
                })
            })
            .collect();
        BoneLengthTable { bones }
    }

    /// Total rest length of the bones below each joint, plus the joint's own
    /// bone. A rotation error at joint `j` displaces everything in its
    /// subtree, so this is the natural importance weight for `j`.
    pub fn subtree_lengths(&self) -> Vec<f32> {
        let table = self.bone_lengths();
        let mut totals = vec![0.0_f32; self.num_joints()];
        for bone in table.iter() {
            totals[bone.child] += bone.rest_length;
        }
        // Children have larger indices, so a reverse sweep accumulates leaves
        // before their ancestors.
        for j in (1..self.num_joints()).rev() {
            if let Some(p) = self.parents[j] {
                totals[p] += totals[j];
            }
        }
        totals
    }
}

/// A bone is identified by its child joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bone {
    /// Joint at the far end of the bone (the bone identifier).
    pub child: usize,
    /// Joint at the near end.
    pub parent: usize,
    /// Rest length.
    pub rest_length: f32,
}

/// Immutable mapping from bone identifier to rest length.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneLengthTable {
    bones: Vec<Bone>,
}

impl BoneLengthTable {
    /// Rest length of the bone ending at `child`, if such a bone exists.
    pub fn rest_length(&self, child: usize) -> Option<f32> {
        self.bones.iter().find(|b| b.child == child).map(|b| b.rest_length)
    }

    /// Iterate over all bones in joint order.
    pub fn iter(&self) -> impl Iterator<Item = &Bone> {
        self.bones.iter()
    }

    /// Number of bones.
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    /// `true` for a single-joint skeleton.
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn chain_has_unit_bones() {
        let s = Skeleton::chain(3, 1.0).unwrap();
        let table = s.bone_lengths();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rest_length(0), None);
        assert_abs_diff_eq!(table.rest_length(2).unwrap(), 1.0);
    }

    #[test]
    fn parent_after_child_is_rejected() {
        let err = Skeleton::new(vec![None, Some(2), Some(0)], vec![[0.0; 3]; 3]).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidSkeleton(_)));
    }

    #[test]
    fn second_root_is_rejected() {
        assert!(Skeleton::new(vec![None, None], vec![[0.0; 3]; 2]).is_err());
    }

    #[test]
    fn stick_figure_is_a_valid_tree() {
        let s = Skeleton::stick_figure();
        let rebuilt = Skeleton::new(s.parents.clone(), s.offsets.clone()).unwrap();
        assert_eq!(rebuilt.num_joints(), 12);
        assert_eq!(rebuilt.bone_lengths().len(), 11);
    }

    #[test]
    fn subtree_lengths_accumulate_towards_root() {
        let s = Skeleton::chain(4, 0.5).unwrap();
        let totals = s.subtree_lengths();
        assert_abs_diff_eq!(totals[3], 0.5);
        assert_abs_diff_eq!(totals[1], 1.5);
        assert_abs_diff_eq!(totals[0], 1.5);
    }
}
