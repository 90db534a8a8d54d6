//! Fork state tracking: depth and the sustained-fork flag.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::InvalidStateError;

/// Default number of total blocks since the common ancestor before a fork
/// counts as sustained. Transient tip disagreements from propagation delay
/// rarely reach this depth.
pub const DEFAULT_SUSTAINED_THRESHOLD: u64 = 6;

/// Snapshot of the fork state at one tick. Recomputed fresh each tick and
/// never carried forward: the flag has no hysteresis, so a depth that dips
/// back below the threshold immediately reads as not sustained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkRecord {
    pub ancestor_height: u64,
    pub height_a: u64,
    pub height_b: u64,
    /// Total blocks mined on both branches past the common ancestor.
    pub depth: u64,
    pub sustained: bool,
}

/// Computes the fork state from both chains' heights and the recorded
/// common-ancestor height.
///
/// A height below the ancestor is a data inconsistency (typically an RPC
/// race while a node reorgs), not an error: the affected branch contributes
/// zero depth, the case is logged, and the fork is reported not sustained.
/// Negative heights can only come from a broken poller and are rejected.
pub fn evaluate(
    height_a: i64,
    height_b: i64,
    ancestor_height: i64,
    threshold: u64,
) -> Result<ForkRecord, InvalidStateError> {
    use InvalidStateError::*;

    if height_a < 0 {
        return Err(NegativeHeight(height_a));
    }
    if height_b < 0 {
        return Err(NegativeHeight(height_b));
    }
    if ancestor_height < 0 {
        return Err(NegativeAncestorHeight(ancestor_height));
    }

    let behind_ancestor = height_a < ancestor_height || height_b < ancestor_height;
    let depth_a = (height_a - ancestor_height).max(0) as u64;
    let depth_b = (height_b - ancestor_height).max(0) as u64;
    let depth = depth_a + depth_b;

    let sustained = if behind_ancestor {
        warn!(
            height_a,
            height_b,
            ancestor_height,
            "chain height below recorded ancestor, clamping fork depth"
        );
        false
    } else {
        depth >= threshold
    };

    Ok(ForkRecord {
        ancestor_height: ancestor_height as u64,
        height_a: height_a as u64,
        height_b: height_b as u64,
        depth,
        sustained,
    })
}
