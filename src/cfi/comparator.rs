//! CFI Comparison and Ordering
//!
//! Orders CFIs by their structural steps, then by the terminal offset with
//! side bias as the final tiebreak. Two CFIs whose paths cross into
//! different documents at the same position cannot be ordered and the
//! comparison fails instead of guessing.

use std::cmp::Ordering;

use super::error::{CfiError, Result};
use super::types::*;

impl Cfi {
    /// Compare two CFIs by their start locations
    pub fn compare(&self, other: &Cfi) -> Result<Ordering> {
        self.start().compare(&other.start())
    }
}

impl CfiPath {
    /// Compare two paths in reading order.
    ///
    /// Fails with [`CfiError::Incomparable`] when both paths reach the same
    /// index at a step but only one of them crosses an indirection there.
    pub fn compare(&self, other: &CfiPath) -> Result<Ordering> {
        for (position, (a, b)) in self.steps.iter().zip(other.steps.iter()).enumerate() {
            match a.index.cmp(&b.index) {
                Ordering::Equal if a.indirection != b.indirection => {
                    return Err(CfiError::Incomparable { step: position + 1 })
                }
                Ordering::Equal => {}
                ordering => return Ok(ordering),
            }
        }

        // If all compared steps are equal, longer path is "greater"
        let by_depth = self.steps.len().cmp(&other.steps.len());
        if by_depth != Ordering::Equal {
            return Ok(by_depth);
        }

        Ok(compare_terminus(self, other))
    }
}

/// Absent offset sorts first, then by value, then `before` < none < `after`
fn compare_terminus(a: &CfiPath, b: &CfiPath) -> Ordering {
    let offset_a = a.character_offset.as_ref().map(|o| o.offset);
    let offset_b = b.character_offset.as_ref().map(|o| o.offset);

    offset_a
        .cmp(&offset_b)
        .then_with(|| compare_temporal(a, b))
        .then_with(|| compare_spatial(a, b))
        .then_with(|| bias_rank(a.side_bias()).cmp(&bias_rank(b.side_bias())))
}

fn compare_temporal(a: &CfiPath, b: &CfiPath) -> Ordering {
    match (&a.temporal_offset, &b.temporal_offset) {
        (Some(x), Some(y)) => x.seconds.total_cmp(&y.seconds),
        (x, y) => x.is_some().cmp(&y.is_some()),
    }
}

fn compare_spatial(a: &CfiPath, b: &CfiPath) -> Ordering {
    match (&a.spatial_offset, &b.spatial_offset) {
        // Top-to-bottom, then left-to-right
        (Some(p), Some(q)) => p.y.total_cmp(&q.y).then(p.x.total_cmp(&q.x)),
        (x, y) => x.is_some().cmp(&y.is_some()),
    }
}

fn bias_rank(bias: Option<SideBias>) -> u8 {
    match bias {
        Some(SideBias::Before) => 0,
        None => 1,
        Some(SideBias::After) => 2,
    }
}

/// Determine if CFI `a` comes before CFI `b` in reading order
pub fn is_before(a: &Cfi, b: &Cfi) -> Result<bool> {
    Ok(a.compare(b)? == Ordering::Less)
}

/// Determine if CFI `a` comes after CFI `b` in reading order
pub fn is_after(a: &Cfi, b: &Cfi) -> Result<bool> {
    Ok(a.compare(b)? == Ordering::Greater)
}

/// Check if a CFI falls within `start..=end`
pub fn is_in_range(cfi: &Cfi, start: &Cfi, end: &Cfi) -> Result<bool> {
    Ok(cfi.compare(start)? != Ordering::Less && cfi.compare(end)? != Ordering::Greater)
}

/// Sort CFIs in reading order, failing if any pair is incomparable
pub fn sort_cfis(cfis: &mut [Cfi]) -> Result<()> {
    let mut failure = None;
    cfis.sort_by(|a, b| {
        a.compare(b).unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Compare two CFI strings, returning their ordering
pub fn compare_cfi_strings(a: &str, b: &str) -> Result<Ordering> {
    let cfi_a = super::parser::parse(a)?;
    let cfi_b = super::parser::parse(b)?;
    cfi_a.compare(&cfi_b)
}
