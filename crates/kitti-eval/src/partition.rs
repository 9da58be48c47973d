//! Contiguous batching of samples to bound overlap-matrix memory.

use std::ops::Range;

use crate::error::{EvalError, Result};

/// An ordered list of contiguous, non-overlapping sample ranges covering
/// `0..num_samples`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    parts: Vec<Range<usize>>,
}

impl PartitionPlan {
    /// Ranges of at most `partition_size` samples.
    pub fn by_size(num_samples: usize, partition_size: usize) -> Result<Self> {
        if partition_size == 0 {
            return Err(EvalError::invalid("partition size must be positive"));
        }
        let parts = (0..num_samples)
            .step_by(partition_size)
            .map(|start| start..(start + partition_size).min(num_samples))
            .collect();
        Ok(PartitionPlan { parts })
    }

    /// `num_parts` equal ranges of `num_samples / num_parts` plus one range for
    /// the remainder; a single range when there are fewer samples than parts.
    pub fn by_count(num_samples: usize, num_parts: usize) -> Result<Self> {
        if num_parts == 0 {
            return Err(EvalError::invalid("partition count must be positive"));
        }
        let same_part = num_samples / num_parts;
        if same_part == 0 {
            return Ok(PartitionPlan {
                parts: if num_samples == 0 {
                    Vec::new()
                } else {
                    vec![0..num_samples]
                },
            });
        }
        let mut parts: Vec<Range<usize>> = (0..num_parts)
            .map(|i| i * same_part..(i + 1) * same_part)
            .collect();
        let covered = num_parts * same_part;
        if covered < num_samples {
            parts.push(covered..num_samples);
        }
        Ok(PartitionPlan { parts })
    }

    pub fn parts(&self) -> &[Range<usize>] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
