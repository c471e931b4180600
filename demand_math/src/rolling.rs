//! Trailing window calculations over a demand history
//!
//! Contains:
//! - `TrailingMean`: streaming mean of the most recent `window` values that
//!   reports a value as soon as one observation is available
//! - `LagBuffer`: fixed-depth history answering "what was observed k periods ago",
//!   with gaps for periods that have no record
//! - `lagged` / `shifted_trailing_means`: whole-series helpers where the value
//!   at index `i` only ever reads indices strictly before `i`

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Trailing mean with a minimum-one-observation policy
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingMean {
    window: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl TrailingMean {
    /// Create a new trailing mean over the specified window
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(MathError::InvalidInput(
                "Window must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            window,
            values: VecDeque::with_capacity(window),
            sum: 0.0,
        })
    }

    /// Push a new observation, evicting the oldest once the window is full
    pub fn update(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Cannot add non-finite value {} to a trailing mean",
                value
            )));
        }

        self.values.push_back(value);
        self.sum += value;

        if self.values.len() > self.window {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }

        Ok(())
    }

    /// Mean of the observations currently held (partial windows allowed)
    pub fn value(&self) -> Result<f64> {
        if self.values.is_empty() {
            return Err(MathError::InsufficientData(
                "Trailing mean needs at least one observation".to_string(),
            ));
        }

        Ok(self.sum / self.values.len() as f64)
    }

    /// Number of observations currently in the window
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Fixed-depth history of the most recent periods (oldest first)
///
/// A slot is either an observation or a gap for a period with no record. Gaps
/// count towards the depth and towards lag offsets but are left out of means.
#[derive(Debug, Clone, PartialEq)]
pub struct LagBuffer {
    depth: usize,
    slots: VecDeque<Option<f64>>,
}

impl LagBuffer {
    /// Create an empty buffer holding at most `depth` periods
    pub fn new(depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(MathError::InvalidInput(
                "Lag buffer depth must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            depth,
            slots: VecDeque::with_capacity(depth),
        })
    }

    /// Seed a buffer with the tail of `history` (oldest first, no gaps)
    pub fn from_history(depth: usize, history: &[f64]) -> Result<Self> {
        let mut buffer = Self::new(depth)?;
        let start = history.len().saturating_sub(depth);
        for &value in &history[start..] {
            buffer.push(value)?;
        }
        Ok(buffer)
    }

    /// Append an observation, dropping the oldest slot when full
    pub fn push(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Cannot add non-finite value {} to a lag buffer",
                value
            )));
        }

        self.push_slot(Some(value));
        Ok(())
    }

    /// Append `count` unobserved periods
    pub fn push_gaps(&mut self, count: usize) {
        // Anything beyond the depth would be evicted straight away
        for _ in 0..count.min(self.depth) {
            self.push_slot(None);
        }
    }

    fn push_slot(&mut self, slot: Option<f64>) {
        self.slots.push_back(slot);
        if self.slots.len() > self.depth {
            self.slots.pop_front();
        }
    }

    /// Return a new buffer with `value` appended, leaving `self` untouched
    pub fn with_pushed(&self, value: f64) -> Result<Self> {
        let mut next = self.clone();
        next.push(value)?;
        Ok(next)
    }

    /// Observation `k` periods back, where `k = 1` is the most recent one;
    /// `None` past the held history or on a gap
    pub fn lag(&self, k: usize) -> Option<f64> {
        if k == 0 || k > self.slots.len() {
            return None;
        }
        self.slots[self.slots.len() - k]
    }

    /// Mean of the observations among the most recent `window` periods
    pub fn trailing_mean(&self, window: usize) -> Option<f64> {
        let observed: Vec<f64> = self.slots.iter().rev().take(window).flatten().copied().collect();
        if observed.is_empty() {
            return None;
        }
        Some(observed.iter().sum::<f64>() / observed.len() as f64)
    }

    /// Number of periods held, gaps included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Value `k` positions earlier for every index; `None` for the first `k` entries
pub fn lagged(values: &[f64], k: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| if k > 0 && i >= k { Some(values[i - k]) } else { None })
        .collect()
}

/// Mean of up to `window` values preceding each index (the index itself excluded)
///
/// The first entry is always `None`; every later entry averages whatever
/// history is available, capped at `window` values.
pub fn shifted_trailing_means(values: &[f64], window: usize) -> Result<Vec<Option<f64>>> {
    let mut mean = TrailingMean::new(window)?;
    let mut result = Vec::with_capacity(values.len());

    for &value in values {
        result.push(mean.value().ok());
        mean.update(value)?;
    }

    Ok(result)
}
