//! Bounded top-k selection over a stream of scored candidates.
//!
//! The set keeps a fixed number of slots. Each offer scans the slots for the
//! lowest score (empty slots count as negative infinity, the lowest index
//! wins a tie) and replaces it only when the new score is strictly greater.
//! Equal scores therefore never displace an earlier arrival.

use crate::error::SelectError;

/// Scored payload competing for a slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate<T> {
    pub payload: T,
    pub score: f64,
}

impl<T> Candidate<T> {
    pub fn new(payload: T, score: f64) -> Self {
        Self { payload, score }
    }
}

/// Outcome of [`TopK::offer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    Accepted { slot: usize },
    Rejected,
}

impl Offer {
    pub fn is_accepted(self) -> bool {
        matches!(self, Offer::Accepted { .. })
    }
}

/// Fixed-capacity set of the highest-scoring candidates seen so far.
#[derive(Clone, Debug)]
pub struct TopK<T> {
    slots: Vec<Option<Candidate<T>>>,
}

fn slot_score<T>(slot: &Option<Candidate<T>>) -> f64 {
    slot.as_ref().map_or(f64::NEG_INFINITY, |c| c.score)
}

impl<T> TopK<T> {
    /// Creates `capacity` empty slots.
    pub fn new(capacity: usize) -> Result<Self, SelectError> {
        if capacity == 0 {
            return Err(SelectError::InvalidCapacity(capacity));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self { slots })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Index of the slot with the lowest score, first one on ties.
    fn min_slot(&self) -> usize {
        let mut min_idx = 0usize;
        for (idx, slot) in self.slots.iter().enumerate().skip(1) {
            if slot_score(slot) < slot_score(&self.slots[min_idx]) {
                min_idx = idx;
            }
        }
        min_idx
    }

    /// Score a new candidate has to beat, negative infinity while a slot is empty.
    pub fn min_score(&self) -> f64 {
        slot_score(&self.slots[self.min_slot()])
    }

    /// Offers a candidate, replacing the current minimum if it scores strictly higher.
    pub fn offer(&mut self, candidate: Candidate<T>) -> Result<Offer, SelectError> {
        if !candidate.score.is_finite() {
            return Err(SelectError::InvalidScore(candidate.score));
        }
        let idx = self.min_slot();
        if candidate.score > slot_score(&self.slots[idx]) {
            self.slots[idx] = Some(candidate);
            Ok(Offer::Accepted { slot: idx })
        } else {
            Ok(Offer::Rejected)
        }
    }

    /// Current slots in index order. Slots never filled are `None`.
    pub fn finalize(&self) -> Vec<Option<&Candidate<T>>> {
        self.slots.iter().map(Option::as_ref).collect()
    }

    /// Consumes the set, handing back slots in index order.
    pub fn into_slots(self) -> Vec<Option<Candidate<T>>> {
        self.slots
    }
}
