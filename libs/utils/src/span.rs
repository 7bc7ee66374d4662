// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Inclusive spans of unsigned integers.

use num_traits::{ConstOne, PrimInt, Unsigned};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Span creation errors.
#[derive(Debug, Error)]
pub enum NewSpanError<T> {
    /// First value after last value.
    #[error("span first value {0} is after last value {1}")]
    FirstAfterLast(T, T),
}

/// An inclusive span of unsigned integers.
///
/// Both bounds are part of the span. Inclusive bounds make the span over the
/// full integer domain representable without an out-of-range end marker.
#[derive(Debug, Eq, PartialEq, Serialize, Deserialize, Clone, Copy)]
pub struct Span<T: PrimInt + Unsigned> {
    /// First value in the span.
    pub first: T,
    /// Last value in the span.
    pub last: T,
}

impl<T: PrimInt + ConstOne + Unsigned> Span<T> {
    /// Creates a new span. The first value must not be after the last.
    pub fn new(first: T, last: T) -> Result<Self, NewSpanError<T>> {
        if first > last {
            return Err(NewSpanError::FirstAfterLast(first, last));
        }
        Ok(Self { first, last })
    }

    /// Returns true if the value lies within the span.
    pub fn contains(&self, value: T) -> bool {
        self.first <= value && value <= self.last
    }

    /// Returns true if the other span lies entirely within this span.
    pub fn contains_span(&self, other: &Span<T>) -> bool {
        self.first <= other.first && other.last <= self.last
    }

    /// Returns true if the two spans share at least one value.
    pub fn overlaps(&self, other: &Span<T>) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    /// Removes the other span from this one.
    ///
    /// Returns the remaining spans in ascending order: zero spans if the
    /// other covers this one, one span if the other clips an edge or misses
    /// entirely, two spans if the other punches a hole in the middle.
    pub fn without(&self, other: &Span<T>) -> Vec<Span<T>> {
        if !self.overlaps(other) {
            return vec![*self];
        }
        let mut remaining = Vec::new();
        if other.first > self.first {
            remaining.push(Span {
                first: self.first,
                last: other.first - T::ONE,
            });
        }
        if other.last < self.last {
            remaining.push(Span {
                first: other.last + T::ONE,
                last: self.last,
            });
        }
        remaining
    }

    /// Iterates the span's values in ascending order.
    pub fn iter(&self) -> SpanIter<T> {
        SpanIter {
            next: self.first,
            last: self.last,
            done: false,
        }
    }
}

/// Ascending iterator over a span's values.
///
/// Tracks completion explicitly so a span ending at the type's maximum value
/// terminates without overflowing the cursor.
#[derive(Debug, Clone)]
pub struct SpanIter<T: PrimInt + Unsigned> {
    next: T,
    last: T,
    done: bool,
}

impl<T: PrimInt + ConstOne + Unsigned> Iterator for SpanIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        let value = self.next;
        if value == self.last {
            self.done = true;
        } else {
            self.next = value + T::ONE;
        }
        Some(value)
    }
}
