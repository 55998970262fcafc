/*
 * Copyright (c) 2021, TU Dresden.
 *
 * Redistribution and use in source and binary forms, with or without modification,
 * are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice,
 *    this list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice,
 *    this list of conditions and the following disclaimer in the documentation
 *    and/or other materials provided with the distribution.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY
 * EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL
 * THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
 * SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
 * PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS
 * INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT,
 * STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF
 * THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
 */

use std::fmt::{Debug, Display, Formatter};
use std::ops::Add;

use crate::{Duration, PhysicalInstant};

/// Private concrete type of a microstep.
pub(crate) type MS = u32;

/// Type of the microsteps of a [Tag].
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash)]
pub struct MicroStep(MS);

impl MicroStep {
    pub const ZERO: MicroStep = MicroStep(0);

    pub fn new(u: MS) -> Self {
        Self(u)
    }
}

impl Display for MicroStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<MS> for MicroStep {
    type Output = Self;
    #[inline]
    fn add(self, rhs: MS) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// The current physical time, as reported by the monotonic
/// system clock.
#[inline]
pub fn get_physical_time() -> PhysicalInstant {
    PhysicalInstant::now()
}

/// A point on the logical timeline, also called *superdense time*:
/// a time point paired with a microstep that orders the events
/// which share that time point. Tags are ordered lexicographically,
/// and each tag processed by the scheduler is strictly greater
/// than the previous one.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Tag {
    time_point: PhysicalInstant,
    microstep: MicroStep,
}

impl Tag {
    /// The tag for the zeroth microstep of the given instant.
    #[inline]
    pub fn from_physical_time(time_point: PhysicalInstant) -> Self {
        Self { time_point, microstep: MicroStep::ZERO }
    }

    /// The tag at which the given logical time was reached.
    #[inline]
    pub fn from_logical_time(time: &LogicalTime) -> Self {
        Self { time_point: time.time_point, microstep: time.microstep }
    }

    #[inline]
    pub fn time_point(&self) -> PhysicalInstant {
        self.time_point
    }

    #[inline]
    pub fn microstep(&self) -> MicroStep {
        self.microstep
    }

    /// Returns a tag that is strictly greater than this one.
    /// A zero offset advances the microstep, a nonzero offset
    /// advances the time point and resets the microstep.
    #[inline]
    pub fn delay(self, offset: Duration) -> Self {
        if offset.is_zero() {
            self.next_microstep()
        } else {
            Self {
                time_point: self.time_point + offset,
                microstep: MicroStep::ZERO,
            }
        }
    }

    #[inline]
    pub fn next_microstep(self) -> Self {
        Self {
            time_point: self.time_point,
            microstep: self.microstep + 1,
        }
    }

    /// Displays this tag as an offset from the given origin.
    pub fn display_since(&self, t0: PhysicalInstant) -> impl Display {
        let elapsed = self.time_point.saturating_duration_since(t0);
        struct TagFmt(Duration, MS);
        impl Display for TagFmt {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "(T0 + {} ns = {} ms, {})", self.0.as_nanos(), self.0.as_millis(), self.1)
            }
        }
        TagFmt(elapsed, self.microstep.0)
    }
}

impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:?}, {})", self.time_point, self.microstep)
    }
}

/// The logical clock of the scheduler. Logical time only moves
/// forward, one tag at a time, and always lags behind physical
/// time unless the runtime fast-forwards.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct LogicalTime {
    time_point: PhysicalInstant,
    microstep: MicroStep,
}

impl LogicalTime {
    pub fn new(time_point: PhysicalInstant) -> Self {
        Self { time_point, microstep: MicroStep::ZERO }
    }

    #[inline]
    pub fn time_point(&self) -> PhysicalInstant {
        self.time_point
    }

    #[inline]
    pub fn microstep(&self) -> MicroStep {
        self.microstep
    }

    #[inline]
    pub fn to_tag(self) -> Tag {
        Tag::from_logical_time(&self)
    }

    /// Advance this clock to the given tag. The clock starts out
    /// at the start tag, which is also the first tag processed.
    pub fn advance_to(&mut self, tag: Tag) {
        debug_assert!(self.to_tag() <= tag, "logical time may only advance");
        self.time_point = tag.time_point();
        self.microstep = tag.microstep();
    }
}
