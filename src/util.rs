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

use crate::Duration;

/// An offset from the current tag, used when scheduling actions.
#[derive(Copy, Clone, Debug)]
pub enum Offset {
    /// Schedule as soon as possible. For a logical action this
    /// is the action's minimum delay, at the earliest one
    /// microstep after the current tag.
    Asap,

    /// Schedule at least after the provided duration.
    After(Duration),
}

impl Offset {
    #[inline]
    pub(crate) fn to_duration(self) -> Duration {
        match self {
            Offset::Asap => Duration::ZERO,
            Offset::After(d) => d,
        }
    }
}

/// Shorthand for using [After](Offset::After) together with [delay].
///
/// ```
/// use std::time::Duration;
/// use reactor_dyn::{after, Offset};
///
/// assert!(matches!(after!(10 ns), Offset::After(d) if d == Duration::from_nanos(10)));
/// assert!(matches!(after!(2 min), Offset::After(d) if d == Duration::from_secs(120)));
/// ```
#[macro_export]
macro_rules! after {
    ($amount:tt $unit:tt) => { $crate::Offset::After($crate::delay!($amount $unit)) }
}

/// Creates a [Duration] value with a time unit.
///
/// ```
/// use std::time::Duration;
/// use reactor_dyn::delay;
///
/// assert_eq!(delay!(10 ns), Duration::from_nanos(10));
/// assert_eq!(delay!(10 ms), delay!(10 msec));
/// assert_eq!(delay!(10 sec), Duration::from_secs(10));
/// assert_eq!(delay!(2 min), delay!(120 s));
/// assert_eq!(delay!(0), Duration::from_secs(0));
/// ```
#[macro_export]
macro_rules! delay {
    (0)                   => { $crate::Duration::from_nanos(0) };
    ($amount:tt ns)       => { $crate::Duration::from_nanos($amount) };
    ($amount:tt nsec)     => { $crate::delay!($amount ns) };
    ($amount:tt us)       => { $crate::Duration::from_micros($amount) };
    ($amount:tt usec)     => { $crate::delay!($amount us) };
    ($amount:tt ms)       => { $crate::Duration::from_millis($amount) };
    ($amount:tt msec)     => { $crate::delay!($amount ms) };
    ($amount:tt s)        => { $crate::Duration::from_secs($amount) };
    ($amount:tt sec)      => { $crate::delay!($amount s) };
    ($amount:tt secs)     => { $crate::delay!($amount s) };
    ($amount:tt min)      => { $crate::Duration::from_secs(60 * $amount) };
    ($amount:tt h)        => { $crate::delay!((3600 * $amount) s) };
    ($amount:tt $i:ident) => { compile_error!(concat!("Unknown time unit `", stringify!($i), "`")) };
}
