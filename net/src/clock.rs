//! Monotonic microsecond clock supplied by the embedding application.
//!
//! The stack only ever compares two readings with wrapping subtraction, so a
//! free-running 32-bit counter that wraps every ~71 minutes is enough.

/// Source of the current time in microseconds.
pub trait Clock {
    fn now_usec(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_usec(&self) -> u32 {
        (**self).now_usec()
    }
}

/// Poll-style timer check.
///
/// Returns `true` and re-arms `ticks` to `now` when `usec` is 0 (explicit
/// restart) or at least `usec` microseconds have passed since `ticks`.
#[inline]
pub fn ustimeout(ticks: &mut u32, now: u32, usec: u32) -> bool {
    if usec == 0 || now.wrapping_sub(*ticks) >= usec {
        *ticks = now;
        true
    } else {
        false
    }
}
