// Copyright 2019 Brian Gianforcaro

bitflags! {
    pub struct InitLockFlags: u64 {
        const WAITERS_PRESENT = 0x8000_0000_0000_0000;
    }
}

impl InitLockFlags {
    /// Returns true if some thread is inside an initialization section.
    #[inline]
    pub fn is_held(self) -> bool {
        self.holder_count() > 0
    }

    /// Returns true if no thread is inside an initialization section.
    #[inline]
    pub fn is_vacant(self) -> bool {
        self.holder_count() == 0
    }

    /// Returns true if a thread is parked waiting for the sections to drain.
    #[inline]
    pub fn has_waiters(self) -> bool {
        self.contains(Self::WAITERS_PRESENT)
    }

    /// Returns just the holder count encoded in the flags.
    #[inline]
    pub fn holder_count(self) -> u64 {
        self.bits() & (!Self::WAITERS_PRESENT.bits())
    }

    /// Returns a new state word with the waiters flag set in the upper bit.
    #[inline]
    pub fn set_waiters_present(self) -> u64 {
        self.bits() | Self::WAITERS_PRESENT.bits()
    }

    /// Returns a new state word with one more holder.
    #[inline]
    pub fn add_holder(self) -> u64 {
        if self.holder_count() == (!Self::WAITERS_PRESENT.bits()) {
            panic!("Incrementing the holder count would have over-flowed!");
        }

        self.bits() + 1
    }

    /// Returns a new state word with one less holder. The last holder out
    /// also clears the waiters flag, since it is the one waking them.
    #[inline]
    pub fn remove_holder(self) -> u64 {
        match self.holder_count() {
            0 => panic!("Decrementing the holder count would have under-flowed!"),
            1 => 0,
            _ => self.bits() - 1,
        }
    }
}

/// Utility function for converting raw bits to `InitLockFlags`.
#[inline]
pub fn to_flags(bits: u64) -> InitLockFlags {
    // The holder count shares the word with the flags, so the
    // unchecked constructor is needed to keep those bits.
    unsafe { InitLockFlags::from_bits_unchecked(bits) }
}
