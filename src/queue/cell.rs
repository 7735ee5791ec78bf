//! Single-writer atomic cells.
//!
//! Every field shared between the planner and the step generator lives in a
//! [`Cell`] tagged with the side allowed to write it. Writing requires a
//! reference to that side's token, and each token exists exactly once per
//! split queue, so a write from the wrong side does not compile.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};

/// Side of the queue that may write a cell.
pub trait Side: private::Sealed {}

/// Write capability of the planner (the producer).
#[derive(Debug)]
pub struct ProducerSide {
    _private: (),
}

/// Write capability of the step generator (the consumer).
#[derive(Debug)]
pub struct ConsumerSide {
    _private: (),
}

impl ProducerSide {
    pub(crate) const fn new() -> Self {
        Self { _private: () }
    }
}

impl ConsumerSide {
    pub(crate) const fn new() -> Self {
        Self { _private: () }
    }
}

impl Side for ProducerSide {}
impl Side for ConsumerSide {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::ProducerSide {}
    impl Sealed for super::ConsumerSide {}
}

/// Plain values stored as a 32-bit word.
pub trait Word: Copy {
    /// Encode into a word.
    fn into_word(self) -> u32;
    /// Decode from a word.
    fn from_word(word: u32) -> Self;
}

impl Word for u32 {
    #[inline]
    fn into_word(self) -> u32 {
        self
    }

    #[inline]
    fn from_word(word: u32) -> Self {
        word
    }
}

impl Word for i32 {
    #[inline]
    fn into_word(self) -> u32 {
        self as u32
    }

    #[inline]
    fn from_word(word: u32) -> Self {
        word as i32
    }
}

impl Word for usize {
    #[inline]
    fn into_word(self) -> u32 {
        self as u32
    }

    #[inline]
    fn from_word(word: u32) -> Self {
        word as usize
    }
}

impl Word for u8 {
    #[inline]
    fn into_word(self) -> u32 {
        self as u32
    }

    #[inline]
    fn from_word(word: u32) -> Self {
        word as u8
    }
}

impl Word for bool {
    #[inline]
    fn into_word(self) -> u32 {
        self as u32
    }

    #[inline]
    fn from_word(word: u32) -> Self {
        word != 0
    }
}

impl Word for f32 {
    #[inline]
    fn into_word(self) -> u32 {
        self.to_bits()
    }

    #[inline]
    fn from_word(word: u32) -> Self {
        f32::from_bits(word)
    }
}

/// An atomic value of type `T` writable only by side `S`.
///
/// Reads are allowed from either side. Plain `get`/`set` use acquire/release
/// ordering; the `_sc` variants are sequentially consistent and are used
/// where both sides write one flag each and then read the other's.
pub struct Cell<T: Word, S: Side> {
    raw: AtomicU32,
    _marker: PhantomData<(T, fn() -> S)>,
}

impl<T: Word, S: Side> Cell<T, S> {
    /// A cell holding the all-zero word (`0`, `0.0`, `false`).
    pub const fn zeroed() -> Self {
        Self {
            raw: AtomicU32::new(0),
            _marker: PhantomData,
        }
    }

    /// Read the value.
    #[inline]
    pub fn get(&self) -> T {
        T::from_word(self.raw.load(Ordering::Acquire))
    }

    /// Write the value.
    #[inline]
    pub fn set(&self, _side: &S, value: T) {
        self.raw.store(value.into_word(), Ordering::Release);
    }

    /// Sequentially consistent read.
    #[inline]
    pub fn get_sc(&self) -> T {
        T::from_word(self.raw.load(Ordering::SeqCst))
    }

    /// Sequentially consistent write.
    #[inline]
    pub fn set_sc(&self, _side: &S, value: T) {
        self.raw.store(value.into_word(), Ordering::SeqCst);
    }

    /// Sequentially consistent swap, returning the previous value.
    #[inline]
    pub fn swap_sc(&self, _side: &S, value: T) -> T {
        T::from_word(self.raw.swap(value.into_word(), Ordering::SeqCst))
    }
}

impl<T: Word> Cell<T, ConsumerSide> {
    /// Producer write to a consumer-owned cell.
    ///
    /// Only valid while the consumer cannot be looking at the cell: a block
    /// slot in the free region, or the step counters while nothing is queued.
    #[inline]
    pub(crate) fn reclaim(&self, _side: &ProducerSide, value: T) {
        self.raw.store(value.into_word(), Ordering::SeqCst);
    }
}

impl<T: Word + core::fmt::Debug, S: Side> core::fmt::Debug for Cell<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.get().fmt(f)
    }
}
