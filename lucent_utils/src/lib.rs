use std::fmt::Debug;
use std::hash::Hasher;

/// A closed enum that doubles as an index into a fixed-size table, such as the shader parameter
/// groups or texture units.
pub trait ShaderUniformIndex: Debug + Copy + Sized + 'static {
    const MAX: usize;

    fn index(&self) -> usize;
    fn by_index(index: usize) -> Option<Self>;
    /// Name of the table itself, used in diagnostics.
    fn name() -> &'static str;
    /// Name of this entry as it appears in shader source.
    fn label(&self) -> &'static str;

    fn all() -> impl Iterator<Item = Self> {
        (0..Self::MAX).filter_map(Self::by_index)
    }

    fn by_label(label: &str) -> Option<Self> {
        Self::all().find(|entry| entry.label() == label)
    }
}

/// Panics in debug builds, logs nothing and continues in release builds.
///
/// Use for programming errors that the caller is expected to never trigger.
#[macro_export]
macro_rules! debug_panic {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            panic!($($arg)*);
        }
    };
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable 64-bit FNV-1a hash of a string. Stays the same across runs and platforms, unlike
/// `DefaultHasher`.
pub const fn string_hash(value: &str) -> u64 {
    let bytes = value.as_bytes();
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Mixes `value` into `seed`.
#[inline]
pub const fn combine_hash(seed: &mut u64, value: u64) {
    *seed ^= value
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(*seed << 6)
        .wrapping_add(*seed >> 2);
}

/// [`Hasher`] running FNV-1a over the written bytes.
///
/// Structural hashes built with it are stable across runs, so they can be used in debug names.
#[derive(Debug, Copy, Clone)]
pub struct StableHasher(u64);

impl Default for StableHasher {
    fn default() -> Self {
        Self(FNV_OFFSET)
    }
}

impl Hasher for StableHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= *byte as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }
}

#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

#[inline]
pub const fn is_aligned(value: u64, alignment: u64) -> bool {
    alignment <= 1 || value % alignment == 0
}
