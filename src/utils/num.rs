//! Numeric utilities: safe and centralized integer conversions.
//!
//! Prefer fallible conversions (returning `Option<T>`) when a value out of
//! range should stop the operation, e.g. parsing a length before slicing.
//! Prefer lossless widening with explicit helpers to keep call sites
//! consistent and searchable.

#[inline]
#[must_use]
pub fn u64_to_usize(v: u64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[inline]
#[must_use]
pub fn u16_to_usize(v: u16) -> usize {
    usize::from(v)
}

#[inline]
#[must_use]
pub fn u32_to_usize(v: u32) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
}

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    v as u64
}

#[inline]
#[must_use]
pub fn usize_to_u32(v: usize) -> Option<u32> {
    u32::try_from(v).ok()
}

#[inline]
#[must_use]
pub fn usize_to_u16(v: usize) -> Option<u16> {
    u16::try_from(v).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_to_usize_matches_std_try_from() {
        for &v in &[0u64, 1, 42, u64::from(u32::MAX), u64::from(u32::MAX) + 1] {
            assert_eq!(u64_to_usize(v), usize::try_from(v).ok());
        }
    }

    #[test]
    fn narrowing_helpers_reject_overflow() {
        assert_eq!(usize_to_u16(65_535), Some(65_535));
        assert_eq!(usize_to_u16(65_536), None);
        assert_eq!(usize_to_u32(7), Some(7));
    }

    #[test]
    fn usize_to_u64_is_lossless() {
        for &v in &[0usize, 1, 42, 10_000] {
            assert_eq!(usize_to_u64(v) as usize, v);
        }
    }
}
