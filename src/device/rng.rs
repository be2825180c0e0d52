//! Random source used for channel selection.

use core::fmt::Debug;

/// Uniform random source provided by the calling code.
pub trait Rng {
    #[cfg(feature = "defmt")]
    /// Error reported by the source.
    type Error: Debug + defmt::Format;

    #[cfg(not(feature = "defmt"))]
    /// Error reported by the source.
    type Error: Debug;

    /// Next uniformly distributed value.
    fn next_u32(&mut self) -> Result<u32, Self::Error>;

    /// Uniform value in `0..bound` by rejection sampling; `bound` must be nonzero.
    fn next_below(&mut self, bound: u32) -> Result<u32, Self::Error> {
        let zone = u32::MAX - (u32::MAX % bound);
        loop {
            let value = self.next_u32()?;
            if value < zone {
                return Ok(value % bound);
            }
        }
    }
}

/// In-place Fisher-Yates shuffle driven by `rng`.
pub fn shuffle<T, R: Rng>(items: &mut [T], rng: &mut R) -> Result<(), R::Error> {
    for i in (1..items.len()).rev() {
        let j = rng.next_below(i as u32 + 1)? as usize;
        items.swap(i, j);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    struct Counter(u32);

    impl Rng for Counter {
        type Error = ();

        fn next_u32(&mut self) -> Result<u32, Self::Error> {
            self.0 = self.0.wrapping_add(0x9E37_79B9);
            Ok(self.0)
        }
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut items = [0u8, 1, 2, 3, 4, 5, 6, 7];
        shuffle(&mut items, &mut Counter(7)).unwrap();
        let mut sorted = items;
        sorted.sort();
        assert_eq!(sorted, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn next_below_stays_in_bounds() {
        let mut rng = Counter(1);
        for bound in 1..50 {
            assert!(rng.next_below(bound).unwrap() < bound);
        }
    }

    #[test]
    fn shuffle_of_single_item_draws_nothing() {
        struct Never;
        impl Rng for Never {
            type Error = ();
            fn next_u32(&mut self) -> Result<u32, Self::Error> {
                Err(())
            }
        }
        let mut items = [42u8];
        assert!(shuffle(&mut items, &mut Never).is_ok());
    }
}
