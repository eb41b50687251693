#[derive(Clone, Debug)]
pub struct Rng {
    seed: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    pub fn next_f64(&mut self) -> f64 {
        self.seed = self.seed.wrapping_add(0x6d2b79f5);
        let mut t = self.seed;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        out as f64 / 4_294_967_296.0
    }

    /// Uniform integer in `min..=max`.
    pub fn int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as f64;
        min + (self.next_f64() * span).floor() as i32
    }

    pub fn bool(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    pub fn pick_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        (self.next_f64() * len as f64).floor().min((len - 1) as f64) as usize
    }

    pub fn pick<'a>(&mut self, values: &[&'a str]) -> &'a str {
        if values.is_empty() {
            return "";
        }
        values[self.pick_index(values.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_yields_same_sequence() {
        let mut a = Rng::new(42);
        let mut b = Rng::new(42);
        for _ in 0..32 {
            assert_eq!(a.int(-4_000, 4_000), b.int(-4_000, 4_000));
        }
    }

    #[test]
    fn int_stays_within_inclusive_bounds() {
        let mut rng = Rng::new(7);
        for _ in 0..2_000 {
            let value = rng.int(-3, 3);
            assert!((-3..=3).contains(&value));
        }
        assert_eq!(rng.int(5, 5), 5);
        assert_eq!(rng.int(5, 1), 5);
    }

    #[test]
    fn pick_handles_empty_and_single_pools() {
        let mut rng = Rng::new(1);
        assert_eq!(rng.pick(&[]), "");
        assert_eq!(rng.pick(&["only"]), "only");
    }
}
