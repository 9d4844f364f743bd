use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::GlulxRng;

pub struct ChaChaRng {
    rng: ChaCha8Rng,
}

impl ChaChaRng {
    pub fn new() -> ChaChaRng {
        ChaChaRng {
            rng: ChaCha8Rng::from_entropy(),
        }
    }
}

impl Default for ChaChaRng {
    fn default() -> Self {
        ChaChaRng::new()
    }
}

impl GlulxRng for ChaChaRng {
    fn seed(&mut self, seed: u32) {
        if seed == 0 {
            self.rng = ChaCha8Rng::from_entropy();
        } else {
            self.rng = ChaCha8Rng::seed_from_u64(seed as u64);
        }
    }

    fn random(&mut self, range: u32) -> u32 {
        if range == 0 {
            self.rng.gen()
        } else {
            self.rng.gen_range(0..range)
        }
    }
}
