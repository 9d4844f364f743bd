pub mod chacha_rng;

/// Random number source for the `random`/`setrandom` opcodes
pub trait GlulxRng {
    /// Seed the generator; 0 re-seeds from entropy
    fn seed(&mut self, seed: u32);
    /// Uniform value in `0..range`, or the full 32-bit range when 0
    fn random(&mut self, range: u32) -> u32;
}
