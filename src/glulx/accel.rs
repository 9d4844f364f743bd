//! Acceleration registration tables.
//!
//! The engine records the parameters and function bindings a program
//! registers, but provides no native routines, so every call still runs
//! the bytecode and behavior is unchanged.
use std::collections::HashMap;

/// Function numbers this engine can substitute natively: none
const SUPPORTED: &[u32] = &[];

#[derive(Debug, Default)]
pub struct Accel {
    params: HashMap<u32, u32>,
    funcs: HashMap<u32, u32>,
}

impl Accel {
    pub fn new() -> Accel {
        Accel::default()
    }

    pub fn supported(func: u32) -> bool {
        SUPPORTED.contains(&func)
    }

    pub fn set_param(&mut self, index: u32, value: u32) {
        self.params.insert(index, value);
    }

    pub fn param(&self, index: u32) -> u32 {
        *self.params.get(&index).unwrap_or(&0)
    }

    /// Bind the routine at `address` to accelerated function `func`, or
    /// remove the binding when `func` is 0.  Unsupported function numbers
    /// are ignored.
    pub fn bind(&mut self, func: u32, address: u32) {
        if func == 0 {
            self.funcs.remove(&address);
        } else if Accel::supported(func) {
            self.funcs.insert(address, func);
        } else {
            debug!(target: "app::instruction", "Acceleration of function {} not supported", func);
        }
    }

    pub fn lookup(&self, address: u32) -> Option<u32> {
        self.funcs.get(&address).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_recorded() {
        let mut a = Accel::new();
        a.set_param(0, 0x100);
        a.set_param(6, 0x2A);
        assert_eq!(a.param(0), 0x100);
        assert_eq!(a.param(6), 0x2A);
        assert_eq!(a.param(3), 0);
    }

    #[test]
    fn test_unsupported_binding_ignored() {
        let mut a = Accel::new();
        a.bind(1, 0x1000);
        assert_eq!(a.lookup(0x1000), None);
    }
}
