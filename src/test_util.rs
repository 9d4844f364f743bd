//! Shared fixtures for unit tests
use crate::config::Config;
use crate::glulx::Glulx;

#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {{
        let result = $expr;
        assert!(result.is_ok(), "{:?}", result.err());
        result.unwrap()
    }};
}

#[macro_export]
macro_rules! assert_ok_eq {
    ($expr:expr, $value:expr) => {{
        let result = $expr;
        assert!(result.is_ok(), "{:?}", result.err());
        assert_eq!(result.unwrap(), $value);
    }};
}

#[macro_export]
macro_rules! assert_some {
    ($expr:expr) => {{
        let option = $expr;
        assert!(option.is_some());
        option.unwrap()
    }};
}

/// A minimal valid image: 256 bytes, RAM from 0x28, a 0x400-word stack, and
/// the start function at 0x28.
pub fn test_image() -> Vec<u8> {
    let mut map = vec![0; 0x100];
    map[0x00..0x04].copy_from_slice(b"Glul");
    map[0x04..0x08].copy_from_slice(&[0x00, 0x03, 0x01, 0x02]);
    map[0x08..0x0C].copy_from_slice(&[0x00, 0x00, 0x00, 0x28]);
    map[0x0C..0x10].copy_from_slice(&[0x00, 0x00, 0x01, 0x00]);
    map[0x10..0x14].copy_from_slice(&[0x00, 0x00, 0x01, 0x00]);
    map[0x14..0x18].copy_from_slice(&[0x00, 0x00, 0x04, 0x00]);
    map[0x18..0x1C].copy_from_slice(&[0x00, 0x00, 0x00, 0x28]);
    map
}

/// [test_image] with `rom` placed at the start function address
pub fn test_image_with_rom(rom: &[u8]) -> Vec<u8> {
    let mut map = test_image();
    map[0x28..0x28 + rom.len()].copy_from_slice(rom);
    map
}

/// Address of the first instruction of a [test_glulx] engine
pub const TEST_BODY: usize = 0x2B;

/// An engine over raw function bytes at 0x28, call-type byte included
pub fn test_glulx_with_rom(rom: &[u8]) -> Glulx {
    let glulx = Glulx::new(test_image_with_rom(rom), &Config::default());
    assert!(glulx.is_ok(), "{:?}", glulx.err());
    glulx.unwrap()
}

/// An engine whose start function takes no arguments and runs `code`
pub fn test_glulx(code: &[u8]) -> Glulx {
    let mut rom = vec![0xC1, 0x00, 0x00];
    rom.extend_from_slice(code);
    test_glulx_with_rom(&rom)
}
