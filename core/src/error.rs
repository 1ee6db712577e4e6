use thiserror::Error;

/// Errors reported by the interpreter.
///
/// `InvalidOpcode` and `StackUnderflow` are raised while executing a program and are never fatal:
/// the dispatcher logs them, treats the instruction as a no-op and carries on. The remaining
/// variants come out of configuration and ROM loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max} bytes")]
    RomTooLarge { size: usize, max: usize },

    #[error("ROM is empty")]
    EmptyRom,

    #[error("font sprite must be 80 bytes, got {size}")]
    InvalidFont { size: usize },

    #[error("unimplemented or invalid opcode 0x{opcode:04x}")]
    InvalidOpcode { opcode: u16 },

    #[error("return with an empty call stack at 0x{pc:04x}")]
    StackUnderflow { pc: u16 },

    #[error("key code 0x{key:02x} is outside the hex keypad")]
    InvalidKey { key: u8 },

    #[error("clock frequency must be non-zero")]
    InvalidClock,
}
