use crate::error::Chip8Error;

pub const MEMORY_SIZE: usize = 0x1000;

/// Address where ROMs are loaded and where execution starts
pub const PROGRAM_START: u16 = 0x200;

/// Largest ROM that fits between `PROGRAM_START` and the end of memory
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - PROGRAM_START as usize;

/// Address of the built-in hexadecimal digit sprites
pub const FONT_START: u16 = 0x000;

/// Every built-in digit sprite is 5 rows tall
pub const FONT_SPRITE_HEIGHT: u16 = 5;

pub static DEFAULT_FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

/// Flat 4 KiB address space.
///
/// All accesses wrap modulo `MEMORY_SIZE`, so instructions that push I or PC past the top of
/// memory read and write from the bottom again instead of going out of bounds.
#[derive(Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Zeroed memory seeded with the given font at `FONT_START`
    pub fn new(font: &[u8]) -> Result<Memory, Chip8Error> {
        if font.len() != DEFAULT_FONT.len() {
            return Err(Chip8Error::InvalidFont { size: font.len() });
        }

        let mut bytes = vec![0u8; MEMORY_SIZE];
        let start = FONT_START as usize;
        bytes[start..start + font.len()].copy_from_slice(font);
        Ok(Memory { bytes })
    }

    /// Copy a ROM into memory starting at `PROGRAM_START`
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.is_empty() {
            return Err(Chip8Error::EmptyRom);
        }
        if rom.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                max: MAX_ROM_SIZE,
            });
        }

        let start = PROGRAM_START as usize;
        self.bytes[start..start + rom.len()].copy_from_slice(rom);
        log::debug!("loaded {} byte ROM at 0x{:03x}", rom.len(), PROGRAM_START);
        Ok(())
    }

    pub fn read_u8(&self, addr: u16) -> u8 {
        self.bytes[Self::wrap(addr)]
    }

    pub fn write_u8(&mut self, addr: u16, data: u8) {
        self.bytes[Self::wrap(addr)] = data;
    }

    /// Read the two opcode bytes at `addr`, big endian
    pub fn read_opcode(&self, addr: u16) -> [u8; 2] {
        [self.read_u8(addr), self.read_u8(addr.wrapping_add(1))]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..]
    }

    fn wrap(addr: u16) -> usize {
        addr as usize % MEMORY_SIZE
    }
}
