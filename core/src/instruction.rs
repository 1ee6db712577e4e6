use std::fmt;

use crate::error::Chip8Error;

/// Decoded CHIP-8 instruction.
///
/// Operand naming follows the usual opcode notation: `x`/`y` are register indices taken from the
/// second and third nibble, `nn` is the low byte, `nnn` the low 12 bits and `n` the low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// 00E0
    ClearScreen,
    /// 00EE
    Return,
    /// 0NNN: machine code routine, executed as a subroutine call
    Sys { nnn: u16 },
    /// 1NNN
    Jump { nnn: u16 },
    /// 2NNN
    Call { nnn: u16 },
    /// 3XNN
    SkipEqImmediate { x: u8, nn: u8 },
    /// 4XNN
    SkipNeqImmediate { x: u8, nn: u8 },
    /// 5XY0
    SkipEqRegister { x: u8, y: u8 },
    /// 6XNN
    SetImmediate { x: u8, nn: u8 },
    /// 7XNN
    AddImmediate { x: u8, nn: u8 },
    /// 8XY0
    SetRegister { x: u8, y: u8 },
    /// 8XY1
    Or { x: u8, y: u8 },
    /// 8XY2
    And { x: u8, y: u8 },
    /// 8XY3
    Xor { x: u8, y: u8 },
    /// 8XY4
    AddRegister { x: u8, y: u8 },
    /// 8XY5
    Sub { x: u8, y: u8 },
    /// 8XY6
    ShiftRight { x: u8, y: u8 },
    /// 8XY7
    SubReverse { x: u8, y: u8 },
    /// 8XYE
    ShiftLeft { x: u8, y: u8 },
    /// 9XY0
    SkipNeqRegister { x: u8, y: u8 },
    /// ANNN
    SetIndex { nnn: u16 },
    /// BNNN
    JumpWithOffset { x: u8, nnn: u16 },
    /// CXNN
    Random { x: u8, nn: u8 },
    /// DXYN
    Draw { x: u8, y: u8, n: u8 },
    /// EX9E
    SkipKeyPressed { x: u8 },
    /// EXA1
    SkipKeyNotPressed { x: u8 },
    /// FX07
    GetDelayTimer { x: u8 },
    /// FX0A
    WaitKey { x: u8 },
    /// FX15
    SetDelayTimer { x: u8 },
    /// FX18
    SetSoundTimer { x: u8 },
    /// FX1E
    AddIndex { x: u8 },
    /// FX29
    FontCharacter { x: u8 },
    /// FX33
    BinaryCodedDecimal { x: u8 },
    /// FX55
    StoreRegisters { x: u8 },
    /// FX65
    LoadRegisters { x: u8 },
}

impl Instruction {
    /// Decode a big endian opcode word.
    ///
    /// The two fixed zero-prefixed opcodes are matched first, then the high nibble selects the
    /// family and, for families 0/5/8/9/E/F, the low nibble or low byte selects the operation.
    pub fn decode(opcode: u16) -> Result<Instruction, Chip8Error> {
        let n1 = ((opcode & 0xF000) >> 12) as u8;
        let x = ((opcode & 0x0F00) >> 8) as u8;
        let y = ((opcode & 0x00F0) >> 4) as u8;
        let n = (opcode & 0x000F) as u8;
        let nn = (opcode & 0x00FF) as u8;
        let nnn = opcode & 0x0FFF;

        let instruction = match (n1, x, y, n) {
            (0x0, 0x0, 0xE, 0x0) => Instruction::ClearScreen,
            (0x0, 0x0, 0xE, 0xE) => Instruction::Return,
            (0x0, ..) => Instruction::Sys { nnn },
            (0x1, ..) => Instruction::Jump { nnn },
            (0x2, ..) => Instruction::Call { nnn },
            (0x3, ..) => Instruction::SkipEqImmediate { x, nn },
            (0x4, ..) => Instruction::SkipNeqImmediate { x, nn },
            (0x5, .., 0x0) => Instruction::SkipEqRegister { x, y },
            (0x6, ..) => Instruction::SetImmediate { x, nn },
            (0x7, ..) => Instruction::AddImmediate { x, nn },
            (0x8, .., 0x0) => Instruction::SetRegister { x, y },
            (0x8, .., 0x1) => Instruction::Or { x, y },
            (0x8, .., 0x2) => Instruction::And { x, y },
            (0x8, .., 0x3) => Instruction::Xor { x, y },
            (0x8, .., 0x4) => Instruction::AddRegister { x, y },
            (0x8, .., 0x5) => Instruction::Sub { x, y },
            (0x8, .., 0x6) => Instruction::ShiftRight { x, y },
            (0x8, .., 0x7) => Instruction::SubReverse { x, y },
            (0x8, .., 0xE) => Instruction::ShiftLeft { x, y },
            (0x9, .., 0x0) => Instruction::SkipNeqRegister { x, y },
            (0xA, ..) => Instruction::SetIndex { nnn },
            (0xB, ..) => Instruction::JumpWithOffset { x, nnn },
            (0xC, ..) => Instruction::Random { x, nn },
            (0xD, ..) => Instruction::Draw { x, y, n },
            (0xE, _, 0x9, 0xE) => Instruction::SkipKeyPressed { x },
            (0xE, _, 0xA, 0x1) => Instruction::SkipKeyNotPressed { x },
            (0xF, _, 0x0, 0x7) => Instruction::GetDelayTimer { x },
            (0xF, _, 0x0, 0xA) => Instruction::WaitKey { x },
            (0xF, _, 0x1, 0x5) => Instruction::SetDelayTimer { x },
            (0xF, _, 0x1, 0x8) => Instruction::SetSoundTimer { x },
            (0xF, _, 0x1, 0xE) => Instruction::AddIndex { x },
            (0xF, _, 0x2, 0x9) => Instruction::FontCharacter { x },
            (0xF, _, 0x3, 0x3) => Instruction::BinaryCodedDecimal { x },
            (0xF, _, 0x5, 0x5) => Instruction::StoreRegisters { x },
            (0xF, _, 0x6, 0x5) => Instruction::LoadRegisters { x },
            _ => return Err(Chip8Error::InvalidOpcode { opcode }),
        };
        Ok(instruction)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::ClearScreen => write!(f, "CLEAR"),
            Instruction::Return => write!(f, "RET"),
            Instruction::Sys { nnn } => write!(f, "SYS 0x{:03x}", nnn),
            Instruction::Jump { nnn } => write!(f, "JMP 0x{:03x}", nnn),
            Instruction::Call { nnn } => write!(f, "CALL 0x{:03x}", nnn),
            Instruction::SkipEqImmediate { x, nn } => write!(f, "SKIP V{:x}==0x{:02x}", x, nn),
            Instruction::SkipNeqImmediate { x, nn } => write!(f, "SKIP V{:x}!=0x{:02x}", x, nn),
            Instruction::SkipEqRegister { x, y } => write!(f, "SKIP V{:x}==V{:x}", x, y),
            Instruction::SetImmediate { x, nn } => write!(f, "SET V{:x} 0x{:02x}", x, nn),
            Instruction::AddImmediate { x, nn } => write!(f, "ADD V{:x} 0x{:02x}", x, nn),
            Instruction::SetRegister { x, y } => write!(f, "SET V{:x} V{:x}", x, y),
            Instruction::Or { x, y } => write!(f, "OR V{:x} V{:x}", x, y),
            Instruction::And { x, y } => write!(f, "AND V{:x} V{:x}", x, y),
            Instruction::Xor { x, y } => write!(f, "XOR V{:x} V{:x}", x, y),
            Instruction::AddRegister { x, y } => write!(f, "ADD V{:x} V{:x}", x, y),
            Instruction::Sub { x, y } => write!(f, "SUB V{:x} V{:x}", x, y),
            Instruction::ShiftRight { x, y } => write!(f, "SHR V{:x} V{:x}", x, y),
            Instruction::SubReverse { x, y } => write!(f, "SUBN V{:x} V{:x}", x, y),
            Instruction::ShiftLeft { x, y } => write!(f, "SHL V{:x} V{:x}", x, y),
            Instruction::SkipNeqRegister { x, y } => write!(f, "SKIP V{:x}!=V{:x}", x, y),
            Instruction::SetIndex { nnn } => write!(f, "SET I 0x{:03x}", nnn),
            // The offset register depends on the interpreter quirks, see `Chip8::mnemonic`
            Instruction::JumpWithOffset { nnn, .. } => write!(f, "JMP 0x{:03x}+offset", nnn),
            Instruction::Random { x, nn } => write!(f, "RNG V{:x} 0x{:02x}", x, nn),
            Instruction::Draw { x, y, n } => write!(f, "DRAW V{:x} V{:x} {:x}", x, y, n),
            Instruction::SkipKeyPressed { x } => write!(f, "SKIP KEY V{:x}", x),
            Instruction::SkipKeyNotPressed { x } => write!(f, "SKIP !KEY V{:x}", x),
            Instruction::GetDelayTimer { x } => write!(f, "GET V{:x} DT", x),
            Instruction::WaitKey { x } => write!(f, "WAIT KEY V{:x}", x),
            Instruction::SetDelayTimer { x } => write!(f, "SET DT V{:x}", x),
            Instruction::SetSoundTimer { x } => write!(f, "SET ST V{:x}", x),
            Instruction::AddIndex { x } => write!(f, "ADD I V{:x}", x),
            Instruction::FontCharacter { x } => write!(f, "FONT V{:x}", x),
            Instruction::BinaryCodedDecimal { x } => write!(f, "BCD V{:x}", x),
            Instruction::StoreRegisters { x } => write!(f, "STORE V0..V{:x}", x),
            Instruction::LoadRegisters { x } => write!(f, "LOAD V0..V{:x}", x),
        }
    }
}
