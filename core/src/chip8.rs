// CHIP-8 interpreter
//
// Useful links:
// * [Guide to making a CHIP-8 emulator](https://tobiasvl.github.io/blog/write-a-chip-8-emulator/)
// * [Building a CHIP-8 Emulator](https://austinmorlan.com/posts/chip8_emulator/)
// * [Cowgod's Chip-8 Technical Reference](http://devernay.free.fr/hacks/chip8/C8TECH10.HTM)
//

use rand::{rngs::StdRng, RngCore, SeedableRng};

use crate::display::{Display, Frame};
use crate::error::Chip8Error;
use crate::instruction::Instruction;
use crate::keypad::Keypad;
use crate::memory::{Memory, DEFAULT_FONT, FONT_SPRITE_HEIGHT, MEMORY_SIZE, PROGRAM_START};
use crate::timer::Clock;

/// Register VF doubles as the flag register
const FLAG: usize = 0xF;

/// Largest sprite a single DXYN can draw
const MAX_SPRITE_HEIGHT: usize = 15;

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Chip8Mode {
    COSMAC_VIP,
    CHIP_48,
    SUPER_CHIP,
}

/// Behaviour differences between historical interpreters. All off by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quirks {
    /// Bitwise shift (8XY6 and 8XYE): copy VY into VX before shifting (COSMAC VIP)
    pub shift: bool,
    /// Jump with offset (BXNN): jump to XNN plus VX instead of NNN plus V0 (CHIP-48 and SUPER-CHIP)
    pub jump_with_offset: bool,
    /// Store and load registers (FX55/FX65): advance I past the last register touched (COSMAC VIP)
    pub increment_index: bool,
}

impl Quirks {
    pub fn for_mode(mode: Chip8Mode) -> Quirks {
        match mode {
            Chip8Mode::COSMAC_VIP => Quirks {
                shift: true,
                jump_with_offset: false,
                increment_index: true,
            },
            Chip8Mode::CHIP_48 | Chip8Mode::SUPER_CHIP => Quirks {
                shift: false,
                jump_with_offset: true,
                increment_index: false,
            },
        }
    }
}

/// What the scheduler has to do after an instruction executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep fetching
    Continue,
    /// FX15 loaded the delay timer with this value
    DelayTimerSet(u8),
    /// FX18 loaded the sound timer with this value
    SoundTimerSet(u8),
    /// FX0A blocked the CPU until a key goes down
    WaitingForKey,
    /// The instruction could not run and was skipped
    Fault(Chip8Error),
}

#[derive(Debug, Clone)]
pub struct Chip8Builder {
    /// ROM
    rom: Option<Vec<u8>>,
    /// Font sprite
    font: Option<Vec<u8>>,
    /// PRNG Seed
    rng_seed: Option<u64>,
    quirks: Quirks,
    clock: Clock,
}

pub struct Chip8 {
    /// General purpose registers
    regs: [u8; 16],
    /// Index register
    index: u16,
    /// Program counter
    pc: u16,
    /// Call stack of return addresses
    stack: Vec<u16>,
    /// Delay Timer
    delay_timer: u8,
    /// Sound Timer
    sound_timer: u8,
    memory: Memory,
    display: Display,
    keypad: Keypad,
    quirks: Quirks,
    clock: Clock,
    rng: StdRng,
    rng_seed: Option<u64>,
    /// Kept to rebuild memory on reset
    rom: Vec<u8>,
    font: Vec<u8>,
}

impl Chip8Builder {
    pub fn new() -> Chip8Builder {
        Chip8Builder {
            rom: None,
            font: None,
            rng_seed: None,
            quirks: Quirks::default(),
            clock: Clock::default(),
        }
    }

    pub fn with_rom(mut self, rom: Vec<u8>) -> Self {
        self.rom = Some(rom);
        self
    }

    pub fn with_font(mut self, font: Vec<u8>) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_mode(mut self, mode: Chip8Mode) -> Self {
        self.quirks = Quirks::for_mode(mode);
        self
    }

    pub fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    /// Instructions executed per second
    pub fn with_clock_hz(mut self, hz: u32) -> Self {
        self.clock.instruction_hz = hz;
        self
    }

    /// Delay and sound timer decrements per second
    pub fn with_timer_hz(mut self, hz: u32) -> Self {
        self.clock.timer_hz = hz;
        self
    }

    pub fn build(self) -> Result<Chip8, Chip8Error> {
        if self.clock.instruction_hz == 0 || self.clock.timer_hz == 0 {
            return Err(Chip8Error::InvalidClock);
        }

        let rom = self.rom.ok_or(Chip8Error::EmptyRom)?;
        let font = self.font.unwrap_or_else(|| DEFAULT_FONT.to_vec());

        let mut memory = Memory::new(&font)?;
        memory.load_rom(&rom)?;

        log::info!(
            "built CHIP-8 with {} byte ROM, {:?}, {} Hz clock",
            rom.len(),
            self.quirks,
            self.clock.instruction_hz
        );

        Ok(Chip8 {
            regs: [0u8; 16],
            index: 0,
            pc: PROGRAM_START,
            stack: Vec::new(),
            delay_timer: 0,
            sound_timer: 0,
            memory,
            display: Display::new(),
            keypad: Keypad::new(),
            quirks: self.quirks,
            clock: self.clock,
            rng: new_rng(self.rng_seed),
            rng_seed: self.rng_seed,
            rom,
            font,
        })
    }
}

impl Default for Chip8Builder {
    fn default() -> Self {
        Self::new()
    }
}

fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

impl Chip8 {
    /// Put the machine back into its power-on state with the same ROM loaded
    pub fn reset(&mut self) -> Result<(), Chip8Error> {
        let mut memory = Memory::new(&self.font)?;
        memory.load_rom(&self.rom)?;

        self.memory = memory;
        self.regs = [0u8; 16];
        self.index = 0;
        self.pc = PROGRAM_START;
        self.stack.clear();
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.display = Display::new();
        self.keypad = Keypad::new();
        self.rng = new_rng(self.rng_seed);

        log::info!("reset CHIP-8");
        Ok(())
    }

    /// Fetch, decode and execute the instruction at the program counter.
    ///
    /// The program counter is advanced before the instruction runs, so jumps and skips operate on
    /// the address of the following instruction. Nothing is fetched while waiting for a key.
    pub fn step(&mut self) -> StepOutcome {
        if self.keypad.is_waiting() {
            return StepOutcome::WaitingForKey;
        }

        let inst = self.memory.read_opcode(self.pc);
        let opcode = u16::from_be_bytes(inst);
        self.pc = self.pc.wrapping_add(2);

        let instruction = match Instruction::decode(opcode) {
            Ok(instruction) => instruction,
            Err(err) => {
                log::error!(
                    "0x{:02x}{:02x}: unimplemented / invalid opcode at 0x{:03x}",
                    inst[0],
                    inst[1],
                    self.pc.wrapping_sub(2)
                );
                return StepOutcome::Fault(err);
            }
        };

        let outcome = self.execute(instruction);

        log::trace!(
            "0x{:04x}: {:<18} pc=0x{:03x} i=0x{:03x} vf=0x{:02x}",
            opcode,
            self.mnemonic(instruction),
            self.pc,
            self.index,
            self.regs[FLAG]
        );

        outcome
    }

    /// Execute a decoded instruction against the current state.
    ///
    /// Expects the program counter to already point past the instruction.
    pub fn execute(&mut self, instruction: Instruction) -> StepOutcome {
        match instruction {
            Instruction::ClearScreen => {
                self.display.clear();
            }
            Instruction::Return => match self.stack.pop() {
                Some(addr) => self.pc = addr,
                None => {
                    let pc = self.pc.wrapping_sub(2);
                    log::error!("0x00ee: return from subroutine with an empty stack at 0x{:03x}, ignoring", pc);
                    return StepOutcome::Fault(Chip8Error::StackUnderflow { pc });
                }
            },
            Instruction::Sys { nnn } | Instruction::Call { nnn } => {
                self.stack.push(self.pc);
                self.pc = nnn;
            }
            Instruction::Jump { nnn } => {
                self.pc = nnn;
            }
            Instruction::SkipEqImmediate { x, nn } => {
                self.skip_if(self.reg(x) == nn);
            }
            Instruction::SkipNeqImmediate { x, nn } => {
                self.skip_if(self.reg(x) != nn);
            }
            Instruction::SkipEqRegister { x, y } => {
                self.skip_if(self.reg(x) == self.reg(y));
            }
            Instruction::SkipNeqRegister { x, y } => {
                self.skip_if(self.reg(x) != self.reg(y));
            }
            Instruction::SetImmediate { x, nn } => {
                self.regs[x as usize] = nn;
            }
            Instruction::AddImmediate { x, nn } => {
                self.regs[x as usize] = self.reg(x).wrapping_add(nn);
            }
            Instruction::SetRegister { x, y } => {
                self.regs[x as usize] = self.reg(y);
            }
            Instruction::Or { x, y } => {
                self.regs[x as usize] |= self.reg(y);
            }
            Instruction::And { x, y } => {
                self.regs[x as usize] &= self.reg(y);
            }
            Instruction::Xor { x, y } => {
                self.regs[x as usize] ^= self.reg(y);
            }
            Instruction::AddRegister { x, y } => {
                let (res, carry) = self.reg(x).overflowing_add(self.reg(y));
                self.set_with_flag(x, res, carry);
            }
            Instruction::Sub { x, y } => {
                let (res, borrow) = self.reg(x).overflowing_sub(self.reg(y));
                self.set_with_flag(x, res, !borrow);
            }
            Instruction::SubReverse { x, y } => {
                let (res, borrow) = self.reg(y).overflowing_sub(self.reg(x));
                self.set_with_flag(x, res, !borrow);
            }
            Instruction::ShiftRight { x, y } => {
                let value = if self.quirks.shift { self.reg(y) } else { self.reg(x) };
                self.set_with_flag(x, value >> 1, value & 0x01 == 0x01);
            }
            Instruction::ShiftLeft { x, y } => {
                let value = if self.quirks.shift { self.reg(y) } else { self.reg(x) };
                self.set_with_flag(x, value << 1, value & 0x80 == 0x80);
            }
            Instruction::SetIndex { nnn } => {
                self.index = nnn;
            }
            Instruction::JumpWithOffset { x, nnn } => {
                let offset = if self.quirks.jump_with_offset { self.reg(x) } else { self.reg(0) };
                // May point past the end of memory, fetch wraps
                self.pc = nnn + offset as u16;
            }
            Instruction::Random { x, nn } => {
                let n = self.rng.next_u32() as u8;
                self.regs[x as usize] = n & nn;
            }
            Instruction::Draw { x, y, n } => {
                let mut sprite = [0u8; MAX_SPRITE_HEIGHT];
                let rows = &mut sprite[..n as usize];
                for (row, data) in rows.iter_mut().enumerate() {
                    *data = self.memory.read_u8(self.index.wrapping_add(row as u16));
                }

                let (vx, vy) = (self.reg(x), self.reg(y));
                let collision = self.display.draw_sprite(vx, vy, rows);
                self.regs[FLAG] = collision as u8;
            }
            Instruction::SkipKeyPressed { x } => {
                self.skip_if(self.keypad.is_pressed(self.reg(x)));
            }
            Instruction::SkipKeyNotPressed { x } => {
                self.skip_if(!self.keypad.is_pressed(self.reg(x)));
            }
            Instruction::GetDelayTimer { x } => {
                self.regs[x as usize] = self.delay_timer;
            }
            Instruction::WaitKey { x } => {
                self.keypad.begin_wait(x);
                return StepOutcome::WaitingForKey;
            }
            Instruction::SetDelayTimer { x } => {
                self.delay_timer = self.reg(x);
                return StepOutcome::DelayTimerSet(self.delay_timer);
            }
            Instruction::SetSoundTimer { x } => {
                self.sound_timer = self.reg(x);
                return StepOutcome::SoundTimerSet(self.sound_timer);
            }
            Instruction::AddIndex { x } => {
                let sum = self.index as usize + self.reg(x) as usize;
                self.index = (sum % MEMORY_SIZE) as u16;
                self.regs[FLAG] = (sum >= MEMORY_SIZE) as u8;
            }
            Instruction::FontCharacter { x } => {
                // Only the low nibble selects a digit
                let digit = (self.reg(x) & 0x0F) as u16;
                self.index = digit * FONT_SPRITE_HEIGHT;
            }
            Instruction::BinaryCodedDecimal { x } => {
                let value = self.reg(x);
                self.memory.write_u8(self.index, value / 100);
                self.memory.write_u8(self.index.wrapping_add(1), (value / 10) % 10);
                self.memory.write_u8(self.index.wrapping_add(2), value % 10);
            }
            Instruction::StoreRegisters { x } => {
                for i in 0..=x {
                    let addr = self.index.wrapping_add(i as u16);
                    self.memory.write_u8(addr, self.regs[i as usize]);
                }
                self.advance_index_quirk(x);
            }
            Instruction::LoadRegisters { x } => {
                for i in 0..=x {
                    let addr = self.index.wrapping_add(i as u16);
                    self.regs[i as usize] = self.memory.read_u8(addr);
                }
                self.advance_index_quirk(x);
            }
        }

        StepOutcome::Continue
    }

    /// Decrement the delay timer, returns true while it is still running
    pub fn tick_delay(&mut self) -> bool {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.delay_timer > 0
    }

    /// Decrement the sound timer, returns true while sound should keep playing
    pub fn tick_sound(&mut self) -> bool {
        self.sound_timer = self.sound_timer.saturating_sub(1);
        self.sound_timer > 0
    }

    /// Update the keypad. Returns true if the key-down released a pending FX0A.
    pub fn set_key_state(&mut self, key: u8, pressed: bool) -> Result<bool, Chip8Error> {
        match self.keypad.set_key_state(key, pressed)? {
            Some((register, key)) => {
                self.regs[register as usize] = key;
                log::debug!("key 0x{:x} resolved wait, stored in V{:x}", key, register);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_waiting_for_key(&self) -> bool {
        self.keypad.is_waiting()
    }

    /// Audio gate: true exactly while the sound timer is non-zero
    pub fn sound_active(&self) -> bool {
        self.sound_timer > 0
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.regs
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn stack(&self) -> &[u16] {
        &self.stack[..]
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn keypad(&self) -> &Keypad {
        &self.keypad
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Snapshot of the display if a draw or clear touched it since the last call
    pub fn take_frame(&mut self) -> Option<Frame> {
        self.display.take_dirty()
    }

    /// Assembly-like text for trace logs, naming the register BNNN really adds
    pub fn mnemonic(&self, instruction: Instruction) -> String {
        match instruction {
            Instruction::JumpWithOffset { x, nnn } => {
                let offset = if self.quirks.jump_with_offset { x } else { 0 };
                format!("JMP 0x{:03x}+V{:x}", nnn, offset)
            }
            _ => instruction.to_string(),
        }
    }

    fn reg(&self, x: u8) -> u8 {
        self.regs[x as usize]
    }

    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.pc = self.pc.wrapping_add(2);
        }
    }

    /// Store an arithmetic result, then the flag. The flag wins when X is F.
    fn set_with_flag(&mut self, x: u8, value: u8, flag: bool) {
        self.regs[x as usize] = value;
        self.regs[FLAG] = flag as u8;
    }

    fn advance_index_quirk(&mut self, x: u8) {
        if self.quirks.increment_index {
            self.index = (self.index + x as u16 + 1) % MEMORY_SIZE as u16;
        }
    }
}
