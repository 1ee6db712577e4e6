mod chip8;
mod color;
mod display;
mod error;
mod instruction;
mod keypad;
mod machine;
mod memory;
mod timer;

pub use chip8::{Chip8, Chip8Builder, Chip8Mode, Quirks, StepOutcome};
pub use color::{Chip8Color, Chip8ColorParseError, DEFAULT_BACKGROUND_COLOR, DEFAULT_FOREGROUND_COLOR};
pub use display::{Display, Frame, SCREEN_HEIGHT, SCREEN_WIDTH};
pub use error::Chip8Error;
pub use instruction::Instruction;
pub use keypad::{Keypad, WaitForKey, KEY_COUNT};
pub use machine::{AudioGate, Machine, Mute, Runner};
pub use memory::{Memory, DEFAULT_FONT, FONT_SPRITE_HEIGHT, FONT_START, MAX_ROM_SIZE, MEMORY_SIZE, PROGRAM_START};
pub use timer::{Clock, Task, TaskSlot, Ticket, DEFAULT_INSTRUCTION_HZ, DEFAULT_TIMER_HZ};
