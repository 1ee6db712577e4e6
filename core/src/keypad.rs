use crate::error::Chip8Error;

pub const KEY_COUNT: usize = 16;

/// Pending FX0A request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitForKey {
    pub is_waiting: bool,
    pub target_register: u8,
}

/// Hex keypad state plus the single-slot "wait for key" latch
#[derive(Debug, Clone, Default)]
pub struct Keypad {
    keys: [bool; KEY_COUNT],
    wait: WaitForKey,
}

impl Keypad {
    pub fn new() -> Keypad {
        Keypad::default()
    }

    /// Record a key transition.
    ///
    /// A key-down while a wait is outstanding resolves it; the target register and the key are
    /// returned so the caller can store the key and resume execution.
    pub fn set_key_state(&mut self, key: u8, pressed: bool) -> Result<Option<(u8, u8)>, Chip8Error> {
        if key as usize >= KEY_COUNT {
            return Err(Chip8Error::InvalidKey { key });
        }

        self.keys[key as usize] = pressed;

        if pressed && self.wait.is_waiting {
            self.wait.is_waiting = false;
            return Ok(Some((self.wait.target_register, key)));
        }
        Ok(None)
    }

    /// Key codes above 0xF are never pressed
    pub fn is_pressed(&self, key: u8) -> bool {
        self.keys.get(key as usize).copied().unwrap_or(false)
    }

    /// Latch a wait request, replacing any request already outstanding
    pub fn begin_wait(&mut self, target_register: u8) {
        self.wait = WaitForKey {
            is_waiting: true,
            target_register,
        };
    }

    pub fn is_waiting(&self) -> bool {
        self.wait.is_waiting
    }

    pub fn wait_state(&self) -> WaitForKey {
        self.wait
    }
}
