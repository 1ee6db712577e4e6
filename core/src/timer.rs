use std::time::Duration;

/// The three periodic tasks that drive a running machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Task {
    /// Fetch and execute one instruction
    Fetch,
    /// Decrement the delay timer
    Delay,
    /// Decrement the sound timer
    Sound,
}

pub const DEFAULT_INSTRUCTION_HZ: u32 = 500;
pub const DEFAULT_TIMER_HZ: u32 = 60;

/// Tick rates of the instruction clock and of the delay/sound countdowns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    pub instruction_hz: u32,
    pub timer_hz: u32,
}

impl Clock {
    pub fn instruction_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.instruction_hz as u64)
    }

    pub fn timer_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.timer_hz as u64)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock {
            instruction_hz: DEFAULT_INSTRUCTION_HZ,
            timer_hz: DEFAULT_TIMER_HZ,
        }
    }
}

/// Proof that a task was scheduled by the most recent `arm` of its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket {
    generation: u64,
}

/// Cancellation point for one periodic task.
///
/// Every `arm` or `cancel` bumps the generation, which invalidates all tickets issued before it.
/// A scheduled tick presents its ticket when it fires and does nothing if the ticket is stale, so
/// re-arming a running timer can never leave two live countdowns behind.
#[derive(Debug, Clone)]
pub struct TaskSlot {
    task: Task,
    period: Duration,
    generation: u64,
    armed: bool,
}

impl TaskSlot {
    pub fn new(task: Task, period: Duration) -> TaskSlot {
        TaskSlot {
            task,
            period,
            generation: 0,
            armed: false,
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Invalidate any pending tick and issue a ticket for a fresh schedule
    pub fn arm(&mut self) -> Ticket {
        self.generation += 1;
        self.armed = true;
        Ticket {
            generation: self.generation,
        }
    }

    /// Ticket for the follow-up tick of the current schedule
    pub fn renew(&self) -> Option<Ticket> {
        self.armed.then_some(Ticket {
            generation: self.generation,
        })
    }

    pub fn cancel(&mut self) {
        self.generation += 1;
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.armed && ticket.generation == self.generation
    }
}
