use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::chip8::{Chip8, StepOutcome};
use crate::display::Frame;
use crate::error::Chip8Error;
use crate::timer::{Task, TaskSlot, Ticket};

/// Longest the worker sleeps when nothing is scheduled, e.g. while blocked on a key
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Audio output switched on and off by the sound timer
pub trait AudioGate {
    fn set_active(&mut self, active: bool);
}

/// Gate that ignores the signal
pub struct Mute;

impl AudioGate for Mute {
    fn set_active(&mut self, _active: bool) {}
}

/// A pending tick. Ordered by deadline, then by scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Event {
    deadline: Duration,
    seq: u64,
    task: Task,
    ticket: Ticket,
}

/// Drives a `Chip8` with the three periodic tasks on a virtual clock.
///
/// The fetch task executes one instruction per period and stops rescheduling itself while the
/// program waits for a key. The delay and sound tasks decrement their timer once per period until
/// it reaches zero. Time only moves through `advance`, so the same inputs always produce the same
/// interleaving.
pub struct Machine {
    chip: Chip8,
    now: Duration,
    seq: u64,
    queue: BinaryHeap<Reverse<Event>>,
    fetch: TaskSlot,
    delay: TaskSlot,
    sound: TaskSlot,
    audio: Box<dyn AudioGate + Send>,
    audio_active: bool,
    faults: u64,
}

impl Machine {
    pub fn new(chip: Chip8) -> Machine {
        let clock = chip.clock();
        Machine {
            chip,
            now: Duration::ZERO,
            seq: 0,
            queue: BinaryHeap::new(),
            fetch: TaskSlot::new(Task::Fetch, clock.instruction_period()),
            delay: TaskSlot::new(Task::Delay, clock.timer_period()),
            sound: TaskSlot::new(Task::Sound, clock.timer_period()),
            audio: Box::new(Mute),
            audio_active: false,
            faults: 0,
        }
    }

    pub fn with_audio(mut self, audio: Box<dyn AudioGate + Send>) -> Self {
        self.audio = audio;
        self
    }

    /// Schedule the first fetch at the current time
    pub fn start(&mut self) {
        let ticket = self.fetch.arm();
        self.schedule(Task::Fetch, self.now, ticket);
        log::debug!("fetch task started at {:?}", self.now);
    }

    pub fn advance(&mut self, dt: Duration) {
        self.advance_to(self.now + dt);
    }

    /// Run every tick due at or before `time`, in deadline order
    pub fn advance_to(&mut self, time: Duration) {
        while let Some(Reverse(event)) = self.queue.peek().copied() {
            if event.deadline > time {
                break;
            }
            self.queue.pop();
            self.now = event.deadline;
            self.fire(event);
        }
        self.now = self.now.max(time);
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Deadline of the earliest pending tick
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.peek().map(|Reverse(event)| event.deadline)
    }

    /// Forward a key transition. A key-down that releases FX0A restarts the fetch task.
    pub fn set_key_state(&mut self, key: u8, pressed: bool) -> Result<(), Chip8Error> {
        if self.chip.set_key_state(key, pressed)? {
            self.start();
        }
        Ok(())
    }

    /// Cancel all three tasks, reinitialise the chip and start fetching again
    pub fn reset(&mut self) -> Result<(), Chip8Error> {
        self.fetch.cancel();
        self.delay.cancel();
        self.sound.cancel();
        self.queue.clear();

        self.chip.reset()?;
        self.sync_audio();
        self.start();
        Ok(())
    }

    pub fn sound_active(&self) -> bool {
        self.chip.sound_active()
    }

    pub fn take_frame(&mut self) -> Option<Frame> {
        self.chip.take_frame()
    }

    pub fn chip(&self) -> &Chip8 {
        &self.chip
    }

    /// Number of instructions skipped because they could not execute
    pub fn faults(&self) -> u64 {
        self.faults
    }

    fn schedule(&mut self, task: Task, deadline: Duration, ticket: Ticket) {
        self.seq += 1;
        self.queue.push(Reverse(Event {
            deadline,
            seq: self.seq,
            task,
            ticket,
        }));
    }

    fn slot_mut(&mut self, task: Task) -> &mut TaskSlot {
        match task {
            Task::Fetch => &mut self.fetch,
            Task::Delay => &mut self.delay,
            Task::Sound => &mut self.sound,
        }
    }

    fn fire(&mut self, event: Event) {
        if !self.slot_mut(event.task).is_current(event.ticket) {
            log::trace!("dropping stale {:?} tick", event.task);
            return;
        }

        let keep_running = match event.task {
            Task::Fetch => self.run_fetch(),
            Task::Delay => self.chip.tick_delay(),
            Task::Sound => self.chip.tick_sound(),
        };

        let slot = self.slot_mut(event.task);
        if !keep_running {
            slot.cancel();
        } else if let Some(ticket) = slot.renew() {
            let deadline = event.deadline + slot.period();
            self.schedule(event.task, deadline, ticket);
        }
        self.sync_audio();
    }

    /// Execute one instruction. Returns false when the program blocked on a key.
    fn run_fetch(&mut self) -> bool {
        match self.chip.step() {
            StepOutcome::Continue => {}
            StepOutcome::DelayTimerSet(value) => self.restart_countdown(Task::Delay, value),
            StepOutcome::SoundTimerSet(value) => self.restart_countdown(Task::Sound, value),
            StepOutcome::WaitingForKey => {
                log::debug!("fetch suspended until a key is pressed");
                return false;
            }
            StepOutcome::Fault(err) => {
                self.faults += 1;
                log::warn!("skipped instruction: {}", err);
            }
        }
        true
    }

    /// Replace any running countdown with a fresh one, starting one period from now
    fn restart_countdown(&mut self, task: Task, value: u8) {
        let now = self.now;
        let slot = self.slot_mut(task);
        if value == 0 {
            slot.cancel();
            return;
        }
        let ticket = slot.arm();
        let deadline = now + slot.period();
        log::trace!("{:?} countdown restarted from {}", slot.task(), value);
        self.schedule(task, deadline, ticket);
    }

    fn sync_audio(&mut self) {
        let active = self.chip.sound_active();
        if active != self.audio_active {
            self.audio_active = active;
            self.audio.set_active(active);
            log::debug!("audio {}", if active { "on" } else { "off" });
        }
    }
}

struct State {
    machine: Machine,
    running: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    /// Wall clock instant that maps to virtual time zero
    origin: Instant,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the machine with its virtual clock caught up to the wall clock
    fn lock_synced(&self) -> MutexGuard<'_, State> {
        let mut state = self.lock();
        state.machine.advance_to(self.origin.elapsed());
        state
    }
}

/// Runs a `Machine` against the wall clock on a worker thread.
///
/// All access goes through one mutex, so no two tasks ever interleave inside an instruction.
pub struct Runner {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Runner {
    pub fn spawn(mut machine: Machine) -> Runner {
        let now = Instant::now();
        let origin = now.checked_sub(machine.now()).unwrap_or(now);
        machine.start();

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                machine,
                running: true,
            }),
            wake: Condvar::new(),
            origin,
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || run(&shared))
        };

        Runner {
            shared,
            worker: Some(worker),
        }
    }

    pub fn set_key_state(&self, key: u8, pressed: bool) -> Result<(), Chip8Error> {
        self.shared.lock_synced().machine.set_key_state(key, pressed)?;
        self.shared.wake.notify_one();
        Ok(())
    }

    pub fn reset(&self) -> Result<(), Chip8Error> {
        self.shared.lock_synced().machine.reset()?;
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Latest frame, if the display changed since the previous call
    pub fn frame(&self) -> Option<Frame> {
        self.shared.lock().machine.take_frame()
    }

    pub fn sound_active(&self) -> bool {
        self.shared.lock().machine.sound_active()
    }

    /// Run `f` against the machine while holding the lock
    pub fn with_machine<T>(&self, f: impl FnOnce(&Machine) -> T) -> T {
        f(&self.shared.lock().machine)
    }

    pub fn stop(&mut self) {
        self.shared.lock().running = false;
        self.shared.wake.notify_one();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("CHIP-8 worker thread panicked");
            }
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: &Shared) {
    let mut state = shared.lock();
    while state.running {
        state.machine.advance_to(shared.origin.elapsed());

        let timeout = match state.machine.next_deadline() {
            Some(deadline) => deadline.saturating_sub(shared.origin.elapsed()),
            None => IDLE_WAIT,
        };
        state = shared
            .wake
            .wait_timeout(state, timeout)
            .map(|(state, _)| state)
            .unwrap_or_else(|err| err.into_inner().0);
    }
    log::debug!("CHIP-8 worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip8::Chip8Builder;
    use std::sync::atomic::{AtomicBool, Ordering};

    const FETCH: Duration = Duration::from_millis(2);
    const TICK: Duration = Duration::from_nanos(16_666_666);

    fn setup(rom: &[u8]) -> Machine {
        let chip = Chip8Builder::new()
            .with_rom(rom.to_vec())
            .with_rng_seed(310349960114u64)
            .build()
            .unwrap();
        let mut machine = Machine::new(chip);
        machine.start();
        machine
    }

    /// Records the last signal so tests can observe the gate
    struct Probe(Arc<AtomicBool>);

    impl AudioGate for Probe {
        fn set_active(&mut self, active: bool) {
            self.0.store(active, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fetch_cadence() {
        // Arrange: V0 += 1 forever
        let mut machine = setup(&[0x70, 0x01, 0x12, 0x00]);

        // Act: First fetch is due immediately, then one every 2ms
        machine.advance(Duration::ZERO);
        assert_eq!(machine.chip().registers()[0], 1);
        machine.advance(FETCH * 9);

        // Assert: 10 instructions, half of them increments
        assert_eq!(machine.chip().registers()[0], 5);
        assert_eq!(machine.next_deadline(), Some(FETCH * 10));
    }

    #[test]
    fn test_delay_countdown() {
        // Arrange: V0 = 3, delay = V0, then spin
        let mut machine = setup(&[0x60, 0x03, 0xF0, 0x15, 0x12, 0x04]);
        machine.advance(FETCH);
        assert_eq!(machine.chip().delay_timer(), 3);

        // Act + Assert: One decrement per timer period
        machine.advance(TICK);
        assert_eq!(machine.chip().delay_timer(), 2);
        machine.advance(TICK * 2);
        assert_eq!(machine.chip().delay_timer(), 0);

        // Assert: Stops at zero
        machine.advance(TICK * 5);
        assert_eq!(machine.chip().delay_timer(), 0);
    }

    #[test]
    fn test_delay_restart_cancels_pending_tick() {
        // Arrange: Reload the delay timer with 10 every other instruction
        let mut machine = setup(&[0x60, 0x0A, 0xF0, 0x15, 0x12, 0x02]);

        // Act: Every restart lands well inside one timer period
        machine.advance(TICK * 10);

        // Assert: No tick from an earlier restart ever fired
        assert_eq!(machine.chip().delay_timer(), 10);
    }

    #[test]
    fn test_single_countdown_after_restart() {
        // Arrange: Start the delay timer twice, one fetch apart, then spin
        let mut machine = setup(&[0x60, 0x05, 0xF0, 0x15, 0xF0, 0x15, 0x12, 0x06]);
        machine.advance(FETCH * 2);
        assert_eq!(machine.chip().delay_timer(), 5);

        // Act: Five periods after the second start
        machine.advance(TICK * 5);

        // Assert: Exactly five decrements, not ten
        assert_eq!(machine.chip().delay_timer(), 0);
        machine.advance(TICK);
        assert_eq!(machine.chip().delay_timer(), 0);

        // Assert: After four periods one decrement is left
        let mut machine = setup(&[0x60, 0x05, 0xF0, 0x15, 0xF0, 0x15, 0x12, 0x06]);
        machine.advance(FETCH * 2);
        machine.advance(TICK * 4);
        assert_eq!(machine.chip().delay_timer(), 1);
    }

    #[test]
    fn test_sound_restart_keeps_single_countdown() {
        // Arrange: Start the sound timer twice, one fetch apart, then spin
        let rom = [0x60, 0x05, 0xF0, 0x18, 0xF0, 0x18, 0x12, 0x06];
        let mut machine = setup(&rom);
        machine.advance(FETCH * 2);
        assert_eq!(machine.chip().sound_timer(), 5);

        // Act: Four periods after the second start
        machine.advance(TICK * 4);

        // Assert: The first schedule was cancelled, one decrement is left
        assert_eq!(machine.chip().sound_timer(), 1);
        assert!(machine.sound_active());

        // Act + Assert: The fifth period silences it
        machine.advance(TICK);
        assert_eq!(machine.chip().sound_timer(), 0);
        assert!(!machine.sound_active());
    }

    #[test]
    fn test_sound_reload_cancels_pending_tick() {
        // Arrange: Reload the sound timer with 10 every other instruction
        let mut machine = setup(&[0x60, 0x0A, 0xF0, 0x18, 0x12, 0x02]);

        // Act: Every restart lands well inside one timer period
        machine.advance(TICK * 10);

        // Assert: No tick from an earlier restart ever fired
        assert_eq!(machine.chip().sound_timer(), 10);
        assert!(machine.sound_active());
    }

    #[test]
    fn test_sound_gate() {
        // Arrange: V0 = 2, sound = V0, then spin
        let flag = Arc::new(AtomicBool::new(false));
        let chip = Chip8Builder::new()
            .with_rom(vec![0x60, 0x02, 0xF0, 0x18, 0x12, 0x04])
            .build()
            .unwrap();
        let mut machine = Machine::new(chip).with_audio(Box::new(Probe(Arc::clone(&flag))));
        machine.start();

        // Act + Assert: Audio starts with the timer
        machine.advance(FETCH);
        assert!(machine.sound_active());
        assert!(flag.load(Ordering::SeqCst));

        // Act + Assert: Still on after one tick
        machine.advance(TICK);
        assert_eq!(machine.chip().sound_timer(), 1);
        assert!(flag.load(Ordering::SeqCst));

        // Act + Assert: Silenced when the timer reaches zero
        machine.advance(TICK);
        assert_eq!(machine.chip().sound_timer(), 0);
        assert!(!machine.sound_active());
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_sound_zero_does_not_start() {
        // Arrange: sound = V0 = 0
        let mut machine = setup(&[0xF0, 0x18, 0x12, 0x02]);

        // Act: Step CPU Instruction
        machine.advance(TICK * 2);

        // Assert: Audio never turned on
        assert!(!machine.sound_active());
        assert_eq!(machine.chip().sound_timer(), 0);
    }

    #[test]
    fn test_wait_for_key_suspends_fetch() {
        // Arrange: Wait for a key into V3, then V1 = 1, then spin
        let mut machine = setup(&[0xF3, 0x0A, 0x61, 0x01, 0x12, 0x04]);

        // Act: Block
        machine.advance(FETCH * 10);

        // Assert: Nothing runs and fetch is no longer scheduled
        assert!(machine.chip().is_waiting_for_key());
        assert_eq!(machine.chip().pc(), 0x202);
        assert_eq!(machine.next_deadline(), None);

        // Act: Key up is ignored, key down resolves
        machine.set_key_state(0x7, false).unwrap();
        assert_eq!(machine.next_deadline(), None);
        machine.set_key_state(0x7, true).unwrap();
        machine.advance(FETCH);

        // Assert: Key stored and execution resumed
        assert_eq!(machine.chip().registers()[0x3], 0x7);
        assert_eq!(machine.chip().registers()[0x1], 0x1);
        assert!(!machine.chip().is_waiting_for_key());
    }

    #[test]
    fn test_timers_run_while_waiting_for_key() {
        // Arrange: delay = 2, then wait for a key
        let mut machine = setup(&[0x60, 0x02, 0xF0, 0x15, 0xF1, 0x0A]);

        // Act: Block and let the delay run out
        machine.advance(FETCH * 2 + TICK * 2);

        // Assert: Countdown finished while fetch was suspended
        assert!(machine.chip().is_waiting_for_key());
        assert_eq!(machine.chip().delay_timer(), 0);
    }

    #[test]
    fn test_key_before_wait_has_no_effect() {
        // Arrange: Spin before ever reaching FX0A
        let mut machine = setup(&[0x12, 0x00]);
        machine.advance(FETCH);

        // Act: Press a key while running
        machine.set_key_state(0x5, true).unwrap();
        machine.advance(FETCH * 3);

        // Assert: Program flow unchanged, key latched for EX9E
        assert_eq!(machine.chip().pc(), 0x200);
        assert!(machine.chip().keypad().is_pressed(0x5));
        assert!(machine.chip().registers().iter().all(|r| *r == 0));
    }

    #[test]
    fn test_invalid_key() {
        let mut machine = setup(&[0x12, 0x00]);

        assert_eq!(
            machine.set_key_state(0x10, true),
            Err(Chip8Error::InvalidKey { key: 0x10 })
        );
    }

    #[test]
    fn test_fault_is_skipped() {
        // Arrange: Invalid opcode followed by V0 = 1
        let mut machine = setup(&[0xFF, 0xFF, 0x60, 0x01, 0x12, 0x04]);

        // Act: Step CPU Instruction
        machine.advance(FETCH);

        // Assert: Execution continued past the fault
        assert_eq!(machine.faults(), 1);
        assert_eq!(machine.chip().registers()[0], 1);
    }

    #[test]
    fn test_reset_cancels_pending_ticks() {
        // Arrange: Start delay and sound, then spin
        let mut machine = setup(&[0x60, 0x09, 0xF0, 0x15, 0xF0, 0x18, 0x12, 0x06]);
        machine.advance(FETCH * 3);
        assert!(machine.sound_active());

        // Act: Reset with ticks still queued
        machine.reset().unwrap();

        // Assert: Only the fresh fetch is pending, audio is off
        assert_eq!(machine.next_deadline(), Some(machine.now()));
        assert!(!machine.sound_active());

        // Act: Run the program again past the old tick deadlines
        machine.advance(Duration::ZERO);
        assert_eq!(machine.chip().registers()[0], 9);
        machine.advance(TICK * 3);

        // Assert: Two ticks since FX15 ran again at 8ms, none left over from before the reset
        assert_eq!(machine.chip().delay_timer(), 7);
    }

    #[test]
    fn test_reset_reloads_program() {
        // Arrange: Self-modifying program overwrites its first opcode
        let mut machine = setup(&[0x60, 0x12, 0xA2, 0x00, 0xF0, 0x55, 0x12, 0x06]);
        machine.advance(FETCH * 4);
        assert_eq!(machine.chip().memory().read_u8(0x200), 0x12);

        // Act: Reset
        machine.reset().unwrap();

        // Assert: ROM image restored
        assert_eq!(machine.chip().memory().read_u8(0x200), 0x60);
        assert_eq!(machine.chip().pc(), 0x200);
    }

    #[test]
    fn test_runner_resume_keeps_cadence() {
        // Arrange: Wait for a key, then V0 += 1 forever
        let chip = Chip8Builder::new()
            .with_rom(vec![0xF1, 0x0A, 0x70, 0x01, 0x12, 0x02])
            .build()
            .unwrap();
        let runner = Runner::spawn(Machine::new(chip));

        // Act: Stay blocked for most of an idle wait, then press a key
        thread::sleep(Duration::from_millis(45));
        let pressed = Instant::now();
        runner.set_key_state(0x1, true).unwrap();
        thread::sleep(Duration::from_millis(4));

        // Assert: Only the instructions due since the key-down ran, no catch-up burst
        let (counter, elapsed) = runner.with_machine(|machine| {
            (machine.chip().registers()[0], pressed.elapsed())
        });
        let bound = elapsed.as_millis() / (FETCH.as_millis() * 2) + 2;
        assert!(
            (counter as u128) <= bound,
            "{} increments {:?} after the key-down",
            counter,
            elapsed
        );
        assert_eq!(runner.with_machine(|machine| machine.chip().registers()[0x1]), 0x1);
    }

    #[test]
    fn test_runner_reset_keeps_cadence() {
        // Arrange: V0 += 1 forever
        let chip = Chip8Builder::new()
            .with_rom(vec![0x70, 0x01, 0x12, 0x00])
            .build()
            .unwrap();
        let runner = Runner::spawn(Machine::new(chip));
        thread::sleep(Duration::from_millis(20));

        // Act: Reset, then run briefly
        let reset = Instant::now();
        runner.reset().unwrap();
        thread::sleep(Duration::from_millis(4));

        // Assert: Restarted from the reset time on, at the normal rate
        let (counter, elapsed) = runner.with_machine(|machine| {
            (machine.chip().registers()[0], reset.elapsed())
        });
        let bound = elapsed.as_millis() / (FETCH.as_millis() * 2) + 2;
        assert!((counter as u128) <= bound, "{} increments {:?} after reset", counter, elapsed);
    }

    #[test]
    fn test_runner_smoke() {
        // Arrange: V0 += 1 forever, clear once
        let chip = Chip8Builder::new()
            .with_rom(vec![0x00, 0xE0, 0x70, 0x01, 0x12, 0x02])
            .build()
            .unwrap();
        let mut runner = Runner::spawn(Machine::new(chip));

        // Act: Run for a while on the wall clock
        thread::sleep(Duration::from_millis(100));

        // Assert: Instructions executed and the display was published
        let counter = runner.with_machine(|machine| machine.chip().registers()[0]);
        assert!(counter > 0);
        assert!(runner.frame().is_some());
        assert!(!runner.sound_active());
        assert_eq!(runner.set_key_state(0x20, true), Err(Chip8Error::InvalidKey { key: 0x20 }));
        runner.reset().unwrap();

        runner.stop();
        runner.stop();
    }
}
