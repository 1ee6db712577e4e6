use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chip8_vm_core::AudioGate;
use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};
use sdl2::AudioSubsystem;

const SAMPLE_RATE: i32 = 44_100;
const TONE_HZ: f32 = 440.0;
const VOLUME: f32 = 0.15;

/// Square wave that only sounds while the shared gate is open
pub struct SquareWave {
    phase_inc: f32,
    phase: f32,
    active: Arc<AtomicBool>,
}

impl AudioCallback for SquareWave {
    type Channel = f32;

    fn callback(&mut self, out: &mut [f32]) {
        let active = self.active.load(Ordering::Relaxed);
        for sample in out.iter_mut() {
            *sample = if !active {
                0.0
            } else if self.phase <= 0.5 {
                VOLUME
            } else {
                -VOLUME
            };
            self.phase = (self.phase + self.phase_inc) % 1.0;
        }
    }
}

/// The interpreter side of the gate, handed to the `Machine`
pub struct Beeper(Arc<AtomicBool>);

impl AudioGate for Beeper {
    fn set_active(&mut self, active: bool) {
        self.0.store(active, Ordering::Relaxed);
    }
}

/// Open a playback device that is silent until the returned `Beeper` is switched on
pub fn open(audio: &AudioSubsystem) -> Result<(AudioDevice<SquareWave>, Beeper), String> {
    let desired = AudioSpecDesired {
        freq: Some(SAMPLE_RATE),
        channels: Some(1),
        samples: None,
    };

    let active = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&active);
    let device = audio.open_playback(None, &desired, |spec| {
        log::debug!("opened audio device {:?}", spec);
        SquareWave {
            phase_inc: TONE_HZ / spec.freq as f32,
            phase: 0.0,
            active: gate,
        }
    })?;
    device.resume();

    Ok((device, Beeper(active)))
}
