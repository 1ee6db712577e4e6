use std::{path::PathBuf, thread, time::Duration};

use anyhow::{anyhow, Context};
use chip8_vm_core::{
    Chip8Builder, Chip8Color, Chip8Mode, Machine, Runner, DEFAULT_BACKGROUND_COLOR,
    DEFAULT_FOREGROUND_COLOR, DEFAULT_INSTRUCTION_HZ, SCREEN_HEIGHT, SCREEN_WIDTH,
};
use clap::{Parser, ValueEnum};
use sdl2::{event::Event, keyboard::Keycode, pixels::PixelFormatEnum};

mod audio;
mod keymap;

use keymap::keymap;

/// Roughly 60 frames per second
const FRAME_TIME: Duration = Duration::from_millis(16);

/// Interpreter variant, selects the instruction quirks
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    CosmacVip,
    Chip48,
    SuperChip,
}

impl From<Mode> for Chip8Mode {
    fn from(mode: Mode) -> Chip8Mode {
        match mode {
            Mode::CosmacVip => Chip8Mode::COSMAC_VIP,
            Mode::Chip48 => Chip8Mode::CHIP_48,
            Mode::SuperChip => Chip8Mode::SUPER_CHIP,
        }
    }
}

/// CHIP-8 Virtual Machine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Filepath to Chip-8 ROM file that will be executed
    #[clap(index = 1)]
    rom: PathBuf,

    /// Filepath to font file
    #[clap(long)]
    font: Option<PathBuf>,

    /// Background Color as HEX 0xAABBFF [default: 0x000000]
    #[clap(long)]
    background: Option<Chip8Color>,

    /// Foreground Color as HEX 0xAABBFF [default: 0xFFFFFF]
    #[clap(long)]
    foreground: Option<Chip8Color>,

    /// Display scaling factor
    #[clap(short, long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=100))]
    scale: u32,

    /// Instructions per second
    #[clap(short, long, default_value_t = DEFAULT_INSTRUCTION_HZ, value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    ips: u32,

    /// PRNG seed
    #[clap(long)]
    seed: Option<u64>,

    /// Interpreter quirks to emulate [default: none]
    #[clap(long, value_enum)]
    mode: Option<Mode>,

    /// Log every executed instruction
    #[clap(short, long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "trace" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let rom = std::fs::read(&args.rom)
        .with_context(|| format!("failed to read ROM file {}", args.rom.display()))?;
    let mut builder = Chip8Builder::new().with_rom(rom).with_clock_hz(args.ips);

    if let Some(font) = &args.font {
        let font_data = std::fs::read(font)
            .with_context(|| format!("failed to read font file {}", font.display()))?;
        builder = builder.with_font(font_data);
    }

    if let Some(seed) = args.seed {
        builder = builder.with_rng_seed(seed);
    }

    if let Some(mode) = args.mode {
        builder = builder.with_mode(mode.into());
    }

    let chip = builder.build()?;
    let foreground = args.foreground.unwrap_or(DEFAULT_FOREGROUND_COLOR);
    let background = args.background.unwrap_or(DEFAULT_BACKGROUND_COLOR);

    let sdl_context = sdl2::init().map_err(|e| anyhow!(e))?;
    let video_subsystem = sdl_context.video().map_err(|e| anyhow!(e))?;
    let audio_subsystem = sdl_context.audio().map_err(|e| anyhow!(e))?;

    let window = video_subsystem
        .window(
            "chip8-vm",
            SCREEN_WIDTH as u32 * args.scale,
            SCREEN_HEIGHT as u32 * args.scale,
        )
        .position_centered()
        .build()?;

    let mut canvas = window.into_canvas().build()?;
    canvas.set_draw_color(sdl2::pixels::Color::RGB(background.r, background.g, background.b));
    canvas.clear();
    canvas.present();

    let texture_creator = canvas.texture_creator();
    let mut texture = texture_creator.create_texture_streaming(
        PixelFormatEnum::RGBX8888,
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
    )?;

    // Keep the device alive for as long as the machine runs
    let (_device, beeper) = audio::open(&audio_subsystem).map_err(|e| anyhow!(e))?;
    let mut runner = Runner::spawn(Machine::new(chip).with_audio(Box::new(beeper)));

    let mut event_pump = sdl_context.event_pump().map_err(|e| anyhow!(e))?;

    'running: loop {
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => break 'running,
                Event::KeyDown {
                    keycode: Some(Keycode::F5),
                    repeat: false,
                    ..
                } => runner.reset()?,
                Event::KeyDown {
                    keycode: Some(key),
                    repeat: false,
                    ..
                } => {
                    if let Some(code) = keymap(key) {
                        runner.set_key_state(code, true)?;
                    }
                }
                Event::KeyUp {
                    keycode: Some(key), ..
                } => {
                    if let Some(code) = keymap(key) {
                        runner.set_key_state(code, false)?;
                    }
                }
                _ => {}
            }
        }

        // Only upload a new texture when the display changed
        if let Some(frame) = runner.frame() {
            let pixels = frame.to_rgbx(foreground, background);
            texture.update(None, Chip8Color::as_bytes(&pixels), SCREEN_WIDTH * 4)?;
            canvas.copy(&texture, None, None).map_err(|e| anyhow!(e))?;
            canvas.present();
        }

        thread::sleep(FRAME_TIME);
    }

    runner.stop();
    log::info!(
        "stopped after {} skipped instructions",
        runner.with_machine(|machine| machine.faults())
    );
    Ok(())
}
