use std::path::PathBuf;

use anyhow::Context as _;
use log::info;
use pitchvga::{AnalogSource, Board, Config, Constant, Pixel, SineWave, SCREEN_WIDTH};

#[argopt::cmd]
fn main(
    /// Sine tone fed to the converter, silence if omitted
    #[opt(long)]
    tone_hz: Option<f64>,
    /// Frames to run
    #[opt(long, default_value = "30")]
    frames: u32,
    /// JSON configuration file
    #[opt(long)]
    config: Option<PathBuf>,
    /// Print the configuration schema and exit
    #[opt(long)]
    print_schema: bool,
    /// Print the last frame as text
    #[opt(long)]
    show: bool,
) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if print_schema {
        let schema = schemars::schema_for!(Config);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let config = match config {
        Some(path) => {
            let s = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            serde_json::from_str(&s).with_context(|| format!("cannot parse {}", path.display()))?
        }
        None => Config::default(),
    };

    let midpoint = config.audio.midpoint() as u16;
    let input: Box<dyn AnalogSource> = match tone_hz {
        Some(freq_hz) => Box::new(SineWave {
            freq_hz,
            center: midpoint,
            amplitude: midpoint / 2,
        }),
        None => Box::new(Constant(midpoint)),
    };
    let max_hz = config.audio.max_frequency_hz;

    let mut board = Board::new(config, input)?;
    board.initialize_video();
    board.initialize_audio();

    for _ in 0..frames {
        board.exec_frame();

        let hz = board.read_detected_frequency_hz();
        info!(
            "frame {}: {hz} Hz after {} windows",
            board.frame(),
            board.completed_windows()
        );
        draw_bar(&board, hz, max_hz)?;
    }

    info!(
        "{} conversions, {} handled (mod 2^16)",
        board.conversions(),
        board.samples_handled()
    );

    if show {
        // Each grid row spans eight painted lines
        for (_, pixels) in board.signal().painted_lines().iter().step_by(8) {
            let line = pixels.iter().map(Pixel::to_string).collect::<String>();
            println!("{line}");
        }
    }

    Ok(())
}

fn draw_bar(board: &Board, hz: u16, max_hz: u32) -> anyhow::Result<()> {
    let len = (hz as u64 * SCREEN_WIDTH as u64 / max_hz.max(1) as u64) as usize;
    for col in 0..SCREEN_WIDTH {
        let pixel = if col < len {
            Pixel::Active
        } else {
            Pixel::Background
        };
        board.pixel_grid().set(0, col, pixel)?;
    }
    Ok(())
}
