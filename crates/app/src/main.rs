use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use audio_ripples_core::{
    AppConfig, AudioBackend, ColorBuffer, CpalBackend, DeviceId, DisturbanceMode, FixedTimestep,
    SimulationDriver,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> audio_ripples_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Run(args) => run(args),
    }
}

fn list_devices() -> audio_ripples_core::Result<()> {
    let backend = CpalBackend::new();
    let default_output = backend.default_output()?.map(|device| device.id);

    for device in backend.enumerate()? {
        let marker = if Some(device.id) == default_output { "*" } else { " " };
        let kind = if device.is_output { "output" } else { "input" };
        println!(
            "{marker} {:>3}  {:<48} {:>2} ch  {:>6} Hz  {kind:<6}  {}",
            device.id, device.name, device.channels, device.sample_rate, device.host_api
        );
    }
    Ok(())
}

fn run(args: RunArgs) -> audio_ripples_core::Result<()> {
    let config = match &args.config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };

    let mut driver = SimulationDriver::new(&config, Arc::new(CpalBackend::new()))?;
    driver.set_disturbance_mode(args.mode);

    let devices = driver.refresh_devices()?;
    tracing::info!(devices = devices.len(), mode = %args.mode, "starting visualiser");

    if !args.no_default_output {
        match driver.select_default_output() {
            Ok(Some(device)) => tracing::info!(id = device.id, name = %device.name, "monitoring default output"),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "default output unavailable"),
        }
    }
    if args.all {
        driver.select_all(&devices);
    }
    for &id in &args.devices {
        match driver.select(id) {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(id, "no such device, see `devices`"),
            Err(err) => tracing::warn!(id, error = %err, "could not monitor device"),
        }
    }

    let last_frame = drive(&mut driver, &config, args.seconds);

    for id in driver.registry().selected_ids() {
        driver.deselect(id);
    }

    if let Some(path) = &args.snapshot {
        let frame = last_frame.unwrap_or_else(|| driver.render_frame());
        write_ppm(path, &frame)?;
        tracing::info!(path = %path.display(), "snapshot written");
    }
    Ok(())
}

/// Runs the simulation and UI clocks until `limit` elapses, returning the last
/// rendered frame.
fn drive(
    driver: &mut SimulationDriver,
    config: &AppConfig,
    limit: Option<Duration>,
) -> Option<ColorBuffer> {
    let mut simulation = FixedTimestep::new(config.timing.simulation_interval());
    let mut ui = FixedTimestep::new(config.timing.ui_interval());
    let started = Instant::now();
    let mut last = started;
    let mut frame = None;

    loop {
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        for _ in 0..simulation.advance(elapsed) {
            driver.tick_simulation();
        }

        if ui.advance(elapsed) > 0 {
            if driver.frame_ready() {
                frame = Some(driver.render_frame());
            }
            log_levels(driver);
        }

        if limit.is_some_and(|limit| now - started >= limit) {
            tracing::info!(frames = driver.frame(), "run finished");
            return frame;
        }

        thread::sleep(simulation.until_next().min(ui.until_next()));
    }
}

fn log_levels(driver: &SimulationDriver) {
    for id in driver.registry().selected_ids() {
        let reading = driver.meter_reading(id);
        tracing::debug!(
            id,
            level = driver.current_level(id),
            fill = reading.fill,
            zone = ?reading.zone,
            active = reading.active,
            "level"
        );
    }
    tracing::trace!(amplitude = driver.aggregate_level(), frame = driver.frame(), "aggregate");
}

fn write_ppm(path: &Path, frame: &ColorBuffer) -> audio_ripples_core::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{} {}\n255\n", frame.width(), frame.height())?;
    out.write_all(frame.as_bytes())?;
    out.flush()?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-driven water ripple visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List capture-capable devices. The default output is marked with `*`.
    Devices,
    /// Monitor devices and drive the ripple simulation.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON configuration file. Omitted values keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Device id to monitor. May be repeated.
    #[arg(short, long = "device")]
    devices: Vec<DeviceId>,
    /// Monitor every enumerated device.
    #[arg(long)]
    all: bool,
    /// Do not monitor the default output device on startup.
    #[arg(long)]
    no_default_output: bool,
    /// Disturbance mode: point, circle or blue-shadow.
    #[arg(short, long, default_value_t = DisturbanceMode::Point)]
    mode: DisturbanceMode,
    /// Stop after this many seconds instead of running until interrupted.
    #[arg(short, long, value_parser = parse_seconds)]
    seconds: Option<Duration>,
    /// Write the last rendered frame to this file as binary PPM.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value.trim().parse().map_err(|err| format!("{err}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|err| format!("{value}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_length() {
        assert_eq!(parse_seconds("2.5"), Ok(Duration::from_millis(2500)));
        assert_eq!(parse_seconds("0"), Ok(Duration::ZERO));
    }

    #[test]
    fn rejects_unrepresentable_run_length() {
        for value in ["-1", "inf", "NaN", "1e300", "soon"] {
            assert!(parse_seconds(value).is_err(), "{value} was accepted");
        }
    }

    #[test]
    fn run_accepts_all_with_default_output() {
        let cli = Cli::try_parse_from(["audio-ripples", "run", "--all", "--seconds", "1"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert!(args.all);
        assert!(!args.no_default_output);
        assert_eq!(args.seconds, Some(Duration::from_secs(1)));
    }

    #[test]
    fn run_rejects_infinite_seconds() {
        assert!(Cli::try_parse_from(["audio-ripples", "run", "--seconds", "inf"]).is_err());
    }
}
