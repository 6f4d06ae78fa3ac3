use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;
use std::time::Instant;

use game::best_score::BestScoreStore;
use game::config::{profile_from_args, GameConfig};
use game::controller::MatchController;
use game::input::{AutoPilot, Command, InputManager};
use game::presenter::LogPresenter;
use game::rendering::MacroquadPresenter;
use game::session::{GameMode, Session};
use game::simulation::SimulationLoop;
use shared::{OfflineTransport, Transport};
use transport::UdpTransport;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Fly alone against AI kites
    Single,
    /// Open a room others can join
    Host,
    /// Join a room at --host-addr
    Join,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short = 'm', long, value_enum, default_value = "single")]
    mode: Mode,

    /// Local UDP address to bind
    #[arg(short = 'b', long, default_value = "0.0.0.0:7400")]
    bind: String,

    /// Address of the host to join
    #[arg(long)]
    host_addr: Option<String>,

    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Kite color as #rrggbb
    #[arg(short = 'c', long)]
    color: Option<String>,

    /// Phrase revealed to whoever cuts you
    #[arg(short = 's', long)]
    secret: Option<String>,

    /// Match time limit in seconds, 0 for none (host only)
    #[arg(short = 'd', long, default_value = "0")]
    duration: u32,

    /// Guests a room admits
    #[arg(long, default_value = "3")]
    max_peers: usize,

    /// Simulation step in milliseconds
    #[arg(long, default_value = "16")]
    tick_ms: u64,

    /// File to keep the single-player best score in
    #[arg(long)]
    best_file: Option<PathBuf>,

    /// Run without a window, flown by the autopilot
    #[arg(long)]
    headless: bool,

    /// Guests a headless host waits for before starting a match
    #[arg(long, default_value = "1")]
    start_with_guests: usize,

    /// Seed for spawns and room codes
    #[arg(long)]
    seed: Option<u64>,
}

fn open_transport(
    runtime: &tokio::runtime::Runtime,
    args: &Args,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    match args.mode {
        Mode::Single => Ok(Box::new(OfflineTransport)),
        Mode::Host => {
            let transport = runtime.block_on(UdpTransport::host(&args.bind, args.max_peers))?;
            info!("Hosting on {}", transport.local_addr());
            Ok(Box::new(transport))
        }
        Mode::Join => {
            let host_addr = args.host_addr.as_deref().ok_or("--host-addr is required to join")?;
            let mut transport = runtime.block_on(UdpTransport::guest(&args.bind))?;
            transport.connect(host_addr)?;
            info!("Joining {} from {}", host_addr, transport.local_addr());
            Ok(Box::new(transport))
        }
    }
}

/// A host cannot wait for more guests than its room admits.
fn autopilot_guests(args: &Args) -> usize {
    args.start_with_guests.min(args.max_peers)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let runtime = tokio::runtime::Runtime::new()?;
    let transport = open_transport(&runtime, &args)?;

    let mode = match args.mode {
        Mode::Single => GameMode::Single,
        Mode::Host => GameMode::Host,
        Mode::Join => GameMode::Guest,
    };
    let config = GameConfig {
        tick_ms: args.tick_ms.max(1),
        ..GameConfig::default()
    };
    let bounds = config.bounds;
    let profile = profile_from_args(args.name.clone(), args.color.clone(), args.secret.clone());
    info!("Flying as {} ({})", profile.name, profile.color);

    let session = Session::new(mode, profile, config);
    let controller = MatchController::new(args.seed);
    let best_store = match &args.best_file {
        Some(path) => BestScoreStore::new(path.clone()),
        None => BestScoreStore::in_memory(),
    };
    let duration = Some(args.duration);

    if args.headless {
        let sim = SimulationLoop::new(session, controller, transport, LogPresenter::new(), best_store)
            .with_match_duration(duration);
        let autopilot = AutoPilot::new(args.seed.unwrap_or(0), autopilot_guests(&args));
        return runtime.block_on(sim.run_headless(autopilot));
    }

    // UDP tasks keep running on the runtime's workers while macroquad owns this thread
    let _guard = runtime.enter();
    let mut sim = SimulationLoop::new(session, controller, transport, MacroquadPresenter::new(bounds), best_store)
        .with_match_duration(duration);

    info!("Controls: W/S to climb and reel, A/D to steer, Enter to start, R for a rematch");
    let conf = macroquad::window::Conf {
        window_title: "Sankranti".to_string(),
        window_width: 960,
        window_height: 540,
        ..Default::default()
    };
    macroquad::Window::from_config(conf, async move {
        let mut input = InputManager::new();
        let started = Instant::now();
        loop {
            let (controls, command) = input.update();
            match command {
                Some(Command::Quit) => break,
                Some(command) => sim.handle_command(command),
                None => {}
            }

            let now_ms = started.elapsed().as_millis() as u64;
            sim.advance_to(now_ms, controls);
            sim.render();
            macroquad::window::next_frame().await;
        }
        info!("Window closed");
    });

    Ok(())
}
