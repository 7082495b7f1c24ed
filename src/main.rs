use clap::{Parser, Subcommand};
use dep_melody::app_core::AppCore;
use dep_melody::config::AutoModeConfig;
use dep_melody::playback::{AudioBackend, NullBackend, RodioBackend};
use dep_melody::profile::ProfileStore;
use dep_melody::replay::ReplaySource;
use dep_melody::runtime::{spawn_tick_driver, TICK_PERIOD};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "depmelody", about = "Departure Melody Controller CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller against a telemetry stream
    Run {
        /// Telemetry file (JSON Lines, one snapshot per tick); omit for stdin
        telemetry: Option<PathBuf>,
        /// Platform audio profiles (JSON array)
        #[arg(short, long, default_value = "profiles.json")]
        profiles: PathBuf,
        /// Automatic-mode configuration file
        #[arg(short, long, default_value = "auto_mode.json")]
        config: PathBuf,
        /// Melody used when a platform has no profile
        #[arg(long, default_value = "default_melody.mp3")]
        default_melody: PathBuf,
        /// Decision logic only, no audio output
        #[arg(long)]
        headless: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
    /// Profile management
    Profiles {
        /// Platform audio profiles (JSON array)
        #[arg(short, long, default_value = "profiles.json")]
        profiles: PathBuf,
        #[command(subcommand)]
        action: ProfilesCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Show the effective configuration
    Show {
        #[arg(short, long, default_value = "auto_mode.json")]
        config: PathBuf,
    },
    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = "auto_mode.json")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ProfilesCmd {
    /// List configured platforms and their clips
    List,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            telemetry,
            profiles,
            config,
            default_melody,
            headless,
        } => run(telemetry, profiles, config, default_melody, headless),
        Commands::Config { action } => match action {
            ConfigCmd::Show { config } => {
                let config = AutoModeConfig::load(&config);
                match serde_json::to_string_pretty(&config) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigCmd::Init { config } => {
                if config.exists() {
                    eprintln!("Error: '{}' already exists", config.display());
                    std::process::exit(1);
                }
                if let Err(e) = AutoModeConfig::default().save(&config) {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
                println!("Wrote default configuration to {}", config.display());
            }
        },
        Commands::Profiles { profiles, action } => match action {
            ProfilesCmd::List => {
                let store = match ProfileStore::load(&profiles, PathBuf::new()) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                };
                if store.is_empty() {
                    println!("No profiles configured.");
                    return;
                }
                for profile in store.profiles() {
                    let inbound = profile
                        .announcement_inbound
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let outbound = profile
                        .announcement_outbound
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{} track {} | melody: {} | inbound: {} | outbound: {}",
                        profile.station_name,
                        profile.track_number,
                        profile.melody.display(),
                        inbound,
                        outbound
                    );
                }
            }
        },
    }
}

fn run(
    telemetry: Option<PathBuf>,
    profiles_path: PathBuf,
    config_path: PathBuf,
    default_melody: PathBuf,
    headless: bool,
) {
    let config = AutoModeConfig::load(&config_path);

    let profiles = match ProfileStore::load(&profiles_path, default_melody.clone()) {
        Ok(store) => {
            println!("Loaded {} platform profile(s)", store.len());
            store
        }
        Err(e) => {
            eprintln!("Warning: {} (running with default melody only)", e);
            ProfileStore::empty(default_melody)
        }
    };

    let backend: Box<dyn AudioBackend> = if headless {
        Box::new(NullBackend)
    } else {
        match RodioBackend::new() {
            Ok(backend) => Box::new(backend),
            Err(e) => {
                eprintln!("Warning: {} (continuing without audio)", e);
                Box::new(NullBackend)
            }
        }
    };

    let source = match &telemetry {
        Some(path) => match ReplaySource::from_file(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => ReplaySource::from_stdin(),
    };
    let finished = source.finished_flag();

    let core = Arc::new(AppCore::new(profiles, config, backend));
    let handle = match spawn_tick_driver(core.clone(), source) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "depMelody v{} running ({})",
        env!("CARGO_PKG_VERSION"),
        if core.get_config().is_enabled {
            "automatic mode on"
        } else {
            "automatic mode off"
        }
    );

    while !finished.load(Ordering::SeqCst) {
        std::thread::sleep(TICK_PERIOD);
    }
    // One extra period so the last snapshot is processed before shutdown.
    std::thread::sleep(TICK_PERIOD);
    handle.shutdown();

    let state = core.melody_state();
    println!(
        "Telemetry stream ended. Melody playing: {} | Announcement played: {}",
        state.is_playing, state.announcement_played
    );
}
