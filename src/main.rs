// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use duration_string::DurationString;
use tracing::info;
use tracing_subscriber::EnvFilter;

use music_auto_show::audio;
use music_auto_show::config::{self, builtin_profiles};
use music_auto_show::dmx::discovery;
use music_auto_show::show::{Options, Show, ShowStatus};
use music_auto_show::util::duration_minutes_seconds;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An audio-reactive DMX light show."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a show. Type b and enter to toggle blackout, s for status, q to stop.
    Run {
        /// The path to the show file.
        show_path: String,
        /// Use simulated audio analysis instead of capturing input.
        #[arg(long)]
        simulate: bool,
        /// Keep running with a simulated DMX link if the serial port can't be opened.
        #[arg(long)]
        simulate_dmx_on_failure: bool,
        /// The serial port to send DMX on. Overrides the show file.
        #[arg(short, long)]
        port: Option<String>,
        /// How long to run for, e.g. 90s or 10m. Runs until stopped when absent.
        #[arg(short, long)]
        duration: Option<String>,
        /// Prints the effective configuration before starting.
        #[arg(long)]
        print_config: bool,
    },
    /// Lists serial ports that look like DMX interfaces, best match first.
    Ports {},
    /// Lists the available audio input devices.
    Devices {},
    /// Lists the built-in fixture profiles.
    Profiles {},
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            show_path,
            simulate,
            simulate_dmx_on_failure,
            port,
            duration,
            print_config,
        } => {
            let config = config::Show::deserialize(&PathBuf::from(&show_path))?;
            if print_config {
                println!("{}", config.to_yaml()?);
            }
            let duration = match duration {
                Some(duration) => Some(Duration::from(DurationString::from_string(duration)?)),
                None => None,
            };

            let show = Show::new(
                config,
                &Options {
                    simulate_audio: simulate,
                    simulate_dmx_on_failure,
                    port,
                },
            )?;
            show.start()?;
            run(&show, duration);
            show.stop();
        }
        Commands::Ports {} => {
            let ports = discovery::ranked(discovery::available(), cfg!(windows));

            if ports.is_empty() {
                println!("No DMX candidates found.");
                return Ok(());
            }

            println!("Ports:");
            for (rank, port) in ports {
                println!("- {} [{}]", port.name, rank);
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Profiles {} => {
            let mut profiles: Vec<_> = builtin_profiles().into_iter().collect();
            profiles.sort_by(|a, b| a.0.cmp(&b.0));

            println!("Profiles:");
            for (name, profile) in profiles {
                println!(
                    "- {} ({} channels): {}",
                    name,
                    profile.channels().len(),
                    profile.description().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

/// Reads console commands on a background thread. The reader ends at EOF.
fn console() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                return;
            };
            if tx.send(line.trim().to_lowercase()).is_err() {
                return;
            }
        }
    });
    rx
}

/// Runs until the duration elapses or the console asks to stop, logging status periodically.
fn run(show: &Show, duration: Option<Duration>) {
    let started = Instant::now();
    let deadline = duration.map(|duration| started + duration);
    let commands = console();
    let mut console_open = true;
    let mut next_status = started + STATUS_INTERVAL;

    loop {
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            info!("Show duration reached");
            return;
        }
        if now >= next_status {
            log_status(&show.status(), started.elapsed());
            next_status = now + STATUS_INTERVAL;
        }

        let wake = deadline.map_or(next_status, |deadline| deadline.min(next_status));
        let timeout = wake.saturating_duration_since(now);
        if !console_open {
            thread::sleep(timeout);
            continue;
        }
        match commands.recv_timeout(timeout) {
            Ok(command) => match command.as_str() {
                "b" | "blackout" => {
                    let blackout = show.toggle_blackout();
                    info!(blackout, "Toggled blackout");
                }
                "s" | "status" => log_status(&show.status(), started.elapsed()),
                "q" | "quit" => return,
                "" => {}
                other => println!("Unknown command {}. Use b, s or q.", other),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => console_open = false,
        }
    }
}

fn log_status(status: &ShowStatus, elapsed: Duration) {
    info!(
        elapsed = duration_minutes_seconds(elapsed),
        tempo = format!("{:.1}", status.tempo),
        energy = format!("{:.2}", status.energy),
        beat = status.beat,
        blackout = status.blackout,
        drop = status.drop_active,
        buildup = status.buildup,
        dmx = %status.transmitter_state,
        simulated_dmx = status.simulated_dmx,
        frames = status.transmitter.frames_sent,
        errors = status.transmitter.errors,
        fps = format!("{:.1}", status.transmitter.actual_fps),
        "Show status"
    );
}
