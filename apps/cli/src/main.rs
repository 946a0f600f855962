use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use framectl_core::models::BUILTIN_MODELS;
use framectl_core::session::{ControllerSession, SessionConfig};
use framectl_core::slideshow::{Slideshow, prepare_image};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Samsung SPF photo frame controller", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Session settings (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one image, read from FILE or from stdin when FILE is absent or "-"
    Send {
        file: Option<PathBuf>,

        /// Fit the image to the frame and re-encode it as JPEG
        #[arg(long)]
        fit: bool,
    },
    /// Show every image in a directory, looping until interrupted
    Slideshow {
        dir: PathBuf,

        /// Seconds between images
        #[arg(short, long, default_value_t = 5)]
        interval: u64,

        /// Stop after this many passes over the directory
        #[arg(long)]
        rounds: Option<usize>,
    },
    /// Print the display geometry of the attached frame (WIDTHxHEIGHT)
    Geometry,
    /// List supported frame models
    Models,
}

fn read_input(file: Option<&Path>) -> Result<Vec<u8>> {
    match file {
        Some(path) if path != Path::new("-") => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        _ => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .context("Failed to read stdin")?;
            Ok(data)
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };

    match args.command {
        Command::Send { file, fit } => {
            let data = read_input(file.as_deref())?;
            let mut session = ControllerSession::connect(&config)?;
            let payload = if fit {
                prepare_image(&data, session.geometry())?
            } else {
                data
            };
            let report = session.send_image(&payload)?;
            info!(
                bytes = report.payload_len,
                blocks = report.blocks,
                padding = report.padding,
                "Done"
            );
        }
        Command::Slideshow {
            dir,
            interval,
            rounds,
        } => {
            let stop = Arc::new(AtomicBool::new(false));
            let handler_stop = stop.clone();
            ctrlc::set_handler(move || {
                handler_stop.store(true, Ordering::SeqCst);
            })
            .context("Failed to install Ctrl+C handler")?;

            let mut session = ControllerSession::connect(&config)?;
            let mut show = Slideshow::new(dir, session.geometry(), stop)
                .with_interval(Duration::from_secs(interval))
                .with_rounds(rounds);
            let summary = show.run(&mut session)?;
            if summary.interrupted {
                info!(images = summary.images_sent, "Slideshow interrupted");
            } else {
                info!(
                    images = summary.images_sent,
                    rounds = summary.rounds,
                    "Slideshow finished"
                );
            }
        }
        Command::Geometry => {
            let session = ControllerSession::connect(&config)?;
            println!("{}", session.geometry());
        }
        Command::Models => {
            println!("{:<24} {:>7} {:>7}  GEOMETRY", "MODEL", "STORAGE", "DISPLAY");
            for entry in BUILTIN_MODELS {
                println!(
                    "{:<24} {:>7} {:>7}  {}",
                    entry.name,
                    format!("{:04X}", entry.storage_product_id),
                    format!("{:04X}", entry.display_product_id),
                    entry.geometry
                );
            }
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_from_stdin() {
        let args = Args::try_parse_from(["framectl", "send", "--fit"]).unwrap();
        assert!(matches!(args.command, Command::Send { file: None, fit: true }));
    }

    #[test]
    fn test_parse_slideshow_defaults() {
        let args = Args::try_parse_from(["framectl", "-v", "slideshow", "photos"]).unwrap();
        assert!(args.verbose);
        match args.command {
            Command::Slideshow {
                dir,
                interval,
                rounds,
            } => {
                assert_eq!(dir, PathBuf::from("photos"));
                assert_eq!(interval, 5);
                assert_eq!(rounds, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let args =
            Args::try_parse_from(["framectl", "geometry", "--config", "frame.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("frame.toml")));
    }

    #[test]
    fn test_read_input_from_file() {
        let path = std::env::temp_dir().join(format!("framectl-cli-{}.bin", std::process::id()));
        std::fs::write(&path, b"\xFF\xD8data").unwrap();
        let data = read_input(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(data, b"\xFF\xD8data");
    }
}
