use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;
use voxchain::audio::capture::list_input_devices;
use voxchain::audio::device::{list_output_devices, suppress_audio_warnings};
use voxchain::cli::{Cli, Commands, ConfigAction};
use voxchain::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(
            shell,
            &mut Cli::command(),
            "voxchain",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    suppress_audio_warnings();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.stream.endpoint = endpoint;
    }
    if let Some(device) = cli.output_device {
        config.audio.output_device = Some(device);
    }
    config.validate()?;

    match cli.command {
        Commands::Speak {
            text,
            speaker,
            words_per_chunk,
            whole,
        } => {
            if speaker.is_some() {
                config.stream.speaker = speaker;
            }
            voxchain::app::run_speak(config, text, words_per_chunk, whole, cli.quiet).await?;
        }
        Commands::Convert { wav, input_device } => {
            voxchain::app::run_convert(config, wav.as_deref(), input_device.as_deref(), cli.quiet)
                .await?;
        }
        Commands::Play { wav } => {
            voxchain::app::run_play(config, &wav, cli.quiet).await?;
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref(), &config)?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Logs go to stderr. `RUST_LOG` takes precedence over the verbosity flags.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("voxchain={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        let default_path = Config::default_path()?;
        Config::load_or_default(&default_path)?
    };

    Ok(config.with_env_overrides()?)
}

/// List available audio output and input devices.
fn list_audio_devices() -> Result<()> {
    let outputs = list_output_devices()?;
    let inputs = list_input_devices()?;

    if outputs.is_empty() && inputs.is_empty() {
        eprintln!("No audio devices found");
        std::process::exit(1);
    }

    println!("Output devices:");
    for (idx, device) in outputs.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }
    println!();
    println!("Input devices:");
    for (idx, device) in inputs.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }
    Ok(())
}

fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
    config: &Config,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = match custom_path {
                Some(path) => path.to_path_buf(),
                None => Config::default_path()?,
            };
            if path.exists() {
                println!("{}", path.display());
            } else {
                println!("{} {}", path.display(), "(not created, using defaults)".dimmed());
            }
        }
    }
    Ok(())
}
