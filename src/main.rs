mod cli;

use dubmerge::{config, jobs};
use dubmerge_av::{probe, tools};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "dubmerge=trace,dubmerge_av=trace".to_string()
        } else {
            "dubmerge=info,dubmerge_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Run {
            season,
            episode,
            workers,
            normalize,
            log,
            title_language,
        } => {
            let opts = jobs::RunOptions {
                season,
                episode,
                workers,
                normalize,
                log,
                title_language: title_language.map(Into::into),
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_catalog(cli.config.as_deref(), opts))
        }
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("dubmerge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_catalog(config_path: Option<&std::path::Path>, opts: jobs::RunOptions) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let outcomes = jobs::run_all(&config, opts).await?;

    let failed: Vec<&jobs::JobOutcome> = outcomes
        .iter()
        .filter(|o| o.state == jobs::JobState::Failed)
        .collect();

    println!();
    println!(
        "Processed {} episode(s): {} ok, {} failed",
        outcomes.len(),
        outcomes.len() - failed.len(),
        failed.len()
    );
    for outcome in &failed {
        println!(
            "  ✗ {}{}",
            outcome.name,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }

    if !failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn probe_file(file: &std::path::Path, config_path: Option<&std::path::Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path).unwrap_or_default();
    let ffprobe = tools::get_tool_path("ffprobe", config.tools.ffprobe.as_deref())?;
    let inventory = probe::probe(&ffprobe, file)?;

    if json {
        let json_str = serde_json::to_string_pretty(&inventory)?;
        println!("{}", json_str);
    } else {
        println!("File: {}", inventory.file_path.display());

        println!("\nVideo Streams: {}", inventory.video.len());
        for (i, stream) in inventory.video.iter().enumerate() {
            println!(
                "  [{}] {} {}x{} {:.3} fps",
                i, stream.codec, stream.width, stream.height, stream.frame_rate
            );
            if let Some(ref lang) = stream.language {
                println!("      language: {}", lang);
            }
        }

        println!("\nAudio Streams: {}", inventory.audio.len());
        for (i, stream) in inventory.audio.iter().enumerate() {
            print!(
                "  [{}] {} {}ch {} Hz {} b/s",
                i, stream.codec, stream.channels, stream.sample_rate, stream.bit_rate
            );
            if let Some(ref lang) = stream.language {
                print!(" ({})", lang);
            }
            println!();
        }

        println!("\nSubtitle Streams: {}", inventory.subtitles.len());
        for (i, stream) in inventory.subtitles.iter().enumerate() {
            print!("  [{}] {}", i, stream.codec);
            if let Some(ref lang) = stream.language {
                print!(" ({})", lang);
            }
            println!();
        }
    }

    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tool_list = tools::check_tools();
    let mut all_ok = true;

    for tool in &tool_list {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let path = path.ok_or_else(|| anyhow::anyhow!("No config file specified"))?;

    println!("Validating config: {:?}", path);
    let config = config::load_config(path)?;
    println!("✓ Configuration is valid");
    println!("  Show: {}", config.show.title_prefix);
    println!("  Normalize: {}", config.normalize.enabled);
    println!("  Workers: {}", config.merge.workers);
    println!("  Seasons: {}", config.seasons.len());
    println!(
        "  Episodes: {}",
        config.seasons.iter().map(|s| s.episodes.len()).sum::<usize>()
    );

    Ok(())
}
