use clap::{Parser, Subcommand};
use notescore::config::{self, Config};
use notescore::similarity;
use notescore::TranscriptionScorer;
use std::path::PathBuf;

/// Transcription accuracy scoring
#[derive(Parser)]
#[command(name = "notescore")]
#[command(about = "Score transcribed MIDI against a reference and compare instrument families")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a transcription against a reference MIDI file
    Compare {
        /// Reference MIDI file
        #[arg(long)]
        reference: PathBuf,

        /// Transcribed MIDI file
        #[arg(long)]
        transcription: PathBuf,

        /// Write the scores here instead of standard output
        #[arg(long)]
        output: Option<PathBuf>,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Instrument family table (JSON)
        #[arg(long)]
        families: Option<PathBuf>,

        /// Onset tolerance in seconds
        #[arg(long)]
        onset_tolerance: Option<f64>,

        /// Pitch tolerance in semitones
        #[arg(long)]
        pitch_tolerance: Option<f64>,

        /// Only match notes of the same instrument family
        #[arg(long)]
        require_family_match: bool,

        /// Skip the per-family scores
        #[arg(long)]
        no_family_breakdown: bool,
    },
    /// Extract family-labelled notes from a MIDI file
    Extract {
        /// MIDI file
        #[arg(long)]
        path: PathBuf,

        /// Write `family, onset, offset, pitch` lines here
        #[arg(long)]
        output: Option<PathBuf>,

        /// Instrument family table (JSON)
        #[arg(long)]
        families: Option<PathBuf>,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Build the instrument family similarity matrix from extracted features
    Similarity {
        /// JSON array of {"family", "features"} records
        #[arg(long)]
        features: PathBuf,

        /// Output JSON file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn load_or_default(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => Ok(Config::default()),
    }
}

fn write_or_print(output: Option<PathBuf>, text: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, text)?;
            log::info!("Results saved to {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Compare {
            reference,
            transcription,
            output,
            config,
            families,
            onset_tolerance,
            pitch_tolerance,
            require_family_match,
            no_family_breakdown,
        } => {
            let mut config = load_or_default(config)?;
            if let Some(path) = families {
                config.families.table_path = Some(path);
            }
            if let Some(tolerance) = onset_tolerance {
                config.scoring.onset_tolerance = tolerance;
            }
            if let Some(tolerance) = pitch_tolerance {
                config.scoring.pitch_tolerance = tolerance;
            }
            if require_family_match {
                config.scoring.require_family_match = true;
            }
            if no_family_breakdown {
                config.scoring.family_breakdown = false;
            }
            config::validate_config(&config)?;

            let scorer = TranscriptionScorer::new(config)?;
            log::info!(
                "Comparing {} against {}",
                transcription.display(),
                reference.display()
            );
            let report = scorer.compare(&reference, &transcription)?;
            write_or_print(output, &report.to_lines())?;
        }
        Commands::Extract {
            path,
            output,
            families,
            config,
        } => {
            let mut config = load_or_default(config)?;
            if let Some(table) = families {
                config.families.table_path = Some(table);
            }
            let decimals = config.output.time_decimals;
            let scorer = TranscriptionScorer::new(config)?;
            let notes = scorer.extract(&path)?;

            if output.is_some() {
                let lines = notescore::notes::format_note_lines(&notes, decimals);
                write_or_print(output, &lines)?;
            } else {
                print!("{}", notes.prepare().describe());
            }
        }
        Commands::Similarity {
            features,
            output,
            config,
        } => {
            let config = load_or_default(config)?;
            let records = similarity::load_feature_records(&features)?;
            log::info!("Loaded {} feature records", records.len());
            let matrix = similarity::similarity_from_records(&records)?;
            let output = output.unwrap_or(config.similarity.output_path);
            matrix.save_json(&output)?;
            println!("Instrument similarity matrix saved to {}", output.display());
        }
        Commands::ValidateConfig { config } => {
            let config = config::load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
