use std::error::Error;
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use chordline::audio::{CpalToneSink, LoggingToneSink, SynthConfig, Waveform};
use chordline::document::{SequenceItem, format_duration};
use chordline::midi;
use chordline::sequencer::{ChannelListener, PlaybackUpdate, RunOutcome, RunSummary, Sequencer};
use chordline::timing::{ManualClock, Tempo, ThreadClock};
use chordline::Project;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam::channel::{self, Receiver, select};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chordline=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Export(args) => export(args),
        Commands::Play(args) => play(args),
        Commands::Info(args) => info(args),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Sketch melodies, play them back and export them as MIDI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a project as a Standard MIDI File.
    Export(ExportArgs),
    /// Play a project on the default audio output.
    Play(PlayArgs),
    /// Show what a project contains.
    Info(InfoArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Path to the project file (RON).
    project: PathBuf,
    /// Output path. Defaults to the project path with a `.mid` extension.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Override the project tempo, in BPM.
    #[arg(long, value_parser = clap::value_parser!(u32).range(Tempo::MIN_BPM as i64..))]
    tempo: Option<u32>,
}

#[derive(Args)]
struct PlayArgs {
    /// Path to the project file (RON).
    project: PathBuf,
    /// Repeat the melody until stopped.
    #[arg(long = "loop")]
    looping: bool,
    /// Override the project tempo, in BPM.
    #[arg(long, value_parser = clap::value_parser!(u32).range(Tempo::MIN_BPM as i64..))]
    tempo: Option<u32>,
    /// Override the project waveform.
    #[arg(long, value_enum)]
    waveform: Option<WaveformArg>,
    /// Log tones instead of sounding them, on a virtual clock.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct InfoArgs {
    /// Path to the project file (RON).
    project: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WaveformArg {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl From<WaveformArg> for Waveform {
    fn from(value: WaveformArg) -> Self {
        match value {
            WaveformArg::Sine => Waveform::Sine,
            WaveformArg::Square => Waveform::Square,
            WaveformArg::Sawtooth => Waveform::Sawtooth,
            WaveformArg::Triangle => Waveform::Triangle,
        }
    }
}

fn export(args: ExportArgs) -> Result<(), Box<dyn Error>> {
    let project = Project::load(&args.project)?;
    let tempo = args.tempo.map(Tempo::new).unwrap_or(project.tempo);

    let bytes = midi::encode(project.items.items(), tempo)?;
    let output = args
        .output
        .unwrap_or_else(|| args.project.with_extension("mid"));
    fs::write(&output, &bytes)?;

    println!(
        "Exported '{}' ({} items at {}) to {} ({} bytes)",
        project.name,
        project.items.len(),
        tempo,
        output.display(),
        bytes.len()
    );
    Ok(())
}

fn play(args: PlayArgs) -> Result<(), Box<dyn Error>> {
    let project = Project::load(&args.project)?;
    let tempo = args.tempo.map(Tempo::new).unwrap_or(project.tempo);
    let waveform = args.waveform.map(Waveform::from).unwrap_or(project.waveform);
    let looping = args.looping || project.loop_enabled;

    let (listener, updates) = ChannelListener::new();
    let sequencer = Sequencer::new(Arc::new(listener));

    if args.dry_run {
        let clock = Arc::new(ManualClock::new());
        sequencer.start(
            &project.items,
            tempo,
            looping,
            Arc::new(LoggingToneSink::new()),
            clock.clone(),
        )?;
        clock.run_until_idle();
        for update in updates.try_iter() {
            report(&project, update);
        }
        println!(
            "Virtual running time: {}",
            format_duration(clock.now().as_secs_f64())
        );
        return Ok(());
    }

    let sink = CpalToneSink::open(SynthConfig {
        waveform,
        ..SynthConfig::default()
    })?;
    let mut stop_rx = watch_stdin();

    sequencer.start(
        &project.items,
        tempo,
        looping,
        Arc::new(sink),
        Arc::new(ThreadClock::new()?),
    )?;
    println!(
        "Playing '{}' at {} ({:?}). Press Enter to stop.",
        project.name, tempo, waveform
    );

    loop {
        select! {
            recv(updates) -> update => match update {
                Ok(update) => {
                    let finished = matches!(update, PlaybackUpdate::Finished(_));
                    report(&project, update);
                    if finished {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(stop_rx) -> line => match line {
                Ok(()) => {
                    sequencer.stop();
                    println!("Stopped after {} cycle(s)", sequencer.cycle_count());
                    break;
                }
                // stdin closed: keep playing until the run ends
                Err(_) => stop_rx = channel::never(),
            },
        }
    }
    Ok(())
}

fn info(args: InfoArgs) -> Result<(), Box<dyn Error>> {
    let project = Project::load(&args.project)?;
    let items = &project.items;

    println!("{}", project.name);
    println!("  tempo:    {}", project.tempo);
    println!("  waveform: {:?}", project.waveform);
    println!("  loop:     {}", if project.loop_enabled { "on" } else { "off" });
    println!("  items:    {}", items.len());
    println!("  ticks:    {}", items.total_ticks());
    println!(
        "  length:   {}",
        format_duration(items.total_seconds(project.tempo))
    );

    for (i, item) in items.items().iter().enumerate() {
        let kind = match item {
            SequenceItem::Note(_) => "note",
            SequenceItem::Chord(_) => "chord",
        };
        println!(
            "  {:>3}. {:<5} {:<16} {} ticks",
            i + 1,
            kind,
            item.label(),
            item.duration_ticks()
        );
    }
    Ok(())
}

fn report(project: &Project, update: PlaybackUpdate) {
    match update {
        PlaybackUpdate::Step(step) => {
            let label = project
                .items
                .get(step.index)
                .map(SequenceItem::label)
                .unwrap_or_default();
            println!(
                "[cycle {}] {}/{} {}",
                step.cycle,
                step.index + 1,
                step.total,
                label
            );
        }
        PlaybackUpdate::Finished(RunSummary {
            cycles_played,
            outcome,
            ..
        }) => match outcome {
            RunOutcome::Completed => println!("Finished after {} cycle(s)", cycles_played),
            RunOutcome::LoopLimitExceeded => {
                println!("Loop limit reached after {} cycles, stopped", cycles_played)
            }
        },
    }
}

/// Sends once per line read from stdin.
fn watch_stdin() -> Receiver<()> {
    let (line_tx, line_rx) = channel::unbounded();
    let spawned = std::thread::Builder::new()
        .name("chordline-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if line.is_err() || line_tx.send(()).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("cannot watch stdin, playback runs to the end: {}", e);
    }
    line_rx
}
