//! Command line front end: check a paradigm, play it on a board while
//! tracking flies, or only track.

use clap::Parser;
use learnmem::{
    args::{
        CheckCommand, CommandTask, FrameOptions, LearnMemArgs, ParadigmFiles, RunCommand,
        TrackCommand,
    },
    board::{self, DummyBoard, FirmataBoard, SharedBoard},
    cancel::{install_interrupt_handler, CancelToken},
    config::Config,
    error::LearnMemError,
    frame_source::{FrameSource, ImageSequence, Paced},
    gui::{device_selector, monitor, MonitorSnapshot},
    paradigm::{Mapping, Paradigm, ParadigmLoader},
    result_writer::{self, CsvResultWriter, ResultSink, SharedSink},
    scheduler::Scheduler,
    status::Runnable,
    synthetic::{SyntheticArenas, SyntheticSettings},
    tracker::{Tracker, TrackerHandle, TrackerStats},
};

use log::{error, info, warn};
use std::{
    error::Error,
    fs::File,
    process::ExitCode,
    thread::{sleep, spawn, JoinHandle},
    time::Duration,
};

// Example:
// cargo run -- --config lab.ron run
//              --paradigm  paradigm.csv
//              --mapping   mapping.csv
//              --dummy --track --synthetic

type AppResult<T> = Result<T, Box<dyn Error>>;

fn main() -> ExitCode {
    env_logger::init();
    let args = LearnMemArgs::parse();

    let result = Config::load_or_create(&args.config)
        .map_err(Box::<dyn Error>::from)
        .and_then(|config| match args.command {
            CommandTask::Check(cmd) => check(&config, cmd),
            CommandTask::Run(cmd) => run(&config, cmd),
            CommandTask::Track(cmd) => track(&config, cmd),
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("learnmem: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load(config: &Config, files: &ParadigmFiles) -> AppResult<(Paradigm, Mapping)> {
    let mapping = Mapping::from_path(&files.mapping)?;
    let paradigm = ParadigmLoader::new(mapping.clone())
        .unit(config.controller.time_unit)
        .pwm(&config.controller.pwm)
        .load_path(&files.paradigm)?;
    for skipped in paradigm.skipped() {
        warn!("Line {} dropped: {}", skipped.line, skipped.reason);
    }
    Ok((paradigm, mapping))
}

fn check(config: &Config, cmd: CheckCommand) -> AppResult<()> {
    let (paradigm, mapping) = load(config, &cmd.files)?;
    println!(
        "{} events on {} channels, {:.1}s, {} rows dropped",
        paradigm.events().len(),
        mapping.len(),
        paradigm.duration(),
        paradigm.skipped().len()
    );
    for skipped in paradigm.skipped() {
        println!("\tline {}: {}", skipped.line, skipped.reason);
    }
    if let Some(outfile) = cmd.outfile {
        paradigm.write_csv(File::create(&outfile)?)?;
        println!("Resolved paradigm written to {}", outfile.display());
    }
    Ok(())
}

fn open_board(config: &Config, cmd: &RunCommand) -> AppResult<SharedBoard> {
    if cmd.dummy {
        return Ok(board::shared(DummyBoard::new()));
    }
    let port = match cmd.port.clone().or_else(|| config.controller.port.clone()) {
        Some(port) => port,
        None => device_selector(board::available_ports()?)?.ok_or_else(|| {
            LearnMemError::HardwareConnection("no serial device selected".to_owned())
        })?,
    };
    let firmata = FirmataBoard::open(&port, config.controller.baud_rate, config.controller.settle())?;
    Ok(board::shared(firmata))
}

fn frame_source(config: &Config, frames: &FrameOptions) -> AppResult<Box<dyn FrameSource>> {
    if frames.synthetic {
        let synthetic = SyntheticArenas::new(SyntheticSettings {
            frames: frames.synthetic_frames,
            fps: config.frames.fps,
            ..Default::default()
        });
        return Ok(Box::new(Paced::new(synthetic)));
    }
    let dir = frames
        .frames
        .clone()
        .or_else(|| config.frames.dir.clone())
        .ok_or_else(|| {
            LearnMemError::Configuration("no frames directory given or configured".to_owned())
        })?;
    Ok(Box::new(Paced::new(ImageSequence::open(dir, config.frames.fps)?)))
}

fn results(config: &Config) -> AppResult<SharedSink> {
    let writer = CsvResultWriter::new(
        &config.results.dir,
        &config.results.prefix,
        config.results.max_rows_cached,
    )?;
    info!("Results go to {}", writer.positions_path().display());
    Ok(result_writer::shared(writer))
}

/// A tracker running on its own thread.
struct TrackerThread {
    handle: TrackerHandle,
    thread: JoinHandle<learnmem::error::Result<TrackerStats>>,
}

impl TrackerThread {
    fn spawn(mut tracker: Tracker) -> Self {
        let handle = tracker.handle();
        let thread = spawn(move || tracker.run());
        Self { handle, thread }
    }

    fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    fn join(self) -> AppResult<TrackerStats> {
        self.handle.stop();
        match self.thread.join() {
            Ok(stats) => Ok(stats?),
            Err(_) => Err("tracker thread panicked".into()),
        }
    }
}

/// Watch until `finished()` or `cancel`, in the terminal or in the log.
fn watch<F, D>(cancel: &CancelToken, headless: bool, mut snapshot: F, finished: D) -> AppResult<()>
where
    F: FnMut() -> MonitorSnapshot,
    D: Fn() -> bool,
{
    if !headless {
        monitor(cancel, || MonitorSnapshot {
            finished: finished(),
            ..snapshot()
        })?;
        return Ok(());
    }

    let mut ticks = 0u64;
    while !finished() && !cancel.is_cancelled() {
        sleep(Duration::from_millis(100));
        ticks += 1;
        if ticks % 50 == 0 {
            let snap = snapshot();
            info!("Progress {:.1}%, pins {:?}", snap.progress, snap.pins);
        }
    }
    Ok(())
}

/// A run ends with its paradigm, or with its frames when tracking.
fn run_finished(scheduler: &Scheduler, tracker: Option<&TrackerThread>) -> bool {
    scheduler.is_finished() || tracker.is_some_and(TrackerThread::is_finished)
}

fn run(config: &Config, cmd: RunCommand) -> AppResult<()> {
    let (paradigm, mapping) = load(config, &cmd.files)?;
    let cancel = CancelToken::new();
    let _interrupts = install_interrupt_handler(cancel.clone());

    let sink = results(config)?;
    let board = open_board(config, &cmd)?;
    let mut scheduler = Scheduler::new(board, cancel.clone())
        .sampling_rate(config.controller.sampling_rate)
        .max_duration(config.controller.max_duration)
        .sink(sink.clone());
    scheduler.load(paradigm, mapping)?;
    scheduler.build()?;

    let tracker = if cmd.track {
        let tracker = Tracker::new(frame_source(config, &cmd.frames)?, config.tracker.clone(), &cancel)
            .sink(sink.clone())
            .pin_state(scheduler.pins());
        Some(TrackerThread::spawn(tracker))
    } else {
        None
    };

    scheduler.start();
    let watched = watch(
        &cancel,
        cmd.headless,
        || MonitorSnapshot {
            scheduler: Some(scheduler.status()),
            progress: scheduler.progress(),
            pins: scheduler.pin_state(),
            tracker: tracker.as_ref().map(|t| t.handle.stats()),
            finished: false,
        },
        || run_finished(&scheduler, tracker.as_ref()),
    );

    scheduler.stop();
    if let Some(tracker) = tracker {
        let stats = tracker.join()?;
        info!(
            "Tracked {} of {} frames, {} missing flies",
            stats.tracked_frames, stats.frame_count, stats.missing_fly
        );
    }
    if let Err(e) = sink.lock().map_err(|_| "results lock poisoned")?.flush() {
        error!("Could not flush results: {}", e);
    }
    watched
}

fn track(config: &Config, cmd: TrackCommand) -> AppResult<()> {
    let cancel = CancelToken::new();
    let _interrupts = install_interrupt_handler(cancel.clone());

    let sink = results(config)?;
    let tracker = Tracker::new(frame_source(config, &cmd.frames)?, config.tracker.clone(), &cancel)
        .sink(sink);
    let tracker = TrackerThread::spawn(tracker);

    let watched = watch(
        &cancel,
        cmd.headless,
        || MonitorSnapshot {
            tracker: Some(tracker.handle.stats()),
            ..Default::default()
        },
        || tracker.is_finished(),
    );

    let stats = tracker.join()?;
    info!(
        "Tracked {} of {} frames, {} missing flies",
        stats.tracked_frames, stats.frame_count, stats.missing_fly
    );
    watched
}
