// Commandline argument parser using clap for LearnMem

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct LearnMemArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform: check a paradigm, run it, or only track flies
    pub command: CommandTask,

    /// RON configuration file, created with the defaults if missing
    #[arg(short = 'c', long = "config", default_value = "learnmem.ron", global = true)]
    pub config: PathBuf,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Load a paradigm against a mapping and report what would be played
    #[command(about)]
    Check(CheckCommand),

    /// Play a paradigm on the board, optionally while tracking flies
    #[command(about)]
    Run(RunCommand),

    /// Track flies without driving any hardware
    #[command(about)]
    Track(TrackCommand),
}

#[derive(Debug, Args, Clone)]
pub struct ParadigmFiles {
    /// Paradigm table, one hardware event per row
    #[arg(short = 'p', long = "paradigm")]
    pub paradigm: PathBuf,

    /// Mapping table from hardware names to board pins
    #[arg(short = 'm', long = "mapping")]
    pub mapping: PathBuf,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct CheckCommand {
    #[command(flatten)]
    pub files: ParadigmFiles,

    /// Write the resolved table, in seconds, to this file
    #[arg(short = 'o', long = "out")]
    pub outfile: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct FrameOptions {
    /// Directory of frames to track, overrides the configuration
    #[arg(short = 'f', long = "frames", conflicts_with = "synthetic")]
    pub frames: Option<PathBuf>,

    /// Track generated frames instead of real ones
    #[arg(long)]
    pub synthetic: bool,

    /// Number of generated frames
    #[arg(long, default_value_t = 300, requires = "synthetic")]
    pub synthetic_frames: u64,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RunCommand {
    #[command(flatten)]
    pub files: ParadigmFiles,

    /// Serial device of the Firmata board
    #[arg(long, conflicts_with = "dummy")]
    pub port: Option<PathBuf>,

    /// Log writes instead of driving a board
    #[arg(long)]
    pub dummy: bool,

    /// Also track flies while the paradigm plays
    #[arg(short = 't', long)]
    pub track: bool,

    #[command(flatten)]
    pub frames: FrameOptions,

    /// Only log, do not draw the terminal monitor
    #[arg(long)]
    pub headless: bool,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct TrackCommand {
    #[command(flatten)]
    pub frames: FrameOptions,

    /// Only log, do not draw the terminal monitor
    #[arg(long)]
    pub headless: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parser_is_consistent() {
        LearnMemArgs::command().debug_assert();
    }

    #[test]
    fn run_with_dummy_board() {
        let args = LearnMemArgs::parse_from([
            "learnmem", "run", "-p", "paradigm.csv", "-m", "mapping.csv", "--dummy", "--track",
            "--synthetic", "--headless",
        ]);
        assert_eq!(args.config, PathBuf::from("learnmem.ron"));
        let CommandTask::Run(run) = args.command else {
            panic!("expected run");
        };
        assert!(run.dummy && run.track && run.headless && run.frames.synthetic);
        assert_eq!(run.frames.synthetic_frames, 300);
        assert_eq!(run.files.paradigm, PathBuf::from("paradigm.csv"));
    }

    #[test]
    fn port_and_dummy_conflict() {
        assert!(LearnMemArgs::try_parse_from([
            "learnmem", "run", "-p", "a.csv", "-m", "b.csv", "--dummy", "--port", "/dev/ttyACM0",
        ])
        .is_err());
    }

    #[test]
    fn config_is_global() {
        let args = LearnMemArgs::parse_from(["learnmem", "track", "--synthetic", "-c", "lab.ron"]);
        assert_eq!(args.config, PathBuf::from("lab.ron"));
    }
}
