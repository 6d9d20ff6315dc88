//! # Text Command Module
//!
//! Parses the single-line commands typed on stdin and applies them to the
//! pipeline. Every rejection leaves the pipeline exactly as it was.
//!
//! ## Commands
//! - `h` prints the help text
//! - `mode tune|idle`, `mode record <label>`, `mode compare [label] [save_as]`
//! - `filter <hz>` sets the low-pass cutoff, `low <hz>` the high-pass cutoff
//! - `sample <hz>` and `frame <n>` change the block geometry
//! - `quit`

use spectrum_core::{FingerprintStore, Mode, Pipeline};
use thiserror::Error;

use crate::config::CommandPolicy;

pub const HELP: &str = "\
Text based interface:
  mode tune                      - show the nearest note and a sharp/flat indicator
  mode record <label>            - store the next full spectrogram under <label>
  mode compare [label] [save_as] - score the next spectrogram against <label>,
                                   or against every fingerprint when omitted
  mode idle                      - analyse only
  filter <hz>                    - low-pass cutoff
  low    <hz>                    - high-pass cutoff
  sample <hz>                    - sampling frequency
  frame  <n>                     - samples per block
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    SetMode(Mode),
    HighCutoff(f64),
    LowCutoff(f64),
    SampleRate(u32),
    FrameLength(usize),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("empty command, type h for help")]
    Empty,

    #[error("unknown command {0:?}, type h for help")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("filter frequency must be positive and at most {max} Hz")]
    HighCutoff { max: f64 },

    #[error("sample rate must be one of {0:?} Hz")]
    SampleRate(Vec<u32>),

    #[error("frame length must be one of {0:?}")]
    FrameLength(Vec<usize>),
}

/// Parses one input line.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&name, args)) = words.split_first() else {
        return Err(CommandError::Empty);
    };

    match name {
        "h" | "help" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        "mode" => parse_mode(args).map(Command::SetMode),
        "filter" => number(args, "filter <hz>").map(Command::HighCutoff),
        "low" => number(args, "low <hz>").map(Command::LowCutoff),
        "sample" => number(args, "sample <hz>").map(Command::SampleRate),
        "frame" => number(args, "frame <n>").map(Command::FrameLength),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn parse_mode(args: &[&str]) -> Result<Mode, CommandError> {
    const USAGE: &str = "mode tune|idle|record <label>|compare [label] [save_as]";
    match args {
        ["tune"] => Ok(Mode::Tuning),
        ["idle"] => Ok(Mode::Idle),
        ["record", label] => Ok(Mode::Recording {
            label: label.to_string(),
        }),
        ["record"] => Err(CommandError::Usage("mode record <label>")),
        ["compare", rest @ ..] if rest.len() <= 2 => Ok(Mode::Comparing {
            target: rest.first().map(|s| s.to_string()),
            save_as: rest.get(1).map(|s| s.to_string()),
        }),
        _ => Err(CommandError::Usage(USAGE)),
    }
}

fn number<T: std::str::FromStr>(args: &[&str], usage: &'static str) -> Result<T, CommandError> {
    match args {
        [value] => value.parse().map_err(|_| CommandError::Usage(usage)),
        _ => Err(CommandError::Usage(usage)),
    }
}

impl CommandPolicy {
    /// Applies the console's reconfiguration limits.
    pub fn check(&self, command: &Command) -> Result<(), CommandError> {
        match *command {
            Command::HighCutoff(hz) if !(hz > 0.0 && hz <= self.max_high_cutoff) => {
                Err(CommandError::HighCutoff {
                    max: self.max_high_cutoff,
                })
            }
            Command::SampleRate(hz) if !self.sample_rates.contains(&hz) => {
                Err(CommandError::SampleRate(self.sample_rates.clone()))
            }
            Command::FrameLength(n) if !self.frame_lengths.contains(&n) => {
                Err(CommandError::FrameLength(self.frame_lengths.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Applies a pipeline-only command. Help, quit and sample rate changes need
/// the audio source and are handled by the caller.
pub fn apply<S: FingerprintStore>(
    pipeline: &mut Pipeline<S>,
    command: Command,
) -> spectrum_core::Result<()> {
    match command {
        Command::SetMode(mode) => pipeline.set_mode(mode),
        Command::HighCutoff(hz) => pipeline.set_high_cutoff(hz),
        Command::LowCutoff(hz) => pipeline.set_low_cutoff(hz),
        Command::FrameLength(n) => pipeline.set_block_length(n),
        Command::SampleRate(hz) => pipeline.set_sample_rate(hz),
        Command::Help | Command::Quit => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectrum_core::{MemoryStore, PipelineConfig};

    #[test]
    fn parses_mode_commands() {
        assert_eq!(parse("mode tune"), Ok(Command::SetMode(Mode::Tuning)));
        assert_eq!(parse("  mode   idle "), Ok(Command::SetMode(Mode::Idle)));
        assert_eq!(
            parse("mode record A4test"),
            Ok(Command::SetMode(Mode::Recording { label: "A4test".into() }))
        );
        assert_eq!(
            parse("mode compare"),
            Ok(Command::SetMode(Mode::Comparing { target: None, save_as: None }))
        );
        assert_eq!(
            parse("mode compare A4test again"),
            Ok(Command::SetMode(Mode::Comparing {
                target: Some("A4test".into()),
                save_as: Some("again".into()),
            }))
        );
        assert_eq!(parse("mode record"), Err(CommandError::Usage("mode record <label>")));
        assert!(matches!(parse("mode compare a b c"), Err(CommandError::Usage(_))));
        assert!(matches!(parse("mode dance"), Err(CommandError::Usage(_))));
    }

    #[test]
    fn parses_numeric_commands() {
        assert_eq!(parse("filter 3000"), Ok(Command::HighCutoff(3000.0)));
        assert_eq!(parse("low 80.5"), Ok(Command::LowCutoff(80.5)));
        assert_eq!(parse("sample 9000"), Ok(Command::SampleRate(9000)));
        assert_eq!(parse("frame 512"), Ok(Command::FrameLength(512)));
        assert!(matches!(parse("frame big"), Err(CommandError::Usage(_))));
        assert!(matches!(parse("sample"), Err(CommandError::Usage(_))));
        assert_eq!(parse(""), Err(CommandError::Empty));
        assert_eq!(parse("jump"), Err(CommandError::Unknown("jump".into())));
        assert_eq!(parse("h"), Ok(Command::Help));
        assert_eq!(parse("quit"), Ok(Command::Quit));
    }

    #[test]
    fn policy_limits_reconfiguration() {
        let policy = CommandPolicy::default();
        assert!(policy.check(&Command::HighCutoff(4500.0)).is_ok());
        assert_eq!(
            policy.check(&Command::HighCutoff(4501.0)),
            Err(CommandError::HighCutoff { max: 4500.0 })
        );
        assert!(policy.check(&Command::HighCutoff(-5.0)).is_err());
        assert!(policy.check(&Command::FrameLength(800)).is_ok());
        assert!(policy.check(&Command::FrameLength(300)).is_err());
        assert!(policy.check(&Command::SampleRate(7000)).is_ok());
        assert!(policy.check(&Command::SampleRate(7001)).is_err());
        assert!(policy.check(&Command::LowCutoff(10_000.0)).is_ok());
    }

    #[test]
    fn rejected_commands_leave_the_pipeline_alone() {
        let config = PipelineConfig {
            sample_rate: 9000,
            block_length: 256,
            depth: 4,
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::new(config.clone(), MemoryStore::new()).unwrap();

        assert!(apply(&mut pipeline, Command::LowCutoff(5000.0)).is_err());
        assert!(apply(&mut pipeline, Command::SetMode(Mode::Recording { label: "a/b".into() })).is_err());
        assert_eq!(pipeline.config(), &config);
        assert_eq!(pipeline.mode(), &Mode::Idle);

        apply(&mut pipeline, Command::FrameLength(512)).unwrap();
        apply(&mut pipeline, Command::HighCutoff(3000.0)).unwrap();
        assert_eq!(pipeline.config().block_length, 512);
        assert_eq!(pipeline.config().high_cutoff, 3000.0);
    }
}
