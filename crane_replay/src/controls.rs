//! Scripted playback controls for headless replays.
//!
//! A script is a comma-separated list of `<seconds>:<command>` entries,
//! timed on the replay's virtual clock:
//!
//! ```text
//! 2.5:speed=4, 4:reverse, 6:toggle, 8:seek=120
//! ```

use crane_core::ReplaySession;
use tracing::debug;

/// A single UI action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    /// Play/pause button
    TogglePlay,

    /// Direction button
    Reverse,

    /// Speed selector
    Speed(f64),

    /// Timeline slider
    Seek(i64),
}

impl ControlCommand {
    /// Returns the command name.
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::TogglePlay => "toggle",
            ControlCommand::Reverse => "reverse",
            ControlCommand::Speed(_) => "speed",
            ControlCommand::Seek(_) => "seek",
        }
    }

    /// Applies the command to a session.
    pub fn apply(&self, session: &mut ReplaySession) {
        match *self {
            ControlCommand::TogglePlay => {
                session.toggle_play_pause();
            }
            ControlCommand::Reverse => session.toggle_direction(),
            ControlCommand::Speed(multiplier) => session.set_speed(multiplier),
            ControlCommand::Seek(index) => session.seek(index),
        }
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlCommand::Speed(m) => write!(f, "speed={}", m),
            ControlCommand::Seek(i) => write!(f, "seek={}", i),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl std::str::FromStr for ControlCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (name, arg) = match s.split_once('=') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (s.as_str(), None),
        };

        match (name, arg) {
            ("toggle" | "play" | "pause", None) => Ok(ControlCommand::TogglePlay),
            ("reverse" | "direction", None) => Ok(ControlCommand::Reverse),
            ("speed", Some(arg)) => arg
                .parse()
                .map(ControlCommand::Speed)
                .map_err(|_| format!("Invalid speed: {}", arg)),
            ("seek", Some(arg)) => arg
                .parse()
                .map(ControlCommand::Seek)
                .map_err(|_| format!("Invalid seek index: {}", arg)),
            _ => Err(format!("Unknown control: {}", s)),
        }
    }
}

/// A command with the virtual time it fires at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledCommand {
    pub at_secs: f64,
    pub command: ControlCommand,
}

impl std::str::FromStr for ScheduledCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (at, command) = s
            .split_once(':')
            .ok_or_else(|| format!("Expected <seconds>:<command>, got: {}", s.trim()))?;

        let at_secs: f64 = at
            .trim()
            .parse()
            .map_err(|_| format!("Invalid time: {}", at.trim()))?;
        if !at_secs.is_finite() || at_secs < 0.0 {
            return Err(format!("Invalid time: {}", at.trim()));
        }

        Ok(Self {
            at_secs,
            command: command.parse()?,
        })
    }
}

/// Time-ordered commands with a replay cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlScript {
    commands: Vec<ScheduledCommand>,
    cursor: usize,
}

impl ControlScript {
    pub fn new(mut commands: Vec<ScheduledCommand>) -> Self {
        commands.sort_by(|a, b| a.at_secs.total_cmp(&b.at_secs));
        Self {
            commands,
            cursor: 0,
        }
    }

    /// Commands due at or before `now_secs` that have not fired yet.
    pub fn due(&mut self, now_secs: f64) -> Vec<ControlCommand> {
        let start = self.cursor;
        while self
            .commands
            .get(self.cursor)
            .is_some_and(|c| c.at_secs <= now_secs)
        {
            self.cursor += 1;
        }

        let fired: Vec<ControlCommand> =
            self.commands[start..self.cursor].iter().map(|c| c.command).collect();
        for command in &fired {
            debug!(at = now_secs, %command, "control fired");
        }
        fired
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.commands.len()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl std::str::FromStr for ControlScript {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let commands = s
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<ScheduledCommand>, _>>()?;
        Ok(Self::new(commands))
    }
}
