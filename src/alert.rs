//! Audible alert on a person's arrival.
//!
//! Playback is fire-and-forget: `play` returns as soon as the player has been
//! started and never waits for the sound to finish.

use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};

pub trait AlertPlayer: Send {
    fn play(&mut self) -> Result<()>;
}

/// Runs an external player (e.g. `aplay -q hello.wav`) for every alert.
///
/// The child is reaped on a detached thread so no zombies accumulate.
pub struct CommandAlertPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandAlertPlayer {
    /// `argv[0]` is the program, the rest its arguments.
    pub fn new(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("alert command must not be empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl AlertPlayer for CommandAlertPlayer {
    fn play(&mut self) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start alert player '{}'", self.program))?;

        let program = self.program.clone();
        std::thread::Builder::new()
            .name("alert-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) if !status.success() => {
                    log::warn!("alert player '{}' exited with {}", program, status)
                }
                Ok(_) => {}
                Err(err) => log::warn!("alert player '{}' wait failed: {}", program, err),
            })
            .context("failed to spawn alert reaper thread")?;
        Ok(())
    }
}

/// Used when no player is configured; the alert only shows up in the log.
#[derive(Default)]
pub struct SilentAlertPlayer;

impl AlertPlayer for SilentAlertPlayer {
    fn play(&mut self) -> Result<()> {
        log::info!("person arrived (no alert command configured)");
        Ok(())
    }
}

/// Pick the player for an optional configured command.
pub fn build_player(command: Option<&[String]>) -> Result<Box<dyn AlertPlayer>> {
    match command {
        Some(argv) => Ok(Box::new(CommandAlertPlayer::new(argv)?)),
        None => Ok(Box::new(SilentAlertPlayer)),
    }
}
