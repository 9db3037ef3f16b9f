//! Tick loop over many units.
//!
//! The [`Host`] is owned by the game's tick thread. Every tick it first
//! applies the commands other threads queued through a [`CommandSender`],
//! then gives each running CPU its instruction budget. Nothing outside the
//! tick thread ever touches a CPU directly, so commands take effect only
//! at tick boundaries.

use crate::config::CpuConfig;
use crate::cpu::{CommandError, Cpu, MemoryError, RunReport, Snapshot, UnitBuffers, UnitCommand};
use crate::program::{load_image, ImageError, ProgramImage};
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, SendError, Sender};
use thiserror::Error;

/// Identifies a unit within one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// A unit's CPU together with its keyboard and console.
#[derive(Debug, Clone)]
pub struct Unit {
    pub cpu: Cpu,
    pub io: UnitBuffers,
}

/// Clonable handle for queueing commands from other threads.
#[derive(Debug, Clone)]
pub struct CommandSender {
    inner: Sender<(UnitId, UnitCommand)>,
}

impl CommandSender {
    /// Queue a command for the next tick.
    ///
    /// Fails only once the host has been dropped.
    pub fn send(&self, unit: UnitId, command: UnitCommand) -> Result<(), HostError> {
        self.inner
            .send((unit, command))
            .map_err(|SendError((unit, _))| HostError::Disconnected(unit))
    }
}

/// Owns every unit and advances them once per tick.
pub struct Host {
    config: CpuConfig,
    units: BTreeMap<UnitId, Unit>,
    next_id: u32,
    sender: Sender<(UnitId, UnitCommand)>,
    receiver: Receiver<(UnitId, UnitCommand)>,
    ticks: u64,
}

impl Host {
    pub fn new(config: CpuConfig) -> Self {
        let (sender, receiver) = channel();
        Self {
            config,
            units: BTreeMap::new(),
            next_id: 0,
            sender,
            receiver,
            ticks: 0,
        }
    }

    /// Create a paused unit running `image`.
    ///
    /// Ids are never reused, so a host hands out at most `u32::MAX` of them.
    pub fn spawn(&mut self, image: ProgramImage) -> Result<UnitId, HostError> {
        let id = UnitId(self.next_id);
        let next = self.next_id.checked_add(1).ok_or(HostError::IdsExhausted)?;

        let mut cpu = Cpu::new(&self.config);
        cpu.load(image).map_err(LoadError::from)?;
        let io = UnitBuffers::new(self.config.keyboard_capacity, self.config.console_capacity);

        self.next_id = next;
        self.units.insert(id, Unit { cpu, io });
        log::info!("{} spawned", id);
        Ok(id)
    }

    /// Create a paused unit from an image file.
    pub fn spawn_file<P: AsRef<Path>>(&mut self, path: P) -> Result<UnitId, HostError> {
        let image = load_image(path).map_err(LoadError::from)?;
        self.spawn(image)
    }

    /// Remove a unit, returning it.
    pub fn remove(&mut self, id: UnitId) -> Result<Unit, HostError> {
        let unit = self.units.remove(&id).ok_or(HostError::UnknownUnit(id))?;
        log::info!("{} removed after {} instructions", id, unit.cpu.cycles);
        Ok(unit)
    }

    /// Handle for other threads to submit commands through.
    pub fn command_sender(&self) -> CommandSender {
        CommandSender {
            inner: self.sender.clone(),
        }
    }

    // ==================== Tick ====================

    /// Apply queued commands, then run every unit for one budget.
    ///
    /// Returns what each unit did, in id order. Units that are not running
    /// report zero instructions.
    pub fn tick(&mut self) -> Vec<(UnitId, RunReport)> {
        self.apply_commands();

        let budget = self.config.tick_budget;
        let reports = self
            .units
            .iter_mut()
            .map(|(id, unit)| (*id, unit.cpu.run(budget, &mut unit.io)))
            .collect();
        self.ticks += 1;
        reports
    }

    fn apply_commands(&mut self) {
        while let Ok((id, command)) = self.receiver.try_recv() {
            let Some(unit) = self.units.get_mut(&id) else {
                log::warn!("dropping {} for unknown {}", command, id);
                continue;
            };
            log::debug!("{}: {}", id, command);
            if let Err(e) = command.apply(&mut unit.cpu, &mut unit.io) {
                log::warn!("{}: command rejected: {}", id, e);
            }
        }
    }

    // ==================== Accessors ====================

    pub fn unit(&self, id: UnitId) -> Result<&Unit, HostError> {
        self.units.get(&id).ok_or(HostError::UnknownUnit(id))
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Result<&mut Unit, HostError> {
        self.units.get_mut(&id).ok_or(HostError::UnknownUnit(id))
    }

    pub fn snapshot(&self, id: UnitId) -> Result<Snapshot, HostError> {
        Ok(self.unit(id)?.cpu.snapshot())
    }

    /// Take the console lines a unit wrote since the last drain.
    pub fn drain_console(&mut self, id: UnitId) -> Result<Vec<String>, HostError> {
        Ok(self.unit_mut(id)?.io.drain_console())
    }

    /// Apply a command immediately, from the tick thread.
    pub fn apply(&mut self, id: UnitId, command: UnitCommand) -> Result<(), HostError> {
        let unit = self.unit_mut(id)?;
        command
            .apply(&mut unit.cpu, &mut unit.io)
            .map_err(|error| HostError::Command { unit: id, error })
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }
}

/// Errors that can occur while loading a program into a unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Errors reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),

    #[error("failed to load program: {0}")]
    Load(#[from] LoadError),

    #[error("{unit}: {error}")]
    Command { unit: UnitId, error: CommandError },

    #[error("host is gone; command for {0} not delivered")]
    Disconnected(UnitId),

    #[error("no unit ids left")]
    IdsExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::Instruction;
    use crate::cpu::operand::Operand;
    use crate::cpu::registers::Register;
    use crate::cpu::{CpuState, Opcode};

    fn config() -> CpuConfig {
        CpuConfig {
            memory_words: 128,
            stack_words: 16,
            tick_budget: 5,
            ..CpuConfig::default()
        }
    }

    /// `inc A; jmp 0`
    fn counter() -> ProgramImage {
        ProgramImage::from_instructions(&[
            Instruction::unary(Opcode::Inc, Operand::Register(Register::A)),
            Instruction::target(Opcode::Jmp, Operand::Immediate(0)),
        ])
    }

    #[test]
    fn test_spawned_units_wait_for_resume() {
        let mut host = Host::new(config());
        let id = host.spawn(counter()).unwrap();

        let reports = host.tick();
        assert_eq!(reports, vec![(id, RunReport { executed: 0, state: CpuState::Paused })]);
        assert_eq!(host.ticks(), 1);
    }

    #[test]
    fn test_commands_apply_at_tick_boundary() {
        let mut host = Host::new(config());
        let id = host.spawn(counter()).unwrap();
        let sender = host.command_sender();

        sender.send(id, UnitCommand::Resume).unwrap();
        // Nothing happens until the tick drains the queue
        assert_eq!(host.snapshot(id).unwrap().state, CpuState::Paused);

        let reports = host.tick();
        assert_eq!(reports[0].1.executed, 5);
        assert_eq!(host.snapshot(id).unwrap().state, CpuState::Running);

        sender.send(id, UnitCommand::Pause).unwrap();
        let reports = host.tick();
        assert_eq!(reports[0].1, RunReport { executed: 0, state: CpuState::Paused });
    }

    #[test]
    fn test_each_unit_gets_its_own_budget() {
        let mut host = Host::new(config());
        let a = host.spawn(counter()).unwrap();
        let b = host.spawn(counter()).unwrap();
        host.apply(a, UnitCommand::Resume).unwrap();
        host.apply(b, UnitCommand::Resume).unwrap();

        for _ in 0..3 {
            host.tick();
        }
        assert_eq!(host.snapshot(a).unwrap().cycles, 15);
        assert_eq!(host.snapshot(b).unwrap().cycles, 15);
    }

    #[test]
    fn test_faulted_unit_does_not_affect_others() {
        let mut host = Host::new(config());
        let bad = host
            .spawn(ProgramImage { words: vec![0x003F], ..ProgramImage::default() })
            .unwrap();
        let good = host.spawn(counter()).unwrap();
        host.apply(bad, UnitCommand::Resume).unwrap();
        host.apply(good, UnitCommand::Resume).unwrap();

        let reports = host.tick();
        assert_eq!(reports[0], (bad, RunReport { executed: 0, state: CpuState::Faulted }));
        assert_eq!(reports[1], (good, RunReport { executed: 5, state: CpuState::Running }));
    }

    #[test]
    fn test_unknown_unit() {
        let mut host = Host::new(config());
        assert_eq!(host.snapshot(UnitId(9)), Err(HostError::UnknownUnit(UnitId(9))));
        assert!(host.remove(UnitId(9)).is_err());

        // Queued commands for missing units are dropped
        host.command_sender().send(UnitId(9), UnitCommand::Step).unwrap();
        assert!(host.tick().is_empty());
    }

    #[test]
    fn test_rejected_command() {
        let mut host = Host::new(config());
        let id = host.spawn(ProgramImage::from_instructions(&[Instruction::none(Opcode::Hlt)])).unwrap();
        host.apply(id, UnitCommand::Step).unwrap();
        assert!(matches!(
            host.apply(id, UnitCommand::Resume),
            Err(HostError::Command { .. })
        ));
    }

    #[test]
    fn test_program_too_large() {
        let mut host = Host::new(config());
        let image = ProgramImage { words: vec![0; 129], ..ProgramImage::default() };
        assert!(matches!(
            host.spawn(image),
            Err(HostError::Load(LoadError::Memory(_)))
        ));
        assert!(host.is_empty());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut host = Host::new(config());
        let a = host.spawn(counter()).unwrap();
        let b = host.spawn(counter()).unwrap();
        host.remove(a).unwrap();
        let c = host.spawn(counter()).unwrap();

        assert_eq!((a, b, c), (UnitId(0), UnitId(1), UnitId(2)));
        assert_eq!(host.unit_ids().collect::<Vec<_>>(), vec![b, c]);
        assert_eq!(host.len(), 2);
    }

    #[test]
    fn test_ids_exhausted() {
        let mut host = Host::new(config());
        host.next_id = u32::MAX - 1;
        assert_eq!(host.spawn(counter()), Ok(UnitId(u32::MAX - 1)));

        assert_eq!(host.spawn(counter()), Err(HostError::IdsExhausted));
        assert_eq!(host.len(), 1);
        assert_eq!(host.unit_ids().collect::<Vec<_>>(), vec![UnitId(u32::MAX - 1)]);
    }

    #[test]
    fn test_spawn_file() {
        let path = std::env::temp_dir().join(format!("cubot-host-{}.json", std::process::id()));
        crate::program::save_image(&path, &counter()).unwrap();

        let mut host = Host::new(config());
        let id = host.spawn_file(&path).unwrap();
        assert_eq!(host.unit(id).unwrap().cpu.mem.read(0), counter().words[0]);

        let missing = host.spawn_file("/nonexistent/cubot.json");
        assert!(matches!(missing, Err(HostError::Load(LoadError::Image(_)))));
        assert_eq!(host.unit_ids().collect::<Vec<_>>(), vec![id]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_commands_from_another_thread() {
        let mut host = Host::new(config());
        let id = host.spawn(counter()).unwrap();
        let sender = host.command_sender();

        std::thread::spawn(move || {
            sender.send(id, UnitCommand::Key(0x41)).unwrap();
            sender.send(id, UnitCommand::Resume).unwrap();
        })
        .join()
        .unwrap();

        host.tick();
        let unit = host.unit(id).unwrap();
        assert_eq!(unit.io.pending_keys(), 1);
        assert_eq!(unit.cpu.cycles, 5);
    }

    #[test]
    fn test_console_drain() {
        let mut host = Host::new(config());
        // out 0x40 prints the NUL-terminated string stored at 0x40
        let mut image = ProgramImage::from_instructions(&[
            Instruction::target(Opcode::Out, Operand::Immediate(0x40)),
            Instruction::none(Opcode::Hlt),
        ]);
        image.words.resize(0x40, 0);
        image.words.extend([b'h' as u16, b'i' as u16, 0]);
        let id = host.spawn(image).unwrap();
        host.apply(id, UnitCommand::Resume).unwrap();

        host.tick();
        assert_eq!(host.drain_console(id).unwrap(), vec!["hi".to_string()]);
        assert!(host.drain_console(id).unwrap().is_empty());
    }

    #[test]
    fn test_disconnected_sender() {
        let host = Host::new(config());
        let sender = host.command_sender();
        drop(host);
        assert_eq!(
            sender.send(UnitId(0), UnitCommand::Pause),
            Err(HostError::Disconnected(UnitId(0)))
        );
    }
}
