// GPIO board access for the booth's sensors and actuators

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::{BoardConfig, BoardDriver};
use crate::errors::BoardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    Off,
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Low,
    High,
}

/// A named logical hardware line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub pin: u32,
    pub direction: Direction,
    pub pull: Pull,
}

impl Module {
    pub fn new(name: impl Into<String>, pin: u32, direction: Direction, pull: Pull) -> Self {
        Self {
            name: name.into(),
            pin,
            direction,
            pull,
        }
    }

    /// Level at which the line counts as triggered. A pulled-up input is
    /// wired to ground through its switch, so it reads low when closed.
    pub fn active_level(&self) -> PinLevel {
        match self.pull {
            Pull::Down => PinLevel::High,
            Pull::Up | Pull::Off => PinLevel::Low,
        }
    }
}

/// Modules indexed by name, created once at startup.
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    modules: BTreeMap<String, Module>,
}

impl ModuleTable {
    pub fn new(modules: impl IntoIterator<Item = Module>) -> Self {
        let mut table = BTreeMap::new();
        for module in modules {
            debug!(
                module = %module.name,
                pin = module.pin,
                direction = ?module.direction,
                pull = ?module.pull,
                "Registered module"
            );
            table.insert(module.name.clone(), module);
        }
        Self { modules: table }
    }

    pub fn from_config(config: &BoardConfig) -> Self {
        Self::new(
            config
                .pins
                .iter()
                .map(|(name, pin)| Module::new(name.clone(), pin.pin, pin.direction, pin.pull)),
        )
    }

    pub fn get(&self, name: &str) -> Result<&Module, BoardError> {
        self.modules
            .get(name)
            .ok_or_else(|| BoardError::ModuleNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }
}

/// Owned handle over the GPIO lines. `release` may be called any number of
/// times and from any exit path.
pub trait Board: Send {
    fn setup(&mut self) -> Result<(), BoardError>;

    fn modules(&self) -> &ModuleTable;

    fn read(&self, name: &str) -> Result<PinLevel, BoardError>;

    fn release(&mut self);

    fn module(&self, name: &str) -> Result<&Module, BoardError> {
        self.modules().get(name)
    }

    fn is_active(&self, name: &str) -> Result<bool, BoardError> {
        let expected = self.module(name)?.active_level();
        Ok(self.read(name)? == expected)
    }
}

// ============================================================================
// Sysfs GPIO
// ============================================================================

pub struct SysfsBoard {
    root: PathBuf,
    modules: ModuleTable,
    exported: Vec<u32>,
}

impl SysfsBoard {
    pub fn new(root: impl Into<PathBuf>, modules: ModuleTable) -> Self {
        Self {
            root: root.into(),
            modules,
            exported: Vec::new(),
        }
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn write_file(path: &Path, contents: &str) -> Result<(), BoardError> {
        std::fs::write(path, contents).map_err(|e| BoardError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn export(&self, pin: u32) -> Result<(), BoardError> {
        if self.pin_dir(pin).exists() {
            debug!("GPIO {} already exported", pin);
            return Ok(());
        }
        Self::write_file(&self.root.join("export"), &pin.to_string())
    }
}

impl Board for SysfsBoard {
    fn setup(&mut self) -> Result<(), BoardError> {
        info!("Setting up sysfs GPIO at {:?}", self.root);

        let modules: Vec<Module> = self.modules.iter().cloned().collect();
        for module in modules {
            self.export(module.pin)?;
            self.exported.push(module.pin);
            let direction = match module.direction {
                Direction::Input => "in",
                Direction::Output => "out",
            };
            Self::write_file(&self.pin_dir(module.pin).join("direction"), direction)?;
            if module.pull != Pull::Off {
                // sysfs has no pull control, the resistor comes from the device tree
                debug!(
                    "Pull {:?} on {} must be configured outside sysfs",
                    module.pull, module.name
                );
            }
        }

        Ok(())
    }

    fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    fn read(&self, name: &str) -> Result<PinLevel, BoardError> {
        let module = self.modules.get(name)?;
        let path = self.pin_dir(module.pin).join("value");
        let raw = std::fs::read_to_string(&path).map_err(|e| BoardError::Io {
            path: path.clone(),
            source: e,
        })?;

        match raw.trim() {
            "0" => Ok(PinLevel::Low),
            "1" => Ok(PinLevel::High),
            other => Err(BoardError::InvalidValue {
                pin: module.pin,
                value: other.to_string(),
            }),
        }
    }

    fn release(&mut self) {
        if self.exported.is_empty() {
            return;
        }

        info!("Releasing GPIO lines");
        let unexport = self.root.join("unexport");
        for pin in self.exported.drain(..) {
            if let Err(e) = std::fs::write(&unexport, pin.to_string()) {
                warn!("Failed to unexport GPIO {}: {}", pin, e);
            }
        }
    }
}

// ============================================================================
// Virtual board
// ============================================================================

/// In-memory board for development machines. Levels are shared through
/// [`VirtualPins`] so another task can flip inputs.
pub struct VirtualBoard {
    modules: ModuleTable,
    pins: VirtualPins,
}

#[derive(Clone, Default)]
pub struct VirtualPins {
    levels: Arc<Mutex<BTreeMap<String, PinLevel>>>,
}

impl VirtualPins {
    pub fn set(&self, name: &str, level: PinLevel) {
        if let Ok(mut levels) = self.levels.lock() {
            levels.insert(name.to_string(), level);
        }
    }

    pub fn get(&self, name: &str) -> Option<PinLevel> {
        self.levels.lock().ok().and_then(|l| l.get(name).copied())
    }
}

impl VirtualBoard {
    pub fn new(modules: ModuleTable) -> Self {
        Self {
            modules,
            pins: VirtualPins::default(),
        }
    }

    pub fn pins(&self) -> VirtualPins {
        self.pins.clone()
    }
}

impl Board for VirtualBoard {
    fn setup(&mut self) -> Result<(), BoardError> {
        // Every line starts idle
        for module in self.modules.iter() {
            let idle = match module.active_level() {
                PinLevel::Low => PinLevel::High,
                PinLevel::High => PinLevel::Low,
            };
            if self.pins.get(&module.name).is_none() {
                self.pins.set(&module.name, idle);
            }
        }
        Ok(())
    }

    fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    fn read(&self, name: &str) -> Result<PinLevel, BoardError> {
        let module = self.modules.get(name)?;
        Ok(self.pins.get(name).unwrap_or(match module.active_level() {
            PinLevel::Low => PinLevel::High,
            PinLevel::High => PinLevel::Low,
        }))
    }

    fn release(&mut self) {
        debug!("Virtual board released");
    }
}

/// Build the board selected by configuration.
pub fn new_board(config: &BoardConfig) -> Box<dyn Board> {
    let modules = ModuleTable::from_config(config);
    match config.driver {
        BoardDriver::Sysfs => Box::new(SysfsBoard::new(config.sysfs_root.clone(), modules)),
        BoardDriver::Virtual => {
            warn!("Using virtual board, physical sensors are ignored");
            Box::new(VirtualBoard::new(modules))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modules() -> ModuleTable {
        ModuleTable::new([
            Module::new("microswitch", 24, Direction::Input, Pull::Up),
            Module::new("button", 25, Direction::Input, Pull::Down),
            Module::new("led", 17, Direction::Output, Pull::Off),
        ])
    }

    fn fake_sysfs() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("export"), "").expect("export");
        std::fs::write(dir.path().join("unexport"), "").expect("unexport");
        // The kernel creates gpioN on export; pre-create them here
        for pin in [24, 25, 17] {
            let pin_dir = dir.path().join(format!("gpio{}", pin));
            std::fs::create_dir(&pin_dir).expect("pin dir");
            std::fs::write(pin_dir.join("value"), "1\n").expect("value");
        }
        dir
    }

    #[test]
    fn test_unknown_module_is_error() {
        let board = VirtualBoard::new(modules());
        assert!(matches!(
            board.is_active("coin"),
            Err(BoardError::ModuleNotFound(name)) if name == "coin"
        ));
    }

    #[test]
    fn test_active_level_follows_pull() {
        let table = modules();
        assert_eq!(table.get("microswitch").unwrap().active_level(), PinLevel::Low);
        assert_eq!(table.get("button").unwrap().active_level(), PinLevel::High);
    }

    #[test]
    fn test_virtual_board_starts_idle() {
        let mut board = VirtualBoard::new(modules());
        board.setup().unwrap();
        assert!(!board.is_active("microswitch").unwrap());
        assert!(!board.is_active("button").unwrap());

        board.pins().set("microswitch", PinLevel::Low);
        assert!(board.is_active("microswitch").unwrap());
    }

    #[test]
    fn test_sysfs_setup_read_and_release() {
        let root = fake_sysfs();
        let mut board = SysfsBoard::new(root.path(), modules());
        board.setup().unwrap();

        let direction = std::fs::read_to_string(root.path().join("gpio17/direction")).unwrap();
        assert_eq!(direction, "out");

        // pulled-up switch reads high when open
        assert!(!board.is_active("microswitch").unwrap());
        std::fs::write(root.path().join("gpio24/value"), "0\n").unwrap();
        assert!(board.is_active("microswitch").unwrap());

        board.release();
        board.release();
        assert!(board.exported.is_empty());
    }

    #[test]
    fn test_sysfs_failed_setup_still_unexports() {
        let root = fake_sysfs();
        // a directory where the direction file should be makes the write fail
        std::fs::create_dir(root.path().join("gpio24/direction")).unwrap();
        let table = ModuleTable::new([Module::new("microswitch", 24, Direction::Input, Pull::Up)]);
        let mut board = SysfsBoard::new(root.path(), table);

        assert!(matches!(board.setup(), Err(BoardError::Io { .. })));
        assert_eq!(board.exported, vec![24]);

        board.release();
        assert!(board.exported.is_empty());
        let unexported = std::fs::read_to_string(root.path().join("unexport")).unwrap();
        assert_eq!(unexported, "24");
    }

    #[test]
    fn test_sysfs_rejects_garbage_value() {
        let root = fake_sysfs();
        std::fs::write(root.path().join("gpio25/value"), "x").unwrap();
        let board = SysfsBoard::new(root.path(), modules());
        assert!(matches!(
            board.read("button"),
            Err(BoardError::InvalidValue { pin: 25, .. })
        ));
    }
}
