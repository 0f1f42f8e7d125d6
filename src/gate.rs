// Turns sensor, keyboard and window signals into the predicates the
// session loop waits on.

use std::time::Duration;
use tracing::{debug, info};

use crate::board::Board;
use crate::errors::{AppResult, BoardError, DisplayError, SheetFormatError};
use crate::screen::{Key, Screen};
use crate::sheet;

pub struct InputGate<'a> {
    board: &'a dyn Board,
    screen: &'a mut dyn Screen,
    debug: bool,
    idle: Duration,
}

impl<'a> InputGate<'a> {
    /// `debug` enables the keyboard override. It must only be set for the
    /// diagnostic run mode.
    pub fn new(
        board: &'a dyn Board,
        screen: &'a mut dyn Screen,
        debug: bool,
        idle: Duration,
    ) -> Self {
        Self {
            board,
            screen,
            debug,
            idle,
        }
    }

    pub fn debug_skip(&mut self) -> Result<bool, DisplayError> {
        if !self.debug {
            return Ok(false);
        }
        self.screen.is_pressed(Key::Skip)
    }

    pub fn signal(&self, name: &str) -> Result<bool, BoardError> {
        self.board.is_active(name)
    }

    pub fn stop_requested(&mut self) -> Result<bool, DisplayError> {
        self.screen.request_to_stop()
    }

    /// Portrait size in centimeters of a configured sheet format.
    pub fn sheet_size(format: &str) -> Result<(f64, f64), SheetFormatError> {
        sheet::sheet_size_cm(format)
    }

    /// Block until the debug override, the module's signal or a stop
    /// request shows up, checked in that order on every tick. Returns
    /// `false` only for a stop request. There is no timeout.
    ///
    /// Skip presses made before the wait started do not count.
    pub async fn wait_module(&mut self, name: &str) -> AppResult<bool> {
        let module = self.board.module(name)?;
        debug!(module = %module.name, pin = module.pin, "Waiting for module");
        if self.debug {
            self.screen.discard_pressed(Key::Skip)?;
        }

        loop {
            if self.debug_skip()? {
                info!("Skip stage");
                return Ok(true);
            }
            if self.signal(name)? {
                info!(module = %name, "Module triggered");
                return Ok(true);
            }
            if self.stop_requested()? {
                info!("A request to stop has been registered");
                return Ok(false);
            }
            tokio::time::sleep(self.idle).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::board::{Direction, Module, ModuleTable, PinLevel, Pull, VirtualBoard};
    use crate::errors::AppError;
    use crate::screen::ScreenView;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted screen shared by the gate and controller tests.
    #[derive(Default)]
    pub(crate) struct FakeScreenState {
        pub pressed: VecDeque<Key>,
        pub stop: bool,
        pub views: Vec<ScreenView>,
        pub released: u32,
        pub initialized: bool,
        pub stop_polls: u32,
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeScreen {
        pub state: Arc<Mutex<FakeScreenState>>,
    }

    impl Screen for FakeScreen {
        fn ensure_initialized(&mut self) -> Result<(), DisplayError> {
            self.state.lock().unwrap().initialized = true;
            Ok(())
        }

        fn is_initialized(&self) -> bool {
            self.state.lock().unwrap().initialized
        }

        fn show(&mut self, view: ScreenView) -> Result<(), DisplayError> {
            self.ensure_initialized()?;
            self.state.lock().unwrap().views.push(view);
            Ok(())
        }

        fn is_pressed(&mut self, key: Key) -> Result<bool, DisplayError> {
            let mut state = self.state.lock().unwrap();
            match state.pressed.iter().position(|k| *k == key) {
                Some(idx) => {
                    state.pressed.remove(idx);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        fn request_to_stop(&mut self) -> Result<bool, DisplayError> {
            let mut state = self.state.lock().unwrap();
            state.stop_polls += 1;
            Ok(state.stop)
        }

        fn release(&mut self) {
            self.state.lock().unwrap().released += 1;
        }
    }

    fn board() -> VirtualBoard {
        let mut board = VirtualBoard::new(ModuleTable::new([Module::new(
            "microswitch",
            24,
            Direction::Input,
            Pull::Up,
        )]));
        board.setup().unwrap();
        board
    }

    const IDLE: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn test_signal_proceeds() {
        let board = board();
        board.pins().set("microswitch", PinLevel::Low);
        let mut screen = FakeScreen::default();
        let mut gate = InputGate::new(&board, &mut screen, false, IDLE);
        assert!(gate.wait_module("microswitch").await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_returns_false() {
        let board = board();
        let mut screen = FakeScreen::default();
        screen.state.lock().unwrap().stop = true;
        let mut gate = InputGate::new(&board, &mut screen, false, IDLE);
        assert!(!gate.wait_module("microswitch").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debug_override_wins_over_stop() {
        let board = board();
        let mut screen = FakeScreen::default();
        let state = screen.state.clone();
        let presser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut state = state.lock().unwrap();
            state.pressed.push_back(Key::Skip);
            state.stop = true;
        });

        let mut gate = InputGate::new(&board, &mut screen, true, IDLE);
        assert!(gate.wait_module("microswitch").await.unwrap());
        presser.await.unwrap();
        assert!(screen.state.lock().unwrap().pressed.is_empty());
    }

    #[tokio::test]
    async fn test_skip_pressed_before_wait_is_ignored() {
        let board = board();
        let mut screen = FakeScreen::default();
        {
            let mut state = screen.state.lock().unwrap();
            state.pressed.push_back(Key::Skip);
            state.pressed.push_back(Key::Skip);
            state.stop = true;
        }
        let mut gate = InputGate::new(&board, &mut screen, true, IDLE);
        assert!(!gate.wait_module("microswitch").await.unwrap());
        let state = screen.state.lock().unwrap();
        assert!(state.pressed.is_empty());
        assert_eq!(state.stop_polls, 1);
    }

    #[tokio::test]
    async fn test_signal_wins_over_stop() {
        let board = board();
        board.pins().set("microswitch", PinLevel::Low);
        let mut screen = FakeScreen::default();
        screen.state.lock().unwrap().stop = true;
        let mut gate = InputGate::new(&board, &mut screen, false, IDLE);
        assert!(gate.wait_module("microswitch").await.unwrap());
    }

    #[tokio::test]
    async fn test_override_ignored_outside_debug() {
        let board = board();
        let mut screen = FakeScreen::default();
        {
            let mut state = screen.state.lock().unwrap();
            state.pressed.push_back(Key::Skip);
            state.stop = true;
        }
        let mut gate = InputGate::new(&board, &mut screen, false, IDLE);
        assert!(!gate.wait_module("microswitch").await.unwrap());
        assert_eq!(screen.state.lock().unwrap().pressed.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_module_is_fatal() {
        let board = board();
        let mut screen = FakeScreen::default();
        let mut gate = InputGate::new(&board, &mut screen, false, IDLE);
        let err = gate.wait_module("coin").await.unwrap_err();
        assert!(matches!(err, AppError::Board(BoardError::ModuleNotFound(_))));
    }

    #[test]
    fn test_sheet_size_lookup() {
        assert_eq!(InputGate::sheet_size("A5").unwrap(), (14.8, 21.0));
        assert!(matches!(
            InputGate::sheet_size("A9"),
            Err(SheetFormatError::Unknown(_))
        ));
    }
}
