use std::collections::HashSet;

use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pointer input in window pixels, origin top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    /// Primary button pressed.
    Down,
    /// Primary button released.
    Up,
    Moved { x: f32, y: f32 },
}

/// What a window event means to the stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputAction {
    Pointer(PointerEvent),
    TogglePause,
}

/// Translates window events into [`InputAction`]s.
///
/// Key repeats are swallowed, so holding the pause key toggles once.
#[derive(Debug, Default)]
pub struct Input {
    keys_down: HashSet<KeyCode>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a window event; `None` for events the stage ignores.
    pub fn handle_event(&mut self, event: &WindowEvent) -> Option<InputAction> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => match event.physical_key {
                PhysicalKey::Code(key) => self.key(key, event.state),
                PhysicalKey::Unidentified(_) => None,
            },
            WindowEvent::MouseInput { state, button, .. } => self.mouse_button(*button, *state),
            WindowEvent::CursorMoved { position, .. } => {
                Some(self.cursor_moved(position.x as f32, position.y as f32))
            }
            _ => None,
        }
    }

    pub fn key(&mut self, key: KeyCode, state: ElementState) -> Option<InputAction> {
        match state {
            ElementState::Pressed => {
                let first = self.keys_down.insert(key);
                (first && key == KeyCode::Space).then_some(InputAction::TogglePause)
            }
            ElementState::Released => {
                self.keys_down.remove(&key);
                None
            }
        }
    }

    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) -> Option<InputAction> {
        if button != MouseButton::Left {
            return None;
        }
        Some(InputAction::Pointer(match state {
            ElementState::Pressed => PointerEvent::Down,
            ElementState::Released => PointerEvent::Up,
        }))
    }

    pub fn cursor_moved(&mut self, x: f32, y: f32) -> InputAction {
        InputAction::Pointer(PointerEvent::Moved { x, y })
    }

    /// Returns true if the key is currently held down.
    pub fn key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_toggles_once_per_press() {
        let mut input = Input::new();
        assert_eq!(input.key(KeyCode::Space, ElementState::Pressed), Some(InputAction::TogglePause));
        assert_eq!(input.key(KeyCode::Space, ElementState::Pressed), None);
        assert!(input.key_down(KeyCode::Space));
        assert_eq!(input.key(KeyCode::Space, ElementState::Released), None);
        assert_eq!(input.key(KeyCode::Space, ElementState::Pressed), Some(InputAction::TogglePause));
    }

    #[test]
    fn other_keys_are_ignored() {
        let mut input = Input::new();
        assert_eq!(input.key(KeyCode::KeyP, ElementState::Pressed), None);
    }

    #[test]
    fn primary_button_drives_the_pointer() {
        let mut input = Input::new();
        assert_eq!(
            input.mouse_button(MouseButton::Left, ElementState::Pressed),
            Some(InputAction::Pointer(PointerEvent::Down))
        );
        assert_eq!(
            input.mouse_button(MouseButton::Left, ElementState::Released),
            Some(InputAction::Pointer(PointerEvent::Up))
        );
        assert_eq!(input.mouse_button(MouseButton::Right, ElementState::Pressed), None);
        assert_eq!(
            input.cursor_moved(3.0, 4.0),
            InputAction::Pointer(PointerEvent::Moved { x: 3.0, y: 4.0 })
        );
    }
}
