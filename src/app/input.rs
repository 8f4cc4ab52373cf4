use winit::keyboard::{KeyCode, PhysicalKey};

/// Orbit speed for held arrow keys, radians per second.
const KEY_ORBIT_RATE: f32 = 1.2;
/// Zoom steps applied per +/- key press.
const KEY_ZOOM_STEPS: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputAction {
    None,
    Zoom(f32),
}

#[derive(Default, Debug, Clone, Copy)]
pub struct InputState {
    pub orbit_left: bool,
    pub orbit_right: bool,
    pub orbit_up: bool,
    pub orbit_down: bool,
}

impl InputState {
    pub fn handle_key(&mut self, key: PhysicalKey, pressed: bool) -> InputAction {
        match key {
            PhysicalKey::Code(KeyCode::ArrowLeft) => self.orbit_left = pressed,
            PhysicalKey::Code(KeyCode::ArrowRight) => self.orbit_right = pressed,
            PhysicalKey::Code(KeyCode::ArrowUp) => self.orbit_up = pressed,
            PhysicalKey::Code(KeyCode::ArrowDown) => self.orbit_down = pressed,
            PhysicalKey::Code(KeyCode::Equal | KeyCode::NumpadAdd) if pressed => {
                return InputAction::Zoom(KEY_ZOOM_STEPS)
            }
            PhysicalKey::Code(KeyCode::Minus | KeyCode::NumpadSubtract) if pressed => {
                return InputAction::Zoom(-KEY_ZOOM_STEPS)
            }
            _ => {}
        }
        InputAction::None
    }

    pub fn release_all(&mut self) {
        *self = Self::default();
    }

    /// Azimuth and polar deltas for a frame of `dt` seconds.
    pub fn orbit_angles(&self, dt: f32) -> Option<(f32, f32)> {
        let axis = |negative: bool, positive: bool| match (negative, positive) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        };
        let azimuth = axis(self.orbit_right, self.orbit_left);
        let polar = axis(self.orbit_up, self.orbit_down);
        if azimuth == 0.0 && polar == 0.0 {
            return None;
        }
        let step = KEY_ORBIT_RATE * dt;
        Some((azimuth * step, polar * step))
    }
}

#[cfg(test)]
mod tests {
    use super::{InputAction, InputState};
    use winit::keyboard::{KeyCode, PhysicalKey};

    #[test]
    fn opposing_arrows_cancel() {
        let mut input = InputState::default();
        input.handle_key(PhysicalKey::Code(KeyCode::ArrowLeft), true);
        input.handle_key(PhysicalKey::Code(KeyCode::ArrowRight), true);
        assert_eq!(input.orbit_angles(0.016), None);
        input.handle_key(PhysicalKey::Code(KeyCode::ArrowRight), false);
        let (azimuth, polar) = input.orbit_angles(0.5).unwrap();
        assert!(azimuth > 0.0);
        assert_eq!(polar, 0.0);
    }

    #[test]
    fn zoom_keys_fire_on_press_only() {
        let mut input = InputState::default();
        let key = PhysicalKey::Code(KeyCode::Equal);
        assert!(matches!(input.handle_key(key, true), InputAction::Zoom(steps) if steps > 0.0));
        assert_eq!(input.handle_key(key, false), InputAction::None);
        let minus = PhysicalKey::Code(KeyCode::Minus);
        assert!(matches!(input.handle_key(minus, true), InputAction::Zoom(steps) if steps < 0.0));
    }

    #[test]
    fn release_all_clears_held_keys() {
        let mut input = InputState::default();
        input.handle_key(PhysicalKey::Code(KeyCode::ArrowUp), true);
        input.release_all();
        assert_eq!(input.orbit_angles(1.0), None);
    }
}
