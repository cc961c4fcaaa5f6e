//! Input device set handed to the application constructor.
//!
//! Devices are planned from [`InputSettings`] and the platform's touch support,
//! then constructed once through the engine. The resulting [`DeviceSet`] must
//! exist before the application, which only accepts devices at construction.

#[cfg(test)]
#[path = "devices_test.rs"]
mod devices_test;

use crate::error::BootError;
use crate::host::Engine;
use crate::settings::InputSettings;

/// One kind of input device the engine can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// UI element input, bound to the canvas. Always constructed.
    ElementInput,
    /// Keyboard, bound to the window.
    Keyboard,
    /// Mouse, bound to the canvas.
    Mouse,
    /// Gamepad polling.
    Gamepads,
    /// Touch, bound to the canvas.
    Touch,
}

/// Which devices to construct, in construction order.
#[must_use]
pub fn plan(input: &InputSettings, touch_supported: bool) -> Vec<DeviceKind> {
    let mut kinds = vec![DeviceKind::ElementInput];
    if input.use_keyboard {
        kinds.push(DeviceKind::Keyboard);
    }
    if input.use_mouse {
        kinds.push(DeviceKind::Mouse);
    }
    if input.use_gamepads {
        kinds.push(DeviceKind::Gamepads);
    }
    if input.use_touch && touch_supported {
        kinds.push(DeviceKind::Touch);
    }
    kinds
}

/// Fixed-shape record of optional device handles. `None` means disabled.
#[derive(Debug, Clone)]
pub struct DeviceSet<H> {
    pub element_input: Option<H>,
    pub keyboard: Option<H>,
    pub mouse: Option<H>,
    pub gamepads: Option<H>,
    pub touch: Option<H>,
}

impl<H> Default for DeviceSet<H> {
    fn default() -> Self {
        Self { element_input: None, keyboard: None, mouse: None, gamepads: None, touch: None }
    }
}

impl<H> DeviceSet<H> {
    /// Construct every planned device through `engine`.
    ///
    /// # Errors
    ///
    /// Propagates the first device construction failure.
    pub fn build<E>(engine: &E, canvas: &E::Canvas, input: &InputSettings) -> Result<Self, BootError>
    where
        E: Engine<Device = H>,
    {
        let mut set = Self::default();
        for kind in plan(input, engine.touch_supported()) {
            let handle = engine.create_device(kind, canvas, input)?;
            *set.slot_mut(kind) = Some(handle);
        }
        Ok(set)
    }

    #[must_use]
    pub fn get(&self, kind: DeviceKind) -> Option<&H> {
        match kind {
            DeviceKind::ElementInput => self.element_input.as_ref(),
            DeviceKind::Keyboard => self.keyboard.as_ref(),
            DeviceKind::Mouse => self.mouse.as_ref(),
            DeviceKind::Gamepads => self.gamepads.as_ref(),
            DeviceKind::Touch => self.touch.as_ref(),
        }
    }

    /// Enabled device kinds.
    #[must_use]
    pub fn enabled(&self) -> Vec<DeviceKind> {
        [
            DeviceKind::ElementInput,
            DeviceKind::Keyboard,
            DeviceKind::Mouse,
            DeviceKind::Gamepads,
            DeviceKind::Touch,
        ]
        .into_iter()
        .filter(|kind| self.get(*kind).is_some())
        .collect()
    }

    fn slot_mut(&mut self, kind: DeviceKind) -> &mut Option<H> {
        match kind {
            DeviceKind::ElementInput => &mut self.element_input,
            DeviceKind::Keyboard => &mut self.keyboard,
            DeviceKind::Mouse => &mut self.mouse,
            DeviceKind::Gamepads => &mut self.gamepads,
            DeviceKind::Touch => &mut self.touch,
        }
    }
}
