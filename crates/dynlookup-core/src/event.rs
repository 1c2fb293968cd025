#![forbid(unsafe_code)]

//! Canonical input vocabulary for the lookup control.
//!
//! Hosts translate their native keyboard, pointer, and focus notifications
//! into these types before handing them to the control. All events derive
//! `Clone`, `PartialEq`, and `Eq` for use in tests and pattern matching.
//!
//! # Design Notes
//!
//! - `KeyEventKind` defaults to `Press`; only presses drive navigation.
//! - Pointer events carry a logical [`PointerTarget`] rather than
//!   coordinates. Hit-testing is the host's job.
//! - Focus targets name the parts of the control's own subtree; focus moving
//!   anywhere else is reported as a focus-out with no replacement target.

use bitflags::bitflags;
#[cfg(feature = "crossterm")]
use crossterm::event as cte;

/// A keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// The key code that was pressed.
    pub code: KeyCode,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,

    /// The type of key event (press, repeat, or release).
    pub kind: KeyEventKind,
}

impl KeyEvent {
    /// Create a new key event with default modifiers and Press kind.
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::NONE,
            kind: KeyEventKind::Press,
        }
    }

    /// Create a key event with modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Create a key event with a specific kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: KeyEventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Check if this is a specific character key.
    #[must_use]
    pub fn is_char(&self, c: char) -> bool {
        matches!(self.code, KeyCode::Char(ch) if ch == c)
    }

    /// Check if Ctrl modifier is held.
    #[must_use]
    pub const fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }

    /// Check if this event should drive the control (press or auto-repeat).
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        !matches!(self.kind, KeyEventKind::Release)
    }
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        Self::new(code)
    }
}

/// Key codes the control reacts to.
///
/// Anything else a host may see is reported as [`KeyCode::Other`] and passed
/// through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A regular character key.
    Char(char),

    /// Enter/Return key.
    Enter,

    /// Escape key.
    Escape,

    /// Backspace key.
    Backspace,

    /// Delete key.
    Delete,

    /// Tab key.
    Tab,

    /// Shift+Tab (back-tab).
    BackTab,

    /// Up arrow key.
    Up,

    /// Down arrow key.
    Down,

    /// Any key the control does not interpret.
    Other,
}

/// The type of key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyEventKind {
    /// Key was pressed (default when not distinguishable).
    #[default]
    Press,

    /// Key is being held (repeat event).
    Repeat,

    /// Key was released.
    Release,
}

bitflags! {
    /// Modifier keys that can be held during a key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE  = 0b0000;
        /// Shift key.
        const SHIFT = 0b0001;
        /// Alt/Option key.
        const ALT   = 0b0010;
        /// Control key.
        const CTRL  = 0b0100;
        /// Super/Meta/Command key.
        const SUPER = 0b1000;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// Pointer buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    /// Primary button (left click, touch).
    Primary,

    /// Secondary button (right click).
    Secondary,

    /// Auxiliary button (middle click).
    Auxiliary,
}

/// The phase of a pointer interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// Button pressed down.
    Down(PointerButton),

    /// Button released.
    Up(PointerButton),

    /// Completed click (down + up on the same target).
    Click(PointerButton),

    /// Double activation (double click, double tap).
    DoubleClick(PointerButton),
}

/// Logical region of the control a pointer event landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerTarget {
    /// The search text input.
    Input,

    /// A row of the candidate list, by index into the shown candidates.
    Candidate(usize),

    /// The committed-selection chip.
    SelectionChip,

    /// The remove button on the selection chip.
    RemoveButton,

    /// The barcode scan button.
    ScanButton,

    /// Somewhere outside the control.
    Outside,
}

/// A pointer event routed to the control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    /// What happened.
    pub kind: PointerKind,

    /// Where it happened.
    pub target: PointerTarget,
}

impl PointerEvent {
    /// Create a new pointer event.
    #[must_use]
    pub const fn new(kind: PointerKind, target: PointerTarget) -> Self {
        Self { kind, target }
    }

    /// Primary-button press on `target`.
    #[must_use]
    pub const fn down(target: PointerTarget) -> Self {
        Self::new(PointerKind::Down(PointerButton::Primary), target)
    }

    /// Primary-button click on `target`.
    #[must_use]
    pub const fn click(target: PointerTarget) -> Self {
        Self::new(PointerKind::Click(PointerButton::Primary), target)
    }

    /// The button involved.
    #[must_use]
    pub const fn button(&self) -> PointerButton {
        match self.kind {
            PointerKind::Down(b)
            | PointerKind::Up(b)
            | PointerKind::Click(b)
            | PointerKind::DoubleClick(b) => b,
        }
    }
}

/// Focusable parts of the control's subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum FocusTarget {
    /// The search text input.
    Input,

    /// The committed-selection chip.
    SelectionChip,

    /// The barcode scan button.
    ScanButton,
}

#[cfg(feature = "crossterm")]
impl KeyEvent {
    /// Convert a crossterm key event into a lookup [`KeyEvent`].
    #[must_use]
    pub fn from_crossterm(event: cte::KeyEvent) -> Self {
        Self {
            code: map_key_code(event.code),
            modifiers: map_modifiers(event.modifiers),
            kind: map_key_kind(event.kind),
        }
    }
}

#[cfg(feature = "crossterm")]
fn map_key_kind(kind: cte::KeyEventKind) -> KeyEventKind {
    match kind {
        cte::KeyEventKind::Press => KeyEventKind::Press,
        cte::KeyEventKind::Repeat => KeyEventKind::Repeat,
        cte::KeyEventKind::Release => KeyEventKind::Release,
    }
}

#[cfg(feature = "crossterm")]
fn map_key_code(code: cte::KeyCode) -> KeyCode {
    match code {
        cte::KeyCode::Backspace => KeyCode::Backspace,
        cte::KeyCode::Enter => KeyCode::Enter,
        cte::KeyCode::Up => KeyCode::Up,
        cte::KeyCode::Down => KeyCode::Down,
        cte::KeyCode::Tab => KeyCode::Tab,
        cte::KeyCode::BackTab => KeyCode::BackTab,
        cte::KeyCode::Delete => KeyCode::Delete,
        cte::KeyCode::Char(c) => KeyCode::Char(c),
        cte::KeyCode::Esc => KeyCode::Escape,
        _ => KeyCode::Other,
    }
}

#[cfg(feature = "crossterm")]
fn map_modifiers(modifiers: cte::KeyModifiers) -> Modifiers {
    let mut mapped = Modifiers::NONE;
    if modifiers.contains(cte::KeyModifiers::SHIFT) {
        mapped |= Modifiers::SHIFT;
    }
    if modifiers.contains(cte::KeyModifiers::ALT) {
        mapped |= Modifiers::ALT;
    }
    if modifiers.contains(cte::KeyModifiers::CONTROL) {
        mapped |= Modifiers::CTRL;
    }
    if modifiers.contains(cte::KeyModifiers::SUPER)
        || modifiers.contains(cte::KeyModifiers::HYPER)
        || modifiers.contains(cte::KeyModifiers::META)
    {
        mapped |= Modifiers::SUPER;
    }
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_event_is_char() {
        let event = KeyEvent::new(KeyCode::Char('q'));
        assert!(event.is_char('q'));
        assert!(!event.is_char('x'));
    }

    #[test]
    fn release_is_not_actionable() {
        let press = KeyEvent::new(KeyCode::Down);
        let repeat = press.with_kind(KeyEventKind::Repeat);
        let release = press.with_kind(KeyEventKind::Release);
        assert!(press.is_actionable());
        assert!(repeat.is_actionable());
        assert!(!release.is_actionable());
    }

    #[test]
    fn modifiers_combine() {
        let event = KeyEvent::new(KeyCode::Char('l')).with_modifiers(Modifiers::CTRL | Modifiers::SHIFT);
        assert!(event.ctrl());
        assert!(event.modifiers.contains(Modifiers::SHIFT));
        assert!(!event.modifiers.contains(Modifiers::ALT));
    }

    #[test]
    fn pointer_button_extracted_from_every_kind() {
        for kind in [
            PointerKind::Down(PointerButton::Secondary),
            PointerKind::Up(PointerButton::Secondary),
            PointerKind::Click(PointerButton::Secondary),
            PointerKind::DoubleClick(PointerButton::Secondary),
        ] {
            let event = PointerEvent::new(kind, PointerTarget::Input);
            assert_eq!(event.button(), PointerButton::Secondary);
        }
    }

    #[cfg(feature = "crossterm")]
    #[test]
    fn crossterm_keys_map_to_lookup_keys() {
        let key = cte::KeyEvent::new(cte::KeyCode::Esc, cte::KeyModifiers::NONE);
        assert_eq!(KeyEvent::from_crossterm(key).code, KeyCode::Escape);

        let key = cte::KeyEvent::new(cte::KeyCode::F(5), cte::KeyModifiers::CONTROL);
        let mapped = KeyEvent::from_crossterm(key);
        assert_eq!(mapped.code, KeyCode::Other);
        assert!(mapped.ctrl());
    }
}
