//! Builtin event names.

use crate::EventCategory;

/// A key went down. Params: key code.
pub const KEY_PRESSED: &str = "key_pressed";
/// A key came up. Params: key code.
pub const KEY_RELEASED: &str = "key_released";
/// A full line was submitted on a terminal. Params: `"text: <line>"`.
pub const TEXT_ENTERED: &str = "text_entered";
/// A pointer button was pressed.
pub const BUTTON_PRESSED: &str = "button_pressed";
/// The pointer wheel moved.
pub const SCROLLED: &str = "scrolled";
/// The pointer moved.
pub const MOVED: &str = "moved";
/// A terminal was opened. Params: terminal id.
pub const START_TERMINAL: &str = "start_terminal";
/// A terminal was closed. Params: terminal id.
pub const END_TERMINAL: &str = "end_terminal";

/// Event names every machine registers at construction.
#[must_use]
pub fn default_taxonomy() -> Vec<(&'static str, EventCategory)> {
    vec![
        (KEY_PRESSED, EventCategory::Key),
        (KEY_RELEASED, EventCategory::Key),
        (TEXT_ENTERED, EventCategory::Key),
        (BUTTON_PRESSED, EventCategory::Mouse),
        (SCROLLED, EventCategory::Mouse),
        (MOVED, EventCategory::Mouse),
        (START_TERMINAL, EventCategory::Lifecycle),
        (END_TERMINAL, EventCategory::Lifecycle),
    ]
}

/// Prefix placed before submitted terminal text in `text_entered`.
pub const TEXT_ENTERED_PREFIX: &str = "text: ";
