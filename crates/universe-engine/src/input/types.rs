use std::fmt;

/// Keyboard key.
///
/// The runtime maps physical key codes into these; anything else arrives as
/// `Key::Unknown` carrying the platform code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Key {
    Escape,
    Enter,
    Tab,
    Backspace,
    Space,

    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,

    Shift,
    Control,
    Alt,
    Meta,

    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,

    Digit0, Digit1, Digit2, Digit3, Digit4,
    Digit5, Digit6, Digit7, Digit8, Digit9,

    Unknown(u32),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    Other(u16),
}

/// Modifier keys held while an event fired.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt || self.meta
    }
}

/// Pointer and keyboard events delivered to scene nodes.
///
/// Pointer coordinates are logical pixels, top-left origin. Events are
/// delivered pre-order: a node sees an event before its children.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    PointerPressed { button: MouseButton, x: f32, y: f32 },
    PointerReleased { button: MouseButton, x: f32, y: f32 },
    PointerMoved { x: f32, y: f32 },
    /// Scroll in lines (or pixels / 100 for precise devices).
    Scrolled { dx: f32, dy: f32 },
    KeyPressed { key: Key, modifiers: Modifiers, repeat: bool },
    KeyReleased { key: Key, modifiers: Modifiers },
}

impl NodeEvent {
    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            Self::PointerPressed { .. }
                | Self::PointerReleased { .. }
                | Self::PointerMoved { .. }
                | Self::Scrolled { .. }
        )
    }
}
