/// A key press reported by a keyboard device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub symbol: String,
    /// Session timer reading when the press was observed.
    pub timestamp_ns: u64,
}

/// Non-blocking keyboard.
///
/// Presses are reported on key-down; release is never awaited.
pub trait KeyboardDevice {
    /// Removes and returns queued presses whose symbol is in `symbols`, oldest
    /// first. Presses of other symbols stay queued.
    fn poll(&mut self, symbols: &[&str]) -> Vec<KeyPress>;

    /// Drops every queued press.
    fn clear_events(&mut self);
}
