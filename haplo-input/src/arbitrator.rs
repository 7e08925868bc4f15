use haplo_core::{AbortSignal, ResponseMapping};
use haplo_timing::Timer;
use tracing::debug;

use crate::error::InputError;
use crate::keyboard::KeyboardDevice;
use crate::keypad::ResponseKeypad;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Keyboard,
    Keypad,
}

impl InputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputSource::Keyboard => "keyboard",
            InputSource::Keypad => "keypad",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedResponse {
    pub symbol: String,
    pub label: String,
    pub source: InputSource,
    /// Timer reading at acceptance; reaction times are measured against this.
    pub accepted_at_ns: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Quit(AbortSignal),
    Response(AcceptedResponse),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Quit and responses.
    Responses,
    /// Quit only; response presses stay queued on the keyboard.
    QuitOnly,
}

/// Devices borrowed for the duration of a trial (or a message screen).
pub struct InputDevices<'a> {
    keyboard: Option<&'a mut dyn KeyboardDevice>,
    keypad: Option<&'a mut dyn ResponseKeypad>,
    keyboard_responses: bool,
}

impl<'a> InputDevices<'a> {
    /// Rejects a set-up with no way to respond.
    ///
    /// The keyboard always carries the quit channel; `keyboard_responses`
    /// decides whether it also carries responses.
    pub fn new(
        keyboard: Option<&'a mut dyn KeyboardDevice>,
        keypad: Option<&'a mut dyn ResponseKeypad>,
        keyboard_responses: bool,
    ) -> Result<Self, InputError> {
        let keyboard_ok = keyboard.is_some() && keyboard_responses;
        if !keyboard_ok && keypad.is_none() {
            return Err(InputError::NoResponseDevice);
        }
        Ok(Self {
            keyboard,
            keypad,
            keyboard_responses,
        })
    }

    pub fn has_keypad(&self) -> bool {
        self.keypad.is_some()
    }

    /// Drops anything queued on either device.
    pub fn clear(&mut self) {
        if let Some(kb) = self.keyboard.as_deref_mut() {
            kb.clear_events();
        }
        if let Some(kp) = self.keypad.as_deref_mut() {
            kp.clear();
        }
    }

    /// Releases the keypad line. The keyboard belongs to the window and is
    /// left alone.
    pub fn close(&mut self) {
        if let Some(kp) = self.keypad.as_deref_mut() {
            kp.close();
        }
    }
}

/// Merges quit, keyboard and keypad into one event per poll cycle.
///
/// Precedence within a cycle: quit, then keyboard, then keypad.
#[derive(Debug, Clone)]
pub struct InputArbitrator {
    quit_keys: Vec<String>,
    responses: ResponseMapping,
}

impl InputArbitrator {
    pub fn new(quit_keys: Vec<String>, responses: ResponseMapping) -> Result<Self, InputError> {
        if quit_keys.is_empty() {
            return Err(InputError::EmptyQuitKeys);
        }
        if responses.is_empty() {
            return Err(InputError::EmptyResponseMapping);
        }
        if let Some(clash) = quit_keys.iter().find(|k| responses.contains(k)) {
            return Err(InputError::OverlappingKeys(clash.clone()));
        }
        Ok(Self {
            quit_keys,
            responses,
        })
    }

    fn is_quit(&self, symbol: &str) -> bool {
        self.quit_keys.iter().any(|k| k == symbol)
    }

    /// Runs one poll cycle over every configured channel.
    pub fn poll<T: Timer>(
        &self,
        devices: &mut InputDevices<'_>,
        mode: PollMode,
        timer: &T,
    ) -> Option<InputEvent> {
        let collect = mode == PollMode::Responses;

        if let Some(kb) = devices.keyboard.as_deref_mut() {
            let mut symbols: Vec<&str> = self.quit_keys.iter().map(String::as_str).collect();
            if collect && devices.keyboard_responses {
                symbols.extend(self.responses.symbols());
            }
            let presses = kb.poll(&symbols);
            if let Some(quit) = presses.iter().find(|p| self.is_quit(&p.symbol)) {
                debug!("quit key '{}' detected", quit.symbol);
                return Some(InputEvent::Quit(AbortSignal::new(quit.symbol.clone())));
            }
            // Queue order is arrival order; only the earliest press counts.
            if let Some(first) = presses.into_iter().next() {
                let pressed_at = Some(first.timestamp_ns);
                return Some(self.accept(first.symbol, InputSource::Keyboard, pressed_at, timer));
            }
        }

        if !collect {
            return None;
        }

        let kp = devices.keypad.as_deref_mut()?;
        let symbols: Vec<&str> = self.responses.symbols().collect();
        let symbol = kp.poll(&symbols)?;
        Some(self.accept(symbol, InputSource::Keypad, None, timer))
    }

    /// Quit check plus "any of `keys`" on the keyboard, or any response symbol
    /// on the keypad. Used by message screens that wait to continue.
    pub fn poll_continue(
        &self,
        devices: &mut InputDevices<'_>,
        keys: &[String],
    ) -> Option<Result<String, AbortSignal>> {
        if let Some(kb) = devices.keyboard.as_deref_mut() {
            let symbols: Vec<&str> = self
                .quit_keys
                .iter()
                .chain(keys.iter())
                .map(String::as_str)
                .collect();
            let presses = kb.poll(&symbols);
            if let Some(quit) = presses.iter().find(|p| self.is_quit(&p.symbol)) {
                return Some(Err(AbortSignal::new(quit.symbol.clone())));
            }
            if let Some(first) = presses.into_iter().next() {
                return Some(Ok(first.symbol));
            }
        }
        let kp = devices.keypad.as_deref_mut()?;
        let symbols: Vec<&str> = self.responses.symbols().collect();
        kp.poll(&symbols).map(Ok)
    }

    /// `pressed_at_ns` is known for keyboard presses only; it is logged, while
    /// reaction times use the acceptance time.
    fn accept<T: Timer>(
        &self,
        symbol: String,
        source: InputSource,
        pressed_at_ns: Option<u64>,
        timer: &T,
    ) -> InputEvent {
        let label = self.responses.label(&symbol).unwrap_or_default().to_string();
        let accepted_at_ns = timer.now();
        match pressed_at_ns {
            Some(pressed) => debug!(
                "response '{}' ({}) accepted from {} at {} ns, {} ns after the press",
                symbol,
                label,
                source.as_str(),
                accepted_at_ns,
                accepted_at_ns.saturating_sub(pressed)
            ),
            None => debug!(
                "response '{}' ({}) accepted from {} at {} ns",
                symbol,
                label,
                source.as_str(),
                accepted_at_ns
            ),
        }
        InputEvent::Response(AcceptedResponse {
            symbol,
            label,
            source,
            accepted_at_ns,
        })
    }
}
