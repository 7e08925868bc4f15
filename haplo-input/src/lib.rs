//! Response input: a polled keyboard, an asynchronous serial keypad and the
//! quit channel, merged into one "next event" with fixed precedence.

pub mod arbitrator;
pub mod error;
pub mod keyboard;
pub mod keypad;
pub mod ring;

pub use arbitrator::{
    AcceptedResponse, InputArbitrator, InputDevices, InputEvent, InputSource, PollMode,
};
pub use error::InputError;
pub use keyboard::{KeyPress, KeyboardDevice};
pub use keypad::{open_serial_keypad, PortKeypad, ResponseKeypad, SerialKeypad, SerialLine};
pub use ring::ByteRing;
