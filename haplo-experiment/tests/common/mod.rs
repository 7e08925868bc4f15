#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use haplo_core::Stimulus;
use haplo_experiment::ExperimentConfig;
use haplo_input::{KeyPress, KeyboardDevice, SerialKeypad, SerialLine};
use haplo_render::{DisplaySurface, RenderError};
use haplo_timing::{SimulatedTimer, Timer};
use serde_json::{Map, Value};

pub fn secs(s: f64) -> u64 {
    Duration::from_secs_f64(s).as_nanos() as u64
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Image(PathBuf),
    Text(String),
    Fixation,
    Flip,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Logged {
    pub eye: &'static str,
    pub at_ns: u64,
    pub command: Command,
}

pub type DisplayLog = Rc<RefCell<Vec<Logged>>>;

/// Display that records every call, stamped with the shared clock.
pub struct MockDisplay {
    eye: &'static str,
    timer: SimulatedTimer,
    log: DisplayLog,
}

impl MockDisplay {
    pub fn pair(timer: &SimulatedTimer) -> (Self, Self, DisplayLog) {
        let log = DisplayLog::default();
        let make = |eye| MockDisplay {
            eye,
            timer: timer.clone(),
            log: Rc::clone(&log),
        };
        let (left, right) = (make("L"), make("R"));
        (left, right, log)
    }

    fn push(&self, command: Command) {
        self.log.borrow_mut().push(Logged {
            eye: self.eye,
            at_ns: self.timer.now(),
            command,
        });
    }
}

impl DisplaySurface for MockDisplay {
    fn draw_image(&mut self, path: &Path) -> Result<(), RenderError> {
        self.push(Command::Image(path.to_path_buf()));
        Ok(())
    }
    fn draw_text(&mut self, text: &str, _: (f32, f32), _: f32) -> Result<(), RenderError> {
        self.push(Command::Text(text.to_string()));
        Ok(())
    }
    fn draw_fixation(&mut self) -> Result<(), RenderError> {
        self.push(Command::Fixation);
        Ok(())
    }
    fn flip(&mut self) -> Result<(), RenderError> {
        self.push(Command::Flip);
        Ok(())
    }
    fn close(&mut self) {
        self.push(Command::Close);
    }
}

/// Keyboard whose presses become visible once the shared clock reaches them.
///
/// Symbols in `always` are reported whenever they are asked for, which stands
/// in for a participant who answers immediately.
pub struct ScriptedKeyboard {
    timer: SimulatedTimer,
    script: VecDeque<(u64, String)>,
    queue: Vec<KeyPress>,
    always: Vec<String>,
}

impl ScriptedKeyboard {
    pub fn new(timer: &SimulatedTimer, script: &[(f64, &str)]) -> Self {
        let mut script: Vec<(u64, String)> = script
            .iter()
            .map(|(at, sym)| (secs(*at), sym.to_string()))
            .collect();
        script.sort_by_key(|(at, _)| *at);
        Self {
            timer: timer.clone(),
            script: script.into(),
            queue: Vec::new(),
            always: Vec::new(),
        }
    }

    pub fn always(mut self, symbols: &[&str]) -> Self {
        self.always = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    fn release_due(&mut self) {
        let now = self.timer.now();
        while self.script.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((at, symbol)) = self.script.pop_front() {
                self.queue.push(KeyPress {
                    symbol,
                    timestamp_ns: at,
                });
            }
        }
    }
}

impl KeyboardDevice for ScriptedKeyboard {
    fn poll(&mut self, symbols: &[&str]) -> Vec<KeyPress> {
        self.release_due();
        let (hit, keep): (Vec<_>, Vec<_>) = self
            .queue
            .drain(..)
            .partition(|p| symbols.contains(&p.symbol.as_str()));
        self.queue = keep;
        if !hit.is_empty() {
            return hit;
        }
        self.always
            .iter()
            .find(|s| symbols.contains(&s.as_str()))
            .map(|s| {
                vec![KeyPress {
                    symbol: s.clone(),
                    timestamp_ns: self.timer.now(),
                }]
            })
            .unwrap_or_default()
    }

    fn clear_events(&mut self) {
        self.release_due();
        self.queue.clear();
    }
}

/// Serial line that delivers scripted bytes once the shared clock reaches them.
pub struct ScriptedLine {
    timer: SimulatedTimer,
    script: VecDeque<(u64, Vec<u8>)>,
    pending: VecDeque<u8>,
}

impl ScriptedLine {
    fn release_due(&mut self) {
        let now = self.timer.now();
        while self.script.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, bytes)) = self.script.pop_front() {
                self.pending.extend(bytes);
            }
        }
    }
}

impl SerialLine for ScriptedLine {
    fn bytes_waiting(&mut self) -> io::Result<usize> {
        self.release_due();
        Ok(self.pending.len())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

pub fn scripted_keypad(
    timer: &SimulatedTimer,
    script: &[(f64, &[u8])],
) -> SerialKeypad<ScriptedLine> {
    let line = ScriptedLine {
        timer: timer.clone(),
        script: script
            .iter()
            .map(|(at, bytes)| (secs(*at), bytes.to_vec()))
            .collect(),
        pending: VecDeque::new(),
    };
    SerialKeypad::new(line, "scripted")
}

pub fn stimulus(id: &str, metadata: Value) -> Stimulus {
    let metadata: Map<String, Value> = metadata.as_object().cloned().unwrap_or_default();
    Stimulus::new(
        id,
        format!("stimuli/{id}_L.png"),
        format!("stimuli/{id}_R.png"),
        metadata,
    )
}

/// Default timings (1.5 s stimulus, 0.75 s fixation and prompt, 10 ms cycle)
/// without the instructions screen.
pub fn config() -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.session.show_instructions = false;
    config
}

pub fn commands(log: &DisplayLog) -> Vec<Logged> {
    log.borrow().clone()
}

pub fn texts(log: &DisplayLog) -> Vec<String> {
    log.borrow()
        .iter()
        .filter_map(|l| match &l.command {
            Command::Text(t) => Some(t.clone()),
            _ => None,
        })
        .collect()
}

/// Text drawn on one eye only; each message appears once per eye.
pub fn eye_texts(log: &DisplayLog, eye: &str) -> Vec<String> {
    log.borrow()
        .iter()
        .filter(|l| l.eye == eye)
        .filter_map(|l| match &l.command {
            Command::Text(t) => Some(t.clone()),
            _ => None,
        })
        .collect()
}
