//! Output routing: discard, filter, channels, or a window layer
use indexmap::IndexMap;

use crate::error::RuntimeError;

/// Discard all output
pub const IOSYS_NULL: u32 = 0;
/// Call a filter routine once per character
pub const IOSYS_FILTER: u32 = 1;
/// Hand characters to the window layer
pub const IOSYS_WINDOW: u32 = 2;
/// Accumulate text into named channel buffers
pub const IOSYS_CHANNELS: u32 = 20;

/// The default channel, "MAIN"
pub const CHANNEL_MAIN: u32 = 0x4D41_494E;

/// Channel output delivered to the host, in channel-creation order
pub type Output = IndexMap<String, String>;

/// A minimal single-window input/output layer.
///
/// The engine never provides one itself; a host may attach an
/// implementation, and in its absence the window target discards output
/// and `glk` requests answer zero.
pub trait Window {
    fn put_char(&mut self, c: char);
    fn glk(&mut self, selector: u32, args: &[u32]) -> Result<u32, RuntimeError>;
}

fn channel_name(id: u32) -> String {
    id.to_be_bytes()
        .iter()
        .map(|b| {
            if b.is_ascii_graphic() {
                *b as char
            } else {
                '?'
            }
        })
        .collect()
}

/// Output target state
pub struct Io {
    mode: u32,
    rock: u32,
    channels: IndexMap<u32, String>,
    channel: u32,
    window: Option<Box<dyn Window>>,
}

impl Io {
    pub fn new() -> Io {
        let mut channels = IndexMap::new();
        channels.insert(CHANNEL_MAIN, String::new());
        Io {
            mode: IOSYS_NULL,
            rock: 0,
            channels,
            channel: CHANNEL_MAIN,
            window: None,
        }
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn rock(&self) -> u32 {
        self.rock
    }

    /// For the filter target, the rock is the filter routine address
    pub fn filter(&self) -> u32 {
        self.rock
    }

    pub fn set_iosys(&mut self, mode: u32, rock: u32) {
        match mode {
            IOSYS_NULL | IOSYS_FILTER | IOSYS_WINDOW | IOSYS_CHANNELS => {
                info!(target: "app::stream", "I/O system {} (rock {:#x})", mode, rock);
                self.mode = mode;
                self.rock = rock;
            }
            _ => {
                // Selecting an unsupported system falls back to discarding
                warn!(target: "app::stream", "Unsupported I/O system {}, output discarded", mode);
                self.mode = IOSYS_NULL;
                self.rock = 0;
            }
        }
    }

    /// Select an output channel, lazily creating its buffer.
    ///
    /// Re-selecting an existing channel never clears what it has
    /// accumulated.
    pub fn select_channel(&mut self, id: u32) {
        if !self.channels.contains_key(&id) {
            debug!(target: "app::stream", "New channel {}", channel_name(id));
            self.channels.insert(id, String::new());
        }
        self.channel = id;
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Append a character to the current channel buffer
    pub fn channel_put(&mut self, c: char) {
        if let Some(buffer) = self.channels.get_mut(&self.channel) {
            buffer.push(c);
        }
    }

    pub fn window_put(&mut self, c: char) {
        if let Some(w) = self.window.as_mut() {
            w.put_char(c);
        }
    }

    pub fn window_glk(&mut self, selector: u32, args: &[u32]) -> Result<u32, RuntimeError> {
        match self.window.as_mut() {
            Some(w) => w.glk(selector, args),
            None => Ok(0),
        }
    }

    pub fn has_window(&self) -> bool {
        self.window.is_some()
    }

    pub fn set_window(&mut self, window: Box<dyn Window>) {
        self.window = Some(window);
    }

    /// Return and clear all accumulated channel text.
    ///
    /// Runs only when the engine is about to block or halt.
    pub fn flush(&mut self) -> Output {
        let mut output = Output::new();
        for (id, buffer) in self.channels.iter_mut() {
            if !buffer.is_empty() {
                output.insert(channel_name(*id), std::mem::take(buffer));
            }
        }
        output
    }
}

impl Default for Io {
    fn default() -> Self {
        Io::new()
    }
}
