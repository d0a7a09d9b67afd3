use std::io::Write;
use std::sync::OnceLock;
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// A soft beep when an anomaly is first detected.
    Alert,
    /// A short, sharp beep repeated every second while the escalation counts down.
    Critical,
}

impl Tone {
    pub fn frequency_hz(&self) -> u32 {
        match self {
            Tone::Alert => 440,
            Tone::Critical => 880,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            Tone::Alert => 500,
            Tone::Critical => 100,
        }
    }
}

pub trait ToneSink: Send + Sync {
    fn play(&self, tone: Tone);
}

/// Rings the terminal bell on stderr.
pub struct TerminalBell;

impl ToneSink for TerminalBell {
    fn play(&self, tone: Tone) {
        debug!("Playing {:?} tone ({}Hz, {}ms)", tone, tone.frequency_hz(), tone.duration_ms());
        let mut stderr = std::io::stderr();
        if let Err(err) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            warn!("Failed to play {:?} tone: {:?}", tone, err);
        }
    }
}

type SinkFactory = Box<dyn Fn() -> Box<dyn ToneSink> + Send + Sync>;

/// The single audio output of an application context, created on first use.
pub struct AudioOutput {
    factory: SinkFactory,
    sink: OnceLock<Box<dyn ToneSink>>,
}

impl AudioOutput {
    pub fn new(factory: SinkFactory) -> Self {
        AudioOutput {
            factory,
            sink: OnceLock::new(),
        }
    }

    pub fn terminal() -> Self {
        AudioOutput::new(Box::new(|| Box::new(TerminalBell) as Box<dyn ToneSink>))
    }

    pub fn is_created(&self) -> bool {
        self.sink.get().is_some()
    }

    pub fn play(&self, tone: Tone) {
        self.sink
            .get_or_init(|| {
                debug!("Creating audio output");
                (self.factory)()
            })
            .play(tone);
    }
}
