//! Remote commands and their acknowledgments.
//!
//! Every inbound command yields exactly one [`CommandAck`]. Execution is
//! side-effect free apart from the [`CommandContext`] calls, which lets the
//! firmware and the emulator share the same rules.

use core::fmt::Write as _;

use heapless::String;

use crate::audio::{AudioEvent, AudioRequest, AudioSettings, locate_duration};
use crate::config::Configuration;
use crate::mode::{Lock, LockState, LockTarget};

pub const COMMAND_ID_CAPACITY: usize = 32;
pub const ACK_MESSAGE_CAPACITY: usize = 64;
pub const MELODY_NAME_CAPACITY: usize = 16;

pub const MIN_TONE_HZ: u16 = 100;
pub const MAX_TONE_HZ: u16 = 10_000;
pub const MIN_TONE_MS: u16 = 50;
pub const MAX_TONE_MS: u16 = 5_000;

/// Correlation id chosen by the backend.
pub type CommandId = String<COMMAND_ID_CAPACITY>;
/// Human-readable acknowledgment text.
pub type AckMessage = String<ACK_MESSAGE_CAPACITY>;

/// Remote request, one variant per command kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Ping,
    /// Repeating beep pattern. `None` or zero uses the configured duration.
    Locate { duration_sec: Option<u16> },
    PlayMelody { melody: String<MELODY_NAME_CAPACITY> },
    TestTone { frequency_hz: u16, duration_ms: u16 },
    /// Volume out of range is reported, not clamped.
    SetVolume { volume: u16 },
    Unlock { target: LockTarget },
}

impl Command {
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Command::Ping => CommandKind::Ping,
            Command::Locate { .. } => CommandKind::Locate,
            Command::PlayMelody { .. } => CommandKind::PlayMelody,
            Command::TestTone { .. } => CommandKind::TestTone,
            Command::SetVolume { .. } => CommandKind::SetVolume,
            Command::Unlock { .. } => CommandKind::Unlock,
        }
    }
}

/// Command discriminant carried in acknowledgments.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CommandKind {
    Ping,
    Locate,
    PlayMelody,
    TestTone,
    SetVolume,
    Unlock,
}

impl CommandKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CommandKind::Ping => "ping",
            CommandKind::Locate => "locate",
            CommandKind::PlayMelody => "play_melody",
            CommandKind::TestTone => "test_audio",
            CommandKind::SetVolume => "set_volume",
            CommandKind::Unlock => "unlock",
        }
    }
}

/// Command as delivered by the cloud layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InboundCommand {
    pub id: CommandId,
    pub command: Command,
}

/// Outcome reported back to the backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandStatus {
    Ok,
    Error,
    Ignored,
}

impl CommandStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Ok => "ok",
            CommandStatus::Error => "error",
            CommandStatus::Ignored => "ignored",
        }
    }
}

/// Result of one command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandAck {
    pub id: CommandId,
    pub kind: CommandKind,
    pub status: CommandStatus,
    pub message: AckMessage,
    pub executed_at_sec: u32,
}

/// Side effects a command may request.
pub trait CommandContext {
    fn audio_settings(&self) -> AudioSettings;

    /// Overrides the playback volume until the next configuration update.
    fn set_volume(&mut self, volume: u8);

    /// Queues audio without blocking; `false` when the queue is full.
    fn enqueue_audio(&mut self, request: AudioRequest) -> bool;

    fn locks(&self) -> LockState;

    /// Asks the mode owner to release matching locks; `false` when the
    /// request could not be queued.
    fn request_unlock(&mut self, target: LockTarget) -> bool;
}

/// Runs one command and builds its acknowledgment.
pub fn execute<C: CommandContext>(
    inbound: &InboundCommand,
    config: &Configuration,
    context: &mut C,
    executed_at_sec: u32,
) -> CommandAck {
    let (status, message) = match &inbound.command {
        Command::Ping => ping(context),
        Command::Locate { duration_sec } => locate(*duration_sec, config, context),
        Command::PlayMelody { melody } => play_melody(melody, context),
        Command::TestTone {
            frequency_hz,
            duration_ms,
        } => test_tone(*frequency_hz, *duration_ms, context),
        Command::SetVolume { volume } => set_volume(*volume, context),
        Command::Unlock { target } => unlock(*target, context),
    };

    CommandAck {
        id: inbound.id.clone(),
        kind: inbound.command.kind(),
        status,
        message,
        executed_at_sec,
    }
}

type Outcome = (CommandStatus, AckMessage);

fn text(status: CommandStatus, message: &str) -> Outcome {
    let mut out = AckMessage::new();
    for ch in message.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    (status, out)
}

fn formatted(status: CommandStatus, args: core::fmt::Arguments<'_>) -> Outcome {
    let mut out = AckMessage::new();
    // Overlong messages are truncated.
    let _ = out.write_fmt(args);
    (status, out)
}

fn audio_disabled<C: CommandContext>(context: &C) -> Option<Outcome> {
    if context.audio_settings().is_audible() {
        None
    } else {
        Some(text(CommandStatus::Ignored, "Audio disabled"))
    }
}

fn ping<C: CommandContext>(context: &mut C) -> Outcome {
    if let Some(ignored) = audio_disabled(context) {
        return ignored;
    }
    if context.enqueue_audio(AudioRequest::Event(AudioEvent::Ping)) {
        text(CommandStatus::Ok, "Ping played")
    } else {
        text(CommandStatus::Error, "Failed to queue audio")
    }
}

fn locate<C: CommandContext>(
    duration_sec: Option<u16>,
    config: &Configuration,
    context: &mut C,
) -> Outcome {
    if let Some(ignored) = audio_disabled(context) {
        return ignored;
    }
    let duration = locate_duration(duration_sec, config.locate_duration_sec);
    if context.enqueue_audio(AudioRequest::StartLocate { duration }) {
        formatted(
            CommandStatus::Ok,
            format_args!("Locate started for {} seconds", duration.as_secs()),
        )
    } else {
        text(CommandStatus::Error, "Failed to start locate")
    }
}

fn play_melody<C: CommandContext>(melody: &str, context: &mut C) -> Outcome {
    if let Some(ignored) = audio_disabled(context) {
        return ignored;
    }
    let Some(event) = AudioEvent::from_melody_name(melody) else {
        return formatted(CommandStatus::Error, format_args!("Unknown melody: {melody}"));
    };
    if context.enqueue_audio(AudioRequest::Event(event)) {
        formatted(CommandStatus::Ok, format_args!("Playing melody: {melody}"))
    } else {
        text(CommandStatus::Error, "Failed to queue melody")
    }
}

fn test_tone<C: CommandContext>(frequency_hz: u16, duration_ms: u16, context: &mut C) -> Outcome {
    if let Some(ignored) = audio_disabled(context) {
        return ignored;
    }
    if !(MIN_TONE_HZ..=MAX_TONE_HZ).contains(&frequency_hz) {
        return text(CommandStatus::Error, "Frequency must be 100-10000 Hz");
    }
    if !(MIN_TONE_MS..=MAX_TONE_MS).contains(&duration_ms) {
        return text(CommandStatus::Error, "Duration must be 50-5000 ms");
    }
    let request = AudioRequest::Tone {
        frequency_hz,
        duration_ms,
    };
    if context.enqueue_audio(request) {
        formatted(
            CommandStatus::Ok,
            format_args!("Playing {frequency_hz}Hz for {duration_ms}ms"),
        )
    } else {
        text(CommandStatus::Error, "Failed to queue tone")
    }
}

fn set_volume<C: CommandContext>(volume: u16, context: &mut C) -> Outcome {
    let Some(volume) = u8::try_from(volume).ok().filter(|v| *v <= 100) else {
        return text(CommandStatus::Error, "Volume must be 0-100");
    };
    context.set_volume(volume);
    // Confirmation beep at the new level; a full queue only loses the beep.
    let _ = context.enqueue_audio(AudioRequest::Event(AudioEvent::Ping));
    formatted(CommandStatus::Ok, format_args!("Volume set to {volume}%"))
}

fn unlock<C: CommandContext>(target: LockTarget, context: &mut C) -> Outcome {
    let Some(active) = context.locks().active().filter(|lock| target.covers(*lock)) else {
        return text(CommandStatus::Ignored, "No lock was active");
    };
    if !context.request_unlock(target) {
        return text(CommandStatus::Error, "Failed to queue unlock");
    }
    match active {
        Lock::Transit => text(CommandStatus::Ok, "Cleared transit lock"),
        Lock::Demo => text(CommandStatus::Ok, "Cleared demo lock"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatingMode;
    use core::time::Duration;
    use heapless::Vec;

    struct Recorder {
        settings: AudioSettings,
        queued: Vec<AudioRequest, 8>,
        queue_full: bool,
        locks: LockState,
        unlock_requests: Vec<LockTarget, 4>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                settings: AudioSettings::default(),
                queued: Vec::new(),
                queue_full: false,
                locks: LockState::UNLOCKED,
                unlock_requests: Vec::new(),
            }
        }
    }

    impl CommandContext for Recorder {
        fn audio_settings(&self) -> AudioSettings {
            self.settings
        }

        fn set_volume(&mut self, volume: u8) {
            self.settings.volume = volume;
        }

        fn enqueue_audio(&mut self, request: AudioRequest) -> bool {
            !self.queue_full && self.queued.push(request).is_ok()
        }

        fn locks(&self) -> LockState {
            self.locks
        }

        fn request_unlock(&mut self, target: LockTarget) -> bool {
            self.unlock_requests.push(target).is_ok()
        }
    }

    fn run(command: Command, context: &mut Recorder) -> CommandAck {
        let inbound = InboundCommand {
            id: CommandId::try_from("cmd-1").expect("short id"),
            command,
        };
        execute(&inbound, &Configuration::new(), context, 42)
    }

    #[test]
    fn ping_queues_cue() {
        let mut context = Recorder::new();
        let ack = run(Command::Ping, &mut context);
        assert_eq!(ack.status, CommandStatus::Ok);
        assert_eq!(ack.message.as_str(), "Ping played");
        assert_eq!(ack.kind, CommandKind::Ping);
        assert_eq!(ack.id.as_str(), "cmd-1");
        assert_eq!(ack.executed_at_sec, 42);
        assert_eq!(context.queued.as_slice(), &[AudioRequest::Event(AudioEvent::Ping)]);
    }

    #[test]
    fn ping_reports_full_queue_and_muted_audio() {
        let mut context = Recorder::new();
        context.queue_full = true;
        let ack = run(Command::Ping, &mut context);
        assert_eq!(ack.status, CommandStatus::Error);
        assert_eq!(ack.message.as_str(), "Failed to queue audio");

        context.settings.muted = true;
        let ack = run(Command::Ping, &mut context);
        assert_eq!(ack.status, CommandStatus::Ignored);
        assert_eq!(ack.message.as_str(), "Audio disabled");
    }

    #[test]
    fn locate_defaults_and_clamps_duration() {
        let mut context = Recorder::new();
        let ack = run(Command::Locate { duration_sec: None }, &mut context);
        assert_eq!(ack.message.as_str(), "Locate started for 30 seconds");
        let ack = run(
            Command::Locate {
                duration_sec: Some(1_000),
            },
            &mut context,
        );
        assert_eq!(ack.message.as_str(), "Locate started for 300 seconds");
        assert_eq!(
            context.queued.last(),
            Some(&AudioRequest::StartLocate {
                duration: Duration::from_secs(300)
            })
        );
    }

    #[test]
    fn unknown_melody_is_an_error() {
        let mut context = Recorder::new();
        let melody = String::try_from("fanfare").expect("short name");
        let ack = run(Command::PlayMelody { melody }, &mut context);
        assert_eq!(ack.status, CommandStatus::Error);
        assert_eq!(ack.message.as_str(), "Unknown melody: fanfare");

        let melody = String::try_from("gps_lock").expect("short name");
        let ack = run(Command::PlayMelody { melody }, &mut context);
        assert_eq!(ack.status, CommandStatus::Ok);
        assert_eq!(ack.message.as_str(), "Playing melody: gps_lock");
    }

    #[test]
    fn tone_parameters_are_validated() {
        let mut context = Recorder::new();
        let ack = run(
            Command::TestTone {
                frequency_hz: 50,
                duration_ms: 100,
            },
            &mut context,
        );
        assert_eq!(ack.message.as_str(), "Frequency must be 100-10000 Hz");
        let ack = run(
            Command::TestTone {
                frequency_hz: 440,
                duration_ms: 6_000,
            },
            &mut context,
        );
        assert_eq!(ack.message.as_str(), "Duration must be 50-5000 ms");
        let ack = run(
            Command::TestTone {
                frequency_hz: 440,
                duration_ms: 250,
            },
            &mut context,
        );
        assert_eq!(ack.status, CommandStatus::Ok);
        assert_eq!(ack.message.as_str(), "Playing 440Hz for 250ms");
    }

    #[test]
    fn volume_is_range_checked() {
        let mut context = Recorder::new();
        let ack = run(Command::SetVolume { volume: 101 }, &mut context);
        assert_eq!(ack.status, CommandStatus::Error);
        assert_eq!(context.settings.volume, 80);

        let ack = run(Command::SetVolume { volume: 35 }, &mut context);
        assert_eq!(ack.message.as_str(), "Volume set to 35%");
        assert_eq!(context.settings.volume, 35);
    }

    #[test]
    fn unlock_requires_matching_lock() {
        let mut context = Recorder::new();
        let ack = run(
            Command::Unlock {
                target: LockTarget::All,
            },
            &mut context,
        );
        assert_eq!(ack.status, CommandStatus::Ignored);
        assert_eq!(ack.message.as_str(), "No lock was active");

        let mut mode = OperatingMode::Storage;
        crate::mode::ModeController::new(&mut mode, &mut context.locks).toggle(Lock::Demo);
        let ack = run(
            Command::Unlock {
                target: LockTarget::Transit,
            },
            &mut context,
        );
        assert_eq!(ack.status, CommandStatus::Ignored);

        let ack = run(
            Command::Unlock {
                target: LockTarget::All,
            },
            &mut context,
        );
        assert_eq!(ack.status, CommandStatus::Ok);
        assert_eq!(ack.message.as_str(), "Cleared demo lock");
        assert_eq!(context.unlock_requests.as_slice(), &[LockTarget::All]);
    }
}
