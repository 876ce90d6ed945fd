//! Simulated device driven by console directives.
//!
//! The session owns a simulated uptime clock, the persistent state, and
//! in-memory stand-ins for the sensor, the cloud layer, and the persistence
//! backend. Every directive returns the lines the device would have logged or
//! played.

use std::fmt::Write as _;
use std::time::Duration;

use tracker_core::alerts::{self, SensorReading};
use tracker_core::audio::{AudioEvent, AudioRequest, AudioSettings, LocatePattern, LocateStep};
use tracker_core::commands::{self, CommandContext, CommandId, InboundCommand};
use tracker_core::config::{ConfigError, Configuration};
use tracker_core::drivers::{DriverError, PersistenceBackend};
use tracker_core::input::{BURST_WINDOW, ButtonLevel, ClickClassifier};
use tracker_core::mode::{GestureAction, LockOutcome, LockState, LockTarget, RemoteModeDecision};
use tracker_core::state::{BootKind, StateStore};
use tracker_core::telemetry::{OutboundRecord, TrackRecord};
use tracker_core::time::Uptime;

use crate::script::{self, Directive, ReadingUpdate};

/// Button polling period used while the clock advances.
const POLL_STEP: Duration = Duration::from_millis(10);
const CLICK_HOLD: Duration = Duration::from_millis(80);
const CLICK_GAP: Duration = Duration::from_millis(120);

/// What the caller should do after a directive.
#[derive(Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Frame storage that survives the simulated deep sleep.
#[derive(Default)]
struct RetainedMemory {
    frame: Option<Vec<u8>>,
}

impl PersistenceBackend for RetainedMemory {
    fn save(&mut self, bytes: &[u8]) -> Result<(), DriverError> {
        self.frame = Some(bytes.to_vec());
        Ok(())
    }

    fn load(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DriverError> {
        let Some(frame) = &self.frame else {
            return Ok(None);
        };
        let target = buf.get_mut(..frame.len()).ok_or(DriverError::Rejected)?;
        target.copy_from_slice(frame);
        Ok(Some(frame.len()))
    }
}

/// Environment values the simulated sensor returns.
#[derive(Copy, Clone, Debug)]
struct Environment {
    temperature_c: f32,
    humidity_pct: f32,
    pressure_hpa: f32,
    voltage_v: f32,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            temperature_c: 21.0,
            humidity_pct: 45.0,
            pressure_hpa: 1013.25,
            voltage_v: 3.9,
        }
    }
}

pub struct Session {
    now: Uptime,
    config: Configuration,
    store: StateStore,
    settings: AudioSettings,
    classifier: ClickClassifier,
    level: ButtonLevel,
    environment: Environment,
    locate: LocatePattern,
    retained: RetainedMemory,
    asleep: bool,
    records: Vec<OutboundRecord>,
    next_command_id: u32,
}

impl Session {
    pub fn new() -> Self {
        let config = Configuration::new();
        Self {
            now: Uptime::ZERO,
            config,
            store: StateStore::cold(Uptime::ZERO),
            settings: AudioSettings::from_config(&config.audio),
            classifier: ClickClassifier::new(),
            level: ButtonLevel::Released,
            environment: Environment::default(),
            locate: LocatePattern::idle(),
            retained: RetainedMemory::default(),
            asleep: false,
            records: Vec::new(),
            next_command_id: 1,
        }
    }

    pub fn banner(&self) -> Vec<String> {
        vec![
            format!(
                "Tracker emulator: boot #{} ({}), mode {}.",
                self.store.state().boot_count,
                boot_label(self.store.boot_kind()),
                self.config.mode
            ),
            "Type `help` for commands or `quit` to exit.".to_owned(),
        ]
    }

    /// Parses and runs one console line.
    pub fn handle_line(&mut self, line: &str, out: &mut Vec<String>) -> Flow {
        match script::parse_line(line) {
            Ok(directive) => self.apply(directive, out),
            Err(error) => {
                out.push(format!("ERR syntax {}", error.trim_end()));
                Flow::Continue
            }
        }
    }

    pub fn apply(&mut self, directive: Directive, out: &mut Vec<String>) -> Flow {
        if self.asleep
            && !matches!(
                directive,
                Directive::Wake
                    | Directive::Corrupt(_)
                    | Directive::Status
                    | Directive::Help
                    | Directive::Quit
            )
        {
            out.push("ERR device is asleep; `wake` first".to_owned());
            return Flow::Continue;
        }

        match directive {
            Directive::Press => self.set_level(ButtonLevel::Pressed, out),
            Directive::Release => self.set_level(ButtonLevel::Released, out),
            Directive::Click(count) => self.click(count, out),
            Directive::Wait(period) => self.advance(period, out),
            Directive::Reading(update) => self.sample(&update, out),
            Directive::Remote(command) => self.remote(command, out),
            Directive::Set { key, value } => self.set(&key, &value, out),
            Directive::Sleep => self.sleep(out),
            Directive::Wake => self.wake(out),
            Directive::Corrupt(bit) => self.corrupt(bit, out),
            Directive::Status => self.status(out),
            Directive::Help => out.extend(script::HELP.iter().map(|line| (*line).to_owned())),
            Directive::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn set_level(&mut self, level: ButtonLevel, out: &mut Vec<String>) {
        self.level = level;
        self.poll_button(out);
    }

    fn click(&mut self, count: u8, out: &mut Vec<String>) {
        for _ in 0..count {
            self.set_level(ButtonLevel::Pressed, out);
            self.advance(CLICK_HOLD, out);
            self.set_level(ButtonLevel::Released, out);
            self.advance(CLICK_GAP, out);
        }
        // Let the burst resolve.
        let mut waited = Duration::ZERO;
        while self.classifier.pending_clicks() > 0 && waited <= BURST_WINDOW {
            self.advance(POLL_STEP, out);
            waited += POLL_STEP;
        }
    }

    /// Moves the clock forward, polling the button and the locate pattern.
    fn advance(&mut self, period: Duration, out: &mut Vec<String>) {
        let end = self.now + period;
        while self.now < end {
            let step = POLL_STEP.min(end.saturating_duration_since(self.now));
            self.now = self.now + step;
            self.poll_button(out);
            self.tick_locate(out);
        }
    }

    fn poll_button(&mut self, out: &mut Vec<String>) {
        let Some(gesture) = self.classifier.poll(self.level, self.now) else {
            return;
        };
        out.push(format!("[{}] gesture: {gesture:?}", self.clock()));
        match GestureAction::from(gesture) {
            GestureAction::ToggleMute => {
                self.settings.muted = !self.settings.muted;
                out.push(format!(
                    "audio {}",
                    if self.settings.muted { "muted" } else { "unmuted" }
                ));
                if !self.settings.muted {
                    self.play(AudioRequest::Event(AudioEvent::Button), out);
                }
            }
            GestureAction::ToggleLock(lock) => {
                let outcome = self.store.state_mut().mode_controller().toggle(lock);
                self.apply_lock_outcome(outcome, out);
            }
        }
    }

    fn apply_lock_outcome(&mut self, outcome: LockOutcome, out: &mut Vec<String>) {
        match outcome {
            LockOutcome::Engaged {
                lock,
                previous,
                mode,
            } => out.push(format!("{} lock engaged: {previous} -> {mode}", lock.as_str())),
            LockOutcome::Released { lock, mode } => {
                out.push(format!("{} lock released: mode {mode}", lock.as_str()));
            }
            LockOutcome::Rejected { requested, active } => out.push(format!(
                "{} lock rejected: {} lock active",
                requested.as_str(),
                active.as_str()
            )),
        }
        if let Some(mode) = outcome.applied_mode() {
            self.config.mode = mode;
            self.emit(self.track_record(self.invalid_reading(), true), out);
        }
        self.play(AudioRequest::Event(outcome.cue()), out);
    }

    fn sample(&mut self, update: &ReadingUpdate, out: &mut Vec<String>) {
        let env = &mut self.environment;
        env.temperature_c = update.temperature_c.unwrap_or(env.temperature_c);
        env.humidity_pct = update.humidity_pct.unwrap_or(env.humidity_pct);
        env.pressure_hpa = update.pressure_hpa.unwrap_or(env.pressure_hpa);
        env.voltage_v = update.voltage_v.unwrap_or(env.voltage_v);
        let env = *env;

        let thresholds = self.config.thresholds;
        let timestamp_sec = self.now.as_secs_u32();
        let state = self.store.state_mut();
        let pending = state.take_motion();
        let reading = SensorReading {
            temperature_c: env.temperature_c,
            humidity_pct: env.humidity_pct,
            pressure_hpa: env.pressure_hpa,
            voltage_v: env.voltage_v,
            motion: pending || update.motion,
            valid: true,
            timestamp_sec,
        };
        let evaluation =
            alerts::evaluate(&reading, &thresholds, state.last_pressure_hpa, state.alerts);
        state.alerts = evaluation.apply(state.alerts);
        state.last_pressure_hpa = Some(reading.pressure_hpa);

        for kind in evaluation.triggered.iter() {
            let record = alerts::AlertRecord::new(kind, &reading, &thresholds);
            out.push(format!("alert {}: {}", kind.as_str(), record.message));
            self.emit(OutboundRecord::Alert(record), out);
            if let Some(cue) = kind.cue() {
                self.play(AudioRequest::Event(cue), out);
            }
        }
        for kind in evaluation.cleared.iter() {
            out.push(format!("alert {} cleared", kind.as_str()));
        }
        if update.motion {
            self.play(AudioRequest::Event(AudioEvent::Motion), out);
        }
        self.emit(self.track_record(reading, false), out);
    }

    fn remote(&mut self, command: commands::Command, out: &mut Vec<String>) {
        let mut id = CommandId::new();
        let _ = write!(id, "emu-{}", self.next_command_id);
        self.next_command_id += 1;
        let inbound = InboundCommand { id, command };

        let mut context = SessionContext {
            settings: self.settings,
            locks: self.store.state().locks,
            audio: Vec::new(),
            unlock: None,
        };
        let ack = commands::execute(
            &inbound,
            &self.config,
            &mut context,
            self.now.as_secs_u32(),
        );
        self.settings = context.settings;

        out.push(format!(
            "ack {} {} {}: {}",
            ack.id,
            ack.kind.as_str(),
            ack.status.as_str(),
            ack.message
        ));
        for request in context.audio {
            self.play(request, out);
        }
        if let Some(target) = context.unlock
            && let Some(outcome) = self
                .store
                .state_mut()
                .mode_controller()
                .release_matching(target)
        {
            self.apply_lock_outcome(outcome, out);
        }
        if self.config.cmd_ack_enabled {
            self.emit(OutboundRecord::CommandAck(ack), out);
        }
    }

    fn set(&mut self, key: &str, value: &str, out: &mut Vec<String>) {
        let mut next = self.config;
        match next.apply_remote(key, value) {
            Ok(true) => {}
            Ok(false) => {
                out.push(format!("{key}: unchanged"));
                return;
            }
            Err(ConfigError::UnknownKey) => {
                out.push(format!("ERR unknown key `{key}`"));
                return;
            }
            Err(error) => {
                out.push(format!("ERR {key}: {error}"));
                return;
            }
        }
        let mut next = next.sanitized();
        let decision = self
            .store
            .state_mut()
            .mode_controller()
            .request_remote(next.mode);
        let mut mode_changed = false;
        match decision {
            RemoteModeDecision::Accept(mode) => {
                out.push(format!("mode {} -> {mode}", self.config.mode));
                mode_changed = true;
            }
            RemoteModeDecision::Unchanged => {}
            RemoteModeDecision::Rejected { lock } => {
                out.push(format!(
                    "remote mode {} rejected: {} lock active",
                    next.mode,
                    lock.as_str()
                ));
                next.mode = self.config.mode;
            }
        }
        for field in self.config.changes(&next) {
            out.push(format!("config: {} changed", field.key()));
        }
        self.config = next;
        self.settings = self.settings.reconfigured(&next.audio);
        if mode_changed {
            self.emit(self.track_record(self.invalid_reading(), true), out);
        }
    }

    fn sleep(&mut self, out: &mut Vec<String>) {
        let Some(plan) = self.config.sleep_plan() else {
            out.push(format!("mode {} never sleeps", self.config.mode));
            return;
        };
        self.play(AudioRequest::Event(AudioEvent::Sleep), out);
        if let Err(error) = self.store.save(&mut self.retained, self.now) {
            out.push(format!("sleep aborted: {error}"));
            return;
        }
        self.locate.stop();
        self.asleep = true;
        let wake = match plan.duration {
            Some(duration) => format!("timer {} s", duration.as_secs()),
            None => "no timer".to_owned(),
        };
        out.push(format!(
            "sleeping: {wake}, motion wake {}, command wake {}",
            on_off(plan.wake_on_motion),
            on_off(plan.wake_on_command)
        ));
    }

    fn wake(&mut self, out: &mut Vec<String>) {
        self.now = Uptime::ZERO;
        self.store = match StateStore::load(&mut self.retained, self.now) {
            Ok(store) => store,
            Err(error) => {
                out.push(format!("restore failed ({error}); cold boot"));
                StateStore::cold(self.now)
            }
        };
        self.asleep = false;
        self.config.mode = self.store.state().mode;
        self.settings = AudioSettings::from_config(&self.config.audio);
        self.classifier = ClickClassifier::new();
        self.level = ButtonLevel::Released;
        self.locate = LocatePattern::idle();
        out.push(format!(
            "boot #{} ({}), mode {}",
            self.store.state().boot_count,
            boot_label(self.store.boot_kind()),
            self.config.mode
        ));
    }

    fn corrupt(&mut self, bit: u16, out: &mut Vec<String>) {
        let Some(frame) = self.retained.frame.as_mut() else {
            out.push("ERR nothing saved".to_owned());
            return;
        };
        let byte = usize::from(bit / 8);
        let Some(target) = frame.get_mut(byte) else {
            out.push(format!("ERR frame has only {} bits", frame.len() * 8));
            return;
        };
        *target ^= 1 << (bit % 8);
        out.push(format!("flipped bit {bit}"));
    }

    fn status(&self, out: &mut Vec<String>) {
        let state = self.store.state();
        out.push(format!(
            "uptime {} s (total {} s), boot #{} ({})",
            self.store.session_uptime(self.now).as_secs(),
            self.store.total_uptime_sec(self.now),
            state.boot_count,
            boot_label(self.store.boot_kind())
        ));
        out.push(format!(
            "mode {}, lock {}",
            self.config.mode,
            state.locks.active().map_or("none", |lock| lock.as_str())
        ));
        let active: Vec<&str> = state.alerts.iter().map(|kind| kind.as_str()).collect();
        out.push(format!(
            "alerts [{}], motion pending {}",
            active.join(", "),
            state.motion_pending
        ));
        out.push(format!(
            "audio {}, volume {}, alerts only {}, muted {}, locating {}",
            on_off(self.settings.enabled),
            self.settings.volume,
            on_off(self.settings.alerts_only),
            on_off(self.settings.muted),
            on_off(self.locate.is_active())
        ));
        out.push(format!(
            "records sent {}, saved frame {}",
            self.records.len(),
            self.retained
                .frame
                .as_ref()
                .map_or_else(|| "none".to_owned(), |frame| format!("{} bytes", frame.len()))
        ));
        if self.asleep {
            out.push("asleep".to_owned());
        }
    }

    fn play(&mut self, request: AudioRequest, out: &mut Vec<String>) {
        if !self.settings.permits_request(&request) {
            out.push(format!("audio: {} suppressed", describe(&request)));
            return;
        }
        match request {
            AudioRequest::StartLocate { duration } => self.locate.start(self.now, duration),
            AudioRequest::StopLocate => self.locate.stop(),
            AudioRequest::Event(_) | AudioRequest::Tone { .. } => {}
        }
        out.push(format!("audio: {}", describe(&request)));
    }

    fn tick_locate(&mut self, out: &mut Vec<String>) {
        if self.locate.step(self.now) == LocateStep::Finished {
            out.push(format!("[{}] locate finished", self.clock()));
        }
    }

    fn emit(&mut self, record: OutboundRecord, out: &mut Vec<String>) {
        let sync = if record.force_sync() { ", sync" } else { "" };
        out.push(format!("record: {}{sync}", record.kind().as_str()));
        self.records.push(record);
    }

    fn track_record(&self, reading: SensorReading, force_sync: bool) -> OutboundRecord {
        OutboundRecord::Track(TrackRecord {
            reading,
            mode: self.config.mode,
            force_sync,
        })
    }

    fn invalid_reading(&self) -> SensorReading {
        SensorReading::invalid(self.now.as_secs_u32())
    }

    fn clock(&self) -> String {
        let millis = self.now.as_millis();
        format!("{}.{:03}", millis / 1_000, millis % 1_000)
    }
}

#[cfg(test)]
impl Session {
    fn config(&self) -> &Configuration {
        &self.config
    }

    fn store(&self) -> &StateStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    fn settings(&self) -> AudioSettings {
        self.settings
    }

    fn records(&self) -> &[OutboundRecord] {
        &self.records
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Command side effects collected for one execution.
struct SessionContext {
    settings: AudioSettings,
    locks: LockState,
    audio: Vec<AudioRequest>,
    unlock: Option<LockTarget>,
}

impl CommandContext for SessionContext {
    fn audio_settings(&self) -> AudioSettings {
        self.settings
    }

    fn set_volume(&mut self, volume: u8) {
        self.settings.volume = volume;
    }

    fn enqueue_audio(&mut self, request: AudioRequest) -> bool {
        self.audio.push(request);
        true
    }

    fn locks(&self) -> LockState {
        self.locks
    }

    fn request_unlock(&mut self, target: LockTarget) -> bool {
        self.unlock = Some(target);
        true
    }
}

fn describe(request: &AudioRequest) -> String {
    match request {
        AudioRequest::Event(event) => event.as_str().to_owned(),
        AudioRequest::Tone {
            frequency_hz,
            duration_ms,
        } => format!("tone {frequency_hz} Hz for {duration_ms} ms"),
        AudioRequest::StartLocate { duration } => format!("locate for {} s", duration.as_secs()),
        AudioRequest::StopLocate => "stop locate".to_owned(),
    }
}

fn boot_label(kind: BootKind) -> &'static str {
    match kind {
        BootKind::Cold => "cold",
        BootKind::Warm => "warm",
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}
