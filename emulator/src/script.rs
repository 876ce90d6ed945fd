//! Console grammar.
//!
//! One line is one directive. Keywords are matched case-insensitively;
//! numbers are plain decimal.

use std::time::Duration;

use tracker_core::commands::Command;
use tracker_core::mode::LockTarget;
use winnow::ascii::{dec_uint, float, space1};
use winnow::combinator::{alt, cut_err, dispatch, empty, fail, opt, preceded, repeat};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{rest, take_till};

/// A parsed console line.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    Press,
    Release,
    Click(u8),
    Wait(Duration),
    Reading(ReadingUpdate),
    Remote(Command),
    Set { key: String, value: String },
    Sleep,
    Wake,
    Corrupt(u16),
    Status,
    Help,
    Quit,
}

/// Sensor values to change before the next sampling cycle. Omitted fields
/// keep their previous value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadingUpdate {
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub pressure_hpa: Option<f32>,
    pub voltage_v: Option<f32>,
    pub motion: bool,
}

#[derive(Copy, Clone)]
enum ReadingField {
    Temperature(f32),
    Humidity(f32),
    Pressure(f32),
    Voltage(f32),
    Motion,
}

pub const HELP: &[&str] = &[
    "press | release                 - drive the button level",
    "click [n]                       - click n times (default 1) and let the burst resolve",
    "wait <ms>                       - advance the simulated clock",
    "reading [temp=] [hum=] [pres=] [volt=] [motion] - run one sensor cycle",
    "cmd ping | locate [s] | melody <name> | tone <hz> <ms> | volume <n> | unlock <transit|demo|all>",
    "set <key> <value>               - publish one remote configuration value",
    "sleep | wake                    - enter deep sleep / wake from the saved frame",
    "corrupt <bit>                   - flip one bit of the saved frame",
    "status | help | quit",
];

/// Parses one console line.
///
/// # Errors
///
/// Returns a printable description of the first syntax error.
pub fn parse_line(line: &str) -> Result<Directive, String> {
    let line = line.trim().to_ascii_lowercase();
    directive
        .parse(line.as_str())
        .map_err(|error| error.to_string())
}

fn directive(input: &mut &str) -> ModalResult<Directive> {
    dispatch! {word;
        "press" => empty.value(Directive::Press),
        "release" => empty.value(Directive::Release),
        "click" => opt(preceded(space1, cut_err(dec_uint)))
            .map(|count: Option<u8>| Directive::Click(count.unwrap_or(1))),
        "wait" => preceded(space1, cut_err(dec_uint).context(expected("milliseconds")))
            .map(|ms: u64| Directive::Wait(Duration::from_millis(ms))),
        "reading" => reading_update.map(Directive::Reading),
        "cmd" => preceded(space1, cut_err(remote_command)).map(Directive::Remote),
        "set" => (preceded(space1, word), preceded(space1, rest))
            .map(|(key, value): (&str, &str)| Directive::Set {
                key: key.to_owned(),
                value: value.trim().to_owned(),
            }),
        "sleep" => empty.value(Directive::Sleep),
        "wake" => empty.value(Directive::Wake),
        "corrupt" => preceded(space1, cut_err(dec_uint).context(expected("bit index")))
            .map(Directive::Corrupt),
        "status" => empty.value(Directive::Status),
        "help" => empty.value(Directive::Help),
        "quit" | "exit" => empty.value(Directive::Quit),
        _ => fail.context(StrContext::Label("command")),
    }
    .parse_next(input)
}

fn remote_command(input: &mut &str) -> ModalResult<Command> {
    dispatch! {word;
        "ping" => empty.value(Command::Ping),
        "locate" => opt(preceded(space1, dec_uint))
            .map(|duration_sec| Command::Locate { duration_sec }),
        "melody" => preceded(space1, word.verify_map(|name: &str| heapless::String::try_from(name).ok()))
            .map(|melody| Command::PlayMelody { melody }),
        "tone" => (preceded(space1, dec_uint), preceded(space1, dec_uint))
            .map(|(frequency_hz, duration_ms)| Command::TestTone { frequency_hz, duration_ms }),
        "volume" => preceded(space1, dec_uint).map(|volume| Command::SetVolume { volume }),
        "unlock" => preceded(space1, lock_target).map(|target| Command::Unlock { target }),
        _ => fail.context(StrContext::Label("remote command")),
    }
    .parse_next(input)
}

fn lock_target(input: &mut &str) -> ModalResult<LockTarget> {
    alt((
        "transit".value(LockTarget::Transit),
        "demo".value(LockTarget::Demo),
        "all".value(LockTarget::All),
    ))
    .context(expected("transit, demo or all"))
    .parse_next(input)
}

fn reading_update(input: &mut &str) -> ModalResult<ReadingUpdate> {
    let fields: Vec<ReadingField> = repeat(0.., preceded(space1, reading_field)).parse_next(input)?;
    let mut update = ReadingUpdate::default();
    for field in fields {
        match field {
            ReadingField::Temperature(value) => update.temperature_c = Some(value),
            ReadingField::Humidity(value) => update.humidity_pct = Some(value),
            ReadingField::Pressure(value) => update.pressure_hpa = Some(value),
            ReadingField::Voltage(value) => update.voltage_v = Some(value),
            ReadingField::Motion => update.motion = true,
        }
    }
    Ok(update)
}

fn reading_field(input: &mut &str) -> ModalResult<ReadingField> {
    alt((
        preceded("temp=", number).map(ReadingField::Temperature),
        preceded("hum=", number).map(ReadingField::Humidity),
        preceded("pres=", number).map(ReadingField::Pressure),
        preceded("volt=", number).map(ReadingField::Voltage),
        "motion".value(ReadingField::Motion),
    ))
    .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<f32> {
    float.parse_next(input)
}

fn word<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_till(1.., |c: char| c.is_ascii_whitespace()).parse_next(input)
}

fn expected(what: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_button_directives() {
        assert_eq!(parse_line("press"), Ok(Directive::Press));
        assert_eq!(parse_line("  RELEASE "), Ok(Directive::Release));
        assert_eq!(parse_line("click"), Ok(Directive::Click(1)));
        assert_eq!(parse_line("click 3"), Ok(Directive::Click(3)));
        assert_eq!(
            parse_line("wait 1500"),
            Ok(Directive::Wait(Duration::from_millis(1_500)))
        );
    }

    #[test]
    fn parses_reading_fields_in_any_order() {
        let parsed = parse_line("reading motion hum=81.5 temp=36");
        assert_eq!(
            parsed,
            Ok(Directive::Reading(ReadingUpdate {
                temperature_c: Some(36.0),
                humidity_pct: Some(81.5),
                motion: true,
                ..ReadingUpdate::default()
            }))
        );
        assert_eq!(
            parse_line("reading"),
            Ok(Directive::Reading(ReadingUpdate::default()))
        );
    }

    #[test]
    fn parses_remote_commands() {
        assert_eq!(parse_line("cmd ping"), Ok(Directive::Remote(Command::Ping)));
        assert_eq!(
            parse_line("cmd locate 45"),
            Ok(Directive::Remote(Command::Locate {
                duration_sec: Some(45)
            }))
        );
        assert_eq!(
            parse_line("cmd tone 440 250"),
            Ok(Directive::Remote(Command::TestTone {
                frequency_hz: 440,
                duration_ms: 250
            }))
        );
        assert_eq!(
            parse_line("cmd unlock all"),
            Ok(Directive::Remote(Command::Unlock {
                target: LockTarget::All
            }))
        );
        match parse_line("cmd melody gps_lock") {
            Ok(Directive::Remote(Command::PlayMelody { melody })) => {
                assert_eq!(melody.as_str(), "gps_lock");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn set_keeps_the_raw_value() {
        assert_eq!(
            parse_line("set mode transit"),
            Ok(Directive::Set {
                key: "mode".to_owned(),
                value: "transit".to_owned()
            })
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_line("jump").is_err());
        assert!(parse_line("wait").is_err());
        assert!(parse_line("wait soon").is_err());
        assert!(parse_line("cmd unlock everything").is_err());
        assert!(parse_line("cmd volume 70000").is_err(), "out of u16 range");
        assert!(parse_line("reading temp=hot").is_err());
        assert!(parse_line("status now").is_err());
        assert!(
            parse_line("cmd melody a_name_far_too_long_for_the_buffer").is_err(),
            "melody names are bounded"
        );
    }
}
