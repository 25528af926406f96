//! Subcommands: scanning, patient listing, rail calibration, and self-check.

use crate::display::{TerminalSink, frame_json, status_line};
use crate::rig::{Button, Reader, Rig, SimControls, Tracker, open_devices};
use crossbeam_channel::{self as xch, Receiver, RecvTimeoutError};
use scanrep_config::Config;
use scanrep_core::error::ScanError;
use scanrep_core::{
    CsvPatientStore, DebounceCfg, ForceCfg, Outcome, Patient, PatientDescriptor, PatientStore,
    ScanController, ScanSession, SessionCfg, SessionStatus, calibration_factor,
};
use scanrep_traits::MonotonicClock;
use serde_json::json;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How often the command loop checks for Ctrl-C and scan completion.
const LOOP_POLL: Duration = Duration::from_millis(20);
const SELF_CHECK_WAIT: Duration = Duration::from_secs(2);

const HELP: &str = "commands: press | undo | stop | status | rail <ticks> | force <value> | help";

/// One line typed during a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Press,
    Undo,
    Stop,
    Status,
    /// Move the simulated carriage by this many encoder ticks.
    Rail(i64),
    /// Set the simulated load-cell reading.
    Force(f64),
    Help,
}

/// `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments: {line:?}"));
    }
    let cmd = match (word.to_ascii_lowercase().as_str(), arg) {
        ("press" | "p", None) => Command::Press,
        ("undo" | "u", None) => Command::Undo,
        ("stop" | "q", None) => Command::Stop,
        ("status" | "s", None) => Command::Status,
        ("help" | "?", None) => Command::Help,
        ("rail", Some(v)) => Command::Rail(
            v.parse()
                .map_err(|_| format!("rail expects whole ticks, got {v:?}"))?,
        ),
        ("force", Some(v)) => {
            let f: f64 = v
                .parse()
                .map_err(|_| format!("force expects a number, got {v:?}"))?;
            if !f.is_finite() {
                return Err(format!("force must be finite, got {v:?}"));
            }
            Command::Force(f)
        }
        _ => return Err(format!("unknown command {line:?}; {HELP}")),
    };
    Ok(Some(cmd))
}

fn open_store(cfg: &Config) -> scanrep_core::Result<CsvPatientStore> {
    CsvPatientStore::open(&cfg.storage.patients_file, &cfg.storage.data_dir)
}

/// Everything a running scan needs.
struct ScanParts {
    // Field order matters: the controller stops its tick before the drivers close.
    controller: Arc<ScanController>,
    sink: Arc<TerminalSink>,
    rig: Rig,
}

impl ScanParts {
    fn open(cfg: &Config, json: bool) -> eyre::Result<Self> {
        let rig = Rig::start(open_devices(cfg)?, cfg)?;
        let store = open_store(cfg)?;
        let session_cfg = SessionCfg::from(&cfg.display);
        let sink = Arc::new(TerminalSink::new(&session_cfg, json));
        let session = ScanSession::new(
            rig.tracker.clone(),
            rig.reader.clone(),
            Box::new(store),
            sink.clone(),
            &session_cfg,
        );
        let controller = ScanController::new(session);
        controller.attach_button(&rig.button);
        Ok(Self {
            controller,
            sink,
            rig,
        })
    }

    fn close(&self) {
        self.controller.shutdown();
        self.rig.close();
    }
}

fn spawn_stdin_reader() -> scanrep_core::Result<Receiver<String>> {
    let (tx, rx) = xch::unbounded();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|e| ScanError::Io(format!("spawn stdin reader: {e}")))?;
    Ok(rx)
}

/// What the stdin reader produced within one loop period.
#[derive(Debug, PartialEq)]
enum Input {
    Line(String),
    Quiet,
    Closed,
}

fn poll_input(lines: &Receiver<String>, wait: Duration) -> Input {
    match lines.recv_timeout(wait) {
        Ok(line) => Input::Line(line),
        Err(RecvTimeoutError::Timeout) => Input::Quiet,
        Err(RecvTimeoutError::Disconnected) => Input::Closed,
    }
}

fn sim_only<'a>(sim: Option<&'a SimControls>, what: &str) -> Option<&'a SimControls> {
    if sim.is_none() {
        eprintln!("{what} is only available with simulated devices");
    }
    sim
}

fn execute(parts: &ScanParts, cmd: &Command, json: bool) -> bool {
    let sim = parts.rig.sim.as_ref();
    match cmd {
        Command::Press => match sim {
            Some(sim) => sim.click(),
            None => parts.controller.on_press(),
        },
        Command::Undo => {
            if let Err(e) = parts.controller.undo() {
                eprintln!("{e}");
            }
        }
        Command::Stop => {
            parts.controller.stop();
            return false;
        }
        Command::Status => {
            let snap = parts.controller.snapshot();
            if json {
                println!("{}", crate::display::status_json(&snap));
                for frame in parts.sink.latest_frames() {
                    println!("{}", frame_json(&frame));
                }
            } else {
                println!("{}", status_line(&snap));
                for frame in parts.sink.latest_frames() {
                    println!("{}", parts.sink.frame_line(&frame));
                }
            }
        }
        Command::Rail(ticks) => {
            if let Some(sim) = sim_only(sim, "rail")
                && let Err(e) = sim.move_rail(*ticks, &parts.rig.tracker)
            {
                eprintln!("{e}");
            }
        }
        Command::Force(value) => {
            if let Some(sim) = sim_only(sim, "force") {
                sim.set_force(*value);
            }
        }
        Command::Help => println!("{HELP}"),
    }
    true
}

/// Feed stdin commands to the controller until the scan completes, the
/// operator stops it, input closes, or Ctrl-C is pressed.
fn drive(
    parts: &ScanParts,
    lines: &Receiver<String>,
    shutdown: &AtomicBool,
    json: bool,
) -> Outcome {
    loop {
        if shutdown.load(Ordering::Acquire) {
            tracing::info!("interrupted; stopping scan");
            return parts.controller.stop().unwrap_or(Outcome::Stopped);
        }
        let snap = parts.controller.snapshot();
        if snap.status == SessionStatus::Idle {
            return snap.last_outcome.unwrap_or(Outcome::Stopped);
        }
        match poll_input(lines, LOOP_POLL) {
            Input::Line(line) => match parse_command(&line) {
                Ok(Some(cmd)) => {
                    tracing::debug!(?cmd, "command");
                    if !execute(parts, &cmd, json) {
                        return Outcome::Stopped;
                    }
                }
                Ok(None) => {}
                Err(msg) => eprintln!("{msg}"),
            },
            Input::Quiet => {}
            Input::Closed => {
                tracing::info!("input closed; stopping scan");
                return parts.controller.stop().unwrap_or(Outcome::Stopped);
            }
        }
    }
}

fn announce_patient(event: &str, patient: &Patient, data_file: &Path, json: bool) {
    let d = &patient.descriptor;
    if json {
        println!(
            "{}",
            json!({
                "event": event,
                "label": patient.label(),
                "leg": d.leg,
                "scanner": d.scanner,
                "foot": d.foot,
                "angle": d.angle,
                "file": data_file.display().to_string(),
            })
        );
    } else {
        println!(
            "{event} {}: leg {}, scanner {}, foot {}, angle {} ({})",
            patient.label(),
            d.leg,
            d.scanner,
            d.foot,
            d.angle,
            data_file.display()
        );
    }
}

fn finish(parts: &ScanParts, outcome: Outcome, json: bool) {
    let snap = parts.controller.snapshot();
    tracing::info!(
        outcome = outcome.as_str(),
        steps = snap.step_count,
        "scan finished"
    );
    if json {
        println!(
            "{}",
            json!({
                "event": "finished",
                "outcome": outcome.as_str(),
                "step_count": snap.step_count,
                "patient": snap.patient,
            })
        );
    }
    parts.close();
}

pub fn first_scan(
    cfg: &Config,
    json: bool,
    descriptor: &PatientDescriptor,
    interval: f64,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let parts = ScanParts::open(cfg, json)?;
    let patient = parts.controller.start_first_scan(descriptor, interval)?;
    announce_patient(
        "recording",
        &patient,
        &patient.data_file(Path::new(&cfg.storage.data_dir)),
        json,
    );
    if !json {
        println!("Press the button at each image. {HELP}");
    }
    let lines = spawn_stdin_reader()?;
    let outcome = drive(&parts, &lines, shutdown, json);
    finish(&parts, outcome, json);
    Ok(())
}

pub fn repeat_scan(
    cfg: &Config,
    json: bool,
    label: &str,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let parts = ScanParts::open(cfg, json)?;
    let patient = parts.controller.start_repeat_scan_by_label(label)?;
    announce_patient(
        "repeating",
        &patient,
        &patient.data_file(Path::new(&cfg.storage.data_dir)),
        json,
    );
    let lines = spawn_stdin_reader()?;
    let outcome = drive(&parts, &lines, shutdown, json);
    finish(&parts, outcome, json);
    Ok(())
}

pub fn patients(cfg: &Config, json: bool) -> eyre::Result<()> {
    let store = open_store(cfg)?;
    let list = store.list_all()?;
    if list.is_empty() && !json {
        println!("No patients recorded");
    }
    for patient in &list {
        let samples = store.read_all_samples(patient)?.len();
        let d = &patient.descriptor;
        if json {
            println!(
                "{}",
                json!({
                    "label": patient.label(),
                    "study": d.study,
                    "id": d.id,
                    "leg": d.leg,
                    "scanner": d.scanner,
                    "foot": d.foot,
                    "angle": d.angle,
                    "iteration": patient.iteration_text(),
                    "samples": samples,
                })
            );
        } else {
            println!(
                "{:<24} leg {}, scanner {}, foot {}, angle {} ({samples} samples)",
                patient.label(),
                d.leg,
                d.scanner,
                d.foot,
                d.angle
            );
        }
    }
    Ok(())
}

/// Block until a blank line. `rail <ticks>` moves the simulated carriage
/// meanwhile.
fn wait_for_enter(
    input: &mut dyn BufRead,
    sim: Option<&SimControls>,
    tracker: &Tracker,
) -> eyre::Result<()> {
    loop {
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(ScanError::InvalidOperation(
                "input closed before calibration finished".into(),
            )
            .into());
        }
        match parse_command(&line) {
            Ok(None) => return Ok(()),
            Ok(Some(Command::Rail(ticks))) => {
                if let Some(sim) = sim_only(sim, "rail") {
                    sim.move_rail(ticks, tracker)?;
                }
            }
            Ok(Some(_)) => eprintln!("press Enter to continue"),
            Err(msg) => eprintln!("{msg}"),
        }
    }
}

/// Operator prompts stay off stdout in JSON mode.
fn prompt(json: bool, text: &str) {
    if json {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
}

/// Interactive rail calibration: home at one end, travel to the other, and
/// divide the measured distance by the ticks counted.
pub fn calibrate(cfg: &Config, json: bool, input: &mut dyn BufRead) -> eyre::Result<()> {
    let devices = open_devices(cfg)?;
    let sim = devices.sim;
    let tracker = Tracker::new(devices.encoder, cfg.encoder.calibration)?;

    prompt(json, "Move the carriage to one end of the rail, then press Enter.");
    wait_for_enter(input, sim.as_ref(), &tracker)?;
    tracker.refresh()?;
    tracker.set_home();

    prompt(json, "Move the carriage to the other end of the rail, then press Enter.");
    wait_for_enter(input, sim.as_ref(), &tracker)?;
    tracker.refresh()?;
    let raw_end = tracker.raw_position();

    prompt(
        json,
        &format!("Encoder counted {raw_end} ticks. Enter the distance travelled:"),
    );
    let mut line = String::new();
    input.read_line(&mut line)?;
    let distance: f64 = line.trim().parse().map_err(|_| {
        ScanError::InvalidOperation(format!("distance must be a number, got {:?}", line.trim()))
    })?;
    let factor = calibration_factor(distance, raw_end)?;
    tracker.close();

    tracing::info!(distance, raw_end, factor, "rail calibrated");
    if json {
        println!(
            "{}",
            json!({ "event": "calibration", "ticks": raw_end, "distance": distance, "calibration": factor })
        );
    } else {
        println!("Calibration factor: {factor}");
        println!("Set [encoder] calibration = {factor} (config CSV: encoder_calibration,{})", -factor);
    }
    Ok(())
}

pub fn self_check(cfg: &Config, json: bool) -> eyre::Result<()> {
    let devices = open_devices(cfg)?;
    let simulated = devices.sim.is_some();

    let tracker = Tracker::new(devices.encoder, cfg.encoder.calibration)?;
    let degrees = tracker.read_degrees()?;
    tracker.close();

    let reader = Reader::new(devices.link);
    reader.start(ForceCfg::from(&cfg.load_cell).poll_period)?;
    let deadline = Instant::now() + SELF_CHECK_WAIT;
    while reader.updates() == 0 && Instant::now() < deadline {
        std::thread::sleep(LOOP_POLL);
    }
    if reader.updates() == 0 {
        reader.close();
        return Err(ScanError::Transport(format!(
            "no record from load cell within {} ms",
            SELF_CHECK_WAIT.as_millis()
        ))
        .into());
    }
    let unit = reader.read_unit()?;
    let force = reader.get_force();
    reader.close();

    let button = Button::new(
        devices.button,
        DebounceCfg::from(&cfg.button).interval,
        MonotonicClock::new(),
    );
    let released = button.level();
    button.close();

    if json {
        println!(
            "{}",
            json!({
                "event": "self_check",
                "ok": true,
                "simulated": simulated,
                "encoder_degrees": degrees,
                "force": force,
                "unit": unit,
                "button_released": released,
            })
        );
    } else {
        println!("encoder: {degrees:.1} deg");
        println!("load cell: {force:.3} {unit}");
        println!("button: {}", if released { "released" } else { "pressed" });
        println!("OK{}", if simulated { " (simulated)" } else { "" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("press", Command::Press)]
    #[case("  P ", Command::Press)]
    #[case("undo", Command::Undo)]
    #[case("stop", Command::Stop)]
    #[case("status", Command::Status)]
    #[case("rail -1500", Command::Rail(-1500))]
    #[case("force 1.25", Command::Force(1.25))]
    #[case("help", Command::Help)]
    fn commands_parse(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(parse_command(line), Ok(Some(expected)));
    }

    #[rstest]
    #[case("jump")]
    #[case("rail")]
    #[case("rail 1.5")]
    #[case("force nan")]
    #[case("undo now")]
    #[case("force 1 2")]
    fn bad_commands_are_rejected(#[case] line: &str) {
        assert!(parse_command(line).is_err());
    }

    #[test]
    fn input_reports_lines_then_closure() {
        let (tx, rx) = xch::unbounded();
        tx.send("press".to_string()).unwrap();
        assert_eq!(
            poll_input(&rx, Duration::from_millis(5)),
            Input::Line("press".into())
        );
        assert_eq!(poll_input(&rx, Duration::from_millis(5)), Input::Quiet);
        drop(tx);
        assert_eq!(poll_input(&rx, Duration::from_millis(5)), Input::Closed);
    }

    #[test]
    fn sim_commands_need_simulated_devices() {
        assert!(sim_only(None, "rail").is_none());
        let devices = crate::rig::simulated(&Config::default());
        let sim = devices.sim.as_ref();
        assert!(std::ptr::eq(sim_only(sim, "rail").unwrap(), sim.unwrap()));
    }

    #[test]
    fn blank_line_is_no_command() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(parse_command(""), Ok(None));
    }
}
