use scanrep_core::error::ScanError;
use scanrep_core::force::ForceReader;
use scanrep_core::mocks::ScriptedLink;
use scanrep_hardware::SimulatedLoadCell;
use scanrep_traits::{BoxError, SerialLink};
use std::time::{Duration, Instant};

fn wait_for(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn read_record_skips_banner_and_empty_lines() {
    let link = ScriptedLink::new([
        "",
        "SparkFun OpenScale",
        "Readings:",
        "1200,0.731,kgs,",
    ]);
    let reader = ForceReader::new(link.clone());
    let rec = reader.read_record().unwrap();
    assert_eq!(rec.timestamp, "1200");
    assert!((rec.value - 0.731).abs() < 1e-12);
    assert_eq!(rec.unit, "kgs");
    // pending input is dropped once per record
    assert_eq!(link.discards(), 1);
}

#[test]
fn read_unit_returns_third_field() {
    let reader = ForceReader::new(ScriptedLink::new(["5,1.0,lbs,"]));
    assert_eq!(reader.read_unit().unwrap(), "lbs");
}

#[test]
fn bad_value_is_parse_error_and_keeps_buffer() {
    let link = ScriptedLink::new(["1,2.50,kgs,", "2,oops,kgs,", "3,3.25,kgs,"]);
    let reader = ForceReader::new(link);
    assert_eq!(reader.refresh().unwrap(), 2.5);
    assert!(matches!(reader.refresh(), Err(ScanError::Parse(_))));
    assert_eq!(reader.get_force(), 2.5);
    assert_eq!(reader.refresh().unwrap(), 3.25);
    assert_eq!(reader.updates(), 2);
}

#[test]
fn background_tick_buffers_newest_value() {
    let link = ScriptedLink::new(["1,0.10,kgs,", "x,y", "2,0.20,kgs,"]);
    let reader = ForceReader::new(link.clone());
    reader.start(Duration::from_millis(3)).unwrap();
    assert!(wait_for(Duration::from_secs(2), || reader.updates() >= 2));
    assert_eq!(reader.get_force(), 0.2);

    link.push("3,bad,kgs,");
    link.push("4,0.40,kgs,");
    assert!(wait_for(Duration::from_secs(2), || reader.updates() >= 3));
    assert_eq!(reader.get_force(), 0.4);
    reader.close();
}

#[test]
fn close_unblocks_a_waiting_read_and_freezes_value() {
    // after one record the link only times out; the tick keeps retrying until closed
    let link = ScriptedLink::new(["9,1.5,kgs,"]);
    let reader = ForceReader::new(link);
    reader.start(Duration::from_millis(2)).unwrap();
    assert!(wait_for(Duration::from_secs(2), || reader.updates() == 1));

    let t0 = Instant::now();
    reader.close();
    assert!(t0.elapsed() < Duration::from_secs(1));
    reader.close();
    assert_eq!(reader.get_force(), 1.5);
    assert!(matches!(reader.read_record(), Err(ScanError::Transport(_))));
}

struct DeadLink;

impl SerialLink for DeadLink {
    fn read_line(&mut self) -> Result<String, BoxError> {
        Err("serial port unplugged".into())
    }
}

#[test]
fn transport_failure_is_reported_directly_and_survived_in_tick() {
    let reader = ForceReader::new(DeadLink);
    assert!(matches!(reader.read_record(), Err(ScanError::Transport(_))));
    reader.start(Duration::from_millis(2)).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(reader.get_force(), 0.0);
    assert_eq!(reader.updates(), 0);
}

#[test]
fn simulated_load_cell_feeds_reader() {
    let (cell, handle) = SimulatedLoadCell::new(Duration::from_millis(1));
    handle.set_force(0.875);
    let reader = ForceReader::new(cell);
    reader.start(Duration::from_millis(5)).unwrap();
    assert!(wait_for(Duration::from_secs(2), || {
        (reader.get_force() - 0.875).abs() < 1e-9
    }));
    handle.set_force(-0.25);
    assert!(wait_for(Duration::from_secs(2), || {
        (reader.get_force() + 0.25).abs() < 1e-9
    }));
}
