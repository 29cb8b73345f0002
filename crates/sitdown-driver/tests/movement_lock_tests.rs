//! 移动锁互斥测试
//!
//! 第二个移动操作的引脚写入必须全部发生在第一个操作停止之后。

use sitdown_driver::*;
use sitdown_hw::mock::{MockRelays, PinWrite, SimulatedDesk};
use sitdown_hw::{Level, Relay};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until_moving(desk: &Desk) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !desk.is_moving() {
        assert!(Instant::now() < deadline, "desk never started moving");
        thread::yield_now();
    }
}

fn simplify(writes: &[PinWrite]) -> Vec<(Relay, Level)> {
    writes.iter().map(|w| (w.relay, w.level)).collect()
}

#[test]
fn test_timed_moves_do_not_interleave() {
    let relays = MockRelays::new();
    let desk = Arc::new(Desk::new(relays.clone(), DeskConfig::default()).unwrap());
    relays.clear_writes();

    let first = {
        let desk = desk.clone();
        thread::spawn(move || desk.raise_for(Duration::from_millis(100)))
    };
    wait_until_moving(&desk);

    desk.lower_for(Duration::from_millis(10)).unwrap();
    first.join().unwrap().unwrap();

    assert_eq!(
        simplify(&relays.writes()),
        vec![
            (Relay::Raise, Level::Active),
            (Relay::Raise, Level::Inactive),
            (Relay::Lower, Level::Inactive),
            (Relay::Lower, Level::Active),
            (Relay::Raise, Level::Inactive),
            (Relay::Lower, Level::Inactive),
        ]
    );
}

#[test]
fn test_timed_move_waits_for_convergence() {
    let sim = SimulatedDesk::new(100, Duration::from_millis(1));
    let desk = Arc::new(Desk::new(sim.relays(), DeskConfig::default()).unwrap());
    let monitor = PositionMonitor::start(desk.clone(), sim.feedback(), MonitorConfig::default())
        .unwrap();
    while desk.height().is_none() {
        thread::sleep(Duration::from_millis(1));
    }

    let converging = {
        let desk = desk.clone();
        thread::spawn(move || desk.change_to_height(42.0))
    };
    wait_until_moving(&desk);

    desk.lower_for(Duration::ZERO).unwrap();
    converging.join().unwrap().unwrap();

    let writes = simplify(&sim.writes());
    let n = writes.len();
    assert_eq!(
        writes[n - 5..],
        [
            (Relay::Raise, Level::Inactive),
            (Relay::Lower, Level::Inactive),
            (Relay::Lower, Level::Active),
            (Relay::Raise, Level::Inactive),
            (Relay::Lower, Level::Inactive),
        ]
    );
    monitor.shutdown();
}

#[test]
fn test_stop_does_not_wait_for_lock() {
    let relays = MockRelays::new();
    let desk = Arc::new(Desk::new(relays.clone(), DeskConfig::default()).unwrap());

    let mover = {
        let desk = desk.clone();
        thread::spawn(move || desk.raise_for(Duration::from_millis(200)))
    };
    wait_until_moving(&desk);

    let started = Instant::now();
    desk.stop().unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(relays.level(Relay::Raise), Level::Inactive);
    assert!(desk.is_moving());

    mover.join().unwrap().unwrap();
}
