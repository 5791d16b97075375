mod support;

use stand_core::sequencer::{FireLevel, SequencerState};
use stand_core::telemetry::{AbortReason, StandEventKind};

use support::Bench;

#[test]
fn operator_abort_during_countdown() {
    let mut bench = Bench::new();
    let client = bench.connect_and_go(0);
    bench.run_until(5_000);

    client.send("ABORT");
    bench.tick_at(5_001);

    assert_eq!(bench.sequencer.state(), SequencerState::Aborted);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::Low);
    assert_eq!(client.count("ABORTED"), 1);
    assert_eq!(
        bench
            .sequencer
            .events()
            .count(StandEventKind::Aborted(AbortReason::Operator)),
        1
    );

    let streamed = client.lines().len();
    bench.run_until(60_000);

    assert_eq!(bench.sequencer.state(), SequencerState::Aborted);
    assert_eq!(client.count("T0_REACHED"), 0);
    assert_eq!(bench.fire().rising_edges, 0);
    assert_eq!(client.lines().len(), streamed, "aborted stand must stop streaming");
}

#[test]
fn abort_is_terminal_until_reconnect() {
    let mut bench = Bench::new();
    let client = bench.connect_and_go(0);
    client.send("ABORT");
    bench.tick_at(1);

    client.send("GO");
    bench.run_until(50_000);
    assert_eq!(bench.sequencer.state(), SequencerState::Aborted);
    assert_eq!(client.count("COUNTDOWN_START"), 1);

    client.hang_up();
    let next = bench.connect();
    next.send("GO");
    bench.run_until(50_010);

    assert_eq!(next.lines()[..2], ["CONNECTED", "COUNTDOWN_START"]);
    assert_eq!(bench.sequencer.state(), SequencerState::Countdown);

    bench.run_until(90_010);
    assert_eq!(bench.sequencer.state(), SequencerState::Running);
    assert_eq!(bench.fire().rising_edges, 1);
}

#[test]
fn abort_outside_countdown_is_ignored() {
    let mut bench = Bench::new();
    let client = bench.connect();
    client.send("ABORT");
    bench.run_until(10);

    assert_eq!(bench.sequencer.state(), SequencerState::Idle);
    assert_eq!(client.count("ABORTED"), 0);

    client.send("GO");
    bench.run_until(41_000);
    client.send("ABORT");
    bench.run_until(41_010);

    assert_eq!(bench.sequencer.state(), SequencerState::Running);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::High);
    assert_eq!(client.count("ABORTED"), 0);
}

#[test]
fn link_loss_aborts_countdown_within_one_tick() {
    let mut bench = Bench::new();
    let client = bench.connect_and_go(0);
    bench.run_until(10_000);

    client.hang_up();
    bench.tick_at(10_001);

    assert_eq!(bench.sequencer.state(), SequencerState::Aborted);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::Low);
    assert!(!bench.sequencer.link_attached());
    let events = bench.sequencer.events();
    assert_eq!(events.count(StandEventKind::LinkLost), 1);
    assert_eq!(
        events.count(StandEventKind::Aborted(AbortReason::LinkLost)),
        1
    );

    bench.run_until(60_000);
    assert_eq!(bench.fire().rising_edges, 0);
    assert_eq!(bench.sequencer.events().count(StandEventKind::LinkLost), 1);
}

#[test]
fn failed_packet_send_aborts_in_same_tick() {
    let mut bench = Bench::new();
    let client = bench.connect_and_go(0);
    bench.run_until(1_000);

    client.drop_on_next_write();
    // Next sample is due at 1_001 ms (77 * 13).
    bench.tick_at(1_001);

    assert_eq!(bench.sequencer.state(), SequencerState::Aborted);
    assert_eq!(client.count("ABORTED"), 0, "link was already gone");
}

#[test]
fn abort_racing_t0_loses() {
    let mut bench = Bench::new();
    let client = bench.connect_and_go(0);
    bench.run_until(39_999);

    client.send("ABORT");
    bench.tick_at(40_000);

    assert_eq!(bench.sequencer.state(), SequencerState::Running);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::High);
    assert_eq!(client.count("ABORTED"), 0);
    assert_eq!(client.count("T0_REACHED"), 1);
}

#[test]
fn link_loss_after_t0_does_not_cut_burn_short() {
    let mut bench = Bench::new();
    let client = bench.connect_and_go(0);
    bench.run_until(39_999);

    client.hang_up();
    bench.tick_at(40_000);
    assert_eq!(bench.sequencer.state(), SequencerState::Running);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::High);

    bench.run_until(43_999);
    assert_eq!(bench.fire().level, FireLevel::High);
    bench.tick_at(44_000);
    assert_eq!(bench.fire().level, FireLevel::Low);
    assert_eq!(bench.sequencer.events().count(StandEventKind::LinkLost), 1);
}

#[test]
fn reconnect_waits_for_burn_cutoff() {
    let mut bench = Bench::new();
    let first = bench.connect_and_go(0);
    bench.run_until(41_000);

    first.hang_up();
    let second = bench.connect();
    bench.run_until(43_999);

    assert!(second.lines().is_empty(), "accept must wait for the cutoff");
    assert_eq!(bench.sequencer.fire_level(), FireLevel::High);

    bench.tick_at(44_000);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::Low);

    bench.tick_at(44_001);
    assert_eq!(second.lines(), vec!["CONNECTED"]);
    assert_eq!(bench.sequencer.state(), SequencerState::Idle);
    assert_eq!(bench.link.sessions_accepted(), 2);
}
