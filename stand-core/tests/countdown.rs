mod support;

use stand_core::sequencer::{FireLevel, SamplingProfile, SequencerState};
use stand_core::telemetry::StandEventKind;

use support::{Bench, MockInstant};

#[test]
fn new_client_receives_banner_and_stays_idle() {
    let mut bench = Bench::new();
    let client = bench.connect();

    bench.tick_at(0);

    assert_eq!(client.lines(), vec!["CONNECTED"]);
    assert_eq!(bench.sequencer.state(), SequencerState::Idle);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::Low);
    assert_eq!(bench.sequencer.events().count(StandEventKind::ClientConnected), 1);

    bench.run_until(100);
    assert!(client.packets().is_empty(), "idle stand must not stream");
}

#[test]
fn go_starts_countdown_exactly_once() {
    let mut bench = Bench::new();
    let client = bench.connect();
    bench.tick_at(0);

    client.send("GO");
    bench.tick_at(1);
    assert_eq!(bench.sequencer.state(), SequencerState::Countdown);
    assert_eq!(
        bench.sequencer.countdown_started_at(),
        Some(MockInstant::millis(1))
    );

    client.send("GO");
    bench.run_until(500);

    assert_eq!(bench.sequencer.state(), SequencerState::Countdown);
    assert_eq!(
        bench.sequencer.countdown_started_at(),
        Some(MockInstant::millis(1)),
        "GO during countdown must not restart it"
    );
    assert_eq!(client.count("COUNTDOWN_START"), 1);
}

#[test]
fn unknown_commands_are_ignored() {
    let mut bench = Bench::new();
    let client = bench.connect();
    bench.tick_at(0);

    for line in ["go", "LAUNCH", "GO GO", "ABORT!"] {
        client.send(line);
    }
    bench.run_until(10);

    assert_eq!(bench.sequencer.state(), SequencerState::Idle);
    assert_eq!(client.lines(), vec!["CONNECTED"]);
}

#[test]
fn t0_at_countdown_end_and_cutoff_after_burn() {
    let mut bench = Bench::new();
    let client = bench.connect_and_go(0);

    bench.run_until(39_999);
    assert_eq!(bench.sequencer.state(), SequencerState::Countdown);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::Low);
    assert_eq!(client.count("T0_REACHED"), 0);

    bench.tick_at(40_000);
    assert_eq!(bench.sequencer.state(), SequencerState::Running);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::High);
    assert_eq!(bench.sequencer.ignition_at(), Some(MockInstant::millis(40_000)));
    assert_eq!(client.count("T0_REACHED"), 1);

    bench.run_until(43_999);
    assert_eq!(bench.fire().level, FireLevel::High);

    bench.tick_at(44_000);
    assert_eq!(bench.sequencer.state(), SequencerState::Running);
    assert_eq!(bench.sequencer.fire_level(), FireLevel::Low);
    assert_eq!(bench.fire().level, FireLevel::Low);

    bench.run_until(50_000);
    assert_eq!(bench.sequencer.state(), SequencerState::Running);
    assert_eq!(bench.fire().rising_edges, 1);
    assert_eq!(client.count("T0_REACHED"), 1);
    assert_eq!(bench.sequencer.events().count(StandEventKind::BurnCutoff), 1);
}

#[test]
fn go_after_ignition_is_a_no_op() {
    let mut bench = Bench::new();
    let client = bench.connect_and_go(0);
    bench.run_until(41_000);

    client.send("GO");
    bench.run_until(41_010);
    bench.run_until(60_000);
    client.send("GO");
    bench.run_until(60_010);

    assert_eq!(bench.sequencer.state(), SequencerState::Running);
    assert_eq!(client.count("COUNTDOWN_START"), 1);
    assert_eq!(bench.fire().rising_edges, 1);
}

#[test]
fn full_run_streams_from_countdown_through_burn() {
    let mut bench = Bench::new();
    let client = bench.connect_and_go(0);
    bench.run_until(46_000);

    let lines = client.lines();
    assert_eq!(lines[0], "CONNECTED");
    assert_eq!(lines[1], "COUNTDOWN_START");
    assert!(
        lines[2].starts_with("-40.000,"),
        "first packet should be at T-40: {}",
        lines[2]
    );

    let t0_line = lines
        .iter()
        .position(|line| line == "T0_REACHED")
        .expect("T0_REACHED missing");

    let times: Vec<f32> = client
        .packets()
        .iter()
        .map(|packet| packet.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));

    let last_countdown = lines[t0_line - 1].split(',').next().unwrap();
    assert!(last_countdown.starts_with('-'), "{last_countdown}");
    let first_running = lines[t0_line + 1].split(',').next().unwrap();
    assert!(!first_running.starts_with('-'), "{first_running}");

    let last = *times.last().unwrap();
    assert!(last > 5.9, "streaming must continue after cutoff: {last}");
    assert!(times.len() > 3_000, "80 Hz profile streamed {} packets", times.len());
    assert_eq!(bench.sequencer.fire_level(), FireLevel::Low);

    let sample_fields: Vec<&str> = lines[2].split(',').collect();
    assert_eq!(sample_fields.len(), 8);
    assert_eq!(&sample_fields[2..], ["20.00", "21.00", "22.00", "23.00", "24.00", "25.00"]);
}

#[test]
fn samples_respect_high_rate_cadence() {
    let mut bench = Bench::new();
    bench.connect_and_go(0);
    let samples = bench.run_until(1_000);

    // 12.5 ms spacing with 1 ms ticks lands every 13 ms.
    assert_eq!(samples.len(), 1_000 / 13);
    for pair in samples.windows(2) {
        let gap = pair[1].relative_time_s() - pair[0].relative_time_s();
        assert!((gap - 0.013).abs() < 1e-4, "gap {gap}");
    }
}

#[test]
fn samples_respect_low_rate_cadence() {
    let mut bench = Bench::with_sampling(SamplingProfile::LowRate);
    // Each conversion needs 50 polls, well inside the bounded wait.
    bench.sensors.load_cell_mut().ready_every = 50;
    bench.connect_and_go(0);
    let samples = bench.run_until(2_000);

    // First sample on the GO tick, then every 250 ms.
    assert_eq!(samples.len(), 8);
    assert_eq!(samples[0].relative_time_s(), -39.75);
    for pair in samples.windows(2) {
        let gap = pair[1].relative_time_s() - pair[0].relative_time_s();
        assert!((gap - 0.25).abs() < 1e-4, "gap {gap}");
    }

    // The bounded wait caught a fresh conversion for every sample.
    let loads: Vec<i32> = samples.iter().map(|sample| sample.load_raw()).collect();
    assert_eq!(loads, (2..=9).collect::<Vec<i32>>());
    assert_eq!(bench.sensors.load_cell().polls, 9 * 50);
}
