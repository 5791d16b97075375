use embassy_time::{Duration, Ticker};

use super::{StandLink, StandSensors, StandSequencer};
use crate::clock::FirmwareInstant;
use crate::stand::{EventForwarder, TICK_PERIOD_US};

#[embassy_executor::task]
pub async fn run(
    mut sequencer: StandSequencer,
    mut link: StandLink,
    mut sensors: StandSensors,
) -> ! {
    let mut events = EventForwarder::new();
    let mut ticker = Ticker::every(Duration::from_micros(TICK_PERIOD_US));

    loop {
        sequencer.tick(FirmwareInstant::now(), &mut link, &mut sensors);
        events.forward(sequencer.events());
        ticker.next().await;
    }
}
