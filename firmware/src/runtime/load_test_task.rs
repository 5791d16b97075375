use embassy_time::{Duration, Ticker};

use super::StandLink;
use crate::clock::FirmwareInstant;
use crate::hw::{FirePin, Hx711, Max6675Bank};
use crate::load_test::LoadTest;
use crate::stand::TICK_PERIOD_US;

/// Owns the fire pin and thermocouple bus only to hold them idle.
#[embassy_executor::task]
pub async fn run(
    mut test: LoadTest<Hx711<'static>, FirmwareInstant>,
    mut link: StandLink,
    _fire: FirePin<'static>,
    _thermocouples: Max6675Bank<'static>,
) -> ! {
    let mut ticker = Ticker::every(Duration::from_micros(TICK_PERIOD_US));

    loop {
        test.poll(FirmwareInstant::now(), &mut link);
        ticker.next().await;
    }
}
