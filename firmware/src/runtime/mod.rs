use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_sync::channel::Channel;
use stand_core::link::TelemetryLink;
use stand_core::sensors::SensorSource;
use stand_core::sequencer::Sequencer;
use static_cell::StaticCell;

use crate::clock::FirmwareInstant;
use crate::hw::{FirePin, Hx711, Max6675Bank};
use crate::link::{LinkState, RxQueue, TxQueue, UsbListener};
#[cfg(feature = "load-test")]
use crate::load_test::{self, LoadTest};
#[cfg(not(feature = "load-test"))]
use crate::stand::{self, STAND_CONFIG};
use crate::usb;

#[cfg(feature = "load-test")]
mod load_test_task;
#[cfg(not(feature = "load-test"))]
mod stand_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type StandSequencer = Sequencer<FirePin<'static>, FirmwareInstant>;
pub(super) type StandLink = TelemetryLink<UsbListener<'static>>;
pub(super) type StandSensors = SensorSource<Hx711<'static>, Max6675Bank<'static>, FirmwareInstant>;

pub(super) static RX_QUEUE: RxQueue = Channel::new();
pub(super) static TX_QUEUE: TxQueue = Channel::new();
pub(super) static LINK_STATE: LinkState = LinkState::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA2,
        PA3,
        PA4,
        PA5,
        PA6,
        PA7,
        PA8,
        PB0,
        PB1,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    // Fire control first so the igniter line is driven LOW before anything else.
    let fire = FirePin::new(Output::new(PA8, Level::Low, Speed::Low));

    let load_cell = Hx711::new(
        Input::new(PB0, Pull::None),
        Output::new(PB1, Level::Low, Speed::Medium),
    );
    let thermocouples = Max6675Bank::new(
        Output::new(PA5, Level::Low, Speed::Medium),
        Input::new(PA6, Pull::None),
        [
            Output::new(PA0, Level::High, Speed::Medium),
            Output::new(PA1, Level::High, Speed::Medium),
            Output::new(PA2, Level::High, Speed::Medium),
            Output::new(PA3, Level::High, Speed::Medium),
            Output::new(PA4, Level::High, Speed::Medium),
            Output::new(PA7, Level::High, Speed::Medium),
        ],
    );

    let link = TelemetryLink::new(UsbListener::new(&LINK_STATE, &RX_QUEUE, &TX_QUEUE));

    #[cfg(not(feature = "load-test"))]
    {
        let sequencer = Sequencer::new(STAND_CONFIG, fire);
        let sensors = SensorSource::with_refresh(
            load_cell,
            thermocouples,
            STAND_CONFIG.sampling.weight_policy(),
            STAND_CONFIG.temperature_refresh,
        );

        stand::log_boot(&STAND_CONFIG);

        spawner
            .spawn(stand_task::run(sequencer, link, sensors))
            .expect("failed to spawn stand task");
    }

    #[cfg(feature = "load-test")]
    {
        load_test::log_start();
        let test = LoadTest::new(load_cell, FirmwareInstant::now());

        spawner
            .spawn(load_test_task::run(test, link, fire, thermocouples))
            .expect("failed to spawn load test task");
    }

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    core::future::pending::<()>().await;
}
