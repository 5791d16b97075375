use embassy_futures::join::join;
use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::driver::EndpointError;

use super::{LINK_STATE, RX_QUEUE, TX_QUEUE, USB_STORAGE};
use crate::link::UsbFrame;
use crate::usb::{self, UsbDeviceStrings};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let usb::UsbLinkDevice { mut device, cdc } =
        usb::UsbLinkDevice::new(driver, storage, UsbDeviceStrings::default());
    let usb::CdcAcmHandle {
        sender,
        receiver,
        control,
    } = cdc;

    join(device.run(), pump_link(sender, receiver, control)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn pump_link<D>(
    mut sender: embassy_usb::class::cdc_acm::Sender<'static, D>,
    mut receiver: embassy_usb::class::cdc_acm::Receiver<'static, D>,
    control: embassy_usb::class::cdc_acm::ControlChanged<'static>,
) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let mut ingress = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut pending_tx: Option<UsbFrame> = None;

    loop {
        join(receiver.wait_connection(), sender.wait_connection()).await;
        wait_for_dtr(&control, &mut sender).await;

        // Lines queued for a previous host are dropped.
        pending_tx.take();
        TX_QUEUE.clear();
        LINK_STATE.attach();
        defmt::info!("usb: ground station attached");

        loop {
            match select3(
                receiver.read_packet(&mut ingress),
                async {
                    if pending_tx.is_none() {
                        pending_tx = Some(TX_QUEUE.receive().await);
                    }
                    let Some(frame) = pending_tx.as_ref() else {
                        return Ok(0);
                    };
                    let len = frame.len();
                    let written = sender.write_packet(frame).await;
                    if written.is_ok() {
                        pending_tx = None;
                    }
                    written.map(|()| len)
                },
                control.control_changed(),
            )
            .await
            {
                Either3::First(Ok(0)) => {}
                Either3::First(Ok(count)) => {
                    let mut frame = UsbFrame::new();
                    if frame.extend_from_slice(&ingress[..count]).is_err()
                        || RX_QUEUE.try_send(frame).is_err()
                    {
                        defmt::warn!("usb: dropping command bytes len={}", count);
                    }
                }
                Either3::First(Err(EndpointError::Disabled))
                | Either3::Second(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: endpoints disabled");
                    break;
                }
                Either3::First(Err(_)) => defmt::warn!("usb: read error"),
                Either3::Second(Ok(_)) => {}
                Either3::Second(Err(_)) => defmt::warn!("usb: write error"),
                Either3::Third(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: host dropped DTR");
                        break;
                    }
                }
            }
        }

        LINK_STATE.detach();
        pending_tx.take();
    }
}

async fn wait_for_dtr<D>(
    control: &embassy_usb::class::cdc_acm::ControlChanged<'static>,
    sender: &mut embassy_usb::class::cdc_acm::Sender<'static, D>,
) where
    D: embassy_usb::driver::Driver<'static>,
{
    while !sender.dtr() {
        control.control_changed().await;
    }
}
