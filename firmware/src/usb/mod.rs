//! USB CDC ACM device exposing the ground-station link.
//!
//! The stand enumerates as a single CDC ACM interface. The radio modem (or a
//! bench PC) opens the port and asserts DTR to become the connected client.

/// User-visible strings advertised in the USB descriptors.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: "Static Fire",
            product: "Test Stand Controller",
            serial_number: None,
        }
    }
}

#[cfg(target_os = "none")]
pub const MAX_PACKET_SIZE: u16 = 64;

#[cfg(target_os = "none")]
const CONTROL_BUFFER_LEN: usize = 64;
#[cfg(target_os = "none")]
const CONFIG_DESCRIPTOR_LEN: usize = 128;
#[cfg(target_os = "none")]
const BOS_DESCRIPTOR_LEN: usize = 64;
#[cfg(target_os = "none")]
const MSOS_DESCRIPTOR_LEN: usize = 0;

/// Backing storage for the Embassy USB builder and CDC ACM class.
#[cfg(target_os = "none")]
pub struct UsbDeviceStorage {
    control_buf: [u8; CONTROL_BUFFER_LEN],
    config_descriptor: [u8; CONFIG_DESCRIPTOR_LEN],
    bos_descriptor: [u8; BOS_DESCRIPTOR_LEN],
    msos_descriptor: [u8; MSOS_DESCRIPTOR_LEN],
    cdc_state: embassy_usb::class::cdc_acm::State<'static>,
}

#[cfg(target_os = "none")]
impl UsbDeviceStorage {
    pub fn new() -> Self {
        Self {
            control_buf: [0; CONTROL_BUFFER_LEN],
            config_descriptor: [0; CONFIG_DESCRIPTOR_LEN],
            bos_descriptor: [0; BOS_DESCRIPTOR_LEN],
            msos_descriptor: [0; MSOS_DESCRIPTOR_LEN],
            cdc_state: embassy_usb::class::cdc_acm::State::new(),
        }
    }
}

/// Split handles for the CDC ACM interface.
#[cfg(target_os = "none")]
pub struct CdcAcmHandle<D: embassy_usb::driver::Driver<'static>> {
    pub sender: embassy_usb::class::cdc_acm::Sender<'static, D>,
    pub receiver: embassy_usb::class::cdc_acm::Receiver<'static, D>,
    pub control: embassy_usb::class::cdc_acm::ControlChanged<'static>,
}

/// Built USB device plus its CDC handles.
#[cfg(target_os = "none")]
pub struct UsbLinkDevice<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    pub device: embassy_usb::UsbDevice<'static, D>,
    pub cdc: CdcAcmHandle<D>,
}

#[cfg(target_os = "none")]
impl<D> UsbLinkDevice<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(
        driver: D,
        storage: &'static mut UsbDeviceStorage,
        strings: UsbDeviceStrings,
    ) -> Self {
        let mut config = embassy_usb::Config::new(0x1209, 0x0001);
        config.manufacturer = Some(strings.manufacturer);
        config.product = Some(strings.product);
        config.serial_number = strings.serial_number;
        config.max_packet_size_0 = MAX_PACKET_SIZE as u8;
        config.max_power = 100;

        let mut builder = embassy_usb::Builder::new(
            driver,
            config,
            &mut storage.config_descriptor,
            &mut storage.bos_descriptor,
            &mut storage.msos_descriptor,
            &mut storage.control_buf,
        );

        let class = embassy_usb::class::cdc_acm::CdcAcmClass::new(
            &mut builder,
            &mut storage.cdc_state,
            MAX_PACKET_SIZE,
        );
        let (sender, receiver, control) = class.split_with_control();

        Self {
            device: builder.build(),
            cdc: CdcAcmHandle {
                sender,
                receiver,
                control,
            },
        }
    }
}
