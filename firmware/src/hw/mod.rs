//! Stand board peripherals: fire-control line, HX711 load cell, and the six
//! MAX6675 thermocouple converters on a shared bit-banged bus.
//!
//! The decoding helpers are target-independent so host tests cover them; the
//! pin drivers only exist on the MCU.

#[cfg(target_os = "none")]
use embassy_stm32::gpio::{Input, Output};
#[cfg(target_os = "none")]
use embassy_time::{Duration, block_for};
#[cfg(target_os = "none")]
use stand_core::sensors::{LoadCell, THERMOCOUPLE_CHANNELS, ThermocoupleBank};
#[cfg(target_os = "none")]
use stand_core::sequencer::{FireControl, FireLevel};

/// Data bits clocked out of the HX711 per conversion.
pub const HX711_DATA_BITS: u32 = 24;

/// Extra clock pulses after the data bits; one selects channel A, gain 128.
pub const HX711_GAIN_PULSES: u32 = 1;

/// Bit set by the MAX6675 when its thermocouple input is open.
pub const MAX6675_OPEN_INPUT: u16 = 0x0004;

/// Degrees per MAX6675 count.
pub const MAX6675_RESOLUTION_C: f32 = 0.25;

/// Sign-extends a 24-bit two's-complement HX711 conversion.
#[allow(clippy::cast_possible_wrap)]
#[must_use]
pub const fn decode_hx711(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

/// Largest HX711 conversion; also what a data line stuck high reads as.
pub const HX711_FULL_SCALE_HIGH: i32 = 8_388_607;

/// Smallest HX711 conversion.
pub const HX711_FULL_SCALE_LOW: i32 = -8_388_608;

/// Wiring verdict for a single HX711 conversion.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Hx711Reading {
    Plausible,
    /// Pinned at positive full scale: DT floating high or E+/E- open.
    SaturatedHigh,
    /// Pinned at negative full scale: bridge wired backwards or shorted.
    SaturatedLow,
    /// Exactly zero: DT shorted low or the bridge is unpowered.
    Zero,
}

impl Hx711Reading {
    #[must_use]
    pub const fn is_wiring_fault(self) -> bool {
        !matches!(self, Hx711Reading::Plausible)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Hx711Reading::Plausible => "ok",
            Hx711Reading::SaturatedHigh => "saturated-high",
            Hx711Reading::SaturatedLow => "saturated-low",
            Hx711Reading::Zero => "zero",
        }
    }
}

/// Flags conversions that only a wiring fault produces.
#[must_use]
pub const fn classify_hx711(raw: i32) -> Hx711Reading {
    match raw {
        HX711_FULL_SCALE_HIGH => Hx711Reading::SaturatedHigh,
        HX711_FULL_SCALE_LOW => Hx711Reading::SaturatedLow,
        0 => Hx711Reading::Zero,
        _ => Hx711Reading::Plausible,
    }
}

/// Converts a MAX6675 frame to °C. An open thermocouple reads as NaN.
#[must_use]
pub fn decode_max6675(frame: u16) -> f32 {
    if frame & MAX6675_OPEN_INPUT != 0 {
        return f32::NAN;
    }
    f32::from(frame >> 3) * MAX6675_RESOLUTION_C
}

/// Push-pull output driving the igniter relay. LOW from reset.
#[cfg(target_os = "none")]
pub struct FirePin<'d> {
    pin: Output<'d>,
}

#[cfg(target_os = "none")]
impl<'d> FirePin<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self { pin }
    }
}

#[cfg(target_os = "none")]
impl FireControl for FirePin<'_> {
    fn drive(&mut self, level: FireLevel) {
        match level {
            FireLevel::High => self.pin.set_high(),
            FireLevel::Low => self.pin.set_low(),
        }
    }
}

/// HX711 24-bit load-cell ADC.
#[cfg(target_os = "none")]
pub struct Hx711<'d> {
    dout: Input<'d>,
    sck: Output<'d>,
}

#[cfg(target_os = "none")]
impl<'d> Hx711<'d> {
    const HALF_PERIOD: Duration = Duration::from_micros(1);

    pub fn new(dout: Input<'d>, mut sck: Output<'d>) -> Self {
        // SCK held high for >60 µs powers the chip down.
        sck.set_low();
        Self { dout, sck }
    }

    fn pulse(&mut self) -> bool {
        self.sck.set_high();
        block_for(Self::HALF_PERIOD);
        let bit = self.dout.is_high();
        self.sck.set_low();
        block_for(Self::HALF_PERIOD);
        bit
    }
}

#[cfg(target_os = "none")]
impl LoadCell for Hx711<'_> {
    fn is_ready(&mut self) -> bool {
        self.dout.is_low()
    }

    fn read_raw(&mut self) -> i32 {
        let raw = critical_section::with(|_| {
            let mut raw = 0u32;
            for _ in 0..HX711_DATA_BITS {
                raw = (raw << 1) | u32::from(self.pulse());
            }
            for _ in 0..HX711_GAIN_PULSES {
                self.pulse();
            }
            raw
        });
        decode_hx711(raw)
    }
}

/// Six MAX6675 converters sharing SCK/SO with one chip select each.
#[cfg(target_os = "none")]
pub struct Max6675Bank<'d> {
    sck: Output<'d>,
    so: Input<'d>,
    cs: [Output<'d>; THERMOCOUPLE_CHANNELS],
}

#[cfg(target_os = "none")]
impl<'d> Max6675Bank<'d> {
    const HALF_PERIOD: Duration = Duration::from_micros(10);

    pub fn new(
        mut sck: Output<'d>,
        so: Input<'d>,
        mut cs: [Output<'d>; THERMOCOUPLE_CHANNELS],
    ) -> Self {
        sck.set_low();
        for select in &mut cs {
            select.set_high();
        }
        Self { sck, so, cs }
    }

    fn read_frame(&mut self, channel: usize) -> u16 {
        self.cs[channel].set_low();
        block_for(Self::HALF_PERIOD);

        let mut frame = 0u16;
        for _ in 0..16 {
            self.sck.set_low();
            block_for(Self::HALF_PERIOD);
            frame = (frame << 1) | u16::from(self.so.is_high());
            self.sck.set_high();
            block_for(Self::HALF_PERIOD);
        }

        self.sck.set_low();
        self.cs[channel].set_high();
        frame
    }
}

#[cfg(target_os = "none")]
impl ThermocoupleBank for Max6675Bank<'_> {
    fn read_celsius(&mut self, channel: usize) -> f32 {
        if channel >= THERMOCOUPLE_CHANNELS {
            return f32::NAN;
        }
        decode_max6675(self.read_frame(channel))
    }
}
