//! Telemetry packet formatting.
//!
//! A packet is `rel_time,load_raw,t1,t2,t3,t4,t5,t6\n` where `rel_time` is
//! seconds relative to T0 with three decimals (negative during the countdown)
//! and each thermocouple reading is °C with two decimals. An open thermocouple
//! is written as `nan`, the token existing ground-station parsers expect.

use core::fmt::Write;

use heapless::String;

use crate::sensors::Sample;

/// Capacity reserved for one encoded packet line.
///
/// Large enough for every field rendered at the widest finite `f32` value, so
/// encoding never runs out of room.
pub const PACKET_CAPACITY: usize = 384;

/// Token written for a NaN field.
pub const NAN_FIELD: &str = "nan";

/// Fixed-capacity buffer holding one encoded packet line.
pub type PacketLine = String<PACKET_CAPACITY>;

/// Stateless encoder turning samples into wire lines.
#[derive(Copy, Clone, Debug, Default)]
pub struct PacketEncoder;

impl PacketEncoder {
    /// Encodes `sample` into a newline-terminated packet line.
    #[must_use]
    pub fn encode(sample: &Sample) -> PacketLine {
        let mut line = PacketLine::new();
        // Writes cannot fail: PACKET_CAPACITY covers the worst case.
        let _ = write!(
            line,
            "{:.3},{}",
            sample.relative_time_s(),
            sample.load_raw()
        );
        for temp in sample.temps() {
            if temp.is_nan() {
                let _ = write!(line, ",{NAN_FIELD}");
            } else {
                let _ = write!(line, ",{temp:.2}");
            }
        }
        let _ = line.push('\n');
        line
    }
}
