use core::panic::PanicInfo;

use defmt::error;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // Pin state is lost on the reset that follows; the fire line defaults LOW.
    error!("PANIC: {}", defmt::Display2Format(info));
    cortex_m::asm::udf();
}
