#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![cfg_attr(not(target_os = "none"), allow(dead_code))]
#![cfg_attr(all(target_os = "none", feature = "load-test"), allow(dead_code))]

mod clock;
mod hw;
mod link;
mod stand;
mod usb;

#[cfg(target_os = "none")]
mod panic;
#[cfg(target_os = "none")]
mod runtime;

#[cfg(not(target_os = "none"))]
fn main() {}
