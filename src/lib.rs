// kiosk-bridge
//
// Nested Wayland kiosk compositor. Guest clients connect to the kiosk; the
// kiosk itself is a client of the host compositor and mirrors the clipboard
// and pointer constraints between the two sessions.

pub mod config;
pub mod core;
pub mod util;
