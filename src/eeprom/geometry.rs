/* Chip documentation: https://ww1.microchip.com/downloads/aemDocuments/documents/OTH/ProductDocuments/DataSheets/20005202A.pdf */

use std::time::Duration;

/// Fixed parameters of a chip variant
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Geometry {
	/// 7-bit bus address
	pub bus_address: u8,
	pub bus_clock_hz: u32,

	/// manufacturer code (1 byte) followed by device code (1 byte)
	pub manufacturer_offset: u8,
	/// 32-bit serial number, most significant byte first
	pub serial_offset: u8,
	pub device_id: u16,

	// payload bytes per page transaction
	pub max_read_len: usize,
	pub max_write_len: usize,

	// `address + len` must stay strictly below these
	pub read_end: usize,
	pub write_end: usize,

	/// internal write cycle after each page write
	pub write_cycle: Duration,

	// waiting for the bus peripheral to stage received bytes
	pub poll_attempts: usize,
	pub poll_interval: Duration,
}

/// Microchip 24AA025UID: 2 kbit, upper half write protected and
/// containing the factory programmed identification
pub const C24AA025UID: Geometry = Geometry {
	bus_address: 0b101_0000,
	bus_clock_hz: 400_000,

	manufacturer_offset: 0xfa,
	serial_offset: 0xfc,
	device_id: 0x2941,

	max_read_len: 8,
	max_write_len: 8,

	read_end: 0xff,
	write_end: 0x7f,

	write_cycle: Duration::from_millis(5),

	poll_attempts: 10,
	poll_interval: Duration::from_micros(20),
};
