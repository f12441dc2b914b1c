use failure::Fail;

use crate::wire::EndStatus;

/// Failure of a single page transaction
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum PageError {
	#[fail(display = "transmission failed: {}", _0)]
	Transmission(EndStatus),

	#[fail(display = "only {} of {} requested bytes available", available, requested)]
	Unavailable {
		requested: usize,
		available: usize,
	},
}

#[derive(Clone, PartialEq, Eq, Debug, Fail)]
pub enum EepromError {
	#[fail(display = "no two-wire bus attached")]
	NoTransport,

	#[fail(display = "access to 0x{:02x} (+{} bytes) not below 0x{:02x}", address, len, end)]
	OutOfRange {
		address: usize,
		len: usize,
		end: usize,
	},

	// chunk details are logged; only counts are kept
	#[fail(display = "{} of {} page transactions failed", failed, total)]
	Transfer {
		failed: usize,
		total: usize,
	},

	#[fail(display = "page transaction at 0x{:02x} failed: {}", address, error)]
	Transaction {
		address: usize,
		error: PageError,
	},

	#[fail(display = "serial number field not blank: 0x{:08x}", _0)]
	SerialSentinel(u32),

	#[fail(display = "unexpected device id 0x{:04x} (expected 0x{:04x})", found, expected)]
	DeviceIdMismatch {
		found: u16,
		expected: u16,
	},
}
