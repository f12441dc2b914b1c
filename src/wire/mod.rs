/// Two-wire (I2C) bus abstraction
///
/// Mirrors the primitives of a classic microcontroller "Wire" peripheral: a
/// write transaction is assembled with `begin_transmission` / `write` and
/// sent by `end_transmission`; a read transaction is started with
/// `request_from` and the received bytes are staged in a receive buffer
/// queried through `available` / `read`.

use std::fmt;
use std::thread;
use std::time::{
	Duration,
	Instant,
};

mod linux;
mod simulated;

// OS-specific. for now linux only.
pub use self::linux::LinuxTwoWire;

pub use self::simulated::{
	Event,
	SimulatedChip,
};

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Result of `end_transmission`, using the usual two-wire status codes
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum EndStatus {
	Success,
	DataTooLong,
	AddressNack,
	DataNack,
	Other(u8),
}

impl EndStatus {
	pub fn from_code(code: u8) -> Self {
		match code {
			0 => EndStatus::Success,
			1 => EndStatus::DataTooLong,
			2 => EndStatus::AddressNack,
			3 => EndStatus::DataNack,
			c => EndStatus::Other(c),
		}
	}

	pub fn code(&self) -> u8 {
		match *self {
			EndStatus::Success => 0,
			EndStatus::DataTooLong => 1,
			EndStatus::AddressNack => 2,
			EndStatus::DataNack => 3,
			EndStatus::Other(c) => c,
		}
	}

	pub fn is_success(&self) -> bool {
		*self == EndStatus::Success
	}
}

impl fmt::Display for EndStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			EndStatus::Success => write!(f, "success"),
			EndStatus::DataTooLong => write!(f, "data too long for transmit buffer"),
			EndStatus::AddressNack => write!(f, "NACK on address"),
			EndStatus::DataNack => write!(f, "NACK on data"),
			EndStatus::Other(c) => write!(f, "bus error {}", c),
		}
	}
}

pub trait TwoWire {
	fn begin(&mut self);
	fn set_clock(&mut self, hz: u32);

	fn begin_transmission(&mut self, address: u8);
	// returns number of bytes queued (0 or 1)
	fn write(&mut self, data: u8) -> usize;
	fn end_transmission(&mut self) -> EndStatus;

	// returns number of bytes the target actually delivered
	fn request_from(&mut self, address: u8, len: usize) -> usize;
	fn available(&mut self) -> usize;
	fn read(&mut self) -> Option<u8>;

	// blocking wait; simulated buses record instead of sleeping
	fn delay(&mut self, duration: Duration) {
		reliable_sleep(duration);
	}
}

impl<'a, W: ?Sized + TwoWire> TwoWire for &'a mut W {
	fn begin(&mut self) {
		W::begin(*self)
	}
	fn set_clock(&mut self, hz: u32) {
		W::set_clock(*self, hz)
	}

	fn begin_transmission(&mut self, address: u8) {
		W::begin_transmission(*self, address)
	}
	fn write(&mut self, data: u8) -> usize {
		W::write(*self, data)
	}
	fn end_transmission(&mut self) -> EndStatus {
		W::end_transmission(*self)
	}

	fn request_from(&mut self, address: u8, len: usize) -> usize {
		W::request_from(*self, address, len)
	}
	fn available(&mut self) -> usize {
		W::available(*self)
	}
	fn read(&mut self) -> Option<u8> {
		W::read(*self)
	}

	fn delay(&mut self, duration: Duration) {
		W::delay(*self, duration)
	}
}
