/// In-memory model of a 24AA025UID on a two-wire bus
///
/// - 256 bytes, erased state 0xff
/// - upper half (0x80..0xff) is write protected; the factory programmed
///   manufacturer code, device code and serial number live at 0xfa..0xff
/// - the first byte of a write transmission sets the internal address
///   pointer, following bytes are stored at the pointer
/// - reads continue at the pointer; the pointer wraps at 256
///
/// Every bus interaction is recorded as an `Event`; faults can be injected
/// to exercise the error paths of the driver.

use std::collections::VecDeque;
use std::time::Duration;

use super::{
	EndStatus,
	TwoWire,
};
use crate::eeprom::geometry::C24AA025UID;

const MEMORY_SIZE: usize = 0x100;
const WRITE_PROTECTED_START: usize = 0x80;
// transmit buffer of the usual "Wire" implementations
const TX_BUFFER_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Event {
	Begin,
	SetClock(u32),
	// `bytes` includes the word address as first byte
	Transmission {
		address: u8,
		bytes: Vec<u8>,
		status: EndStatus,
	},
	Request {
		address: u8,
		len: usize,
		delivered: usize,
	},
	Delay(Duration),
}

pub struct SimulatedChip {
	memory: [u8; MEMORY_SIZE],
	pointer: u8,
	tx: Option<(u8, Vec<u8>)>,
	tx_overflow: bool,
	rx: VecDeque<u8>,
	staging_polls: usize,
	pending_polls: usize,
	nack_writes: bool,
	stall_reads: bool,
	stall_after: Option<usize>,
	requests: usize,
	events: Vec<Event>,
}

impl Default for SimulatedChip {
	fn default() -> Self {
		Self::new()
	}
}

impl SimulatedChip {
	/// Fresh chip: erased user area, factory device id, serial number zero
	pub fn new() -> Self {
		let mut chip = SimulatedChip {
			memory: [0xff; MEMORY_SIZE],
			pointer: 0,
			tx: None,
			tx_overflow: false,
			rx: VecDeque::new(),
			staging_polls: 0,
			pending_polls: 0,
			nack_writes: false,
			stall_reads: false,
			stall_after: None,
			requests: 0,
			events: Vec::new(),
		};
		chip.set_device_id(C24AA025UID.device_id).set_serial(0);
		chip
	}

	pub fn set_device_id(&mut self, device_id: u16) -> &mut Self {
		let offset = C24AA025UID.manufacturer_offset as usize;
		self.memory[offset] = (device_id >> 8) as u8;
		self.memory[offset + 1] = device_id as u8;
		self
	}

	pub fn set_serial(&mut self, serial: u32) -> &mut Self {
		let offset = C24AA025UID.serial_offset as usize;
		self.memory[offset] = (serial >> 24) as u8;
		self.memory[offset + 1] = (serial >> 16) as u8;
		self.memory[offset + 2] = (serial >> 8) as u8;
		self.memory[offset + 3] = serial as u8;
		self
	}

	/// acknowledge the address but NACK every data byte of write transmissions
	pub fn set_nack_writes(&mut self, nack: bool) -> &mut Self {
		self.nack_writes = nack;
		self
	}

	/// read requests deliver nothing; `available` stays at zero
	pub fn set_stall_reads(&mut self, stall: bool) -> &mut Self {
		self.stall_reads = stall;
		self
	}

	/// like `set_stall_reads`, but only after `served` requests delivered data
	pub fn set_stall_reads_after(&mut self, served: Option<usize>) -> &mut Self {
		self.stall_after = served;
		self.requests = 0;
		self
	}

	/// number of `available` polls returning zero after each request
	pub fn set_staging_polls(&mut self, polls: usize) -> &mut Self {
		self.staging_polls = polls;
		self
	}

	pub fn memory(&self) -> &[u8] {
		&self.memory[..]
	}

	/// direct access, bypassing write protection (factory programming)
	pub fn memory_mut(&mut self) -> &mut [u8] {
		&mut self.memory[..]
	}

	pub fn events(&self) -> &[Event] {
		&self.events[..]
	}

	pub fn clear_events(&mut self) {
		self.events.clear();
	}

	/// all write transmissions (including pure "set address" ones)
	pub fn transmissions(&self) -> Vec<&[u8]> {
		self.events.iter().filter_map(|e| match e {
			Event::Transmission { bytes, .. } => Some(&bytes[..]),
			_ => None,
		}).collect()
	}

	pub fn requests(&self) -> Vec<usize> {
		self.events.iter().filter_map(|e| match e {
			Event::Request { len, .. } => Some(*len),
			_ => None,
		}).collect()
	}

	pub fn delays(&self) -> Vec<Duration> {
		self.events.iter().filter_map(|e| match e {
			Event::Delay(d) => Some(*d),
			_ => None,
		}).collect()
	}

	/// events touching the bus (everything but delays)
	pub fn bus_activity(&self) -> usize {
		self.events.iter().filter(|e| match e {
			Event::Delay(_) => false,
			_ => true,
		}).count()
	}

	fn store(&mut self, data: u8) {
		if (self.pointer as usize) < WRITE_PROTECTED_START {
			self.memory[self.pointer as usize] = data;
		}
		self.pointer = self.pointer.wrapping_add(1);
	}
}

impl TwoWire for SimulatedChip {
	fn begin(&mut self) {
		self.events.push(Event::Begin);
	}

	fn set_clock(&mut self, hz: u32) {
		self.events.push(Event::SetClock(hz));
	}

	fn begin_transmission(&mut self, address: u8) {
		self.tx = Some((address, Vec::new()));
		self.tx_overflow = false;
	}

	fn write(&mut self, data: u8) -> usize {
		match self.tx {
			Some((_, ref mut buf)) => {
				if buf.len() < TX_BUFFER_LEN {
					buf.push(data);
					1
				} else {
					self.tx_overflow = true;
					0
				}
			},
			None => 0,
		}
	}

	fn end_transmission(&mut self) -> EndStatus {
		let (address, bytes) = match self.tx.take() {
			Some(tx) => tx,
			None => return EndStatus::from_code(4),
		};

		let status = if address != C24AA025UID.bus_address {
			EndStatus::AddressNack
		} else if self.tx_overflow {
			EndStatus::DataTooLong
		} else if self.nack_writes && !bytes.is_empty() {
			EndStatus::DataNack
		} else {
			if let Some((&word_address, data)) = bytes.split_first() {
				self.pointer = word_address;
				for &b in data {
					self.store(b);
				}
			}
			EndStatus::Success
		};

		self.events.push(Event::Transmission {
			address,
			bytes,
			status,
		});
		status
	}

	fn request_from(&mut self, address: u8, len: usize) -> usize {
		self.rx.clear();
		let stalled = self.stall_reads || self.stall_after.map_or(false, |n| self.requests >= n);
		self.requests += 1;
		let delivered = if address != C24AA025UID.bus_address || stalled {
			0
		} else {
			for _ in 0..len {
				self.rx.push_back(self.memory[self.pointer as usize]);
				self.pointer = self.pointer.wrapping_add(1);
			}
			len
		};
		self.pending_polls = self.staging_polls;

		self.events.push(Event::Request {
			address,
			len,
			delivered,
		});
		delivered
	}

	fn available(&mut self) -> usize {
		if self.pending_polls > 0 {
			self.pending_polls -= 1;
			return 0;
		}
		self.rx.len()
	}

	fn read(&mut self) -> Option<u8> {
		self.rx.pop_front()
	}

	fn delay(&mut self, duration: Duration) {
		self.events.push(Event::Delay(duration));
	}
}
