/// Driver for the Microchip 24AA025UID, a 2-kbit I²C EEPROM with factory
/// programmed 32-bit serial number.
///
/// Memory map:
/// - 0x00..0x7f: user data (this driver writes below `write_end` only)
/// - 0x80..0xff: write protected; manufacturer code @ 0xfa, device code
///   @ 0xfb, serial number @ 0xfc..0xff
///
/// Requests are split into page transactions of at most 8 bytes. All pages
/// of a request are attempted even when an earlier one failed; after every
/// page write the driver waits for the full write cycle instead of polling
/// the chip.

use std::fmt;

pub mod geometry;

mod error;
mod page;

pub use self::error::{
	EepromError,
	PageError,
};

use self::geometry::{
	C24AA025UID,
	Geometry,
};
use self::page::TwoWirePageExt;
use crate::wire::TwoWire;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Identity {
	pub device_id: u16,
	pub serial: u32,
}

impl Identity {
	pub fn manufacturer_code(&self) -> u8 {
		(self.device_id >> 8) as u8
	}

	pub fn device_code(&self) -> u8 {
		self.device_id as u8
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f,
			"manufacturer 0x{:02x}, device 0x{:02x}, serial 0x{:08x}",
			self.manufacturer_code(),
			self.device_code(),
			self.serial,
		)
	}
}

fn check_window(address: usize, len: usize, end: usize) -> Result<(), EepromError> {
	match address.checked_add(len) {
		Some(last) if last < end => Ok(()),
		_ => Err(EepromError::OutOfRange {
			address,
			len,
			end,
		}),
	}
}

fn transfer_result(failed: usize, total: usize) -> Result<(), EepromError> {
	if failed == 0 {
		Ok(())
	} else {
		Err(EepromError::Transfer {
			failed,
			total,
		})
	}
}

/// Device handle; pass `&mut bus` to keep ownership of the bus outside
pub struct Eeprom<W: TwoWire> {
	wire: Option<W>,
	geometry: Geometry,
}

impl<W: TwoWire> Eeprom<W> {
	pub fn new(wire: W) -> Self {
		Self::from_option(Some(wire))
	}

	/// A handle without bus can't do anything; all operations fail.
	pub fn from_option(wire: Option<W>) -> Self {
		Eeprom {
			wire,
			geometry: C24AA025UID,
		}
	}

	pub fn geometry(&self) -> &Geometry {
		&self.geometry
	}

	pub fn bus(&self) -> Option<&W> {
		self.wire.as_ref()
	}

	pub fn bus_mut(&mut self) -> Option<&mut W> {
		self.wire.as_mut()
	}

	pub fn release(self) -> Option<W> {
		self.wire
	}

	/// Whether `read(address, len bytes)` stays inside the readable window
	pub fn check_read(&self, address: usize, len: usize) -> Result<(), EepromError> {
		check_window(address, len, self.geometry.read_end)
	}

	/// Whether `write(address, len bytes)` stays inside the writable window
	pub fn check_write(&self, address: usize, len: usize) -> Result<(), EepromError> {
		check_window(address, len, self.geometry.write_end)
	}

	fn wire(&mut self) -> Result<&mut W, EepromError> {
		self.wire.as_mut().ok_or(EepromError::NoTransport)
	}

	// the identification lies beyond the readable window; address it directly
	fn read_factory(&mut self, offset: u8, target: &mut [u8]) -> Result<(), EepromError> {
		let geometry = self.geometry;
		let wire = self.wire()?;
		wire.read_page(&geometry, offset as usize, target).map_err(|error| {
			EepromError::Transaction {
				address: offset as usize,
				error,
			}
		})
	}

	fn read_serial(&mut self) -> Result<u32, EepromError> {
		let mut buf = [0u8; 4];
		self.read_factory(self.geometry.serial_offset, &mut buf)?;
		Ok(u32::from_be_bytes(buf))
	}

	fn read_device_id(&mut self) -> Result<u16, EepromError> {
		let mut buf = [0u8; 2];
		self.read_factory(self.geometry.manufacturer_offset, &mut buf)?;
		Ok(u16::from_be_bytes(buf))
	}

	/// Configure the bus and verify the expected chip is present.
	///
	/// Fails without a bus, on any failed transaction, if the serial number
	/// field isn't blank (zero) or if the device id doesn't match.
	pub fn init(&mut self) -> Result<(), EepromError> {
		let geometry = self.geometry;
		{
			let wire = self.wire()?;
			wire.begin();
			wire.set_clock(geometry.bus_clock_hz);
		}

		let serial = self.read_serial()?;
		if serial != 0 {
			warn!("serial number field not blank: 0x{:08x}", serial);
			return Err(EepromError::SerialSentinel(serial));
		}

		let device_id = self.read_device_id()?;
		if device_id != geometry.device_id {
			warn!("unexpected device id 0x{:04x} (expected 0x{:04x})", device_id, geometry.device_id);
			return Err(EepromError::DeviceIdMismatch {
				found: device_id,
				expected: geometry.device_id,
			});
		}

		debug!("EEPROM at bus address 0x{:02x} ready", geometry.bus_address);
		Ok(())
	}

	/// Read the factory identification without judging it
	pub fn identity(&mut self) -> Result<Identity, EepromError> {
		let device_id = self.read_device_id()?;
		let serial = self.read_serial()?;
		Ok(Identity {
			device_id,
			serial,
		})
	}

	/// Write `data` starting at `address`; `address + data.len()` must be
	/// below `write_end`.
	///
	/// Blocks for one write cycle per page, also for failed pages.
	pub fn write(&mut self, address: usize, data: &[u8]) -> Result<(), EepromError> {
		let geometry = self.geometry;
		self.check_write(address, data.len())?;
		let wire = self.wire()?;

		let mut failed = 0;
		let mut total = 0;
		for (index, chunk) in data.chunks(geometry.max_write_len).enumerate() {
			let chunk_address = address + index * geometry.max_write_len;
			if let Err(e) = wire.write_page(&geometry, chunk_address, chunk) {
				warn!("writing {} bytes to address 0x{:02x} failed: {}", chunk.len(), chunk_address, e);
				failed += 1;
			}
			total += 1;
			// wait write done
			wire.delay(geometry.write_cycle);
		}

		transfer_result(failed, total)
	}

	/// Fill `buffer` from `address`; `address + buffer.len()` must be below
	/// `read_end`.
	///
	/// Pages that fail leave their part of `buffer` untouched.
	pub fn read(&mut self, address: usize, buffer: &mut [u8]) -> Result<(), EepromError> {
		let geometry = self.geometry;
		self.check_read(address, buffer.len())?;
		let wire = self.wire()?;

		let mut failed = 0;
		let mut total = 0;
		for (index, chunk) in buffer.chunks_mut(geometry.max_read_len).enumerate() {
			let chunk_address = address + index * geometry.max_read_len;
			if let Err(e) = wire.read_page(&geometry, chunk_address, chunk) {
				warn!("reading {} bytes from address 0x{:02x} failed: {}", chunk.len(), chunk_address, e);
				failed += 1;
			}
			total += 1;
		}

		transfer_result(failed, total)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::wire::{
		EndStatus,
		Event,
		SimulatedChip,
	};

	fn pattern(len: usize) -> Vec<u8> {
		(0..len).map(|i| (i * 7 + 3) as u8).collect()
	}

	#[test]
	fn init_accepts_genuine_chip() {
		let mut chip = SimulatedChip::new();
		Eeprom::new(&mut chip).init().unwrap();

		assert_eq!(&chip.events()[..2], &[Event::Begin, Event::SetClock(400_000)][..]);
		// serial first, then device id
		assert_eq!(chip.transmissions(), vec![&[0xfcu8][..], &[0xfa][..]]);
		assert_eq!(chip.requests(), vec![4, 2]);
	}

	#[test]
	fn init_without_bus_fails() {
		let mut ee = Eeprom::<SimulatedChip>::from_option(None);
		assert_eq!(ee.init(), Err(EepromError::NoTransport));
		assert_eq!(ee.write(0, &[1]), Err(EepromError::NoTransport));
		assert_eq!(ee.read(0, &mut [0]), Err(EepromError::NoTransport));
	}

	#[test]
	fn init_rejects_serial_number() {
		let mut chip = SimulatedChip::new();
		chip.set_serial(0x1234_5678);
		assert_eq!(Eeprom::new(&mut chip).init(), Err(EepromError::SerialSentinel(0x1234_5678)));
		// device id not checked anymore
		assert_eq!(chip.requests(), vec![4]);
	}

	#[test]
	fn init_rejects_device_id() {
		let mut chip = SimulatedChip::new();
		chip.set_device_id(0x2942);
		assert_eq!(Eeprom::new(&mut chip).init(), Err(EepromError::DeviceIdMismatch {
			found: 0x2942,
			expected: 0x2941,
		}));
	}

	#[test]
	fn init_fails_on_silent_bus() {
		let mut chip = SimulatedChip::new();
		chip.set_stall_reads(true);
		assert_eq!(Eeprom::new(&mut chip).init(), Err(EepromError::Transaction {
			address: 0xfc,
			error: PageError::Unavailable {
				requested: 4,
				available: 0,
			},
		}));
		// clock configured anyway
		assert_eq!(chip.events()[1], Event::SetClock(400_000));
	}

	#[test]
	fn init_fails_on_device_id_bus_error() {
		let mut chip = SimulatedChip::new();
		// serial read succeeds, device id read stalls
		chip.set_stall_reads_after(Some(1));
		assert_eq!(Eeprom::new(&mut chip).init(), Err(EepromError::Transaction {
			address: 0xfa,
			error: PageError::Unavailable {
				requested: 2,
				available: 0,
			},
		}));
		assert_eq!(chip.requests(), vec![4, 2]);
		assert_eq!(chip.transmissions(), vec![&[0xfcu8][..], &[0xfa][..]]);
	}

	#[test]
	fn identity_readout() {
		let mut chip = SimulatedChip::new();
		chip.set_serial(0xcafe_babe);
		let identity = Eeprom::new(&mut chip).identity().unwrap();
		assert_eq!(identity, Identity {
			device_id: 0x2941,
			serial: 0xcafe_babe,
		});
		assert_eq!(identity.manufacturer_code(), 0x29);
		assert_eq!(identity.device_code(), 0x41);
		assert_eq!(identity.to_string(), "manufacturer 0x29, device 0x41, serial 0xcafebabe");
	}

	#[test]
	fn write_out_of_window_touches_nothing() {
		let mut chip = SimulatedChip::new();
		{
			let mut ee = Eeprom::new(&mut chip);
			assert_eq!(ee.write(0x78, &[0; 7]), Err(EepromError::OutOfRange {
				address: 0x78,
				len: 7,
				end: 0x7f,
			}));
			assert!(ee.write(0x7f, &[]).is_err());
			assert!(ee.write(usize::max_value(), &[1]).is_err());
		}
		assert!(chip.events().is_empty());
		assert_eq!(chip.bus_activity(), 0);

		// last accepted request ends at 0x7e
		Eeprom::new(&mut chip).write(0x77, &[0; 7]).unwrap();
	}

	#[test]
	fn read_out_of_window_touches_nothing() {
		let mut chip = SimulatedChip::new();
		let mut buf = [0u8; 9];
		assert_eq!(Eeprom::new(&mut chip).read(0xfe, &mut buf), Err(EepromError::OutOfRange {
			address: 0xfe,
			len: 9,
			end: 0xff,
		}));
		assert!(Eeprom::new(&mut chip).read(0xf0, &mut [0; 0x0f]).is_err());
		assert!(chip.events().is_empty());
		assert_eq!(chip.bus_activity(), 0);
	}

	#[test]
	fn window_checks_match_read_and_write() {
		let ee = Eeprom::new(SimulatedChip::new());
		ee.check_read(0, 0xfe).unwrap();
		ee.check_write(0, 0x7e).unwrap();
		assert_eq!(ee.check_read(0, 0xff), Err(EepromError::OutOfRange {
			address: 0,
			len: 0xff,
			end: 0xff,
		}));
		assert!(ee.check_write(0x70, 0x0f).is_err());
		// huge lengths are rejected before anyone allocates a buffer for them
		assert!(ee.check_read(0, usize::max_value() >> 8).is_err());
		assert!(ee.check_read(1, usize::max_value()).is_err());
		assert_eq!(ee.bus().map(|chip| chip.bus_activity()), Some(0));
	}

	#[test]
	fn zero_length_requests_succeed_silently() {
		let mut chip = SimulatedChip::new();
		{
			let mut ee = Eeprom::new(&mut chip);
			ee.write(0x10, &[]).unwrap();
			ee.read(0x10, &mut []).unwrap();
		}
		assert!(chip.events().is_empty());
		assert_eq!(chip.bus_activity(), 0);
	}

	#[test]
	fn single_page_write_and_read_back() {
		let mut chip = SimulatedChip::new();
		let data = *b"sequence";
		Eeprom::new(&mut chip).write(0x08, &data).unwrap();
		assert_eq!(chip.transmissions().len(), 1);
		assert_eq!(chip.transmissions()[0], &b"\x08sequence"[..]);

		chip.clear_events();
		let mut buf = [0u8; 8];
		Eeprom::new(&mut chip).read(0x08, &mut buf).unwrap();
		assert_eq!(buf, data);
		assert_eq!(chip.requests(), vec![8]);
	}

	#[test]
	fn write_splits_into_pages_with_write_cycle_each() {
		let mut chip = SimulatedChip::new();
		let data = pattern(20);
		Eeprom::new(&mut chip).write(0x10, &data).unwrap();

		let tx = chip.transmissions();
		assert_eq!(tx.len(), 3);
		assert_eq!(tx.iter().map(|t| t.len() - 1).collect::<Vec<_>>(), vec![8, 8, 4]);
		assert_eq!(tx.iter().map(|t| t[0]).collect::<Vec<_>>(), vec![0x10, 0x18, 0x20]);

		// every page transmission is followed by one write cycle delay
		let events = chip.events();
		assert_eq!(events.len(), 6);
		for pair in events.chunks(2) {
			match pair[0] {
				Event::Transmission { .. } => (),
				ref e => panic!("expected transmission, got {:?}", e),
			}
			assert_eq!(pair[1], Event::Delay(Duration::from_millis(5)));
		}
		assert_eq!(&chip.memory()[0x10..0x24], &data[..]);
	}

	#[test]
	fn read_splits_into_pages_without_delay() {
		let mut chip = SimulatedChip::new();
		let data = pattern(20);
		chip.memory_mut()[..20].copy_from_slice(&data);

		let mut buf = vec![0u8; 20];
		Eeprom::new(&mut chip).read(0, &mut buf).unwrap();
		assert_eq!(buf, data);
		assert_eq!(chip.requests(), vec![8, 8, 4]);
		assert_eq!(chip.transmissions(), vec![&[0u8][..], &[8][..], &[16][..]]);
		assert!(chip.delays().is_empty());
	}

	#[test]
	fn read_includes_identification_region() {
		let mut chip = SimulatedChip::new();
		let mut buf = [0u8; 4];
		Eeprom::new(&mut chip).read(0xf9, &mut buf).unwrap();
		assert_eq!(buf, [0xff, 0x29, 0x41, 0x00]);
	}

	#[test]
	fn stalled_read_fails_after_poll_budget() {
		let mut chip = SimulatedChip::new();
		chip.set_stall_reads(true);
		let mut buf = [0xaau8; 8];
		assert_eq!(Eeprom::new(&mut chip).read(0x08, &mut buf), Err(EepromError::Transfer {
			failed: 1,
			total: 1,
		}));
		assert_eq!(chip.delays(), vec![Duration::from_micros(20); 10]);
		assert_eq!(buf, [0xaa; 8]);
	}

	#[test]
	fn slow_staging_is_waited_for() {
		let mut chip = SimulatedChip::new();
		chip.set_staging_polls(3);
		let mut buf = [0u8; 2];
		Eeprom::new(&mut chip).read(0xfa, &mut buf).unwrap();
		assert_eq!(buf, [0x29, 0x41]);
		assert_eq!(chip.delays().len(), 3);
	}

	#[test]
	fn staging_beyond_budget_fails_every_page() {
		let mut chip = SimulatedChip::new();
		chip.set_staging_polls(11);
		let mut buf = [0u8; 12];
		assert_eq!(Eeprom::new(&mut chip).read(0, &mut buf), Err(EepromError::Transfer {
			failed: 2,
			total: 2,
		}));
		// no short-circuit: both pages attempted
		assert_eq!(chip.requests(), vec![8, 4]);
		assert_eq!(chip.delays().len(), 20);
	}

	#[test]
	fn failed_writes_keep_going_and_keep_waiting() {
		let mut chip = SimulatedChip::new();
		chip.set_nack_writes(true);
		assert_eq!(Eeprom::new(&mut chip).write(0x00, &pattern(20)), Err(EepromError::Transfer {
			failed: 3,
			total: 3,
		}));
		assert_eq!(chip.transmissions().len(), 3);
		assert_eq!(chip.delays(), vec![Duration::from_millis(5); 3]);
		assert!(chip.events().iter().all(|e| match e {
			Event::Transmission { status, .. } => *status == EndStatus::DataNack,
			_ => true,
		}));
		assert!(chip.memory()[..20].iter().all(|&b| b == 0xff));
	}

	#[test]
	fn write_recovers_once_bus_is_healthy() {
		let mut ee = Eeprom::new(SimulatedChip::new());
		ee.bus_mut().unwrap().set_nack_writes(true);
		assert!(ee.write(0x10, &[1, 2]).is_err());
		ee.bus_mut().unwrap().set_nack_writes(false);
		ee.write(0x10, &[1, 2]).unwrap();

		let chip = ee.bus().unwrap();
		assert_eq!(chip.delays(), vec![Duration::from_millis(5); 2]);
		assert_eq!(&chip.memory()[0x10..0x12], &[1, 2]);
	}

	#[test]
	fn round_trip_whole_writable_window() {
		let mut chip = SimulatedChip::new();
		let data = pattern(0x7e);
		let mut ee = Eeprom::new(&mut chip);
		ee.init().unwrap();
		ee.write(0, &data).unwrap();
		let mut buf = vec![0u8; 0x7e];
		ee.read(0, &mut buf).unwrap();
		assert_eq!(buf, data);

		let chip = ee.release().unwrap();
		// ceil(0x7e / 8) page writes
		assert_eq!(chip.delays().iter().filter(|d| **d == Duration::from_millis(5)).count(), 16);
	}

	#[test]
	fn page_count_matches_length() {
		for len in 0..40usize {
			let mut chip = SimulatedChip::new();
			Eeprom::new(&mut chip).write(0x20, &pattern(len)).unwrap();
			let sizes: Vec<usize> = chip.transmissions().iter().map(|t| t.len() - 1).collect();
			assert_eq!(sizes.len(), (len + 7) / 8);
			assert_eq!(sizes.iter().sum::<usize>(), len);
			if let Some((last, full)) = sizes.split_last() {
				assert!(full.iter().all(|&s| s == 8));
				assert_eq!(*last, if len % 8 == 0 { 8 } else { len % 8 });
			}
		}
	}
}
