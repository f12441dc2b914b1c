/// Single bounded bus transaction: word address byte plus up to one
/// transfer-size worth of payload.

use super::geometry::Geometry;
use super::error::PageError;
use crate::wire::{
	EndStatus,
	TwoWire,
};

pub(super) trait TwoWirePageExt: TwoWire {
	// only the low 8 bits of the address are sent; the chip has 256 bytes
	fn write_address_and_buffer(&mut self, geometry: &Geometry, address: usize, data: &[u8]) -> EndStatus {
		self.begin_transmission(geometry.bus_address);
		self.write(address as u8);
		for &b in data {
			self.write(b);
		}
		self.end_transmission()
	}

	fn write_page(&mut self, geometry: &Geometry, address: usize, data: &[u8]) -> Result<(), PageError> {
		assert!(data.len() <= geometry.max_write_len);
		trace!("writing {} bytes to address 0x{:02x}", data.len(), address);

		match self.write_address_and_buffer(geometry, address, data) {
			EndStatus::Success => Ok(()),
			status => Err(PageError::Transmission(status)),
		}
	}

	/// target bytes are only modified if the full page was received
	fn read_page(&mut self, geometry: &Geometry, address: usize, target: &mut [u8]) -> Result<(), PageError> {
		assert!(target.len() <= geometry.max_read_len);
		let len = target.len();
		trace!("read page {} bytes from address 0x{:02x}", len, address);

		// set address pointer
		let status = self.write_address_and_buffer(geometry, address, &[]);
		if !status.is_success() {
			return Err(PageError::Transmission(status));
		}

		self.request_from(geometry.bus_address, len);
		for _ in 0..geometry.poll_attempts {
			if self.available() != 0 {
				break;
			}
			self.delay(geometry.poll_interval);
		}

		let available = self.available();
		if available < len {
			return Err(PageError::Unavailable {
				requested: len,
				available,
			});
		}

		let received = (0..len)
			.map(|_| self.read())
			.collect::<Option<Vec<u8>>>()
			.ok_or(PageError::Unavailable {
				requested: len,
				available,
			})?;
		target.copy_from_slice(&received);

		Ok(())
	}
}
impl<W: TwoWire + ?Sized> TwoWirePageExt for W {}
