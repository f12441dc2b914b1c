/// `TwoWire` on top of the linux i2c-dev interface (`/dev/i2c-N`)
///
/// i2c-dev can't split a transaction like a microcontroller peripheral
/// does, so transmissions are buffered until `end_transmission` and sent
/// with a single `write(2)`; `request_from` performs a single `read(2)` and
/// stages the result for `available` / `read`.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{
	Path,
	PathBuf,
};

use libc::{
	EREMOTEIO,
	ENXIO,
	c_ulong,
	c_void,
	ioctl,
};

use super::{
	EndStatus,
	TwoWire,
};

// from linux/i2c-dev.h
const I2C_SLAVE: c_ulong = 0x0703;

pub struct LinuxTwoWire {
	file: fs::File,
	path: PathBuf,
	target: Option<u8>,
	tx: Option<(u8, Vec<u8>)>,
	rx: VecDeque<u8>,
}

impl LinuxTwoWire {
	// TODO: exclusive open / file locking?
	pub fn open<P: AsRef<Path>>(path: P) -> crate::AResult<Self> {
		let path = path.as_ref().to_path_buf();
		let file = with_context!(("couldn't open i2c device {}", path.display()), {
			Ok(fs::OpenOptions::new()
				.read(true)
				.write(true)
				.open(&path)?)
		})?;

		Ok(LinuxTwoWire {
			file,
			path,
			target: None,
			tx: None,
			rx: VecDeque::new(),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn select(&mut self, address: u8) -> io::Result<()> {
		if self.target == Some(address) {
			return Ok(());
		}
		let res = unsafe {
			ioctl(self.file.as_raw_fd(), I2C_SLAVE as _, address as c_ulong)
		};
		if res < 0 {
			self.target = None;
			return Err(io::Error::last_os_error());
		}
		self.target = Some(address);
		Ok(())
	}

	fn send(&mut self, address: u8, bytes: &[u8]) -> io::Result<()> {
		self.select(address)?;
		let l = unsafe {
			libc::write(self.file.as_raw_fd(), bytes.as_ptr() as *const c_void, bytes.len())
		};
		if l < 0 {
			return Err(io::Error::last_os_error());
		}
		// i2c-dev pushes all data in one step or fails
		if l as usize != bytes.len() {
			return Err(io::Error::new(io::ErrorKind::Other, "failed to write whole buffer"));
		}
		Ok(())
	}

	fn receive(&mut self, address: u8, len: usize) -> io::Result<Vec<u8>> {
		self.select(address)?;
		let mut buf = vec![0u8; len];
		let l = unsafe {
			libc::read(self.file.as_raw_fd(), buf.as_mut_ptr() as *mut c_void, buf.len())
		};
		if l < 0 {
			return Err(io::Error::last_os_error());
		}
		buf.truncate(l as usize);
		Ok(buf)
	}
}

fn status_from_error(e: &io::Error) -> EndStatus {
	match e.raw_os_error() {
		Some(ENXIO) | Some(EREMOTEIO) => EndStatus::AddressNack,
		_ => EndStatus::from_code(4),
	}
}

impl TwoWire for LinuxTwoWire {
	fn begin(&mut self) {
		// device file already opened
		self.rx.clear();
		self.tx = None;
	}

	fn set_clock(&mut self, hz: u32) {
		debug!("{}: bus clock is configured by the adapter driver, ignoring request for {} Hz", self.path.display(), hz);
	}

	fn begin_transmission(&mut self, address: u8) {
		self.tx = Some((address, Vec::new()));
	}

	fn write(&mut self, data: u8) -> usize {
		match self.tx {
			Some((_, ref mut buf)) => {
				buf.push(data);
				1
			},
			None => 0,
		}
	}

	fn end_transmission(&mut self) -> EndStatus {
		let (address, bytes) = match self.tx.take() {
			Some(tx) => tx,
			None => return EndStatus::from_code(4),
		};
		match self.send(address, &bytes) {
			Ok(()) => EndStatus::Success,
			Err(e) => {
				debug!("{}: write to 0x{:02x} failed: {}", self.path.display(), address, e);
				status_from_error(&e)
			},
		}
	}

	fn request_from(&mut self, address: u8, len: usize) -> usize {
		self.rx.clear();
		match self.receive(address, len) {
			Ok(data) => {
				self.rx.extend(data);
				self.rx.len()
			},
			Err(e) => {
				debug!("{}: read from 0x{:02x} failed: {}", self.path.display(), address, e);
				0
			},
		}
	}

	fn available(&mut self) -> usize {
		self.rx.len()
	}

	fn read(&mut self) -> Option<u8> {
		self.rx.pop_front()
	}
}
