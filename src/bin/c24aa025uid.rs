#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate c24aa025uid;
use c24aa025uid::*;

use std::io::{
	self,
	Write,
};
use std::process::exit;
use std::time::Duration;

use c24aa025uid::wire::{
	LinuxTwoWire,
	SimulatedChip,
	TwoWire,
	reliable_sleep,
};

const DEFAULT_BUS: &str = "/dev/i2c-1";

// where the exerciser stores its sequences
const SEQUENCE_ADDRESS: usize = 0x08;

const SEQUENCE_LEN: usize = 92;

const SEQUENCES: [&[u8; SEQUENCE_LEN]; 3] = [
	b"sequence asd ds qwedaxdcxz sadd a sequence asd cxz sadd a sequence asd ds qwedaxdcxz sadd a\0",
	b"sequence b b b b b  b b b b b b b sequence b b  b b b b b sequence b b b b b  b b b b b b b\0",
	b"sequence c c c c c  c c c c c c c sequence c c  c c c c c sequence c c c c c  c c c c c c c\0",
];

fn parse_number(value: &str) -> AResult<usize> {
	let value = value.trim();
	let result = if value.starts_with("0x") || value.starts_with("0X") {
		usize::from_str_radix(&value[2..], 16)
	} else {
		value.parse::<usize>()
	};
	Ok(result?)
}

// global arguments may be given before or after the subcommand
fn global_flag(matches: &clap::ArgMatches, name: &str) -> bool {
	matches.is_present(name) || matches.subcommand().1.map_or(false, |m| m.is_present(name))
}

fn global_value<'a>(matches: &'a clap::ArgMatches, name: &str) -> Option<&'a str> {
	matches.value_of(name).or_else(|| matches.subcommand().1.and_then(|m| m.value_of(name)))
}

fn get_number(matches: &clap::ArgMatches, name: &str) -> AResult<usize> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	parse_number(param).map_err(|e| {
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_number_or(matches: &clap::ArgMatches, name: &str, default: usize) -> AResult<usize> {
	if matches.is_present(name) {
		get_number(matches, name)
	} else {
		Ok(default)
	}
}

fn parse_hex_bytes(value: &str) -> AResult<Vec<u8>> {
	let digits: Vec<char> = value.chars().filter(|c| !c.is_whitespace()).collect();
	ensure!(digits.len() % 2 == 0, "odd number of hex digits in {:?}", value);
	digits.chunks(2).map(|pair| {
		let s: String = pair.iter().collect();
		u8::from_str_radix(&s, 16).map_err(|e| format_err!("invalid hex byte {:?}: {}", s, e))
	}).collect()
}

fn print_hex(start: usize, data: &[u8]) {
	for i in 0..data.len() {
		let address = start + i;
		if i == 0 || 0 == address % 16 {
			if i != 0 {
				println!("");
			}
			print!("{:04x} ", address);
			// align first line
			for _ in 0..(address % 16) {
				print!("   ");
			}
		} else if 0 == address % 8 {
			print!(" ");
		}
		print!(" {:02x}", data[i]);
	}
	if !data.is_empty() {
		println!("");
	}
}

fn as_text(data: &[u8]) -> String {
	let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
	String::from_utf8_lossy(&data[..end]).into_owned()
}

fn info<W: TwoWire>(ee: &mut Eeprom<W>) -> AResult<()> {
	let init = ee.init();
	let identity = ee.identity()?;
	println!("{}", identity);
	init?;
	println!("Chip verified successfully");

	Ok(())
}

fn read<W: TwoWire>(ee: &mut Eeprom<W>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_number(sub_m, "ADDRESS")?;
	let len = get_number(sub_m, "LENGTH")?;
	ee.check_read(address, len)?;

	let mut buf = vec![0u8; len];
	ee.read(address, &mut buf)?;
	print_hex(address, &buf);

	Ok(())
}

fn dump<W: TwoWire>(ee: &mut Eeprom<W>, sub_m: &clap::ArgMatches) -> AResult<()> {
	// largest range the read window allows
	let mut buf = vec![0u8; ee.geometry().read_end - 1];
	ee.read(0, &mut buf)?;

	if sub_m.is_present("raw") {
		io::stdout().write_all(&buf)?;
	} else {
		print_hex(0, &buf);
	}

	Ok(())
}

fn write<W: TwoWire>(ee: &mut Eeprom<W>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_number(sub_m, "ADDRESS")?;
	let value = match sub_m.value_of("DATA") {
		Some(v) => v,
		None => bail!("missing parameter DATA"),
	};
	let data = if sub_m.is_present("hex") {
		parse_hex_bytes(value)?
	} else {
		value.as_bytes().to_vec()
	};

	ee.write(address, &data)?;

	// verify
	let mut buf = vec![0u8; data.len()];
	ee.read(address, &mut buf)?;
	ensure!(buf == data, "Verify failed at 0x{:02x}: wrote {:02x?}, read {:02x?}", address, data, buf);
	info!("Wrote {} bytes at 0x{:02x}", data.len(), address);

	Ok(())
}

fn exercise<W: TwoWire>(ee: &mut Eeprom<W>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let cycles = get_number_or(sub_m, "cycles", 40)?;
	let interval = Duration::from_millis(get_number_or(sub_m, "interval", 500)? as u64);

	let mut expected: Option<&[u8; SEQUENCE_LEN]> = None;
	let mut mismatches = 0usize;

	for cycle in 0..cycles {
		reliable_sleep(interval);

		let sequence = match cycle {
			4 => Some(SEQUENCES[0]),
			20 => Some(SEQUENCES[1]),
			30 => Some(SEQUENCES[2]),
			_ => None,
		};

		if cycle % 10 == 1 {
			let mut buf = [0u8; SEQUENCE_LEN];
			if let Err(e) = ee.read(SEQUENCE_ADDRESS, &mut buf) {
				error!("cycle {}: read failed: {}", cycle, e);
				continue;
			}
			println!("reading from address: {}", as_text(&buf));
			if let Some(expected) = expected {
				if buf != *expected {
					warn!("cycle {}: read back differs from last written sequence", cycle);
					mismatches += 1;
				}
			}
		} else if let Some(sequence) = sequence {
			println!("writing sequence to address: {}", as_text(sequence));
			match ee.write(SEQUENCE_ADDRESS, &sequence[..]) {
				Ok(()) => expected = Some(sequence),
				Err(e) => error!("cycle {}: write failed: {}", cycle, e),
			}
		}
	}

	ensure!(mismatches == 0, "{} read backs didn't match the written sequence", mismatches);

	Ok(())
}

fn run<W: TwoWire>(matches: &clap::ArgMatches, bus: W) -> AResult<()> {
	let mut ee = Eeprom::new(bus);

	if let ("info", _) = matches.subcommand() {
		return info(&mut ee);
	}

	if let Err(e) = ee.init() {
		if !global_flag(matches, "force") {
			bail!("Chip identification failed: {} (use --force to continue anyway)", e);
		}
		warn!("Chip identification failed: {}", e);
	}

	match matches.subcommand() {
		("read", Some(sub_m)) => {
			read(&mut ee, sub_m)
		},
		("dump", Some(sub_m)) => {
			dump(&mut ee, sub_m)
		},
		("write", Some(sub_m)) => {
			write(&mut ee, sub_m)
		},
		("exercise", Some(sub_m)) => {
			exercise(&mut ee, sub_m)
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg bus: -b --bus +takes_value +global "i2c device to use (default: /dev/i2c-1)")
		(@arg simulate: -s --simulate +global "use a simulated chip instead of real hardware")
		(@arg force: -f --force +global "continue even if chip identification fails")
		(@subcommand info =>
			(about: "verify chip and show identification")
		)
		(@subcommand read =>
			(about: "read range and show it as hex dump")
			(@arg ADDRESS: +required "start address (decimal or 0x hex)")
			(@arg LENGTH: +required "number of bytes")
		)
		(@subcommand dump =>
			(about: "dump readable memory")
			(@arg raw: -r --raw "write binary to stdout")
		)
		(@subcommand write =>
			(about: "write data and verify it")
			(@arg hex: -x --hex "DATA is hex encoded")
			(@arg ADDRESS: +required "start address (decimal or 0x hex)")
			(@arg DATA: +required "text to write")
		)
		(@subcommand exercise =>
			(about: "periodically write and read back test sequences")
			(@arg cycles: -n --cycles +takes_value "number of cycles (default: 40)")
			(@arg interval: -i --interval +takes_value "milliseconds between cycles (default: 500)")
		)
	).get_matches();

	if global_flag(&matches, "simulate") {
		run(&matches, SimulatedChip::new())
	} else {
		let path = global_value(&matches, "bus").unwrap_or(DEFAULT_BUS);
		let bus = LinuxTwoWire::open(path)?;
		debug!("using i2c device {}", bus.path().display());
		run(&matches, bus)
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
