use std::str::FromStr;

use clap::Parser;
use embedded_hal::delay::DelayNs;
use fixed::types::I12F4;
use onewire_core::{OneWire, OneWireError, OneWireResult, RomId};
use pio_onewire::{
    OneWireMasterBuilder,
    sim::{
        CONVERT_T_CMD, MAX_DEVICES, READ_SCRATCHPAD_CMD, SimDevice, SimPin, SimulatedEngine,
    },
};

/// A simulated device given on the command line as `FAMILY:SERIAL`, both in hex.
#[derive(Debug, Clone, Copy)]
struct DeviceArg(RomId);

impl FromStr for DeviceArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, serial) = s
            .split_once(':')
            .ok_or_else(|| format!("expected FAMILY:SERIAL, got {s:?}"))?;
        let family = u8::from_str_radix(family, 16).map_err(|e| format!("family: {e}"))?;
        if serial.is_empty() || serial.len() > 12 {
            return Err(format!("serial must be 1 to 12 hex digits, got {serial:?}"));
        }
        let serial = u64::from_str_radix(serial, 16).map_err(|e| format!("serial: {e}"))?;
        let mut bytes = [0; 6];
        bytes.copy_from_slice(&serial.to_le_bytes()[..6]);
        Ok(Self(RomId::from_parts(family, bytes)))
    }
}

/// Discover simulated temperature sensors on a 1-Wire line and read them out
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Device on the line, as FAMILY:SERIAL in hex (e.g., 28:0000075a1b2c). Repeatable
    #[arg(short, long = "device", value_name = "FAMILY:SERIAL")]
    devices: Vec<DeviceArg>,
    /// Temperature measured by the device at the same position, in °C (default 85)
    #[arg(short, long, allow_negative_numbers = true)]
    celsius: Vec<f32>,
    /// Pin number of the 1-Wire line
    #[arg(short, long, default_value_t = 0)]
    pin: u8,
    /// Rescans after a bus fault before giving up
    #[arg(short, long, default_value_t = 3)]
    retries: u8,
    /// Polls of the line, 10 ms apart, while waiting for a temperature conversion
    #[arg(long, default_value_t = 100)]
    convert_polls: u32,
    /// Simulate a line shorted to ground
    #[arg(long)]
    stuck_low: bool,
}

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    // Parse command line arguments
    let args = Args::parse();
    // Populate the simulated line
    let mut engine = SimulatedEngine::new().with_stuck_low(args.stuck_low);
    let devices = if args.devices.is_empty() {
        vec![
            DeviceArg(RomId::from_parts(0x28, [0x2c, 0x1b, 0x5a, 0x07, 0x00, 0x00])),
            DeviceArg(RomId::from_parts(0x28, [0x91, 0x44, 0x02, 0x0c, 0x00, 0x00])),
        ]
    } else {
        args.devices.clone()
    };
    for (i, DeviceArg(rom)) in devices.into_iter().enumerate() {
        let celsius = args.celsius.get(i).copied().unwrap_or(85.0);
        let raw = I12F4::saturating_from_num(celsius).to_bits();
        if let Err(device) = engine.add_device(SimDevice::new(rom).with_measurement_raw(raw)) {
            log::warn!("Line full, leaving out {}", device.rom());
        }
    }
    // Create the bus master
    let mut bus = OneWireMasterBuilder::default()
        .with_pin(args.pin)
        .build(engine, SimPin::new(), linux_embedded_hal::Delay)
        .expect("Failed to start the 1-Wire master");
    let mut delay = linux_embedded_hal::Delay;
    for attempt in 0..=args.retries {
        match measure(&mut bus, &mut delay, args.convert_polls) {
            Ok(count) => {
                log::info!("Read {count} devices");
                return;
            }
            Err(e) if e.is_bus_fault() => {
                log::warn!("Bus fault ({e}), rescanning ({attempt}/{})", args.retries);
            }
            Err(e) => {
                log::error!("Read-out failed: {e}");
                std::process::exit(1);
            }
        }
    }
    log::error!("Giving up after {} rescans", args.retries);
    std::process::exit(1);
}

/// Enumerate the line, convert on every device at once, then read every scratchpad. Devices
/// whose scratchpad fails its CRC are skipped with a warning.
fn measure<T: OneWire, D: DelayNs>(
    bus: &mut T,
    delay: &mut D,
    polls: u32,
) -> OneWireResult<usize, T::BusError> {
    let found = bus.search::<MAX_DEVICES>()?;
    log::info!(
        "Found {} devices ({} with a bad ROM CRC)",
        found.len(),
        found.crc_failures.len()
    );
    if found.is_empty() {
        return Ok(0);
    }
    // Trigger temperature conversion
    if !trigger_conversion(bus, delay, polls)? {
        log::warn!("Conversion still running after {polls} polls, reading anyway");
    }
    for rom in found.iter() {
        bus.address(Some(*rom))?;
        bus.write_byte(READ_SCRATCHPAD_CMD)?;
        let mut buf = [0; 9];
        match bus.read_bytes_checked(&mut buf) {
            Ok(()) => {
                let temp = I12F4::from_le_bytes([buf[0], buf[1]]);
                let resolution = 9 + ((buf[4] >> 5) & 0x03);
                log::info!(
                    "ROM: {:x}, Temperature: {} ({}-bit)",
                    rom,
                    temp,
                    resolution
                );
            }
            Err(OneWireError::InvalidCrc) => {
                log::warn!("ROM: {:x}, scratchpad CRC mismatch", rom);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(found.len())
}

/// Broadcast CONVERT T and poll until every device releases the line. Returns whether the
/// conversion finished within `polls` polls.
fn trigger_conversion<T: OneWire, D: DelayNs>(
    bus: &mut T,
    delay: &mut D,
    polls: u32,
) -> OneWireResult<bool, T::BusError> {
    bus.address(None)?;
    bus.write_byte(CONVERT_T_CMD)?;
    for _ in 0..polls {
        delay.delay_ms(10);
        // Converting devices hold the line low
        if bus.read_byte()? == 0xff {
            return Ok(true);
        }
    }
    Ok(false)
}
