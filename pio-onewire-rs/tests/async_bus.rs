use embedded_hal_mock::eh1::delay::NoopDelay;
use futures::executor::block_on;
use pio_onewire::{
    EngineError, OneWireAsync, OneWireError, OneWireMasterBuilder, OneWireSearchAsync,
    OneWireSearchKind, PresenceResult, RomId, crc8,
    sim::{READ_SCRATCHPAD_CMD, SimDevice, SimPin, SimulatedEngine},
};

fn rom(family: u8, last: u8) -> RomId {
    let mut bytes = [family, 0x11, 0x22, 0x33, 0x44, 0x55, last, 0];
    bytes[7] = crc8(&bytes[..7]);
    RomId::new(bytes)
}

#[test]
fn discovery() {
    block_on(async {
        let devs = [rom(0x28, 1), rom(0x28, 2), rom(0x3b, 1)];
        let mut engine = SimulatedEngine::new();
        for dev in devs {
            engine.add_device(SimDevice::new(dev)).unwrap();
        }
        let mut bus = OneWireMasterBuilder::default()
            .build_async(engine, SimPin::new(), NoopDelay::new())
            .await
            .unwrap();
        let found = bus.search::<8>().await.unwrap();
        assert_eq!(found.len(), 3);
        for dev in devs {
            assert!(found.devices.contains(&dev));
        }
        let stats = bus.engine().stats();
        assert_eq!(stats.queue_full_events, 0);
        assert!(stats.max_outbound_depth <= 1);
    });
}

#[test]
fn scratchpad_and_verify() {
    block_on(async {
        let dev = rom(0x28, 9);
        let engine =
            SimulatedEngine::new().with_device(SimDevice::new(dev).with_temperature_raw(0x0550));
        let mut bus = OneWireMasterBuilder::default()
            .with_pullup(false)
            .build_async(engine, SimPin::new(), NoopDelay::new())
            .await
            .unwrap();
        bus.address(Some(dev)).await.unwrap();
        bus.write_byte(READ_SCRATCHPAD_CMD).await.unwrap();
        let mut pad = [0; 9];
        bus.read_bytes_checked(&mut pad).await.unwrap();
        assert_eq!(&pad[..2], &[0x50, 0x05]);

        let mut search = OneWireSearchAsync::new(&mut bus, OneWireSearchKind::Normal);
        assert!(search.verify(dev).await.unwrap());
        let (_, pin, _) = bus.release();
        assert!(pin.is_idle());
        assert!(!pin.pull_up());
    });
}

#[test]
fn empty_and_stalled() {
    block_on(async {
        let mut bus = OneWireMasterBuilder::default()
            .build_async(SimulatedEngine::new(), SimPin::new(), NoopDelay::new())
            .await
            .unwrap();
        assert_eq!(bus.reset().await.unwrap(), PresenceResult::NoDevice);

        let engine = SimulatedEngine::new()
            .with_device(SimDevice::new(rom(0x28, 1)))
            .with_stall_after(0);
        let mut bus = OneWireMasterBuilder::default()
            .build_async(engine, SimPin::new(), NoopDelay::new())
            .await
            .unwrap();
        assert_eq!(
            bus.read_bit().await,
            Err(OneWireError::BusFault(EngineError::Timeout))
        );
    });
}
