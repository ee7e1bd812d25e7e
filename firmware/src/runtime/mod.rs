use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use dtu_core::clock::TimeSource;
use dtu_core::config::{DtuConfig, InverterConfig};
use dtu_core::radio::StatusLed;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_time::Instant;

use crate::status;

mod dtu_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Installation settings.
const DTU_CONFIG: DtuConfig = DtuConfig::new();

/// Paired inverters, in slot order.
const INVERTERS: &[InverterConfig] = &[InverterConfig::new(0x1161_2345_6789)];

/// Producing indicator on the board LED.
pub(super) struct BoardLed {
    pin: Output<'static>,
}

impl StatusLed for BoardLed {
    fn set(&mut self, on: bool) {
        self.pin.set_level(if on { Level::High } else { Level::Low });
    }
}

/// Reads the epoch most recently published through [`status::publish_epoch`].
pub(super) struct SyncedClock;

impl TimeSource for SyncedClock {
    fn fetch_epoch(&mut self) -> Option<u32> {
        let uptime = u32::try_from(Instant::now().as_secs()).unwrap_or(u32::MAX);
        status::synced_epoch(uptime)
    }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals { PA5, .. } = hal::init(config);

    let led = BoardLed {
        pin: Output::new(PA5, Level::Low, Speed::Low),
    };

    spawner
        .spawn(dtu_task::run(led))
        .expect("failed to spawn DTU task");

    core::future::pending::<()>().await;
}
