use dtu_core::app::Dtu;
use embassy_time::{Instant, Timer};

use super::{BoardLed, DTU_CONFIG, INVERTERS, SyncedClock};
use crate::radio::{DetachedPayload, DetachedRadio, PACKET_RING};
use crate::status;
use crate::telemetry::{LogListener, TelemetryLog};

type BoardDtu = Dtu<'static, DetachedRadio, DetachedPayload, SyncedClock, LogListener, BoardLed>;

#[embassy_executor::task]
pub async fn run(led: BoardLed) -> ! {
    let mut dtu: BoardDtu = Dtu::new(
        DTU_CONFIG,
        &PACKET_RING,
        DetachedRadio::new(),
        DetachedPayload,
        SyncedClock,
        LogListener,
        led,
    );

    for inverter in INVERTERS {
        match dtu.add_inverter(*inverter) {
            Ok(slot) => defmt::info!("dtu: inverter {=u64:x} in slot {}", inverter.serial, slot),
            Err(error) => defmt::warn!(
                "dtu: inverter {=u64:x} not added: {}",
                inverter.serial,
                defmt::Display2Format(&error)
            ),
        }
    }
    dtu.start().expect("standing chores fit the scheduler");

    let mut log = TelemetryLog::new();
    let mut published_at = None;
    loop {
        dtu.poll(Instant::now().as_millis());
        log.flush(&dtu.context().telemetry);

        let uptime = dtu.uptime_secs();
        if published_at != Some(uptime) {
            status::publish(&dtu.status());
            published_at = Some(uptime);
        }

        Timer::after_millis(1).await;
    }
}
