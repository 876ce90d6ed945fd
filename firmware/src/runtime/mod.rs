use cortex_m::interrupt as cpu;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, SendSpawner, SpawnError, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use static_cell::StaticCell;

use crate::context::Shared;
use crate::hw::adc::DieTemperature;
use crate::hw::buzzer::Buzzer;
use crate::hw::{BoardShared, GpioButton, OfflineModem};

mod tasks;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cpu::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cpu::enable();
            }
        }
    }
}

/// Runs cloud delivery, audio, and command polling above thread mode.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

static SHARED: StaticCell<BoardShared> = StaticCell::new();

#[interrupt]
unsafe fn SWPMI1() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let hal::Peripherals {
        PA0,
        PA8,
        PB3,
        ADC1,
        ..
    } = hal::init(hal::Config::default());

    let mut status_led = Output::new(PB3, Level::Low, Speed::Low);
    let button = GpioButton::new(Input::new(PA0, Pull::Up));
    let buzzer = Buzzer::new(Output::new(PA8, Level::Low, Speed::Low));
    let sensor = DieTemperature::new(Adc::new(ADC1));

    let shared: &'static BoardShared = SHARED.init(Shared::new(sensor, OfflineModem::new(), buzzer));

    interrupt::SWPMI1.set_priority(Priority::P6);
    let high = EXECUTOR_HIGH.start(interrupt::SWPMI1);

    if let Err(error) = spawn_all(high, spawner, shared, button) {
        defmt::error!("runtime: task spawn failed: {}", defmt::Debug2Format(&error));
        halt(&mut status_led);
    }
    status_led.set_high();

    core::future::pending::<()>().await;
}

fn spawn_all(
    high: SendSpawner,
    low: Spawner,
    shared: &'static BoardShared,
    button: GpioButton<'static>,
) -> Result<(), SpawnError> {
    high.spawn(tasks::cloud(shared))?;
    high.spawn(tasks::audio(shared))?;
    high.spawn(tasks::command(shared))?;
    low.spawn(tasks::orchestrator(shared, button))?;
    low.spawn(tasks::sensor(shared))?;
    low.spawn(tasks::config_watch(shared))?;
    Ok(())
}

/// Blinks the status LED forever; the task set is incomplete.
fn halt(led: &mut Output<'_>) -> ! {
    loop {
        led.toggle();
        cortex_m::asm::delay(2_000_000);
    }
}
