#![deny(unsafe_code)]
#![deny(warnings)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;
use rtic_monotonics::stm32::prelude::*;

mod adapters;
mod device_id;
mod eth;
mod net;
mod variant;

stm32_tim2_monotonic!(Mono, 1_000_000);

#[app(device = embassy_stm32, peripherals = true, dispatchers = [USART1, USART2, USART3])]
mod app {
    use super::*;
    use defmt::info;
    use embassy_futures::join::join3;
    use embassy_stm32::exti::ExtiInput;
    use embassy_stm32::gpio::{Level, Output, Pull, Speed};
    use embassy_stm32::i2c::I2c;
    use embassy_stm32::mode::Blocking;
    use embassy_stm32::peripherals;
    use embassy_stm32::rcc::{Hse, HseMode};
    use embassy_stm32::spi::{self, Spi};
    use embassy_stm32::time::Hertz;
    use rtic_sync::channel::{Receiver, Sender};
    use rtic_sync::make_channel;
    use weathermod_core::{CycleIo, SampleCycle};

    use crate::adapters::{
        Bme280Sensor, LedIndicator, MonoClock, NetLink, NodeProvisioning, QueuedPublisher,
    };
    use crate::net::{MqttConfig, NetShared, NetworkConfig, OutboundMessage, SntpConfig,
        OUTBOUND_DEPTH};

    /// Network state shared between the session task and the sample task.
    static NET_SHARED: NetShared = NetShared::new();

    type SpiPeripheral = embassy_stm32::Peri<'static, peripherals::SPI2>;
    type PinPB13 = embassy_stm32::Peri<'static, peripherals::PB13>;
    type PinPB15 = embassy_stm32::Peri<'static, peripherals::PB15>;
    type PinPB14 = embassy_stm32::Peri<'static, peripherals::PB14>;
    type PinPC6 = embassy_stm32::Peri<'static, peripherals::PC6>;
    type PinPC3 = embassy_stm32::Peri<'static, peripherals::PC3>;
    type PinPC2 = embassy_stm32::Peri<'static, peripherals::PC2>;
    type ExtiChannel = embassy_stm32::Peri<'static, peripherals::EXTI2>;
    type DmaTx = embassy_stm32::Peri<'static, peripherals::DMA1_CH4>;
    type DmaRx = embassy_stm32::Peri<'static, peripherals::DMA1_CH3>;

    struct NetPeripherals {
        spi: SpiPeripheral,
        sck: PinPB13,
        mosi: PinPB15,
        miso: PinPB14,
        cs: PinPC6,
        reset: PinPC3,
        int: PinPC2,
        exti: ExtiChannel,
        dma_tx: DmaTx,
        dma_rx: DmaRx,
    }

    #[shared]
    struct Shared {}

    #[local]
    struct Local {}

    #[init]
    fn init(_cx: init::Context) -> (Shared, Local) {
        info!("weather-node starting ({})", variant::NODE_NAME);

        // Adafruit Feather STM32F405: 12 MHz HSE
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // HSE (12 MHz) / PREDIV(6) = 2 MHz (PLL input)
        // 2 MHz * MUL(168) = 336 MHz (VCO)
        // VCO / DIVP(4) = 84 MHz (SYSCLK)
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: None,
            divr: None,
        });
        config.rcc.sys = embassy_stm32::rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = embassy_stm32::rcc::AHBPrescaler::DIV1; // 84 MHz
        config.rcc.apb1_pre = embassy_stm32::rcc::APBPrescaler::DIV2; // 42 MHz
        config.rcc.apb2_pre = embassy_stm32::rcc::APBPrescaler::DIV1; // 84 MHz

        let p = embassy_stm32::init(config);

        // TIM2 on APB1: timer clock = 2*APB1 when prescaler != 1
        // APB1 = 42 MHz, TIM2 = 84 MHz
        let timer_clock_hz = 84_000_000;
        Mono::start(timer_clock_hz);
        info!("TIM2 monotonic timer initialized at 1 MHz");

        // Indicator LED, owned by the sample cycle from here on.
        let led = Output::new(p.PC1, Level::Low, Speed::Low);

        let i2c = I2c::new_blocking(p.I2C1, p.PB6, p.PB7, Hertz(100_000), Default::default());

        let net_periph = NetPeripherals {
            spi: p.SPI2,
            sck: p.PB13,
            mosi: p.PB15,
            miso: p.PB14,
            cs: p.PC6,
            reset: p.PC3,
            int: p.PC2,
            exti: p.EXTI2,
            dma_tx: p.DMA1_CH4,
            dma_rx: p.DMA1_CH3,
        };

        let (sender, receiver) = make_channel!(OutboundMessage, OUTBOUND_DEPTH);

        net_task::spawn(net_periph, receiver).ok();
        sample_task::spawn(sender, led, i2c).ok();

        (Shared {}, Local {})
    }

    /// Sample task - drives the tick-based cycle against the port adapters
    ///
    /// The cycle decides what to do; this task only sleeps out the waits it
    /// returns on the TIM2 monotonic.
    #[task(priority = 1)]
    async fn sample_task(
        _cx: sample_task::Context,
        sender: Sender<'static, OutboundMessage, OUTBOUND_DEPTH>,
        led: Output<'static>,
        i2c: I2c<'static, Blocking>,
    ) -> ! {
        info!("Sample task started");

        let mut clock = MonoClock::new(&NET_SHARED);
        let mut network = NetLink::new(&NET_SHARED);
        let mut sensor = Bme280Sensor::new(i2c);
        let mut publisher = QueuedPublisher::new(sender.clone());
        let mut indicator = LedIndicator::new(led);
        let mut provisioning = NodeProvisioning::new(sender);
        let mut cycle = SampleCycle::new(variant::cycle_config());

        loop {
            let wait = {
                let mut io = CycleIo {
                    clock: &mut clock,
                    net: &mut network,
                    sensor: &mut sensor,
                    publisher: &mut publisher,
                    indicator: &mut indicator,
                    provisioning: &mut provisioning,
                };
                cycle.tick(&mut io)
            };
            if wait > 0 {
                Mono::delay(u64::from(wait).millis()).await;
            }
        }
    }

    /// Network task - owns the stack and the messaging session
    ///
    /// Stack is !Send and must remain within this task.
    #[task(priority = 1)]
    async fn net_task(
        _cx: net_task::Context,
        periph: NetPeripherals,
        mut receiver: Receiver<'static, OutboundMessage, OUTBOUND_DEPTH>,
    ) -> ! {
        use embassy_net::{Config, StackResources};
        use static_cell::StaticCell;

        info!("Network task started");

        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(10_000_000); // 10 MHz for W5500

        let spi = Spi::new(
            periph.spi,
            periph.sck,
            periph.mosi,
            periph.miso,
            periph.dma_tx,
            periph.dma_rx,
            spi_config,
        );

        let cs = Output::new(periph.cs, Level::High, Speed::VeryHigh);
        let reset = Output::new(periph.reset, Level::High, Speed::Low);
        let int = ExtiInput::new(periph.int, periph.exti, Pull::Up);

        let eth_periph = eth::EthPeripherals {
            spi,
            cs,
            reset,
            int,
        };

        let net_config = NetworkConfig::default();
        let (device, w5500_runner) = eth::init_w5500(eth_periph, net_config.mac_addr).await;
        NET_SHARED
            .link_up
            .store(true, core::sync::atomic::Ordering::Relaxed);

        // DHCP + DNS + one TCP + one UDP socket
        static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
        let (stack, mut net_runner) = embassy_net::new(
            device,
            Config::dhcpv4(Default::default()),
            RESOURCES.init(StackResources::new()),
            net_config.seed,
        );
        info!("Network stack initialized with DHCP");

        let session = net::run_session(
            &stack,
            &NET_SHARED,
            &mut receiver,
            MqttConfig::default(),
            SntpConfig::default(),
        );

        join3(w5500_runner.run(), net_runner.run(), session).await;
    }

    /// RTIC idle task - WFI sleep mode when no tasks active
    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        info!("Idle task started - entering WFI loop");
        loop {
            cortex_m::asm::wfi();
        }
    }
}
