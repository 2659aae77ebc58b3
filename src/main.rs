#![no_std]
#![no_main]

extern crate alloc;

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};
use static_cell::StaticCell;
use trouble_host::prelude::{appearance, ExternalController, GapConfig, PeripheralConfig};

use emg_sensor_rust_firmware::ble::{ChannelTransport, Server, SharedService};
use emg_sensor_rust_firmware::config::sampling::BODY_SENSOR_LOCATION;
use emg_sensor_rust_firmware::device::{format_device_name, DeviceName};
use emg_sensor_rust_firmware::gatt::SecurityReq;
use emg_sensor_rust_firmware::service::{MeasurementEvent, MeasurementService, NoHandler, ServiceConfig};
use emg_sensor_rust_firmware::tasks;

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

/// Static cell for esp-radio controller (needed for 'static lifetime)
static RADIO_CONTROLLER: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

/// Advertised name, formatted from the device ID at boot
static DEVICE_NAME: StaticCell<DeviceName> = StaticCell::new();

/// GATT server shared by the BLE task and the transport
static SERVER: StaticCell<Server<'static>> = StaticCell::new();

/// Measurement service shared by the BLE task and the sampler
static SERVICE: StaticCell<SharedService> = StaticCell::new();

/// Type alias for the BLE controller
type BleController = ExternalController<esp_radio::ble::controller::BleConnector<'static>, 10>;

#[esp_hal::main]
fn main() -> ! {
    // Initialise heap allocator for BLE support (64KB - BLE requires significant heap)
    esp_alloc::heap_allocator!(size: 64 * 1024);

    esp_println::logger::init_logger(log::LevelFilter::Info);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Read unique device ID from eFuse MAC address (last 3 bytes)
    let mac = esp_hal::efuse::Efuse::read_base_mac_address();
    let device_id: [u8; 3] = [mac[3], mac[4], mac[5]];

    // Initialise esp-radio for BLE support (must be after esp_rtos::start)
    let radio_controller = RADIO_CONTROLLER.init(
        esp_radio::init().expect("Failed to initialize esp-radio")
    );

    // Create BLE connector (ownership is passed to ExternalController)
    let ble_connector = esp_radio::ble::controller::BleConnector::new(
        radio_controller,
        peripherals.BT,
        esp_radio::ble::Config::default(),
    ).expect("Failed to initialize BLE connector");

    // Wrap in ExternalController for trouble-host compatibility
    let controller: BleController = ExternalController::new(ble_connector);

    // Create and run the embassy executor
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(async_main(spawner, controller, device_id));
    })
}

/// Log subscription changes from the measurement service
fn on_measurement_event(event: MeasurementEvent) {
    info!("Measurement: {:?}", event);
}

#[embassy_executor::task]
async fn async_main(spawner: Spawner, controller: BleController, device_id: [u8; 3]) {
    let device_name: &'static str = DEVICE_NAME.init(format_device_name(&device_id));

    // Create GATT server with GAP configuration
    let gap = GapConfig::Peripheral(PeripheralConfig {
        name: device_name,
        appearance: &appearance::heart_rate_sensor::GENERIC_HEART_RATE_SENSOR,
    });
    let server: &'static Server<'static> = match Server::new_with_config(gap) {
        Ok(s) => SERVER.init(s),
        Err(_) => {
            error!("BLE: GATT server setup failed");
            return;
        }
    };

    // Register the measurement service; failure here is fatal to startup
    let mut transport = ChannelTransport::new(server);
    let config = ServiceConfig {
        body_sensor_location: Some(BODY_SENSOR_LOCATION),
        measurement_cccd_write: SecurityReq::Open,
        ..ServiceConfig::new()
    }
    .with_event_handler(on_measurement_event as NoHandler);
    let service: &'static SharedService = match MeasurementService::init(config, &mut transport) {
        Ok(s) => SERVICE.init(s),
        Err(e) => {
            error!("Measurement service registration failed: {:?}", e);
            return;
        }
    };

    spawner.must_spawn(ble_host_task(controller, server, service, device_name, device_id));
    spawner.must_spawn(sampler_task(service, transport));
}

/// Task that manages BLE connectivity
///
/// This task handles BLE advertising, connections, and the GATT events and
/// notifications of the measurement service.
#[embassy_executor::task]
async fn ble_host_task(
    controller: BleController,
    server: &'static Server<'static>,
    service: &'static SharedService,
    device_name: &'static str,
    device_id: [u8; 3],
) {
    tasks::ble_task(controller, server, service, device_name, device_id).await;
}

/// Task that samples the sensor and sends measurement notifications
#[embassy_executor::task]
async fn sampler_task(service: &'static SharedService, transport: ChannelTransport<'static>) {
    tasks::sampler_task(service, transport).await;
}
