//! Loopback demo on the simulated driver: open an adapter, start a channel,
//! send a few frames and read them back, then print the diagnostics.
use cancmd::{
    Bitrate, BusTimer, CanFrame, ChannelConfig, DeviceRegistry, DeviceType, SimDriver,
    device::info::format_version,
};
use embassy_time::Duration;

#[derive(Clone, Copy)]
struct TokioTimer;

impl BusTimer for TokioTimer {
    async fn delay(&self, duration: Duration) {
        tokio::time::sleep(std::time::Duration::from_micros(duration.as_micros())).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), cancmd::CanError> {
    let driver = SimDriver::loopback().with_adapter(DeviceType::UsbCanE2Ch);
    let registry = DeviceRegistry::new(driver, TokioTimer);

    let device = registry.open(DeviceType::UsbCanE2Ch, 0, "loopback-demo")?;
    let info = device.info()?;
    println!(
        "{} serial={} hw={} fw={} channels={}",
        device.device_type(),
        info.serial_number().as_str().unwrap_or("?"),
        format_version(info.hardware_version()),
        format_version(info.firmware_version()),
        info.channel_count()
    );

    let channel = device.start_channel(0, ChannelConfig::new(Bitrate::Kbps500))?;
    let frames = [
        CanFrame::from_raw_id(0x123, false, &[1, 2, 3])?,
        CanFrame::from_raw_id(0x18FE_F100, true, &[0xFF; 8])?,
    ];
    let queued = channel.send_all(&frames)?;
    println!("queued {queued} frame(s)");

    for frame in channel.receive(frames.len(), 1000).await? {
        println!(
            "rx id={:#X} ext={} data={:02X?} t={}",
            frame.raw_id(),
            frame.is_extended(),
            frame.data(),
            frame.timestamp()
        );
    }

    let errors = channel.take_error_info()?;
    println!("error code: {:?}", errors.code);

    device.stop_channel(0)?;
    registry.close(&device)
}
