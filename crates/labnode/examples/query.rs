//! Print the identity and a few live readings of a Labnode.
//!
//! ```text
//! cargo run -p labnode --example query -- tcp://192.168.1.50:4223
//! ```

use labnode::device::{with_device, DeviceError, SessionConfig};
use labnode::transport::Endpoint;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint: Endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.1.50".to_string())
        .parse()?;

    with_device(endpoint, SessionConfig::default(), |handle| {
        Box::pin(async move {
            let device = handle.device();
            let identity = handle.identity();
            println!("driver:           {}", device.name());
            println!("api version:      {}", identity.api_version);
            println!("software version: {}", device.software_version().await?);
            println!("hardware version: {}", device.hardware_version().await?);
            println!("serial number:    {}", device.serial_number().await?);

            if let Some(pid) = handle.pid() {
                let (kp, ki, kd) = tokio::try_join!(pid.kp(), pid.ki(), pid.kd())?;
                println!("kp/ki/kd:         {kp} / {ki} / {kd}");
                println!("setpoint:         {}", pid.setpoint().await?);
                println!("enabled:          {}", pid.is_enabled().await?);
                println!("board temp:       {:.2} K", pid.board_temperature().await?);
                println!("humidity:         {:.1} %rH", pid.humidity().await?);
            }
            Ok::<(), DeviceError>(())
        })
    })
    .await?;
    Ok(())
}
