use candle::{Device, Result};
use tracing_chrome::FlushGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if candle::utils::cuda_is_available() {
        Device::new_cuda(0)
    } else if candle::utils::metal_is_available() {
        Device::new_metal(0)
    } else {
        tracing::info!("running on CPU, build with `--features cuda` or `--features metal` for a GPU");
        Ok(Device::Cpu)
    }
}

/// Logs to stderr, filtered by `RUST_LOG` (default `info`). With `chrome_trace` the spans are also
/// written to a `trace-timestamp.json` file, flushed when the guard drops.
pub fn init_tracing(chrome_trace: bool) -> Option<FlushGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);
    if chrome_trace {
        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new().build();
        tracing_subscriber::registry()
            .with(fmt)
            .with(chrome_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(fmt).init();
        None
    }
}
