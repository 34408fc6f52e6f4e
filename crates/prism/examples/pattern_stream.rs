use std::{sync::Arc, time::Instant};

use prism::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let source = Arc::new(PatternSource::new(
        "bars",
        VideoMode::new(PixelFormat::Yuyv, 640, 480, 30),
    ));
    source.set_settings_json(r#"{"brightness": 70}"#)?;
    source.start();

    let sink = MjpegSink::with_settings(
        "stream",
        MjpegSettings {
            width: 320,
            height: 240,
            fps: 15,
            ..MjpegSettings::default()
        },
    );
    sink.set_source(Some(source.clone()));

    let started = Instant::now();
    let mut frames = 0;
    let mut bytes = 0;
    sink.stream(|event| {
        if let StreamEvent::Frame { jpeg, time } = event {
            frames += 1;
            bytes += jpeg.len();
            println!("#{frames:02} ts={time} jpeg={} bytes", jpeg.len());
            if frames == 30 {
                sink.stop();
            }
        }
        Ok(())
    })?;

    let elapsed = started.elapsed().as_secs_f64();
    let stats = source.core().pool_stats();
    println!(
        "streamed {frames} frames in {elapsed:.2}s, avg {} bytes; pool hits={} allocations={}",
        bytes / frames.max(1),
        stats.hits,
        stats.allocations
    );
    println!("settings: {}", source.settings_json());

    source.stop();
    Ok(())
}
