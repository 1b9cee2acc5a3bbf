//! Prometheus metrics for the temperature controller.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use thermo_core::{tags, LoopSnapshot};
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Process State Metrics
// ============================================================================

/// Last sampled temperature in Celsius
pub static TEMPERATURE_C: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::TEMPERATURE_C.metric, "Last sampled temperature in Celsius")
        .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Operator target temperature in Celsius
pub static TARGET_TEMP_C: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::TARGET_TEMP_C.metric,
        "Operator target temperature in Celsius",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Heater decision of the last sample (1 = on, 0 = off)
pub static HEATER_ON: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::HEATER_ON.metric,
        "Heater decision of the last sample (1=on, 0=off)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Configured sampling interval in seconds
pub static SAMPLE_INTERVAL_S: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::SAMPLE_INTERVAL_S.metric,
        "Configured sampling interval in seconds",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Sampling Counters
// ============================================================================

/// Completed samples
pub static SAMPLES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(tags::SAMPLES.metric, "Completed sensor samples").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Dropped sampling cycles
pub static READ_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        tags::READ_FAILURES.metric,
        "Sampling cycles dropped because the sensor read failed",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Mirror a loop snapshot into the metrics. Counters advance by the delta
/// against what they already hold.
pub fn record_snapshot(snapshot: &LoopSnapshot) {
    if let Some(reading) = snapshot.last_reading {
        TEMPERATURE_C.set(reading.temperature_c);
        HEATER_ON.set(if reading.heater_on { 1.0 } else { 0.0 });
    }
    TARGET_TEMP_C.set(snapshot.target_temp_c);
    SAMPLE_INTERVAL_S.set(f64::from(snapshot.interval_s));

    let samples = SAMPLES.get();
    if snapshot.samples > samples {
        SAMPLES.inc_by(snapshot.samples - samples);
    }
    let failures = READ_FAILURES.get();
    if snapshot.read_failures > failures {
        READ_FAILURES.inc_by(snapshot.read_failures - failures);
    }
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();

                    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let mut response = Response::from_data(buffer);
                    if let Ok(header) = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/plain; version=0.0.4"[..],
                    ) {
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once a sample has been taken
                    if SAMPLES.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = TEMPERATURE_C.get();
    let _ = TARGET_TEMP_C.get();
    let _ = HEATER_ON.get();
    let _ = SAMPLE_INTERVAL_S.get();
    let _ = SAMPLES.get();
    let _ = READ_FAILURES.get();
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermo_core::SensorReading;

    #[test]
    fn snapshot_updates_gauges_and_counters() {
        init_metrics();
        let snapshot = LoopSnapshot {
            timestamp_ms: 10,
            last_reading: Some(SensorReading {
                timestamp_ms: 10,
                temperature_c: 20.0,
                heater_on: true,
            }),
            target_temp_c: 21.5,
            interval_s: 5,
            samples: 3,
            read_failures: 1,
        };
        record_snapshot(&snapshot);
        record_snapshot(&snapshot);

        assert_eq!(TEMPERATURE_C.get(), 20.0);
        assert_eq!(HEATER_ON.get(), 1.0);
        assert_eq!(SAMPLE_INTERVAL_S.get(), 5.0);
        assert_eq!(SAMPLES.get(), 3);
        assert_eq!(READ_FAILURES.get(), 1);

        let families = REGISTRY.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == tags::TARGET_TEMP_C.metric));
    }
}
