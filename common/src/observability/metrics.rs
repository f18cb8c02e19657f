//! Prometheus metrics for the playout engine.
//!
//! Each process builds one [`MetricsContext`]. Handles are cheap clones of
//! the registered collectors, so the render thread only ever increments
//! counters and observes histograms; encoding happens on the scrape task.

use anyhow::Result;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const NAMESPACE: &str = "synced_playout";

/// Render callback durations, 10 µs to 10 ms.
const RENDER_BUCKETS: [f64; 7] = [0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01];

/// Where the scrape endpoint listens.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    // ---
    /// e.g. `127.0.0.1:9200`
    pub bind: SocketAddr,
}

impl MetricsServerConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self { bind }
    }
}

/// Registry plus typed handles for every playout metric.
///
/// All names are prefixed `synced_playout_` and carry a constant
/// `process` label.
#[derive(Clone)]
pub struct MetricsContext {
    // ---
    registry: Registry,

    /// Frames accepted into the jitter buffer
    pub frames_enqueued_total: IntCounter,

    pub frames_played_total: IntCounter,
    pub frames_stale_total: IntCounter,
    pub underrun_blocks_total: IntCounter,
    pub decode_failures_total: IntCounter,
    pub sink_failures_total: IntCounter,
    pub transport_commands_total: IntCounter,

    /// Frames buffered after the last render
    pub jitter_buffer_occupancy_frames: IntGauge,

    /// Wall time spent in one render callback
    pub render_seconds: Histogram,
}

impl MetricsContext {
    // ---
    /// Builds a registry labelled `process=<process_name>` and registers
    /// every playout metric in it.
    pub fn new(process_name: &str) -> Result<Self> {
        // ---
        let labels = prometheus::labels! { "process".to_string() => process_name.to_string() };
        let registry = Registry::new_custom(Some(NAMESPACE.into()), Some(labels))?;

        let counter = |name: &str, help: &str| -> Result<IntCounter> {
            register(&registry, IntCounter::with_opts(Opts::new(name, help))?)
        };

        Ok(Self {
            frames_enqueued_total: counter(
                "frames_enqueued_total",
                "Frames accepted into the jitter buffer",
            )?,
            frames_played_total: counter(
                "frames_played_total",
                "Frames rendered to the audio sink",
            )?,
            frames_stale_total: counter(
                "frames_stale_total",
                "Frames dropped for being more than one block behind the clock",
            )?,
            underrun_blocks_total: counter(
                "underrun_blocks_total",
                "Render blocks filled with silence because no frame was due",
            )?,
            decode_failures_total: counter(
                "decode_failures_total",
                "Frames whose payload could not fill a render block",
            )?,
            sink_failures_total: counter(
                "sink_failures_total",
                "Audio sink init/start/stop failures",
            )?,
            transport_commands_total: counter(
                "transport_commands_total",
                "Transport control messages applied",
            )?,
            jitter_buffer_occupancy_frames: register(
                &registry,
                IntGauge::with_opts(Opts::new(
                    "jitter_buffer_occupancy_frames",
                    "Frames waiting in the jitter buffer",
                ))?,
            )?,
            render_seconds: register(
                &registry,
                Histogram::with_opts(
                    HistogramOpts::new("render_seconds", "Render callback duration in seconds")
                        .buckets(RENDER_BUCKETS.to_vec()),
                )?,
            )?,
            registry,
        })
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Current metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        // ---
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        Ok(buffer)
    }

    /// Serves `GET /metrics` on `cfg.bind` until the task is dropped or
    /// the listener fails.
    pub fn spawn_metrics_server(&self, cfg: MetricsServerConfig) -> JoinHandle<Result<()>> {
        // ---
        let metrics = self.clone();
        tokio::spawn(async move {
            let make_svc = make_service_fn(move |_conn| {
                let metrics = metrics.clone();
                async move {
                    Ok::<_, hyper::Error>(service_fn(move |req| {
                        let metrics = metrics.clone();
                        async move { Ok::<_, hyper::Error>(scrape(&metrics, &req)) }
                    }))
                }
            });

            info!("Serving metrics on http://{}/metrics", cfg.bind);
            Server::try_bind(&cfg.bind)?
                .serve(make_svc)
                .await
                .map_err(|e| anyhow::anyhow!("metrics server failed: {e}"))
        })
    }
}

fn register<C>(registry: &Registry, collector: C) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

fn scrape(metrics: &MetricsContext, req: &Request<Body>) -> Response<Body> {
    // ---
    let (status, body) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match metrics.encode() {
            Ok(buffer) => (StatusCode::OK, Body::from(buffer)),
            Err(e) => {
                warn!("Failed to encode metrics: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, Body::from("encode error"))
            }
        },
        _ => (StatusCode::NOT_FOUND, Body::from("not found")),
    };

    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    if status == StatusCode::OK {
        resp.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        );
    }
    resp
}
