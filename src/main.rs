//! PVC Disk Labeler
//!
//! Watches PersistentVolumeClaims and mirrors their annotated labels onto
//! the GCE persistent disks backing them.

use clap::Parser;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pvc_disk_labeler::{
    DiskLabelReconciler, Error, GceClientConfig, GceDiskClient, PromActionRecorder, PvcWatcher,
    ReconcilerConfig, Result, WatcherConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// PVC Disk Labeler - mirrors PVC labels onto GCE persistent disks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// PVC annotation holding the desired disk labels (JSON object)
    #[arg(long, env = "LABEL_ANNOTATION", default_value = pvc_disk_labeler::watcher::DEFAULT_LABEL_ANNOTATION)]
    annotation: String,

    /// Restrict the watch to one namespace (all namespaces by default)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Seconds between label operation status checks
    #[arg(long, env = "POLL_INTERVAL", default_value = "1")]
    poll_interval_secs: u64,

    /// Seconds before giving up on a label operation
    #[arg(long, env = "POLL_TIMEOUT", default_value = "60")]
    poll_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting PVC Disk Labeler");
    info!("  Version: {}", pvc_disk_labeler::VERSION);
    info!("  Label annotation: {}", args.annotation);
    info!(
        "  Watch namespace: {}",
        args.namespace.as_deref().unwrap_or("(all)")
    );

    // Metrics registry and recorder
    let registry = Arc::new(Registry::new());
    let recorder = Arc::new(PromActionRecorder::register(&registry)?);

    // GCE client and reconciliation engine
    let gce = Arc::new(GceDiskClient::new(GceClientConfig::default())?);
    let reconciler = Arc::new(DiskLabelReconciler::new(
        gce,
        recorder,
        ReconcilerConfig {
            poll_interval: Duration::from_secs(args.poll_interval_secs),
            poll_timeout: Duration::from_secs(args.poll_timeout_secs),
        },
    ));

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_registry = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_registry).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Run the PVC watch loop
    let kube = kube::Client::try_default().await?;
    let watcher = PvcWatcher::new(
        kube,
        reconciler,
        WatcherConfig {
            annotation: args.annotation,
            namespace: args.namespace,
        },
    );
    watcher.run().await?;

    info!("Operator shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("kube=info".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid health server address: {}", e)))?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, registry: Arc<Registry>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => {
                            let metric_families = registry.gather();
                            let mut buffer = Vec::new();
                            let encoder = TextEncoder::new();
                            match encoder.encode(&metric_families, &mut buffer) {
                                Ok(()) => Response::builder()
                                    .status(StatusCode::OK)
                                    .header("Content-Type", encoder.format_type())
                                    .body(Body::from(buffer))
                                    .unwrap(),
                                Err(e) => Response::builder()
                                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                                    .body(Body::from(format!("encode error: {}", e)))
                                    .unwrap(),
                            }
                        }
                        _ => Response::builder()
                            .status(StatusCode::NOT_FOUND)
                            .body(Body::from("not found"))
                            .unwrap(),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid metrics server address: {}", e)))?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
