//! ASL gesture classification server binary.
//!
use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use asl_server::{
    build_router,
    classifier::{InputGeometry, TractClassifier},
    config::ServerConfig,
    detector::{LandmarkModelSpec, TractLandmarkDetector},
    labels::ClassLabelTable,
    landmarks::{LandmarkDetector, NoopDetector},
    meter::spawn_meter_logger,
    pipeline::{InferencePipeline, PipelineOptions},
    pool::InferencePool,
    AppState,
};
use clap::Parser;
use env_logger::TimestampPrecision;

fn load_detector(config: &ServerConfig) -> Result<Arc<dyn LandmarkDetector>> {
    if !config.variant.uses_detector() {
        return Ok(Arc::new(NoopDetector));
    }
    if !config.has_detector() {
        log::warn!("No landmark models configured, image requests run without landmarks");
        return Ok(Arc::new(NoopDetector));
    }

    let hand = config.hand_model.clone().map(|path| {
        let spec = LandmarkModelSpec::hand()
            .with_input_size(config.hand_input_size)
            .with_presence_threshold(config.presence_threshold);
        (path, spec)
    });
    let pose = config.pose_model.clone().map(|path| {
        let spec = LandmarkModelSpec::pose()
            .with_input_size(config.pose_input_size)
            .with_presence_threshold(config.presence_threshold);
        (path, spec)
    });

    Ok(Arc::new(
        TractLandmarkDetector::load(hand, pose).context("Failed to load landmark models")?,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    log::info!("Starting with {:?}", &config);

    let labels = ClassLabelTable::resolve(config.labels.clone(), config.labels_dir.as_deref())
        .context("Failed to resolve class labels")?;
    log::info!("Serving {} classes: {:?}", labels.len(), labels.labels());

    let geometry = InputGeometry {
        width: config.image_size,
        height: config.image_size,
        landmark_dim: config.landmark_dim,
    };
    let classifier = TractClassifier::load(&config.model, config.variant.fusion_mode(), geometry)
        .context("Failed to load classifier")?;
    let detector = load_detector(&config)?;

    let pipeline = InferencePipeline::new(
        config.variant,
        Arc::new(classifier),
        detector,
        Arc::new(labels),
        PipelineOptions::from(&config),
    )?;
    let pool = InferencePool::new(config.workers(), config.inference_timeout());
    log::info!("Serving the {:?} pipeline", pipeline.variant());
    let state = Arc::new(AppState::new(pipeline, pool, config.static_dir.clone()));

    spawn_meter_logger(config.meter_interval());

    let app = build_router(state);

    // Serve HTTP server
    let addr: SocketAddr = config.server_address.parse()?;
    log::info!("Listening on {addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
