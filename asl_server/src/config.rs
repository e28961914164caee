//! Server configuration.
//!
//! Every option is a command line flag with an `ASL_*` environment variable
//! fallback.
use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::{
    formatter::CONFIDENCE_PRECISION, fusion::FusionMode, landmarks::LANDMARK_DIM,
    preprocess::ChannelOrder, preprocess::IMAGE_SIZE,
};

/// Canonical pipeline served by one process.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PipelineVariant {
    /// Image-only classifier on the whole frame.
    Image,
    /// Image-only classifier on the crop around the first detected hand.
    HandCrop,
    /// Image, skeleton overlay and landmark vector classifier.
    Multimodal,
}

impl PipelineVariant {
    pub fn fusion_mode(&self) -> FusionMode {
        match self {
            PipelineVariant::Image | PipelineVariant::HandCrop => FusionMode::Single,
            PipelineVariant::Multimodal => FusionMode::Triple,
        }
    }

    /// Whether this variant runs the landmark detector on images.
    pub fn uses_detector(&self) -> bool {
        !matches!(self, PipelineVariant::Image)
    }
}

#[derive(Parser, Clone, Debug)]
#[clap(author, version)]
pub struct ServerConfig {
    /// Address the HTTP server listens on
    #[clap(long, env = "ASL_SERVER_ADDRESS", default_value = "127.0.0.1:8000")]
    pub server_address: String,

    /// Path of the ONNX classifier
    #[clap(long, env = "ASL_MODEL", default_value = "models/asl_model.onnx")]
    pub model: PathBuf,

    /// Pipeline the classifier was trained for
    #[clap(long, env = "ASL_VARIANT", value_enum, default_value = "multimodal")]
    pub variant: PipelineVariant,

    /// Edge length of the square classifier image input
    #[clap(long, env = "ASL_IMAGE_SIZE", default_value_t = IMAGE_SIZE)]
    pub image_size: u32,

    /// Channel order of the classifier image input
    #[clap(long, env = "ASL_CHANNEL_ORDER", value_enum, default_value = "rgb")]
    pub channel_order: ChannelOrder,

    /// Comma separated class labels in model output order
    #[clap(long, env = "ASL_LABELS", value_delimiter = ',')]
    pub labels: Option<Vec<String>>,

    /// Training directory whose sorted sub-directory names are the labels
    #[clap(long, env = "ASL_LABELS_DIR")]
    pub labels_dir: Option<PathBuf>,

    /// Length of the landmark vector fed to multimodal classifiers
    #[clap(long, env = "ASL_LANDMARK_DIM", default_value_t = LANDMARK_DIM)]
    pub landmark_dim: usize,

    /// Pixels added around the hand bounding box before cropping
    #[clap(long, env = "ASL_PADDING_MARGIN", default_value_t = 20)]
    pub padding_margin: u32,

    /// Decimal digits kept in the reported confidence
    #[clap(long, env = "ASL_CONFIDENCE_PRECISION", default_value_t = CONFIDENCE_PRECISION)]
    pub confidence_precision: u32,

    /// Path of the ONNX hand landmark model
    #[clap(long, env = "ASL_HAND_MODEL")]
    pub hand_model: Option<PathBuf>,

    /// Input edge length of the hand landmark model
    #[clap(long, env = "ASL_HAND_INPUT_SIZE", default_value_t = 224)]
    pub hand_input_size: u32,

    /// Path of the ONNX pose landmark model
    #[clap(long, env = "ASL_POSE_MODEL")]
    pub pose_model: Option<PathBuf>,

    /// Input edge length of the pose landmark model
    #[clap(long, env = "ASL_POSE_INPUT_SIZE", default_value_t = 256)]
    pub pose_input_size: u32,

    /// Minimum presence score of a landmark detection
    #[clap(long, env = "ASL_PRESENCE_THRESHOLD", default_value_t = 0.5)]
    pub presence_threshold: f32,

    /// Directory with the static pages; uploads go to its `uploads` folder
    #[clap(long, env = "ASL_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Maximum number of concurrent inference jobs
    #[clap(long, env = "ASL_WORKERS")]
    pub workers: Option<usize>,

    /// Per-request limit for detection and classification
    #[clap(long, env = "ASL_INFERENCE_TIMEOUT_MS", default_value_t = 5000)]
    pub inference_timeout_ms: u64,

    /// Seconds between two meter log lines
    #[clap(long, env = "ASL_METER_INTERVAL_SECS", default_value_t = 10)]
    pub meter_interval_secs: u64,
}

impl ServerConfig {
    pub fn workers(&self) -> usize {
        self.workers
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
            .max(1)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn meter_interval(&self) -> Duration {
        Duration::from_secs(self.meter_interval_secs.max(1))
    }

    pub fn has_detector(&self) -> bool {
        self.hand_model.is_some() || self.pose_model.is_some()
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::parse_from(["asl_server"]);

        assert_eq!(config.variant, PipelineVariant::Multimodal);
        assert_eq!(config.image_size, 64);
        assert_eq!(config.landmark_dim, 225);
        assert_eq!(config.confidence_precision, 2);
        assert!(config.labels.is_none());
        assert!(!config.has_detector());
        assert!(config.workers() >= 1);
        assert_eq!(config.static_dir, PathBuf::from("static"));
    }

    #[test]
    fn test_flags() {
        let config = ServerConfig::parse_from([
            "asl_server",
            "--variant",
            "hand-crop",
            "--labels",
            "A,B,C",
            "--channel-order",
            "bgr",
            "--workers",
            "0",
            "--hand-model",
            "hand.onnx",
        ]);

        assert_eq!(config.variant, PipelineVariant::HandCrop);
        assert_eq!(config.variant.fusion_mode(), FusionMode::Single);
        assert!(config.variant.uses_detector());
        assert_eq!(config.labels, Some(vec!["A".into(), "B".into(), "C".into()]));
        assert_eq!(config.channel_order, ChannelOrder::Bgr);
        assert_eq!(config.workers(), 1);
        assert!(config.has_detector());
    }
}
