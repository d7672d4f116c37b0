//! Whisper model catalog and the active-model selector
//!
//! The selector owns which model the worker uses next. Switching never
//! touches work already in flight: the worker reads the active model
//! when it starts each file, so a switch applies from the next file on.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hardware::HardwareInfo;

/// The whisper.cpp model sizes this service knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhisperModel {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
    Turbo,
}

impl WhisperModel {
    pub const ALL: [WhisperModel; 6] = [
        WhisperModel::Tiny,
        WhisperModel::Base,
        WhisperModel::Small,
        WhisperModel::Medium,
        WhisperModel::Large,
        WhisperModel::Turbo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WhisperModel::Tiny => "tiny",
            WhisperModel::Base => "base",
            WhisperModel::Small => "small",
            WhisperModel::Medium => "medium",
            WhisperModel::Large => "large",
            WhisperModel::Turbo => "turbo",
        }
    }

    /// Memory the loaded model roughly needs, in GB
    pub fn min_memory_gb(self) -> f64 {
        match self {
            WhisperModel::Tiny => 1.0,
            WhisperModel::Base => 1.0,
            WhisperModel::Small => 2.0,
            WhisperModel::Medium => 5.0,
            WhisperModel::Large => 10.0,
            WhisperModel::Turbo => 6.0,
        }
    }

    /// Weight file name as distributed by whisper.cpp
    pub fn ggml_filename(self) -> &'static str {
        match self {
            WhisperModel::Tiny => "ggml-tiny.bin",
            WhisperModel::Base => "ggml-base.bin",
            WhisperModel::Small => "ggml-small.bin",
            WhisperModel::Medium => "ggml-medium.bin",
            WhisperModel::Large => "ggml-large-v3.bin",
            WhisperModel::Turbo => "ggml-large-v3-turbo.bin",
        }
    }

    /// Best default for the host this process runs on
    pub fn default_for(hardware: &HardwareInfo) -> Self {
        match &hardware.gpu {
            Some(gpu) => {
                let vram_gb = gpu.vram_gb();
                if vram_gb > 6.0 {
                    WhisperModel::Turbo
                } else if vram_gb > 5.0 {
                    WhisperModel::Medium
                } else if vram_gb > 2.0 {
                    WhisperModel::Small
                } else {
                    WhisperModel::Base
                }
            }
            None => WhisperModel::Base,
        }
    }
}

impl std::str::FromStr for WhisperModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tiny" => Ok(WhisperModel::Tiny),
            "base" => Ok(WhisperModel::Base),
            "small" => Ok(WhisperModel::Small),
            "medium" => Ok(WhisperModel::Medium),
            "large" => Ok(WhisperModel::Large),
            "turbo" => Ok(WhisperModel::Turbo),
            other => Err(Error::invalid_model(format!(
                "Unknown model '{}'. Valid models: tiny, base, small, medium, large, turbo",
                other
            ))),
        }
    }
}

impl std::fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a model switch
#[derive(Debug, Clone, Copy)]
pub struct ModelSwap {
    pub previous: WhisperModel,
    pub active: WhisperModel,
}

/// Holds the active model and validates switches against the host
pub struct ModelSelector {
    hardware: HardwareInfo,
    active: RwLock<WhisperModel>,
}

impl ModelSelector {
    pub fn new(hardware: HardwareInfo) -> Self {
        let default = WhisperModel::default_for(&hardware);
        tracing::info!(
            "Default model: {} ({})",
            default,
            if hardware.has_gpu() { "gpu" } else { "cpu" }
        );

        Self {
            hardware,
            active: RwLock::new(default),
        }
    }

    /// Model the worker should use for the next file it starts
    pub fn active(&self) -> WhisperModel {
        *self.active.read()
    }

    pub fn hardware(&self) -> &HardwareInfo {
        &self.hardware
    }

    /// Switch the active model; in-flight work keeps the model it
    /// started with.
    pub fn set_model(&self, name: &str) -> Result<ModelSwap> {
        let model: WhisperModel = name.parse()?;
        self.check_fits(model)?;

        let previous = std::mem::replace(&mut *self.active.write(), model);
        if previous != model {
            tracing::info!(
                "Model switched {} -> {}, applies from the next file started",
                previous,
                model
            );
        }

        Ok(ModelSwap {
            previous,
            active: model,
        })
    }

    /// Reject models the host cannot hold in memory
    fn check_fits(&self, model: WhisperModel) -> Result<()> {
        let required = model.min_memory_gb();

        if let Some(gpu) = &self.hardware.gpu {
            let vram_gb = gpu.vram_gb();
            if required > vram_gb {
                return Err(Error::invalid_model(format!(
                    "Model '{}' needs {:.0} GB VRAM but {:.1} GB is available",
                    model, required, vram_gb
                )));
            }
            return Ok(());
        }

        // CPU inference mmaps the weights, so allow some headroom over
        // physical RAM
        let budget = self.hardware.ram_gb() * 1.5;
        if required > budget {
            return Err(Error::invalid_model(format!(
                "Model '{}' needs {:.0} GB memory but this host has {:.1} GB RAM",
                model,
                required,
                self.hardware.ram_gb()
            )));
        }

        Ok(())
    }
}
