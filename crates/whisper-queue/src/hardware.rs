//! Host hardware probe used to pick a default model
//!
//! RAM and core counts come from sysinfo; GPU presence is probed by
//! shelling out to nvidia-smi, which is the only reliable signal for
//! CUDA-capable cards without linking driver libraries.

use serde::Serialize;
use std::process::Command;
use sysinfo::System;

/// A detected NVIDIA GPU
#[derive(Debug, Clone, Serialize)]
pub struct GpuInfo {
    pub name: String,
    /// Dedicated memory in MiB, as nvidia-smi reports it
    pub vram_mb: u64,
    pub count: usize,
}

impl GpuInfo {
    pub fn vram_gb(&self) -> f64 {
        self.vram_mb as f64 / 1024.0
    }
}

/// Snapshot of the host taken once at startup
#[derive(Debug, Clone, Serialize)]
pub struct HardwareInfo {
    pub total_ram_bytes: u64,
    pub cpu_cores: usize,
    pub gpu: Option<GpuInfo>,
}

impl HardwareInfo {
    /// Probe the host
    pub fn detect() -> Self {
        let mut system = System::new_all();
        system.refresh_all();

        let total_ram_bytes = system.total_memory();
        let cpu_cores = system.cpus().len().max(1);
        let gpu = detect_nvidia_gpu();

        match &gpu {
            Some(gpu) => tracing::info!(
                "Hardware: {:.1} GB RAM, {} cores, {} x {} ({} MiB VRAM)",
                bytes_to_gb(total_ram_bytes),
                cpu_cores,
                gpu.count,
                gpu.name,
                gpu.vram_mb
            ),
            None => tracing::info!(
                "Hardware: {:.1} GB RAM, {} cores, no NVIDIA GPU detected",
                bytes_to_gb(total_ram_bytes),
                cpu_cores
            ),
        }

        Self {
            total_ram_bytes,
            cpu_cores,
            gpu,
        }
    }

    pub fn ram_gb(&self) -> f64 {
        bytes_to_gb(self.total_ram_bytes)
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

fn detect_nvidia_gpu() -> Option<GpuInfo> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=name,memory.total",
            "--format=csv,noheader,nounits",
        ])
        .output();

    match output {
        Ok(out) if out.status.success() => {
            parse_nvidia_smi(&String::from_utf8_lossy(&out.stdout))
        }
        Ok(out) => {
            tracing::debug!("nvidia-smi exited with {}", out.status);
            None
        }
        Err(e) => {
            tracing::debug!("nvidia-smi not available: {}", e);
            None
        }
    }
}

/// Parse `name, memory.total` CSV lines, one per installed GPU.
/// The card with the most VRAM is the reference device; `count` still
/// reports every installed card.
fn parse_nvidia_smi(stdout: &str) -> Option<GpuInfo> {
    let gpus: Vec<(String, u64)> = stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (name, vram) = line.rsplit_once(',')?;
            let vram_mb: u64 = vram.trim().parse().ok()?;
            Some((name.trim().to_string(), vram_mb))
        })
        .collect();

    let count = gpus.len();
    let (name, vram_mb) = gpus.into_iter().max_by_key(|(_, vram)| *vram)?;

    Some(GpuInfo {
        name,
        vram_mb,
        count,
    })
}
