use std::sync::Mutex;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessesToUpdate, System};

#[derive(Debug, Clone)]
pub struct StageStats {
    pub stage: String,
    pub stage_elapsed: Duration,
    pub total_elapsed: Duration,
    pub memory_usage_mb: Option<u64>,
    pub peak_memory_mb: Option<u64>,
}

/// 記錄每個階段 (每個 crew task) 的耗時與記憶體用量
pub struct RunMonitor {
    enabled: bool,
    start_time: Instant,
    stage_start: Mutex<Instant>,
    #[cfg(feature = "cli")]
    probe: Option<MemoryProbe>,
}

#[cfg(feature = "cli")]
struct MemoryProbe {
    system: Mutex<System>,
    pid: Pid,
    peak_memory: Mutex<u64>,
}

#[cfg(feature = "cli")]
impl MemoryProbe {
    fn new() -> Option<Self> {
        let pid = sysinfo::get_current_pid().ok()?;
        Some(Self {
            system: Mutex::new(System::new()),
            pid,
            peak_memory: Mutex::new(0),
        })
    }

    /// 回傳 (目前, 峰值) MB
    fn sample(&self) -> Option<(u64, u64)> {
        let mut system = self.system.lock().ok()?;
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let memory_mb = system.process(self.pid)?.memory() / 1024 / 1024;

        let mut peak = self.peak_memory.lock().ok()?;
        if memory_mb > *peak {
            *peak = memory_mb;
        }
        Some((memory_mb, *peak))
    }
}

impl RunMonitor {
    pub fn new(enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            start_time: now,
            stage_start: Mutex::new(now),
            #[cfg(feature = "cli")]
            probe: if enabled { MemoryProbe::new() } else { None },
        }
    }

    /// 結束目前階段並開始下一個階段，回傳剛結束階段的統計
    pub fn finish_stage(&self, stage: &str) -> Option<StageStats> {
        if !self.enabled {
            return None;
        }

        let now = Instant::now();
        let stage_elapsed = match self.stage_start.lock() {
            Ok(mut started) => {
                let elapsed = now.duration_since(*started);
                *started = now;
                elapsed
            }
            Err(_) => Duration::ZERO,
        };

        #[cfg(feature = "cli")]
        let memory = self.probe.as_ref().and_then(MemoryProbe::sample);
        #[cfg(not(feature = "cli"))]
        let memory: Option<(u64, u64)> = None;

        Some(StageStats {
            stage: stage.to_string(),
            stage_elapsed,
            total_elapsed: now.duration_since(self.start_time),
            memory_usage_mb: memory.map(|(current, _)| current),
            peak_memory_mb: memory.map(|(_, peak)| peak),
        })
    }

    pub fn log_stage(&self, stage: &str) {
        if let Some(stats) = self.finish_stage(stage) {
            match (stats.memory_usage_mb, stats.peak_memory_mb) {
                (Some(current), Some(peak)) => tracing::info!(
                    "📊 {} - took {:?}, Memory: {}MB, Peak: {}MB, Total: {:?}",
                    stats.stage,
                    stats.stage_elapsed,
                    current,
                    peak,
                    stats.total_elapsed
                ),
                _ => tracing::info!(
                    "📊 {} - took {:?}, Total: {:?}",
                    stats.stage,
                    stats.stage_elapsed,
                    stats.total_elapsed
                ),
            }
        }
    }

    pub fn log_final_stats(&self) {
        if self.enabled {
            tracing::info!("📊 Final Stats - Total Time: {:?}", self.start_time.elapsed());
        }
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
