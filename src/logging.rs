//! GC Logging - Region Collector Event Trail
//!
//! Structured logging for region operations, useful for:
//! - Debugging region lifecycles
//! - Collection heuristics analysis
//! - Test assertions on collector behavior
//!
//! Log Levels:
//! - ERROR: allocation failures
//! - INFO: collection cycles
//! - DEBUG: region lifecycle operations (create, merge, swap, release)

use std::time::Instant;

use parking_lot::Mutex;

/// Log level for collector events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Region collector event types
#[derive(Debug, Clone)]
pub enum GcEvent {
    /// New region created
    RegionCreated { region: usize, root: usize },

    /// Collection cycle started on a region
    CycleStart { region: usize },

    /// Collection cycle completed
    CycleEnd {
        region: usize,
        duration_ms: f64,
        survived_bytes: usize,
    },

    /// A subregion discovered unreachable was released
    SubregionReleased { root: usize },

    /// One region absorbed another
    RegionsMerged { into: usize, absorbed: usize },

    /// The region's iso was exchanged
    RootSwapped {
        region: usize,
        prev: usize,
        next: usize,
    },

    /// Full region teardown
    RegionReleased { region: usize },

    /// Allocation failure
    AllocationFailure { size: usize },
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
        }
    }
}

/// GC Logger - centralized event trail for region operations
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<Vec<(Instant, GcEvent)>>,
}

impl GcLogger {
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Log a collector event
    pub fn log(&self, event: GcEvent) {
        if Self::event_level(&event) > self.config.level {
            return;
        }

        self.events.lock().push((Instant::now(), event.clone()));

        if self.config.console {
            self.output_console(&event);
        }
    }

    fn event_level(event: &GcEvent) -> LogLevel {
        match event {
            GcEvent::AllocationFailure { .. } => LogLevel::Error,
            GcEvent::CycleStart { .. } | GcEvent::CycleEnd { .. } => LogLevel::Info,
            GcEvent::RegionCreated { .. }
            | GcEvent::SubregionReleased { .. }
            | GcEvent::RegionsMerged { .. }
            | GcEvent::RootSwapped { .. }
            | GcEvent::RegionReleased { .. } => LogLevel::Debug,
        }
    }

    fn output_console(&self, event: &GcEvent) {
        if self.config.timestamps {
            let now = chrono::Local::now();
            print!("[{}] ", now.format("%Y-%m-%d %H:%M:%S%.3f"));
        }

        if self.config.json {
            self.output_json(event);
        } else {
            self.output_human(event);
        }
    }

    fn output_human(&self, event: &GcEvent) {
        match event {
            GcEvent::RegionCreated { region, root } => {
                println!("[GC] Region {:#x} created, root {:#x}", region, root);
            }
            GcEvent::CycleStart { region } => {
                println!("[GC] Region {:#x}: collection started", region);
            }
            GcEvent::CycleEnd {
                region,
                duration_ms,
                survived_bytes,
            } => {
                println!(
                    "[GC] Region {:#x}: collection completed ({:.2}ms, {} bytes live)",
                    region, duration_ms, survived_bytes
                );
            }
            GcEvent::SubregionReleased { root } => {
                println!("[GC] Releasing unreachable subregion rooted at {:#x}", root);
            }
            GcEvent::RegionsMerged { into, absorbed } => {
                println!("[GC] Region {:#x} absorbed region {:#x}", into, absorbed);
            }
            GcEvent::RootSwapped { region, prev, next } => {
                println!(
                    "[GC] Region {:#x}: root swapped {:#x} -> {:#x}",
                    region, prev, next
                );
            }
            GcEvent::RegionReleased { region } => {
                println!("[GC] Region {:#x} released", region);
            }
            GcEvent::AllocationFailure { size } => {
                eprintln!("[GC] Allocation failure: {} bytes", size);
            }
        }
    }

    fn output_json(&self, event: &GcEvent) {
        let json = match event {
            GcEvent::RegionCreated { region, root } => serde_json::json!({
                "type": "region_created",
                "region": region,
                "root": root
            }),
            GcEvent::CycleStart { region } => serde_json::json!({
                "type": "cycle_start",
                "region": region
            }),
            GcEvent::CycleEnd {
                region,
                duration_ms,
                survived_bytes,
            } => serde_json::json!({
                "type": "cycle_end",
                "region": region,
                "duration_ms": duration_ms,
                "survived_bytes": survived_bytes
            }),
            GcEvent::SubregionReleased { root } => serde_json::json!({
                "type": "subregion_released",
                "root": root
            }),
            GcEvent::RegionsMerged { into, absorbed } => serde_json::json!({
                "type": "regions_merged",
                "into": into,
                "absorbed": absorbed
            }),
            GcEvent::RootSwapped { region, prev, next } => serde_json::json!({
                "type": "root_swapped",
                "region": region,
                "prev": prev,
                "next": next
            }),
            GcEvent::RegionReleased { region } => serde_json::json!({
                "type": "region_released",
                "region": region
            }),
            GcEvent::AllocationFailure { size } => serde_json::json!({
                "type": "allocation_failure",
                "size": size
            }),
        };

        println!("{}", json);
    }

    /// Get all recorded events
    pub fn get_events(&self) -> Vec<(Instant, GcEvent)> {
        self.events.lock().clone()
    }

    /// Clear all recorded events
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Get recorded event count
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

/// Global collector logger
lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<GcLogger> = Mutex::new(GcLogger::default());
}

/// Log a collector event to the global logger
pub fn log_event(event: GcEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Configure the global logger
pub fn configure_logger(config: GcLoggerConfig) {
    *GLOBAL_LOGGER.lock() = GcLogger::new(config);
}

/// Get the global logger's event count
pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}

/// Snapshot the global logger's events
pub fn get_events() -> Vec<(Instant, GcEvent)> {
    GLOBAL_LOGGER.lock().get_events()
}
