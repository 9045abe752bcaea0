use tracing::warn;

/// Multi-objective scheduler weights and hard-constraint toggles.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enforce_recipe_match: bool,
    pub enforce_deadlines: bool,
    pub priority_weight: f64,
    pub efficiency_weight: f64,
    pub deadline_weight: f64,
    pub queue_depth_weight: f64,
    pub max_assignments_per_run: usize,
    pub run_budget_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enforce_recipe_match: true,
            enforce_deadlines: false,
            priority_weight: 0.3,
            efficiency_weight: 0.3,
            deadline_weight: 0.2,
            queue_depth_weight: 0.2,
            max_assignments_per_run: 10,
            run_budget_secs: 60,
        }
    }
}

impl SchedulerConfig {
    /// Reject negative weights and normalize the remainder to a convex
    /// combination summing to 1.0. The source permitted un-normalized
    /// weights; this implementation does not (see DESIGN.md).
    pub fn normalized(mut self) -> Result<Self, String> {
        let weights = [
            self.priority_weight,
            self.efficiency_weight,
            self.deadline_weight,
            self.queue_depth_weight,
        ];
        if weights.iter().any(|w| *w < 0.0) {
            return Err("scheduler weights must be non-negative".to_string());
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err("scheduler weights must sum to a positive value".to_string());
        }
        self.priority_weight /= total;
        self.efficiency_weight /= total;
        self.deadline_weight /= total;
        self.queue_depth_weight /= total;
        Ok(self)
    }
}

/// Backlog-maintenance tuning for the Lot Generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub min_lots: i64,
    pub max_lots: i64,
    pub batch_size: usize,
    pub hot_lot_probability: f64,
    pub priority_distribution: [f64; 5],
    pub customer_weights: Vec<(String, f64)>,
    pub recipe_kinds: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 15,
            min_lots: 20,
            max_lots: 100,
            batch_size: 10,
            hot_lot_probability: 0.15,
            priority_distribution: [0.15, 0.25, 0.30, 0.20, 0.10],
            customer_weights: vec![
                ("Apple".into(), 1.5),
                ("NVIDIA".into(), 1.4),
                ("AMD".into(), 1.3),
                ("Intel".into(), 1.2),
                ("Qualcomm".into(), 1.2),
                ("Samsung".into(), 1.1),
                ("MediaTek".into(), 1.0),
                ("Broadcom".into(), 1.0),
                ("TI".into(), 0.9),
                ("NXP".into(), 0.9),
                ("ST".into(), 0.8),
                ("ADI".into(), 0.8),
                ("Maxim".into(), 0.7),
                ("Cirrus".into(), 0.7),
                ("INTERNAL".into(), 0.5),
            ],
            recipe_kinds: vec![
                "N3-ADV".into(),
                "N5-HOT".into(),
                "N5-STD".into(),
                "N7-EXP".into(),
                "N7-STD".into(),
                "STANDARD_LOGIC".into(),
                "MEMORY_DRAM".into(),
                "GPU_DIE".into(),
                "AI_ACCELERATOR".into(),
                "HPC_CPU".into(),
                "MOBILE_SOC".into(),
                "NETWORK_CHIP".into(),
                "MODEM_5G".into(),
                "FPGA".into(),
            ],
        }
    }
}

impl GeneratorConfig {
    /// Reject negative entries and normalize the priority distribution to
    /// sum to 1.0, mirroring `SchedulerConfig::normalized`.
    pub fn normalized(mut self) -> Result<Self, String> {
        if self.priority_distribution.iter().any(|w| *w < 0.0) {
            return Err("priority distribution must be non-negative".to_string());
        }
        let total: f64 = self.priority_distribution.iter().sum();
        if total <= 0.0 {
            return Err("priority distribution must sum to a positive value".to_string());
        }
        for w in &mut self.priority_distribution {
            *w /= total;
        }
        Ok(self)
    }
}

/// CORS allow-list: an explicit set of origins, or a regex for staging/
/// preview subdomains, matching the teacher's dev-mode permissive fallback.
#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_origin_regex: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_address: String,
    pub cors: CorsConfig,
    pub scheduler: SchedulerConfig,
    pub generator: GeneratorConfig,
    pub lifecycle_interval_secs: u64,
    pub anomaly_ring_size: usize,
    pub random_seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            bind_address: "0.0.0.0:8080".to_string(),
            cors: CorsConfig::default(),
            scheduler: SchedulerConfig::default(),
            generator: GeneratorConfig::default(),
            lifecycle_interval_secs: 10,
            anomaly_ring_size: 60,
            random_seed: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with CLI overrides.
    pub fn from_env(
        database_url: Option<String>,
        bind_address: Option<String>,
        port: Option<u16>,
    ) -> anyhow::Result<Self> {
        let mut config = Self::default();

        config.database_url = database_url
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_default();
        if config.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL is not set and no --database-url was provided");
        }

        if let Some(addr) = bind_address {
            config.bind_address = addr;
        } else if let Some(p) = port {
            config.bind_address = format!("0.0.0.0:{p}");
        } else if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            config.bind_address = addr;
        }

        if let Ok(v) = std::env::var("CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        config.cors.allowed_origin_regex = std::env::var("CORS_ALLOWED_ORIGIN_REGEX").ok();

        if let Ok(v) = std::env::var("SCHEDULER_ENFORCE_RECIPE_MATCH") {
            config.scheduler.enforce_recipe_match = parse_bool(&v, config.scheduler.enforce_recipe_match);
        }
        if let Ok(v) = std::env::var("SCHEDULER_ENFORCE_DEADLINES") {
            config.scheduler.enforce_deadlines = parse_bool(&v, config.scheduler.enforce_deadlines);
        }
        if let Ok(v) = std::env::var("SCHEDULER_PRIORITY_WEIGHT") {
            if let Ok(n) = v.parse() {
                config.scheduler.priority_weight = n;
            }
        }
        if let Ok(v) = std::env::var("SCHEDULER_EFFICIENCY_WEIGHT") {
            if let Ok(n) = v.parse() {
                config.scheduler.efficiency_weight = n;
            }
        }
        if let Ok(v) = std::env::var("SCHEDULER_DEADLINE_WEIGHT") {
            if let Ok(n) = v.parse() {
                config.scheduler.deadline_weight = n;
            }
        }
        if let Ok(v) = std::env::var("SCHEDULER_QUEUE_DEPTH_WEIGHT") {
            if let Ok(n) = v.parse() {
                config.scheduler.queue_depth_weight = n;
            }
        }
        config.scheduler = config
            .scheduler
            .normalized()
            .map_err(|e| anyhow::anyhow!(e))?;

        if let Ok(v) = std::env::var("GENERATOR_ENABLED") {
            config.generator.enabled = parse_bool(&v, config.generator.enabled);
        }
        if let Ok(v) = std::env::var("GENERATOR_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                config.generator.interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("GENERATOR_MIN_LOTS") {
            if let Ok(n) = v.parse() {
                config.generator.min_lots = n;
            }
        }
        if let Ok(v) = std::env::var("GENERATOR_MAX_LOTS") {
            if let Ok(n) = v.parse() {
                config.generator.max_lots = n;
            }
        }
        if let Ok(v) = std::env::var("GENERATOR_HOT_LOT_PROBABILITY") {
            if let Ok(n) = v.parse() {
                config.generator.hot_lot_probability = n;
            }
        }
        config.generator = config
            .generator
            .normalized()
            .map_err(|e| anyhow::anyhow!(e))?;

        if let Ok(v) = std::env::var("LIFECYCLE_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                config.lifecycle_interval_secs = n;
            }
        }

        if let Ok(v) = std::env::var("RANDOM_SEED") {
            config.random_seed = v.parse().ok();
            if config.random_seed.is_none() {
                warn!(value = %v, "RANDOM_SEED set but not a valid u64; using OS entropy");
            }
        }

        Ok(config)
    }
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_weights_normalize_to_one() {
        let cfg = SchedulerConfig {
            priority_weight: 1.0,
            efficiency_weight: 1.0,
            deadline_weight: 1.0,
            queue_depth_weight: 1.0,
            ..SchedulerConfig::default()
        }
        .normalized()
        .unwrap();
        let total = cfg.priority_weight
            + cfg.efficiency_weight
            + cfg.deadline_weight
            + cfg.queue_depth_weight;
        assert!((total - 1.0).abs() < 1e-9);
        assert!((cfg.priority_weight - 0.25).abs() < 1e-9);
    }

    #[test]
    fn negative_scheduler_weight_is_rejected() {
        let cfg = SchedulerConfig {
            priority_weight: -0.1,
            ..SchedulerConfig::default()
        };
        assert!(cfg.normalized().is_err());
    }

    #[test]
    fn generator_priority_distribution_normalizes() {
        let cfg = GeneratorConfig {
            priority_distribution: [1.0, 1.0, 1.0, 1.0, 1.0],
            ..GeneratorConfig::default()
        }
        .normalized()
        .unwrap();
        let total: f64 = cfg.priority_distribution.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
