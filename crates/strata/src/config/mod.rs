use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};
use crate::memory::access::ScoreThresholds;
use crate::search::types::{FusionMethod, SearchMode, SearchOptions};
use crate::storage::{EvictionPolicy, TierConfig, WarmEvictionConfig};

/// Main configuration structure for Strata
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Where the persistent tiers live
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-tier capacity limits
    #[serde(default)]
    pub tiers: TiersConfig,
    /// Background migration settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Search fusion defaults
    #[serde(default)]
    pub fusion: FusionConfig,
    /// Admin HTTP surface
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Storage location configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all storage data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".strata"))
        .unwrap_or_else(|| PathBuf::from(".strata"))
}

/// Capacity limits for the three tiers
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TiersConfig {
    #[serde(default)]
    pub core: CoreTierConfig,
    #[serde(default)]
    pub warm: WarmTierConfig,
    #[serde(default)]
    pub cold: ColdTierConfig,
}

/// Core tier: small, bounded, always consulted first
#[derive(Debug, Clone, Deserialize)]
pub struct CoreTierConfig {
    /// Largest single record in bytes
    #[serde(default = "default_core_max_record_bytes")]
    pub max_record_bytes: u64,
    /// Aggregate byte budget
    #[serde(default = "default_core_max_total_bytes")]
    pub max_total_bytes: u64,
}

impl Default for CoreTierConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: default_core_max_record_bytes(),
            max_total_bytes: default_core_max_total_bytes(),
        }
    }
}

fn default_core_max_record_bytes() -> u64 {
    4096
}

fn default_core_max_total_bytes() -> u64 {
    1024 * 1024
}

/// Warm tier eviction settings
#[derive(Debug, Clone, Deserialize)]
pub struct WarmTierConfig {
    /// Entry count above which eviction runs
    #[serde(default = "default_warm_max_entries")]
    pub max_entries: usize,
    /// "lru", "lfu" or "ttl"
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
    /// Age in hours after which any record may be evicted
    #[serde(default = "default_warm_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for WarmTierConfig {
    fn default() -> Self {
        Self {
            max_entries: default_warm_max_entries(),
            eviction_policy: EvictionPolicy::default(),
            ttl_hours: default_warm_ttl_hours(),
        }
    }
}

fn default_warm_max_entries() -> usize {
    1000
}

fn default_warm_ttl_hours() -> u64 {
    168
}

/// Cold tier archive settings
#[derive(Debug, Clone, Deserialize)]
pub struct ColdTierConfig {
    /// Aggregate byte budget
    #[serde(default = "default_cold_max_total_bytes")]
    pub max_total_bytes: u64,
}

impl Default for ColdTierConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: default_cold_max_total_bytes(),
        }
    }
}

fn default_cold_max_total_bytes() -> u64 {
    1024 * 1024 * 1024
}

/// Background migration settings
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Maximum migrations per direction per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Promotion score strictly above this requests promotion
    #[serde(default = "default_promote_threshold")]
    pub promote_threshold: f64,
    /// Promotion score strictly below this requests demotion
    #[serde(default = "default_demote_threshold")]
    pub demote_threshold: f64,
    /// Stale access patterns re-scored per cycle
    #[serde(default = "default_refresh_batch")]
    pub refresh_batch: usize,
    /// How long `stop()` waits for the loop before aborting it
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            promote_threshold: default_promote_threshold(),
            demote_threshold: default_demote_threshold(),
            refresh_batch: default_refresh_batch(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Reject an interval or batch the scheduler loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 || self.batch_size == 0 {
            return Err(StrataError::Config(
                "scheduler.interval_secs and batch_size must be non-zero".to_string(),
            ));
        }
        self.thresholds().validate()
    }

    pub fn thresholds(&self) -> ScoreThresholds {
        ScoreThresholds {
            promote: self.promote_threshold,
            demote: self.demote_threshold,
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    10
}

fn default_promote_threshold() -> f64 {
    80.0
}

fn default_demote_threshold() -> f64 {
    20.0
}

fn default_refresh_batch() -> usize {
    100
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

/// Search fusion defaults
#[derive(Debug, Clone, Deserialize)]
pub struct FusionConfig {
    /// Default search mode
    #[serde(default)]
    pub mode: SearchMode,
    /// Default fusion method
    #[serde(default)]
    pub method: FusionMethod,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    /// Penalty strength for near-duplicate results (0 disables)
    #[serde(default = "default_diversity_boost")]
    pub diversity_boost: f64,
    /// Ranked lists kept in the result cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Candidates requested from each engine
    #[serde(default = "default_hybrid_candidate_cap")]
    pub hybrid_candidate_cap: usize,
    /// Top lexical score below which hybrid mode also asks the vector engine
    #[serde(default = "default_hybrid_min_lexical_score")]
    pub hybrid_min_lexical_score: f64,
    /// Per-engine call timeout
    #[serde(default = "default_engine_timeout_ms")]
    pub engine_timeout_ms: u64,
    /// Records scanned by the substring fallback
    #[serde(default = "default_fallback_scan_limit")]
    pub fallback_scan_limit: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::default(),
            method: FusionMethod::default(),
            lexical_weight: default_lexical_weight(),
            vector_weight: default_vector_weight(),
            diversity_boost: default_diversity_boost(),
            cache_capacity: default_cache_capacity(),
            hybrid_candidate_cap: default_hybrid_candidate_cap(),
            hybrid_min_lexical_score: default_hybrid_min_lexical_score(),
            engine_timeout_ms: default_engine_timeout_ms(),
            fallback_scan_limit: default_fallback_scan_limit(),
        }
    }
}

impl FusionConfig {
    /// Reject weights and limits the search pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(StrataError::Config(msg));

        for (name, value) in [
            ("lexical_weight", self.lexical_weight),
            ("vector_weight", self.vector_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("fusion.{name} must be finite and non-negative, got {value}"));
            }
        }
        if self.lexical_weight + self.vector_weight <= 0.0 {
            return invalid("fusion weights must not sum to zero".to_string());
        }
        if !self.diversity_boost.is_finite() || !(0.0..=1.0).contains(&self.diversity_boost) {
            return invalid(format!(
                "fusion.diversity_boost must be within [0, 1], got {}",
                self.diversity_boost
            ));
        }
        if self.cache_capacity == 0 {
            return invalid("fusion.cache_capacity must be non-zero".to_string());
        }
        if self.engine_timeout_ms == 0 {
            return invalid("fusion.engine_timeout_ms must be non-zero".to_string());
        }
        if !self.hybrid_min_lexical_score.is_finite() {
            return invalid("fusion.hybrid_min_lexical_score must be finite".to_string());
        }
        Ok(())
    }

    /// Search options seeded from these defaults
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            mode: self.mode,
            method: self.method,
            lexical_weight: self.lexical_weight,
            vector_weight: self.vector_weight,
            diversity_boost: self.diversity_boost,
            ..SearchOptions::default()
        }
    }
}

fn default_lexical_weight() -> f64 {
    0.6
}

fn default_vector_weight() -> f64 {
    0.4
}

fn default_diversity_boost() -> f64 {
    0.3
}

fn default_cache_capacity() -> usize {
    500
}

fn default_hybrid_candidate_cap() -> usize {
    50
}

fn default_hybrid_min_lexical_score() -> f64 {
    2.0
}

fn default_engine_timeout_ms() -> u64 {
    2000
}

fn default_fallback_scan_limit() -> usize {
    1000
}

/// Admin HTTP surface configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Serve the admin router
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
    /// Address to listen on (e.g., "127.0.0.1:7878")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_admin_enabled(),
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_admin_enabled() -> bool {
    true
}

fn default_listen_addr() -> String {
    "127.0.0.1:7878".to_string()
}

impl Config {
    /// Load from an explicit path, or the first config file found in the
    /// default locations, or fall back to defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".strata").join("config.toml")),
            dirs::config_dir().map(|c| c.join("strata").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        tracing::info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| StrataError::Config(format!("Failed to parse config: {e}")))
    }

    /// Reject values the tiers, scheduler or search cannot run with
    pub fn validate(&self) -> Result<()> {
        self.tier_config().validate()?;
        self.scheduler.validate()?;
        self.fusion.validate()?;
        if self.admin.enabled {
            self.admin_addr()?;
        }
        Ok(())
    }

    /// Tier limits and migration thresholds for [`crate::storage::TierStore`]
    pub fn tier_config(&self) -> TierConfig {
        TierConfig {
            core_max_record_bytes: self.tiers.core.max_record_bytes,
            core_max_total_bytes: self.tiers.core.max_total_bytes,
            warm: WarmEvictionConfig {
                max_entries: self.tiers.warm.max_entries,
                policy: self.tiers.warm.eviction_policy,
                ttl_hours: self.tiers.warm.ttl_hours,
            },
            cold_max_total_bytes: self.tiers.cold.max_total_bytes,
            thresholds: self.scheduler.thresholds(),
        }
    }

    pub fn admin_addr(&self) -> Result<SocketAddr> {
        self.admin.listen_addr.parse().map_err(|e| {
            StrataError::Config(format!(
                "Invalid admin.listen_addr {}: {e}",
                self.admin.listen_addr
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.tiers.core.max_record_bytes, 4096);
        assert_eq!(config.tiers.core.max_total_bytes, 1024 * 1024);
        assert_eq!(config.tiers.warm.max_entries, 1000);
        assert_eq!(config.tiers.warm.eviction_policy, EvictionPolicy::Lru);
        assert_eq!(config.tiers.warm.ttl_hours, 168);
        assert_eq!(config.tiers.cold.max_total_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.scheduler.interval_secs, 30);
        assert_eq!(config.scheduler.batch_size, 10);
        assert_eq!(config.fusion.mode, SearchMode::Hybrid);
        assert_eq!(config.fusion.cache_capacity, 500);
        assert_eq!(config.admin.listen_addr, "127.0.0.1:7878");
        assert!(config.storage.data_dir.ends_with(".strata"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
            [storage]
            data_dir = "/tmp/strata-test"

            [tiers.core]
            max_record_bytes = 2048
            max_total_bytes = 65536

            [tiers.warm]
            max_entries = 50
            eviction_policy = "lfu"
            ttl_hours = 24

            [tiers.cold]
            max_total_bytes = 1048576

            [scheduler]
            interval_secs = 5
            batch_size = 3
            promote_threshold = 70.0
            demote_threshold = 10.0

            [fusion]
            mode = "parallel"
            method = "reciprocal_rank"
            lexical_weight = 0.5
            vector_weight = 0.5

            [admin]
            enabled = false
            listen_addr = "0.0.0.0:9000"
        "#;

        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/strata-test"));
        assert_eq!(config.tiers.core.max_record_bytes, 2048);
        assert_eq!(config.tiers.warm.eviction_policy, EvictionPolicy::Lfu);
        assert_eq!(config.tiers.warm.ttl_hours, 24);
        assert_eq!(config.scheduler.batch_size, 3);
        assert_eq!(config.fusion.mode, SearchMode::Parallel);
        assert_eq!(config.fusion.method, FusionMethod::ReciprocalRank);
        assert!(!config.admin.enabled);
        assert!(config.validate().is_ok());

        let tiers = config.tier_config();
        assert_eq!(tiers.core_max_total_bytes, 65536);
        assert_eq!(tiers.warm.max_entries, 50);
        assert_eq!(tiers.thresholds.promote, 70.0);
        assert_eq!(tiers.thresholds.demote, 10.0);
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let config = Config::from_toml("[scheduler]\ninterval_secs = 60\n").unwrap();
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.scheduler.batch_size, 10);
        assert_eq!(config.scheduler.shutdown_timeout_ms, 5000);
        assert_eq!(config.fusion.lexical_weight, 0.6);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = Config::from_toml("[tiers.warm]\neviction_policy = \"random\"\n");
        assert!(matches!(result, Err(StrataError::Config(_))));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fusion]\ncache_capacity = 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.fusion.cache_capacity, 7);

        let missing = Config::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(missing, Err(StrataError::Config(_))));
    }

    #[test]
    fn test_search_options_from_fusion_defaults() {
        let fusion = FusionConfig {
            mode: SearchMode::LexicalOnly,
            lexical_weight: 0.9,
            vector_weight: 0.1,
            ..FusionConfig::default()
        };
        let options = fusion.search_options();
        assert_eq!(options.mode, SearchMode::LexicalOnly);
        assert_eq!(options.lexical_weight, 0.9);
        assert_eq!(options.limit, 10);
    }

    mod validation {
        use super::*;

        fn rejects(mutate: impl FnOnce(&mut Config)) -> bool {
            let mut config = Config::default();
            mutate(&mut config);
            matches!(config.validate(), Err(StrataError::Config(_)))
        }

        #[test]
        fn test_zero_capacities() {
            assert!(rejects(|c| c.tiers.core.max_total_bytes = 0));
            assert!(rejects(|c| c.tiers.warm.max_entries = 0));
            assert!(rejects(|c| c.tiers.cold.max_total_bytes = 0));
            assert!(rejects(|c| c.fusion.cache_capacity = 0));
        }

        #[test]
        fn test_record_limit_above_budget() {
            assert!(rejects(|c| c.tiers.core.max_record_bytes = 2 * 1024 * 1024));
        }

        #[test]
        fn test_weights() {
            assert!(rejects(|c| c.fusion.lexical_weight = f64::NAN));
            assert!(rejects(|c| c.fusion.vector_weight = -0.1));
            assert!(rejects(|c| {
                c.fusion.lexical_weight = 0.0;
                c.fusion.vector_weight = 0.0;
            }));
            assert!(!rejects(|c| c.fusion.vector_weight = 0.0));
        }

        #[test]
        fn test_thresholds() {
            assert!(rejects(|c| c.scheduler.promote_threshold = 120.0));
            assert!(rejects(|c| c.scheduler.demote_threshold = -1.0));
            assert!(rejects(|c| {
                c.scheduler.promote_threshold = 30.0;
                c.scheduler.demote_threshold = 30.0;
            }));
        }

        #[test]
        fn test_scheduler_and_diversity() {
            assert!(rejects(|c| c.scheduler.interval_secs = 0));
            assert!(rejects(|c| c.scheduler.batch_size = 0));
            assert!(rejects(|c| c.fusion.diversity_boost = 1.5));
        }

        #[test]
        fn test_sections_validate_on_their_own() {
            let scheduler = SchedulerConfig {
                interval_secs: 0,
                ..SchedulerConfig::default()
            };
            assert!(matches!(scheduler.validate(), Err(StrataError::Config(_))));

            let fusion = FusionConfig {
                engine_timeout_ms: 0,
                ..FusionConfig::default()
            };
            assert!(matches!(fusion.validate(), Err(StrataError::Config(_))));

            let mut tiers = Config::default().tier_config();
            tiers.thresholds.promote = f64::NAN;
            assert!(matches!(tiers.validate(), Err(StrataError::Config(_))));
            assert!(Config::default().tier_config().validate().is_ok());
        }

        #[test]
        fn test_bad_listen_addr() {
            assert!(rejects(|c| c.admin.listen_addr = "not an address".to_string()));
            assert!(!rejects(|c| {
                c.admin.enabled = false;
                c.admin.listen_addr = "not an address".to_string();
            }));
        }
    }
}
