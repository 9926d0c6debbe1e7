//! Config validation: unknown-key detection with Levenshtein suggestions
//! and bounded range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Range violations found in the second
//! pass are hard errors — the daemon refuses to start on them.

use std::collections::HashSet;

use super::defaults;
use super::MonitorConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " — did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for MonitorConfig.
///
/// Maintained manually to match the struct hierarchy in monitor_config.rs.
/// Any new field added there must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [monitor]
        "monitor",
        "monitor.check_interval_secs",
        "monitor.max_restart_failures",
        "monitor.circuit_reset_secs",
        // [storage]
        "storage",
        "storage.data_dir",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.len();
    let b_len = b.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist <= 3 {
            match best {
                Some((_, best_dist)) if dist >= best_dist => {}
                _ => best = Some((k, dist)),
            }
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys — it only warns. Existing configs
/// always continue to work.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let found = walk_toml_keys(&value, "");
    let mut warnings = Vec::new();

    for key in &found {
        if !known.contains(key.as_str()) {
            let suggestion = suggest_correction(key, &known);
            warnings.push(ValidationWarning {
                field: key.clone(),
                message: format!("Unknown config key '{key}'"),
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate documented ranges on a parsed MonitorConfig.
///
/// Returns (errors, warnings) — errors must prevent startup; warnings are
/// suspicious but not fatal.
pub fn validate_ranges(config: &MonitorConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let m = &config.monitor;

    if m.check_interval_secs < defaults::CHECK_INTERVAL_MIN_SECS
        || m.check_interval_secs > defaults::CHECK_INTERVAL_MAX_SECS
    {
        errors.push(format!(
            "monitor.check_interval_secs = {} is outside the allowed range ({}-{})",
            m.check_interval_secs,
            defaults::CHECK_INTERVAL_MIN_SECS,
            defaults::CHECK_INTERVAL_MAX_SECS
        ));
    }

    if m.max_restart_failures < defaults::MAX_RESTART_FAILURES_MIN
        || m.max_restart_failures > defaults::MAX_RESTART_FAILURES_MAX
    {
        errors.push(format!(
            "monitor.max_restart_failures = {} is outside the allowed range ({}-{})",
            m.max_restart_failures,
            defaults::MAX_RESTART_FAILURES_MIN,
            defaults::MAX_RESTART_FAILURES_MAX
        ));
    }

    if m.circuit_reset_secs < defaults::CIRCUIT_RESET_MIN_SECS
        || m.circuit_reset_secs > defaults::CIRCUIT_RESET_MAX_SECS
    {
        errors.push(format!(
            "monitor.circuit_reset_secs = {} is outside the allowed range ({}-{})",
            m.circuit_reset_secs,
            defaults::CIRCUIT_RESET_MIN_SECS,
            defaults::CIRCUIT_RESET_MAX_SECS
        ));
    }

    if config.storage.data_dir.trim().is_empty() {
        errors.push("storage.data_dir must not be empty".to_string());
    }

    // A reset window shorter than one poll means an open circuit always
    // resets by the next cycle and never actually blocks anything.
    if m.circuit_reset_secs < m.check_interval_secs {
        warnings.push(ValidationWarning {
            field: "monitor.circuit_reset_secs".to_string(),
            message: format!(
                "circuit_reset_secs = {} is shorter than check_interval_secs = {} — the circuit breaker will never block an attempt",
                m.circuit_reset_secs, m.check_interval_secs
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("monitor", "monitor"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("check_intervall_secs", "check_interval_secs"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [monitor]
            check_interval_secs = 30
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"monitor".to_string()));
        assert!(keys.contains(&"monitor.check_interval_secs".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[monitor]
check_intervall_secs = 30
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].field.contains("check_intervall_secs"));
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("monitor.check_interval_secs")
        );
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[monitor]
check_interval_secs = 60
max_restart_failures = 3
circuit_reset_secs = 300

[storage]
data_dir = "/var/lib/procwarden"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {warnings:?}");
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let toml_str = r#"
[alerting]
webhook = "http://example.invalid"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(!warnings.is_empty());
        assert!(warnings.iter().any(|w| w.field.contains("alerting")));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key", &known).is_none());
    }

    #[test]
    fn test_range_interval_too_low() {
        let mut config = MonitorConfig::default();
        config.monitor.check_interval_secs = 2;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("check_interval_secs")));
    }

    #[test]
    fn test_range_interval_too_high() {
        let mut config = MonitorConfig::default();
        config.monitor.check_interval_secs = 7_200;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("check_interval_secs")));
    }

    #[test]
    fn test_range_failure_threshold_zero() {
        let mut config = MonitorConfig::default();
        config.monitor.max_restart_failures = 0;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("max_restart_failures")));
    }

    #[test]
    fn test_range_reset_too_short() {
        let mut config = MonitorConfig::default();
        config.monitor.circuit_reset_secs = 10;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("circuit_reset_secs")));
    }

    #[test]
    fn test_empty_data_dir_is_error() {
        let mut config = MonitorConfig::default();
        config.storage.data_dir = "  ".to_string();
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("data_dir")));
    }

    #[test]
    fn test_reset_shorter_than_interval_warns() {
        let mut config = MonitorConfig::default();
        config.monitor.check_interval_secs = 600;
        config.monitor.circuit_reset_secs = 60;
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings
            .iter()
            .any(|w| w.field.contains("circuit_reset_secs")));
    }

    #[test]
    fn test_defaults_clean() {
        let config = MonitorConfig::default();
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty(), "Defaults should produce no errors: {errors:?}");
        assert!(
            warnings.is_empty(),
            "Defaults should produce no warnings: {warnings:?}"
        );
    }
}
