//! Layered configuration loading and secret resolution.
//!
//! `load_layered_yaml` deep-merges a base config with optional overlays,
//! canonicalizes the result to a stable-key-order JSON hash two replicas
//! can compare to confirm they booted from the same config, and hands back
//! the typed [`scheduler::SchedulerConfig`] the rest of the platform
//! actually reads rather than leaving callers to parse the merged JSON a
//! second time. `secrets` resolves env-name-indirected runtime secrets out
//! of that same merged JSON, the way the config file never stores values
//! inline.

pub mod scheduler;
pub mod secrets;

use anyhow::{Context, Result};
use scheduler::SchedulerConfig;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// A replica's fully-resolved non-secret configuration: the typed settings
/// the platform reads (`scheduler`), the merged JSON `secrets::resolve_secrets`
/// still needs for its env-var-name lookups (`raw_json`), and a content
/// hash for cross-replica comparison (`config_hash`).
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub scheduler: SchedulerConfig,
    pub raw_json: Value,
    pub config_hash: String,
}

/// Loads and deep-merges YAML files in order (later files win), then
/// canonicalizes the merge to sorted-key JSON, hashes it, and deserializes
/// the `scheduler` section into [`SchedulerConfig`].
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let config_hash = hex::encode(hasher.finalize());

    let raw_json: Value = serde_json::from_str(&canonical).context("canonical json parse failed")?;
    let scheduler = SchedulerConfig::from_json(&raw_json).context("invalid scheduler config")?;

    Ok(LoadedConfig { scheduler, raw_json, config_hash })
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn deep_merge_overrides_scalars_and_merges_objects() {
        let mut base = serde_json::json!({"a": 1, "b": {"x": 1, "y": 2}});
        let overlay = serde_json::json!({"b": {"y": 3, "z": 4}, "c": 5});
        deep_merge(&mut base, overlay);
        assert_eq!(base, serde_json::json!({"a": 1, "b": {"x": 1, "y": 3, "z": 4}, "c": 5}));
    }

    #[test]
    fn canonicalize_is_key_order_independent() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(canonicalize_json(&a), canonicalize_json(&b));
    }

    #[test]
    fn load_layered_yaml_merges_two_files_into_a_typed_scheduler_config() {
        let dir = std::env::temp_dir().join(format!("loadhub-cfg-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let base_path = dir.join("base.yaml");
        let overlay_path = dir.join("overlay.yaml");
        write!(fs::File::create(&base_path).unwrap(), "scheduler:\n  poll_interval_seconds: 5\n").unwrap();
        write!(fs::File::create(&overlay_path).unwrap(), "scheduler:\n  worker_pool_max: 10\n").unwrap();

        let loaded = load_layered_yaml(&[
            base_path.to_str().unwrap(),
            overlay_path.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(loaded.scheduler.poll_interval_seconds, 5);
        assert_eq!(loaded.scheduler.worker_pool_max, 10);
        assert_eq!(loaded.raw_json["scheduler"]["poll_interval_seconds"], 5);
        assert_eq!(loaded.config_hash.len(), 64);
    }

    #[test]
    fn later_overlays_win_on_the_secrets_section_too() {
        let dir = std::env::temp_dir().join(format!("loadhub-cfg-test-secrets-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let base_path = dir.join("base.yaml");
        let overlay_path = dir.join("overlay.yaml");
        write!(fs::File::create(&base_path).unwrap(), "secrets:\n  jwt_secret_env: BASE_VAR\n").unwrap();
        write!(fs::File::create(&overlay_path).unwrap(), "secrets:\n  jwt_secret_env: OVERLAY_VAR\n").unwrap();

        let loaded = load_layered_yaml(&[
            base_path.to_str().unwrap(),
            overlay_path.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(loaded.raw_json["secrets"]["jwt_secret_env"], "OVERLAY_VAR");
    }
}
