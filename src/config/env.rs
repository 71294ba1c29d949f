//! Environment-variable overrides
//!
//! `KEYMASTER_NETWORKS_GOERLI_ENDPOINT=https://...` replaces
//! `networks.goerli.endpoint` in the loaded document. Path segments are matched
//! against existing keys case-insensitively, preferring the longest run of
//! segments that names a key, so `KEYMASTER_NETWORKS_ARB_RINKEBY_THRESHOLD`
//! reaches a network called `arb-rinkeby`.

use serde_json::{Map, Value};
use std::ffi::OsString;

/// Prefix of every override variable
pub const ENV_PREFIX: &str = "KEYMASTER";

/// Merge matching variables into `document`; returns how many were applied
pub fn apply_overrides<I, K, V>(document: &mut Value, prefix: &str, vars: I) -> usize
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let marker = format!("{}_", prefix);
    let mut applied = 0;

    for (name, raw) in vars {
        let name = name.as_ref();
        let Some(path) = strip_prefix_ignore_case(name, &marker) else {
            continue;
        };

        let segments: Vec<String> = path
            .split('_')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if segments.is_empty() {
            continue;
        }

        if set_path(document, &segments, parse_value(raw.as_ref())) {
            // Values may be signing keys; only the variable name is logged
            tracing::debug!(variable = name, "Applied configuration override");
            applied += 1;
        } else {
            tracing::warn!(
                variable = name,
                "Ignoring override that points inside a non-object value"
            );
        }
    }

    applied
}

/// Keep only variables whose name and value are valid UTF-8
pub fn utf8_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    if name.len() > prefix.len()
        && name.is_char_boundary(prefix.len())
        && name[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&name[prefix.len()..])
    } else {
        None
    }
}

fn normalize(key: &str) -> String {
    key.to_ascii_lowercase().replace('-', "_")
}

fn set_path(node: &mut Value, segments: &[String], value: Value) -> bool {
    let Value::Object(map) = node else {
        return false;
    };

    let existing = (1..=segments.len()).rev().find_map(|take| {
        let candidate = segments[..take].join("_");
        map.keys()
            .find(|key| normalize(key) == candidate)
            .map(|key| (key.clone(), take))
    });
    let (key, take) = existing.unwrap_or_else(|| (segments[0].clone(), 1));

    let rest = &segments[take..];
    if rest.is_empty() {
        map.insert(key, value);
        return true;
    }

    let child = map
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    set_path(child, rest, value)
}

/// Typed JSON when the value parses as JSON, otherwise a plain string
///
/// Integers too wide for a JSON number stay strings so wei amounts keep
/// every digit.
fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Number(n)) if n.is_f64() && raw.trim().bytes().all(|b| b.is_ascii_digit()) => {
            Value::String(raw.trim().to_string())
        }
        Ok(value) => value,
        Err(_) => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "environment": "staging",
            "networks": {
                "goerli": { "endpoint": "http://old", "threshold": 1 },
                "arb-rinkeby": { "endpoint": "http://arb", "threshold": 1 }
            },
            "homes": {
                "goerli": { "replicas": ["arb-rinkeby"] }
            }
        })
    }

    #[test]
    fn overrides_nested_string() {
        let mut doc = document();
        let applied = apply_overrides(
            &mut doc,
            ENV_PREFIX,
            [("KEYMASTER_NETWORKS_GOERLI_ENDPOINT", "https://new.example")],
        );
        assert_eq!(applied, 1);
        assert_eq!(doc["networks"]["goerli"]["endpoint"], "https://new.example");
    }

    #[test]
    fn matches_hyphenated_keys_greedily() {
        let mut doc = document();
        apply_overrides(
            &mut doc,
            ENV_PREFIX,
            [("KEYMASTER_NETWORKS_ARB_RINKEBY_THRESHOLD", "5")],
        );
        assert_eq!(doc["networks"]["arb-rinkeby"]["threshold"], 5);
        assert!(doc["networks"].get("arb").is_none());
    }

    #[test]
    fn typed_and_wide_values() {
        let mut doc = document();
        apply_overrides(
            &mut doc,
            ENV_PREFIX,
            [
                ("KEYMASTER_HOMES_GOERLI_REPLICAS", "[\"goerli\"]"),
                (
                    "KEYMASTER_NETWORKS_GOERLI_THRESHOLD",
                    "100000000000000000000000",
                ),
                ("KEYMASTER_ENVIRONMENT", "production"),
            ],
        );
        assert_eq!(doc["homes"]["goerli"]["replicas"], json!(["goerli"]));
        assert_eq!(
            doc["networks"]["goerli"]["threshold"],
            "100000000000000000000000"
        );
        assert_eq!(doc["environment"], "production");
    }

    #[test]
    fn unknown_keys_are_created() {
        let mut doc = document();
        apply_overrides(&mut doc, ENV_PREFIX, [("KEYMASTER_LOGGING_LEVEL", "debug")]);
        assert_eq!(doc["logging"]["level"], "debug");
    }

    #[test]
    fn ignores_other_variables_and_scalar_parents() {
        let mut doc = document();
        let applied = apply_overrides(
            &mut doc,
            ENV_PREFIX,
            [
                ("PATH", "/usr/bin"),
                ("KEYMASTER_", "x"),
                ("KEYMASTER_ENVIRONMENT_NAME", "x"),
            ],
        );
        assert_eq!(applied, 0);
        assert_eq!(doc, document());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from_vec(vec![0x4b, 0xff]), OsString::from("x")),
            (
                OsString::from("KEYMASTER_LOGGING_LEVEL"),
                OsString::from_vec(vec![0x64, 0xfe]),
            ),
            (
                OsString::from("KEYMASTER_ENVIRONMENT"),
                OsString::from("production"),
            ),
        ];

        let mut doc = document();
        let applied = apply_overrides(&mut doc, ENV_PREFIX, utf8_vars(vars));
        assert_eq!(applied, 1);
        assert_eq!(doc["environment"], "production");
        assert!(doc.get("logging").is_none());
    }
}
