use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{Map, Number, Value};

use super::{ActionTable, CanonicalEvent, RawEvent, UNKNOWN_ID};

const TYPE_KEYS: &[&str] = &["Type", "type"];
const ACTION_KEYS: &[&str] = &["Action", "action", "status"];
const ACTOR_KEYS: &[&str] = &["Actor", "actor"];
const ATTRIBUTE_KEYS: &[&str] = &["Attributes", "attributes"];
const ID_KEYS: &[&str] = &["id", "ID"];
const EXIT_CODE_KEYS: &[&str] = &["exitCode", "exit_code", "exit"];

/// The parts of a raw event an [`Extractor`] gets to look at.
pub struct EventView<'a> {
    pub raw: &'a Map<String, Value>,
    pub actor: Option<&'a Map<String, Value>>,
    pub attributes: &'a Map<String, Value>,
}

impl EventView<'_> {
    fn actor_id(&self) -> Option<&str> {
        self.actor.and_then(|actor| first_str(actor, ID_KEYS))
    }
}

/// Resource identity resolved by a domain specific extraction strategy.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub exit_code: Option<i64>,
}

pub type Extractor = fn(&EventView<'_>) -> Identity;

/// Converts raw runtime events into [`CanonicalEvent`]s.
///
/// Verbs are resolved through an [`ActionTable`] and the resource identity
/// through a per-domain [`Extractor`]; domains without an entry use the
/// generic strategy.
pub struct Normalizer {
    actions: ActionTable,
    extractors: HashMap<String, Extractor>,
    fallback: Extractor,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(ActionTable::default())
    }
}

impl Normalizer {
    pub fn new(actions: ActionTable) -> Self {
        let mut extractors: HashMap<String, Extractor> = HashMap::new();
        extractors.insert("container".to_string(), extract_container);
        Self {
            actions,
            extractors,
            fallback: extract_generic,
        }
    }

    pub fn with_extractor(mut self, domain: impl Into<String>, extractor: Extractor) -> Self {
        self.extractors.insert(domain.into(), extractor);
        self
    }

    /// Returns `None` for anything that is not an object or has no action.
    pub fn normalize(&self, raw: &RawEvent) -> Option<CanonicalEvent> {
        let Some(map) = raw.as_object() else {
            log::debug!("Ignoring non-object event: {raw}");
            return None;
        };

        let domain = first_str(map, TYPE_KEYS)
            .map(str::to_lowercase)
            .unwrap_or_else(|| "unknown".to_string());

        let Some(action) = first_str(map, ACTION_KEYS).and_then(|a| self.actions.normalize(a))
        else {
            log::debug!("Ignoring event without an action: {raw}");
            return None;
        };

        let actor = first_object(map, ACTOR_KEYS);
        let attributes = actor
            .and_then(|actor| first_object(actor, ATTRIBUTE_KEYS))
            .cloned()
            .unwrap_or_default();

        let view = EventView {
            raw: map,
            actor,
            attributes: &attributes,
        };
        let extract = self
            .extractors
            .get(&domain)
            .copied()
            .unwrap_or(self.fallback);
        let identity = extract(&view);

        Some(CanonicalEvent {
            domain,
            action,
            id: identity.id.unwrap_or_else(|| UNKNOWN_ID.to_string()),
            name: identity.name,
            image: identity.image,
            exit_code: identity.exit_code,
            timestamp: resolve_timestamp(map),
            attributes,
            raw: map.clone(),
        })
    }
}

static DEFAULT_NORMALIZER: OnceLock<Normalizer> = OnceLock::new();

/// Normalizes `raw` with the default action table and extractors.
pub fn normalize(raw: &RawEvent) -> Option<CanonicalEvent> {
    DEFAULT_NORMALIZER
        .get_or_init(Normalizer::default)
        .normalize(raw)
}

fn extract_container(view: &EventView<'_>) -> Identity {
    let id = first_str(view.raw, ID_KEYS)
        .or_else(|| first_str(view.attributes, &["container", "id"]))
        .or_else(|| view.actor_id());

    // Per key, the top-level value is only consulted when the attribute is absent.
    let exit_code = EXIT_CODE_KEYS.iter().find_map(|key| {
        view.attributes
            .get(*key)
            .or_else(|| view.raw.get(*key))
            .and_then(parse_exit_code)
    });

    Identity {
        id: id.map(str::to_string),
        name: first_str(view.attributes, &["name", "container"]).map(str::to_string),
        image: first_str(view.attributes, &["image", "image.name"]).map(str::to_string),
        exit_code,
    }
}

fn extract_generic(view: &EventView<'_>) -> Identity {
    let id = first_str(view.raw, ID_KEYS).or_else(|| view.actor_id());
    Identity {
        id: id.map(str::to_string),
        name: first_str(view.attributes, &["name"]).map(str::to_string),
        image: first_str(view.attributes, &["image"]).map(str::to_string),
        exit_code: None,
    }
}

/// First key holding a non-empty string.
fn first_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

/// First key holding a non-empty object.
fn first_object<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Map<String, Value>> {
    keys.iter().find_map(|key| {
        map.get(*key)
            .and_then(Value::as_object)
            .filter(|obj| !obj.is_empty())
    })
}

fn parse_exit_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => integral(n),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integral(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

fn positive_number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|t| *t > 0.0)
}

fn resolve_timestamp(map: &Map<String, Value>) -> f64 {
    positive_number(map.get("time"))
        .or_else(|| positive_number(map.get("timeNano")).map(|nanos| nanos / 1e9))
        .or_else(|| positive_number(map.get("timestamp")))
        .or_else(|| positive_number(map.get("timeStamp")))
        .unwrap_or_else(now_seconds)
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use serde_json::json;

    fn die_event() -> Value {
        json!({
            "Type": "container",
            "Action": "die",
            "id": "4f3c9a1b2d7e8f90aabbccdd",
            "time": 1700000000,
            "timeNano": 1700000000123456789_i64,
            "Actor": {
                "ID": "4f3c9a1b2d7e8f90aabbccdd",
                "Attributes": {
                    "name": "web",
                    "image": "nginx:1.25",
                    "exitCode": "137"
                }
            }
        })
    }

    #[test]
    fn test_container_die_event() {
        let event = normalize(&die_event()).expect("die event should normalize");
        assert_eq!(event.domain, "container");
        assert_eq!(event.action, "die");
        assert_eq!(event.id, "4f3c9a1b2d7e8f90aabbccdd");
        assert_eq!(event.name.as_deref(), Some("web"));
        assert_eq!(event.image.as_deref(), Some("nginx:1.25"));
        assert_eq!(event.exit_code, Some(137));
        assert_eq!(event.timestamp, 1700000000.0);
        assert_eq!(event.attributes.len(), 3);
        assert_eq!(Value::Object(event.raw), die_event());
    }

    #[test]
    fn test_lowercase_keys_and_status_fallback() {
        let raw = json!({
            "type": "Container",
            "status": "start",
            "actor": { "attributes": { "container": "db", "image.name": "postgres" } }
        });
        let event = normalize(&raw).expect("event should normalize");
        assert_eq!(event.domain, "container");
        assert_eq!(event.action, "start");
        assert_eq!(event.id, "db");
        assert_eq!(event.name.as_deref(), Some("db"));
        assert_eq!(event.image.as_deref(), Some("postgres"));
    }

    #[test]
    fn test_action_key_priority() {
        let raw = json!({ "Type": "container", "Action": "stop", "action": "start", "status": "die" });
        assert_eq!(normalize(&raw).map(|e| e.action).as_deref(), Some("stop"));

        let raw = json!({ "Type": "container", "action": "start", "status": "die" });
        assert_eq!(normalize(&raw).map(|e| e.action).as_deref(), Some("start"));
    }

    #[test]
    fn test_missing_type_is_unknown_domain() {
        let raw = json!({ "Action": "reload", "ID": "abc" });
        let event = normalize(&raw).expect("event should normalize");
        assert_eq!(event.domain, "unknown");
        assert_eq!(event.id, "abc");
        assert_eq!(event.exit_code, None);
    }

    #[test]
    fn test_health_status_is_mapped() {
        let raw = json!({ "Type": "container", "Action": "health_status: unhealthy" });
        let event = normalize(&raw).expect("event should normalize");
        assert_eq!(event.action, "health_unhealthy");
        assert_eq!(event.id, UNKNOWN_ID);
    }

    #[test]
    fn test_unknown_action_passes_through() {
        let raw = json!({ "Type": "container", "Action": "  OOM  " });
        assert_eq!(normalize(&raw).map(|e| e.action).as_deref(), Some("oom"));
    }

    #[test]
    fn test_blank_action_is_absent() {
        let raw = json!({ "Type": "container", "Action": "   " });
        assert!(normalize(&raw).is_none());
    }

    #[test]
    fn test_non_string_action_is_absent() {
        let raw = json!({ "Type": "container", "Action": 42 });
        assert!(normalize(&raw).is_none());
    }

    #[test]
    fn test_exit_code_scan_order() {
        let raw = json!({
            "Type": "container",
            "Action": "die",
            "exitCode": 1,
            "Actor": { "Attributes": { "exitCode": "not-a-number", "exit": "3" } }
        });
        assert_eq!(normalize(&raw).and_then(|e| e.exit_code), Some(3));

        let raw = json!({
            "Type": "container",
            "Action": "die",
            "exit_code": 2,
            "Actor": { "Attributes": { "exitCode": "oops" } }
        });
        assert_eq!(normalize(&raw).and_then(|e| e.exit_code), Some(2));

        let raw = json!({
            "Type": "container",
            "Action": "die",
            "Actor": { "Attributes": { "exitCode": " 0 " } }
        });
        assert_eq!(normalize(&raw).and_then(|e| e.exit_code), Some(0));
    }

    #[test]
    fn test_exit_code_keys_take_priority_over_location() {
        let raw = json!({
            "Type": "container",
            "Action": "die",
            "exitCode": 1,
            "Actor": { "Attributes": { "exit": "3" } }
        });
        assert_eq!(normalize(&raw).and_then(|e| e.exit_code), Some(1));

        let raw = json!({
            "Type": "container",
            "Action": "die",
            "exitCode": 1,
            "Actor": { "Attributes": { "exitCode": "137" } }
        });
        assert_eq!(normalize(&raw).and_then(|e| e.exit_code), Some(137));
    }

    #[test]
    fn test_non_integer_exit_codes_are_ignored() {
        let raw = json!({
            "Type": "container",
            "Action": "die",
            "exit": 1.5,
            "Actor": { "Attributes": { "exitCode": "1.5", "exit_code": true } }
        });
        let event = normalize(&raw).expect("event should normalize");
        assert_eq!(event.exit_code, None);
    }

    #[test]
    fn test_integral_float_exit_code() {
        let raw = json!({ "Type": "container", "Action": "die", "exitCode": 137.0 });
        assert_eq!(normalize(&raw).and_then(|e| e.exit_code), Some(137));
    }

    #[test]
    fn test_non_container_domains_never_carry_exit_code() {
        let raw = json!({
            "Type": "network",
            "Action": "connect",
            "exitCode": 1,
            "Actor": {
                "ID": "net-1",
                "Attributes": { "name": "bridge", "container": "c1", "exitCode": "1" }
            }
        });
        let event = normalize(&raw).expect("event should normalize");
        assert_eq!(event.domain, "network");
        assert_eq!(event.id, "net-1");
        assert_eq!(event.name.as_deref(), Some("bridge"));
        assert_eq!(event.image, None);
        assert_eq!(event.exit_code, None);
    }

    #[test]
    fn test_container_id_falls_back_to_actor_id() {
        let raw = json!({
            "Type": "container",
            "Action": "start",
            "Actor": { "ID": "deadbeef", "Attributes": { "name": "web" } }
        });
        assert_eq!(normalize(&raw).map(|e| e.id).as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_malformed_actor_yields_empty_attributes() {
        for actor in [json!("oops"), json!({ "Attributes": [1, 2] }), json!(null)] {
            let raw = json!({ "Type": "container", "Action": "start", "Actor": actor });
            let event = normalize(&raw).expect("event should normalize");
            assert!(event.attributes.is_empty());
            assert_eq!(event.name, None);
            assert_eq!(event.id, UNKNOWN_ID);
        }
    }

    #[test]
    fn test_time_wins_over_time_nano() {
        let raw = json!({ "Action": "start", "time": 1700000000, "timeNano": 1800000000000000000_i64 });
        assert_eq!(normalize(&raw).map(|e| e.timestamp), Some(1700000000.0));
    }

    #[test]
    fn test_time_nano_is_converted() {
        let raw = json!({ "Action": "start", "timeNano": 1700000000500000000_i64 });
        let expected = 1700000000500000000_i64 as f64 / 1e9;
        assert_eq!(normalize(&raw).map(|e| e.timestamp), Some(expected));
    }

    #[test]
    fn test_non_positive_time_is_skipped() {
        let raw = json!({ "Action": "start", "time": 0, "timeNano": -5, "timeStamp": 1600000000.25 });
        assert_eq!(normalize(&raw).map(|e| e.timestamp), Some(1600000000.25));
    }

    #[test]
    fn test_missing_time_uses_now() {
        let before = now_seconds();
        let event = normalize(&json!({ "Action": "start", "time": "yesterday" }))
            .expect("event should normalize");
        let after = now_seconds();
        assert!(event.timestamp >= before - 1.0 && event.timestamp <= after + 1.0);
    }

    #[test]
    fn test_custom_extractor() {
        fn volume(view: &EventView<'_>) -> Identity {
            Identity {
                id: first_str(view.attributes, &["driver"]).map(str::to_string),
                ..Identity::default()
            }
        }
        let normalizer = Normalizer::default().with_extractor("volume", volume);
        let raw = json!({
            "Type": "volume",
            "Action": "mount",
            "Actor": { "Attributes": { "driver": "local" } }
        });
        let event = normalizer.normalize(&raw).expect("event should normalize");
        assert_eq!(event.id, "local");
    }

    #[quickcheck]
    fn prop_non_mapping_is_absent(n: i64, f: f64, s: String, b: bool, items: Vec<String>) -> bool {
        let values = [
            Value::Null,
            json!(n),
            json!(f),
            json!(s),
            json!(b),
            json!(items),
        ];
        values.iter().all(|value| normalize(value).is_none())
    }

    #[quickcheck]
    fn prop_missing_action_is_absent(fields: HashMap<String, String>) -> bool {
        let map: Map<String, Value> = fields
            .into_iter()
            .filter(|(key, _)| !ACTION_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        normalize(&Value::Object(map)).is_none()
    }
}
