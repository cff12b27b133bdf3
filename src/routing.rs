//! Asset routing.
//!
//! Given the signal bag a harvested crop arrives with, decide what kind of
//! asset it is and which generator should build it. Routing is a pure, total
//! function: any bag (including an empty one) yields a decision.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Signal keys a prop needs for specialized backend selection.
pub const PROP_ROUTING_SIGNALS: [&str; 4] = ["has_mask", "num_instances", "area_ratio", "bg_score"];

/// Opaque measurements attached to a harvested asset.
///
/// Values stay as raw JSON so the manifest records exactly what the harvester
/// emitted; typed accessors interpret them for routing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalBag(pub BTreeMap<String, Value>);

impl SignalBag {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|value| !value.is_null())
    }

    pub fn has_person(&self) -> Option<bool> {
        self.flag("has_person")
    }

    pub fn has_mask(&self) -> Option<bool> {
        self.flag("has_mask")
    }

    /// Compared unrounded: `1.4` is more than one instance and not exactly one.
    pub fn num_instances(&self) -> Option<f64> {
        match self.0.get("num_instances")? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn area_ratio(&self) -> Option<f64> {
        match self.0.get("area_ratio")? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bg_score(&self) -> Option<&str> {
        self.0.get("bg_score")?.as_str()
    }

    /// True when any of the four prop routing signals is absent.
    pub fn prop_signals_incomplete(&self) -> bool {
        PROP_ROUTING_SIGNALS.iter().any(|key| !self.contains(key))
    }

    fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(flag) => Some(*flag),
            Value::Number(number) => number.as_f64().map(|value| value != 0.0),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Scene,
    Prop,
    Human,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Scene => "scene",
            AssetType::Prop => "prop",
            AssetType::Human => "human",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External generator tags recorded in `backend_selected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Whole-scene gaussian generation from the source photograph.
    MlSharp,
    /// General single-object image-to-3D.
    Trellis,
    /// Multi-instance object reconstruction.
    Sam3dObjects,
    /// Human body reconstruction.
    Sam3dBody,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::MlSharp => "ml_sharp",
            Backend::Trellis => "trellis",
            Backend::Sam3dObjects => "sam3d_objects",
            Backend::Sam3dBody => "sam3d_body",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const GENERAL_BACKEND: Backend = Backend::Trellis;
pub const MULTI_INSTANCE_BACKEND: Backend = Backend::Sam3dObjects;
pub const HUMAN_BACKEND: Backend = Backend::Sam3dBody;

/// Caller overrides; `None` means "auto".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOverrides {
    pub asset_type: Option<AssetType>,
    pub backend: Option<Backend>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub asset_type: AssetType,
    pub backend: Backend,
    pub signals_incomplete: bool,
    pub asset_type_forced: bool,
    pub backend_forced: bool,
}

pub fn route(signals: &SignalBag, overrides: RouteOverrides) -> RoutingDecision {
    let asset_type = overrides
        .asset_type
        .unwrap_or_else(|| classify(signals));

    let (backend, signals_incomplete) = match overrides.backend {
        Some(backend) => (backend, false),
        None => select_backend(asset_type, signals),
    };

    RoutingDecision {
        asset_type,
        backend,
        signals_incomplete,
        asset_type_forced: overrides.asset_type.is_some(),
        backend_forced: overrides.backend.is_some(),
    }
}

/// Signal-driven classification; the first matching rule wins.
pub fn classify(signals: &SignalBag) -> AssetType {
    if signals.has_person() == Some(true) {
        return AssetType::Human;
    }
    let num_instances = signals.num_instances();
    let area_ratio = signals.area_ratio();
    if signals.has_mask() == Some(true)
        || num_instances.is_some_and(|count| count > 1.0)
        || area_ratio.is_some_and(|ratio| ratio <= 0.5)
    {
        return AssetType::Prop;
    }
    if num_instances == Some(1.0)
        && area_ratio.is_some_and(|ratio| ratio > 0.5)
        && signals.bg_score() == Some("low")
    {
        return AssetType::Prop;
    }
    AssetType::Scene
}

fn select_backend(asset_type: AssetType, signals: &SignalBag) -> (Backend, bool) {
    match asset_type {
        AssetType::Human => (HUMAN_BACKEND, false),
        AssetType::Scene => (GENERAL_BACKEND, false),
        AssetType::Prop => {
            if signals.prop_signals_incomplete() {
                return (GENERAL_BACKEND, true);
            }
            let multi_instance = signals.num_instances().is_some_and(|count| count > 1.0)
                || signals.area_ratio().is_some_and(|ratio| ratio <= 0.5);
            if multi_instance {
                (MULTI_INSTANCE_BACKEND, false)
            } else {
                (GENERAL_BACKEND, false)
            }
        }
    }
}
