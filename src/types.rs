use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Maximum number of methods returned by the complexity ranking.
pub const COMPLEXITY_LIMIT: usize = 10;

/// Aggregate node counts across the containment hierarchy.
///
/// Recomputed on every request; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeSummary {
    pub components: u64,
    pub files: u64,
    pub classes: u64,
    pub methods: u64,
}

/// Per-component structure and quality scores.
///
/// `cohesion` and `coupling` are stored on the component node by whatever
/// populated the graph; they are passed through untouched (integer or
/// float) and are `None` when the property is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDetail {
    pub name: String,
    #[serde(deserialize_with = "deserialize_score")]
    pub cohesion: Option<Number>,
    #[serde(deserialize_with = "deserialize_score")]
    pub coupling: Option<Number>,
    pub file_count: u64,
    pub class_count: u64,
}

/// Complexity score of a single method, keyed by its full signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityMetric {
    pub method: String,
    pub complexity: i64,
}

/// Row returned by the liveness query.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Liveness {
    pub ok: i64,
}

/// Accepts any numeric score or null without coercing it.
///
/// Goes through `deserialize_any` so the source's own integer/float
/// distinction decides the visit, not the target type.
fn deserialize_score<'de, D>(deserializer: D) -> Result<Option<Number>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(ScoreVisitor)
}

struct ScoreVisitor;

impl<'de> Visitor<'de> for ScoreVisitor {
    type Value = Option<Number>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or null")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(Number::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(Number::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Number::from_f64(v)
            .map(Some)
            .ok_or_else(|| E::custom(format!("score is not finite: {v}")))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(ScoreVisitor)
    }
}
