//! Search space definitions: dimensions, priors, candidates and the numeric
//! encoding the surrogate optimizer works in.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{BcvError, BcvResult};

/// How values are distributed along a numeric dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Prior {
    /// Uniform in the original scale.
    #[default]
    Uniform,
    /// Uniform in log-space (requires `low > 0`).
    LogUniform,
}

impl FromStr for Prior {
    type Err = BcvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "uniform" => Ok(Self::Uniform),
            "log-uniform" | "loguniform" => Ok(Self::LogUniform),
            other => Err(BcvError::Config(format!("unknown prior '{other}'"))),
        }
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform => write!(f, "uniform"),
            Self::LogUniform => write!(f, "log-uniform"),
        }
    }
}

/// A single searchable dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Dimension {
    /// Continuous range [low, high].
    Real {
        low: f64,
        high: f64,
        #[serde(default)]
        prior: Prior,
    },
    /// Integer range [low, high] inclusive.
    Integer {
        low: i64,
        high: i64,
        #[serde(default)]
        prior: Prior,
    },
    /// Unordered choices. Values are opaque payloads handed to the estimator.
    Categorical { choices: Vec<serde_json::Value> },
}

impl Dimension {
    pub fn real(low: f64, high: f64) -> Self {
        Self::Real {
            low,
            high,
            prior: Prior::Uniform,
        }
    }

    pub fn log_uniform(low: f64, high: f64) -> Self {
        Self::Real {
            low,
            high,
            prior: Prior::LogUniform,
        }
    }

    pub fn integer(low: i64, high: i64) -> Self {
        Self::Integer {
            low,
            high,
            prior: Prior::Uniform,
        }
    }

    pub fn categorical<I, V>(choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        Self::Categorical {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the invariants of this dimension, reporting errors against `name`.
    pub fn validate(&self, name: &str) -> BcvResult<()> {
        match self {
            Self::Real { low, high, prior } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(BcvError::invalid_dimension(
                        name,
                        format!("bounds must be finite, got [{low}, {high}]"),
                    ));
                }
                if low >= high {
                    return Err(BcvError::invalid_dimension(
                        name,
                        format!("low ({low}) must be strictly less than high ({high})"),
                    ));
                }
                if *prior == Prior::LogUniform && *low <= 0.0 {
                    return Err(BcvError::invalid_dimension(
                        name,
                        format!("log-uniform prior requires low > 0, got {low}"),
                    ));
                }
            }
            Self::Integer { low, high, prior } => {
                if low >= high {
                    return Err(BcvError::invalid_dimension(
                        name,
                        format!("low ({low}) must be strictly less than high ({high})"),
                    ));
                }
                if *prior == Prior::LogUniform && *low <= 0 {
                    return Err(BcvError::invalid_dimension(
                        name,
                        format!("log-uniform prior requires low > 0, got {low}"),
                    ));
                }
            }
            Self::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(BcvError::invalid_dimension(
                        name,
                        "categorical dimension needs at least one choice",
                    ));
                }
                for (i, choice) in choices.iter().enumerate() {
                    if choices[..i].contains(choice) {
                        return Err(BcvError::invalid_dimension(
                            name,
                            format!("duplicate categorical choice {choice}"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of columns this dimension occupies in the encoded vector.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Real { .. } | Self::Integer { .. } => 1,
            Self::Categorical { choices } => choices.len(),
        }
    }

    /// Per-column bounds of the encoding.
    pub fn encoded_bounds(&self) -> Vec<(f64, f64)> {
        match self {
            Self::Real { low, high, prior } => vec![warp(*low, *high, *prior)],
            Self::Integer { low, high, prior } => vec![warp(*low as f64, *high as f64, *prior)],
            Self::Categorical { choices } => vec![(0.0, 1.0); choices.len()],
        }
    }

    /// Whether `value` is a legal value of this dimension.
    pub fn contains(&self, value: &ParamValue) -> bool {
        match self {
            Self::Real { low, high, .. } => value
                .as_f64()
                .map(|v| v.is_finite() && v >= *low - tolerance(*low, *high) && v <= *high + tolerance(*low, *high))
                .unwrap_or(false),
            Self::Integer { low, high, .. } => value
                .as_i64()
                .map(|v| v >= *low && v <= *high)
                .unwrap_or(false),
            Self::Categorical { .. } => self.choice_index(value).is_some(),
        }
    }

    fn choice_index(&self, value: &ParamValue) -> Option<usize> {
        match self {
            Self::Categorical { choices } => {
                let needle = value.to_json();
                choices.iter().position(|c| *c == needle)
            }
            _ => None,
        }
    }

    /// Append the encoding of `value` to `out`.
    pub fn encode_into(&self, name: &str, value: &ParamValue, out: &mut Vec<f64>) -> BcvResult<()> {
        if !self.contains(value) {
            return Err(BcvError::invalid_candidate(format!(
                "value {value} is outside dimension '{name}'"
            )));
        }
        match self {
            Self::Real { low, high, prior } => {
                // contains() guarantees a number; clamp absorbs the tolerance band
                let v = value.as_f64().unwrap_or(*low).clamp(*low, *high);
                out.push(forward(v, *prior));
            }
            Self::Integer { prior, .. } => {
                let v = value.as_i64().unwrap_or_default() as f64;
                out.push(forward(v, *prior));
            }
            Self::Categorical { choices } => {
                let idx = self.choice_index(value).unwrap_or_default();
                out.extend((0..choices.len()).map(|i| if i == idx { 1.0 } else { 0.0 }));
            }
        }
        Ok(())
    }

    /// Decode this dimension's columns. Always yields an in-bounds value.
    pub fn decode(&self, columns: &[f64]) -> ParamValue {
        match self {
            Self::Real { low, high, prior } => {
                let v = backward(columns[0], *prior);
                ParamValue::Float(clamp_nan(v, *low, *high))
            }
            Self::Integer { low, high, prior } => {
                let v = backward(columns[0], *prior).round();
                let v = clamp_nan(v, *low as f64, *high as f64) as i64;
                ParamValue::Int(v.clamp(*low, *high))
            }
            Self::Categorical { choices } => {
                let mut best = 0;
                for (i, c) in columns.iter().enumerate() {
                    if *c > columns[best] {
                        best = i;
                    }
                }
                ParamValue::Json(choices[best].clone())
            }
        }
    }

    /// Map a unit coordinate `u ∈ [0, 1)` to a value, honoring the prior.
    pub fn from_unit(&self, u: f64) -> ParamValue {
        let u = clamp_nan(u, 0.0, 1.0);
        match self {
            Self::Real { low, high, prior } => {
                let (lo, hi) = warp(*low, *high, *prior);
                let v = backward(lerp(lo, hi, u), *prior);
                ParamValue::Float(v.clamp(*low, *high))
            }
            Self::Integer { low, high, prior } => {
                let v = match prior {
                    Prior::Uniform => {
                        // i128 keeps the full i64 range from overflowing
                        let span = (*high as i128 - *low as i128 + 1) as f64;
                        let offset = (u * span).floor() as i128;
                        (*low as i128 + offset).min(*high as i128) as i64
                    }
                    Prior::LogUniform => {
                        // widen by half a step so the end points keep their share
                        let lo = (*low as f64 - 0.5).max(0.5).ln();
                        let hi = (*high as f64 + 0.5).ln();
                        lerp(lo, hi, u).exp().round() as i64
                    }
                };
                ParamValue::Int(v.clamp(*low, *high))
            }
            Self::Categorical { choices } => {
                let idx = ((u * choices.len() as f64).floor() as usize).min(choices.len() - 1);
                ParamValue::Json(choices[idx].clone())
            }
        }
    }

    /// Draw one value at random according to the prior.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        self.from_unit(rng.gen::<f64>())
    }
}

fn warp(low: f64, high: f64, prior: Prior) -> (f64, f64) {
    (forward(low, prior), forward(high, prior))
}

fn forward(v: f64, prior: Prior) -> f64 {
    match prior {
        Prior::Uniform => v,
        Prior::LogUniform => v.ln(),
    }
}

fn backward(v: f64, prior: Prior) -> f64 {
    match prior {
        Prior::Uniform => v,
        Prior::LogUniform => v.exp(),
    }
}

/// Linear interpolation that stays finite for bounds near `f64::MAX`.
fn lerp(lo: f64, hi: f64, u: f64) -> f64 {
    lo * (1.0 - u) + hi * u
}

fn tolerance(low: f64, high: f64) -> f64 {
    (high * 1e-9 - low * 1e-9).abs().max(1e-9)
}

fn clamp_nan(v: f64, low: f64, high: f64) -> f64 {
    if v.is_nan() {
        low
    } else {
        v.clamp(low, high)
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParamValue {
    /// Numeric view. Integers widen; JSON numbers are read as-is.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    /// Integer view. Floats are accepted only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Self::Float(_) => None,
            Self::Json(v) => v.as_i64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Json(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Float(v) => serde_json::json!(v),
            Self::Int(v) => serde_json::json!(v),
            Self::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Json(serde_json::Value::Bool(v))
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Json(serde_json::Value::String(v))
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

/// One concrete configuration: parameter name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(BTreeMap<String, ParamValue>);

impl Candidate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Candidate {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A named dimension inside a [`SearchSpace`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDef {
    pub name: String,
    #[serde(flatten)]
    pub dimension: Dimension,
}

/// The full search space: an ordered, validated list of named dimensions.
///
/// Order is significant: it fixes the column layout of [`SearchSpace::encode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DimensionDef>", into = "Vec<DimensionDef>")]
pub struct SearchSpace {
    dimensions: Vec<DimensionDef>,
}

impl SearchSpace {
    /// Validate and build a space from named dimensions.
    pub fn new(dimensions: Vec<DimensionDef>) -> BcvResult<Self> {
        if dimensions.is_empty() {
            return Err(BcvError::invalid_dimension(
                "<space>",
                "a search space needs at least one dimension",
            ));
        }
        for (i, def) in dimensions.iter().enumerate() {
            if def.name.trim().is_empty() {
                return Err(BcvError::invalid_dimension(&def.name, "dimension name is empty"));
            }
            if dimensions[..i].iter().any(|d| d.name == def.name) {
                return Err(BcvError::invalid_dimension(&def.name, "duplicate dimension name"));
            }
            def.dimension.validate(&def.name)?;
        }
        Ok(Self { dimensions })
    }

    pub fn builder() -> SearchSpaceBuilder {
        SearchSpaceBuilder::default()
    }

    pub fn dimensions(&self) -> &[DimensionDef] {
        &self.dimensions
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| &d.dimension)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Length of the encoded vector (categoricals expand to one-hot blocks).
    pub fn encoded_len(&self) -> usize {
        self.dimensions.iter().map(|d| d.dimension.encoded_len()).sum()
    }

    pub fn encoded_bounds(&self) -> Vec<(f64, f64)> {
        self.dimensions
            .iter()
            .flat_map(|d| d.dimension.encoded_bounds())
            .collect()
    }

    /// Whether every parameter of `candidate` belongs to this space.
    pub fn contains(&self, candidate: &Candidate) -> bool {
        candidate.len() == self.dimensions.len()
            && self.dimensions.iter().all(|d| {
                candidate
                    .get(&d.name)
                    .map(|v| d.dimension.contains(v))
                    .unwrap_or(false)
            })
    }

    /// Numeric encoding of a candidate, in dimension order.
    pub fn encode(&self, candidate: &Candidate) -> BcvResult<Vec<f64>> {
        if let Some((name, _)) = candidate.iter().find(|(n, _)| self.dimension(n).is_none()) {
            return Err(BcvError::invalid_candidate(format!(
                "unknown parameter '{name}'"
            )));
        }
        let mut out = Vec::with_capacity(self.encoded_len());
        for def in &self.dimensions {
            let value = candidate.get(&def.name).ok_or_else(|| {
                BcvError::invalid_candidate(format!("missing parameter '{}'", def.name))
            })?;
            def.dimension.encode_into(&def.name, value, &mut out)?;
        }
        Ok(out)
    }

    /// Inverse of [`SearchSpace::encode`]; values are clamped into bounds.
    pub fn decode(&self, encoded: &[f64]) -> BcvResult<Candidate> {
        if encoded.len() != self.encoded_len() {
            return Err(BcvError::invalid_candidate(format!(
                "encoded vector has {} columns, space expects {}",
                encoded.len(),
                self.encoded_len()
            )));
        }
        let mut candidate = Candidate::new();
        let mut offset = 0;
        for def in &self.dimensions {
            let width = def.dimension.encoded_len();
            candidate.insert(def.name.clone(), def.dimension.decode(&encoded[offset..offset + width]));
            offset += width;
        }
        Ok(candidate)
    }

    /// Map one unit coordinate per dimension to a candidate.
    pub fn from_unit(&self, unit: &[f64]) -> BcvResult<Candidate> {
        if unit.len() != self.dimensions.len() {
            return Err(BcvError::invalid_candidate(format!(
                "unit point has {} coordinates, space has {} dimensions",
                unit.len(),
                self.dimensions.len()
            )));
        }
        Ok(self
            .dimensions
            .iter()
            .zip(unit)
            .map(|(d, u)| (d.name.clone(), d.dimension.from_unit(*u)))
            .collect())
    }

    /// Draw a candidate uniformly at random, respecting each prior.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Candidate {
        self.dimensions
            .iter()
            .map(|d| (d.name.clone(), d.dimension.sample(rng)))
            .collect()
    }
}

impl TryFrom<Vec<DimensionDef>> for SearchSpace {
    type Error = BcvError;

    fn try_from(dimensions: Vec<DimensionDef>) -> Result<Self, Self::Error> {
        Self::new(dimensions)
    }
}

impl From<SearchSpace> for Vec<DimensionDef> {
    fn from(space: SearchSpace) -> Self {
        space.dimensions
    }
}

/// Chainable builder; validation is deferred to [`SearchSpaceBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct SearchSpaceBuilder {
    dimensions: Vec<DimensionDef>,
}

impl SearchSpaceBuilder {
    pub fn dimension(mut self, name: impl Into<String>, dimension: Dimension) -> Self {
        self.dimensions.push(DimensionDef {
            name: name.into(),
            dimension,
        });
        self
    }

    pub fn real(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.dimension(name, Dimension::real(low, high))
    }

    pub fn log_uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.dimension(name, Dimension::log_uniform(low, high))
    }

    pub fn integer(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.dimension(name, Dimension::integer(low, high))
    }

    pub fn categorical<I, V>(self, name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        self.dimension(name, Dimension::categorical(choices))
    }

    pub fn build(self) -> BcvResult<SearchSpace> {
        SearchSpace::new(self.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn svc_space() -> SearchSpace {
        SearchSpace::builder()
            .log_uniform("C", 1e-6, 1e6)
            .log_uniform("gamma", 1e-6, 1e1)
            .integer("degree", 1, 8)
            .categorical("kernel", ["linear", "poly", "rbf"])
            .build()
            .unwrap()
    }

    #[test]
    fn builder_preserves_order() {
        let space = svc_space();
        let names: Vec<&str> = space.names().collect();
        assert_eq!(names, vec!["C", "gamma", "degree", "kernel"]);
        assert_eq!(space.len(), 4);
        assert_eq!(space.encoded_len(), 1 + 1 + 1 + 3);
    }

    #[test]
    fn rejects_malformed_dimensions() {
        let inverted = SearchSpace::builder().real("x", 1.0, 0.0).build();
        assert!(matches!(inverted, Err(BcvError::InvalidDimension { .. })));

        let non_finite = SearchSpace::builder().real("x", 0.0, f64::INFINITY).build();
        assert!(matches!(non_finite, Err(BcvError::InvalidDimension { .. })));

        let log_zero = SearchSpace::builder().log_uniform("x", 0.0, 1.0).build();
        assert!(matches!(log_zero, Err(BcvError::InvalidDimension { .. })));

        let empty_choices = SearchSpace::builder()
            .categorical("k", Vec::<String>::new())
            .build();
        assert!(matches!(empty_choices, Err(BcvError::InvalidDimension { .. })));

        let duplicate = SearchSpace::builder()
            .integer("x", 1, 3)
            .integer("x", 1, 3)
            .build();
        assert!(matches!(duplicate, Err(BcvError::InvalidDimension { .. })));

        let empty = SearchSpace::builder().build();
        assert!(matches!(empty, Err(BcvError::InvalidDimension { .. })));
    }

    #[test]
    fn log_uniform_encodes_as_natural_log() {
        let space = SearchSpace::builder().log_uniform("C", 0.01, 100.0).build().unwrap();
        let candidate = Candidate::new().with("C", 1.0);
        let encoded = space.encode(&candidate).unwrap();
        assert!(encoded[0].abs() < 1e-12);
        let bounds = space.encoded_bounds();
        assert!((bounds[0].0 - 0.01_f64.ln()).abs() < 1e-12);
        assert!((bounds[0].1 - 100.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn categorical_encodes_one_hot() {
        let space = svc_space();
        let candidate = Candidate::new()
            .with("C", 1.0)
            .with("gamma", 0.1)
            .with("degree", 3)
            .with("kernel", "poly");
        let encoded = space.encode(&candidate).unwrap();
        assert_eq!(&encoded[3..], &[0.0, 1.0, 0.0]);
        let decoded = space.decode(&encoded).unwrap();
        assert_eq!(decoded.get_str("kernel"), Some("poly"));
        assert_eq!(decoded.get_i64("degree"), Some(3));
    }

    #[test]
    fn decode_rounds_integers_and_clamps() {
        let space = SearchSpace::builder()
            .integer("n", 1, 10)
            .real("x", 0.0, 1.0)
            .build()
            .unwrap();
        let decoded = space.decode(&[4.6, 7.0]).unwrap();
        assert_eq!(decoded.get("n"), Some(&ParamValue::Int(5)));
        assert_eq!(decoded.get("x"), Some(&ParamValue::Float(1.0)));

        let decoded = space.decode(&[-30.0, f64::NAN]).unwrap();
        assert_eq!(decoded.get("n"), Some(&ParamValue::Int(1)));
        assert_eq!(decoded.get("x"), Some(&ParamValue::Float(0.0)));
    }

    #[test]
    fn encode_rejects_foreign_candidates() {
        let space = svc_space();
        let missing = Candidate::new().with("C", 1.0);
        assert!(matches!(space.encode(&missing), Err(BcvError::InvalidCandidate { .. })));

        let out_of_range = Candidate::new()
            .with("C", 1e9)
            .with("gamma", 0.1)
            .with("degree", 3)
            .with("kernel", "rbf");
        assert!(space.encode(&out_of_range).is_err());

        let unknown_choice = Candidate::new()
            .with("C", 1.0)
            .with("gamma", 0.1)
            .with("degree", 3)
            .with("kernel", "sigmoid");
        assert!(space.encode(&unknown_choice).is_err());

        let extra = Candidate::new()
            .with("C", 1.0)
            .with("gamma", 0.1)
            .with("degree", 3)
            .with("kernel", "rbf")
            .with("tol", 1e-3);
        assert!(space.encode(&extra).is_err());
    }

    #[test]
    fn nested_estimator_choices_are_opaque() {
        let space = SearchSpace::builder()
            .categorical(
                "model",
                [json!({"name": "svc", "kernel": "rbf"}), json!({"name": "linear_svc"})],
            )
            .build()
            .unwrap();
        let candidate = Candidate::new().with("model", json!({"name": "linear_svc"}));
        let encoded = space.encode(&candidate).unwrap();
        assert_eq!(encoded, vec![0.0, 1.0]);
        assert_eq!(space.decode(&encoded).unwrap(), candidate);
    }

    #[test]
    fn sampling_respects_bounds_and_log_prior() {
        let space = SearchSpace::builder()
            .log_uniform("lr", 1e-5, 1e-1)
            .integer("depth", 2, 6)
            .build()
            .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut below_geometric_mean = 0;
        for _ in 0..2000 {
            let candidate = space.sample(&mut rng);
            assert!(space.contains(&candidate));
            if candidate.get_f64("lr").unwrap() < 1e-3 {
                below_geometric_mean += 1;
            }
        }
        // half the mass of a log-uniform on [1e-5, 1e-1] lies below 1e-3
        assert!((800..1200).contains(&below_geometric_mean), "{below_geometric_mean}");
    }

    #[test]
    fn from_unit_covers_every_integer_and_choice() {
        let dim = Dimension::integer(1, 4);
        let seen: Vec<ParamValue> = [0.0, 0.26, 0.51, 0.99].iter().map(|u| dim.from_unit(*u)).collect();
        assert_eq!(
            seen,
            vec![ParamValue::Int(1), ParamValue::Int(2), ParamValue::Int(3), ParamValue::Int(4)]
        );

        let dim = Dimension::categorical(["a", "b"]);
        assert_eq!(dim.from_unit(0.2).as_str(), Some("a"));
        assert_eq!(dim.from_unit(1.0).as_str(), Some("b"));
    }

    #[test]
    fn extreme_integer_bounds_sample_without_overflow() {
        let space = SearchSpace::builder()
            .integer("n", 0, i64::MAX)
            .integer("m", i64::MIN, i64::MAX)
            .build()
            .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut above_half = 0;
        for _ in 0..200 {
            let candidate = space.sample(&mut rng);
            assert!(space.contains(&candidate));
            if candidate.get_i64("n").unwrap() > i64::MAX / 2 {
                above_half += 1;
            }
        }
        assert!((60..140).contains(&above_half), "{above_half}");

        let dim = Dimension::integer(i64::MIN, i64::MAX);
        assert_eq!(dim.from_unit(0.0), ParamValue::Int(i64::MIN));
        assert_eq!(dim.from_unit(1.0), ParamValue::Int(i64::MAX));
    }

    #[test]
    fn extreme_real_bounds_follow_the_prior() {
        let dim = Dimension::real(-1e308, 1e308);
        assert_eq!(dim.from_unit(0.0), ParamValue::Float(-1e308));
        assert_eq!(dim.from_unit(1.0), ParamValue::Float(1e308));
        assert_eq!(dim.from_unit(0.5), ParamValue::Float(0.0));

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let draws: Vec<f64> = (0..50).map(|_| dim.sample(&mut rng).as_f64().unwrap()).collect();
        assert!(draws.iter().all(|v| v.is_finite() && v.abs() <= 1e308));
        let negative = draws.iter().filter(|v| **v < 0.0).count();
        assert!((10..40).contains(&negative), "{negative}");
        assert!(!dim.contains(&ParamValue::Float(f64::MAX)));
    }

    #[test]
    fn space_deserialization_validates() {
        let ok: SearchSpace = serde_json::from_value(json!([
            {"name": "C", "type": "real", "low": 0.01, "high": 100.0, "prior": "log-uniform"},
            {"name": "kernel", "type": "categorical", "choices": ["rbf", "poly"]}
        ]))
        .unwrap();
        assert_eq!(ok.len(), 2);

        let bad = serde_json::from_value::<SearchSpace>(json!([
            {"name": "C", "type": "real", "low": 1.0, "high": 0.5}
        ]));
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            c in 1e-6f64..1e6,
            gamma in 1e-6f64..10.0,
            degree in 1i64..=8,
            k in 0usize..3,
            estimators in 1i64..=5000,
        ) {
            let space = SearchSpace::builder()
                .log_uniform("C", 1e-6, 1e6)
                .log_uniform("gamma", 1e-6, 1e1)
                .integer("degree", 1, 8)
                .categorical("kernel", ["linear", "poly", "rbf"])
                .dimension(
                    "n_estimators",
                    Dimension::Integer { low: 1, high: 5000, prior: Prior::LogUniform },
                )
                .build()
                .unwrap();
            let kernels = ["linear", "poly", "rbf"];
            let candidate = Candidate::new()
                .with("C", c)
                .with("gamma", gamma)
                .with("degree", degree)
                .with("kernel", kernels[k])
                .with("n_estimators", estimators);
            let decoded = space.decode(&space.encode(&candidate).unwrap()).unwrap();

            let rel = |a: f64, b: f64| ((a - b) / b).abs();
            prop_assert!(rel(decoded.get_f64("C").unwrap(), c) < 1e-9);
            prop_assert!(rel(decoded.get_f64("gamma").unwrap(), gamma) < 1e-9);
            prop_assert_eq!(decoded.get_i64("degree"), Some(degree));
            prop_assert_eq!(decoded.get_str("kernel"), Some(kernels[k]));
            prop_assert_eq!(decoded.get_i64("n_estimators"), Some(estimators));
        }
    }
}
