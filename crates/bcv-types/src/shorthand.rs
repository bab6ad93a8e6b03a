//! Normalizer for the literal shorthand forms users write search spaces in.
//!
//! Accepted forms for a single dimension:
//!
//! | literal                              | dimension                    |
//! |--------------------------------------|------------------------------|
//! | `[1, 10]`                            | `Integer { 1, 10, uniform }` |
//! | `[0.1, 1.0]` (any float bound)       | `Real { 0.1, 1.0, uniform }` |
//! | `[1e-6, 1e6, "log-uniform"]`         | `Real` / `Integer` with prior|
//! | `["rbf", "poly"]`, `[1, 2, 3]`, ...  | `Categorical`                |
//! | `{"type": "real", "low": .., ...}`   | explicit, as serialized      |

use serde_json::{Map, Value};

use crate::errors::{BcvError, BcvResult};
use crate::space::{Dimension, DimensionDef, Prior, SearchSpace};

impl Dimension {
    /// Canonicalize one shorthand literal into a validated [`Dimension`].
    pub fn from_shorthand(name: &str, literal: &Value) -> BcvResult<Self> {
        let dimension = match literal {
            Value::Array(items) => from_list(name, items)?,
            Value::Object(_) => serde_json::from_value(literal.clone()).map_err(|e| {
                BcvError::invalid_dimension(name, format!("unrecognized dimension object: {e}"))
            })?,
            other => {
                return Err(BcvError::invalid_dimension(
                    name,
                    format!("expected a list or a dimension object, got {other}"),
                ))
            }
        };
        dimension.validate(name)?;
        Ok(dimension)
    }
}

fn from_list(name: &str, items: &[Value]) -> BcvResult<Dimension> {
    match items {
        [low, high] if low.is_number() && high.is_number() => Ok(numeric(low, high, Prior::Uniform)),
        [low, high, Value::String(prior)] if low.is_number() && high.is_number() => {
            match prior.parse::<Prior>() {
                Ok(prior) => Ok(numeric(low, high, prior)),
                // three plain values that merely end in a string are categorical
                Err(_) => Ok(Dimension::Categorical {
                    choices: items.to_vec(),
                }),
            }
        }
        [] => Err(BcvError::invalid_dimension(name, "empty list")),
        _ => Ok(Dimension::Categorical {
            choices: items.to_vec(),
        }),
    }
}

fn numeric(low: &Value, high: &Value, prior: Prior) -> Dimension {
    match (low.as_i64(), high.as_i64()) {
        (Some(low), Some(high)) => Dimension::Integer { low, high, prior },
        _ => Dimension::Real {
            low: low.as_f64().unwrap_or(f64::NAN),
            high: high.as_f64().unwrap_or(f64::NAN),
            prior,
        },
    }
}

impl SearchSpace {
    /// Build a space from a JSON object mapping names to shorthand literals.
    ///
    /// Key order of the object is kept as the dimension order.
    pub fn from_shorthand(literals: &Value) -> BcvResult<Self> {
        let entries: &Map<String, Value> = literals.as_object().ok_or_else(|| {
            BcvError::invalid_dimension("<space>", "search space must be a JSON object")
        })?;
        let dimensions = entries
            .iter()
            .map(|(name, literal)| {
                Ok(DimensionDef {
                    name: name.clone(),
                    dimension: Dimension::from_shorthand(name, literal)?,
                })
            })
            .collect::<BcvResult<Vec<_>>>()?;
        SearchSpace::new(dimensions)
    }
}
