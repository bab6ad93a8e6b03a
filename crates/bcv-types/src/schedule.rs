//! Ordered subspace schedule with exact iteration accounting.

use serde::{Deserialize, Serialize};

use crate::errors::{BcvError, BcvResult};
use crate::space::SearchSpace;

/// How the user declared the spaces to explore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchSpaces {
    /// One space explored for the default number of iterations.
    Single(SearchSpace),
    /// Ordered (space, budget) pairs; `None` falls back to the default.
    Sequence(Vec<(SearchSpace, Option<usize>)>),
}

impl From<SearchSpace> for SearchSpaces {
    fn from(space: SearchSpace) -> Self {
        Self::Single(space)
    }
}

impl From<Vec<(SearchSpace, Option<usize>)>> for SearchSpaces {
    fn from(entries: Vec<(SearchSpace, Option<usize>)>) -> Self {
        Self::Sequence(entries)
    }
}

impl From<Vec<(SearchSpace, usize)>> for SearchSpaces {
    fn from(entries: Vec<(SearchSpace, usize)>) -> Self {
        Self::Sequence(entries.into_iter().map(|(s, n)| (s, Some(n))).collect())
    }
}

impl From<Vec<SearchSpace>> for SearchSpaces {
    fn from(spaces: Vec<SearchSpace>) -> Self {
        Self::Sequence(spaces.into_iter().map(|s| (s, None)).collect())
    }
}

/// One resolved entry of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub space: SearchSpace,
    /// Resolved iteration budget (always positive).
    pub n_iter: usize,
    /// Whether the budget was given explicitly rather than inherited.
    pub explicit: bool,
}

/// Immutable, validated sequence of subspaces and their budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubspaceSchedule {
    entries: Vec<ScheduleEntry>,
    default_n_iter: usize,
}

impl SubspaceSchedule {
    /// Resolve budgets against `default_n_iter`. Explicit budgets always win,
    /// including ones larger than the default.
    pub fn new(spaces: impl Into<SearchSpaces>, default_n_iter: usize) -> BcvResult<Self> {
        let declared = match spaces.into() {
            SearchSpaces::Single(space) => vec![(space, None)],
            SearchSpaces::Sequence(entries) => entries,
        };
        if declared.is_empty() {
            return Err(BcvError::invalid_schedule("no search spaces were given"));
        }

        let entries = declared
            .into_iter()
            .enumerate()
            .map(|(i, (space, budget))| {
                let n_iter = budget.unwrap_or(default_n_iter);
                if n_iter == 0 {
                    let reason = if budget.is_some() {
                        "explicit budget is zero"
                    } else {
                        "default budget is zero"
                    };
                    return Err(BcvError::invalid_schedule(format!(
                        "subspace #{i}: {reason}; budgets must be positive"
                    )));
                }
                Ok(ScheduleEntry {
                    space,
                    n_iter,
                    explicit: budget.is_some(),
                })
            })
            .collect::<BcvResult<Vec<_>>>()?;

        Ok(Self {
            entries,
            default_n_iter,
        })
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_n_iter(&self) -> usize {
        self.default_n_iter
    }

    /// Sum of resolved budgets; an upper bound on evaluations performed.
    pub fn total_iterations(&self) -> usize {
        self.entries.iter().map(|e| e.n_iter).sum()
    }
}
