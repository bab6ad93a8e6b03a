//! Search lifecycle events published on a crossbeam channel.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use bcv_types::{Candidate, SearchId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SearchEvent {
    Started {
        search_id: SearchId,
        total_iterations: usize,
        subspaces: usize,
    },
    SubspaceStarted {
        search_id: SearchId,
        subspace: usize,
        n_iter: usize,
    },
    BatchCompleted {
        search_id: SearchId,
        subspace: usize,
        batch: usize,
        iterations_done: usize,
        scores: Vec<f64>,
    },
    NewBest {
        search_id: SearchId,
        trial_number: usize,
        score: f64,
        params: Candidate,
    },
    CandidateFailed {
        search_id: SearchId,
        trial_number: usize,
        params: Candidate,
        error: String,
    },
    EarlyStopped {
        search_id: SearchId,
        iterations_done: usize,
    },
    Finished {
        search_id: SearchId,
        iterations_done: usize,
        best_score: f64,
    },
}

/// Optional event sender. A dropped receiver never disturbs the search.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<SearchEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<SearchEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: SearchEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn events_reach_the_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new(tx);
        sink.emit(SearchEvent::EarlyStopped {
            search_id: Uuid::nil(),
            iterations_done: 4,
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            SearchEvent::EarlyStopped {
                search_id: Uuid::nil(),
                iterations_done: 4
            }
        );
    }

    #[test]
    fn closed_or_missing_channel_is_ignored() {
        let (tx, rx) = crossbeam_channel::bounded(0);
        drop(rx);
        EventSink::new(tx).emit(SearchEvent::EarlyStopped {
            search_id: Uuid::nil(),
            iterations_done: 0,
        });
        EventSink::disabled().emit(SearchEvent::EarlyStopped {
            search_id: Uuid::nil(),
            iterations_done: 0,
        });
    }

    #[test]
    fn serializes_with_event_tag() {
        let json = serde_json::to_value(SearchEvent::SubspaceStarted {
            search_id: Uuid::nil(),
            subspace: 1,
            n_iter: 16,
        })
        .unwrap();
        assert_eq!(json["event"], "subspace_started");
        assert_eq!(json["n_iter"], 16);
    }
}
