//! Observer registration for driver events.
//!
//! Zero or more observers may be registered; each event is delivered to all of
//! them in registration order.

use serde::Serialize;

use crate::core::types::{NodeOutcome, Phase, RunStatus};
use crate::workspace::TestResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DriverEvent {
    StatusChanged {
        run_status: RunStatus,
        phase: Phase,
    },
    TaskWritten {
        node_id: Option<String>,
        phase: Phase,
    },
    TestResults {
        node_id: String,
        results: Vec<TestResult>,
    },
    NodeCompleted {
        node_id: String,
        outcome: NodeOutcome,
        reason: Option<String>,
    },
    BlueprintComplete {
        node_count: usize,
    },
    RunCompleted {
        summary: String,
    },
    RunError {
        message: String,
    },
}

pub trait DriverObserver {
    fn on_event(&mut self, event: &DriverEvent);
}

impl<F: FnMut(&DriverEvent)> DriverObserver for F {
    fn on_event(&mut self, event: &DriverEvent) {
        self(event);
    }
}

#[derive(Default)]
pub struct EventBus {
    observers: Vec<Box<dyn DriverObserver>>,
}

impl EventBus {
    pub fn subscribe(&mut self, observer: Box<dyn DriverObserver>) {
        self.observers.push(observer);
    }

    pub fn emit(&mut self, event: DriverEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
