//! Ordered record of every call made into the headless backend.

use frameloom::{QueueTransfer, ResourceUsage};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierRecord {
    pub resource: String,
    pub old_state: ResourceUsage,
    pub new_state: ResourceUsage,
    pub queue_transfer: Option<QueueTransfer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRecord {
    pub list: u64,
    pub label: String,
    pub wait: Vec<u64>,
    pub signal: Vec<u64>,
    pub fence: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin {
        list: u64,
        label: String,
    },
    Barrier {
        list: u64,
        label: String,
        textures: Vec<BarrierRecord>,
        buffers: Vec<BarrierRecord>,
    },
    End {
        list: u64,
        label: String,
    },
    Draw {
        label: String,
        vertex_count: u32,
        instance_count: u32,
    },
    Dispatch {
        label: String,
        groups: [u32; 3],
    },
    Copy {
        label: String,
        src: String,
        dst: String,
        size: u64,
    },
    Execute(ExecuteRecord),
    Acquire {
        semaphore: u64,
        image: u32,
    },
    Present {
        wait: Vec<u64>,
        image: u32,
    },
    FenceWait {
        fence: u64,
    },
    FenceReset {
        fence: u64,
    },
    FenceSignal {
        fence: u64,
    },
}

#[derive(Debug, Default)]
pub struct Journal {
    events: Mutex<Vec<Event>>,
}

impl Journal {
    pub fn push(&self, event: Event) {
        self.events.lock().push(event);
    }

    ///Snapshot of all events so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    ///All submissions in submission order.
    pub fn executions(&self) -> Vec<ExecuteRecord> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Execute(rec) => Some(rec.clone()),
                _ => None,
            })
            .collect()
    }

    ///Submissions carrying `label`.
    pub fn executions_of(&self, label: &str) -> Vec<ExecuteRecord> {
        self.executions()
            .into_iter()
            .filter(|e| e.label == label)
            .collect()
    }

    ///Texture and buffer barrier records of every `pipeline_barrier` call recorded under `label`.
    pub fn barriers_of(&self, label: &str) -> Vec<BarrierRecord> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Barrier {
                    label: l,
                    textures,
                    buffers,
                    ..
                } if l == label => Some(textures.iter().chain(buffers.iter()).cloned().collect::<Vec<_>>()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    ///Number of `pipeline_barrier` calls recorded under `label`.
    pub fn barrier_calls_of(&self, label: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, Event::Barrier { label: l, .. } if l == label))
            .count()
    }

    pub fn presents(&self) -> Vec<(Vec<u64>, u32)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Present { wait, image } => Some((wait.clone(), *image)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    ///Index of the first event matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events.lock().iter().position(predicate)
    }
}
