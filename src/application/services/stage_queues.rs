use std::collections::VecDeque;

use crate::domain::{JobId, Stage};

/// One FIFO of job ids per stage, waiting for an admission slot.
#[derive(Debug, Default)]
pub struct StageQueues {
    queues: [VecDeque<JobId>; 2],
}

impl StageQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `job_id` unless it is already waiting in this stage's queue.
    pub fn push(&mut self, stage: Stage, job_id: JobId) -> bool {
        let queue = &mut self.queues[stage.index()];
        if queue.contains(&job_id) {
            return false;
        }
        queue.push_back(job_id);
        true
    }

    pub fn pop(&mut self, stage: Stage) -> Option<JobId> {
        self.queues[stage.index()].pop_front()
    }

    pub fn is_empty(&self, stage: Stage) -> bool {
        self.queues[stage.index()].is_empty()
    }

    pub fn len(&self, stage: Stage) -> usize {
        self.queues[stage.index()].len()
    }

    pub fn contains(&self, stage: Stage, job_id: &JobId) -> bool {
        self.queues[stage.index()].contains(job_id)
    }

    /// Queue contents in dispatch order.
    pub fn snapshot(&self, stage: Stage) -> Vec<JobId> {
        self.queues[stage.index()].iter().copied().collect()
    }
}
