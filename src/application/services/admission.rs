use crate::domain::Stage;

/// Concurrency caps for the two stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLimits {
    pub asr: usize,
    pub ml: usize,
}

impl StageLimits {
    pub fn for_stage(&self, stage: Stage) -> usize {
        match stage {
            Stage::Asr => self.asr,
            Stage::Ml => self.ml,
        }
    }
}

/// Counts in-flight requests per stage against a fixed limit.
///
/// Not synchronized on its own; it lives inside [`super::JobRegistry`] and is
/// only touched under the registry lock.
#[derive(Debug)]
pub struct AdmissionController {
    limits: [usize; 2],
    in_flight: [usize; 2],
}

impl AdmissionController {
    /// Limits below one are raised to one so every stage can make progress.
    pub fn new(limits: StageLimits) -> Self {
        Self {
            limits: Stage::ALL.map(|stage| limits.for_stage(stage).max(1)),
            in_flight: [0, 0],
        }
    }

    /// Takes a slot if one is free.
    pub fn try_admit(&mut self, stage: Stage) -> bool {
        if !self.has_capacity(stage) {
            return false;
        }
        self.in_flight[stage.index()] += 1;
        true
    }

    pub fn release(&mut self, stage: Stage) {
        let i = stage.index();
        if self.in_flight[i] == 0 {
            tracing::warn!(stage = %stage, "Admission slot released with none in flight");
        }
        self.in_flight[i] = self.in_flight[i].saturating_sub(1);
    }

    pub fn has_capacity(&self, stage: Stage) -> bool {
        let i = stage.index();
        self.in_flight[i] < self.limits[i]
    }

    pub fn in_flight(&self, stage: Stage) -> usize {
        self.in_flight[stage.index()]
    }

    pub fn limit(&self, stage: Stage) -> usize {
        self.limits[stage.index()]
    }
}
