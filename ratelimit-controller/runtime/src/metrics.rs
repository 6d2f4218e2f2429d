use crate::core::Outcome;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    passes: Family<OutcomeLabels, Counter>,
    mutations: Family<MutationLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct MutationLabels {
    kind: &'static str,
    op: &'static str,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let passes = Family::default();
        reg.register(
            "passes",
            "Count of reconciliation passes by outcome",
            passes.clone(),
        );

        let mutations = Family::default();
        reg.register(
            "mutations",
            "Count of object writes by kind and operation",
            mutations.clone(),
        );

        Self { passes, mutations }
    }

    pub(crate) fn pass(&self, outcome: Outcome) {
        self.passes
            .get_or_create(&OutcomeLabels {
                outcome: outcome.as_str(),
            })
            .inc();
    }

    pub(crate) fn failed(&self) {
        self.passes
            .get_or_create(&OutcomeLabels { outcome: "error" })
            .inc();
    }

    pub(crate) fn timed_out(&self) {
        self.passes
            .get_or_create(&OutcomeLabels { outcome: "timeout" })
            .inc();
    }

    pub(crate) fn mutated(&self, kind: &'static str, op: &'static str) {
        self.mutations
            .get_or_create(&MutationLabels { kind, op })
            .inc();
    }
}
