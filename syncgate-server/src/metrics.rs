//! Admission metrics for observability
//!
//! Lightweight atomic counters, zero allocations in the hot path. The split
//! between `quota_exceeded` and `store_unavailable` is what lets operators
//! tell "tenant ran out of quota" apart from "enforcement infrastructure is
//! degraded" — the client-visible responses intentionally look the same.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use syncgate::{Decision, EndpointCategory};

const CATEGORIES: [EndpointCategory; 7] = [
    EndpointCategory::Auth,
    EndpointCategory::Workspace,
    EndpointCategory::File,
    EndpointCategory::Annotation,
    EndpointCategory::Member,
    EndpointCategory::Location,
    EndpointCategory::Other,
];

fn category_slot(category: EndpointCategory) -> usize {
    match category {
        EndpointCategory::Auth => 0,
        EndpointCategory::Workspace => 1,
        EndpointCategory::File => 2,
        EndpointCategory::Annotation => 3,
        EndpointCategory::Member => 4,
        EndpointCategory::Location => 5,
        EndpointCategory::Other => 6,
    }
}

/// Core admission counters.
pub struct Metrics {
    /// Server start time
    start_time: Instant,

    /// Checks performed (admitted + denied, degraded or not)
    pub requests_total: AtomicU64,

    /// Requests admitted by the counter
    pub admitted: AtomicU64,
    /// Requests denied because the tenant's quota ran out
    pub quota_exceeded: AtomicU64,

    /// Checks decided by the failure policy instead of the counter
    pub store_unavailable: AtomicU64,
    pub fail_open_admitted: AtomicU64,
    pub fail_closed_denied: AtomicU64,

    /// Requests rejected before any check for missing license claims
    pub unauthenticated: AtomicU64,

    /// Quota denials per endpoint category
    denied_by_category: [AtomicU64; CATEGORIES.len()],
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests_total: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
            quota_exceeded: AtomicU64::new(0),
            store_unavailable: AtomicU64::new(0),
            fail_open_admitted: AtomicU64::new(0),
            fail_closed_denied: AtomicU64::new(0),
            unauthenticated: AtomicU64::new(0),
            denied_by_category: Default::default(),
        }
    }

    /// Record the outcome of one admission check.
    pub fn record_decision(&self, category: EndpointCategory, decision: &Decision) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if decision.degraded {
            self.store_unavailable.fetch_add(1, Ordering::Relaxed);
            if decision.allowed {
                self.fail_open_admitted.fetch_add(1, Ordering::Relaxed);
            } else {
                self.fail_closed_denied.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        if decision.allowed {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.quota_exceeded.fetch_add(1, Ordering::Relaxed);
            self.denied_by_category[category_slot(category)].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a request rejected for missing license claims.
    pub fn record_unauthenticated(&self) {
        self.unauthenticated.fetch_add(1, Ordering::Relaxed);
    }

    /// Server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(1500);

        output.push_str("# HELP syncgate_uptime_seconds Time since server start in seconds\n");
        output.push_str("# TYPE syncgate_uptime_seconds gauge\n");
        output.push_str(&format!(
            "syncgate_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        output.push_str("# HELP syncgate_requests_total Total admission checks performed\n");
        output.push_str("# TYPE syncgate_requests_total counter\n");
        output.push_str(&format!(
            "syncgate_requests_total {}\n\n",
            self.requests_total.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP syncgate_requests_admitted Requests admitted by the counter\n");
        output.push_str("# TYPE syncgate_requests_admitted counter\n");
        output.push_str(&format!(
            "syncgate_requests_admitted {}\n\n",
            self.admitted.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP syncgate_quota_exceeded_total Requests denied on exhausted quota\n");
        output.push_str("# TYPE syncgate_quota_exceeded_total counter\n");
        output.push_str(&format!(
            "syncgate_quota_exceeded_total {}\n\n",
            self.quota_exceeded.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP syncgate_store_unavailable_total Checks decided by the failure policy\n",
        );
        output.push_str("# TYPE syncgate_store_unavailable_total counter\n");
        output.push_str(&format!(
            "syncgate_store_unavailable_total {}\n\n",
            self.store_unavailable.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP syncgate_fail_open_admitted_total Degraded checks admitted under fail-open\n",
        );
        output.push_str("# TYPE syncgate_fail_open_admitted_total counter\n");
        output.push_str(&format!(
            "syncgate_fail_open_admitted_total {}\n\n",
            self.fail_open_admitted.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP syncgate_fail_closed_denied_total Degraded checks denied under fail-closed\n",
        );
        output.push_str("# TYPE syncgate_fail_closed_denied_total counter\n");
        output.push_str(&format!(
            "syncgate_fail_closed_denied_total {}\n\n",
            self.fail_closed_denied.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP syncgate_unauthenticated_total Requests rejected for missing license claims\n",
        );
        output.push_str("# TYPE syncgate_unauthenticated_total counter\n");
        output.push_str(&format!(
            "syncgate_unauthenticated_total {}\n\n",
            self.unauthenticated.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP syncgate_denials_by_category Quota denials per endpoint category\n");
        output.push_str("# TYPE syncgate_denials_by_category counter\n");
        for category in CATEGORIES {
            output.push_str(&format!(
                "syncgate_denials_by_category{{category=\"{}\"}} {}\n",
                category,
                self.denied_by_category[category_slot(category)].load(Ordering::Relaxed)
            ));
        }

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
