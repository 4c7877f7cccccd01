//! Progress inference from provisioning-tool output.
//!
//! Terraform does not report percentages, so we watch its streamed output
//! for known resource names and map each to an approximate completion
//! target. Reported progress never moves backwards even when output lines
//! arrive out of the expected order.

/// A substring to watch for and the percent the run has reached when it
/// appears.
#[derive(Debug, Clone, Copy)]
pub struct ProgressMarker {
    pub pattern: &'static str,
    pub target_percent: u8,
}

/// Markers for `terraform apply` of the demo stack, in provisioning order.
pub const TERRAFORM_APPLY_MARKERS: &[ProgressMarker] = &[
    ProgressMarker { pattern: "project-setup", target_percent: 10 },
    ProgressMarker { pattern: "vpc-network", target_percent: 20 },
    ProgressMarker { pattern: "gke-cluster", target_percent: 60 },
    ProgressMarker { pattern: "iap-config", target_percent: 75 },
    ProgressMarker { pattern: "monitoring", target_percent: 85 },
    ProgressMarker { pattern: "budget-alerts", target_percent: 95 },
];

/// Tracks the highest marker seen so far in a stream of output lines.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    markers: &'static [ProgressMarker],
    current: u8,
}

impl ProgressTracker {
    pub fn new(markers: &'static [ProgressMarker]) -> Self {
        debug_assert!(
            markers.windows(2).all(|w| w[0].target_percent <= w[1].target_percent),
            "marker targets must be non-decreasing"
        );
        Self { markers, current: 0 }
    }

    pub fn terraform_apply() -> Self {
        Self::new(TERRAFORM_APPLY_MARKERS)
    }

    /// Feed one output line. Returns the new percent if this line advanced
    /// progress, `None` otherwise.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        let line = line.to_lowercase();
        let mut best = self.current;
        for marker in self.markers {
            if line.contains(marker.pattern) && marker.target_percent > best {
                best = marker.target_percent;
            }
        }
        if best > self.current {
            self.current = best;
            Some(best)
        } else {
            None
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Mark the run complete regardless of which markers were seen.
    pub fn finish(&mut self) -> u8 {
        self.current = 100;
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_through_markers_in_order() {
        let mut tracker = ProgressTracker::terraform_apply();
        assert_eq!(tracker.observe("module.project-setup: Creating..."), Some(10));
        assert_eq!(tracker.observe("module.vpc-network: Creating..."), Some(20));
        assert_eq!(tracker.observe("module.gke-cluster: Still creating..."), Some(60));
        assert_eq!(tracker.current(), 60);
    }

    #[test]
    fn never_moves_backwards() {
        let mut tracker = ProgressTracker::terraform_apply();
        assert_eq!(tracker.observe("google_container_cluster.gke-cluster"), Some(60));
        assert_eq!(tracker.observe("module.vpc-network: Creation complete"), None);
        assert_eq!(tracker.current(), 60);
    }

    #[test]
    fn matches_case_insensitively() {
        let mut tracker = ProgressTracker::terraform_apply();
        assert_eq!(tracker.observe("Module.VPC-Network: Creating..."), Some(20));
    }

    #[test]
    fn unrecognized_lines_leave_progress_unchanged() {
        let mut tracker = ProgressTracker::terraform_apply();
        assert_eq!(tracker.observe("Refreshing state..."), None);
        assert_eq!(tracker.current(), 0);
    }

    #[test]
    fn repeated_marker_reports_once() {
        let mut tracker = ProgressTracker::terraform_apply();
        assert_eq!(tracker.observe("module.monitoring: Creating..."), Some(85));
        assert_eq!(tracker.observe("module.monitoring: Still creating..."), None);
    }

    #[test]
    fn finish_caps_at_one_hundred() {
        let mut tracker = ProgressTracker::terraform_apply();
        tracker.observe("budget-alerts");
        assert_eq!(tracker.finish(), 100);
    }
}
