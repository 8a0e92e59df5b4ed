use serde::Serialize;
use tracing::{info, info_span};

/// Domain event for audit logging.
/// Structured for JSON serialization to keep audit trails machine-readable.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Process came up.
    SystemStartup {
        /// Component that started.
        component: String,
    },
    /// Process is going down.
    SystemShutdown {
        /// Why it is going down.
        reason: String,
    },
    /// A branched mutation merged cleanly into the trunk.
    MutationMerged {
        /// The mutation branch.
        branch: String,
        /// The new trunk head.
        version: String,
    },
    /// A branched mutation was aborted on a merge conflict.
    MutationConflicted {
        /// The mutation branch.
        branch: String,
    },
    /// Startup sweep of orphaned mutation branches finished.
    OrphansSwept {
        /// Branches removed.
        removed: u64,
        /// Deletions that failed and were skipped.
        skipped: u64,
    },
}

/// Logs an audit event to the dedicated audit channel as structured JSON.
/// This uses a specific `target` which can be filtered by the subscriber to redirect to a secure file.
pub fn log_audit(event: &AuditEvent) {
    let span = info_span!(target: "audit", "audit_event");
    let _enter = span.enter();

    // Serialize to JSON for machine-readable audit logs
    let json = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    info!(target: "audit", audit_json = %json, "Audit Event");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_audit_variants() {
        // These calls should not panic
        log_audit(&AuditEvent::SystemStartup {
            component: "kernel".into(),
        });
        log_audit(&AuditEvent::SystemShutdown {
            reason: "testing".into(),
        });
        log_audit(&AuditEvent::MutationMerged {
            branch: "strata-mut/abc".into(),
            version: "deadbeef".into(),
        });
        log_audit(&AuditEvent::MutationConflicted {
            branch: "strata-mut/abc".into(),
        });
        log_audit(&AuditEvent::OrphansSwept {
            removed: 3,
            skipped: 0,
        });
    }
}
