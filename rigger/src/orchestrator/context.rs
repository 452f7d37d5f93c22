//! Per operation context carried between the actions of one release

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::analyzer::ReleaseAnalysisReport;
use crate::errors::RiggerError;
use crate::models::package::Package;
use crate::models::release::Release;
use crate::models::request::{
    DeleteProperties, InstallRequest, RollbackRequest, ScaleRequest, UpgradeRequest,
};

/// A validated operation handed to a release's state machine
#[derive(Debug, Clone)]
pub enum OperationRequest {
    Install {
        request: InstallRequest,
        pkg: Package,
    },
    Upgrade {
        request: UpgradeRequest,
        pkg: Package,
    },
    Rollback(RollbackRequest),
    Delete {
        name: String,
        properties: DeleteProperties,
    },
    Scale {
        name: String,
        request: ScaleRequest,
    },
}

impl OperationRequest {
    /// Verb used in messages
    pub fn verb(&self) -> &'static str {
        match self {
            OperationRequest::Install { .. } => "install",
            OperationRequest::Upgrade { .. } => "upgrade",
            OperationRequest::Rollback(_) => "rollback",
            OperationRequest::Delete { .. } => "delete",
            OperationRequest::Scale { .. } => "scale",
        }
    }
}

/// State shared by the actions of one operation
#[derive(Debug, Default)]
pub struct ExtendedState {
    /// Correlates the log lines of one operation
    pub operation_id: String,

    pub request: Option<OperationRequest>,

    /// Analysis of the running upgrade or rollback
    pub report: Option<ReleaseAnalysisReport>,

    /// Release being replaced, prepared by a rollback
    pub source: Option<Release>,

    /// Release being deployed
    pub target: Option<Release>,

    /// Health checks stop succeeding after this instant
    pub cutoff: Option<DateTime<Utc>>,

    /// When the target apps were deployed
    pub started: Option<DateTime<Utc>>,

    pub timeout: Duration,

    /// Error that sent the machine to its error state
    pub error: Option<RiggerError>,

    /// Release returned to the caller once back to initial
    pub result: Option<Release>,
}

impl ExtendedState {
    /// Time spent since the target apps were deployed
    pub fn elapsed(&self) -> Duration {
        self.started
            .and_then(|started| (Utc::now() - started).to_std().ok())
            .unwrap_or_default()
    }
}
