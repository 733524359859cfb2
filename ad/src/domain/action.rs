//! Action domain type
//!
//! An action is one containerized job instantiated from a template. It is
//! created PENDING by the submission API; the scheduler moves it to
//! PROCESSING (worker assigned) or UNPROCESSABLE (no capable worker).
//! Everything after PROCESSING is reported by the execution consumer.

use serde::{Deserialize, Serialize};

use dispatchstore::{Record, now_ms};

use super::requirement::ResourceRequirement;

/// Cause recorded when no registered worker can run an action
pub const NO_CAPABLE_WORKER_CAUSE: &str = "No worker available with the required hardware capabilities";

/// Action lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    /// Created, not yet scheduled
    #[default]
    Pending,
    /// Worker assigned and job handed to its queue
    Processing,
    /// Container being started (consumer-reported)
    Starting,
    /// Container being stopped (consumer-reported)
    Stopping,
    /// Finished successfully
    Done,
    /// Execution failed
    Failed,
    /// No worker can satisfy the requirements
    Unprocessable,
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Starting => write!(f, "starting"),
            Self::Stopping => write!(f, "stopping"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Unprocessable => write!(f, "unprocessable"),
        }
    }
}

impl std::str::FromStr for ActionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "starting" => Ok(Self::Starting),
            "stopping" => Ok(Self::Stopping),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "unprocessable" => Ok(Self::Unprocessable),
            _ => Err(format!("Unknown action state: {}", s)),
        }
    }
}

/// A unit of containerized work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub uuid: String,

    /// Name of the template this action was created from
    #[serde(default)]
    pub template: Option<String>,

    pub state: ActionState,

    /// Human-readable reason, only set for terminal failure states
    #[serde(default)]
    pub state_cause: Option<String>,

    /// Copied from the template at submission
    pub requirements: ResourceRequirement,

    /// Identifier of the owning worker. Set once, never reassigned.
    #[serde(default)]
    pub worker: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Action {
    /// Create a PENDING action with a fresh id
    pub fn new(requirements: ResourceRequirement) -> Self {
        Self::with_uuid(uuid::Uuid::now_v7().to_string(), requirements)
    }

    /// Create with a specific id (for testing or recovery)
    pub fn with_uuid(uuid: impl Into<String>, requirements: ResourceRequirement) -> Self {
        let now = now_ms();
        Self {
            uuid: uuid.into(),
            template: None,
            state: ActionState::Pending,
            state_cause: None,
            requirements,
            worker: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder method to set the template name
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// True while the action is PENDING with no owner, the only shape the
    /// scheduler accepts
    pub fn is_schedulable(&self) -> bool {
        self.state == ActionState::Pending && self.worker.is_none()
    }
}

impl Record for Action {
    fn id(&self) -> &str {
        &self.uuid
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "actions"
    }
}
