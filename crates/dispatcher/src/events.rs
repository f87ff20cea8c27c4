use formpilot_core_types::JobId;

/// Lifecycle notifications emitted on the dispatcher's broadcast channel.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Submitted(JobId),
    Started(JobId),
    Completed(JobId),
    Failed { id: JobId, error: String },
}

impl JobEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Submitted(id)
            | JobEvent::Started(id)
            | JobEvent::Completed(id)
            | JobEvent::Failed { id, .. } => id,
        }
    }
}
