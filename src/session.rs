//! Session context (part of the data model, §3): process-wide metadata
//! stitched into every outgoing envelope.

use parking_lot::Mutex;

/// Process-wide session metadata. `workflow_run_id` begins unset and is
/// populated exactly once by the `_workflowRunRegistered` control event;
/// write-once-then-read-many, so a plain mutex is enough — no need for an
/// atomic swap type.
pub struct SessionContext {
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub environment_id: String,
    pub namespace_id: String,
    pub environment_name: String,
    pub namespace_name: String,
    workflow_run_id: Mutex<Option<String>>,
}

impl SessionContext {
    pub fn new(
        session_id: Option<String>,
        project_id: Option<String>,
        environment_id: impl Into<String>,
        namespace_id: impl Into<String>,
        environment_name: impl Into<String>,
        namespace_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            project_id,
            environment_id: environment_id.into(),
            namespace_id: namespace_id.into(),
            environment_name: environment_name.into(),
            namespace_name: namespace_name.into(),
            workflow_run_id: Mutex::new(None),
        }
    }

    /// Set the workflow run id, but only the first time it is called —
    /// matches "populated exactly once" in the data model.
    pub fn set_workflow_run_id(&self, id: String) {
        let mut guard = self.workflow_run_id.lock();
        if guard.is_none() {
            *guard = Some(id);
        }
    }

    pub fn workflow_run_id(&self) -> Option<String> {
        self.workflow_run_id.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_run_id_is_set_at_most_once() {
        let session = SessionContext::new(
            Some("s1".into()),
            None,
            "env",
            "ns",
            "production",
            "default",
        );
        assert_eq!(session.workflow_run_id(), None);

        session.set_workflow_run_id("W-1".into());
        assert_eq!(session.workflow_run_id(), Some("W-1".to_string()));

        session.set_workflow_run_id("W-2".into());
        assert_eq!(session.workflow_run_id(), Some("W-1".to_string()));
    }
}
