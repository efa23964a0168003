// PromptChain — Execution dispatcher: workflow lookup, page targeting, record keeping

use super::runner::{RunOutcome, StepRunner};
use super::{EngineError, ExecutionRecord};
use crate::surface::{find_target, PageProvider, UrlPattern};
use crate::workflow::store::WorkflowStore;
use crate::workflow::variables::VariableValues;
use std::sync::Arc;

/// Turns an execute request into an [`ExecutionRecord`].
///
/// Never returns an error: every failure ends up as a `failed` record. There
/// is no retry and no overall deadline; waiting is bounded per step by the
/// runner's completion detector.
pub struct Dispatcher {
    store: WorkflowStore,
    pages: Arc<dyn PageProvider>,
    patterns: Vec<UrlPattern>,
    runner: StepRunner,
}

impl Dispatcher {
    pub fn new(
        store: WorkflowStore,
        pages: Arc<dyn PageProvider>,
        patterns: Vec<UrlPattern>,
        runner: StepRunner,
    ) -> Self {
        Self {
            store,
            pages,
            patterns,
            runner,
        }
    }

    pub async fn execute(&self, workflow_id: &str, values: &VariableValues) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(workflow_id);
        tracing::info!(execution = %record.id, workflow = %workflow_id, "Execution requested");

        match self.drive(&mut record, values).await {
            Ok(outcome) => {
                record.mark_completed();
                tracing::info!(execution = %record.id, ?outcome, "Execution completed");
            }
            Err(e) => {
                record.mark_failed(e.to_string());
                tracing::error!(execution = %record.id, error = %e, "Execution failed");
            }
        }
        record
    }

    /// Record a failure that happened before dispatch (e.g. bad variables).
    pub fn reject(&self, workflow_id: &str, error: EngineError) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(workflow_id);
        record.mark_failed(error.to_string());
        tracing::warn!(execution = %record.id, workflow = %workflow_id, error = %error, "Execution rejected");
        record
    }

    async fn drive(
        &self,
        record: &mut ExecutionRecord,
        values: &VariableValues,
    ) -> Result<RunOutcome, EngineError> {
        let workflow = self
            .store
            .get(&record.workflow_id)
            .await
            .ok_or_else(|| EngineError::WorkflowNotFound(record.workflow_id.clone()))?;

        let pages = self.pages.pages().await?;
        let page = find_target(&pages, &self.patterns).ok_or(EngineError::NoTargetPage)?;
        tracing::debug!(page = %page.id, url = %page.url, "Target page located");

        let surface = self.pages.attach(page).await?;
        record.mark_running();

        self.runner.run(&workflow, values, surface.as_ref()).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExecutionStatus, Timing};
    use crate::surface::{InputHandle, PageInfo, SurfaceLocator, TargetSurface};
    use crate::workflow::{Node, NodeKind, Workflow};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts every interaction; always idle.
    #[derive(Default)]
    struct CountingSurface {
        calls: AtomicUsize,
        no_input: bool,
    }

    #[async_trait]
    impl TargetSurface for CountingSurface {
        async fn find_input(&self, selector: &str) -> Option<InputHandle> {
            (!self.no_input).then(|| InputHandle::new(selector))
        }
        async fn is_disabled(&self, _input: &InputHandle) -> bool {
            false
        }
        async fn clear(&self, _input: &InputHandle) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn insert_text(&self, _input: &InputHandle, _text: &str) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn paste(&self, _input: &InputHandle, _text: &str) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn submit(&self, _input: &InputHandle) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn exists(&self, _selector: &str) -> bool {
            false
        }
    }

    struct FixedPages {
        pages: Vec<PageInfo>,
        surface: Arc<CountingSurface>,
    }

    #[async_trait]
    impl PageProvider for FixedPages {
        async fn pages(&self) -> anyhow::Result<Vec<PageInfo>> {
            Ok(self.pages.clone())
        }
        async fn attach(&self, _page: &PageInfo) -> anyhow::Result<Arc<dyn TargetSurface>> {
            Ok(self.surface.clone())
        }
    }

    fn dispatcher(store: WorkflowStore, url: &str) -> (Dispatcher, Arc<CountingSurface>) {
        dispatcher_with(store, url, CountingSurface::default())
    }

    fn dispatcher_with(
        store: WorkflowStore,
        url: &str,
        surface: CountingSurface,
    ) -> (Dispatcher, Arc<CountingSurface>) {
        let surface = Arc::new(surface);
        let pages = Arc::new(FixedPages {
            pages: vec![PageInfo {
                id: "tab-1".into(),
                url: url.into(),
            }],
            surface: surface.clone(),
        });
        let timing = Timing {
            settle_delay: Duration::from_millis(1),
            initial_delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            max_wait: Some(Duration::from_millis(50)),
        };
        let runner = StepRunner::new(
            SurfaceLocator::new(vec!["main textarea".into()], vec!["stop".into()]),
            timing,
        );
        let patterns = vec![UrlPattern::new("https://chatgpt.com/*").unwrap()];
        (Dispatcher::new(store, pages, patterns, runner), surface)
    }

    async fn stored(store: &WorkflowStore, nodes: Vec<Node>) -> String {
        let mut wf = Workflow::new("wf", "");
        wf.nodes = nodes;
        store.save(&wf).await;
        wf.id
    }

    #[tokio::test]
    async fn test_unknown_workflow_fails_without_touching_page() {
        let (dispatcher, surface) = dispatcher(WorkflowStore::in_memory(), "https://chatgpt.com/");
        let record = dispatcher.execute("missing", &VariableValues::new()).await;

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error.unwrap().contains("workflow not found"));
        assert!(record.completed_at.is_some());
        assert_eq!(surface.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_matching_page_fails() {
        let store = WorkflowStore::in_memory();
        let id = stored(&store, vec![Node::prompt("n1", "", "hi")]).await;
        let (dispatcher, surface) = dispatcher(store, "https://example.com/");

        let record = dispatcher.execute(&id, &VariableValues::new()).await;
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("no target tab found"));
        assert_eq!(surface.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_prompt_nodes_completes_without_interaction() {
        let store = WorkflowStore::in_memory();
        let mut out = Node::prompt("n1", "", "not sent");
        out.kind = NodeKind::Output;
        let id = stored(&store, vec![out]).await;
        let (dispatcher, surface) = dispatcher(store, "https://chatgpt.com/c/1");

        let record = dispatcher.execute(&id, &VariableValues::new()).await;
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(record.error.is_none());
        assert_eq!(surface.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompts_complete() {
        let store = WorkflowStore::in_memory();
        let id = stored(
            &store,
            vec![Node::prompt("n1", "", "a"), Node::prompt("n2", "", "b")],
        )
        .await;
        let (dispatcher, surface) = dispatcher(store, "https://chatgpt.com/");

        let record = dispatcher.execute(&id, &VariableValues::new()).await;
        assert_eq!(record.status, ExecutionStatus::Completed);
        // clear + insert + submit per step
        assert_eq!(surface.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_missing_input_still_completes() {
        let store = WorkflowStore::in_memory();
        let id = stored(&store, vec![Node::prompt("n1", "", "a")]).await;
        let surface = CountingSurface {
            no_input: true,
            ..Default::default()
        };
        let (dispatcher, surface) = dispatcher_with(store, "https://chatgpt.com/", surface);

        let record = dispatcher.execute(&id, &VariableValues::new()).await;
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(record.error.is_none());
        assert_eq!(surface.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reject_produces_failed_record() {
        let (dispatcher, _) = dispatcher(WorkflowStore::in_memory(), "https://chatgpt.com/");
        let record = dispatcher.reject("wf", EngineError::NoTargetPage);
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.workflow_id, "wf");
    }
}
