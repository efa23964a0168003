// PromptChain — Step runner: sends each prompt node in order and waits for the reply

use super::completion::{Completion, CompletionDetector};
use super::{EngineError, Timing};
use crate::surface::{InputHandle, SurfaceLocator, TargetSurface};
use crate::workflow::variables::{substitute, VariableValues};
use crate::workflow::Workflow;

/// How a run ended when no error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every prompt node was sent and answered.
    Finished { steps: usize },
    /// No input could be located before step `step` (1-based); nothing further was sent.
    InputMissing { step: usize },
}

pub struct StepRunner {
    locator: SurfaceLocator,
    detector: CompletionDetector,
    timing: Timing,
}

impl StepRunner {
    pub fn new(locator: SurfaceLocator, timing: Timing) -> Self {
        let detector = CompletionDetector::new(locator.clone(), timing);
        Self {
            locator,
            detector,
            timing,
        }
    }

    /// Run every prompt node of `workflow` against `surface`, strictly in order.
    ///
    /// Values are substituted as given; definition defaults are not merged in.
    /// Errors from one step abort the remaining steps.
    pub async fn run(
        &self,
        workflow: &Workflow,
        values: &VariableValues,
        surface: &dyn TargetSurface,
    ) -> Result<RunOutcome, EngineError> {
        let total = workflow.prompt_nodes().count();
        tracing::info!(workflow = %workflow.id, nodes = workflow.nodes.len(), prompts = total, "Processing workflow nodes");

        let mut steps = 0;
        for (node, template) in workflow.prompt_nodes() {
            let step = steps + 1;
            let prompt = substitute(template, values);

            let Some(input) = self.locator.locate(surface).await else {
                tracing::error!(workflow = %workflow.id, step, "No input found for workflow execution");
                return Ok(RunOutcome::InputMissing { step });
            };

            tracing::info!(node = %node.id, step, total, "Executing prompt");
            tracing::debug!(node = %node.id, prompt = %prompt, "Prompt text");

            self.fill(surface, &input, &prompt).await?;
            tokio::time::sleep(self.timing.settle_delay).await;

            tracing::debug!(node = %node.id, "Sending message with Enter key");
            surface.submit(&input).await?;

            match self.detector.wait(surface).await {
                Completion::Done { polls } => {
                    tracing::info!(node = %node.id, step, polls, "Response completed, proceeding to next step");
                }
                Completion::TimedOut { waited } => {
                    return Err(EngineError::CompletionTimeout {
                        node_id: node.id.clone(),
                        waited,
                    });
                }
            }
            steps = step;
        }

        Ok(RunOutcome::Finished { steps })
    }

    /// Clear the input and insert `text`, falling back to a paste.
    async fn fill(
        &self,
        surface: &dyn TargetSurface,
        input: &InputHandle,
        text: &str,
    ) -> Result<(), EngineError> {
        surface.clear(input).await?;
        if let Err(e) = surface.insert_text(input, text).await {
            tracing::warn!(error = %e, "Text insertion failed, trying clipboard method");
            // Paste result is not checked
            if let Err(e) = surface.paste(input, text).await {
                tracing::debug!(error = %e, "Clipboard paste reported an error");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Node, NodeKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedSurface {
        log: Mutex<Vec<String>>,
        no_input: bool,
        /// The input disappears after this many successful lookups.
        input_lookups: Option<usize>,
        lookups: AtomicUsize,
        insert_fails: bool,
        paste_fails: bool,
        submit_fails: bool,
        always_busy: bool,
    }

    impl ScriptedSurface {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
        fn push(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl TargetSurface for ScriptedSurface {
        async fn find_input(&self, selector: &str) -> Option<InputHandle> {
            if self.no_input || selector != "main textarea" {
                return None;
            }
            let seen = self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.input_lookups.is_some_and(|limit| seen >= limit) {
                return None;
            }
            Some(InputHandle::new(selector))
        }
        async fn is_disabled(&self, _input: &InputHandle) -> bool {
            false
        }
        async fn clear(&self, _input: &InputHandle) -> anyhow::Result<()> {
            self.push("clear".into());
            Ok(())
        }
        async fn insert_text(&self, _input: &InputHandle, text: &str) -> anyhow::Result<()> {
            if self.insert_fails {
                anyhow::bail!("insertText unsupported");
            }
            self.push(format!("insert:{}", text));
            Ok(())
        }
        async fn paste(&self, _input: &InputHandle, text: &str) -> anyhow::Result<()> {
            if self.paste_fails {
                anyhow::bail!("clipboard denied");
            }
            self.push(format!("paste:{}", text));
            Ok(())
        }
        async fn submit(&self, _input: &InputHandle) -> anyhow::Result<()> {
            if self.submit_fails {
                anyhow::bail!("keydown rejected");
            }
            self.push("submit".into());
            Ok(())
        }
        async fn exists(&self, _selector: &str) -> bool {
            self.push("poll".into());
            self.always_busy
        }
    }

    fn runner(max_wait: Option<Duration>) -> StepRunner {
        StepRunner::new(
            SurfaceLocator::new(
                vec!["#prompt-textarea".into(), "main textarea".into()],
                vec!["button[aria-label*=\"Stop\"]".into()],
            ),
            Timing {
                settle_delay: Duration::from_millis(1),
                initial_delay: Duration::from_millis(1),
                poll_interval: Duration::from_millis(1),
                max_wait,
            },
        )
    }

    fn workflow(prompts: &[&str]) -> Workflow {
        let mut wf = Workflow::new("wf", "");
        for (i, p) in prompts.iter().enumerate() {
            wf.nodes.push(Node::prompt(format!("n{}", i + 1), "", *p));
        }
        wf
    }

    fn values(pairs: &[(&str, &str)]) -> VariableValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_steps_run_in_order_with_substitution() {
        let surface = ScriptedSurface::default();
        let wf = workflow(&["About {topic}", "More on {topic} for {who}"]);

        let outcome = runner(None)
            .run(&wf, &values(&[("topic", "rust")]), &surface)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Finished { steps: 2 });
        assert_eq!(
            surface.log(),
            vec![
                "clear",
                "insert:About rust",
                "submit",
                "poll",
                "clear",
                "insert:More on rust for {who}",
                "submit",
                "poll",
            ]
        );
    }

    #[tokio::test]
    async fn test_non_prompt_nodes_are_skipped() {
        let surface = ScriptedSurface::default();
        let mut wf = workflow(&["first", "", "third"]);
        wf.nodes[0].kind = NodeKind::Output;

        let outcome = runner(None).run(&wf, &VariableValues::new(), &surface).await.unwrap();
        assert_eq!(outcome, RunOutcome::Finished { steps: 1 });
        assert_eq!(surface.log(), vec!["clear", "insert:third", "submit", "poll"]);
    }

    #[tokio::test]
    async fn test_missing_input_halts_quietly() {
        let surface = ScriptedSurface {
            no_input: true,
            ..Default::default()
        };
        let outcome = runner(None)
            .run(&workflow(&["a"]), &VariableValues::new(), &surface)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::InputMissing { step: 1 });
        assert!(surface.log().is_empty());
    }

    #[tokio::test]
    async fn test_insert_failure_falls_back_to_paste() {
        let surface = ScriptedSurface {
            insert_fails: true,
            ..Default::default()
        };
        runner(None)
            .run(&workflow(&["hello"]), &VariableValues::new(), &surface)
            .await
            .unwrap();
        assert_eq!(surface.log(), vec!["clear", "paste:hello", "submit", "poll"]);
    }

    #[tokio::test]
    async fn test_failed_paste_still_submits() {
        let surface = ScriptedSurface {
            insert_fails: true,
            paste_fails: true,
            ..Default::default()
        };
        let outcome = runner(None)
            .run(&workflow(&["hello"]), &VariableValues::new(), &surface)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Finished { steps: 1 });
        assert_eq!(surface.log(), vec!["clear", "submit", "poll"]);
    }

    #[tokio::test]
    async fn test_input_lost_mid_run_keeps_earlier_steps() {
        // Step one locates the input, then the idle check locates it again
        let surface = ScriptedSurface {
            input_lookups: Some(2),
            ..Default::default()
        };
        let outcome = runner(None)
            .run(&workflow(&["one", "two"]), &VariableValues::new(), &surface)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::InputMissing { step: 2 });
        assert_eq!(surface.log(), vec!["clear", "insert:one", "submit", "poll"]);
    }

    #[tokio::test]
    async fn test_submit_error_aborts_remaining_steps() {
        let surface = ScriptedSurface {
            submit_fails: true,
            ..Default::default()
        };
        let err = runner(None)
            .run(&workflow(&["one", "two"]), &VariableValues::new(), &surface)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Surface(_)));
        assert_eq!(surface.log(), vec!["clear", "insert:one"]);
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let surface = ScriptedSurface {
            always_busy: true,
            ..Default::default()
        };
        let err = runner(Some(Duration::from_millis(5)))
            .run(&workflow(&["one", "two"]), &VariableValues::new(), &surface)
            .await
            .unwrap_err();
        match err {
            EngineError::CompletionTimeout { node_id, .. } => assert_eq!(node_id, "n1"),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!surface.log().contains(&"insert:two".to_string()));
    }
}
