use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use driftbot_core::types::ChatMessage;
use driftbot_core::{Config, Error, Result};
use driftbot_providers::Provider;
use driftbot_tools::{ToolContext, ToolRegistry};
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are a web browsing assistant. You complete one task at a time \
using the tools available to you: search the web, fetch pages, and open pages in a browser when \
they need JavaScript.\n\n\
Guidelines:\n\
- Start from a web_search unless the task already names a URL.\n\
- Visit one page at a time and read it before deciding the next step.\n\
- Keep going until you can answer the task from what you have actually read.\n\
- When you are done, reply with a short plain-text summary of what you found. \
Do not call any more tools in that final reply.";

/// Runs one task end to end: repeated LLM calls with tool execution in
/// between, bounded by `max_steps`.
pub struct TaskAgent {
    config: Config,
    provider: Arc<dyn Provider>,
    tool_registry: ToolRegistry,
    workspace: PathBuf,
}

impl TaskAgent {
    pub fn new(
        config: Config,
        provider: Arc<dyn Provider>,
        tool_registry: ToolRegistry,
        workspace: PathBuf,
    ) -> Self {
        Self {
            config,
            provider,
            tool_registry,
            workspace,
        }
    }

    /// Drive the task to completion. Returns the agent's final text answer.
    ///
    /// Errors from the LLM (after retries) and from hitting the step cap
    /// surface as `Err`; the caller decides whether that is fatal.
    pub async fn run_task(&self, task: &str) -> Result<String> {
        let tools = self.tool_registry.get_tool_schemas();
        let max_steps = self.config.agents.defaults.max_steps;

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(task)];

        info!(task = %task, max_steps, tool_count = tools.len(), "Starting task");

        for step in 0..max_steps {
            debug!(step, "LLM call iteration");

            let response = self.call_llm_with_retry(&messages, &tools, step).await?;

            info!(
                step,
                content_len = response.content.as_deref().map(str::len).unwrap_or(0),
                tool_calls_count = response.tool_calls.len(),
                finish_reason = %response.finish_reason,
                "LLM response received"
            );

            if response.tool_calls.is_empty() {
                let answer = response.content.unwrap_or_default();
                info!(step, answer_len = answer.len(), "Task finished");
                return Ok(answer);
            }

            let mut assistant_msg =
                ChatMessage::assistant(response.content.as_deref().unwrap_or(""));
            assistant_msg.tool_calls = Some(response.tool_calls.clone());
            messages.push(assistant_msg);

            for tool_call in &response.tool_calls {
                let result = self.execute_tool_call(&tool_call.name, tool_call.arguments.clone()).await;
                let mut tool_msg = ChatMessage::tool_result(&tool_call.id, &result);
                tool_msg.name = Some(tool_call.name.clone());
                messages.push(tool_msg);
            }

            // Pause between actions like a person reading the page would.
            if step + 1 < max_steps {
                tokio::time::sleep(self.action_delay()).await;
            }
        }

        Err(Error::Task(format!(
            "Task did not finish within {} steps: {}",
            max_steps, task
        )))
    }

    async fn call_llm_with_retry(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        step: u32,
    ) -> Result<driftbot_core::types::LLMResponse> {
        let max_retries = self.config.agents.defaults.llm_max_retries;
        let base_delay_ms = self.config.agents.defaults.llm_retry_delay_ms;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay_ms = base_delay_ms * (1u64 << (attempt - 1).min(4));
                warn!(attempt, max_retries, delay_ms, step, "Retrying LLM call after transient error");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            match self.provider.chat(messages, tools).await {
                Ok(r) => {
                    if attempt > 0 {
                        info!(attempt, step, "LLM call succeeded after retry");
                    }
                    return Ok(r);
                }
                Err(e) => {
                    warn!(error = %e, attempt, max_retries, step, "LLM call failed");
                    last_error = Some(e);
                }
            }
        }

        let e = last_error.unwrap_or_else(|| Error::Provider("LLM call failed".to_string()));
        Err(Error::Provider(format!(
            "LLM call failed after {} retries: {}",
            max_retries, e
        )))
    }

    /// Execute one tool call, turning any error into a text result the
    /// model can react to. Tool failures never abort the task.
    async fn execute_tool_call(&self, name: &str, arguments: Value) -> String {
        let ctx = ToolContext {
            workspace: self.workspace.clone(),
            config: self.config.clone(),
        };

        match self.tool_registry.execute(name, ctx, arguments).await {
            Ok(value) => value.to_string(),
            Err(e) => {
                warn!(tool = name, error = %e, "Tool execution failed");
                format!("Error: {}", e)
            }
        }
    }

    fn action_delay(&self) -> Duration {
        let pacing = &self.config.pacing;
        let min = pacing.min_action_delay_secs.min(pacing.max_action_delay_secs);
        let max = pacing.max_action_delay_secs.max(pacing.min_action_delay_secs);
        let secs = rand::thread_rng().gen_range(min..=max);
        Duration::from_secs(secs)
    }
}
