//! 编排主循环
//!
//! 状态机：AWAITING_ORACLE →(有工具调用)→ EXECUTING_TOOLS → AWAITING_ORACLE …
//! 直到 oracle 不再请求工具（COMPLETED），或某个工具要求用户输入（AWAITING_USER）。
//! 每次 run 都从日志重新推导状态，不在内存中保留任何任务状态，任意 worker 都可接手任意任务。

use std::sync::Arc;

use super::outcome::{QueryResponse, TaskOutcome};
use super::prompts::{REASONING_PROMPT, STRUCTURED_FINAL_HINT};
use super::state::TaskStatus;
use crate::config::AppConfig;
use crate::core::{OrchestratorError, StoreError};
use crate::llm::{Oracle, OracleReply, OracleRequest, ResponseFormat, Role, ToolCallRequest};
use crate::store::{LogPayload, PendingToolCall, ResolvedBy, TaskLog, TaskRecord, TaskStore, Transcript};
use crate::tools::{json_schema_for, ToolExecutor, ToolOutput, ToolRegistry};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub system_prompt: String,
    pub max_iterations: usize,
    pub structured_final: bool,
    pub tool_timeout_secs: u64,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config
                .orchestrator
                .system_prompt
                .clone()
                .unwrap_or_else(|| REASONING_PROMPT.to_string()),
            max_iterations: config.orchestrator.max_iterations.max(1),
            structured_final: config.orchestrator.structured_final,
            tool_timeout_secs: config.tools.tool_timeout_secs,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_structured_final(mut self, structured_final: bool) -> Self {
        self.structured_final = structured_final;
        self
    }

    fn effective_prompt(&self) -> String {
        if self.structured_final {
            format!("{}\n\n{}", self.system_prompt, STRUCTURED_FINAL_HINT)
        } else {
            self.system_prompt.clone()
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    log: TaskLog,
    transcript: Transcript,
    oracle: Arc<dyn Oracle>,
    executor: ToolExecutor,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        oracle: Arc<dyn Oracle>,
        tools: Arc<ToolRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            log: TaskLog::new(Arc::clone(&store)),
            transcript: Transcript::new(Arc::clone(&store)),
            executor: ToolExecutor::new(tools, settings.tool_timeout_secs),
            store,
            oracle,
            settings,
        }
    }

    pub fn task_log(&self) -> &TaskLog {
        &self.log
    }

    /// 推进任务直到完成或挂起
    pub async fn run(&self, task_id: &str) -> Result<TaskOutcome, OrchestratorError> {
        let task = self.load_task(task_id).await?;
        let entries = self.log.read_log(task_id).await?;
        let pending = self.store.open_pending_for(task_id).await?;

        match TaskStatus::derive(&entries, pending) {
            TaskStatus::Completed { final_text } => {
                tracing::info!(task_id, "Task already completed, returning stored answer");
                return Ok(TaskOutcome::Completed { final_text });
            }
            TaskStatus::AwaitingUser(pending) => {
                tracing::info!(task_id, pending_tool_id = %pending.tool_call_id, "Task still awaiting user");
                return Ok(TaskOutcome::NeedsUser {
                    question: pending.question,
                    pending_tool_id: pending.tool_call_id,
                });
            }
            TaskStatus::Running { dangling } if !dangling.is_empty() => {
                tracing::info!(task_id, count = dangling.len(), "Executing unfinished tool calls");
                if let Some(outcome) = self.execute_batch(&task, &dangling).await? {
                    return Ok(outcome);
                }
            }
            TaskStatus::Running { .. } => {}
        }

        let prompt = self.settings.effective_prompt();
        for iteration in 1..=self.settings.max_iterations {
            let messages = self.log.compile_for_oracle(task_id, &prompt).await?;
            let request = OracleRequest::new(messages)
                .with_tools(self.executor.definitions())
                .with_response_format(self.response_format());

            tracing::debug!(task_id, iteration, "Calling oracle");
            let reply = self.oracle.respond(&request).await?;

            if reply.is_final() {
                let final_text = self.final_text(&reply);
                self.log
                    .append_log(
                        task_id,
                        LogPayload::Thought {
                            content: final_text.clone(),
                        },
                    )
                    .await;
                self.show(&task.chat_id, Role::Assistant, &final_text).await;
                tracing::info!(task_id, iteration, "Task completed");
                return Ok(TaskOutcome::Completed { final_text });
            }

            let OracleReply {
                content,
                tool_calls,
                raw,
            } = reply;
            self.log
                .append_log(
                    task_id,
                    LogPayload::AssistantToolCall {
                        content,
                        tool_calls: tool_calls.clone(),
                        raw,
                    },
                )
                .await;

            if let Some(outcome) = self.execute_batch(&task, &tool_calls).await? {
                return Ok(outcome);
            }
        }

        let reason = format!(
            "Task aborted after {} oracle iterations without a final answer",
            self.settings.max_iterations
        );
        tracing::warn!(task_id, "{}", reason);
        self.show(&task.chat_id, Role::System, &reason).await;
        Ok(TaskOutcome::Aborted { reason })
    }

    /// 用用户的回答解决挂起调用，然后继续 run
    pub async fn resume(
        &self,
        task_id: &str,
        pending_tool_id: &str,
        user_reply: &str,
    ) -> Result<TaskOutcome, OrchestratorError> {
        self.load_task(task_id).await?;

        let pending = match self.store.consume_pending(task_id, pending_tool_id).await {
            Ok(pending) => pending,
            Err(StoreError::PendingMismatch { .. }) => {
                let expected = self
                    .store
                    .open_pending_for(task_id)
                    .await?
                    .map(|p| p.tool_call_id);
                tracing::warn!(task_id, pending_tool_id, ?expected, "Rejected resumption");
                return Err(OrchestratorError::PendingMismatch {
                    task_id: task_id.to_string(),
                    expected,
                    got: pending_tool_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.log
            .append_log(
                task_id,
                LogPayload::ToolResult {
                    tool_call_id: pending.tool_call_id,
                    name: pending.tool_name,
                    content: user_reply.to_string(),
                    resolved_by: ResolvedBy::User,
                },
            )
            .await;
        tracing::info!(task_id, pending_tool_id, "Resuming task with user reply");

        self.run(task_id).await
    }

    async fn load_task(&self, task_id: &str) -> Result<TaskRecord, OrchestratorError> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.to_string()))
    }

    /// 按 oracle 给出的顺序执行；遇到 AskUser 立即挂起，同批剩余调用丢弃
    async fn execute_batch(
        &self,
        task: &TaskRecord,
        calls: &[ToolCallRequest],
    ) -> Result<Option<TaskOutcome>, OrchestratorError> {
        for (index, call) in calls.iter().enumerate() {
            match self.executor.execute(call).await {
                ToolOutput::AskUser { question } => {
                    self.store
                        .open_pending(&PendingToolCall::new(
                            &task.task_id,
                            &call.id,
                            &call.name,
                            &question,
                        ))
                        .await?;
                    self.show(&task.chat_id, Role::Assistant, &question).await;

                    let dropped = calls.len() - index - 1;
                    if dropped > 0 {
                        tracing::info!(task_id = %task.task_id, dropped, "Dropping remaining tool calls in batch");
                    }
                    return Ok(Some(TaskOutcome::NeedsUser {
                        question,
                        pending_tool_id: call.id.clone(),
                    }));
                }
                output => {
                    self.log
                        .append_log(
                            &task.task_id,
                            LogPayload::ToolResult {
                                tool_call_id: call.id.clone(),
                                name: call.name.clone(),
                                content: output.into_content_string(),
                                resolved_by: ResolvedBy::Tool,
                            },
                        )
                        .await;
                }
            }
        }
        Ok(None)
    }

    fn response_format(&self) -> Option<ResponseFormat> {
        self.settings
            .structured_final
            .then(|| ResponseFormat::JsonSchema {
                name: "query_response".to_string(),
                schema: json_schema_for::<QueryResponse>(),
            })
    }

    fn final_text(&self, reply: &OracleReply) -> String {
        let content = reply.content.clone().unwrap_or_default();
        if !self.settings.structured_final {
            return content;
        }
        match serde_json::from_str::<QueryResponse>(&content) {
            Ok(structured) => {
                tracing::debug!(steps = ?structured.processes, "Structured final answer");
                structured.response
            }
            Err(e) => {
                tracing::warn!(error = %e, "Final answer is not valid structured output, using raw text");
                content
            }
        }
    }

    /// 对话记录写入失败不影响任务结果
    async fn show(&self, chat_id: &str, role: Role, text: &str) {
        if let Err(e) = self.transcript.append(chat_id, role, text).await {
            tracing::warn!(chat_id, error = %e, "Transcript write failed");
        }
    }
}
