//! Streaming dialog engine
//!
//! Consumes the LLM's lazy response stream, carves it into speakable
//! segments, and drives the function-calling protocol. Two entry points:
//! [`chat`] for plain conversation and [`chat_with_function_calling`] when
//! the intent backend is `function_call`. Any LLM failure abandons the reply
//! and leaves the session running.

use futures::future::BoxFuture;
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::components::LlmEvent;
use crate::session::dialogue::{Message, ToolCallDescriptor};
use crate::session::segment::{extract_json_object, SegmentAccumulator};
use crate::session::Session;
use crate::tools::{Action, ActionResponse, FunctionCallData};

/// Bound on REQLLM re-entry so tool loops cannot recurse forever
const MAX_TOOL_DEPTH: usize = 4;

/// Content prefix that opens an inline tool call
const TOOL_CALL_PREFIX: &str = "<tool_call>";

/// Run one plain reply for a user utterance.
///
/// Returns false when the LLM could not be reached; the session survives
/// either way.
pub async fn chat(session: &Arc<Session>, query: &str) -> bool {
    session.dialogue.lock().await.put(Message::user(query));

    let memory = session.components.memory();
    let memory_str = match memory.query_memory(query).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Memory lookup failed for '{query}': {e}");
            return false;
        }
    };
    debug!("Memory context: {memory_str}");

    let llm = session.components.llm();
    let dialogue = session
        .dialogue
        .lock()
        .await
        .llm_dialogue_with_memory(&memory_str);
    let mut stream = match llm.response(&session.session_id, dialogue).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("LLM request failed for '{query}': {e}");
            return false;
        }
    };

    session.speak.set_llm_finished(false);
    let mut acc = SegmentAccumulator::new();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("LLM stream error: {e}");
                break;
            }
        };
        acc.push_chunk(&chunk);
        if session.speak.is_aborted() {
            break;
        }
        if let Some(segment) = acc.next_segment() {
            session.enqueue_segment(segment.text, segment.text_index).await;
        }
    }
    if let Some(segment) = acc.flush() {
        session.enqueue_segment(segment.text, segment.text_index).await;
    }

    session.speak.set_llm_finished(true);
    session
        .dialogue
        .lock()
        .await
        .put(Message::assistant(acc.full_text()));
    true
}

/// Run one reply that may call tools. `is_tool_reply` marks re-entry with a
/// tool result, which must not be logged as a user message.
pub async fn chat_with_function_calling(
    session: &Arc<Session>,
    query: &str,
    is_tool_reply: bool,
) -> bool {
    chat_with_functions_inner(session, query.to_string(), is_tool_reply, 0).await
}

fn chat_with_functions_inner(
    session: &Arc<Session>,
    query: String,
    is_tool_reply: bool,
    depth: usize,
) -> BoxFuture<'static, bool> {
    let session = session.clone();
    Box::pin(async move {
        debug!("Function-calling chat start: {query}");
        if !is_tool_reply {
            session.dialogue.lock().await.put(Message::user(&query));
        }

        let mut functions = session
            .func_handler()
            .map(|h| h.get_functions())
            .unwrap_or_default();
        functions.extend(session.remote_tools.function_schemas());

        let memory = session.components.memory();
        let memory_str = match memory.query_memory(&query).await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Memory lookup failed for '{query}': {e}");
                return false;
            }
        };

        let llm = session.components.llm();
        let dialogue = session
            .dialogue
            .lock()
            .await
            .llm_dialogue_with_memory(&memory_str);
        let mut stream = match llm
            .response_with_functions(&session.session_id, dialogue, functions)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                error!("LLM request failed for '{query}': {e}");
                return false;
            }
        };

        session.speak.set_llm_finished(false);
        let mut acc = SegmentAccumulator::new();
        let mut tool_call_flag = false;
        let mut function_id: Option<String> = None;
        let mut function_name: Option<String> = None;
        let mut function_arguments = String::new();
        let mut content_arguments = String::new();

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    error!("LLM stream error: {e}");
                    break;
                }
            };
            match event {
                LlmEvent::ToolCallDelta {
                    id,
                    name,
                    arguments,
                } => {
                    tool_call_flag = true;
                    if let Some(id) = id {
                        function_id = Some(id);
                    }
                    if let Some(name) = name {
                        function_name = Some(name);
                    }
                    if let Some(fragment) = arguments {
                        function_arguments.push_str(&fragment);
                    }
                }
                LlmEvent::Content(content) => {
                    if content.is_empty() {
                        continue;
                    }
                    content_arguments.push_str(&content);
                    if !tool_call_flag && content_arguments.starts_with(TOOL_CALL_PREFIX) {
                        tool_call_flag = true;
                    }
                    // once a tool call is open, content only accumulates for
                    // later JSON extraction and is never spoken
                    if !tool_call_flag {
                        acc.push_chunk(&content);
                        if session.speak.is_aborted() {
                            break;
                        }
                        if let Some(segment) = acc.next_segment() {
                            session
                                .enqueue_segment(segment.text, segment.text_index)
                                .await;
                        }
                    }
                }
            }
        }

        if tool_call_flag {
            let mut has_error = false;
            if function_id.is_none() {
                match extract_json_object(&content_arguments) {
                    Some(raw) => {
                        match serde_json::from_str::<serde_json::Value>(raw) {
                            Ok(parsed) => match parsed.get("name").and_then(|n| n.as_str()) {
                                Some(name) => {
                                    function_name = Some(name.to_string());
                                    function_arguments = parsed
                                        .get("arguments")
                                        .map(|a| a.to_string())
                                        .unwrap_or_else(|| "{}".to_string());
                                    function_id =
                                        Some(uuid::Uuid::new_v4().simple().to_string());
                                }
                                None => {
                                    has_error = true;
                                    acc.push_chunk(raw);
                                }
                            },
                            Err(_) => {
                                has_error = true;
                                acc.push_chunk(raw);
                            }
                        }
                    }
                    None => {
                        has_error = true;
                        acc.push_chunk(&content_arguments);
                    }
                }
                if has_error {
                    error!("Malformed inline tool call: {content_arguments}");
                }
            }

            if !has_error {
                acc.clear_buffer();
                let call = FunctionCallData {
                    name: function_name.unwrap_or_default(),
                    id: function_id.unwrap_or_default(),
                    arguments: function_arguments,
                };
                info!(
                    "Tool call: name={}, id={}, arguments={}",
                    call.name, call.id, call.arguments
                );
                let result = if session.remote_tools.is_mcp_tool(&call.name) {
                    handle_remote_tool_call(&session, &call).await
                } else if let Some(handler) = session.func_handler() {
                    handler.handle_llm_function_call(&call).await
                } else {
                    ActionResponse::not_found(format!(
                        "Function '{}' does not exist",
                        call.name
                    ))
                };
                handle_function_result(&session, result, &call, acc.next_index(), depth)
                    .await;
            }
        }

        if let Some(segment) = acc.flush() {
            session.enqueue_segment(segment.text, segment.text_index).await;
        }
        if !acc.is_buffer_empty() {
            session
                .dialogue
                .lock()
                .await
                .put(Message::assistant(acc.full_text()));
        }
        session.speak.set_llm_finished(true);
        true
    })
}

/// Apply one tool result according to its action tag
async fn handle_function_result(
    session: &Arc<Session>,
    result: ActionResponse,
    call: &FunctionCallData,
    text_index: usize,
    depth: usize,
) {
    match result.action {
        Action::Response => {
            let text = result.response.unwrap_or_default();
            session.enqueue_segment(text.clone(), text_index).await;
            session.dialogue.lock().await.put(Message::assistant(text));
        }
        Action::ReqLlm => {
            let text = result.result.unwrap_or_default();
            if text.is_empty() {
                return;
            }
            {
                let mut dialogue = session.dialogue.lock().await;
                dialogue.put(Message::assistant_tool_call(ToolCallDescriptor::new(
                    &call.id,
                    &call.name,
                    &call.arguments,
                )));
                dialogue.put(Message::tool_reply(&call.id, &text));
            }
            if depth + 1 < MAX_TOOL_DEPTH {
                chat_with_functions_inner(session, text, true, depth + 1).await;
            } else {
                warn!(
                    "Tool re-entry depth limit reached for '{}', dropping follow-up",
                    call.name
                );
            }
        }
        Action::NotFound | Action::Error => {
            let text = result.result.unwrap_or_default();
            session.enqueue_segment(text.clone(), text_index).await;
            session.dialogue.lock().await.put(Message::assistant(text));
        }
        Action::None => {}
    }
}

/// Invoke a registered remote tool and fold its content parts into a REQLLM
/// result; failures become a synthetic result so the LLM can apologize
async fn handle_remote_tool_call(session: &Arc<Session>, call: &FunctionCallData) -> ActionResponse {
    let arguments: serde_json::Value = match serde_json::from_str(&call.arguments) {
        Ok(value) => value,
        Err(e) => {
            error!(
                "Cannot parse remote tool arguments for '{}': {e}",
                call.name
            );
            return ActionResponse::req_llm("Tool argument parsing failed");
        }
    };
    match session.remote_tools.execute_tool(&call.name, arguments).await {
        Ok(result) => {
            let text = result.text();
            if !text.is_empty() && !result.is_error {
                ActionResponse::req_llm(text)
            } else {
                ActionResponse::req_llm("Tool call failed")
            }
        }
        Err(e) => {
            error!("Remote tool '{}' failed: {e}", call.name);
            ActionResponse::req_llm("Tool call failed")
        }
    }
}
