//! Reassembly of out-of-order multi-tool results at the handler level: the
//! worker's serial execution normally completes tools in invocation order,
//! so the shuffle is driven directly through the tool-result handler here.

use std::sync::Arc;
use std::time::Duration;

use agentflow::agentflow::context::AgentContext;
use agentflow::agentflow::events::{
    AgentEvent, MultiToolCallTurn, ToolInvocation, ToolResultEvent,
};
use agentflow::agentflow::handlers::{AgentEventHandler, ToolResultEventHandler};
use agentflow::agentflow::notifier::AgentExternalEventNotifier;
use agentflow::agentflow::phase_manager::AgentPhaseManager;
use agentflow::agentflow::queues::AgentInputQueues;
use agentflow::agentflow::tool::{JsonMap, ToolOutput};
use agentflow::AgentConfig;

fn make_context(agent_id: &str) -> (AgentContext, AgentPhaseManager) {
    let notifier = Arc::new(AgentExternalEventNotifier::new(agent_id));
    let config = Arc::new(AgentConfig::new(agent_id, "Test"));
    let (mut context, _handle) = AgentContext::new(agent_id, config, notifier.clone());
    context
        .state
        .install_input_queues(Arc::new(AgentInputQueues::new(16)));
    let manager = AgentPhaseManager::new(agent_id, notifier);
    (context, manager)
}

fn invocation(name: &str, id: &str, turn_id: &str) -> ToolInvocation {
    ToolInvocation::new(name, JsonMap::new(), Some(id.to_string()))
        .with_turn_id(turn_id.to_string())
}

fn result(name: &str, id: &str, turn_id: &str, payload: &str) -> ToolResultEvent {
    ToolResultEvent::success(name, id, ToolOutput::Value(serde_json::json!(payload)))
        .with_turn_id(Some(turn_id.to_string()))
}

#[tokio::test]
async fn test_results_completing_out_of_order_are_reassembled() {
    let (mut context, manager) = make_context("reassembly");
    let turn_id = "turn-1";
    context.state.active_turn_id = Some(turn_id.to_string());
    context.state.active_multi_tool_call_turn = Some(MultiToolCallTurn::new(
        turn_id,
        vec![
            invocation("a", "ia", turn_id),
            invocation("b", "ib", turn_id),
            invocation("c", "ic", turn_id),
        ],
    ));

    let handler = ToolResultEventHandler::new();
    // Completion order: C, A, B.
    for event in [
        result("c", "ic", turn_id, "c-result"),
        result("a", "ia", turn_id, "a-result"),
        result("b", "ib", turn_id, "b-result"),
    ] {
        handler
            .handle(AgentEvent::ToolResult(event), &mut context, &manager)
            .await
            .unwrap();
    }

    // Turn state is cleared once every invocation reported back.
    assert!(context.state.active_multi_tool_call_turn.is_none());
    assert!(context.state.active_turn_id.is_none());

    let queues = context.queues().unwrap();
    let dequeued = tokio::time::timeout(Duration::from_secs(1), queues.get_next_input_event())
        .await
        .expect("aggregated message should be enqueued");
    let content = match dequeued.1 {
        AgentEvent::UserMessageReceived { message } => message.content,
        other => panic!("unexpected event: {:?}", other),
    };

    // The synthesized message lists results in invocation order A, B, C.
    let pos_a = content.find("Tool: a (ID: ia)").unwrap();
    let pos_b = content.find("Tool: b (ID: ib)").unwrap();
    let pos_c = content.find("Tool: c (ID: ic)").unwrap();
    assert!(pos_a < pos_b && pos_b < pos_c, "wrong order:\n{}", content);
    assert!(content.contains("a-result"));
    assert!(content.contains("b-result"));
    assert!(content.contains("c-result"));
}

#[tokio::test]
async fn test_incomplete_turn_does_not_dispatch() {
    let (mut context, manager) = make_context("incomplete");
    let turn_id = "turn-2";
    context.state.active_multi_tool_call_turn = Some(MultiToolCallTurn::new(
        turn_id,
        vec![invocation("a", "ia", turn_id), invocation("b", "ib", turn_id)],
    ));

    let handler = ToolResultEventHandler::new();
    handler
        .handle(
            AgentEvent::ToolResult(result("a", "ia", turn_id, "a-result")),
            &mut context,
            &manager,
        )
        .await
        .unwrap();

    // One of two results collected: nothing re-enters the pipeline yet.
    assert!(context.state.active_multi_tool_call_turn.is_some());
    let queues = context.queues().unwrap();
    assert!(queues.all_empty());
}

#[tokio::test]
async fn test_denied_result_is_labelled_in_single_turn() {
    let (mut context, manager) = make_context("single-denied");

    let handler = ToolResultEventHandler::new();
    handler
        .handle(
            AgentEvent::ToolResult(ToolResultEvent::denied(
                "rm_rf",
                "rm1",
                "blocked by policy",
            )),
            &mut context,
            &manager,
        )
        .await
        .unwrap();

    let queues = context.queues().unwrap();
    let (_, event) = tokio::time::timeout(Duration::from_secs(1), queues.get_next_input_event())
        .await
        .unwrap();
    let content = match event {
        AgentEvent::UserMessageReceived { message } => message.content,
        other => panic!("unexpected event: {:?}", other),
    };
    assert!(
        content.contains("Tool: rm_rf (ID: rm1)\nStatus: Denied\nDetails: blocked by policy"),
        "got:\n{}",
        content
    );
}
