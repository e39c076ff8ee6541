/// Build the synthesizer system prompt.
pub(crate) fn synthesis_system_prompt(target_language: &str) -> String {
    format!(
        r#"You design agent workflows as directed graphs. Given a description, output ONE JSON object:

```json
{{"nodes": [<Node>, ...], "edges": [<Edge>, ...]}}
```

**Node**: `{{"id": "<unique id>", "name": "<short label>", "data": <Data>}}`

**Data** (pick one per node by `type`):
1. `{{"type": "Start"}}` — the single entry point. Exactly one per graph, no incoming edges.
2. `{{"type": "Llm", "system_instruction": "<instruction>", "temperature": 0.7}}` — generates text. The instruction may use the placeholders `{{{{input}}}}` (user message), `{{{{context}}}}` (previous step output) and `{{{{user_profile}}}}`.
3. `{{"type": "Agent", "agent_id": "<persona id>"}}` — hands the message to a named agent persona.
4. `{{"type": "Condition", "variable": "input", "operator": "contains|equals|not_empty|empty|greater|less", "value": "<text>"}}` — branches. MUST have two outgoing edges labeled `"True"` and `"False"`.
5. `{{"type": "Classifier", "intents": ["<A>", "<B>"], "instruction": "<how to classify>"}}` — routes by intent. MUST have one outgoing edge per intent, labeled with the intent text.
6. `{{"type": "End"}}` — terminal; returns the last output. No outgoing edges.

**Edge**: `{{"source": "<node id>", "target": "<node id>", "label": "<optional branch label>"}}`

Rules:
- Every edge must reference node ids that exist. No edge may connect a node to itself.
- Every path should finish at an End node.
- Write all names, instructions and intent labels in {language}.
- Output ONLY the JSON object, no commentary."#,
        language = target_language
    )
}
