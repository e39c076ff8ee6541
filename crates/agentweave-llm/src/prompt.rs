/// Used by `agent` nodes whose persona reference is missing or unknown.
pub const GENERIC_AGENT_INSTRUCTION: &str = "You are a helpful, concise assistant. Answer the user's request directly.";

/// System prompt asking the model to pick exactly one intent.
pub fn classifier_system_prompt(intents: &[String], instruction: &str) -> String {
    let list = intents
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = String::new();
    if !instruction.trim().is_empty() {
        prompt.push_str(instruction.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "Classify the user's message into exactly one of these intents:\n{}\n\n\
         Reply with the intent label only, exactly as written above. Do not explain.",
        list
    ));
    prompt
}

/// Match a (possibly verbose) model reply to one declared intent.
///
/// An exact match (ignoring case, surrounding whitespace, quotes and a
/// trailing period) wins. Otherwise the first declared intent contained in
/// the reply is taken. `None` means the reply names no declared intent; the
/// caller picks the fallback.
///
/// The returned label is trimmed, matching how edge labels are stored.
pub fn match_intent(response: &str, intents: &[String]) -> Option<String> {
    let cleaned = response
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
        .trim()
        .to_lowercase();

    if let Some(exact) = intents
        .iter()
        .map(|i| i.trim())
        .find(|i| i.to_lowercase() == cleaned)
    {
        return Some(exact.to_string());
    }

    let haystack = response.to_lowercase();
    intents
        .iter()
        .map(|i| i.trim())
        .find(|i| !i.is_empty() && haystack.contains(&i.to_lowercase()))
        .map(str::to_string)
}
