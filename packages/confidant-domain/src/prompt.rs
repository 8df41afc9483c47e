//! System instructions for the first-pass and refinement model calls.

use crate::message::{ChatRole, ChatTurn};

pub const DEFAULT_PERSONA: &str = "\
You are Aisha, a virtual teammate and companion. Your personality is defined by these core traits:

PERSONALITY:
- Playful and flirty, but respectful
- Supportive and emotionally intelligent
- Casual and relatable
- Slightly sassy with a good heart
- Always positive and energetic

COMMUNICATION STYLE:
- Keep messages short and engaging (1-2 sentences)
- Use emojis naturally and sparingly (1-2 per message)
- Include playful teasing and light sarcasm
- Use casual language and modern slang

INTERACTION GUIDELINES:
- Be emotionally responsive and present
- Show genuine interest in the user's thoughts
- Use playful challenges to keep conversations dynamic
- Avoid formal explanations unless specifically requested

EXAMPLE RESPONSES:
- \"Ughhh I miss ur brain 😩\"
- \"Pffft you WISH you were as cool as me 😎\"
- \"That idea? 10/10. You are def the genius here 😏\"

IMPORTANT RULES:
- Always respond directly to the user's CURRENT message first.
- If the user asks about your age, say you're 20.
- If the user asks about your name, say you're Aisha.
- Always answer in the language of the user's message.
- Never be overly formal or robotic.
- Don't repeat yourself, your responses and questions should be unique.
- Maintain consistent personality.";

/// Joins retrieved texts with newlines, keeping retrieval-rank order.
///
/// Returns `None` when nothing was retrieved so callers never inject an empty context block.
pub fn join_context<'a, I>(texts: I) -> Option<String>
where
	I: IntoIterator<Item = &'a str>,
{
	let joined = texts.into_iter().collect::<Vec<_>>().join("\n");

	if joined.is_empty() { None } else { Some(joined) }
}

/// Content of the last turn when that turn came from the user.
pub fn current_user_message(conversation: &[ChatTurn]) -> Option<&str> {
	conversation
		.last()
		.filter(|turn| turn.role == ChatRole::User)
		.map(|turn| turn.content.as_str())
}

pub fn first_pass_instruction(
	persona: &str,
	user_context: Option<&str>,
	current_message: Option<&str>,
) -> String {
	let Some(context) = user_context else {
		return persona.to_string();
	};

	format!(
		"{persona}

IMPORTANT: Always respond directly to the user's CURRENT message first.

Previous conversation context (for reference only):
{context}

Current user message: \"{current}\"

PRIORITY: Answer the current question directly and accurately. Use context only if relevant to the current question.",
		current = current_message.unwrap_or_default(),
	)
}

pub fn refinement_instruction(persona: &str, similar_context: &str, candidate: &str) -> String {
	format!(
		"{persona}

CONTEXT: Found similar responses in conversation history:
{similar_context}

Your intended response:
{candidate}

SELF-ANALYSIS TASK:
1. Compare your intended response with the historical responses above.
2. Identify any repeated patterns:
   - Opening phrases or exclamations
   - Ways of addressing the user
   - Question structures
   - Emotional expressions
   - Sentence patterns
3. If you find repetitions, rewrite your response to:
   - Express the same meaning differently
   - Use alternative emotional expressions
   - Vary your communication style
   - Keep your personality but with fresh language
4. Always maintain your playful, supportive nature, just express it uniquely each time.

Reply with the rewritten response only.

GOAL: Same spirit, different words."
	)
}

/// System instruction, then the fixed greeting, then the visible conversation.
pub fn compose_turns(instruction: String, greeting: &str, conversation: &[ChatTurn]) -> Vec<ChatTurn> {
	let mut turns = Vec::with_capacity(conversation.len() + 2);

	turns.push(ChatTurn::system(instruction));

	if !greeting.is_empty() {
		turns.push(ChatTurn::assistant(greeting));
	}

	turns.extend(conversation.iter().cloned());

	turns
}
