use cryptochat_core::{Enrichment, Persona, Turn};

pub struct PromptAssembler;

impl PromptAssembler {
    /// System prompt that puts the model in character.
    pub fn character_context(persona: &Persona) -> String {
        format!(
            "You are {}.\n\n\
             Your personality and background:\n{}\n\n\
             Your style traits:\n{}\n\n\
             Chat style specifics:\n{}\n\n\
             Common topics you discuss:\n{}\n\n\
             Your typical expressions and words:\n{}\n\n\
             Example of how you talk:\n{}",
            persona.name,
            persona.system,
            persona.style.all.join(", "),
            persona.style.chat.join(", "),
            persona.topics.join(", "),
            persona.adjectives.join(", "),
            persona.format_examples(),
        )
    }

    /// `handle: text` lines, oldest first.
    pub fn chat_history(recent: &[Turn]) -> String {
        recent
            .iter()
            .map(|t| format!("{}: {}", t.speaker, t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Grounding block for the grounded strategy. Empty when there is nothing to add.
    pub fn facts(enrichment: Option<&Enrichment>) -> String {
        match enrichment {
            Some(e) if !e.is_empty() => {
                let mut out = String::from("What you know about the topic:\n");
                if !e.summary.trim().is_empty() {
                    out.push_str(e.summary.trim());
                    out.push('\n');
                }
                for snippet in &e.snippets {
                    out.push_str("- ");
                    out.push_str(snippet);
                    out.push('\n');
                }
                out
            }
            _ => String::new(),
        }
    }

    /// Per-turn user prompt.
    pub fn turn_prompt(
        persona: &Persona,
        recent: &[Turn],
        topic: &str,
        answer_previous: bool,
        ask_question: bool,
        facts: &str,
    ) -> String {
        let mut prompt = format!(
            "You are {}.\n\nYour recent chat history:\n{}\n\nTopic: {}\n{}\n",
            persona.name,
            Self::chat_history(recent),
            topic,
            if answer_previous {
                "Answer the question above."
            } else {
                "Continue the discussion."
            },
        );
        if ask_question {
            prompt.push_str("End your response with a question.\n");
        }
        if !facts.is_empty() {
            prompt.push('\n');
            prompt.push_str(facts);
        }
        prompt.push_str(
            "\nRemember to stay in character and use your typical style.\n\
             Sometimes be brief, unclear or ignore messages - just like real chat.\n\n\
             Generate a response:",
        );
        prompt
    }

    /// Retry prompt after a draft was rejected as a near-repeat.
    pub fn regeneration(base: &str, rejected: &str) -> String {
        format!(
            "{}\n\nYour previous draft was too close to what was already said:\n\"{}\"\n\
             Do not repeat it. Say something different.",
            base, rejected
        )
    }
}
