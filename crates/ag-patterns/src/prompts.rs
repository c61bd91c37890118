//! Prompt templates for each pattern shape. Kept separate from the
//! execution state machine so the wording can be tuned without touching
//! control flow.

use ag_types::Agent;

pub fn full_prompt(agent: &Agent, input_text: &str) -> String {
    if agent.role_prompt.trim().is_empty() {
        return input_text.to_string();
    }
    format!("<role>\n{}\n</role>\n\n{input_text}", agent.role_prompt)
}

pub fn generator_prompt(original_input: &str, current_input: &str, previous_output: Option<&str>, iteration: u32) -> String {
    if iteration == 0 {
        return current_input.to_string();
    }
    let previous_output = previous_output.unwrap_or_default();
    format!(
        "Original request:\n{original_input}\n\n\
         Your previous attempt:\n{previous_output}\n\n\
         Feedback to address:\n{current_input}\n\n\
         Revise your answer to incorporate the feedback above."
    )
}

pub fn critic_prompt(original_input: &str, generated_output: &str, iteration: u32) -> String {
    format!(
        "Original request:\n{original_input}\n\n\
         Output to review (iteration {}):\n{generated_output}\n\n\
         Review this output and give specific, actionable feedback. \
         If it is satisfactory as-is, reply with \"APPROVED\" at the start of your response; \
         otherwise explain exactly what needs to change.",
        iteration + 1
    )
}

pub fn panel_prompt(agent: &Agent, input_text: &str) -> String {
    format!(
        "As {}, give your expert perspective on the following:\n\n{input_text}\n\n\
         Stay within your area of expertise and be specific and actionable.",
        agent.name
    )
}

pub fn synthesis_prompt(original_input: &str, panel_outputs: &[(String, String)]) -> String {
    let perspectives: String = panel_outputs
        .iter()
        .map(|(name, output)| format!("**{name}**:\n{output}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Original question:\n{original_input}\n\n\
         Perspectives gathered from the panel:\n{perspectives}\n\n\
         Synthesize these into one coherent answer: note where they agree, surface the \
         sharpest insights, and resolve any conflicts between them."
    )
}

pub fn debate_prompt(original_topic: &str, debate_history: &[(String, u32, String)], round_num: u32, position: u32) -> String {
    if debate_history.is_empty() {
        return format!(
            "Debate topic: {original_topic}\n\n\
             You are arguing position #{}. Present your opening argument.",
            position + 1
        );
    }
    let history = format_debate_history(debate_history);
    format!(
        "Topic: {original_topic}\n\n\
         Debate so far:\n{history}\n\n\
         This is round {}. Respond to the arguments above and strengthen your position.",
        round_num + 1
    )
}

pub fn judge_prompt(original_topic: &str, debate_history: &[(String, u32, String)]) -> String {
    let history = format_debate_history(debate_history);
    format!(
        "Topic: {original_topic}\n\n\
         Full debate:\n{history}\n\n\
         Render your verdict. Weigh the strength of each argument, the evidence cited, and \
         the logical reasoning. Declare a winner or a draw, and explain why."
    )
}

fn format_debate_history(debate_history: &[(String, u32, String)]) -> String {
    debate_history
        .iter()
        .map(|(debater, round, argument)| format!("**{debater}** (round {}):\n{argument}", round + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Lowercased-contains check the loop pattern uses to decide the critic
/// approved the generator's latest output.
pub fn critic_approves(critic_output: &str) -> bool {
    let lower = critic_output.to_lowercase();
    ["approved", "looks good", "acceptable"].iter().any(|needle| lower.contains(needle))
}
