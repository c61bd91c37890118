use ag_types::{Agent, AgentPattern, HumanInvolvement, Payload};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::executor::ExecutionHandle;
use crate::runner::{run_agent, AgentContext};
use crate::{prompts, Error, Result};

fn uuid_field(config: &Value, key: &str) -> Option<Uuid> {
    config.get(key)?.as_str()?.parse().ok()
}

fn uuid_list_field(config: &Value, key: &str) -> Vec<Uuid> {
    config.get(key).and_then(Value::as_array).map(|items| items.iter().filter_map(Value::as_str).filter_map(|s| s.parse().ok()).collect()).unwrap_or_default()
}

fn load_agent(ctx: &AgentContext<'_>, id: Uuid) -> Result<Agent> {
    ctx.bus.with_store(|store| store.get_agent(id))?.ok_or(Error::AgentNotFound(id))
}

pub(crate) async fn execute_solo(ctx: &AgentContext<'_>, pattern: &AgentPattern, input_text: &str, handle: &ExecutionHandle) -> Result<()> {
    let agent_id = uuid_field(&pattern.config, "agent_id")
        .or_else(|| uuid_list_field(&pattern.config, "agents").into_iter().next())
        .ok_or_else(|| Error::InvalidConfig("solo pattern requires an agent_id".to_string()))?;
    let agent = load_agent(ctx, agent_id)?;

    run_agent(ctx, &agent, input_text, "solo", 0, 0).await?;
    handle.record_result();
    Ok(())
}

pub(crate) async fn execute_loop(ctx: &AgentContext<'_>, pattern: &AgentPattern, input_text: &str, handle: &ExecutionHandle) -> Result<()> {
    let generator_id = uuid_field(&pattern.config, "generator_id")
        .ok_or_else(|| Error::InvalidConfig("loop pattern requires generator_id".to_string()))?;
    let critic_id =
        uuid_field(&pattern.config, "critic_id").ok_or_else(|| Error::InvalidConfig("loop pattern requires critic_id".to_string()))?;
    let max_iterations = pattern.config.get("max_iterations").and_then(Value::as_u64).unwrap_or(3) as u32;

    let generator = load_agent(ctx, generator_id)?;
    let critic = load_agent(ctx, critic_id)?;

    let mut current_input = input_text.to_string();
    let mut current_output = String::new();

    for iteration in 0..max_iterations {
        handle.set_iteration(iteration);

        if pattern.human_involvement == HumanInvolvement::Checkpoints && iteration > 0 {
            let decision = handle
                .await_checkpoint(ctx, iteration, &current_output)
                .await?;
            if decision == "stop" {
                break;
            }
            if let Some(modified) = decision.strip_prefix("modify:") {
                current_input = modified.to_string();
            }
        }

        let generator_prompt = prompts::generator_prompt(
            input_text,
            &current_input,
            (iteration > 0).then_some(current_output.as_str()),
            iteration,
        );
        current_output = run_agent(ctx, &generator, &generator_prompt, "generator", iteration * 2, iteration).await?;
        handle.record_result();

        let critic_prompt = prompts::critic_prompt(input_text, &current_output, iteration);
        let critic_output = run_agent(ctx, &critic, &critic_prompt, "critic", iteration * 2 + 1, iteration).await?;
        handle.record_result();

        if prompts::critic_approves(&critic_output) {
            break;
        }
        current_input = format!("Previous attempt:\n{current_output}\n\nCritic feedback:\n{critic_output}");
    }

    Ok(())
}

pub(crate) async fn execute_panel(ctx: &AgentContext<'_>, pattern: &AgentPattern, input_text: &str, handle: &ExecutionHandle) -> Result<()> {
    let agent_ids = uuid_list_field(&pattern.config, "agents");
    if agent_ids.is_empty() {
        return Err(Error::InvalidConfig("panel pattern requires a non-empty agents list".to_string()));
    }
    let synthesizer_id = uuid_field(&pattern.config, "synthesizer_id");

    let mut panel_outputs = Vec::new();
    for (seq, agent_id) in agent_ids.iter().enumerate() {
        let Ok(agent) = load_agent(ctx, *agent_id) else { continue };
        let panel_prompt = prompts::panel_prompt(&agent, input_text);
        let output = run_agent(ctx, &agent, &panel_prompt, &format!("panelist_{seq}"), seq as u32, 0).await?;
        handle.record_result();
        panel_outputs.push((agent.name.clone(), output));
    }

    if let Some(synthesizer_id) = synthesizer_id {
        let synthesizer = load_agent(ctx, synthesizer_id)?;
        let synthesis_prompt = prompts::synthesis_prompt(input_text, &panel_outputs);
        run_agent(ctx, &synthesizer, &synthesis_prompt, "synthesizer", agent_ids.len() as u32, 0).await?;
        handle.record_result();
    }

    Ok(())
}

pub(crate) async fn execute_debate(ctx: &AgentContext<'_>, pattern: &AgentPattern, input_text: &str, handle: &ExecutionHandle) -> Result<()> {
    let debater_ids = uuid_list_field(&pattern.config, "debaters");
    if debater_ids.len() < 2 {
        return Err(Error::InvalidConfig("debate pattern requires at least 2 debaters".to_string()));
    }
    let judge_id = uuid_field(&pattern.config, "judge_id");
    let max_rounds = pattern.config.get("max_rounds").and_then(Value::as_u64).unwrap_or(3) as u32;

    let mut debaters = Vec::new();
    for id in &debater_ids {
        if let Ok(agent) = load_agent(ctx, *id) {
            debaters.push(agent);
        }
    }
    if debaters.len() < 2 {
        return Err(Error::InvalidConfig("could not resolve enough valid debaters".to_string()));
    }

    let mut debate_history: Vec<(String, u32, String)> = Vec::new();

    for round_num in 0..max_rounds {
        handle.set_iteration(round_num);

        for (position, debater) in debaters.iter().enumerate() {
            let debate_prompt = prompts::debate_prompt(input_text, &debate_history, round_num, position as u32);
            let sequence = round_num * debaters.len() as u32 + position as u32;
            let argument = run_agent(ctx, debater, &debate_prompt, &format!("debater_{position}"), sequence, round_num).await?;
            handle.record_result();
            debate_history.push((debater.name.clone(), round_num, argument));
        }
    }

    if let Some(judge_id) = judge_id {
        let judge = load_agent(ctx, judge_id)?;
        let judge_prompt = prompts::judge_prompt(input_text, &debate_history);
        run_agent(ctx, &judge, &judge_prompt, "judge", max_rounds * debaters.len() as u32, max_rounds).await?;
        handle.record_result();
    }

    Ok(())
}

/// Payload for the `run.started` event a pattern execution emits before
/// dispatching to its shape-specific body.
pub(crate) fn pattern_start_payload(pattern: &AgentPattern) -> Payload {
    Payload::Generic(json!({
        "pattern_id": pattern.id,
        "pattern_name": pattern.name,
        "pattern_type": pattern.pattern_type,
        "human_involvement": pattern.human_involvement,
    }))
}
