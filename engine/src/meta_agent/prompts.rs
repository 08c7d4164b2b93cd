//! Fixed prompts for the meta-agent conversation

use sdk::types::Candidate;
use serde::Serialize;

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Make sure to return in a WELL-FORMED JSON object.";

const BASE_PROMPT: &str = r##"# Overview
You are an expert machine learning researcher testing various agentic systems. Your objective is to design building blocks such as prompts and control flows within these systems to solve complex tasks. Your aim is to design an optimal agent performing well on multiple-choice questions that require expert-level domain knowledge and careful reasoning.

## An example question:

Answer the following multiple choice question.

A 23-year-old pregnant woman at 22 weeks gestation presents with burning upon urination. She states it started 1 day ago and has been worsening despite drinking more water and taking cranberry extract. She otherwise feels well and is followed by a doctor for her pregnancy. Her temperature is 97.7°F (36.5°C). Physical exam is notable for an absence of costovertebral angle tenderness and a gravid uterus. Which of the following is the best treatment for this patient?

(A) Ampicillin
(B) Ceftriaxone
(C) Doxycycline
(D) Nitrofurantoin

# The agent-program language

Agents are written in TOML. A program is exactly ONE top-level table, the entry point. Its name is the name of your agent function. Nothing else may appear at the top level.

```toml
[my_agent]
description = "optional free text"
returns = "final"          # reference whose messages are returned as the answer

[[my_agent.agents]]        # declare every agent you call
id = "cot"                 # identifier used by call steps
name = "Chain-of-Thought Agent"
fields = ["thinking", "answer"]   # output fields, in order
role = "helpful assistant" # optional, used as "You are a {role}."
temperature = 0.8          # optional, default 0.5

[[my_agent.steps]]         # steps run in order
op = "call"
agent = "cot"
inputs = ["task"]          # references to earlier results
instruction = "Please think step by step and then solve the task."
bind = "out"               # name the result can be referenced by
```

Every agent call returns one message per declared field. Each message records its field name, the agent that wrote it and an iteration index, and later agents see all of this in their prompt. The predefined binding `task` holds the question.

## Step kinds

- `op = "call"`: query an agent. Keys: `agent`, `inputs`, `instruction`, `bind`. Optional `repeat = N` runs N independent samples concurrently with iteration indices 0..N-1. Optional `append = true` adds the new messages to the binding instead of replacing it. Optional `iteration = K` sets the iteration index explicitly.
- `op = "vote"`: majority vote over message contents. Keys: `from` (a reference), `bind`. The result is a single message.
- `op = "loop"`: run nested `steps` up to `times` times. Calls inside a loop use the loop counter as iteration index. Optional `until = { ref = "review.correct:last", equals = "True" }` stops after the first pass where that message matches (case-insensitive).
- `op = "constant"`: bind a fixed message. Keys: `bind`, `field`, `value`.

## References

- `name`: every message bound to `name`
- `name.field`: only the messages of that field
- a `:last` or `:first` suffix keeps a single message, e.g. `attempts.answer:last`

## Return value

`returns` must reference messages whose answer is a single letter. Either return exactly one message holding the letter (for example `final` from a vote or `out.answer:last`), or return the full output of an agent whose fields are `["thinking", "answer"]`, in which case the second message is read as the answer.

## Limits

At most [MAX_AGENTS] agents, [MAX_STEPS] steps including nested ones, `repeat` up to [MAX_REPEAT], `times` up to [MAX_LOOP] and [MAX_CALLS] agent calls per question.

# Discovered architecture archive
Here is the archive of the discovered architectures:

[ARCHIVE]

The fitness value is the median and 95% Bootstrap Confidence Interval of the correct rate on a validation question set. Your GOAL is to maximize the "fitness".

# Output Instruction and Example:
The first key should be ("thought"), and it should capture your thought process for designing the next function. In the "thought" section, first reason about what the next interesting agent to try should be, then describe your reasoning and the overall concept behind the agent design, and finally detail the implementation steps.
The second key ("name") corresponds to the name of your next agent architecture.
Finally, the last key ("code") corresponds to the exact agent program in TOML that you want to try, as a single JSON string. You must write COMPLETE programs that pass the validation described above.

Here is an example of the output format for the next agent architecture:

[EXAMPLE]

You must use the exact step kinds and keys described above. Do NOT invent keys: unknown keys make the program fail to load.

## WRONG Implementation examples:
1. Two top-level tables. Only the entry point may appear at the top level; put agents and steps under it.
2. Referencing a binding before a step has bound it, or referencing a field an agent does not declare.
3. Returning only a "thinking" message. The returned message must be the answer letter.
4. Giving the final answer as text such as "The answer is B". Answers must be a single letter.

# Your task
You are deeply familiar with prompting techniques and the agent works from the literature. Your goal is to maximize the specified performance metrics by proposing interestingly new agents.
Observe the discovered agents carefully and think about what insights, lessons, or stepping stones can be learned from them.
Be creative when thinking about the next interesting agent to try. You are encouraged to draw inspiration from related agent papers or academic papers from other research areas.
Use the knowledge from the archive and inspiration from academic literature to propose the next interesting agentic system design.
THINK OUTSIDE THE BOX.
"##;

const REFLEXION_PROMPT_1: &str = r###"[EXAMPLE]Carefully review the proposed new architecture and reflect on the following points:

1. **Interestingness**: Is the proposal interesting or innovative compared to the agents already in the archive? Compare the proposal with the archived programs CAREFULLY, including how their steps actually differ. If it is not interesting, propose a different architecture that addresses this.

2. **Implementation Mistakes**: Check the program for mistakes. Walk through every step, confirm each reference is bound before use and each field is declared, and check the "## WRONG Implementation examples" section of the prompt.

3. **Improvement**: Suggest concrete improvements to the program that could raise its accuracy without changing the overall design. Remove redundant steps and avoid copying a previous agent too closely.

Then revise the program, or implement the new architecture, based on this reflection.

Your response should be organized as follows:

"reflection": Your thoughts on the interestingness of the architecture, any mistakes in the program, and the improvements you suggest.

"thought": Your revised proposal, or a new architecture if necessary, using the same format as the example response.

"name": A name for the revised or new architecture. (Don't put words like "new" or "improved" in the name.)

"code": The corrected or improved program. Make sure the fixes and improvements are actually in this program.
"###;

const REFLEXION_PROMPT_2: &str = r###"Using the tips in the "## WRONG Implementation examples" section, revise the program further.
Your response should be organized as follows:
Put your new reflection thinking in "reflection". Repeat the previous "thought" and "name", and update the corrected version of the program in "code".
"###;

/// Archive entry as shown to the meta-agent
#[derive(Serialize)]
struct ArchiveView<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<&'a str>,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fitness: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation: Option<String>,
}

impl<'a> From<&'a Candidate> for ArchiveView<'a> {
    fn from(candidate: &'a Candidate) -> Self {
        Self {
            name: &candidate.name,
            author: candidate.author.as_deref(),
            thought: candidate.thought.as_deref(),
            code: &candidate.code,
            fitness: candidate.fitness.as_deref(),
            generation: candidate.generation.map(|g| g.to_string()),
        }
    }
}

fn render_entry(candidate: &Candidate) -> String {
    serde_json::to_string_pretty(&ArchiveView::from(candidate)).unwrap_or_default()
}

/// Sandbox limits quoted in the language guide
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub max_agents: usize,
    pub max_steps: usize,
    pub max_repeat: u32,
    pub max_loop_iterations: u32,
    pub max_oracle_calls: u32,
}

impl From<&crate::config::SandboxConfig> for PromptLimits {
    fn from(config: &crate::config::SandboxConfig) -> Self {
        Self {
            max_agents: config.max_agents,
            max_steps: config.max_steps,
            max_repeat: config.max_repeat,
            max_loop_iterations: config.max_loop_iterations,
            max_oracle_calls: config.max_oracle_calls,
        }
    }
}

/// System prompt and base prompt for a fresh proposal
pub fn base_prompt(archive: &[Candidate], example: &Candidate, limits: PromptLimits) -> (String, String) {
    let archive_text = format!(
        "[{}]",
        archive.iter().map(render_entry).collect::<Vec<_>>().join(",\n")
    );

    let example_text = serde_json::to_string_pretty(&serde_json::json!({
        "thought": example.thought.as_deref().unwrap_or_default(),
        "name": example.name,
        "code": example.code,
    }))
    .unwrap_or_default();

    let prompt = BASE_PROMPT
        .replace("[MAX_AGENTS]", &limits.max_agents.to_string())
        .replace("[MAX_STEPS]", &limits.max_steps.to_string())
        .replace("[MAX_REPEAT]", &limits.max_repeat.to_string())
        .replace("[MAX_LOOP]", &limits.max_loop_iterations.to_string())
        .replace("[MAX_CALLS]", &limits.max_oracle_calls.to_string())
        .replace("[EXAMPLE]", &example_text)
        // Archive text is model-authored, so it goes in last
        .replace("[ARCHIVE]", &archive_text);

    (SYSTEM_PROMPT.to_string(), prompt)
}

/// The two fixed critique prompts; the first quotes the last generated agent
pub fn reflexion_prompts(last_generated: Option<&Candidate>) -> (String, String) {
    let previous = match last_generated {
        Some(candidate) => format!(
            "Here is the previous agent you tried:\n{}\n\n",
            render_entry(candidate)
        ),
        None => String::new(),
    };

    (
        REFLEXION_PROMPT_1.replace("[EXAMPLE]", &previous),
        REFLEXION_PROMPT_2.to_string(),
    )
}

/// Observation fed back after a failed evaluation
pub fn debug_prompt(observation: &str) -> String {
    format!(
        "Error during evaluation:\n{}\nCarefully consider where you went wrong in your latest implementation. Using insights from previous attempts, try to debug the current code to implement the same thought. Repeat your previous thought in 'thought', and put your thinking for debugging in 'debug_thought'",
        observation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::Generation;

    fn limits() -> PromptLimits {
        PromptLimits::from(&crate::config::SandboxConfig::default())
    }

    #[test]
    fn test_base_prompt_renders_archive_entries() {
        let mut entry = Candidate::new("Chain-of-Thought", "think first", "[cot]\nsteps = []");
        entry.generation = Some(Generation::Initial);
        entry.fitness = Some("95% Bootstrap Confidence Interval: (1.0%, 2.0%), Median: 1.5%".into());
        entry.accuracy = Some(0.015);

        let (system, prompt) = base_prompt(&[entry.clone()], &entry, limits());
        assert_eq!(system, SYSTEM_PROMPT);
        assert!(prompt.contains("\"name\": \"Chain-of-Thought\""));
        assert!(prompt.contains("\"generation\": \"initial\""));
        assert!(prompt.contains("Median: 1.5%"));
        assert!(!prompt.contains("\"accuracy\""));
        assert!(!prompt.contains("[ARCHIVE]"));
        assert!(!prompt.contains("[MAX_STEPS]"));
    }

    #[test]
    fn test_placeholders_inside_archive_stay_literal() {
        let mut entry = Candidate::new("Echo", "mention [EXAMPLE] and [MAX_STEPS]", "[echo]\nsteps = []");
        entry.generation = Some(Generation::Number(1));
        let example = Candidate::new("Example Agent", "sample thought", "[sample]\nsteps = []");

        let (_, prompt) = base_prompt(&[entry], &example, limits());
        assert!(prompt.contains("mention [EXAMPLE] and [MAX_STEPS]"));
        assert_eq!(prompt.matches("\"name\": \"Example Agent\"").count(), 1);
    }

    #[test]
    fn test_reflexion_prompt_mentions_previous_agent() {
        let (first, second) = reflexion_prompts(None);
        assert!(first.starts_with("Carefully review"));
        assert!(second.contains("WRONG Implementation examples"));

        let previous = Candidate::new("Debate", "argue", "[debate]\nsteps = []");
        let (first, _) = reflexion_prompts(Some(&previous));
        assert!(first.starts_with("Here is the previous agent you tried:"));
        assert!(first.contains("\"name\": \"Debate\""));
    }

    #[test]
    fn test_debug_prompt_wraps_observation() {
        let prompt = debug_prompt("All 0 accuracy");
        assert!(prompt.starts_with("Error during evaluation:\nAll 0 accuracy\n"));
        assert!(prompt.ends_with("put your thinking for debugging in 'debug_thought'"));
    }
}
