//! Initial archive
//!
//! Hand-written baselines scored before the first generation. They double as
//! worked examples of the agent-program language for the meta-agent.

use sdk::types::Candidate;

const CHAIN_OF_THOUGHT: &str = r#"[chain_of_thought]
returns = "out"

[[chain_of_thought.agents]]
id = "cot"
name = "Chain-of-Thought Agent"
fields = ["thinking", "answer"]

[[chain_of_thought.steps]]
op = "call"
agent = "cot"
inputs = ["task"]
instruction = "Please think step by step and then solve the task."
bind = "out"
"#;

const SELF_CONSISTENCY: &str = r#"[self_consistency]
returns = "final"

[[self_consistency.agents]]
id = "cot"
name = "Chain-of-Thought Agent"
fields = ["thinking", "answer"]
temperature = 0.8

[[self_consistency.steps]]
op = "call"
agent = "cot"
inputs = ["task"]
instruction = "Please think step by step and then solve the task."
repeat = 5
bind = "samples"

[[self_consistency.steps]]
op = "vote"
from = "samples.answer"
bind = "final"
"#;

const SELF_REFINE: &str = r#"[self_refine]
returns = "attempt"

[[self_refine.agents]]
id = "cot"
name = "Chain-of-Thought Agent"
fields = ["thinking", "answer"]

[[self_refine.agents]]
id = "critic"
name = "Critic Agent"
fields = ["feedback", "correct"]

[[self_refine.steps]]
op = "call"
agent = "cot"
inputs = ["task"]
instruction = "Please think step by step and then solve the task."
bind = "attempt"

[[self_refine.steps]]
op = "loop"
times = 5
until = { ref = "review.correct:last", equals = "True" }

[[self_refine.steps.steps]]
op = "call"
agent = "critic"
inputs = ["task", "attempt"]
instruction = "Please review the answer above and criticize where it might be wrong. If you are absolutely sure it is correct, output 'True' in 'correct'."
bind = "review"

[[self_refine.steps.steps]]
op = "call"
agent = "cot"
inputs = ["task", "attempt", "review"]
instruction = "Given previous attempts and feedback, carefully consider where you could go wrong in your latest attempt. Using insights from previous attempts, try to solve the task better."
bind = "attempt"
"#;

const LLM_DEBATE: &str = r#"[llm_debate]
returns = "final"

[[llm_debate.agents]]
id = "doctor"
name = "Debate Agent"
fields = ["thinking", "answer"]
role = "Medical Doctor"
temperature = 0.8

[[llm_debate.agents]]
id = "researcher"
name = "Debate Agent"
fields = ["thinking", "answer"]
role = "Medical Researcher"
temperature = 0.8

[[llm_debate.agents]]
id = "pharmacist"
name = "Debate Agent"
fields = ["thinking", "answer"]
role = "Clinical Pharmacist"
temperature = 0.8

[[llm_debate.agents]]
id = "judge"
name = "Final Decision Agent"
fields = ["thinking", "answer"]
temperature = 0.1

[[llm_debate.steps]]
op = "call"
agent = "doctor"
inputs = ["task"]
instruction = "Please think step by step and then solve the task."
bind = "debate"
append = true
iteration = 0

[[llm_debate.steps]]
op = "call"
agent = "researcher"
inputs = ["task"]
instruction = "Please think step by step and then solve the task."
bind = "debate"
append = true
iteration = 0

[[llm_debate.steps]]
op = "call"
agent = "pharmacist"
inputs = ["task"]
instruction = "Please think step by step and then solve the task."
bind = "debate"
append = true
iteration = 0

[[llm_debate.steps]]
op = "call"
agent = "doctor"
inputs = ["task", "debate"]
instruction = "Given solutions to the problem from other agents, consider their opinions as additional advice. Please think carefully and provide an updated answer."
bind = "debate"
append = true
iteration = 1

[[llm_debate.steps]]
op = "call"
agent = "researcher"
inputs = ["task", "debate"]
instruction = "Given solutions to the problem from other agents, consider their opinions as additional advice. Please think carefully and provide an updated answer."
bind = "debate"
append = true
iteration = 1

[[llm_debate.steps]]
op = "call"
agent = "pharmacist"
inputs = ["task", "debate"]
instruction = "Given solutions to the problem from other agents, consider their opinions as additional advice. Please think carefully and provide an updated answer."
bind = "debate"
append = true
iteration = 1

[[llm_debate.steps]]
op = "call"
agent = "judge"
inputs = ["task", "debate"]
instruction = "Given all the above thinking and answers, reason over them carefully and provide a final answer."
bind = "final"
"#;

const STEP_BACK: &str = r#"[step_back_abstraction]
returns = "out"

[[step_back_abstraction.agents]]
id = "principle"
name = "Principle Agent"
fields = ["thinking", "principle"]

[[step_back_abstraction.agents]]
id = "cot"
name = "Chain-of-Thought Agent"
fields = ["thinking", "answer"]

[[step_back_abstraction.steps]]
op = "call"
agent = "principle"
inputs = ["task"]
instruction = "What are the medical principles and concepts involved in solving this task? First think step by step. Then list all involved principles and explain them."
bind = "principles"

[[step_back_abstraction.steps]]
op = "call"
agent = "cot"
inputs = ["task", "principles"]
instruction = "Given the question and the involved principles behind the question, think step by step and then solve the task."
bind = "out"
"#;

/// Unscored seed candidates, in archive order
pub fn initial_archive() -> Vec<Candidate> {
    vec![
        Candidate::new(
            "Chain-of-Thought",
            "By encouraging the LLM to think step by step rather than directly outputting an answer, chain-of-thought reasoning enables complex problem-solving through intermediate steps. This practice improves the model's ability to handle tasks that require deeper reasoning and provides insight into its decision-making process.",
            CHAIN_OF_THOUGHT,
        ),
        Candidate::new(
            "Self-Consistency with Chain-of-Thought",
            "While an LLM can arrive at the correct answer, its reasoning may vary. By repeatedly asking the same question with high temperature settings, we can generate different reasoning paths. We then combine multiple answers from these Chain-of-Thought agents to produce a more accurate final answer through majority voting.",
            SELF_CONSISTENCY,
        ),
        Candidate::new(
            "Self-Refine (Reflexion)",
            "To enhance its performance, an LLM can iteratively improve its answer based on feedback. By reflecting on its previous attempts and incorporating a critic's feedback, the model can refine its reasoning and provide a more accurate solution.",
            SELF_REFINE,
        ),
        Candidate::new(
            "LLM Debate",
            "By letting different LLMs debate with each other, we can leverage their diverse perspectives to find better solutions for tasks.",
            LLM_DEBATE,
        ),
        Candidate::new(
            "Step-back Abstraction",
            "Let the LLM first think about the principles involved in solving this task, which could be helpful. By understanding the underlying principles, the model can better reason through the problem and provide a more accurate solution.",
            STEP_BACK,
        ),
    ]
}
