// Prompt templates for the role-playing session.
//
// The user role plans and instructs one step at a time; the assistant role
// executes with tools. Completion is signalled only through `complete_task`.

use parley_abstraction::ToolSpec;
use serde_json::json;

/// Reserved tool through which the responder ends the session.
pub const COMPLETE_TASK_TOOL: &str = "complete_task";

/// First message the initiator receives.
pub const KICKOFF_MESSAGE: &str = "Now please give me instructions to solve the overall task step \
by step. If the task requires some specific knowledge, please instruct me to use tools to complete \
the task.";

/// Schema of the reserved completion tool.
pub fn complete_task_spec() -> ToolSpec {
    ToolSpec {
        name: COMPLETE_TASK_TOOL.to_string(),
        description: "Finish the session and submit the final answer to the overall task. Call \
                      this only once the answer has been checked."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The final answer to the overall task, stated directly"
                }
            },
            "required": ["answer"]
        }),
    }
}

/// System prompt of the initiator.
pub fn user_system_prompt(user_role: &str, assistant_role: &str, task: &str) -> String {
    format!(
        "===== RULES OF {user_upper} =====\n\
Never forget you are the {user} and I am the {assistant}. Never flip roles! You will always \
instruct me. We share the goal of completing a task together, and I will help you complete it.\n\
You instruct me based on my abilities and your needs, one instruction at a time, in the format \
`Instruction: [YOUR INSTRUCTION]`, optionally followed by `Input: [YOUR INPUT]`. I write a \
response that solves each instruction. Instruct me; do not ask me questions.\n\
The task may be complicated. Do not try to solve it in one step; break it down and guide me.\n\
<tips>\n\
- I can use tools such as search, web browsing, document reading, spreadsheets, code execution \
and file writing. Think about how a person would solve the task and instruct me accordingly.\n\
- The answer exists. If one approach does not find it, re-plan and try another.\n\
- Remind me to verify the final answer, ideally with a different tool than the one that found it.\n\
- If I have written code, remind me to run it and report the result.\n\
- Prefer code for data processing such as spreadsheet work.\n\
</tips>\n\
Here is the overall task: <task>{task}</task>. Never forget our task!\n\
When the task is solved and the answer checked, instruct me to call the `{complete}` tool with the \
final answer. Only I can end the session that way.\n\
Start instructing me now. Do not add anything other than your instruction.",
        user_upper = user_role.to_uppercase(),
        user = user_role,
        assistant = assistant_role,
        task = task,
        complete = COMPLETE_TASK_TOOL,
    )
}

/// System prompt of the responder.
pub fn assistant_system_prompt(user_role: &str, assistant_role: &str, task: &str) -> String {
    format!(
        "===== RULES OF {assistant_upper} =====\n\
Never forget you are the {assistant} and I am the {user}. Never flip roles! Never instruct me! \
We share the goal of completing a task together, and you must help me complete it.\n\
I give you one instruction at a time. Write a response that solves it, using your tools whenever \
they help. Do not say you will do something: call the tool, then answer from its result and name \
the tool you used. If a tool reports an error, read it and try another approach.\n\
Start each response with `Solution: [YOUR SOLUTION]` and make the solution concrete, with \
implementations and examples where useful. End it with `Next request.`\n\
When the overall task is solved and checked, or when I instruct you to finish, call the \
`{complete}` tool with the final answer. Its `answer` must answer the task directly and \
concisely.\n\
Here is the overall task: <task>{task}</task>. Never forget our task!",
        assistant_upper = assistant_role.to_uppercase(),
        assistant = assistant_role,
        user = user_role,
        task = task,
        complete = COMPLETE_TASK_TOOL,
    )
}

/// Sentence appended to every system prompt when an output language is set.
pub fn output_language_suffix(language: &str) -> String {
    format!("\nRegardless of the input language, you must output text in {}.", language)
}

/// Prompt asking the initiator's model to sharpen the task.
pub fn task_specify_prompt(task: &str, user_role: &str, assistant_role: &str, word_limit: usize) -> String {
    format!(
        "Here is a task that the {assistant} will help the {user} to complete: {task}.\n\
Please make it more specific. Be creative and imaginative.\n\
Please reply with the specified task in {word_limit} words or less. Do not add anything else.",
        assistant = assistant_role,
        user = user_role,
        task = task,
        word_limit = word_limit,
    )
}

/// Initiator instruction as delivered to the responder.
pub fn wrap_instruction(instruction: &str, task: &str) -> String {
    format!(
        "{instruction}\n\n\
Here is auxiliary information about the overall task, which may help you understand the intent \
of the current instruction:\n\
<auxiliary_information>\n{task}\n</auxiliary_information>\n\
If there are available tools and you want to call them, never say 'I will ...'; call the tool \
first, reply based on its result, and tell me which tool you called.",
    )
}

/// Responder reply as delivered back to the initiator.
pub fn wrap_response(response: &str, task: &str) -> String {
    format!(
        "{response}\n\n\
Provide me with the next instruction and input (if needed) based on my response and our current \
task: <task>{task}</task>\n\
Before asking for the final answer, check whether I have verified it with a different tool where \
possible, and remind me if not. If I have written code, remind me to run it. Once the task is \
solved, instruct me to call `{complete}` with the final answer.",
        complete = COMPLETE_TASK_TOOL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_embed_task_and_roles() {
        let user = user_system_prompt("user", "assistant", "Count the stars");
        assert!(user.starts_with("===== RULES OF USER ====="));
        assert!(user.contains("<task>Count the stars</task>"));
        assert!(user.contains(COMPLETE_TASK_TOOL));

        let assistant = assistant_system_prompt("user", "assistant", "Count the stars");
        assert!(assistant.contains("Never forget you are the assistant and I am the user."));
    }

    #[test]
    fn test_response_reminder() {
        let wrapped = wrap_response("Solution: 5300 stars", "Count the stars");
        assert!(wrapped.starts_with("Solution: 5300 stars\n\n"));
        assert!(wrapped.contains(
            "Provide me with the next instruction and input (if needed) based on my response and our current task: <task>Count the stars</task>"
        ));
    }

    #[test]
    fn test_completion_spec_requires_answer() {
        let spec = complete_task_spec();
        assert_eq!(spec.name, "complete_task");
        assert_eq!(spec.parameters["required"][0], "answer");
    }

    #[test]
    fn test_language_suffix() {
        assert_eq!(
            output_language_suffix("Chinese"),
            "\nRegardless of the input language, you must output text in Chinese."
        );
    }
}
