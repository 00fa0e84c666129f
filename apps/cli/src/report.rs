//! Human-readable run summary.

use colored::Colorize;
use parley_society::SocietyOutcome;

/// Print the answer in blue, then a short usage summary.
pub fn print_outcome(outcome: &SocietyOutcome) {
    println!("{}", format!("Answer: {}", outcome.answer).blue());

    let failed_tools: usize = outcome
        .history
        .iter()
        .map(|turn| turn.tool_invocations.iter().filter(|t| !t.succeeded).count())
        .sum();
    println!(
        "{}",
        format!(
            "Rounds: {}  Tool calls: {} ({} failed)  Completed: {}",
            outcome.history.len(),
            outcome.history.iter().map(|t| t.tool_invocations.len()).sum::<usize>(),
            failed_tools,
            if outcome.completed { "yes" } else { "no" }
        )
        .dimmed()
    );
    for (role, usage) in outcome.usage.roles() {
        println!(
            "{}",
            format!(
                "  {}: {} tokens ({} prompt, {} completion)",
                role, usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            )
            .dimmed()
        );
    }
}
