use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

use crate::{
    evaluation::{
        EvaluationSession, EvaluationStats, HumanGrade, ResponseLabel, SessionState,
        SessionSummary, TestCase, Winner,
    },
    model_config::ModelConfig,
    samples::SampleEmail,
    service::StartedEvaluation,
};

const PREVIEW_LINES: usize = 12;

pub struct TerminalUI;

impl TerminalUI {
    pub fn new() -> Self {
        Self
    }

    pub fn print_header(&self, config: &ModelConfig, primary_enabled: bool) {
        let mode = if primary_enabled {
            "primary".green().to_string()
        } else {
            "simulated only".yellow().to_string()
        };
        println!(
            "⚖️  {} {} · {}",
            config.provider.dimmed(),
            config.model.bold(),
            mode
        );
    }

    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈")
                .template("  {spinner:.dim} {msg}")
                .unwrap(),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }

    pub fn print_started(&self, started: &StartedEvaluation) {
        let badge = if started.is_simulated {
            "simulated".yellow().to_string()
        } else {
            "api".green().to_string()
        };
        println!(
            "  {} {} · {}",
            started.test_case.case_name.bold(),
            badge,
            started.session_id.dimmed()
        );

        for (label, response) in [
            (ResponseLabel::Response1, &started.response_1),
            (ResponseLabel::Response2, &started.response_2),
        ] {
            println!();
            println!(
                "  {} {} {}",
                label.as_str().bold(),
                response.agent_version.dimmed(),
                response.id.to_string().dimmed()
            );
            for line in preview(&response.response_text, PREVIEW_LINES) {
                println!("    {line}");
            }
        }
        println!();
        println!(
            "  rate with: ab-evals rate --session {} --user <id> --score-a <1-10> --score-b <1-10>",
            started.session_id
        );
    }

    pub fn print_comparison_recorded(&self, grade_1: &HumanGrade, grade_2: &HumanGrade) {
        let winner = Winner::decide(grade_1.score, grade_2.score);
        println!(
            "  {} recorded · {} {} vs {} · winner {}",
            "✓".green(),
            grade_1.grading_session_id.dimmed(),
            grade_1.score.to_string().bold(),
            grade_2.score.to_string().bold(),
            winner.label().as_str().bold()
        );
    }

    pub fn print_grade_recorded(&self, grade: &HumanGrade) {
        let label = grade
            .grading_criteria
            .response_name
            .map(|label| label.as_str())
            .unwrap_or("unlabelled");
        println!(
            "  {} {} scored {} · {}",
            "✓".green(),
            label.bold(),
            grade.score.to_string().bold(),
            grade.id.to_string().dimmed()
        );
    }

    pub fn print_stats(&self, grader_id: &str, stats: &EvaluationStats) {
        println!("📊 {}", grader_id.bold());
        if stats.total_comparisons == 0 {
            println!("  {}", "no complete comparisons yet".dimmed());
            return;
        }
        println!(
            "  {} comparisons · avg {:.1} · Response 1 {} · Response 2 {}",
            stats.total_comparisons.to_string().bold(),
            stats.average_score,
            stats.model_a_wins.to_string().green(),
            stats.model_b_wins.to_string().green()
        );
        println!("  preferred {}", stats.preferred_model.as_str().bold());
    }

    pub fn print_sessions(&self, sessions: &[SessionSummary]) {
        if sessions.is_empty() {
            println!("  {}", "no complete sessions".dimmed());
            return;
        }
        for session in sessions {
            println!(
                "  {} {} · {} vs {} · {} {}",
                session.graded_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                session.case_name.bold(),
                rating(session.model_a_rating),
                rating(session.model_b_rating),
                session.winner.label().as_str(),
                session.id.dimmed()
            );
        }
    }

    pub fn print_session(&self, session: &EvaluationSession) {
        let state = match session.state() {
            SessionState::Complete => "complete".green().to_string(),
            SessionState::Overgraded => "overgraded".red().to_string(),
            SessionState::PartiallyGraded => "partially graded".yellow().to_string(),
            SessionState::Created => "created".dimmed().to_string(),
        };
        println!(
            "  {} · {} · {}",
            session.test_case.case_name.bold(),
            state,
            session.session_id.dimmed()
        );

        for label in [ResponseLabel::Response1, ResponseLabel::Response2] {
            let Some(response) = session.response(label) else {
                println!();
                println!("  {} {}", label.as_str().bold(), "missing".red());
                continue;
            };
            println!();
            println!("  {} {}", label.as_str().bold(), response.agent_version.dimmed());
            for line in preview(&response.response_text, PREVIEW_LINES) {
                println!("    {line}");
            }
            for grade in session
                .grades
                .iter()
                .filter(|grade| grade.response_id == response.id)
            {
                println!(
                    "    {} {} by {}{}",
                    "→".dimmed(),
                    grade.score.to_string().bold(),
                    grade.grader_id,
                    grade
                        .feedback
                        .as_deref()
                        .map(|feedback| format!(": {feedback}"))
                        .unwrap_or_default()
                );
            }
        }
    }

    pub fn print_deactivated(&self, test_case: &TestCase) {
        println!(
            "  {} {} deactivated · {}",
            "✓".green(),
            test_case.case_name.bold(),
            test_case.id.to_string().dimmed()
        );
    }

    pub fn print_samples(&self, samples: &[SampleEmail]) {
        for sample in samples {
            println!(
                "  {} {} {}",
                sample.id.to_string().bold(),
                sample.subject,
                sample.category.dimmed()
            );
        }
    }

    pub fn print_health(&self, legacy: Option<bool>, credentials: &[(&str, bool)]) {
        let legacy_status = match legacy {
            Some(true) => "reachable".green().to_string(),
            Some(false) => "unreachable".red().to_string(),
            None => "not configured".dimmed().to_string(),
        };
        println!("  legacy backend {legacy_status}");
        for (name, present) in credentials {
            let status = if *present {
                "✓".green().to_string()
            } else {
                "✗".red().to_string()
            };
            println!("  {status} {name}");
        }
    }
}

fn rating(score: Option<i32>) -> String {
    score
        .map(|score| score.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn preview(text: &str, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = text.lines().take(max_lines).map(str::to_string).collect();
    if text.lines().count() > max_lines {
        lines.push("…".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates() {
        let text = "a\nb\nc\nd";
        assert_eq!(preview(text, 2), vec!["a", "b", "…"]);
        assert_eq!(preview(text, 4), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_rating() {
        assert_eq!(rating(Some(7)), "7");
        assert_eq!(rating(None), "-");
    }
}
