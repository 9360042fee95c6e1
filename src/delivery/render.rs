//! Text rendering for outbound messages.

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use super::{AnswerButton, OutboundMessage};
use crate::{
    content::{Question, QuizBatch},
    dao::models::{StandingEntity, WindowKind},
};

const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];
const MAX_NAME_CHARS: usize = 15;
const DAY_FORMAT: &[FormatItem<'static>] = format_description!("[month repr:long] [day], [year]");

/// Payload sent back when `option` of `question` is picked.
pub fn answer_payload(question: &Question, option: usize) -> String {
    format!("answer_{}_{}", question.id, option)
}

/// Letter label of an option: A, B, C, ...
pub fn option_label(option: usize) -> char {
    char::from(b'A' + (option % 26) as u8)
}

/// Question message with one button per option.
pub fn question_message(batch: &QuizBatch, question: &Question) -> OutboundMessage {
    let number = batch
        .questions
        .iter()
        .position(|candidate| candidate.id == question.id)
        .map_or(1, |index| index + 1);

    let mut text = format!(
        "📚 {}\n❓ Question {}/{}\n\n{}\n",
        batch.title,
        number,
        batch.questions.len(),
        question.prompt
    );
    for (index, option) in question.options.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", option_label(index), option));
    }

    let buttons = (0..question.options.len())
        .map(|index| AnswerButton {
            label: option_label(index).to_string(),
            payload: answer_payload(question, index),
        })
        .collect();

    OutboundMessage { text, buttons }
}

/// Ranked list, one line per standing.
pub fn format_standings(standings: &[StandingEntity]) -> String {
    if standings.is_empty() {
        return "No participants yet".to_owned();
    }

    standings
        .iter()
        .enumerate()
        .map(|(rank, standing)| {
            let place = MEDALS
                .get(rank)
                .map_or_else(|| format!("{}.", rank + 1), |medal| (*medal).to_owned());
            format!(
                "{place} {}: {} pts ({}Q, {:.0}%)",
                short_name(&standing.display_name),
                standing.score,
                standing.answered,
                accuracy(standing.correct, standing.answered)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ceremony announcement for the period starting at `period_start`.
pub fn ceremony_message(
    window: WindowKind,
    period_start: OffsetDateTime,
    standings: &[StandingEntity],
) -> OutboundMessage {
    let heading = match window {
        WindowKind::Daily => "DAILY",
        WindowKind::Weekly => "WEEKLY",
        WindowKind::Monthly => "MONTHLY",
    };
    let since = period_start
        .format(DAY_FORMAT)
        .unwrap_or_else(|_| period_start.date().to_string());

    OutboundMessage::text(format!(
        "🎉 {heading} LEADERBOARD RESULTS 🎉\n📊 Period starting {since}\n\n🏆 Top performers:\n{}\n\nScores for this period are now reset. Good luck next round!",
        format_standings(standings)
    ))
}

/// Percentage of correct answers, 0 when nothing was answered.
pub fn accuracy(correct: u32, answered: u32) -> f64 {
    if answered == 0 {
        0.0
    } else {
        f64::from(correct) * 100.0 / f64::from(answered)
    }
}

fn short_name(name: &str) -> String {
    if name.chars().count() > MAX_NAME_CHARS {
        let prefix: String = name.chars().take(MAX_NAME_CHARS).collect();
        format!("{prefix}...")
    } else {
        name.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tests::sample_catalog;
    use time::macros::datetime;

    fn standing(user_id: i64, name: &str, score: u32, answered: u32, correct: u32) -> StandingEntity {
        StandingEntity {
            user_id,
            display_name: name.into(),
            score,
            answered,
            correct,
            reached_at: datetime!(2025-07-10 10:00 UTC),
        }
    }

    #[test]
    fn question_has_one_button_per_option() {
        let catalog = sample_catalog(1, 2);
        let batch = catalog.batch("B1").unwrap();
        let question = &batch.questions[1];

        let message = question_message(batch, question);

        assert!(message.text.contains("Question 2/2"));
        assert!(message.text.contains("D. d"));
        let payloads: Vec<_> = message.buttons.iter().map(|b| b.payload.as_str()).collect();
        assert_eq!(payloads, vec!["answer_2_0", "answer_2_1", "answer_2_2", "answer_2_3"]);
        assert_eq!(message.buttons[0].label, "A");
    }

    #[test]
    fn standings_use_medals_then_numbers() {
        let rows = vec![
            standing(1, "Ada", 9, 3, 3),
            standing(2, "A very long display name", 6, 4, 2),
            standing(3, "Cy", 3, 1, 1),
            standing(4, "Di", 1, 3, 1),
        ];

        let text = format_standings(&rows);
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "🥇 Ada: 9 pts (3Q, 100%)");
        assert_eq!(lines[1], "🥈 A very long dis...: 6 pts (4Q, 50%)");
        assert!(lines[2].starts_with("🥉 Cy"));
        assert_eq!(lines[3], "4. Di: 1 pts (3Q, 33%)");
    }

    #[test]
    fn ceremony_names_window_and_period() {
        let message = ceremony_message(
            WindowKind::Weekly,
            datetime!(2025-07-07 00:00 UTC),
            &[standing(1, "Ada", 9, 3, 3)],
        );

        assert!(message.text.contains("WEEKLY"));
        assert!(message.text.contains("July 07, 2025"));
        assert!(message.buttons.is_empty());
    }

    #[test]
    fn accuracy_handles_no_answers() {
        assert_eq!(accuracy(0, 0), 0.0);
        assert_eq!(accuracy(1, 4), 25.0);
    }
}
