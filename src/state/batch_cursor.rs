//! Pure advance logic for the scheduler's persisted position.
//!
//! A stored cursor points at the batch last delivered from (`position`) and the index of the
//! next question inside it (`next_question`). Moving past the last batch reshuffles the
//! order and bumps `cycle`.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    content::{Question, QuizCatalog},
    dao::models::{BatchCursorEntity, BatchId},
};

/// Result of one scheduler step.
#[derive(Debug, Clone)]
pub struct Advance<'a> {
    /// Question to deliver now.
    pub question: &'a Question,
    /// Cursor to persist before delivering.
    pub cursor: BatchCursorEntity,
    /// Whether a new order was generated during this step.
    pub reshuffled: bool,
}

/// Compute the question to deliver and the next cursor.
///
/// `stored` is the cursor as loaded from storage; `None` on first run. A stored order that no
/// longer names exactly the catalog's batches is discarded.
pub fn advance<'a, R: Rng + ?Sized>(
    catalog: &'a QuizCatalog,
    stored: Option<&BatchCursorEntity>,
    rng: &mut R,
    now: OffsetDateTime,
) -> Advance<'a> {
    let version = stored.map_or(1, |cursor| cursor.version + 1);

    let (mut order, mut position, mut next_question, mut cycle, mut reshuffled) = match stored {
        Some(cursor) if matches_catalog(cursor, catalog) => (
            cursor.shuffled_order.clone(),
            cursor.position,
            cursor.next_question,
            cursor.cycle,
            false,
        ),
        Some(cursor) => {
            warn!(
                stored = cursor.shuffled_order.len(),
                loaded = catalog.batch_count(),
                "stored batch order does not match the quiz bank; regenerating"
            );
            (shuffled(catalog, None, rng), 0, 0, cursor.cycle, true)
        }
        None => (shuffled(catalog, None, rng), 0, 0, 0, true),
    };

    // Terminates: every order is built from catalog ids and no batch is empty.
    let question = loop {
        let current = catalog
            .batch(&order[position])
            .and_then(|batch| batch.questions.get(next_question));
        if let Some(question) = current {
            break question;
        }
        next_question = 0;
        position += 1;
        if position >= order.len() {
            let finished = order.last().cloned();
            order = shuffled(catalog, finished.as_deref(), rng);
            position = 0;
            cycle += 1;
            reshuffled = true;
        }
    };

    Advance {
        question,
        cursor: BatchCursorEntity {
            shuffled_order: order,
            position,
            next_question: next_question + 1,
            cycle,
            version,
            updated_at: now,
        },
        reshuffled,
    }
}

fn matches_catalog(cursor: &BatchCursorEntity, catalog: &QuizCatalog) -> bool {
    if cursor.shuffled_order.len() != catalog.batch_count()
        || cursor.position >= cursor.shuffled_order.len()
    {
        return false;
    }
    let stored: HashSet<&BatchId> = cursor.shuffled_order.iter().collect();
    stored.len() == catalog.batch_count() && catalog.batch_ids().all(|id| stored.contains(id))
}

/// Uniform permutation of every batch id, never starting with `avoid` when another batch exists.
fn shuffled<R: Rng + ?Sized>(
    catalog: &QuizCatalog,
    avoid: Option<&str>,
    rng: &mut R,
) -> Vec<BatchId> {
    let mut order: Vec<BatchId> = catalog.batch_ids().cloned().collect();
    order.shuffle(rng);
    if order.len() > 1 && avoid.is_some_and(|avoid| order[0] == avoid) {
        let swap_with = rng.random_range(1..order.len());
        order.swap(0, swap_with);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tests::sample_catalog;
    use rand::{SeedableRng, rngs::StdRng};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-07-10 10:00 UTC);

    fn cursor(order: &[&str], position: usize, next_question: usize) -> BatchCursorEntity {
        BatchCursorEntity {
            shuffled_order: order.iter().map(|id| id.to_string()).collect(),
            position,
            next_question,
            cycle: 0,
            version: 1,
            updated_at: NOW,
        }
    }

    #[test]
    fn first_run_starts_a_fresh_permutation() {
        let catalog = sample_catalog(3, 2);
        let mut rng = StdRng::seed_from_u64(7);

        let step = advance(&catalog, None, &mut rng, NOW);

        assert!(step.reshuffled);
        assert_eq!(step.cursor.position, 0);
        assert_eq!(step.cursor.next_question, 1);
        assert_eq!(step.cursor.version, 1);
        assert_eq!(step.question.batch_id, step.cursor.shuffled_order[0]);
        let mut ids = step.cursor.shuffled_order.clone();
        ids.sort();
        assert_eq!(ids, vec!["B1", "B2", "B3"]);
    }

    #[test]
    fn seven_ticks_cover_every_batch_then_reshuffle() {
        let catalog = sample_catalog(3, 2);
        let mut rng = StdRng::seed_from_u64(42);
        // Nothing delivered yet from the B2, B1, B3 order.
        let mut stored = cursor(&["B2", "B1", "B3"], 0, 0);

        let mut visited = Vec::new();
        for _ in 0..6 {
            let step = advance(&catalog, Some(&stored), &mut rng, NOW);
            assert!(!step.reshuffled);
            visited.push(step.question.id);
            stored = step.cursor;
        }
        // B2 holds questions 3,4; B1 holds 1,2; B3 holds 5,6.
        assert_eq!(visited, vec![3, 4, 1, 2, 5, 6]);
        assert_eq!(stored.cycle, 0);

        let seventh = advance(&catalog, Some(&stored), &mut rng, NOW);
        assert!(seventh.reshuffled);
        assert_eq!(seventh.cursor.cycle, 1);
        assert_eq!(seventh.cursor.position, 0);
        assert_ne!(seventh.cursor.shuffled_order[0], "B3");
        assert_eq!(seventh.question.batch_id, seventh.cursor.shuffled_order[0]);
    }

    #[test]
    fn reshuffle_never_repeats_the_finished_batch_first() {
        let catalog = sample_catalog(2, 1);
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let stored = cursor(&["B1", "B2"], 1, 1);
            let step = advance(&catalog, Some(&stored), &mut rng, NOW);
            assert_eq!(step.cursor.shuffled_order, vec!["B1", "B2"]);
            assert_eq!(step.question.batch_id, "B1");
        }
    }

    #[test]
    fn single_batch_wraps_onto_itself() {
        let catalog = sample_catalog(1, 2);
        let mut rng = StdRng::seed_from_u64(1);
        let stored = cursor(&["B1"], 0, 2);

        let step = advance(&catalog, Some(&stored), &mut rng, NOW);

        assert_eq!(step.question.id, 1);
        assert_eq!(step.cursor.cycle, 1);
    }

    #[test]
    fn mismatched_order_is_regenerated() {
        let catalog = sample_catalog(3, 2);
        let mut rng = StdRng::seed_from_u64(3);
        let stored = cursor(&["B1", "OLD"], 1, 1);

        let step = advance(&catalog, Some(&stored), &mut rng, NOW);

        assert!(step.reshuffled);
        assert_eq!(step.cursor.shuffled_order.len(), 3);
        assert_eq!(step.cursor.position, 0);
        assert_eq!(step.cursor.version, 2);
        assert!(!step.cursor.shuffled_order.contains(&"OLD".to_string()));
    }
}
