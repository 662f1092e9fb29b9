use crate::error::{HandinError, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Split / ScoreReport
// ---------------------------------------------------------------------------

/// A metric computed separately over the test subset (feedback only) and the
/// quiz subset (held out, ranked).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub test: f64,
    pub quiz: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreReport {
    pub accuracy: Split,
    pub rmse: Split,
}

// ---------------------------------------------------------------------------
// score
// ---------------------------------------------------------------------------

/// Score a set of prediction lines against the ground truth.
///
/// Each prediction line's first whitespace-delimited token is the numeric
/// guess. Each truth line is `<truth> <is_quiz_flag>` with the flag in
/// {0, 1} partitioning lines into the test and quiz subsets. Per subset:
/// accuracy is the fraction of guesses matching the truth after rounding,
/// RMSE is the root mean squared error.
pub fn score(predictions: &str, truths: &str) -> Result<ScoreReport> {
    let pred_lines: Vec<&str> = predictions.lines().collect();
    let truth_lines: Vec<&str> = truths.lines().collect();
    if pred_lines.len() != truth_lines.len() {
        return Err(HandinError::LineCount {
            expected: truth_lines.len(),
            actual: pred_lines.len(),
        });
    }

    let mut n = [0usize; 2];
    let mut correct = [0.0f64; 2];
    let mut sse = [0.0f64; 2];

    for (i, (pred, truth)) in pred_lines.iter().zip(&truth_lines).enumerate() {
        let guess: f64 = pred
            .split_whitespace()
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| {
                HandinError::ArchiveFormat(format!("line {}: malformed prediction", i + 1))
            })?;

        let mut fields = truth.split_whitespace();
        let truth_val: f64 = fields
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| malformed_truth(i))?;
        let flag: usize = fields
            .next()
            .and_then(|t| t.parse().ok())
            .filter(|f| *f <= 1)
            .ok_or_else(|| malformed_truth(i))?;

        n[flag] += 1;
        if guess.round() == truth_val.round() {
            correct[flag] += 1.0;
        }
        sse[flag] += (guess - truth_val).powi(2);
    }

    for (flag, label) in [(0, "test"), (1, "quiz")] {
        if n[flag] == 0 {
            return Err(HandinError::AnswerFormat(format!(
                "ground truth has no {label} lines"
            )));
        }
    }

    let accuracy = |flag: usize| correct[flag] / n[flag] as f64;
    let rmse = |flag: usize| (sse[flag] / n[flag] as f64).sqrt();
    Ok(ScoreReport {
        accuracy: Split {
            test: accuracy(0),
            quiz: accuracy(1),
        },
        rmse: Split {
            test: rmse(0),
            quiz: rmse(1),
        },
    })
}

fn malformed_truth(i: usize) -> HandinError {
    HandinError::AnswerFormat(format!("line {}: expected '<truth> <is_quiz_flag>'", i + 1))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
