use crate::output::print_json;
use anyhow::bail;
use handin_core::leaderboard;
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn run(
    groups_db: &Path,
    board_db: &Path,
    answers: &Path,
    submission: &Path,
    min_interval_secs: u64,
    page: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    for required in [groups_db, answers, submission] {
        if !required.exists() {
            bail!("{} does not exist", required.display());
        }
    }
    let default_page = board_db.with_extension("html");
    let page = page.unwrap_or(&default_page);

    let outcome = leaderboard::submit(
        groups_db,
        board_db,
        answers,
        submission,
        min_interval_secs,
        page,
    )?;

    if json {
        print_json(&outcome)?;
        return Ok(());
    }
    println!("{}", "*".repeat(72));
    println!("Your project results:");
    println!("{}", "*".repeat(72));
    println!("Team: {}", outcome.group);
    println!(
        "Accuracy: {:.2}%, RMSE: {:.4} (best so far: {:.4})",
        outcome.accuracy.quiz * 100.0,
        outcome.rmse.quiz,
        outcome.best_quiz
    );
    Ok(())
}
