use crate::output::print_json;
use anyhow::bail;
use handin_core::groups;
use std::path::Path;

pub fn run(groups_db: &Path, submission: &Path, json: bool) -> anyhow::Result<()> {
    if !submission.exists() {
        bail!("{} does not exist", submission.display());
    }

    let outcome = groups::register(groups_db, submission)?;

    if json {
        print_json(&outcome)?;
        return Ok(());
    }
    println!("Membership for username: {}", outcome.username);
    println!("Group: {}", outcome.group);
    println!("Members: {}", outcome.members.join(", "));
    Ok(())
}
