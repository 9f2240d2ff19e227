use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> anyhow::Result<()> {
    // --version prints branch, sha and commit date
    let git = GitclBuilder::default()
        .sha(true)
        .branch(true)
        .commit_date(true)
        .build()?;

    Emitter::default().add_instructions(&git)?.emit()?;

    Ok(())
}
