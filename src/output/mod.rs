mod progress;
mod styling;
mod tables;

use crate::providers::circleci::{Pipeline, Workflow};

pub use progress::WaitProgress;
use styling::{brand, muted};

/// Prints the `ciwait` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        brand("⏳ ciwait"),
        muted(env!("CARGO_PKG_VERSION")),
        muted("Wait for CircleCI workflows")
    );
}

/// Prints the workflows the wait settled on.
pub fn print_summary(pipeline: &Pipeline, workflows: &[Workflow]) {
    eprintln!(
        "{} #{} {}",
        brand("Pipeline"),
        pipeline.number,
        muted(&pipeline.vcs.commit.subject)
    );
    if workflows.is_empty() {
        eprintln!("  {}", muted("No workflow matched the name pattern"));
        return;
    }
    eprintln!("{}", tables::workflow_table(workflows));
}
