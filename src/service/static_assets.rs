use crate::error::PollsError;
use std::path::Path;
use tracing::{debug, info};

/// Assets compiled into the binary, keyed by their path under `/static/`.
pub const BUNDLED: &[(&str, &str)] = &[
    ("polls/style.css", include_str!("../../static/polls/style.css")),
];

/// `collectstatic`: write the bundled assets below `root`, overwriting stale copies.
pub async fn collect(root: &Path) -> Result<usize, PollsError> {
    for (rel, contents) in BUNDLED {
        let target = root.join(rel);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, contents).await?;
        debug!(path = %target.display(), "copied static asset");
    }
    info!(
        root = %root.display(),
        count = BUNDLED.len(),
        "static files collected"
    );
    Ok(BUNDLED.len())
}
