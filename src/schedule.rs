use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::{
    device::DeskSession,
    error::Result,
    motion::MoveReport,
    transport::Transport,
    types::{Position, Prompt},
};

/// How a list of positions is cycled through
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOptions {
    /// Number of passes over the position list
    pub repeat: u32,
    /// Pause between the prompt and the start of the move
    pub delay: Duration,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            repeat: 1,
            delay: Duration::from_secs(3),
        }
    }
}

/// Walk the desk through `positions`, `options.repeat` times
///
/// For every position the user is prompted first through `on_prompt`, then
/// after `options.delay` the desk moves and holds the height for the
/// position's duration.
///
/// # Errors
///
/// Stops at the first failed move and returns its error.
pub async fn run_cycle<T, F>(
    session: &DeskSession<T>,
    positions: &[Position],
    options: &CycleOptions,
    mut on_prompt: F,
) -> Result<Vec<MoveReport>>
where
    T: Transport,
    F: FnMut(Prompt, &Position),
{
    let mut reports = Vec::with_capacity(positions.len());

    for round in 1..=options.repeat {
        for position in positions {
            let prompt = Prompt::for_move(position.height, session.height().await);
            info!(%prompt, round, target_height = position.height, "Prompting user");
            on_prompt(prompt, position);
            tokio::time::sleep(options.delay).await;

            info!(
                position = position.height,
                duration = ?position.hold,
                "Moving to position for specified duration"
            );
            reports.push(session.move_to(position.height).await?);
            tokio::time::sleep(position.hold).await;
        }
    }

    Ok(reports)
}
