use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{DeskError, Result},
    protocol::{MotionCommand, STOP_COMMAND},
    state::DeskState,
    transport::CommandSink,
    types::{Direction, MotionConfig},
};

/// Summary of a finished [`MotionController::move_to`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveReport {
    /// Direction of travel, `None` when the desk was already at the target
    pub direction: Option<Direction>,
    /// Height when the move started
    pub start_height: u8,
    /// Height reported when the stop command was sent
    pub final_height: u8,
    /// Move commands written, not counting the stop command
    pub commands_sent: u32,
}

/// Returns `true` once `current` is inside the acceptance band for `target`
///
/// Moving up, the band is everything from `target - tolerance` upwards;
/// moving down, everything from `target + tolerance` downwards. Overshooting
/// the target also counts as reached.
#[must_use]
pub const fn reached_target(
    direction: Direction,
    target: u8,
    current: u8,
    tolerance: u8,
) -> bool {
    match direction {
        Direction::Up => target.saturating_sub(tolerance) <= current,
        Direction::Down => target.saturating_add(tolerance) >= current,
    }
}

/// Closed-loop driver that walks the desk to a target height
///
/// The desk only moves while move commands keep arriving, so the controller
/// re-sends the same command every `command_interval` and watches the height
/// that the [`TelemetryIngestor`](crate::telemetry::TelemetryIngestor) keeps
/// updating in the background.
#[derive(Debug, Clone)]
pub struct MotionController {
    state: DeskState,
    config: MotionConfig,
}

impl MotionController {
    /// Create a controller reading from `state`
    #[must_use]
    pub const fn new(state: DeskState, config: MotionConfig) -> Self {
        Self { state, config }
    }

    /// Motion tuning in use
    #[must_use]
    pub const fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Drive the desk to `target` and stop it
    ///
    /// Returns without writing anything when the desk already reports
    /// `target`. Otherwise the move command is written every
    /// `command_interval` until the height enters the tolerance band, then a
    /// single stop command is sent. There is no iteration cap: the loop ends
    /// only on telemetry convergence or a write failure.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::CommandWrite`] if any write fails. The desk may
    /// still be moving at that point and no stop is attempted.
    pub async fn move_to<S>(&self, sink: &S, target: u8) -> Result<MoveReport>
    where
        S: CommandSink + ?Sized,
    {
        let start = self.state.reading().await;

        let Some(direction) = Direction::for_move(start.height, target) else {
            debug!(height = start.height, "Desk already at target height");
            return Ok(MoveReport {
                direction: None,
                start_height: start.height,
                final_height: start.height,
                commands_sent: 0,
            });
        };

        let command = MotionCommand::new(direction);
        info!(
            %direction,
            height = start.height,
            target_height = target,
            speed = start.speed,
            "Starting to move"
        );

        let mut commands_sent = 0u32;
        while !reached_target(
            direction,
            target,
            self.state.height().await,
            self.config.tolerance,
        ) {
            tokio::time::sleep(self.config.command_interval()).await;
            sink.send(command.as_bytes()).await.map_err(into_write_error)?;
            commands_sent = commands_sent.saturating_add(1);
            let current_height = self.state.height().await;
            debug!(
                %direction,
                target_height = target,
                current_height,
                "Sent command"
            );
        }

        let finish = self.state.reading().await;
        info!(
            %direction,
            height = finish.height,
            target_height = target,
            speed = finish.speed,
            "Finished moving"
        );
        sink.send(&STOP_COMMAND).await.map_err(into_write_error)?;

        Ok(MoveReport {
            direction: Some(direction),
            start_height: start.height,
            final_height: finish.height,
            commands_sent,
        })
    }
}

fn into_write_error(error: DeskError) -> DeskError {
    match error {
        DeskError::CommandWrite(_) => error,
        other => DeskError::CommandWrite(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{encode_command, DOWN_COMMAND, UP_COMMAND},
        types::DeskReading,
        MAX_DESK_HEIGHT, MIN_DESK_HEIGHT,
    };
    use async_trait::async_trait;
    use std::{sync::Mutex, time::Duration};
    use tokio_test::{assert_err, assert_ok};

    /// Records writes and simulates a desk that travels one centimeter per
    /// move command.
    struct SimulatedDesk {
        state: DeskState,
        writes: Mutex<Vec<Vec<u8>>>,
        fail_after: Option<usize>,
    }

    impl SimulatedDesk {
        fn new(state: DeskState) -> Self {
            Self {
                state,
                writes: Mutex::new(Vec::new()),
                fail_after: None,
            }
        }

        fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandSink for SimulatedDesk {
        async fn send(&self, data: &[u8]) -> Result<()> {
            {
                let mut writes = self.writes.lock().unwrap();
                if self.fail_after.is_some_and(|limit| writes.len() >= limit) {
                    return Err(DeskError::Disconnected);
                }
                writes.push(data.to_vec());
            }

            let reading = self.state.reading().await;
            let height = if data == encode_command(UP_COMMAND) {
                reading.height + 1
            } else if data == encode_command(DOWN_COMMAND) {
                reading.height - 1
            } else {
                reading.height
            };
            self.state.apply(DeskReading::new(height, 1)).await;
            Ok(())
        }
    }

    fn controller(state: &DeskState) -> MotionController {
        MotionController::new(state.clone(), MotionConfig::default())
    }

    #[test]
    fn test_reached_target_band() {
        assert!(!reached_target(Direction::Up, 100, 94, 5));
        assert!(reached_target(Direction::Up, 100, 95, 5));
        assert!(reached_target(Direction::Up, 100, 120, 5));

        assert!(!reached_target(Direction::Down, 70, 76, 5));
        assert!(reached_target(Direction::Down, 70, 75, 5));
        assert!(reached_target(Direction::Down, 70, 65, 5));

        assert!(reached_target(Direction::Up, 3, 0, 5));
        assert!(reached_target(Direction::Down, 253, 255, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_writes_when_already_at_target() {
        for height in MIN_DESK_HEIGHT..=MAX_DESK_HEIGHT {
            let state = DeskState::new();
            state.set_height(height).await;
            let desk = SimulatedDesk::new(state.clone());

            let report = assert_ok!(controller(&state).move_to(&desk, height).await);

            assert!(desk.writes().is_empty(), "height {height} wrote commands");
            assert_eq!(report.direction, None);
            assert_eq!(report.commands_sent, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_moving_up_stops_inside_band() {
        let state = DeskState::new();
        state.set_height(70).await;
        let desk = SimulatedDesk::new(state.clone());

        let report = assert_ok!(controller(&state).move_to(&desk, 100).await);

        let writes = desk.writes();
        let (stop, moves) = writes.split_last().unwrap();
        assert_eq!(stop.as_slice(), STOP_COMMAND);
        assert_eq!(moves.len(), 25);
        assert!(moves
            .iter()
            .all(|w| w.as_slice() == [0xD9, 0xFF, 0x01, 0x63, 0x3C]));

        assert_eq!(report.direction, Some(Direction::Up));
        assert_eq!(report.start_height, 70);
        assert_eq!(report.final_height, 95);
        assert_eq!(report.commands_sent, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_moving_down_stops_inside_band() {
        let state = DeskState::new();
        state.set_height(120).await;
        let desk = SimulatedDesk::new(state.clone());

        let report = assert_ok!(controller(&state).move_to(&desk, 80).await);

        let writes = desk.writes();
        let (stop, moves) = writes.split_last().unwrap();
        assert_eq!(stop.as_slice(), STOP_COMMAND);
        assert_eq!(moves.len(), 35);
        assert!(moves
            .iter()
            .all(|w| w.as_slice() == [0xD9, 0xFF, 0x02, 0x60, 0x3A]));

        assert_eq!(report.direction, Some(Direction::Down));
        assert_eq!(report.final_height, 85);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inside_band_sends_only_stop() {
        let state = DeskState::new();
        state.set_height(97).await;
        let desk = SimulatedDesk::new(state.clone());

        let report = assert_ok!(controller(&state).move_to(&desk, 100).await);

        assert_eq!(desk.writes(), vec![STOP_COMMAND.to_vec()]);
        assert_eq!(report.direction, Some(Direction::Up));
        assert_eq!(report.commands_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_tolerance() {
        let state = DeskState::new();
        state.set_height(70).await;
        let desk = SimulatedDesk::new(state.clone());
        let config = MotionConfig {
            tolerance: 0,
            ..MotionConfig::default()
        };

        let report = assert_ok!(
            MotionController::new(state.clone(), config)
                .move_to(&desk, 100)
                .await
        );

        assert_eq!(report.final_height, 100);
        assert_eq!(report.commands_sent, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_are_paced() {
        let state = DeskState::new();
        state.set_height(70).await;
        let desk = SimulatedDesk::new(state.clone());

        let started = tokio::time::Instant::now();
        assert_ok!(controller(&state).move_to(&desk, 80).await);

        // 5 move commands, each preceded by a 200 ms wait
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1_000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1_050), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_aborts_move() {
        let state = DeskState::new();
        state.set_height(70).await;
        let mut desk = SimulatedDesk::new(state.clone());
        desk.fail_after = Some(3);

        let error = assert_err!(controller(&state).move_to(&desk, 100).await);

        assert!(matches!(error, DeskError::CommandWrite(_)));
        assert!(error.is_fatal());
        let writes = desk.writes();
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|w| w.as_slice() != STOP_COMMAND));
    }
}
